#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use contflood_core::config::FloodConfig;
use contflood_net::frame::flags;
use contflood_net::session::CLIENT_PREFACE;
use contflood_net::{Frame, FrameCodec, FrameType};
use contflood_traits::{Dialer, FloodStream, Target};
use futures::{SinkExt, StreamExt};
use std::io;
use std::pin::Pin;
use std::sync::Mutex;
use std::task::{ready, Context, Poll};
use std::time::Duration;
use tokio::io::{duplex, AsyncRead, AsyncReadExt, AsyncWrite, DuplexStream, ReadBuf};
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;

pub fn test_config(connections: usize, time_limit: Duration) -> FloodConfig {
    let mut config = FloodConfig::new(Target::parse("https://mock.test:8443/").unwrap());
    config.connections = connections;
    config.time_limit = time_limit;
    config.drain_grace = Duration::from_millis(20);
    config
}

#[derive(Debug, Clone, Copy)]
pub enum PeerBehavior {
    /// Completes the handshake and keeps reading until the client hangs up.
    Tolerant,
    /// Hangs up once it has seen this many CONTINUATION frames.
    CloseAfter(usize),
    /// Answers the preface with a PING instead of SETTINGS.
    WrongFirstFrame,
    /// Completes the handshake, then never reads again. Pings the client
    /// until it hangs up.
    StopReading,
}

/// What the peer saw, without the payload so long floods stay cheap to record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeenFrame {
    pub kind: FrameType,
    pub flags: u8,
    pub stream_id: u32,
    pub len: usize,
}

impl SeenFrame {
    pub fn end_headers(&self) -> bool {
        self.flags & flags::END_HEADERS != 0
    }

    pub fn end_stream(&self) -> bool {
        self.kind == FrameType::Headers && self.flags & flags::END_STREAM != 0
    }
}

/// Hands every dial a fresh in-memory pipe with a scripted server on the far end.
pub struct MockDialer {
    behavior: PeerBehavior,
    buffer: usize,
    peers: Mutex<Vec<JoinHandle<Vec<SeenFrame>>>>,
}

impl MockDialer {
    pub fn new(behavior: PeerBehavior) -> Self {
        Self::with_buffer(behavior, 256 * 1024)
    }

    /// `buffer` bytes fit in each direction of the pipe before writes block.
    pub fn with_buffer(behavior: PeerBehavior, buffer: usize) -> Self {
        Self {
            behavior,
            buffer,
            peers: Mutex::new(Vec::new()),
        }
    }

    /// Frames each peer received, in dial order. Waits for every peer to see EOF.
    pub async fn received(&self) -> Vec<Vec<SeenFrame>> {
        let handles: Vec<_> = self.peers.lock().unwrap().drain(..).collect();
        let mut all = Vec::with_capacity(handles.len());
        for handle in handles {
            all.push(handle.await.unwrap());
        }
        all
    }
}

#[async_trait]
impl Dialer for MockDialer {
    async fn dial(&self, _target: &Target) -> anyhow::Result<FloodStream> {
        let (client, server) = duplex(self.buffer);
        let peer = tokio::spawn(run_peer(server, self.behavior));
        self.peers.lock().unwrap().push(peer);
        Ok(Box::new(client))
    }
}

/// A dialer whose target is never reachable.
pub struct RefusingDialer;

#[async_trait]
impl Dialer for RefusingDialer {
    async fn dial(&self, target: &Target) -> anyhow::Result<FloodStream> {
        anyhow::bail!("connection refused by {}", target.authority)
    }
}

async fn run_peer(mut stream: DuplexStream, behavior: PeerBehavior) -> Vec<SeenFrame> {
    let mut preface = [0u8; 24];
    if stream.read_exact(&mut preface).await.is_err() {
        return Vec::new();
    }
    assert_eq!(&preface, CLIENT_PREFACE);

    let mut framed = Framed::new(stream, FrameCodec::new());
    let first = match behavior {
        PeerBehavior::WrongFirstFrame => {
            Frame::new(FrameType::Ping, 0, 0, Bytes::from_static(&[0; 8]))
        }
        _ => Frame::settings(),
    };
    if framed.send(first).await.is_err() {
        return Vec::new();
    }

    if let PeerBehavior::StopReading = behavior {
        let ping = Frame::new(FrameType::Ping, 0, 0, Bytes::from_static(&[0; 8]));
        loop {
            tokio::time::sleep(Duration::from_millis(50)).await;
            if framed.send(ping.clone()).await.is_err() {
                return Vec::new();
            }
        }
    }

    let mut seen = Vec::new();
    let mut continuations = 0;
    while let Some(Ok(frame)) = framed.next().await {
        if frame.kind == FrameType::Continuation {
            continuations += 1;
        }
        seen.push(SeenFrame {
            kind: frame.kind,
            flags: frame.flags,
            stream_id: frame.stream_id,
            len: frame.payload.len(),
        });
        if let PeerBehavior::CloseAfter(limit) = behavior {
            if continuations >= limit {
                break;
            }
        }
    }
    seen
}

/// Wraps a [`MockDialer`]: after `healthy_writes` successful writes, the next
/// `failures` writes fail with a non-fatal error and later writes succeed.
pub struct FlakyDialer {
    pub inner: MockDialer,
    pub healthy_writes: usize,
    pub failures: usize,
}

#[async_trait]
impl Dialer for FlakyDialer {
    async fn dial(&self, target: &Target) -> anyhow::Result<FloodStream> {
        let inner = self.inner.dial(target).await?;
        Ok(Box::new(FlakyStream {
            inner,
            healthy_writes: self.healthy_writes,
            failures: self.failures,
        }))
    }
}

struct FlakyStream {
    inner: FloodStream,
    healthy_writes: usize,
    failures: usize,
}

impl AsyncRead for FlakyStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for FlakyStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if self.healthy_writes > 0 {
            let written = ready!(Pin::new(&mut self.inner).poll_write(cx, buf));
            if written.is_ok() {
                self.healthy_writes -= 1;
            }
            return Poll::Ready(written);
        }
        if self.failures > 0 {
            self.failures -= 1;
            return Poll::Ready(Err(io::Error::new(io::ErrorKind::Other, "transient write failure")));
        }
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

/// Only the frames that belong to the request stream.
pub fn stream_frames(seen: &[SeenFrame]) -> Vec<SeenFrame> {
    seen.iter()
        .copied()
        .filter(|f| matches!(f.kind, FrameType::Headers | FrameType::Continuation))
        .collect()
}
