use crate::frame::{Frame, FrameCodec, FrameError, FrameType, DEFAULT_MAX_FRAME_SIZE};
use contflood_traits::FloodStream;
use futures::{SinkExt, StreamExt};
use std::io;
use thiserror::Error;
use tokio::io::{split, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio_util::codec::{FramedRead, FramedWrite};

/// RFC 9113 §3.4 client connection preface.
pub const CLIENT_PREFACE: &[u8; 24] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("writing client preface: {0}")]
    Preface(#[source] io::Error),
    #[error("writing SETTINGS: {0}")]
    Settings(#[source] FrameError),
    #[error("error while expecting a SETTINGS frame: {0}")]
    Read(#[source] FrameError),
    #[error("connection closed while expecting a SETTINGS frame")]
    Closed,
    #[error("got a {0} frame; want SETTINGS")]
    Unexpected(FrameType),
    #[error("error writing ACK of server's SETTINGS: {0}")]
    Ack(#[source] FrameError),
}

/// Write side of an established connection.
pub struct FrameSink {
    writer: FramedWrite<WriteHalf<FloodStream>, FrameCodec>,
}

impl FrameSink {
    /// Encodes and flushes a single frame.
    pub async fn send(&mut self, frame: Frame) -> Result<(), FrameError> {
        self.writer.send(frame).await
    }
}

/// Read side of an established connection.
pub struct FrameSource {
    reader: FramedRead<ReadHalf<FloodStream>, FrameCodec>,
}

impl FrameSource {
    /// `None` once the peer has closed its side.
    pub async fn next_frame(&mut self) -> Option<Result<Frame, FrameError>> {
        self.reader.next().await
    }
}

/// An HTTP/2 connection past the SETTINGS exchange, ready for streams.
pub struct H2Session {
    sink: FrameSink,
    source: FrameSource,
}

impl H2Session {
    /// Preface, empty SETTINGS, wait for the peer's SETTINGS, acknowledge it.
    pub async fn handshake(stream: FloodStream) -> Result<Self, HandshakeError> {
        let (read_half, mut write_half) = split(stream);

        write_half
            .write_all(CLIENT_PREFACE)
            .await
            .map_err(HandshakeError::Preface)?;

        let mut sink = FrameSink {
            writer: FramedWrite::new(write_half, FrameCodec::new()),
        };
        let mut source = FrameSource {
            reader: FramedRead::new(
                read_half,
                FrameCodec::with_max_payload(DEFAULT_MAX_FRAME_SIZE),
            ),
        };

        sink.send(Frame::settings())
            .await
            .map_err(HandshakeError::Settings)?;

        let first = match source.next_frame().await {
            Some(Ok(frame)) => frame,
            Some(Err(e)) => return Err(HandshakeError::Read(e)),
            None => return Err(HandshakeError::Closed),
        };
        if first.kind != FrameType::Settings {
            return Err(HandshakeError::Unexpected(first.kind));
        }

        for setting in first.settings_params() {
            tracing::debug!("peer setting {} = {}", setting.name(), setting.value);
        }

        if !first.is_ack() {
            sink.send(Frame::settings_ack())
                .await
                .map_err(HandshakeError::Ack)?;
        }

        Ok(Self { sink, source })
    }

    pub fn split(self) -> (FrameSink, FrameSource) {
        (self.sink, self.source)
    }
}
