//! HTTP/2 frame layout (RFC 9113 §4.1) and a codec for reading and writing
//! whole frames on a byte stream.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;
use std::io;
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

pub const FRAME_HEADER_LEN: usize = 9;

/// Largest payload the 24-bit length field can describe.
pub const MAX_PAYLOAD_LEN: usize = (1 << 24) - 1;

/// SETTINGS_MAX_FRAME_SIZE until an endpoint advertises otherwise. The client
/// never raises it, so no compliant server sends a larger payload.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16_384;

const STREAM_ID_MASK: u32 = 0x7fff_ffff;

pub mod flags {
    pub const END_STREAM: u8 = 0x1;
    pub const ACK: u8 = 0x1;
    pub const END_HEADERS: u8 = 0x4;
    pub const PADDED: u8 = 0x8;
    pub const PRIORITY: u8 = 0x20;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Data,
    Headers,
    Priority,
    RstStream,
    Settings,
    PushPromise,
    Ping,
    GoAway,
    WindowUpdate,
    Continuation,
    Unknown(u8),
}

impl From<u8> for FrameType {
    fn from(code: u8) -> Self {
        match code {
            0x0 => Self::Data,
            0x1 => Self::Headers,
            0x2 => Self::Priority,
            0x3 => Self::RstStream,
            0x4 => Self::Settings,
            0x5 => Self::PushPromise,
            0x6 => Self::Ping,
            0x7 => Self::GoAway,
            0x8 => Self::WindowUpdate,
            0x9 => Self::Continuation,
            other => Self::Unknown(other),
        }
    }
}

impl From<FrameType> for u8 {
    fn from(kind: FrameType) -> Self {
        match kind {
            FrameType::Data => 0x0,
            FrameType::Headers => 0x1,
            FrameType::Priority => 0x2,
            FrameType::RstStream => 0x3,
            FrameType::Settings => 0x4,
            FrameType::PushPromise => 0x5,
            FrameType::Ping => 0x6,
            FrameType::GoAway => 0x7,
            FrameType::WindowUpdate => 0x8,
            FrameType::Continuation => 0x9,
            FrameType::Unknown(code) => code,
        }
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Data => f.write_str("DATA"),
            Self::Headers => f.write_str("HEADERS"),
            Self::Priority => f.write_str("PRIORITY"),
            Self::RstStream => f.write_str("RST_STREAM"),
            Self::Settings => f.write_str("SETTINGS"),
            Self::PushPromise => f.write_str("PUSH_PROMISE"),
            Self::Ping => f.write_str("PING"),
            Self::GoAway => f.write_str("GOAWAY"),
            Self::WindowUpdate => f.write_str("WINDOW_UPDATE"),
            Self::Continuation => f.write_str("CONTINUATION"),
            Self::Unknown(code) => write!(f, "UNKNOWN_FRAME_TYPE_{code}"),
        }
    }
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame payload of {len} bytes exceeds the {max} byte limit")]
    Oversized { len: usize, max: usize },
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl FrameError {
    /// True when the write side found the peer gone: the signal a patched
    /// server gives by tearing down the connection mid header block.
    pub fn is_peer_closed(&self) -> bool {
        matches!(
            self,
            Self::Io(e) if matches!(e.kind(), io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: FrameType,
    pub flags: u8,
    pub stream_id: u32,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(kind: FrameType, flags: u8, stream_id: u32, payload: impl Into<Bytes>) -> Self {
        Self {
            kind,
            flags,
            stream_id: stream_id & STREAM_ID_MASK,
            payload: payload.into(),
        }
    }

    /// SETTINGS with no parameters, accepting every default.
    pub fn settings() -> Self {
        Self::new(FrameType::Settings, 0, 0, Bytes::new())
    }

    pub fn settings_ack() -> Self {
        Self::new(FrameType::Settings, flags::ACK, 0, Bytes::new())
    }

    pub fn headers(stream_id: u32, fragment: Bytes, end_stream: bool, end_headers: bool) -> Self {
        let mut f = 0;
        if end_stream {
            f |= flags::END_STREAM;
        }
        if end_headers {
            f |= flags::END_HEADERS;
        }
        Self::new(FrameType::Headers, f, stream_id, fragment)
    }

    pub fn continuation(stream_id: u32, fragment: Bytes, end_headers: bool) -> Self {
        let f = if end_headers { flags::END_HEADERS } else { 0 };
        Self::new(FrameType::Continuation, f, stream_id, fragment)
    }

    pub fn has_flag(&self, flag: u8) -> bool {
        self.flags & flag == flag
    }

    pub fn is_ack(&self) -> bool {
        matches!(self.kind, FrameType::Settings | FrameType::Ping) && self.has_flag(flags::ACK)
    }

    /// Parameters of a SETTINGS frame; a trailing partial entry is ignored.
    pub fn settings_params(&self) -> Vec<Setting> {
        if self.kind != FrameType::Settings {
            return Vec::new();
        }
        self.payload
            .chunks_exact(6)
            .map(|mut chunk| Setting {
                id: chunk.get_u16(),
                value: chunk.get_u32(),
            })
            .collect()
    }

    pub fn goaway(&self) -> Option<GoAway> {
        if self.kind != FrameType::GoAway || self.payload.len() < 8 {
            return None;
        }
        let mut payload = self.payload.clone();
        let last_stream_id = payload.get_u32() & STREAM_ID_MASK;
        let error_code = payload.get_u32();
        Some(GoAway {
            last_stream_id,
            error_code,
            debug_data: payload,
        })
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[FrameHeader {} flags=0x{:02x} stream={} len={}]",
            self.kind,
            self.flags,
            self.stream_id,
            self.payload.len()
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Setting {
    pub id: u16,
    pub value: u32,
}

impl Setting {
    pub fn name(&self) -> &'static str {
        match self.id {
            0x1 => "HEADER_TABLE_SIZE",
            0x2 => "ENABLE_PUSH",
            0x3 => "MAX_CONCURRENT_STREAMS",
            0x4 => "INITIAL_WINDOW_SIZE",
            0x5 => "MAX_FRAME_SIZE",
            0x6 => "MAX_HEADER_LIST_SIZE",
            0x8 => "ENABLE_CONNECT_PROTOCOL",
            _ => "UNKNOWN_SETTING",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoAway {
    pub last_stream_id: u32,
    pub error_code: u32,
    pub debug_data: Bytes,
}

impl GoAway {
    pub fn error_name(&self) -> &'static str {
        match self.error_code {
            0x0 => "NO_ERROR",
            0x1 => "PROTOCOL_ERROR",
            0x2 => "INTERNAL_ERROR",
            0x3 => "FLOW_CONTROL_ERROR",
            0x4 => "SETTINGS_TIMEOUT",
            0x5 => "STREAM_CLOSED",
            0x6 => "FRAME_SIZE_ERROR",
            0x7 => "REFUSED_STREAM",
            0x8 => "CANCEL",
            0x9 => "COMPRESSION_ERROR",
            0xa => "CONNECT_ERROR",
            0xb => "ENHANCE_YOUR_CALM",
            0xc => "INADEQUATE_SECURITY",
            0xd => "HTTP_1_1_REQUIRED",
            _ => "UNKNOWN_ERROR",
        }
    }
}

impl fmt::Display for GoAway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "last_stream={} error={} debug={:?}",
            self.last_stream_id,
            self.error_name(),
            String::from_utf8_lossy(&self.debug_data)
        )
    }
}

#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_payload: usize,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self {
            max_payload: MAX_PAYLOAD_LEN,
        }
    }

    /// Caps inbound payloads. Outbound frames are always allowed up to the
    /// 24-bit maximum.
    pub fn with_max_payload(max_payload: usize) -> Self {
        Self {
            max_payload: max_payload.min(MAX_PAYLOAD_LEN),
        }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, FrameError> {
        if src.len() < FRAME_HEADER_LEN {
            return Ok(None);
        }

        let len = ((src[0] as usize) << 16) | ((src[1] as usize) << 8) | src[2] as usize;
        if len > self.max_payload {
            return Err(FrameError::Oversized {
                len,
                max: self.max_payload,
            });
        }

        let total = FRAME_HEADER_LEN + len;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        let mut header = src.split_to(FRAME_HEADER_LEN);
        header.advance(3);
        let kind = FrameType::from(header.get_u8());
        let flags = header.get_u8();
        let stream_id = header.get_u32() & STREAM_ID_MASK;
        let payload = src.split_to(len).freeze();

        Ok(Some(Frame {
            kind,
            flags,
            stream_id,
            payload,
        }))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), FrameError> {
        let len = frame.payload.len();
        if len > MAX_PAYLOAD_LEN {
            return Err(FrameError::Oversized {
                len,
                max: MAX_PAYLOAD_LEN,
            });
        }

        dst.reserve(FRAME_HEADER_LEN + len);
        dst.put_uint(len as u64, 3);
        dst.put_u8(frame.kind.into());
        dst.put_u8(frame.flags);
        dst.put_u32(frame.stream_id & STREAM_ID_MASK);
        dst.put_slice(&frame.payload);
        Ok(())
    }
}
