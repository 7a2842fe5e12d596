pub mod frame;
pub mod hpack;
pub mod session;
pub mod tls;
pub mod transport;

pub use frame::{Frame, FrameCodec, FrameError, FrameType};
pub use hpack::HeaderBlockEncoder;
pub use session::{FrameSink, FrameSource, H2Session, HandshakeError};
pub use tls::TlsDialer;
