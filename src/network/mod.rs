//! Network side: command framing and the TCP streaming session

pub mod protocol;
pub mod session;

pub use protocol::{FrameDecoder, WireCommand, FRAME_LEN};
pub use session::{forward, SessionState, SessionStats, StatsSnapshot, StreamingServer};
