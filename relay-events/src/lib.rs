pub mod channel;
pub mod session;

pub use channel::{ChannelError, ChannelEvent, ControlMessage, ExecChannel, ExecConnector};
pub use session::{ExecOutcome, ExecRequest, ExecSession, ExecState};
