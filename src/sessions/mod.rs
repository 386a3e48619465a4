//! Device push sessions and command dispatch
//!
//! Each connected device holds one server-sent event stream. The
//! [`SessionRegistry`] maps device codes to those streams, and the
//! [`CommandDispatcher`] writes commands down them.

pub mod connection;
pub mod dispatch;
pub mod registry;
pub mod types;

pub use connection::open;
pub use dispatch::{CommandDispatcher, DispatchError};
pub use registry::{SessionGuard, SessionRegistry, SharedSessionRegistry};
pub use types::{
    ChannelSink, Command, HEARTBEAT, PlaySource, PushFrame, PushSink, SessionHandle, SinkError,
};
