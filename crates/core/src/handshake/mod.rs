//! Protocol handshakes: INIT with bounded retry, NAVIGATE with a single
//! awaitable in-flight slot, LOGOUT with ack-or-timeout before teardown.
//!
//! Each handshake is a singleton per session. Acknowledgements are
//! correlated by message *type* - the per-send request id is generated
//! but not echoed by the widget, so overlapping identical-type exchanges
//! cannot be told apart. Timers are spawned tasks and are aborted the
//! moment an acknowledgement lands.

use std::sync::Arc;

use widget_protocol::Command;

pub mod init;
pub mod logout;
pub mod navigate;

pub use init::InitHandshake;
pub use logout::LogoutHandshake;
pub use navigate::{NavigateHandshake, NavigateOptions};

/// How handshakes send commands. The session supplies a closure that
/// routes through the live channel and drops sends after destruction.
pub type PostFn = Arc<dyn Fn(Command) + Send + Sync>;
