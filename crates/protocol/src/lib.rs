//! Wire types for the embedded widget control/event protocol.
//!
//! This crate contains the serde-serializable types exchanged with the
//! widget frame over the cross-origin messaging channel. These types
//! represent the "protocol layer" - the shapes of data as they appear on
//! the wire.
//!
//! # Design Philosophy
//!
//! Types in this crate are:
//! * Pure data: No behavior beyond serialization/deserialization
//! * 1:1 with protocol: Match the message shapes the widget speaks
//! * Stable: Changes only when the wire protocol changes
//!
//! Commands flow host -> widget; events flow widget -> host. Every
//! outbound envelope carries a fresh `requestId`, but acknowledgements are
//! correlated by message *type*, not by echoing the id.

pub mod commands;
pub mod events;
pub mod types;

pub use commands::*;
pub use events::*;
pub use types::*;

/// Protocol version carried in the INIT payload.
pub const PROTOCOL_VERSION: &str = "1.0.0";
