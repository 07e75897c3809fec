//! Session client for embedding a sandboxed third-party widget.
//!
//! The widget runs inside a frame the integrator never scripts directly;
//! every interaction crosses an asynchronous, unordered, potentially
//! lossy messaging channel scoped to an exact origin. This crate owns the
//! protocol side of that arrangement: the INIT handshake with bounded
//! retry, request/acknowledgement correlation for navigation, the
//! logout-before-destroy sequence, fatal-error classification with
//! auto-teardown, and the re-handshake cycle triggered by session expiry.
//!
//! Frame construction and message delivery belong to the embedding
//! environment and are reached through the [`FrameHost`] trait; tests run
//! against the in-memory [`fake_host::FakeFrameHost`].
//!
//! # Example
//!
//! ```ignore
//! use widget::{WidgetConfig, WidgetSession, EventKind};
//!
//! let config = WidgetConfig::new("#widget-root", "https://console.pixelbin.io")
//!     .with_embed_id("shop-42")
//!     .with_autostart(true);
//!
//! let session = WidgetSession::connect(config, host)?;
//! session.on(EventKind::Ready, |_| println!("widget is live"));
//! ```

pub mod channel;
pub mod config;
pub mod emitter;
pub mod error;
pub mod fake_host;
pub mod handshake;
pub mod host;
pub mod session;
pub mod token;

/// Spacing between INIT handshake attempts.
pub const INIT_RETRY_INTERVAL_MS: u64 = 500;

/// INIT sends before the handshake fails with `COMM_INIT_TIMEOUT`.
pub const INIT_MAX_ATTEMPTS: u32 = 10;

/// Default navigation acknowledgement timeout, overridable per call.
pub const NAVIGATE_TIMEOUT_MS: u64 = 5000;

/// How long teardown waits for the logout acknowledgement.
pub const LOGOUT_TIMEOUT_MS: u64 = 2000;

/// Pause between discarding an expired session's frame and re-entering
/// the startup sequence.
pub const REINIT_DELAY_MS: u64 = 100;

pub use channel::MessageChannel;
pub use config::{
    ALLOWED_WIDGET_ORIGINS, BootstrapConfig, ConfigPatch, DEFAULT_TOKEN_TIMEOUT_MS, TokenProvider,
    WidgetConfig,
};
pub use emitter::{EventEmitter, EventKind, ListenerId};
pub use error::{ErrorCode, Result, WidgetError};
pub use handshake::NavigateOptions;
pub use host::{
    FrameHandle, FrameHost, FrameSpec, HostError, InboundMessage, MANAGED_FRAME_MARKER,
    TOKEN_QUERY_PARAM,
};
pub use session::{DestroyOptions, LifecycleState, OpenOptions, WidgetSession};

pub use widget_protocol as protocol;
