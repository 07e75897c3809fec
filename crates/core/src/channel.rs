//! Message channel to the widget frame.
//!
//! Builds the correlated outbound envelope and posts it through the
//! frame host with a strict target origin - never a wildcard. The inbound
//! filter is the mirror image: a message is accepted only when its source
//! is the bound frame *and* its origin is exactly the configured origin.
//! Both checks are independent; one defends against a replaced frame, the
//! other against origin spoofing.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, warn};
use widget_protocol::{Command, OutboundEnvelope};

use crate::error::{ErrorCode, WidgetError};
use crate::host::{FrameHandle, FrameHost, InboundMessage};

/// Sink for errors that must not be thrown at the sender. A failed post
/// surfaces as an `error` event, not a synchronous failure.
pub type ErrorSink = Arc<dyn Fn(WidgetError) + Send + Sync>;

pub struct MessageChannel {
    host: Arc<dyn FrameHost>,
    frame: FrameHandle,
    origin: String,
    debug: bool,
    request_seq: AtomicU64,
    error_sink: ErrorSink,
}

impl MessageChannel {
    pub fn new(
        host: Arc<dyn FrameHost>,
        frame: FrameHandle,
        origin: String,
        debug: bool,
        error_sink: ErrorSink,
    ) -> Self {
        Self {
            host,
            frame,
            origin,
            debug,
            request_seq: AtomicU64::new(0),
            error_sink,
        }
    }

    pub fn frame(&self) -> FrameHandle {
        self.frame
    }

    /// Sends a command with a fresh correlation id.
    pub fn send(&self, command: Command) {
        let kind = command.kind();
        let request_id = format!("w_{}", self.request_seq.fetch_add(1, Ordering::Relaxed));
        let envelope = OutboundEnvelope { command, request_id };

        let value = match serde_json::to_value(&envelope) {
            Ok(value) => value,
            Err(e) => {
                warn!(target: "widget.channel", %kind, error = %e, "failed to encode envelope");
                (self.error_sink.as_ref())(WidgetError::with_context(
                    ErrorCode::CommPostFailed,
                    serde_json::json!({"type": kind, "cause": e.to_string()}),
                ));
                return;
            }
        };

        if self.debug {
            debug!(target: "widget.channel", origin = %self.origin, message = %value, "send");
        }

        if let Err(e) = self.host.post(&self.frame, &value, &self.origin) {
            warn!(target: "widget.channel", %kind, error = %e, "post failed");
            (self.error_sink.as_ref())(WidgetError::with_context(
                ErrorCode::CommPostFailed,
                serde_json::json!({"type": kind, "cause": e.to_string()}),
            ));
        }
    }

    /// Inbound filter: source frame and origin must both match.
    pub fn accepts(&self, message: &InboundMessage) -> bool {
        message.source == self.frame && message.origin == self.origin
    }

    /// Debug-logs an accepted inbound message.
    pub fn log_receive(&self, message: &InboundMessage) {
        if self.debug {
            debug!(target: "widget.channel", origin = %message.origin, data = %message.data, "receive");
        }
    }
}
