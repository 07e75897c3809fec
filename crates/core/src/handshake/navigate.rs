//! Navigation handshake: one in-flight request correlated to its
//! acknowledgement or timeout, exposed as an awaitable contract.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use widget_protocol::{Command, NavigatePayload};

use crate::NAVIGATE_TIMEOUT_MS;
use crate::error::{ErrorCode, Result, WidgetError};

use super::PostFn;

/// Options for a navigation request.
#[derive(Debug, Clone, Default)]
pub struct NavigateOptions {
    pub widget_type: Option<String>,
    pub path: Option<String>,
    pub params: Option<Value>,
    /// Per-call override of the acknowledgement timeout.
    pub timeout_ms: Option<u64>,
}

struct PendingNavigate {
    ack: oneshot::Sender<Result<Value>>,
    timer: JoinHandle<()>,
}

/// Only one navigation may be outstanding at a time.
#[derive(Clone)]
pub struct NavigateHandshake {
    pending: Arc<Mutex<Option<PendingNavigate>>>,
    post: PostFn,
}

impl NavigateHandshake {
    pub fn new(post: PostFn) -> Self {
        Self {
            pending: Arc::new(Mutex::new(None)),
            post,
        }
    }

    /// Arms the handshake: claims the pending slot, sends NAVIGATE, and
    /// starts the acknowledgement timer. A second arm while one is
    /// outstanding fails the new contract immediately without disturbing
    /// the first.
    pub fn arm(&self, options: NavigateOptions, ack: oneshot::Sender<Result<Value>>) {
        let timeout_ms = options.timeout_ms.unwrap_or(NAVIGATE_TIMEOUT_MS);
        let payload = NavigatePayload {
            widget_type: options.widget_type,
            path: options.path,
            params: options.params,
        };

        {
            let mut pending = self.pending.lock();
            if pending.is_some() {
                drop(pending);
                let _ = ack.send(Err(WidgetError::new(ErrorCode::RuntimeNavigatePending)));
                return;
            }

            let slot = Arc::clone(&self.pending);
            let timer = tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(timeout_ms)).await;
                if let Some(expired) = slot.lock().take() {
                    warn!(target: "widget.handshake", "navigate acknowledgement timed out");
                    let _ = expired.ack.send(Err(WidgetError::with_context(
                        ErrorCode::CommNavigateTimeout,
                        serde_json::json!({"timeoutMs": timeout_ms}),
                    )));
                }
            });
            *pending = Some(PendingNavigate { ack, timer });
        }

        (self.post.as_ref())(Command::Navigate(payload));
    }

    /// Completes the outstanding contract from a NAVIGATED event. The
    /// payload rejects when it carries `error` or `success: false`.
    /// No-op when nothing is pending (acks are matched by type only, so
    /// a stray duplicate is indistinguishable from a late one).
    pub fn handle_ack(&self, payload: &Value) {
        let Some(pending) = self.pending.lock().take() else {
            return;
        };
        pending.timer.abort();

        let explicit_failure = payload.get("error").is_some()
            || payload.get("success").and_then(Value::as_bool) == Some(false);

        if explicit_failure {
            warn!(target: "widget.handshake", %payload, "navigation failed");
            let message = payload
                .get("error")
                .or_else(|| payload.get("message"))
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .unwrap_or_else(|| ErrorCode::CommNavigateFailed.message().to_string());
            let _ = pending.ack.send(Err(WidgetError::with_message(
                ErrorCode::CommNavigateFailed,
                message,
            )
            .context(payload.clone())));
        } else {
            debug!(target: "widget.handshake", "navigation acknowledged");
            let _ = pending.ack.send(Ok(payload.clone()));
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.lock().is_some()
    }

    /// Teardown: rejects any outstanding contract and clears the timer.
    pub fn cleanup(&self) {
        if let Some(pending) = self.pending.lock().take() {
            pending.timer.abort();
            let _ = pending
                .ack
                .send(Err(WidgetError::new(ErrorCode::RuntimeDestroyed)));
        }
    }
}
