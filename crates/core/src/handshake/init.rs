//! Initialization handshake with bounded retry.
//!
//! The widget frame may not be listening yet when the first INIT goes
//! out, and the channel may drop messages - so the same INIT payload is
//! resent on a fixed interval until the widget's READY event lands or
//! the attempt budget is exhausted.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{debug, error};
use widget_protocol::{Command, InitPayload};

use crate::channel::ErrorSink;
use crate::error::{ErrorCode, WidgetError};
use crate::{INIT_MAX_ATTEMPTS, INIT_RETRY_INTERVAL_MS};

use super::PostFn;

type ReadyCallback = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct InitState {
    acked: bool,
    failed: bool,
    attempts: u32,
    retry: Option<JoinHandle<()>>,
    on_ready: Option<ReadyCallback>,
}

/// idle -> pending(attempt=n) -> acknowledged | failed
#[derive(Clone)]
pub struct InitHandshake {
    state: Arc<Mutex<InitState>>,
    post: PostFn,
    error_sink: ErrorSink,
}

impl InitHandshake {
    pub fn new(post: PostFn, error_sink: ErrorSink) -> Self {
        Self {
            state: Arc::new(Mutex::new(InitState::default())),
            post,
            error_sink,
        }
    }

    /// Starts (or restarts) the handshake. Resets the attempt counter and
    /// sends the first INIT immediately.
    pub fn start<F>(&self, payload: InitPayload, on_ready: F)
    where
        F: FnOnce() + Send + 'static,
    {
        {
            let mut state = self.state.lock();
            state.acked = false;
            state.failed = false;
            state.attempts = 0;
            state.on_ready = Some(Box::new(on_ready));
            if let Some(retry) = state.retry.take() {
                retry.abort();
            }
        }
        self.send_attempt(payload);
    }

    fn send_attempt(&self, payload: InitPayload) {
        let attempt = self.state.lock().attempts + 1;
        debug!(target: "widget.handshake", attempt, "INIT attempt");
        (self.post.as_ref())(Command::Init(payload.clone()));

        let mut state = self.state.lock();
        // Same-tick loopback: the ack may have been recorded while the
        // send was still on the stack.
        if state.acked {
            if let Some(retry) = state.retry.take() {
                retry.abort();
            }
            return;
        }

        state.attempts += 1;
        if state.attempts >= INIT_MAX_ATTEMPTS {
            state.failed = true;
            state.on_ready = None;
            if let Some(retry) = state.retry.take() {
                retry.abort();
            }
            drop(state);
            error!(target: "widget.handshake", "INIT handshake timed out");
            (self.error_sink.as_ref())(WidgetError::with_context(
                ErrorCode::CommInitTimeout,
                json!({"attempts": INIT_MAX_ATTEMPTS, "intervalMs": INIT_RETRY_INTERVAL_MS}),
            ));
            return;
        }

        let this = self.clone();
        state.retry = Some(tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(INIT_RETRY_INTERVAL_MS)).await;
            this.send_attempt(payload);
        }));
    }

    /// Records the READY acknowledgement: cancels the retry timer and
    /// invokes the success callback exactly once. Safe no-op after the
    /// handshake has already succeeded or failed.
    pub fn handle_ready(&self) {
        let on_ready = {
            let mut state = self.state.lock();
            if state.failed {
                return;
            }
            state.acked = true;
            if let Some(retry) = state.retry.take() {
                retry.abort();
            }
            state.on_ready.take()
        };
        if let Some(on_ready) = on_ready {
            on_ready();
        }
    }

    pub fn is_acknowledged(&self) -> bool {
        self.state.lock().acked
    }

    /// Cancels any outstanding retry timer. Idempotent.
    pub fn clear(&self) {
        if let Some(retry) = self.state.lock().retry.take() {
            retry.abort();
        }
    }
}
