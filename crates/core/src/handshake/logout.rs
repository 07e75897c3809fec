//! Logout handshake run ahead of teardown.
//!
//! A best-effort courtesy to the widget: one LOGOUT, then either its
//! acknowledgement or the timeout completes the sequence. The two paths
//! are mutually exclusive - completion clears the pending flag under the
//! lock, and the timer fires at most once.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::warn;
use widget_protocol::{Command, LogoutPayload};

use crate::LOGOUT_TIMEOUT_MS;

use super::PostFn;

type CompleteCallback = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct LogoutState {
    pending: bool,
    timer: Option<JoinHandle<()>>,
    on_complete: Option<CompleteCallback>,
}

#[derive(Clone)]
pub struct LogoutHandshake {
    state: Arc<Mutex<LogoutState>>,
    post: PostFn,
}

impl LogoutHandshake {
    pub fn new(post: PostFn) -> Self {
        Self {
            state: Arc::new(Mutex::new(LogoutState::default())),
            post,
        }
    }

    /// Starts the logout sequence. Returns `false` without disturbing the
    /// first sequence when one is already pending.
    pub fn start<F>(&self, on_complete: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        {
            let mut state = self.state.lock();
            if state.pending {
                return false;
            }
            state.pending = true;
            state.on_complete = Some(Box::new(on_complete));

            let shared = Arc::clone(&self.state);
            state.timer = Some(tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(LOGOUT_TIMEOUT_MS)).await;
                let on_complete = {
                    let mut state = shared.lock();
                    if !state.pending {
                        return;
                    }
                    state.pending = false;
                    state.timer = None;
                    state.on_complete.take()
                };
                warn!(target: "widget.handshake", "logout acknowledgement timed out; completing anyway");
                if let Some(on_complete) = on_complete {
                    on_complete();
                }
            }));
        }

        (self.post.as_ref())(Command::Logout(LogoutPayload::destroy()));
        true
    }

    /// Completes the sequence from the widget's acknowledgement. No-op
    /// when no logout is pending.
    pub fn handle_ack(&self) {
        let on_complete = {
            let mut state = self.state.lock();
            if !state.pending {
                return;
            }
            state.pending = false;
            if let Some(timer) = state.timer.take() {
                timer.abort();
            }
            state.on_complete.take()
        };
        if let Some(on_complete) = on_complete {
            on_complete();
        }
    }

    pub fn is_pending(&self) -> bool {
        self.state.lock().pending
    }

    /// Cancels the timer and resets pending state. Idempotent.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        state.pending = false;
        state.on_complete = None;
    }
}
