//! Session controller.
//!
//! `WidgetSession` owns the full lifecycle of one embedded widget: it
//! validates configuration, resolves the bootstrap token, mounts the
//! frame through the host, drives the INIT handshake, classifies every
//! inbound event, escalates fatal errors, and tears the whole thing down
//! (after a logout handshake) on destroy. Session expiry discards the
//! frame and re-enters the startup sequence with a fresh token.
//!
//! Instances are created by [`WidgetSession::connect`]; there is no
//! process-wide state beyond the origin allow-list constant.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use widget_protocol::{
    ClosePayload, Command, InboundEnvelope, InitPayload, OpenPayload, PROTOCOL_VERSION,
    WidgetEvent,
};

use crate::REINIT_DELAY_MS;
use crate::channel::{ErrorSink, MessageChannel};
use crate::config::{ConfigPatch, WidgetConfig};
use crate::emitter::{EventEmitter, EventKind, ListenerId};
use crate::error::{ErrorCode, Result, WidgetError};
use crate::handshake::{InitHandshake, LogoutHandshake, NavigateHandshake, NavigateOptions, PostFn};
use crate::host::{FrameHandle, FrameHost, FrameSpec, InboundMessage};
use crate::token;

/// Overall lifecycle of a session. `Destroyed` is terminal; every other
/// operation becomes a no-op or an explicit error once it is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    AwaitingToken,
    AwaitingHandshake,
    Ready,
    Reinitializing,
    Destroyed,
}

/// Options for [`WidgetSession::open`].
#[derive(Debug, Clone, Default)]
pub struct OpenOptions {
    pub image_url: Option<String>,
    pub widget_type: Option<String>,
}

/// Options for [`WidgetSession::destroy`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DestroyOptions {
    /// Skip the logout handshake and tear down immediately.
    pub force: bool,
}

type QueuedAction = Box<dyn FnOnce() + Send>;

/// Handle to a live widget session. Cheap to clone; all clones drive the
/// same session.
#[derive(Clone)]
pub struct WidgetSession {
    shared: Arc<SessionShared>,
}

impl std::fmt::Debug for WidgetSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WidgetSession").finish_non_exhaustive()
    }
}

impl WidgetSession {
    /// Validates the configuration and starts the session.
    ///
    /// Validation failures are returned synchronously and nothing is
    /// mounted. Every later failure (token resolution, duplicate mount,
    /// handshake timeout) is re-surfaced through the `error` event
    /// instead. Must be called within a tokio runtime.
    pub fn connect(config: WidgetConfig, host: Arc<dyn FrameHost>) -> Result<Self> {
        config.validate()?;

        let shared = Arc::new_cyclic(|weak: &Weak<SessionShared>| {
            let post = make_post(weak.clone());
            let error_sink = make_error_sink(weak.clone());
            SessionShared {
                weak_self: weak.clone(),
                host,
                emitter: EventEmitter::new(),
                state: Mutex::new(LifecycleState::Uninitialized),
                config: Mutex::new(config),
                queue: Mutex::new(Vec::new()),
                channel: Mutex::new(None),
                frame: Mutex::new(None),
                recv_task: Mutex::new(None),
                init: InitHandshake::new(Arc::clone(&post), Arc::clone(&error_sink)),
                navigate: NavigateHandshake::new(Arc::clone(&post)),
                logout: LogoutHandshake::new(post),
                error_sink,
            }
        });

        let startup = Arc::clone(&shared);
        tokio::spawn(async move {
            startup.startup().await;
        });

        Ok(Self { shared })
    }

    pub fn state(&self) -> LifecycleState {
        *self.shared.state.lock()
    }

    /// Opens the widget. Queued until readiness when called early.
    pub fn open(&self, options: OpenOptions) {
        if self.shared.is_destroyed() {
            warn!(target: "widget.session", "open ignored: session destroyed");
            return;
        }
        self.shared.open_inner(options);
    }

    /// Requests CLOSE and hides the frame. Queued until readiness.
    pub fn close(&self) {
        if self.shared.is_destroyed() {
            warn!(target: "widget.session", "close ignored: session destroyed");
            return;
        }
        self.shared.close_inner();
    }

    /// Navigates the widget, resolving when the widget acknowledges.
    ///
    /// Deferred until readiness. Only one navigation may be outstanding;
    /// a second call fails immediately with `RUNTIME_NAVIGATE_PENDING`
    /// without disturbing the first.
    pub async fn navigate(&self, options: NavigateOptions) -> Result<Value> {
        if self.shared.is_destroyed() {
            return Err(WidgetError::new(ErrorCode::RuntimeDestroyed));
        }
        let (ack, result) = oneshot::channel();
        let navigate = self.shared.navigate.clone();
        self.shared.ensure_ready(Box::new(move || {
            navigate.arm(options, ack);
        }));
        match result.await {
            Ok(outcome) => outcome,
            // Sender dropped: the queue was cleared by teardown before
            // the navigation was ever armed.
            Err(_) => Err(WidgetError::new(ErrorCode::RuntimeDestroyed)),
        }
    }

    /// Applies a shallow-merge configuration patch.
    pub fn update_config(&self, patch: ConfigPatch) {
        self.shared.config.lock().apply(patch);
    }

    /// Destroys the session. Runs the logout handshake first unless
    /// forced or the frame is already gone. Idempotent: repeat calls
    /// (including while a logout is pending) are no-ops.
    pub fn destroy(&self, options: DestroyOptions) {
        self.shared.destroy_inner(options);
    }

    /// Registers an event listener.
    pub fn on<F>(&self, kind: EventKind, callback: F) -> ListenerId
    where
        F: FnMut(&Value) + Send + 'static,
    {
        self.shared.emitter.on(kind, callback)
    }

    /// Registers a one-shot event listener.
    pub fn once<F>(&self, kind: EventKind, callback: F) -> ListenerId
    where
        F: FnMut(&Value) + Send + 'static,
    {
        self.shared.emitter.once(kind, callback)
    }

    /// Removes an event listener.
    pub fn off(&self, kind: EventKind, id: ListenerId) {
        self.shared.emitter.off(kind, id);
    }
}

struct SessionShared {
    weak_self: Weak<SessionShared>,
    host: Arc<dyn FrameHost>,
    emitter: EventEmitter,
    state: Mutex<LifecycleState>,
    config: Mutex<WidgetConfig>,
    queue: Mutex<Vec<QueuedAction>>,
    channel: Mutex<Option<Arc<MessageChannel>>>,
    frame: Mutex<Option<FrameHandle>>,
    recv_task: Mutex<Option<JoinHandle<()>>>,
    init: InitHandshake,
    navigate: NavigateHandshake,
    logout: LogoutHandshake,
    error_sink: ErrorSink,
}

fn make_post(weak: Weak<SessionShared>) -> PostFn {
    Arc::new(move |command: Command| {
        if let Some(shared) = weak.upgrade() {
            shared.post(command);
        }
    })
}

fn make_error_sink(weak: Weak<SessionShared>) -> ErrorSink {
    Arc::new(move |error: WidgetError| {
        if let Some(shared) = weak.upgrade() {
            shared.emit_error(error, None);
        }
    })
}

impl SessionShared {
    fn is_destroyed(&self) -> bool {
        *self.state.lock() == LifecycleState::Destroyed
    }

    /// Moves to `next` unless the session is already destroyed.
    fn advance_state(&self, next: LifecycleState) -> bool {
        let mut state = self.state.lock();
        if *state == LifecycleState::Destroyed {
            return false;
        }
        *state = next;
        true
    }

    /// The startup sequence: resolve a token if a strategy is configured
    /// and none is cached, then mount the frame and run the INIT
    /// handshake. The token only ever reaches the widget via the frame
    /// URL.
    async fn startup(&self) {
        if self.is_destroyed() {
            return;
        }

        let (wants_resolution, cached) = {
            let config = self.config.lock();
            (
                config.bootstrap.wants_resolution(),
                config.bootstrap.token.clone(),
            )
        };

        let token = if cached.is_some() {
            cached
        } else if wants_resolution {
            if !self.advance_state(LifecycleState::AwaitingToken) {
                return;
            }
            let bootstrap = self.config.lock().bootstrap.clone();
            match token::resolve(&bootstrap).await {
                Ok(token) => {
                    self.config.lock().bootstrap.token = Some(token.clone());
                    Some(token)
                }
                Err(error) => {
                    warn!(target: "widget.session", %error, "token resolution failed");
                    // Bootstrap errors are never auto-fatal: the
                    // integrator may retry with a fresh token.
                    self.emit_error(error, Some(false));
                    return;
                }
            }
        } else {
            None
        };

        self.mount_and_init(token);
    }

    fn mount_and_init(&self, token: Option<String>) {
        if self.is_destroyed() {
            return;
        }
        let config = self.config.lock().clone();

        if self.host.has_managed_frame(&config.mount_point) {
            self.emit_error(
                WidgetError::with_context(
                    ErrorCode::ConfigDuplicateInit,
                    json!({"mountPoint": config.mount_point}),
                ),
                None,
            );
            return;
        }

        let spec = match FrameSpec::from_config(&config, token.as_deref()) {
            Ok(spec) => spec,
            Err(error) => {
                self.emit_error(error, None);
                return;
            }
        };

        let (frame, inbound) = match self.host.mount(spec) {
            Ok(mounted) => mounted,
            Err(e) => {
                self.emit_error(
                    WidgetError::with_message(ErrorCode::ConfigInvalidMount, e.to_string())
                        .context(json!({"mountPoint": config.mount_point})),
                    None,
                );
                return;
            }
        };
        info!(target: "widget.session", frame = frame.0, "frame mounted");

        let channel = Arc::new(MessageChannel::new(
            Arc::clone(&self.host),
            frame,
            config.widget_origin.clone(),
            config.debug,
            Arc::clone(&self.error_sink),
        ));
        *self.channel.lock() = Some(channel);
        *self.frame.lock() = Some(frame);

        if !self.advance_state(LifecycleState::AwaitingHandshake) {
            // Destroyed while mounting: release what was just created.
            *self.channel.lock() = None;
            if let Some(frame) = self.frame.lock().take() {
                self.host.unmount(&frame);
            }
            return;
        }

        let weak = self.weak_self.clone();
        let task = tokio::spawn(async move {
            let mut inbound = inbound;
            while let Some(message) = inbound.recv().await {
                let Some(shared) = weak.upgrade() else { break };
                shared.dispatch(message);
            }
        });
        if let Some(previous) = self.recv_task.lock().replace(task) {
            previous.abort();
        }

        let payload = InitPayload {
            version: PROTOCOL_VERSION.to_string(),
            token: None,
            parent_origin: self.host.parent_origin(),
            params: config.params.clone(),
            embed_id: config.embed_id.clone(),
        };
        let weak = self.weak_self.clone();
        self.init.start(payload, move || {
            if let Some(shared) = weak.upgrade() {
                shared.finish_init();
            }
        });
    }

    /// Classifies an inbound message by the fixed type table. Messages
    /// from the wrong frame or origin are discarded before parsing.
    fn dispatch(&self, message: InboundMessage) {
        let channel = self.channel.lock().as_ref().map(Arc::clone);
        let Some(channel) = channel else { return };
        if !channel.accepts(&message) {
            return;
        }
        let Ok(envelope) = serde_json::from_value::<InboundEnvelope>(message.data.clone()) else {
            return;
        };
        channel.log_receive(&message);

        match WidgetEvent::classify(envelope) {
            WidgetEvent::Ready(_) => self.init.handle_ready(),
            WidgetEvent::Opened(_) => {
                self.emitter.emit(EventKind::Open, &Value::Null);
                self.set_frame_visible(true);
            }
            WidgetEvent::Closed(_) => {
                self.emitter.emit(EventKind::Close, &Value::Null);
                self.set_frame_visible(false);
            }
            WidgetEvent::Error(payload) => self.handle_widget_error(payload),
            WidgetEvent::Logout(payload) => {
                self.emitter.emit(EventKind::Logout, &payload);
                self.logout.handle_ack();
            }
            WidgetEvent::Navigated(payload) => {
                self.emitter.emit(EventKind::Navigate, &payload);
                self.navigate.handle_ack(&payload);
            }
            WidgetEvent::SessionExpired(payload) => self.handle_session_expired(payload),
            WidgetEvent::Unknown(kind) => {
                debug!(target: "widget.session", %kind, "ignoring unrecognized event");
            }
        }
    }

    /// READY landed: flush the queue exactly once, in FIFO order, then
    /// announce readiness.
    fn finish_init(&self) {
        let actions = {
            let mut state = self.state.lock();
            if *state == LifecycleState::Destroyed {
                return;
            }
            *state = LifecycleState::Ready;
            std::mem::take(&mut *self.queue.lock())
        };
        info!(target: "widget.session", queued = actions.len(), "widget ready");
        for action in actions {
            action();
        }
        self.emitter.emit(EventKind::Ready, &Value::Null);
        let autostart = self.config.lock().autostart;
        if autostart {
            self.open_inner(OpenOptions::default());
        }
    }

    /// Runs `action` now when ready, otherwise queues it. Queued actions
    /// for a destroyed session are dropped.
    fn ensure_ready(&self, action: QueuedAction) {
        let state = self.state.lock();
        match *state {
            LifecycleState::Ready => {
                drop(state);
                action();
            }
            LifecycleState::Destroyed => {}
            _ => self.queue.lock().push(action),
        }
    }

    fn open_inner(&self, options: OpenOptions) {
        let weak = self.weak_self.clone();
        self.ensure_ready(Box::new(move || {
            if let Some(shared) = weak.upgrade() {
                shared.post(Command::Open(OpenPayload {
                    image_url: options.image_url,
                    widget_type: options.widget_type,
                }));
            }
        }));
    }

    fn close_inner(&self) {
        let weak = self.weak_self.clone();
        self.ensure_ready(Box::new(move || {
            if let Some(shared) = weak.upgrade() {
                shared.post(Command::Close(ClosePayload::default()));
                shared.set_frame_visible(false);
            }
        }));
    }

    fn post(&self, command: Command) {
        if self.is_destroyed() {
            return;
        }
        let channel = self.channel.lock().as_ref().map(Arc::clone);
        if let Some(channel) = channel {
            channel.send(command);
        }
    }

    fn set_frame_visible(&self, visible: bool) {
        let frame = *self.frame.lock();
        if let Some(frame) = frame {
            self.host.set_visible(&frame, visible);
        }
    }

    /// Emits an `error` event for an inbound `WIDGET_ERROR` and evaluates
    /// fatality: an explicit `fatal` flag from the widget wins, otherwise
    /// the payload code is checked against the fatal set.
    fn handle_widget_error(&self, payload: Value) {
        let payload = if payload.is_null() { json!({}) } else { payload };
        self.emitter.emit(EventKind::Error, &payload);

        let flagged = payload.get("fatal").and_then(Value::as_bool);
        let code = payload
            .get("code")
            .and_then(Value::as_str)
            .and_then(ErrorCode::parse);
        let fatal = flagged.unwrap_or_else(|| code.is_some_and(|c| c.is_fatal()));
        if fatal {
            self.schedule_fatal_teardown(code);
        }
    }

    /// Emits an `error` event for an internally raised error and tears
    /// the session down when the error is fatal (unless auto-destroy is
    /// disabled). `fatal_override` short-circuits code-based detection.
    fn emit_error(&self, error: WidgetError, fatal_override: Option<bool>) {
        let payload =
            serde_json::to_value(&error).unwrap_or_else(|_| json!({"code": "UNKNOWN"}));
        self.emitter.emit(EventKind::Error, &payload);

        let fatal = fatal_override.unwrap_or_else(|| error.is_fatal());
        if fatal {
            self.schedule_fatal_teardown(Some(error.code));
        }
    }

    /// Teardown is deferred one tick: the `error` event has already been
    /// delivered synchronously, but anything the current call stack still
    /// has to do happens before the instance disappears.
    fn schedule_fatal_teardown(&self, code: Option<ErrorCode>) {
        let auto_destroy = self.config.lock().auto_destroy_on_fatal_error;
        if !auto_destroy || self.is_destroyed() {
            return;
        }
        warn!(
            target: "widget.session",
            code = %code.map(|c| c.to_string()).unwrap_or_default(),
            "fatal error; tearing down"
        );
        let weak = self.weak_self.clone();
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            if let Some(shared) = weak.upgrade() {
                shared.finish_destroy();
            }
        });
    }

    /// Session expiry: discard the frame and listener, drop the cached
    /// token so the next startup fetches a fresh one, and re-enter the
    /// startup sequence after a short delay. Re-entrancy guarded.
    fn handle_session_expired(&self, payload: Value) {
        {
            let mut state = self.state.lock();
            if matches!(
                *state,
                LifecycleState::Destroyed | LifecycleState::Reinitializing
            ) {
                return;
            }
            *state = LifecycleState::Reinitializing;
        }
        warn!(target: "widget.session", %payload, "session expired; reinitializing");

        self.queue.lock().clear();
        self.init.clear();
        if let Some(task) = self.recv_task.lock().take() {
            task.abort();
        }
        *self.channel.lock() = None;
        if let Some(frame) = self.frame.lock().take() {
            self.host.unmount(&frame);
        }
        self.config.lock().bootstrap.token = None;

        let weak = self.weak_self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(REINIT_DELAY_MS)).await;
            let Some(shared) = weak.upgrade() else { return };
            if !shared.advance_state(LifecycleState::Uninitialized) {
                return;
            }
            shared.startup().await;
        });
    }

    fn destroy_inner(&self, options: DestroyOptions) {
        if self.is_destroyed() {
            return;
        }

        let frame_alive = {
            let frame = self.frame.lock();
            frame
                .as_ref()
                .map(|frame| self.host.is_attached(frame))
                .unwrap_or(false)
        };

        if options.force || !frame_alive {
            self.finish_destroy();
            return;
        }

        // `start` refuses while a logout is already pending, which makes
        // a concurrent destroy a no-op.
        let weak = self.weak_self.clone();
        let _ = self.logout.start(move || {
            if let Some(shared) = weak.upgrade() {
                shared.finish_destroy();
            }
        });
    }

    /// Terminal teardown. Runs once: marks destroyed, clears the queue
    /// and all three handshakes, detaches the inbound loop, removes the
    /// frame, and emits `destroy`.
    fn finish_destroy(&self) {
        {
            let mut state = self.state.lock();
            if *state == LifecycleState::Destroyed {
                return;
            }
            *state = LifecycleState::Destroyed;
        }
        self.queue.lock().clear();
        self.init.clear();
        self.logout.clear();
        self.navigate.cleanup();
        if let Some(task) = self.recv_task.lock().take() {
            task.abort();
        }
        *self.channel.lock() = None;
        if let Some(frame) = self.frame.lock().take() {
            self.host.unmount(&frame);
        }
        info!(target: "widget.session", "session destroyed");
        self.emitter.emit(EventKind::Destroy, &Value::Null);
    }
}
