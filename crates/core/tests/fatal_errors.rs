//! Fatal-error classification and auto-teardown.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Value, json};
use widget::fake_host::FakeFrameHost;
use widget::host::FrameSpec;
use widget::protocol::event_types;
use widget::{
    BootstrapConfig, EventKind, FrameHost, LifecycleState, WidgetConfig, WidgetSession,
};

const ORIGIN: &str = "https://console.pixelbin.io";

fn config() -> WidgetConfig {
    WidgetConfig::new("#widget-root", ORIGIN)
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}

fn record(session: &WidgetSession, kind: EventKind) -> Arc<Mutex<Vec<Value>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    session.on(kind, move |payload| sink.lock().push(payload.clone()));
    events
}

async fn ready_session(config: WidgetConfig) -> (WidgetSession, FakeFrameHost) {
    let host = FakeFrameHost::new();
    let session = WidgetSession::connect(config, Arc::new(host.clone())).unwrap();
    settle().await;
    let frame = host.current_frame().unwrap();
    host.inject(&frame, event_types::READY, Value::Null);
    settle().await;
    (session, host)
}

#[tokio::test]
async fn duplicate_mount_is_fatal_and_tears_down() {
    let host = FakeFrameHost::new();
    // A managed frame already occupies the mount point.
    let occupying_spec = FrameSpec::from_config(&config(), None).unwrap();
    let (_existing, _rx) = host.mount(occupying_spec).unwrap();

    let session = WidgetSession::connect(config(), Arc::new(host.clone())).unwrap();
    let errors = record(&session, EventKind::Error);
    let destroys = record(&session, EventKind::Destroy);
    settle().await;

    let errors = errors.lock();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["code"], "CONFIG_DUPLICATE_INIT");
    assert_eq!(session.state(), LifecycleState::Destroyed);
    assert_eq!(destroys.lock().len(), 1);
    // No partial mutation: only the pre-existing frame remains.
    assert_eq!(host.frame_count(), 1);
}

#[tokio::test]
async fn auto_destroy_can_be_disabled() {
    let host = FakeFrameHost::new();
    let occupying_spec = FrameSpec::from_config(&config(), None).unwrap();
    let (_existing, _rx) = host.mount(occupying_spec).unwrap();

    let session = WidgetSession::connect(
        config().with_auto_destroy_on_fatal_error(false),
        Arc::new(host.clone()),
    )
    .unwrap();
    let destroys = record(&session, EventKind::Destroy);
    settle().await;

    assert_ne!(session.state(), LifecycleState::Destroyed);
    assert!(destroys.lock().is_empty());
}

#[tokio::test]
async fn auth_errors_never_trigger_teardown() {
    // Provider hands back an empty token: AUTH_TOKEN_INVALID.
    let host = FakeFrameHost::new();
    let session = WidgetSession::connect(
        config().with_bootstrap(
            BootstrapConfig::new().with_provider(|| Box::pin(async { Ok(String::new()) })),
        ),
        Arc::new(host.clone()),
    )
    .unwrap();
    let errors = record(&session, EventKind::Error);
    let destroys = record(&session, EventKind::Destroy);
    settle().await;

    let errors = errors.lock();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["code"], "AUTH_TOKEN_INVALID");
    // Auto-destroy is enabled by default, but auth failures stay
    // recoverable regardless.
    assert_ne!(session.state(), LifecycleState::Destroyed);
    assert!(destroys.lock().is_empty());
    assert_eq!(host.frame_count(), 0);
}

#[tokio::test]
async fn widget_error_event_with_fatal_code_tears_down() {
    let (session, host) = ready_session(config()).await;
    let errors = record(&session, EventKind::Error);
    let frame = host.current_frame().unwrap();

    host.inject(
        &frame,
        event_types::ERROR,
        json!({"code": "COMM_INIT_TIMEOUT", "message": "widget gave up"}),
    );
    settle().await;

    assert_eq!(errors.lock().len(), 1);
    assert_eq!(session.state(), LifecycleState::Destroyed);
}

#[tokio::test]
async fn widget_error_event_with_auth_code_is_recoverable() {
    let (session, host) = ready_session(config()).await;
    let errors = record(&session, EventKind::Error);
    let frame = host.current_frame().unwrap();

    host.inject(
        &frame,
        event_types::ERROR,
        json!({"code": "AUTH_TOKEN_INVALID"}),
    );
    settle().await;

    assert_eq!(errors.lock().len(), 1);
    assert_eq!(session.state(), LifecycleState::Ready);
}

#[tokio::test]
async fn explicit_fatal_flag_from_the_widget_wins() {
    let (session, host) = ready_session(config()).await;
    let frame = host.current_frame().unwrap();

    host.inject(
        &frame,
        event_types::ERROR,
        json!({"code": "AUTH_TOKEN_INVALID", "fatal": true}),
    );
    settle().await;

    assert_eq!(session.state(), LifecycleState::Destroyed);
}

#[tokio::test]
async fn widget_error_event_reaches_listeners_before_teardown() {
    let (session, host) = ready_session(config()).await;
    let frame = host.current_frame().unwrap();

    let state_at_error = Arc::new(Mutex::new(None));
    let observed = Arc::clone(&state_at_error);
    let probe = session.clone();
    session.on(EventKind::Error, move |_| {
        *observed.lock() = Some(probe.state());
    });

    host.inject(&frame, event_types::ERROR, json!({"code": "CONFIG_MISSING"}));
    settle().await;

    // The listener saw a live session; teardown came afterwards.
    assert_eq!(*state_at_error.lock(), Some(LifecycleState::Ready));
    assert_eq!(session.state(), LifecycleState::Destroyed);
}

#[tokio::test]
async fn post_failure_is_reported_and_not_fatal() {
    let (session, host) = ready_session(config()).await;
    let errors = record(&session, EventKind::Error);
    host.set_post_failure(true);

    session.open(widget::OpenOptions::default());
    settle().await;

    let errors = errors.lock();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["code"], "COMM_POST_FAILED");
    assert_eq!(session.state(), LifecycleState::Ready);
}
