//! Token endpoint resolution against a real HTTP server.

use std::sync::Arc;
use std::time::Duration;

use axum::{Json, Router, http::HeaderMap, http::StatusCode, routing::get, routing::post};
use parking_lot::Mutex;
use serde_json::{Value, json};
use widget::fake_host::FakeFrameHost;
use widget::{BootstrapConfig, EventKind, LifecycleState, WidgetConfig, WidgetSession};

const ORIGIN: &str = "https://console.pixelbin.io";

async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

async fn wait_for(mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within 5s");
}

fn record_errors(session: &WidgetSession) -> Arc<Mutex<Vec<Value>>> {
    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&errors);
    session.on(EventKind::Error, move |payload| sink.lock().push(payload.clone()));
    errors
}

#[tokio::test]
async fn get_endpoint_token_lands_on_the_frame_url() {
    let base = serve(Router::new().route(
        "/token",
        get(|| async { Json(json!({"token": "tk_http"})) }),
    ))
    .await;

    let host = FakeFrameHost::new();
    let _session = WidgetSession::connect(
        WidgetConfig::new("#widget-root", ORIGIN)
            .with_bootstrap(BootstrapConfig::new().with_endpoint(format!("{base}/token"))),
        Arc::new(host.clone()),
    )
    .unwrap();

    let probe = host.clone();
    wait_for(move || probe.frame_count() == 1).await;

    let frame = host.current_frame().unwrap();
    let spec = host.spec_of(&frame).unwrap();
    assert!(spec.url.contains("btToken=tk_http"), "url: {}", spec.url);
}

#[tokio::test]
async fn post_endpoint_forwards_headers_and_serialized_payload() {
    let captured: Arc<Mutex<Option<(String, String)>>> = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&captured);

    let app = Router::new().route(
        "/token",
        post(move |headers: HeaderMap, body: String| {
            let sink = Arc::clone(&sink);
            async move {
                let key = headers
                    .get("x-integrator-key")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                *sink.lock() = Some((key, body));
                Json(json!({"token": "tk_post"}))
            }
        }),
    );
    let base = serve(app).await;

    let mut bootstrap = BootstrapConfig::new()
        .with_endpoint(format!("{base}/token"))
        .with_method("POST");
    bootstrap.payload = Some(json!({"shop": 42}));
    bootstrap
        .headers
        .insert("x-integrator-key".to_string(), "sekret".to_string());

    let host = FakeFrameHost::new();
    let _session = WidgetSession::connect(
        WidgetConfig::new("#widget-root", ORIGIN).with_bootstrap(bootstrap),
        Arc::new(host.clone()),
    )
    .unwrap();

    let probe = host.clone();
    wait_for(move || probe.frame_count() == 1).await;

    let frame = host.current_frame().unwrap();
    assert!(host.spec_of(&frame).unwrap().url.contains("btToken=tk_post"));

    let captured = captured.lock().clone().expect("endpoint should be hit");
    assert_eq!(captured.0, "sekret");
    assert_eq!(captured.1, r#"{"shop":42}"#);
}

#[tokio::test]
async fn string_payload_passes_through_verbatim() {
    let captured: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&captured);

    let app = Router::new().route(
        "/token",
        post(move |body: String| {
            let sink = Arc::clone(&sink);
            async move {
                *sink.lock() = Some(body);
                Json(json!({"token": "tk_raw"}))
            }
        }),
    );
    let base = serve(app).await;

    let mut bootstrap = BootstrapConfig::new()
        .with_endpoint(format!("{base}/token"))
        .with_method("POST");
    bootstrap.payload = Some(Value::String("shop=42&mode=trial".to_string()));

    let host = FakeFrameHost::new();
    let _session = WidgetSession::connect(
        WidgetConfig::new("#widget-root", ORIGIN).with_bootstrap(bootstrap),
        Arc::new(host.clone()),
    )
    .unwrap();

    let probe = host.clone();
    wait_for(move || probe.frame_count() == 1).await;
    assert_eq!(captured.lock().clone().unwrap(), "shop=42&mode=trial");
}

#[tokio::test]
async fn failing_endpoint_surfaces_a_recoverable_error_and_mounts_nothing() {
    let base = serve(Router::new().route(
        "/token",
        get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "nope") }),
    ))
    .await;

    let host = FakeFrameHost::new();
    let session = WidgetSession::connect(
        WidgetConfig::new("#widget-root", ORIGIN)
            .with_bootstrap(BootstrapConfig::new().with_endpoint(format!("{base}/token"))),
        Arc::new(host.clone()),
    )
    .unwrap();
    let errors = record_errors(&session);

    let probe = Arc::clone(&errors);
    wait_for(move || !probe.lock().is_empty()).await;

    let errors = errors.lock();
    assert_eq!(errors[0]["code"], "AUTH_ENDPOINT_FAILED");
    assert_eq!(errors[0]["context"]["status"], 500);
    assert_eq!(host.frame_count(), 0);
    // Auth failures are never fatal.
    assert_ne!(session.state(), LifecycleState::Destroyed);
}

#[tokio::test]
async fn endpoint_without_token_field_is_rejected() {
    let base = serve(Router::new().route(
        "/token",
        get(|| async { Json(json!({"ok": true})) }),
    ))
    .await;

    let host = FakeFrameHost::new();
    let session = WidgetSession::connect(
        WidgetConfig::new("#widget-root", ORIGIN)
            .with_bootstrap(BootstrapConfig::new().with_endpoint(format!("{base}/token"))),
        Arc::new(host.clone()),
    )
    .unwrap();
    let errors = record_errors(&session);

    let probe = Arc::clone(&errors);
    wait_for(move || !probe.lock().is_empty()).await;

    assert_eq!(errors.lock()[0]["code"], "AUTH_ENDPOINT_NO_TOKEN");
    assert_eq!(host.frame_count(), 0);
}

#[tokio::test]
async fn pre_supplied_token_skips_the_endpoint_entirely() {
    let hits = Arc::new(Mutex::new(0u32));
    let sink = Arc::clone(&hits);
    let app = Router::new().route(
        "/token",
        get(move || {
            let sink = Arc::clone(&sink);
            async move {
                *sink.lock() += 1;
                Json(json!({"token": "tk_never"}))
            }
        }),
    );
    let base = serve(app).await;

    let host = FakeFrameHost::new();
    let _session = WidgetSession::connect(
        WidgetConfig::new("#widget-root", ORIGIN).with_bootstrap(
            BootstrapConfig::new()
                .with_token("tk_cached")
                .with_endpoint(format!("{base}/token")),
        ),
        Arc::new(host.clone()),
    )
    .unwrap();

    let probe = host.clone();
    wait_for(move || probe.frame_count() == 1).await;

    let frame = host.current_frame().unwrap();
    assert!(host.spec_of(&frame).unwrap().url.contains("btToken=tk_cached"));
    assert_eq!(*hits.lock(), 0);
}
