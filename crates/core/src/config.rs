//! Session configuration, defaults, and construction-time validation.

use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

use futures_util::future::BoxFuture;
use regex::Regex;
use serde_json::{Value, json};
use widget_protocol::WidgetParams;

use crate::error::{ErrorCode, Result, WidgetError};

/// Origins the widget frame may be served from. Exact string match; no
/// wildcards.
pub const ALLOWED_WIDGET_ORIGINS: &[&str] = &[
    "https://console.pixelbin.io",
    "https://console.pixelbinz0.de",
];

/// Route appended to the widget origin when building the frame URL.
pub const DEFAULT_ROUTE_PATH: &str = "/widget";

/// Frame features granted to the widget by default.
pub const DEFAULT_FRAME_FEATURES: &[&str] = &[
    "clipboard-read",
    "clipboard-write",
    "camera",
    "microphone",
    "geolocation",
    "fullscreen",
    "web-share",
    "autoplay",
    "display-capture",
];

/// Default bootstrap token retrieval timeout.
pub const DEFAULT_TOKEN_TIMEOUT_MS: u64 = 10_000;

static EMBED_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._-]{3,128}$").expect("embed id pattern compiles"));

/// Caller-supplied async token source. The integrator calls their own
/// backend with their own auth and hands back a short-lived bootstrap
/// token.
pub type TokenProvider = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<String>> + Send + Sync>;

/// How the bootstrap token is obtained. Exactly one path is taken:
/// a pre-supplied token wins and skips resolution entirely, otherwise the
/// provider runs, otherwise the endpoint is fetched.
#[derive(Clone, Default)]
pub struct BootstrapConfig {
    /// Pre-fetched token, if the integrator already has one.
    pub token: Option<String>,
    /// Async provider function.
    pub provider: Option<TokenProvider>,
    /// Fallback: URL on the integrator's server that returns `{"token": ...}`.
    pub endpoint: Option<String>,
    /// HTTP method for the endpoint. GET or POST only.
    pub method: String,
    /// Extra headers for the endpoint request.
    pub headers: BTreeMap<String, String>,
    /// Request body for POST endpoint calls. String values pass through
    /// verbatim; anything else is JSON-serialized.
    pub payload: Option<Value>,
    /// Token retrieval timeout in milliseconds. Zero disables the timeout.
    pub timeout_ms: u64,
}

impl BootstrapConfig {
    pub fn new() -> Self {
        Self {
            token: None,
            provider: None,
            endpoint: None,
            method: "GET".to_string(),
            headers: BTreeMap::new(),
            payload: None,
            timeout_ms: DEFAULT_TOKEN_TIMEOUT_MS,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_provider<F>(mut self, provider: F) -> Self
    where
        F: Fn() -> BoxFuture<'static, anyhow::Result<String>> + Send + Sync + 'static,
    {
        self.provider = Some(Arc::new(provider));
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Whether a resolution strategy is configured at all.
    pub fn wants_resolution(&self) -> bool {
        self.provider.is_some() || self.endpoint.as_deref().is_some_and(|e| !e.is_empty())
    }
}

impl std::fmt::Debug for BootstrapConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BootstrapConfig")
            .field("token", &self.token.as_deref().map(|_| "[REDACTED]"))
            .field("provider", &self.provider.is_some())
            .field("endpoint", &self.endpoint)
            .field("method", &self.method)
            .field("headers", &self.headers)
            .field("payload", &self.payload)
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

/// Immutable-after-validation session configuration.
///
/// Built once, validated by [`WidgetSession::connect`], and afterwards
/// only replaceable through [`ConfigPatch`] (shallow merge, later keys
/// win).
///
/// [`WidgetSession::connect`]: crate::session::WidgetSession::connect
#[derive(Debug, Clone)]
pub struct WidgetConfig {
    /// Key the frame host resolves to a mount target.
    pub mount_point: String,
    /// Exact frame origin, e.g. `https://console.pixelbin.io`.
    pub widget_origin: String,
    /// Optional public identifier for the integration.
    pub embed_id: Option<String>,
    /// Query params appended to the frame URL and echoed in INIT.
    pub params: WidgetParams,
    /// Open automatically after READY.
    pub autostart: bool,
    /// Tear the session down automatically on fatal errors.
    pub auto_destroy_on_fatal_error: bool,
    /// Features granted to the frame.
    pub allowed_frame_features: Vec<String>,
    /// Inline style overrides for the frame.
    pub style: BTreeMap<String, String>,
    /// Log every send/receive.
    pub debug: bool,
    /// Route appended to the origin.
    pub route_path: String,
    pub bootstrap: BootstrapConfig,
}

impl WidgetConfig {
    pub fn new(mount_point: impl Into<String>, widget_origin: impl Into<String>) -> Self {
        Self {
            mount_point: mount_point.into(),
            widget_origin: widget_origin.into(),
            embed_id: None,
            params: WidgetParams::ai_editor(),
            autostart: false,
            auto_destroy_on_fatal_error: true,
            allowed_frame_features: DEFAULT_FRAME_FEATURES
                .iter()
                .map(|f| f.to_string())
                .collect(),
            style: default_style(),
            debug: false,
            route_path: DEFAULT_ROUTE_PATH.to_string(),
            bootstrap: BootstrapConfig::new(),
        }
    }

    pub fn with_embed_id(mut self, embed_id: impl Into<String>) -> Self {
        self.embed_id = Some(embed_id.into());
        self
    }

    pub fn with_params(mut self, params: WidgetParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_autostart(mut self, autostart: bool) -> Self {
        self.autostart = autostart;
        self
    }

    pub fn with_auto_destroy_on_fatal_error(mut self, enabled: bool) -> Self {
        self.auto_destroy_on_fatal_error = enabled;
        self
    }

    pub fn with_bootstrap(mut self, bootstrap: BootstrapConfig) -> Self {
        self.bootstrap = bootstrap;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Validates the configuration. All-or-nothing; the first violation
    /// wins and each violation carries a distinct code.
    pub fn validate(&self) -> Result<()> {
        if self.mount_point.trim().is_empty() {
            return Err(WidgetError::with_context(
                ErrorCode::ConfigInvalidMount,
                json!({"provided": self.mount_point}),
            ));
        }
        if self.widget_origin.is_empty()
            || !ALLOWED_WIDGET_ORIGINS.contains(&self.widget_origin.as_str())
        {
            return Err(WidgetError::with_context(
                ErrorCode::ConfigInvalidOrigin,
                json!({"provided": self.widget_origin, "allowed": ALLOWED_WIDGET_ORIGINS}),
            ));
        }
        if let Some(embed_id) = &self.embed_id {
            if !EMBED_ID_RE.is_match(embed_id) {
                return Err(WidgetError::with_context(
                    ErrorCode::ConfigInvalidEmbedId,
                    json!({"provided": embed_id, "pattern": EMBED_ID_RE.as_str()}),
                ));
            }
        }
        if let Some(endpoint) = &self.bootstrap.endpoint {
            if url::Url::parse(endpoint).is_err() {
                return Err(WidgetError::with_context(
                    ErrorCode::AuthBootstrapEndpointInvalid,
                    json!({"provided": endpoint}),
                ));
            }
        }
        let method = self.bootstrap.method.to_ascii_uppercase();
        if method != "GET" && method != "POST" {
            return Err(WidgetError::with_context(
                ErrorCode::AuthBootstrapMethodInvalid,
                json!({"provided": self.bootstrap.method, "allowed": ["GET", "POST"]}),
            ));
        }
        Ok(())
    }

    /// Applies a runtime patch. Shallow merge: a field present in the
    /// patch replaces the current value wholesale.
    pub fn apply(&mut self, patch: ConfigPatch) {
        if let Some(embed_id) = patch.embed_id {
            self.embed_id = Some(embed_id);
        }
        if let Some(params) = patch.params {
            self.params = params;
        }
        if let Some(autostart) = patch.autostart {
            self.autostart = autostart;
        }
        if let Some(auto_destroy) = patch.auto_destroy_on_fatal_error {
            self.auto_destroy_on_fatal_error = auto_destroy;
        }
        if let Some(features) = patch.allowed_frame_features {
            self.allowed_frame_features = features;
        }
        if let Some(style) = patch.style {
            self.style = style;
        }
        if let Some(debug) = patch.debug {
            self.debug = debug;
        }
        if let Some(route_path) = patch.route_path {
            self.route_path = route_path;
        }
        if let Some(bootstrap) = patch.bootstrap {
            self.bootstrap = bootstrap;
        }
    }
}

fn default_style() -> BTreeMap<String, String> {
    [
        ("position", "relative"),
        ("width", "100%"),
        ("height", "100%"),
        ("border", "0"),
        ("borderRadius", "12px"),
        ("display", "none"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// Runtime configuration patch. Identity fields (mount point, widget
/// origin) are fixed for the lifetime of a session and cannot be patched.
#[derive(Debug, Clone, Default)]
pub struct ConfigPatch {
    pub embed_id: Option<String>,
    pub params: Option<WidgetParams>,
    pub autostart: Option<bool>,
    pub auto_destroy_on_fatal_error: Option<bool>,
    pub allowed_frame_features: Option<Vec<String>>,
    pub style: Option<BTreeMap<String, String>>,
    pub debug: Option<bool>,
    pub route_path: Option<String>,
    pub bootstrap: Option<BootstrapConfig>,
}
