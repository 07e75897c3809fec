//! Frame host interface.
//!
//! Mount-target resolution, frame construction/styling, and raw message
//! delivery are external collaborators: the embedder implements
//! [`FrameHost`] against its environment and the session drives frames
//! only through this trait. All methods are synchronous; frame mutation
//! and message posting do not block in a host environment.
//!
//! The crate ships [`FakeFrameHost`] for tests.
//!
//! [`FakeFrameHost`]: crate::fake_host::FakeFrameHost

use std::collections::BTreeMap;

use serde_json::Value;
use tokio::sync::mpsc;
use url::Url;

use crate::config::WidgetConfig;
use crate::error::{ErrorCode, Result, WidgetError};

/// Marker attribute identifying frames managed by this client. The
/// duplicate-mount guard looks for it.
pub const MANAGED_FRAME_MARKER: &str = "data-widget-sdk";

/// Query parameter carrying the bootstrap token on the frame URL. The
/// token never travels through the message channel.
pub const TOKEN_QUERY_PARAM: &str = "btToken";

/// Sandbox tokens applied to every widget frame.
pub const SANDBOX_TOKENS: &[&str] = &[
    "allow-scripts",
    "allow-forms",
    "allow-popups",
    "allow-same-origin",
];

/// Opaque identifier for a mounted frame, assigned by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameHandle(pub u64);

/// Everything the host needs to construct and mount a widget frame.
#[derive(Debug, Clone)]
pub struct FrameSpec {
    pub mount_point: String,
    pub url: String,
    pub sandbox: Vec<String>,
    /// Feature allow-list granted to the frame.
    pub allow: Vec<String>,
    pub style: BTreeMap<String, String>,
    /// Data attributes to stamp on the frame element, including the
    /// managed-frame marker.
    pub attributes: BTreeMap<String, String>,
    /// Frames start hidden; OPENED/CLOSED events toggle visibility.
    pub visible: bool,
}

impl FrameSpec {
    /// Builds the spec for a session's frame. `token` is the resolved
    /// bootstrap token, appended as a query parameter when present.
    pub fn from_config(config: &WidgetConfig, token: Option<&str>) -> Result<Self> {
        let mut attributes = BTreeMap::new();
        attributes.insert(MANAGED_FRAME_MARKER.to_string(), "true".to_string());
        if let Some(widget_type) = &config.params.widget_type {
            attributes.insert("data-widget-type".to_string(), widget_type.clone());
        }
        if let Some(embed_id) = &config.embed_id {
            attributes.insert("data-embed-id".to_string(), embed_id.clone());
        }

        Ok(Self {
            mount_point: config.mount_point.clone(),
            url: build_frame_url(config, token)?,
            sandbox: SANDBOX_TOKENS.iter().map(|t| t.to_string()).collect(),
            allow: config.allowed_frame_features.clone(),
            style: config.style.clone(),
            attributes,
            visible: false,
        })
    }
}

/// A message delivered by the host from some frame. The session discards
/// anything whose source or origin does not match its own frame.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub source: FrameHandle,
    pub origin: String,
    pub data: Value,
}

pub type InboundReceiver = mpsc::UnboundedReceiver<InboundMessage>;
pub type InboundSender = mpsc::UnboundedSender<InboundMessage>;

/// Failures reported by the host. The session maps these onto its own
/// error taxonomy.
#[derive(Debug, Clone, thiserror::Error)]
pub enum HostError {
    #[error("mount point not found: {0}")]
    MountNotFound(String),
    #[error("frame is detached")]
    FrameDetached,
    #[error("{0}")]
    Other(String),
}

/// The environment-side collaborator that owns real frames.
pub trait FrameHost: Send + Sync + 'static {
    /// Origin of the embedding document, carried in the INIT payload.
    fn parent_origin(&self) -> String;

    /// Whether a managed frame already exists at `mount_point`.
    /// Best-effort duplicate guard; not a cross-instance lock.
    fn has_managed_frame(&self, mount_point: &str) -> bool;

    /// Constructs and mounts a frame, returning its handle and a fresh
    /// inbound message stream scoped to this mount.
    fn mount(
        &self,
        spec: FrameSpec,
    ) -> std::result::Result<(FrameHandle, InboundReceiver), HostError>;

    /// Removes the frame. Safe to call for an already-removed frame.
    fn unmount(&self, frame: &FrameHandle);

    fn set_visible(&self, frame: &FrameHandle, visible: bool);

    /// Whether the frame still has a live counterparty window.
    fn is_attached(&self, frame: &FrameHandle) -> bool;

    /// Posts an envelope to the frame, scoped to exactly `target_origin`.
    fn post(
        &self,
        frame: &FrameHandle,
        envelope: &Value,
        target_origin: &str,
    ) -> std::result::Result<(), HostError>;
}

/// Builds the frame URL: exact origin + route path + query parameters
/// from the navigation params, the embed id, and - only when a bootstrap
/// token was resolved - the fixed token parameter.
pub fn build_frame_url(config: &WidgetConfig, token: Option<&str>) -> Result<String> {
    let origin = config.widget_origin.trim_end_matches('/');
    if !origin.starts_with("https://") && !origin.starts_with("http://") {
        return Err(WidgetError::with_context(
            ErrorCode::RuntimeInvalidUrl,
            Value::String(config.widget_origin.clone()),
        ));
    }

    let route = &config.route_path;
    let path = if route.is_empty() {
        String::new()
    } else if route.starts_with('/') {
        route.clone()
    } else {
        format!("/{route}")
    };

    let mut url = Url::parse(&format!("{origin}{path}")).map_err(|e| {
        WidgetError::with_message(ErrorCode::RuntimeInvalidUrl, e.to_string())
            .context(Value::String(config.widget_origin.clone()))
    })?;

    {
        let mut query = url.query_pairs_mut();
        for (key, value) in params_query_pairs(&config.params) {
            query.append_pair(&key, &value);
        }
        if let Some(embed_id) = &config.embed_id {
            query.append_pair("embedId", embed_id);
        }
        if let Some(token) = token {
            query.append_pair(TOKEN_QUERY_PARAM, token);
        }
    }

    Ok(url.into())
}

/// Flattens the params struct to query pairs, skipping nulls.
fn params_query_pairs(params: &widget_protocol::WidgetParams) -> Vec<(String, String)> {
    let Ok(Value::Object(map)) = serde_json::to_value(params) else {
        return Vec::new();
    };
    map.into_iter()
        .filter_map(|(key, value)| match value {
            Value::Null => None,
            Value::String(s) => Some((key, s)),
            other => Some((key, other.to_string())),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BootstrapConfig, WidgetConfig};
    use widget_protocol::WidgetParams;

    fn config() -> WidgetConfig {
        WidgetConfig::new("#widget-root", "https://console.pixelbin.io")
    }

    #[test]
    fn url_includes_route_and_params() {
        let url = build_frame_url(&config(), None).unwrap();
        let parsed = Url::parse(&url).unwrap();
        assert_eq!(parsed.origin().ascii_serialization(), "https://console.pixelbin.io");
        assert_eq!(parsed.path(), "/widget");
        assert!(url.contains("widgetType=ai-editor"));
        assert!(!url.contains(TOKEN_QUERY_PARAM));
    }

    #[test]
    fn token_appears_only_when_resolved() {
        let url = build_frame_url(&config(), Some("tk_secret")).unwrap();
        assert!(url.contains("btToken=tk_secret"));
    }

    #[test]
    fn embed_id_is_appended() {
        let url = build_frame_url(&config().with_embed_id("shop-42"), None).unwrap();
        assert!(url.contains("embedId=shop-42"));
    }

    #[test]
    fn trailing_slash_and_bare_route_are_normalized() {
        let mut cfg = WidgetConfig::new("#widget-root", "https://console.pixelbin.io/");
        cfg.route_path = "widget".to_string();
        let url = build_frame_url(&cfg, None).unwrap();
        assert!(url.starts_with("https://console.pixelbin.io/widget?"));
    }

    #[test]
    fn non_http_origin_is_rejected() {
        let cfg = WidgetConfig::new("#widget-root", "ftp://console.pixelbin.io");
        assert_eq!(
            build_frame_url(&cfg, None).unwrap_err().code,
            ErrorCode::RuntimeInvalidUrl
        );
    }

    #[test]
    fn extra_params_flow_into_query() {
        let mut params = WidgetParams::ai_editor();
        params.theme = Some("dark".to_string());
        params.extra = Some(serde_json::json!({"trial": true}));
        let cfg = config().with_params(params);
        let url = build_frame_url(&cfg, None).unwrap();
        assert!(url.contains("theme=dark"));
        assert!(url.contains("trial=true"));
    }

    #[test]
    fn spec_starts_hidden_with_sandbox_and_marker() {
        let cfg = config()
            .with_embed_id("shop-42")
            .with_bootstrap(BootstrapConfig::new().with_token("tk"));
        let spec = FrameSpec::from_config(&cfg, Some("tk")).unwrap();
        assert!(!spec.visible);
        assert_eq!(spec.sandbox.len(), SANDBOX_TOKENS.len());
        assert_eq!(spec.mount_point, "#widget-root");
        assert_eq!(
            spec.attributes.get(MANAGED_FRAME_MARKER).map(String::as_str),
            Some("true")
        );
        assert_eq!(
            spec.attributes.get("data-widget-type").map(String::as_str),
            Some("ai-editor")
        );
        assert_eq!(
            spec.attributes.get("data-embed-id").map(String::as_str),
            Some("shop-42")
        );
    }
}
