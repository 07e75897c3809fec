//! Outbound command messages (host -> widget).

use serde::Serialize;
use serde_json::Value;

use crate::types::WidgetParams;

/// Command type strings as they appear on the wire.
pub mod command_types {
    pub const INIT: &str = "SDK_INIT";
    pub const OPEN: &str = "SDK_OPEN";
    pub const CLOSE: &str = "SDK_CLOSE";
    pub const NAVIGATE: &str = "SDK_NAVIGATE";
    pub const LOGOUT: &str = "SDK_LOGOUT";
}

/// A control command addressed to the widget frame.
///
/// Serializes to the tagged wire shape:
/// ```json
/// { "type": "SDK_NAVIGATE", "payload": { "widgetType": "image-editor" } }
/// ```
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload")]
pub enum Command {
    #[serde(rename = "SDK_INIT")]
    Init(InitPayload),
    #[serde(rename = "SDK_OPEN")]
    Open(OpenPayload),
    #[serde(rename = "SDK_CLOSE")]
    Close(ClosePayload),
    #[serde(rename = "SDK_NAVIGATE")]
    Navigate(NavigatePayload),
    #[serde(rename = "SDK_LOGOUT")]
    Logout(LogoutPayload),
}

impl Command {
    /// The wire type string for this command.
    pub fn kind(&self) -> &'static str {
        match self {
            Command::Init(_) => command_types::INIT,
            Command::Open(_) => command_types::OPEN,
            Command::Close(_) => command_types::CLOSE,
            Command::Navigate(_) => command_types::NAVIGATE,
            Command::Logout(_) => command_types::LOGOUT,
        }
    }
}

/// Payload of the INIT handshake command.
///
/// `token` is serialized as an explicit `null`: the bootstrap token is
/// carried exclusively on the frame URL, never through the message
/// channel.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitPayload {
    pub version: String,
    pub token: Option<String>,
    pub parent_origin: String,
    pub params: WidgetParams,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embed_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub widget_type: Option<String>,
}

/// CLOSE carries an empty payload object.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ClosePayload {}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigatePayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub widget_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogoutPayload {
    pub reason: String,
}

impl LogoutPayload {
    /// The logout sent ahead of teardown.
    pub fn destroy() -> Self {
        Self { reason: "destroy".to_string() }
    }
}

/// The full outbound envelope: command plus a per-send correlation id.
///
/// ```json
/// { "type": "SDK_OPEN", "payload": {}, "requestId": "w_4" }
/// ```
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundEnvelope {
    #[serde(flatten)]
    pub command: Command,
    pub request_id: String,
}
