use serde::{Deserialize, Serialize};

/// Navigation parameters appended to the frame URL and echoed in INIT.
///
/// `widget_type` selects which widget surface the frame boots into
/// (e.g. `"ai-editor"`, `"image-editor"`). Unrecognized keys supplied by
/// the integrator are preserved through `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub widget_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

impl WidgetParams {
    /// Params for the default widget surface.
    pub fn ai_editor() -> Self {
        Self {
            widget_type: Some("ai-editor".to_string()),
            ..Self::default()
        }
    }
}
