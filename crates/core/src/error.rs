//! Error type and stable error codes.
//!
//! Every failure surfaced by the session carries a stable code, a
//! human-readable message, and a structured context value. Validation
//! errors are returned from [`WidgetSession::connect`]; everything after
//! construction is re-surfaced through the `error` event instead of being
//! thrown, so a single failure never silently stops the host's event loop.
//!
//! [`WidgetSession::connect`]: crate::session::WidgetSession::connect

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub type Result<T> = std::result::Result<T, WidgetError>;

/// Standardized error codes for programmatic handling.
///
/// Codes are grouped by prefix: `CONFIG_*` (always fatal), `AUTH_*`
/// (never automatically fatal - the integrator may retry with a fresh
/// token), `COMM_*`, `RUNTIME_*`, `NETWORK_*`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Configuration
    ConfigMissing,
    ConfigInvalidMount,
    ConfigInvalidOrigin,
    ConfigInvalidEmbedId,
    ConfigDuplicateInit,

    // Bootstrap / authentication
    AuthTokenMissing,
    AuthTokenInvalid,
    AuthTokenTimeout,
    AuthTokenSourceInvalid,
    AuthBootstrapEndpointInvalid,
    AuthBootstrapMethodInvalid,
    AuthEndpointFailed,
    AuthEndpointNoToken,

    // Communication
    CommInitTimeout,
    CommPostFailed,
    CommLogoutTimeout,
    CommNavigateTimeout,
    CommNavigateFailed,

    // Runtime
    RuntimeDestroyed,
    RuntimeNavigatePending,
    RuntimeInvalidUrl,

    // Network
    NetworkFetchFailed,

    Unknown,
}

/// Codes that imply the instance cannot continue functioning and should
/// be torn down. Auth codes are deliberately absent.
const FATAL_ERROR_CODES: &[ErrorCode] = &[
    ErrorCode::ConfigMissing,
    ErrorCode::ConfigInvalidMount,
    ErrorCode::ConfigInvalidOrigin,
    ErrorCode::ConfigInvalidEmbedId,
    ErrorCode::ConfigDuplicateInit,
    ErrorCode::CommInitTimeout,
];

impl ErrorCode {
    /// Canned user-facing message for this code.
    pub fn message(self) -> &'static str {
        match self {
            ErrorCode::ConfigMissing => "Configuration object is required",
            ErrorCode::ConfigInvalidMount => {
                "Invalid mount point: must name a target the frame host can resolve"
            }
            ErrorCode::ConfigInvalidOrigin => {
                "Invalid widget origin: must be an allowed origin URL"
            }
            ErrorCode::ConfigInvalidEmbedId => {
                "Invalid embed id format: must match pattern [A-Za-z0-9._-]{3,128}"
            }
            ErrorCode::ConfigDuplicateInit => "Widget already mounted on this mount point",
            ErrorCode::AuthTokenMissing => "Bootstrap token is required but not provided",
            ErrorCode::AuthTokenInvalid => "Bootstrap token is invalid or malformed",
            ErrorCode::AuthTokenTimeout => "Bootstrap token request timed out",
            ErrorCode::AuthTokenSourceInvalid => {
                "No valid token source configured (provide a provider or an endpoint)"
            }
            ErrorCode::AuthBootstrapEndpointInvalid => {
                "Bootstrap endpoint must be a valid URL string"
            }
            ErrorCode::AuthBootstrapMethodInvalid => "Bootstrap method must be GET or POST",
            ErrorCode::AuthEndpointFailed => "Token endpoint request failed",
            ErrorCode::AuthEndpointNoToken => "Token endpoint did not return a valid token",
            ErrorCode::CommInitTimeout => "Widget initialization handshake timed out",
            ErrorCode::CommPostFailed => "Failed to post message to the widget frame",
            ErrorCode::CommLogoutTimeout => "Widget logout acknowledgement timed out",
            ErrorCode::CommNavigateTimeout => "Widget navigation acknowledgement timed out",
            ErrorCode::CommNavigateFailed => "Widget navigation failed",
            ErrorCode::RuntimeDestroyed => "Widget has been destroyed",
            ErrorCode::RuntimeNavigatePending => "A navigation is already in progress",
            ErrorCode::RuntimeInvalidUrl => "Invalid URL format for widget origin",
            ErrorCode::NetworkFetchFailed => "Network request failed",
            ErrorCode::Unknown => "An unknown error occurred",
        }
    }

    /// Whether this code belongs to the fatal set.
    pub fn is_fatal(self) -> bool {
        FATAL_ERROR_CODES.contains(&self)
    }

    /// Parses a wire code string (e.g. from a `WIDGET_ERROR` payload).
    pub fn parse(code: &str) -> Option<Self> {
        serde_json::from_value(Value::String(code.to_string())).ok()
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Reuse the serde rename so Display and the wire agree.
        match serde_json::to_value(self) {
            Ok(Value::String(s)) => f.write_str(&s),
            _ => f.write_str("UNKNOWN"),
        }
    }
}

/// Structured session error: stable code, message, diagnostic context.
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize)]
#[error("[{code}] {message}")]
pub struct WidgetError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub context: Value,
}

impl WidgetError {
    /// An error with the canned message for `code` and no context.
    pub fn new(code: ErrorCode) -> Self {
        Self {
            code,
            message: code.message().to_string(),
            context: Value::Null,
        }
    }

    /// An error with the canned message and diagnostic context.
    pub fn with_context(code: ErrorCode, context: Value) -> Self {
        Self {
            code,
            message: code.message().to_string(),
            context,
        }
    }

    /// An error with a caller-supplied message.
    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: Value::Null,
        }
    }

    pub fn context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }

    pub fn is_fatal(&self) -> bool {
        self.code.is_fatal()
    }
}
