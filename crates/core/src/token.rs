//! Bootstrap token resolution.
//!
//! Exactly one strategy executes: a caller-supplied async provider, or an
//! HTTP fetch against the integrator's endpoint. The whole resolution is
//! bounded by a timeout; on expiry the in-flight call is abandoned, not
//! cancelled. The resolved token must be a non-empty string.

use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

use crate::config::BootstrapConfig;
use crate::error::{ErrorCode, Result, WidgetError};

/// Resolves a bootstrap token per the configured strategy.
pub async fn resolve(bootstrap: &BootstrapConfig) -> Result<String> {
    let token = if bootstrap.timeout_ms == 0 {
        resolve_inner(bootstrap).await?
    } else {
        tokio::time::timeout(
            Duration::from_millis(bootstrap.timeout_ms),
            resolve_inner(bootstrap),
        )
        .await
        .map_err(|_| {
            WidgetError::with_context(
                ErrorCode::AuthTokenTimeout,
                json!({"timeoutMs": bootstrap.timeout_ms}),
            )
        })??
    };

    if token.is_empty() {
        return Err(WidgetError::with_context(
            ErrorCode::AuthTokenInvalid,
            json!({"tokenValue": "[REDACTED]"}),
        ));
    }
    Ok(token)
}

async fn resolve_inner(bootstrap: &BootstrapConfig) -> Result<String> {
    if let Some(provider) = &bootstrap.provider {
        debug!(target: "widget.token", "resolving token via provider");
        return (provider.as_ref())()
            .await
            .map_err(|e| WidgetError::with_message(ErrorCode::Unknown, e.to_string()));
    }

    match bootstrap.endpoint.as_deref() {
        Some(endpoint) if !endpoint.is_empty() => fetch_token(bootstrap, endpoint).await,
        _ => Err(WidgetError::with_context(
            ErrorCode::AuthTokenSourceInvalid,
            json!({
                "hasProvider": bootstrap.provider.is_some(),
                "hasEndpoint": bootstrap.endpoint.is_some(),
            }),
        )),
    }
}

async fn fetch_token(bootstrap: &BootstrapConfig, endpoint: &str) -> Result<String> {
    let method = bootstrap.method.to_ascii_uppercase();
    if method != "GET" && method != "POST" {
        return Err(WidgetError::with_context(
            ErrorCode::AuthBootstrapMethodInvalid,
            json!({"provided": bootstrap.method, "allowed": ["GET", "POST"]}),
        ));
    }

    debug!(target: "widget.token", %endpoint, %method, "resolving token via endpoint");

    let client = reqwest::Client::builder().build().map_err(|e| {
        WidgetError::with_message(ErrorCode::NetworkFetchFailed, e.to_string())
    })?;

    let mut request = if method == "POST" {
        let mut request = client.post(endpoint);
        if let Some(payload) = &bootstrap.payload {
            let body = match payload {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            request = request.body(body);
        }
        request
    } else {
        client.get(endpoint)
    };

    for (name, value) in &bootstrap.headers {
        request = request.header(name, value);
    }

    let response = request.send().await.map_err(|e| {
        WidgetError::with_message(ErrorCode::NetworkFetchFailed, e.to_string())
            .context(json!({"endpoint": endpoint}))
    })?;

    let status = response.status();
    if !status.is_success() {
        return Err(WidgetError::with_context(
            ErrorCode::AuthEndpointFailed,
            json!({"status": status.as_u16(), "endpoint": endpoint}),
        ));
    }

    // A body that is not JSON is treated the same as an empty object.
    let data: Value = response.json().await.unwrap_or_else(|_| json!({}));
    match data.get("token").and_then(Value::as_str) {
        Some(token) if !token.is_empty() => Ok(token.to_string()),
        _ => Err(WidgetError::with_context(
            ErrorCode::AuthEndpointNoToken,
            json!({
                "endpoint": endpoint,
                "responseKeys": data
                    .as_object()
                    .map(|o| o.keys().cloned().collect::<Vec<_>>())
                    .unwrap_or_default(),
            }),
        )),
    }
}
