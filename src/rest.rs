//! REST transport: every outbound call goes through [`AuthenticatedFetcher`].
//!
//! Three outcomes are distinguished:
//! - 2xx: body parsed as JSON (an empty body reads as `null`)
//! - non-2xx: [`ClientError::BackendRejected`] carrying the backend's
//!   `detail` string, or the status text when there is none
//! - no response at all: [`ClientError::Transport`]
//!
//! Nothing is retried and no timeout is applied; callers pass a
//! [`CancellationToken`] instead and the result is discarded once it fires.

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::{AuthStyle, ClientConfig};
use crate::error::{ClientError, Result};

#[derive(Clone)]
pub struct AuthenticatedFetcher {
    http: reqwest::Client,
    base_url: String,
    default_style: AuthStyle,
}

impl AuthenticatedFetcher {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            default_style: config.auth_style,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn request(&self, method: Method, path: &str) -> ApiRequest<'_> {
        ApiRequest {
            fetcher: self,
            method,
            path: path.to_string(),
            token: None,
            style: self.default_style,
            body: None,
        }
    }
}

/// A single call being assembled.
pub struct ApiRequest<'f> {
    fetcher: &'f AuthenticatedFetcher,
    method: Method,
    path: String,
    token: Option<String>,
    style: AuthStyle,
    body: Option<Value>,
}

impl<'f> ApiRequest<'f> {
    pub fn token(mut self, token: Option<&str>) -> Self {
        self.token = token.map(str::to_string);
        self
    }

    /// Override the configured header style for this call only.
    pub fn style(mut self, style: AuthStyle) -> Self {
        self.style = style;
        self
    }

    pub fn json<B: Serialize>(mut self, body: &B) -> Result<Self> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    /// Send and decode the JSON response.
    pub async fn send<T: DeserializeOwned>(self, cancel: &CancellationToken) -> Result<T> {
        let value = self.send_value(cancel).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Send, ignoring whatever 2xx body comes back.
    pub async fn send_unit(self, cancel: &CancellationToken) -> Result<()> {
        self.send_value(cancel).await.map(|_| ())
    }

    pub async fn send_value(self, cancel: &CancellationToken) -> Result<Value> {
        let url = format!("{}{}", self.fetcher.base_url, self.path);
        debug!(method = %self.method, path = %self.path, style = ?self.style, "sending request");

        let mut req = self.fetcher.http.request(self.method.clone(), &url);
        if let Some(token) = &self.token {
            req = match self.style {
                AuthStyle::TokenHeader => req.header("token", token),
                AuthStyle::Bearer => req.bearer_auth(token),
            };
        }
        if let Some(body) = &self.body {
            req = req.json(body);
        }

        let exchange = async {
            let resp = req.send().await.map_err(ClientError::Transport)?;
            handle_response(resp).await
        };

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ClientError::Cancelled),
            result = exchange => result,
        };

        // The caller may have gone away while the body was being read
        if cancel.is_cancelled() {
            debug!(path = %self.path, "response dropped after cancellation");
            return Err(ClientError::Cancelled);
        }
        if let Err(e) = &result {
            warn!(method = %self.method, path = %self.path, error = %e, "request failed");
        }
        result
    }
}

async fn handle_response(resp: reqwest::Response) -> Result<Value> {
    let status = resp.status();
    let body = resp.text().await.map_err(ClientError::Transport)?;

    if !status.is_success() {
        return Err(ClientError::BackendRejected {
            status,
            detail: extract_detail(&body).unwrap_or_else(|| status_text(status)),
        });
    }

    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(&body)?)
}

/// `{ "detail": ... }` from an error body; non-string details (validation
/// error lists) are rendered as compact JSON.
fn extract_detail(body: &str) -> Option<String> {
    let json: Value = serde_json::from_str(body).ok()?;
    match json.get("detail")? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn status_text(status: StatusCode) -> String {
    status
        .canonical_reason()
        .map(str::to_string)
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()))
}
