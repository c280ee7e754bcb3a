//! Garage backend API client.
//!
//! One pre-configured `reqwest::Client` shared by every screen. Each request
//! carries the stored bearer token. Authentication failures clear the token
//! and surface as [`AppError::SessionExpired`] so the shell can show the
//! session-expired prompt.

use std::sync::Arc;

use reqwest::{multipart::Form, Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::{AppError, AppResult, GENERIC_REJECTION};
use crate::storage::TokenStore;

/// Body messages the backend uses for a bad or expired token.
const TOKEN_FAILURE_MARKERS: &[&str] = &[
    "token invalid",
    "token expired",
    "token is invalid",
    "token is expired",
    "jwt expired",
    "unauthenticated",
];

pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    config: ClientConfig,
    tokens: Arc<dyn TokenStore>,
}

impl ApiClient {
    pub fn new(config: ClientConfig, tokens: Arc<dyn TokenStore>) -> AppResult<Self> {
        if config.base_url.trim().is_empty() {
            return Err(AppError::NotConfigured("missing API base URL".into()));
        }
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| AppError::NotConfigured(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            http,
            config,
            tokens,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn tokens(&self) -> &Arc<dyn TokenStore> {
        &self.tokens
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut req = self
            .http
            .request(method, self.config.url(path))
            .header("Accept", "application/json");
        if let Some(token) = self.tokens.load() {
            req = req.bearer_auth(token.as_str());
        }
        req
    }

    pub async fn get_json(&self, path: &str, query: &[(&str, String)]) -> AppResult<Value> {
        let req = self.request(Method::GET, path).query(query);
        self.execute(path, req).await
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> AppResult<T> {
        let value = self.get_json(path, query).await?;
        Ok(serde_json::from_value(unwrap_data(value))?)
    }

    pub async fn send_json(&self, method: Method, path: &str, body: &Value) -> AppResult<Value> {
        let req = self.request(method, path).json(body);
        self.execute(path, req).await
    }

    /// POST a JSON body carrying an idempotency key.
    pub async fn post_json_idempotent(
        &self,
        path: &str,
        body: &Value,
        idempotency_key: &str,
    ) -> AppResult<Value> {
        let req = self
            .request(Method::POST, path)
            .header(IDEMPOTENCY_HEADER, idempotency_key)
            .json(body);
        self.execute(path, req).await
    }

    pub async fn delete(&self, path: &str) -> AppResult<Value> {
        let req = self.request(Method::DELETE, path);
        self.execute(path, req).await
    }

    pub async fn send_multipart(
        &self,
        path: &str,
        form: Form,
        idempotency_key: Option<&str>,
    ) -> AppResult<Value> {
        let mut req = self.request(Method::POST, path).multipart(form);
        if let Some(key) = idempotency_key {
            req = req.header(IDEMPOTENCY_HEADER, key);
        }
        self.execute(path, req).await
    }

    async fn execute(&self, path: &str, req: RequestBuilder) -> AppResult<Value> {
        debug!(path, "api request");
        let resp = match req.send().await {
            Ok(resp) => resp,
            Err(e) => {
                let err = AppError::from(e);
                warn!(path, error = %err, "api request failed");
                return Err(err);
            }
        };
        self.handle_response(path, resp).await
    }

    async fn handle_response(&self, path: &str, resp: Response) -> AppResult<Value> {
        let status = resp.status();
        let body_text = resp.text().await.unwrap_or_default();
        let body_json = serde_json::from_str::<Value>(&body_text).ok();

        if status.is_success() {
            if body_text.trim().is_empty() {
                return Ok(Value::Null);
            }
            return body_json.ok_or_else(|| {
                AppError::InvalidResponse(format!("expected JSON from {path}"))
            });
        }

        let message = body_json.as_ref().and_then(server_message);
        if is_auth_failure(status, message.as_deref()) {
            warn!(path, status = status.as_u16(), "session expired, clearing token");
            if let Err(e) = self.tokens.clear() {
                warn!(error = %e, "failed to clear stored token");
            }
            return Err(AppError::SessionExpired);
        }

        info!(path, status = status.as_u16(), "request rejected by server");
        Err(AppError::Rejected {
            status: status.as_u16(),
            message: message.unwrap_or_else(|| status_message(status)),
        })
    }
}

/// Pull the human-readable message out of an error body.
pub fn server_message(body: &Value) -> Option<String> {
    body.get("message")
        .or_else(|| body.get("error"))
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn is_auth_failure(status: StatusCode, message: Option<&str>) -> bool {
    if status == StatusCode::UNAUTHORIZED {
        return true;
    }
    let Some(message) = message else {
        return false;
    };
    let lower = message.to_ascii_lowercase();
    TOKEN_FAILURE_MARKERS.iter().any(|m| lower.contains(m))
}

fn status_message(status: StatusCode) -> String {
    match status.as_u16() {
        403 => "You do not have permission to do that".to_string(),
        404 => "The requested record was not found".to_string(),
        s if s >= 500 => format!("Server error (HTTP {s})"),
        _ => GENERIC_REJECTION.to_string(),
    }
}

/// The backend wraps most payloads as `{ "data": ... }`.
pub fn unwrap_data(value: Value) -> Value {
    match value {
        Value::Object(mut obj) if obj.contains_key("data") => {
            obj.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}
