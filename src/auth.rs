//! Staff login against the garage backend.
//!
//! The backend issues a bearer token; it is written to the token store and
//! attached to every later request by [`ApiClient`]. There is no refresh
//! flow: an expired token clears itself and the user logs in again.

use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::api::{unwrap_data, ApiClient};
use crate::error::{AppError, AppResult};
use crate::storage::mask_token;

#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    #[serde(alias = "username")]
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LoginResult {
    pub user: Value,
}

pub async fn login(api: &ApiClient, credentials: &Credentials) -> AppResult<LoginResult> {
    let email = credentials.email.trim();
    if email.is_empty() || credentials.password.is_empty() {
        return Err(AppError::validation("Enter your email and password"));
    }

    // A stale token must not ride along on the login call.
    api.tokens().clear()?;

    let body = serde_json::json!({ "email": email, "password": credentials.password });
    let resp = match api.send_json(Method::POST, "/api/auth/login", &body).await {
        Ok(resp) => resp,
        // 401 here means bad credentials, not an expired session.
        Err(AppError::SessionExpired) => {
            return Err(AppError::Rejected {
                status: 401,
                message: "Invalid email or password".into(),
            })
        }
        Err(e) => return Err(e),
    };
    let data = unwrap_data(resp);
    let token = extract_token(&data)
        .ok_or_else(|| AppError::InvalidResponse("login response has no token".into()))?;
    api.tokens().save(&token)?;

    let user = data.get("user").cloned().unwrap_or(Value::Null);
    info!(token = %mask_token(&token), "staff logged in");
    Ok(LoginResult { user })
}

pub fn logout(api: &ApiClient) -> AppResult<()> {
    api.tokens().clear()?;
    info!("staff logged out");
    Ok(())
}

pub fn is_authenticated(api: &ApiClient) -> bool {
    api.tokens().load().is_some()
}

fn extract_token(data: &Value) -> Option<String> {
    ["token", "access_token", "accessToken"]
        .iter()
        .find_map(|k| data.get(*k).and_then(Value::as_str))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
