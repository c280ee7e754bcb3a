pub mod auth;
pub mod catalog;
pub mod jobcards;
pub mod sales;

use serde_json::Value;
use tauri::{AppHandle, Emitter};

use crate::error::AppError;
use crate::{value_str, AppState};

pub(crate) const SESSION_EXPIRED_EVENT: &str = "session_expired";

/// Turn an error into the message the webview shows. An expired session also
/// tells the shell to route back to the login screen.
pub(crate) fn command_error(app: &AppHandle, err: AppError) -> String {
    if err.is_session_expired() {
        let _ = app.emit(
            SESSION_EXPIRED_EVENT,
            serde_json::json!({ "message": err.user_message() }),
        );
    }
    err.user_message()
}

pub(crate) fn view_id(arg0: Option<&Value>) -> Option<String> {
    arg0.and_then(|v| value_str(v, &["viewId", "view_id", "view"]))
}

pub(crate) fn to_value<T: serde::Serialize>(value: &T) -> Result<Value, String> {
    serde_json::to_value(value).map_err(|e| e.to_string())
}

/// Called by a screen when it unmounts.
#[tauri::command]
pub async fn view_close(
    arg0: Option<Value>,
    state: tauri::State<'_, AppState>,
) -> Result<Value, String> {
    let closed = match view_id(arg0.as_ref()) {
        Some(id) => state.scopes.close(&id),
        None => false,
    };
    Ok(serde_json::json!({ "closed": closed }))
}
