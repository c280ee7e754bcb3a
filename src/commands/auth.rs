use serde_json::{json, Value};
use tracing::info;

use crate::commands::command_error;
use crate::config::normalize_base_url;
use crate::{auth, parse_payload, storage, value_str, AppState};

#[tauri::command]
pub async fn auth_login(
    arg0: Option<Value>,
    app: tauri::AppHandle,
    state: tauri::State<'_, AppState>,
) -> Result<Value, String> {
    let credentials: auth::Credentials = parse_payload(arg0, "login")?;
    let result = auth::login(&state.api, &credentials)
        .await
        .map_err(|e| command_error(&app, e))?;
    Ok(json!({ "success": true, "user": result.user }))
}

#[tauri::command]
pub async fn auth_logout(state: tauri::State<'_, AppState>) -> Result<Value, String> {
    state.scopes.close_all();
    auth::logout(&state.api).map_err(|e| e.user_message())?;
    state.compose.replace_draft(Default::default());
    state.sale.replace(Default::default());
    Ok(json!({ "success": true }))
}

#[tauri::command]
pub async fn auth_status(state: tauri::State<'_, AppState>) -> Result<Value, String> {
    Ok(json!({
        "authenticated": auth::is_authenticated(&state.api),
        "baseUrl": state.api.config().base_url,
    }))
}

/// Persist a different backend address. Takes effect on the next launch.
#[tauri::command]
pub async fn settings_set_base_url(arg0: Option<Value>) -> Result<Value, String> {
    let raw = match arg0.as_ref() {
        Some(Value::String(s)) => Some(s.trim().to_string()),
        Some(v) => value_str(v, &["baseUrl", "base_url", "url"]),
        None => None,
    }
    .filter(|s| !s.is_empty())
    .ok_or("Missing base URL")?;

    let url = normalize_base_url(&raw);
    storage::set_credential(storage::KEY_BASE_URL, &url).map_err(|e| e.user_message())?;
    info!(base_url = %url, "backend address saved");
    Ok(json!({ "success": true, "baseUrl": url, "restartRequired": true }))
}
