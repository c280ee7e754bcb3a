//! Garage Job Cards - native core
//!
//! Owns everything behind the workshop app's screens that is not markup: the
//! backend API client and bearer token, the job card draft with its totals
//! and validation, photo compression, multipart submission and the
//! point-of-sale draft. With the `app` feature the same operations are
//! registered as Tauri commands that the webview calls via `invoke()`.

pub mod api;
pub mod auth;
pub mod catalog;
#[cfg(feature = "app")]
mod commands;
pub mod config;
pub mod draft;
pub mod error;
pub mod jobcards;
pub mod logging;
pub mod models;
pub mod photos;
pub mod sale;
pub mod scope;
pub mod state;
pub mod storage;
pub mod submission;

pub use error::{AppError, AppResult};
pub use state::AppState;

use serde::de::DeserializeOwned;
use serde_json::Value;

/// Command payloads arrive either as an object or as a bare string for
/// single-id commands.
#[cfg_attr(not(feature = "app"), allow(dead_code))]
pub(crate) fn parse_payload<T: DeserializeOwned>(
    arg0: Option<Value>,
    what: &str,
) -> Result<T, String> {
    let payload = arg0.unwrap_or_else(|| serde_json::json!({}));
    serde_json::from_value(payload).map_err(|e| format!("Invalid {what} payload: {e}"))
}

#[cfg_attr(not(feature = "app"), allow(dead_code))]
pub(crate) fn value_str(v: &Value, keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Some(s) = v.get(*key).and_then(|x| x.as_str()) {
            let trimmed = s.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }
    None
}

/// Accept `"42"`, `42` or `{ "id": 42 }` style id payloads.
#[cfg_attr(not(feature = "app"), allow(dead_code))]
pub(crate) fn payload_id(arg0: Option<&Value>, keys: &[&str]) -> Option<String> {
    match arg0? {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        obj @ Value::Object(map) => value_str(obj, keys).or_else(|| {
            keys.iter()
                .find_map(|k| map.get(*k).and_then(Value::as_i64))
                .map(|n| n.to_string())
        }),
        _ => None,
    }
}

// ============================================================================
// App entry point
// ============================================================================

#[cfg(feature = "app")]
pub fn run() {
    use std::sync::Arc;

    let saved_url = storage::get_credential(storage::KEY_BASE_URL);
    let config = config::ClientConfig::from_env(saved_url.as_deref());

    // Keep the guard alive for the lifetime of the app; dropping it flushes logs.
    let _log_guard = match logging::init(&config.log_filter) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("logging disabled: {e}");
            None
        }
    };

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        git_sha = env!("BUILD_GIT_SHA"),
        base_url = %config.base_url,
        "Starting Garage Job Cards"
    );

    let state = match AppState::new(config, Arc::new(storage::KeyringTokenStore)) {
        Ok(state) => state,
        Err(e) => {
            tracing::error!(error = %e, "failed to initialise client");
            return;
        }
    };

    let result = tauri::Builder::default()
        .manage(state)
        .invoke_handler(tauri::generate_handler![
            commands::auth::auth_login,
            commands::auth::auth_logout,
            commands::auth::auth_status,
            commands::auth::settings_set_base_url,
            commands::catalog::customers_search,
            commands::catalog::customers_create,
            commands::catalog::vehicles_list,
            commands::catalog::vehicles_create,
            commands::catalog::products_list,
            commands::catalog::service_categories_list,
            commands::catalog::dashboard_categories,
            commands::catalog::accounts_list,
            commands::jobcards::jobcard_draft_get,
            commands::jobcards::jobcard_draft_apply,
            commands::jobcards::jobcard_draft_reset,
            commands::jobcards::jobcard_edit,
            commands::jobcards::jobcard_submit,
            commands::jobcards::jobcards_list,
            commands::jobcards::jobcard_delete,
            commands::jobcards::jobcard_update_status,
            commands::sales::sale_get,
            commands::sales::sale_apply,
            commands::sales::sale_submit,
            commands::sales::sale_reset,
            commands::view_close,
        ])
        .run(tauri::generate_context!());

    if let Err(e) = result {
        tracing::error!(error = %e, "error while running application");
    }
}
