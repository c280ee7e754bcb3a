use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::commands::{command_error, to_value, view_id};
use crate::draft::{DraftRequest, DraftView, JobCardDraft, Outcome};
use crate::error::AppError;
use crate::jobcards::JobCardFilter;
use crate::models::JobCardStatus;
use crate::{jobcards, parse_payload, payload_id, submission, AppState};

const JOB_CARD_ID_KEYS: &[&str] = &["jobCardId", "job_card_id", "id"];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusPayload {
    #[serde(alias = "job_card_id", alias = "id")]
    job_card_id: String,
    status: JobCardStatus,
}

fn draft_view(state: &AppState) -> Result<Value, String> {
    let draft = state.compose.lock();
    to_value(&DraftView::from(&*draft))
}

#[tauri::command]
pub async fn jobcard_draft_get(state: tauri::State<'_, AppState>) -> Result<Value, String> {
    draft_view(&state)
}

/// Apply one edit from the form. Photo payloads are decoded and compressed
/// off the async runtime before the draft is locked.
#[tauri::command]
pub async fn jobcard_draft_apply(
    arg0: Option<Value>,
    state: tauri::State<'_, AppState>,
) -> Result<Value, String> {
    let request: DraftRequest = parse_payload(arg0, "draft action")?;
    let action = tokio::task::spawn_blocking(move || request.into_action())
        .await
        .map_err(|e| format!("Photo processing failed: {e}"))?
        .map_err(|e| e.user_message())?;

    let outcome = state
        .compose
        .lock()
        .apply(action)
        .map_err(|e| e.user_message())?;
    if outcome == Outcome::Unchanged {
        debug!("draft action had no effect");
    }
    draft_view(&state)
}

#[tauri::command]
pub async fn jobcard_draft_reset(state: tauri::State<'_, AppState>) -> Result<Value, String> {
    state.compose.replace_draft(JobCardDraft::new());
    draft_view(&state)
}

/// Load an existing card into the form for editing.
#[tauri::command]
pub async fn jobcard_edit(
    arg0: Option<Value>,
    app: tauri::AppHandle,
    state: tauri::State<'_, AppState>,
) -> Result<Value, String> {
    let id = payload_id(arg0.as_ref(), JOB_CARD_ID_KEYS).ok_or("Missing job card id")?;
    let view = view_id(arg0.as_ref());
    let card = state
        .scoped(view.as_deref(), jobcards::get(&state.api, &id))
        .await
        .map_err(|e| command_error(&app, e))?;
    state.compose.replace_draft(JobCardDraft::from_job_card(&card));
    draft_view(&state)
}

#[tauri::command]
pub async fn jobcard_submit(
    app: tauri::AppHandle,
    state: tauri::State<'_, AppState>,
) -> Result<Value, String> {
    match submission::submit(&state.api, &state.compose).await {
        Ok(result) => {
            let mut value = to_value(&result)?;
            value["success"] = json!(true);
            value["draft"] = draft_view(&state)?;
            Ok(value)
        }
        Err(AppError::Busy) => Err(AppError::Busy.user_message()),
        Err(e) => Err(command_error(&app, e)),
    }
}

#[tauri::command]
pub async fn jobcards_list(
    arg0: Option<Value>,
    app: tauri::AppHandle,
    state: tauri::State<'_, AppState>,
) -> Result<Value, String> {
    let view = view_id(arg0.as_ref());
    let filter: JobCardFilter = parse_payload(arg0, "job card filter")?;
    let cards = state
        .scoped(view.as_deref(), jobcards::list(&state.api, &filter))
        .await
        .map_err(|e| command_error(&app, e))?;
    to_value(&cards)
}

#[tauri::command]
pub async fn jobcard_delete(
    arg0: Option<Value>,
    app: tauri::AppHandle,
    state: tauri::State<'_, AppState>,
) -> Result<Value, String> {
    let id = payload_id(arg0.as_ref(), JOB_CARD_ID_KEYS).ok_or("Missing job card id")?;
    jobcards::delete(&state.api, &id)
        .await
        .map_err(|e| command_error(&app, e))?;
    Ok(json!({ "success": true, "id": id }))
}

#[tauri::command]
pub async fn jobcard_update_status(
    arg0: Option<Value>,
    app: tauri::AppHandle,
    state: tauri::State<'_, AppState>,
) -> Result<Value, String> {
    let payload: StatusPayload = parse_payload(arg0, "status")?;
    jobcards::update_status(&state.api, &payload.job_card_id, payload.status)
        .await
        .map_err(|e| command_error(&app, e))?;
    Ok(json!({
        "success": true,
        "id": payload.job_card_id,
        "status": payload.status,
    }))
}
