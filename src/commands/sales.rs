use serde_json::{json, Value};

use crate::commands::{command_error, to_value};
use crate::sale::{self, SaleDraft, SaleRequest};
use crate::{parse_payload, AppState};

fn sale_view(draft: &SaleDraft) -> Result<Value, String> {
    let mut value = to_value(draft)?;
    value["totals"] = to_value(&draft.totals())?;
    Ok(value)
}

#[tauri::command]
pub async fn sale_get(state: tauri::State<'_, AppState>) -> Result<Value, String> {
    sale_view(&state.sale.lock())
}

#[tauri::command]
pub async fn sale_apply(
    arg0: Option<Value>,
    state: tauri::State<'_, AppState>,
) -> Result<Value, String> {
    let request: SaleRequest = parse_payload(arg0, "sale action")?;
    let mut draft = state.sale.lock();
    draft.apply(request).map_err(|e| e.user_message())?;
    sale_view(&draft)
}

#[tauri::command]
pub async fn sale_reset(state: tauri::State<'_, AppState>) -> Result<Value, String> {
    state.sale.replace(SaleDraft::new());
    sale_view(&state.sale.lock())
}

/// Post the current sale. A second tap while one is in flight is rejected.
#[tauri::command]
pub async fn sale_submit(
    app: tauri::AppHandle,
    state: tauri::State<'_, AppState>,
) -> Result<Value, String> {
    let data = sale::submit_sale(&state.api, &state.sale)
        .await
        .map_err(|e| command_error(&app, e))?;
    let draft = state.sale.lock();
    Ok(json!({ "success": true, "sale": data, "draft": sale_view(&draft)? }))
}
