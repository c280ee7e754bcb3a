use serde::Deserialize;
use serde_json::Value;

use crate::commands::{command_error, to_value, view_id};
use crate::models::{NewCustomer, NewVehicle};
use crate::{catalog, parse_payload, payload_id, AppState};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchPayload {
    #[serde(default, alias = "q", alias = "term", alias = "search")]
    query: String,
}

fn search_query(arg0: Option<&Value>) -> String {
    match arg0 {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(v) => serde_json::from_value::<SearchPayload>(v.clone())
            .map(|p| p.query.trim().to_string())
            .unwrap_or_default(),
        None => String::new(),
    }
}

#[tauri::command]
pub async fn customers_search(
    arg0: Option<Value>,
    app: tauri::AppHandle,
    state: tauri::State<'_, AppState>,
) -> Result<Value, String> {
    let query = search_query(arg0.as_ref());
    let view = view_id(arg0.as_ref());
    let customers = state
        .scoped(view.as_deref(), catalog::search_customers(&state.api, &query))
        .await
        .map_err(|e| command_error(&app, e))?;
    to_value(&customers)
}

#[tauri::command]
pub async fn customers_create(
    arg0: Option<Value>,
    app: tauri::AppHandle,
    state: tauri::State<'_, AppState>,
) -> Result<Value, String> {
    let customer: NewCustomer = parse_payload(arg0, "customer")?;
    let created = catalog::create_customer(&state.api, &customer)
        .await
        .map_err(|e| command_error(&app, e))?;
    to_value(&created)
}

#[tauri::command]
pub async fn vehicles_list(
    arg0: Option<Value>,
    app: tauri::AppHandle,
    state: tauri::State<'_, AppState>,
) -> Result<Value, String> {
    let customer_id =
        payload_id(arg0.as_ref(), &["customerId", "customer_id", "id"]).ok_or("Missing customer id")?;
    let view = view_id(arg0.as_ref());
    let vehicles = state
        .scoped(
            view.as_deref(),
            catalog::customer_vehicles(&state.api, &customer_id),
        )
        .await
        .map_err(|e| command_error(&app, e))?;
    to_value(&vehicles)
}

#[tauri::command]
pub async fn vehicles_create(
    arg0: Option<Value>,
    app: tauri::AppHandle,
    state: tauri::State<'_, AppState>,
) -> Result<Value, String> {
    let vehicle: NewVehicle = parse_payload(arg0, "vehicle")?;
    let created = catalog::create_vehicle(&state.api, &vehicle)
        .await
        .map_err(|e| command_error(&app, e))?;
    to_value(&created)
}

#[tauri::command]
pub async fn products_list(
    arg0: Option<Value>,
    app: tauri::AppHandle,
    state: tauri::State<'_, AppState>,
) -> Result<Value, String> {
    let query = search_query(arg0.as_ref());
    let search = Some(query.as_str()).filter(|q| !q.is_empty());
    let view = view_id(arg0.as_ref());
    let products = state
        .scoped(view.as_deref(), catalog::products(&state.api, search))
        .await
        .map_err(|e| command_error(&app, e))?;
    to_value(&products)
}

#[tauri::command]
pub async fn service_categories_list(
    arg0: Option<Value>,
    app: tauri::AppHandle,
    state: tauri::State<'_, AppState>,
) -> Result<Value, String> {
    let view = view_id(arg0.as_ref());
    let categories = state
        .scoped(view.as_deref(), catalog::service_categories(&state.api))
        .await
        .map_err(|e| command_error(&app, e))?;
    to_value(&categories)
}

/// Home screen: categories filtered by the search box.
#[tauri::command]
pub async fn dashboard_categories(
    arg0: Option<Value>,
    app: tauri::AppHandle,
    state: tauri::State<'_, AppState>,
) -> Result<Value, String> {
    let query = search_query(arg0.as_ref());
    let view = view_id(arg0.as_ref());
    let categories = state
        .scoped(view.as_deref(), catalog::service_categories(&state.api))
        .await
        .map_err(|e| command_error(&app, e))?;
    to_value(&catalog::dashboard_categories(&categories, &query))
}

#[tauri::command]
pub async fn accounts_list(
    arg0: Option<Value>,
    app: tauri::AppHandle,
    state: tauri::State<'_, AppState>,
) -> Result<Value, String> {
    let view = view_id(arg0.as_ref());
    let accounts = state
        .scoped(view.as_deref(), catalog::accounts(&state.api))
        .await
        .map_err(|e| command_error(&app, e))?;
    to_value(&accounts)
}
