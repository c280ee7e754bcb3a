//! Customers, vehicles, products, service categories and accounts.

use reqwest::Method;
use serde_json::Value;
use tracing::info;

use crate::api::{unwrap_data, ApiClient};
use crate::error::{AppError, AppResult};
use crate::models::{
    Account, Customer, NewCustomer, NewVehicle, Product, ServiceCategory, Vehicle,
};

pub async fn search_customers(api: &ApiClient, query: &str) -> AppResult<Vec<Customer>> {
    let query = query.trim();
    let params = if query.is_empty() {
        Vec::new()
    } else {
        vec![("search", query.to_string())]
    };
    api.get("/api/customers", &params).await
}

pub async fn create_customer(api: &ApiClient, customer: &NewCustomer) -> AppResult<Customer> {
    customer.validate().map_err(AppError::Validation)?;
    let body = serde_json::json!({
        "name": customer.name.trim(),
        "mobile": customer.mobile.trim(),
    });
    let created = api.send_json(Method::POST, "/api/customers", &body).await?;
    let customer: Customer = serde_json::from_value(record(created, "customer"))?;
    info!(customer_id = %customer.id, "customer created");
    Ok(customer)
}

pub async fn customer_vehicles(api: &ApiClient, customer_id: &str) -> AppResult<Vec<Vehicle>> {
    if customer_id.trim().is_empty() {
        return Err(AppError::validation("Select a customer first"));
    }
    let mut vehicles: Vec<Vehicle> = api
        .get(&format!("/api/customers/{}/vehicles", customer_id.trim()), &[])
        .await?;
    // Some deployments omit the owner on nested vehicle listings.
    for v in &mut vehicles {
        if v.customer_id.is_empty() {
            v.customer_id = customer_id.trim().to_string();
        }
    }
    Ok(vehicles)
}

pub async fn create_vehicle(api: &ApiClient, vehicle: &NewVehicle) -> AppResult<Vehicle> {
    vehicle.validate().map_err(AppError::Validation)?;
    let body = serde_json::to_value(vehicle)?;
    let created = api
        .send_json(
            Method::POST,
            &format!("/api/customers/{}/vehicles", vehicle.customer_id.trim()),
            &body,
        )
        .await?;
    let mut created: Vehicle = serde_json::from_value(record(created, "vehicle"))?;
    if created.customer_id.is_empty() {
        created.customer_id = vehicle.customer_id.trim().to_string();
    }
    info!(vehicle_id = %created.id, customer_id = %created.customer_id, "vehicle created");
    Ok(created)
}

pub async fn products(api: &ApiClient, search: Option<&str>) -> AppResult<Vec<Product>> {
    let params: Vec<(&str, String)> = search
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| vec![("search", s.to_string())])
        .unwrap_or_default();
    api.get("/api/products", &params).await
}

pub async fn service_categories(api: &ApiClient) -> AppResult<Vec<ServiceCategory>> {
    api.get("/api/service-categories", &[]).await
}

pub async fn accounts(api: &ApiClient) -> AppResult<Vec<Account>> {
    api.get("/api/accounts", &[]).await
}

/// Home screen filter: a category matches on its own name or on any of its
/// sub-service names. Matching sub-services are kept; when only the
/// category name matches, all of its services are shown.
pub fn dashboard_categories(categories: &[ServiceCategory], query: &str) -> Vec<ServiceCategory> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return categories.to_vec();
    }
    categories
        .iter()
        .filter_map(|cat| {
            if cat.name.to_lowercase().contains(&needle) {
                return Some(cat.clone());
            }
            let services: Vec<_> = cat
                .services
                .iter()
                .filter(|s| s.name.to_lowercase().contains(&needle))
                .cloned()
                .collect();
            (!services.is_empty()).then(|| ServiceCategory {
                services,
                ..cat.clone()
            })
        })
        .collect()
}

/// Created records come back as `{data: {...}}`, `{customer: {...}}` or bare.
fn record(value: Value, key: &str) -> Value {
    let data = unwrap_data(value);
    match data {
        Value::Object(mut obj) if obj.contains_key(key) => obj.remove(key).unwrap_or(Value::Null),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::api::test_server;
    use crate::config::ClientConfig;
    use crate::models::SubService;
    use crate::storage::MemoryTokenStore;
    use serde_json::json;

    fn api(base: &str) -> ApiClient {
        ApiClient::new(
            ClientConfig::with_base_url(base),
            Arc::new(MemoryTokenStore::with_token("tok")),
        )
        .unwrap()
    }

    fn cat(id: &str, name: &str, services: &[&str]) -> ServiceCategory {
        ServiceCategory {
            id: id.into(),
            name: name.into(),
            services: services
                .iter()
                .enumerate()
                .map(|(i, n)| SubService {
                    id: format!("{id}-{i}"),
                    name: n.to_string(),
                    price: 10.0,
                })
                .collect(),
        }
    }

    #[test]
    fn test_dashboard_filter() {
        let cats = vec![
            cat("1", "Oil Change", &["Engine oil", "Filter"]),
            cat("2", "Brakes", &["Pad replacement", "Disc skimming"]),
        ];
        assert_eq!(dashboard_categories(&cats, "  ").len(), 2);

        let by_name = dashboard_categories(&cats, "oil");
        assert_eq!(by_name.len(), 1);
        assert_eq!(by_name[0].services.len(), 2);

        let by_service = dashboard_categories(&cats, "PAD");
        assert_eq!(by_service.len(), 1);
        assert_eq!(by_service[0].id, "2");
        assert_eq!(by_service[0].services.len(), 1);

        assert!(dashboard_categories(&cats, "tyre").is_empty());
    }

    #[test]
    fn test_record_unwraps_nested_key() {
        assert_eq!(
            record(json!({"data": {"customer": {"id": 1}}}), "customer"),
            json!({"id": 1})
        );
        assert_eq!(record(json!({"id": 2}), "customer"), json!({"id": 2}));
    }

    #[tokio::test]
    async fn test_search_customers_sends_query() {
        let (base, recorder) = test_server::spawn(
            200,
            r#"{"data": [{"id": 5, "name": "Anita", "mobile_number": "98450", "balance": "120.5"}]}"#,
        )
        .await;
        let customers = search_customers(&api(&base), " anita ").await.unwrap();
        assert_eq!(customers[0].id, "5");
        assert_eq!(customers[0].balance, 120.5);
        assert_eq!(recorder.requests()[0].uri, "/api/customers?search=anita");
    }

    #[tokio::test]
    async fn test_vehicles_get_owner_filled_in() {
        let (base, _) = test_server::spawn(
            200,
            r#"[{"id": 1, "name": "City", "plate_number": "MH12"}]"#,
        )
        .await;
        let vehicles = customer_vehicles(&api(&base), "c9").await.unwrap();
        assert_eq!(vehicles[0].customer_id, "c9");
    }

    #[tokio::test]
    async fn test_invalid_customer_not_sent() {
        let (base, recorder) = test_server::spawn(201, "{}").await;
        let err = create_customer(
            &api(&base),
            &NewCustomer {
                name: "".into(),
                mobile: "".into(),
            },
        )
        .await
        .unwrap_err();
        assert!(err.is_validation());
        assert!(recorder.requests().is_empty());
    }

    #[tokio::test]
    async fn test_create_vehicle_posts_under_customer() {
        let (base, recorder) = test_server::spawn(
            201,
            r#"{"data": {"vehicle": {"id": 12, "name": "Swift", "plate_number": "KA01"}}}"#,
        )
        .await;
        let created = create_vehicle(
            &api(&base),
            &NewVehicle {
                customer_id: "c1".into(),
                name: "Swift".into(),
                plate_number: "KA01".into(),
                year: Some(2020),
                odometer: Some(1200),
            },
        )
        .await
        .unwrap();
        assert_eq!(created.id, "12");
        assert_eq!(created.customer_id, "c1");

        let req = &recorder.requests()[0];
        assert_eq!(req.uri, "/api/customers/c1/vehicles");
        let body: Value = serde_json::from_slice(&req.body).unwrap();
        assert_eq!(body["plate_number"], "KA01");
    }
}
