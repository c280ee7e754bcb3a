//! Records exchanged with the garage backend.
//!
//! The client owns none of these: they are fetched per screen and sent back
//! wholesale on submit.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

/// The backend is inconsistent about numeric ids and decimal prices: some
/// endpoints send `"12.50"`, others `12.5`.
fn de_f64_lenient<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumOrStr {
        Num(f64),
        Str(String),
        Null(()),
    }
    match NumOrStr::deserialize(deserializer)? {
        NumOrStr::Num(n) => Ok(n),
        NumOrStr::Str(s) if s.trim().is_empty() => Ok(0.0),
        NumOrStr::Str(s) => s.trim().parse::<f64>().map_err(serde::de::Error::custom),
        NumOrStr::Null(()) => Ok(0.0),
    }
}

fn de_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IdRepr {
        Num(i64),
        Str(String),
    }
    Ok(match IdRepr::deserialize(deserializer)? {
        IdRepr::Num(n) => n.to_string(),
        IdRepr::Str(s) => s,
    })
}

/// Optional ids that are still expected as strings (`null` becomes empty).
fn de_id_or_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(de_opt_id(deserializer)?.unwrap_or_default())
}

/// Accepts `2026-03-10`, `2026-03-10 08:00:00` and RFC 3339 timestamps such
/// as `2026-03-10T00:00:00.000000Z`. Only the calendar date is kept.
fn de_opt_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    let date_part = raw.split(['T', ' ']).next().unwrap_or(raw);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .map(Some)
        .map_err(|e| serde::de::Error::custom(format!("invalid date {raw:?}: {e}")))
}

fn de_opt_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IdRepr {
        Num(i64),
        Str(String),
    }
    Ok(match Option::<IdRepr>::deserialize(deserializer)? {
        Some(IdRepr::Num(n)) => Some(n.to_string()),
        Some(IdRepr::Str(s)) if !s.trim().is_empty() => Some(s),
        _ => None,
    })
}

fn de_quantity<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let n = de_f64_lenient(deserializer)?;
    Ok(if n.is_finite() && n > 0.0 {
        n.floor() as u32
    } else {
        0
    })
}

// ---------------------------------------------------------------------------
// Customers and vehicles
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    pub name: String,
    #[serde(default, alias = "mobile_number", alias = "phone")]
    pub mobile: String,
    #[serde(default, deserialize_with = "de_f64_lenient")]
    pub balance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCustomer {
    pub name: String,
    #[serde(alias = "mobile_number", alias = "phone")]
    pub mobile: String,
}

impl NewCustomer {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("Customer name is required".into());
        }
        let digits = self.mobile.chars().filter(char::is_ascii_digit).count();
        if digits < 7 {
            return Err("Enter a valid mobile number".into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(default, deserialize_with = "de_id_or_empty")]
    pub customer_id: String,
    #[serde(alias = "vehicle_name", alias = "model")]
    pub name: String,
    #[serde(alias = "plate_no", alias = "registration_number")]
    pub plate_number: String,
    #[serde(default)]
    pub year: Option<u16>,
    #[serde(default, alias = "current_km", alias = "odometer_reading")]
    pub odometer: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewVehicle {
    pub customer_id: String,
    pub name: String,
    pub plate_number: String,
    #[serde(default)]
    pub year: Option<u16>,
    #[serde(default)]
    pub odometer: Option<u32>,
}

impl NewVehicle {
    pub fn validate(&self) -> Result<(), String> {
        if self.customer_id.trim().is_empty() {
            return Err("Select a customer before adding a vehicle".into());
        }
        if self.name.trim().is_empty() {
            return Err("Vehicle name is required".into());
        }
        if self.plate_number.trim().is_empty() {
            return Err("Plate number is required".into());
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubService {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    pub name: String,
    #[serde(default, deserialize_with = "de_f64_lenient")]
    pub price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceCategory {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    pub name: String,
    #[serde(default, alias = "sub_services")]
    pub services: Vec<SubService>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSize {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(alias = "size")]
    pub label: String,
    #[serde(default, alias = "selling_price", deserialize_with = "de_f64_lenient")]
    pub price: f64,
    #[serde(default, alias = "quantity", deserialize_with = "de_quantity")]
    pub available_quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    pub name: String,
    #[serde(default, alias = "price", deserialize_with = "de_f64_lenient")]
    pub selling_price: f64,
    #[serde(default, alias = "quantity", alias = "stock", deserialize_with = "de_quantity")]
    pub available_quantity: u32,
    #[serde(default)]
    pub sizes: Vec<ProductSize>,
}

impl Product {
    pub fn is_in_stock(&self) -> bool {
        self.available_quantity > 0
    }

    /// View of a single size variant as a product of its own.
    pub fn with_size(&self, size_id: &str) -> Option<Product> {
        self.sizes.iter().find(|s| s.id == size_id).map(|s| Product {
            id: self.id.clone(),
            name: format!("{} ({})", self.name, s.label),
            selling_price: s.price,
            available_quantity: s.available_quantity,
            sizes: Vec::new(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountKind {
    Customer,
    Sales,
    Cash,
    Bank,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    pub name: String,
    #[serde(default = "default_account_kind", alias = "type")]
    pub kind: AccountKind,
}

fn default_account_kind() -> AccountKind {
    AccountKind::Other
}

// ---------------------------------------------------------------------------
// Job cards
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobCardStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

impl JobCardStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// A service line as stored on the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobCardServiceLine {
    #[serde(alias = "service_category_id", deserialize_with = "de_id")]
    pub category_id: String,
    #[serde(default)]
    pub category_name: Option<String>,
    #[serde(alias = "sub_service_id", deserialize_with = "de_id")]
    pub service_id: String,
    #[serde(default)]
    pub service_name: Option<String>,
    #[serde(default = "one", deserialize_with = "de_quantity")]
    pub quantity: u32,
    #[serde(default, deserialize_with = "de_f64_lenient")]
    pub price: f64,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobCardProductLine {
    #[serde(deserialize_with = "de_id")]
    pub product_id: String,
    #[serde(default)]
    pub product_name: Option<String>,
    #[serde(default, deserialize_with = "de_opt_id")]
    pub size_id: Option<String>,
    #[serde(default = "one", deserialize_with = "de_quantity")]
    pub quantity: u32,
    #[serde(default, deserialize_with = "de_f64_lenient")]
    pub price: f64,
    #[serde(default, deserialize_with = "de_quantity")]
    pub available_quantity: u32,
}

fn one() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobCard {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(default, alias = "job_card_number")]
    pub number: Option<String>,
    pub customer: Customer,
    pub vehicle: Vehicle,
    #[serde(default)]
    pub status: JobCardStatus,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, deserialize_with = "de_opt_date")]
    pub service_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "de_opt_date")]
    pub estimated_delivery_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "de_opt_date")]
    pub next_service_date: Option<NaiveDate>,
    #[serde(default)]
    pub services: Vec<JobCardServiceLine>,
    #[serde(default)]
    pub products: Vec<JobCardProductLine>,
    #[serde(default, deserialize_with = "de_f64_lenient")]
    pub discount: f64,
    #[serde(default, alias = "advance_amount", deserialize_with = "de_f64_lenient")]
    pub advance: f64,
    #[serde(default, deserialize_with = "de_f64_lenient")]
    pub subtotal: f64,
    #[serde(default, deserialize_with = "de_f64_lenient")]
    pub total: f64,
    #[serde(default, deserialize_with = "de_f64_lenient")]
    pub balance: f64,
    #[serde(default, alias = "note")]
    pub common_note: Option<String>,
    #[serde(default)]
    pub image_urls: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[default]
    Cash,
    Bank,
    Credit,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn test_product_accepts_string_prices_and_numeric_ids() {
        let product: Product = serde_json::from_value(json!({
            "id": 17,
            "name": "Engine oil 5W-30",
            "selling_price": "12.50",
            "quantity": 4,
            "sizes": [{"id": "s1", "size": "1L", "selling_price": 12.5, "quantity": 0}]
        }))
        .unwrap();
        assert_eq!(product.id, "17");
        assert_eq!(product.selling_price, 12.5);
        assert_eq!(product.available_quantity, 4);
        assert_eq!(product.sizes[0].available_quantity, 0);
    }

    #[test]
    fn test_product_with_size() {
        let product: Product = serde_json::from_value(json!({
            "id": "p1",
            "name": "Coolant",
            "selling_price": 8,
            "available_quantity": 10,
            "sizes": [{"id": "5l", "label": "5L", "price": 30, "available_quantity": 2}]
        }))
        .unwrap();
        let sized = product.with_size("5l").unwrap();
        assert_eq!(sized.name, "Coolant (5L)");
        assert_eq!(sized.selling_price, 30.0);
        assert_eq!(sized.available_quantity, 2);
        assert!(product.with_size("missing").is_none());
    }

    #[test]
    fn test_status_and_priority_wire_names() {
        assert_eq!(
            serde_json::to_value(JobCardStatus::InProgress).unwrap(),
            json!("in_progress")
        );
        assert_eq!(serde_json::to_value(Priority::High).unwrap(), json!("high"));
        assert_eq!(JobCardStatus::Completed.as_str(), "completed");
    }

    #[test]
    fn test_new_customer_validation() {
        let ok = NewCustomer {
            name: "Ravi".into(),
            mobile: "+91 98765 43210".into(),
        };
        assert!(ok.validate().is_ok());
        let bad = NewCustomer {
            name: " ".into(),
            mobile: "123".into(),
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_vehicle_with_null_owner() {
        let vehicle: Vehicle = serde_json::from_value(json!({
            "id": 5,
            "customer_id": null,
            "name": "Corolla",
            "plate_number": "KA-01-1234"
        }))
        .unwrap();
        assert_eq!(vehicle.id, "5");
        assert_eq!(vehicle.customer_id, "");
    }

    #[test]
    fn test_blank_price_reads_as_zero() {
        let product: Product = serde_json::from_value(json!({
            "id": "p9",
            "name": "Wiper blade",
            "selling_price": "",
            "quantity": " "
        }))
        .unwrap();
        assert_eq!(product.selling_price, 0.0);
        assert_eq!(product.available_quantity, 0);
        assert!(serde_json::from_value::<Product>(json!({
            "id": "p9", "name": "x", "selling_price": "abc"
        }))
        .is_err());
    }

    fn job_card_json(service_date: Value, delivery: Value) -> Value {
        json!({
            "id": 12,
            "customer": {"id": 1, "name": "Ravi", "mobile": "9876543210"},
            "vehicle": {"id": 2, "customer_id": 1, "name": "Swift", "plate_number": "KA-05"},
            "service_date": service_date,
            "estimated_delivery_date": delivery,
            "next_service_date": ""
        })
    }

    #[test]
    fn test_job_card_dates_accept_timestamps() {
        let card: JobCard = serde_json::from_value(job_card_json(
            json!("2026-03-10T00:00:00.000000Z"),
            json!("2026-03-12 17:30:00"),
        ))
        .unwrap();
        assert_eq!(card.service_date, NaiveDate::from_ymd_opt(2026, 3, 10));
        assert_eq!(card.estimated_delivery_date, NaiveDate::from_ymd_opt(2026, 3, 12));
        assert_eq!(card.next_service_date, None);

        let plain: JobCard =
            serde_json::from_value(job_card_json(json!("2026-03-10"), Value::Null)).unwrap();
        assert_eq!(plain.service_date, NaiveDate::from_ymd_opt(2026, 3, 10));
        assert_eq!(plain.estimated_delivery_date, None);

        assert!(
            serde_json::from_value::<JobCard>(job_card_json(json!("10/03/2026"), Value::Null))
                .is_err()
        );
    }

    #[test]
    fn test_account_kind_unknown_maps_to_other() {
        let account: Account =
            serde_json::from_value(json!({"id": 4, "name": "Misc", "type": "ledger"})).unwrap();
        assert_eq!(account.kind, AccountKind::Other);
    }
}
