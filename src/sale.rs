//! Point-of-sale transactions.
//!
//! Unlike the job card, a sale line may exist before a product is chosen for
//! it (the screen adds an empty row first). Validation rejects such rows.

use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::api::{unwrap_data, ApiClient};
use crate::draft::{balance_after_payment, round2, total_after_discount, validate_amount, Totals};
use crate::error::{AppError, AppResult};
use crate::models::{Account, PaymentMethod, Product, ServiceCategory, SubService};
use crate::submission::SubmitGuard;

pub const SALES_PATH: &str = "/api/sales";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SaleProductLine {
    pub line_id: String,
    pub product: Option<Product>,
    pub quantity: u32,
}

impl SaleProductLine {
    pub fn total(&self) -> f64 {
        self.product
            .as_ref()
            .map(|p| round2(p.selling_price * f64::from(self.quantity)))
            .unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SaleServiceLine {
    pub line_id: String,
    pub category_id: String,
    pub service: SubService,
    pub quantity: u32,
}

impl SaleServiceLine {
    pub fn total(&self) -> f64 {
        round2(self.service.price * f64::from(self.quantity))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SaleDraft {
    pub account: Option<Account>,
    pub sales_account: Option<Account>,
    pub payment_method: PaymentMethod,
    pub product_lines: Vec<SaleProductLine>,
    pub service_lines: Vec<SaleServiceLine>,
    pub discount: f64,
    pub paid: f64,
    pub note: String,
}

impl SaleDraft {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_account(&mut self, account: Account) {
        self.account = Some(account);
    }

    pub fn set_sales_account(&mut self, account: Account) {
        self.sales_account = Some(account);
    }

    pub fn set_discount(&mut self, amount: f64) -> AppResult<()> {
        self.discount = validate_amount("Discount", amount)?;
        Ok(())
    }

    pub fn set_paid(&mut self, amount: f64) -> AppResult<()> {
        self.paid = validate_amount("Paid amount", amount)?;
        Ok(())
    }

    /// Add an empty row; returns its id.
    pub fn add_product_line(&mut self) -> String {
        let line_id = Uuid::new_v4().to_string();
        self.product_lines.push(SaleProductLine {
            line_id: line_id.clone(),
            product: None,
            quantity: 1,
        });
        line_id
    }

    pub fn set_line_product(&mut self, line_id: &str, product: Product) -> AppResult<()> {
        if !product.is_in_stock() {
            return Err(AppError::validation(format!(
                "{} is out of stock",
                product.name
            )));
        }
        let line = self.line_mut(line_id)?;
        line.quantity = line.quantity.clamp(1, product.available_quantity);
        line.product = Some(product);
        Ok(())
    }

    /// Clamp to `[1, available]`; without a product only the lower bound applies.
    pub fn set_line_quantity(&mut self, line_id: &str, quantity: u32) -> AppResult<u32> {
        let line = self.line_mut(line_id)?;
        let upper = line
            .product
            .as_ref()
            .map(|p| p.available_quantity.max(1))
            .unwrap_or(u32::MAX);
        line.quantity = quantity.clamp(1, upper);
        Ok(line.quantity)
    }

    pub fn remove_product_line(&mut self, line_id: &str) -> bool {
        let before = self.product_lines.len();
        self.product_lines.retain(|l| l.line_id != line_id);
        self.product_lines.len() != before
    }

    pub fn add_service_line(
        &mut self,
        category: &ServiceCategory,
        service_id: &str,
    ) -> AppResult<String> {
        let service = category
            .services
            .iter()
            .find(|s| s.id == service_id)
            .cloned()
            .ok_or_else(|| AppError::validation("Service not found in category"))?;
        let line_id = Uuid::new_v4().to_string();
        self.service_lines.push(SaleServiceLine {
            line_id: line_id.clone(),
            category_id: category.id.clone(),
            service,
            quantity: 1,
        });
        Ok(line_id)
    }

    pub fn remove_service_line(&mut self, line_id: &str) -> bool {
        let before = self.service_lines.len();
        self.service_lines.retain(|l| l.line_id != line_id);
        self.service_lines.len() != before
    }

    fn line_mut(&mut self, line_id: &str) -> AppResult<&mut SaleProductLine> {
        self.product_lines
            .iter_mut()
            .find(|l| l.line_id == line_id)
            .ok_or_else(|| AppError::validation("Sale line not found"))
    }

    pub fn totals(&self) -> Totals {
        let products: f64 = self.product_lines.iter().map(SaleProductLine::total).sum();
        let services: f64 = self.service_lines.iter().map(SaleServiceLine::total).sum();
        let subtotal = round2(products + services);
        let total = total_after_discount(subtotal, self.discount);
        Totals {
            subtotal,
            total,
            balance: balance_after_payment(total, self.paid),
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.account.is_none() {
            return Err(AppError::validation("Please select an account"));
        }
        if self.sales_account.is_none() {
            return Err(AppError::validation("Please select a sales account"));
        }
        if self.product_lines.is_empty() && self.service_lines.is_empty() {
            return Err(AppError::validation("Add at least one product or service"));
        }
        if let Some(pos) = self.product_lines.iter().position(|l| l.product.is_none()) {
            return Err(AppError::validation(format!(
                "Select a product for line {}",
                pos + 1
            )));
        }
        if let Some(line) = self.product_lines.iter().find(|l| {
            l.product
                .as_ref()
                .is_some_and(|p| l.quantity > p.available_quantity)
        }) {
            let name = line.product.as_ref().map(|p| p.name.as_str()).unwrap_or("");
            return Err(AppError::validation(format!("Not enough stock for {name}")));
        }
        Ok(())
    }

    pub fn to_payload(&self) -> AppResult<Value> {
        self.validate()?;
        let totals = self.totals();
        let products: Vec<Value> = self
            .product_lines
            .iter()
            .filter_map(|l| {
                l.product.as_ref().map(|p| {
                    serde_json::json!({
                        "product_id": p.id,
                        "quantity": l.quantity,
                        "price": p.selling_price,
                        "total": l.total(),
                    })
                })
            })
            .collect();
        let services: Vec<Value> = self
            .service_lines
            .iter()
            .map(|l| {
                serde_json::json!({
                    "category_id": l.category_id,
                    "service_id": l.service.id,
                    "quantity": l.quantity,
                    "price": l.service.price,
                    "total": l.total(),
                })
            })
            .collect();
        Ok(serde_json::json!({
            "account_id": self.account.as_ref().map(|a| a.id.clone()),
            "sales_account_id": self.sales_account.as_ref().map(|a| a.id.clone()),
            "payment_method": self.payment_method,
            "products": products,
            "services": services,
            "discount": self.discount,
            "paid_amount": self.paid,
            "subtotal": totals.subtotal,
            "total": totals.total,
            "balance": totals.balance,
            "note": self.note.trim(),
        }))
    }
}

/// Method names as the webview sends them.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SaleRequest {
    SetAccount { account: Account },
    SetSalesAccount { account: Account },
    SetPaymentMethod { method: PaymentMethod },
    SetDiscount { amount: f64 },
    SetPaid { amount: f64 },
    SetNote { note: String },
    AddProductLine,
    SetLineProduct { line_id: String, product: Product },
    SetLineQuantity { line_id: String, quantity: u32 },
    RemoveProductLine { line_id: String },
    AddServiceLine { category: ServiceCategory, service_id: String },
    RemoveServiceLine { line_id: String },
}

impl SaleDraft {
    pub fn apply(&mut self, request: SaleRequest) -> AppResult<()> {
        match request {
            SaleRequest::SetAccount { account } => self.set_account(account),
            SaleRequest::SetSalesAccount { account } => self.set_sales_account(account),
            SaleRequest::SetPaymentMethod { method } => self.payment_method = method,
            SaleRequest::SetDiscount { amount } => self.set_discount(amount)?,
            SaleRequest::SetPaid { amount } => self.set_paid(amount)?,
            SaleRequest::SetNote { note } => self.note = note,
            SaleRequest::AddProductLine => {
                self.add_product_line();
            }
            SaleRequest::SetLineProduct { line_id, product } => {
                self.set_line_product(&line_id, product)?
            }
            SaleRequest::SetLineQuantity { line_id, quantity } => {
                self.set_line_quantity(&line_id, quantity)?;
            }
            SaleRequest::RemoveProductLine { line_id } => {
                self.remove_product_line(&line_id);
            }
            SaleRequest::AddServiceLine {
                category,
                service_id,
            } => {
                self.add_service_line(&category, &service_id)?;
            }
            SaleRequest::RemoveServiceLine { line_id } => {
                self.remove_service_line(&line_id);
            }
        }
        Ok(())
    }
}

/// State behind the point-of-sale screen.
#[derive(Debug, Default)]
pub struct SaleSession {
    draft: Mutex<SaleDraft>,
    /// Keyed by the exact draft that was sent, so an unchanged retry reuses
    /// its idempotency key.
    pub guard: SubmitGuard<SaleDraft>,
}

impl SaleSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_draft(draft: SaleDraft) -> Self {
        Self {
            draft: Mutex::new(draft),
            guard: SubmitGuard::default(),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, SaleDraft> {
        self.draft.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn replace(&self, draft: SaleDraft) {
        *self.lock() = draft;
        self.guard.forget();
    }
}

/// Post the current sale. The draft is reset only when the backend accepts
/// it and nobody edited it while the request was in flight.
pub async fn submit_sale(api: &ApiClient, session: &SaleSession) -> AppResult<Value> {
    let snapshot = session.lock().clone();
    let payload = snapshot.to_payload()?;
    let ticket = session.guard.begin(snapshot.clone())?;

    let resp = match api
        .post_json_idempotent(SALES_PATH, &payload, ticket.key())
        .await
    {
        Ok(resp) => resp,
        Err(e) => {
            warn!(error = %e, "sale submission failed");
            return Err(e);
        }
    };
    ticket.succeeded();

    let data = unwrap_data(resp);
    info!(
        sale_id = %data.get("id").map(|v| v.to_string()).unwrap_or_default(),
        total = snapshot.totals().total,
        "sale recorded"
    );
    let mut draft = session.lock();
    if *draft == snapshot {
        *draft = SaleDraft::new();
    } else {
        warn!("sale edited while submitting; keeping local changes");
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::api::test_server;
    use crate::config::ClientConfig;
    use crate::draft::fixtures::{category, product, sub};
    use crate::models::AccountKind;
    use crate::storage::MemoryTokenStore;

    fn account(id: &str, kind: AccountKind) -> Account {
        Account {
            id: id.into(),
            name: format!("Account {id}"),
            kind,
        }
    }

    fn ready_sale() -> SaleDraft {
        let mut sale = SaleDraft::new();
        sale.set_account(account("a1", AccountKind::Customer));
        sale.set_sales_account(account("s1", AccountKind::Sales));
        let line = sale.add_product_line();
        sale.set_line_product(&line, product("p1", 20.0, 5)).unwrap();
        sale.set_line_quantity(&line, 2).unwrap();
        sale
    }

    #[test]
    fn test_sale_totals() {
        let mut sale = ready_sale();
        let cat = category("cat-oil", "Oil Change", vec![sub("s1", 50.0)]);
        sale.add_service_line(&cat, "s1").unwrap();
        sale.set_discount(10.0).unwrap();
        sale.set_paid(100.0).unwrap();
        let t = sale.totals();
        assert_eq!(t.subtotal, 90.0);
        assert_eq!(t.total, 80.0);
        assert_eq!(t.balance, 0.0);
    }

    #[test]
    fn test_requires_accounts() {
        let mut sale = ready_sale();
        sale.account = None;
        assert!(sale.validate().unwrap_err().user_message().contains("account"));

        let mut sale = ready_sale();
        sale.sales_account = None;
        assert!(sale
            .validate()
            .unwrap_err()
            .user_message()
            .contains("sales account"));
    }

    #[test]
    fn test_every_line_needs_a_product() {
        let mut sale = ready_sale();
        sale.add_product_line();
        let err = sale.validate().unwrap_err();
        assert_eq!(err.user_message(), "Select a product for line 2");
    }

    #[test]
    fn test_line_quantity_clamped() {
        let mut sale = ready_sale();
        let line = sale.product_lines[0].line_id.clone();
        assert_eq!(sale.set_line_quantity(&line, 50).unwrap(), 5);
        assert_eq!(sale.set_line_quantity(&line, 0).unwrap(), 1);
        assert!(sale.set_line_product(&line, product("p0", 1.0, 0)).is_err());
        assert_eq!(sale.product_lines[0].product.as_ref().unwrap().id, "p1");
    }

    #[test]
    fn test_remove_lines() {
        let mut sale = ready_sale();
        let cat = category("c", "Wash", vec![sub("w", 5.0)]);
        let svc = sale.add_service_line(&cat, "w").unwrap();
        assert!(sale.add_service_line(&cat, "missing").is_err());
        assert!(sale.remove_service_line(&svc));
        assert!(!sale.remove_service_line(&svc));
        let line = sale.product_lines[0].line_id.clone();
        assert!(sale.remove_product_line(&line));
        assert!(sale.product_lines.is_empty());
    }

    #[test]
    fn test_apply_tagged_requests() {
        let mut sale = SaleDraft::new();
        let req: SaleRequest = serde_json::from_value(serde_json::json!({
            "type": "set_payment_method",
            "method": "bank"
        }))
        .unwrap();
        sale.apply(req).unwrap();
        assert_eq!(sale.payment_method, PaymentMethod::Bank);
        sale.apply(SaleRequest::AddProductLine).unwrap();
        assert_eq!(sale.product_lines.len(), 1);
    }

    fn client(base: &str) -> ApiClient {
        ApiClient::new(
            ClientConfig::with_base_url(base),
            Arc::new(MemoryTokenStore::with_token("tok")),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_submit_sale_posts_and_resets() {
        let (base, recorder) = test_server::spawn(201, r#"{"data": {"id": 301}}"#).await;
        let mut sale = ready_sale();
        sale.payment_method = PaymentMethod::Credit;
        let session = SaleSession::with_draft(sale);

        let data = submit_sale(&client(&base), &session).await.unwrap();
        assert_eq!(data["id"], 301);
        assert!(session.lock().product_lines.is_empty());

        let req = &recorder.requests()[0];
        assert!(req.headers.get("idempotency-key").is_some());
        let body: Value = serde_json::from_slice(&req.body).unwrap();
        assert_eq!(body["payment_method"], "credit");
        assert_eq!(body["products"][0]["total"], 40.0);
        assert_eq!(body["balance"], 40.0);
    }

    #[tokio::test]
    async fn test_failed_sale_keeps_draft_and_key() {
        let (base, recorder) =
            test_server::spawn(422, r#"{"message": "Insufficient stock"}"#).await;
        let session = SaleSession::with_draft(ready_sale());
        let before = session.lock().clone();
        let api = client(&base);

        let err = submit_sale(&api, &session).await.unwrap_err();
        assert_eq!(err.user_message(), "Insufficient stock");
        assert_eq!(*session.lock(), before);

        submit_sale(&api, &session).await.unwrap_err();
        let reqs = recorder.requests();
        assert_eq!(reqs.len(), 2);
        assert_eq!(
            reqs[0].headers.get("idempotency-key"),
            reqs[1].headers.get("idempotency-key")
        );
    }

    #[tokio::test]
    async fn test_double_tap_posts_once() {
        let (base, recorder) = test_server::spawn_delayed(
            201,
            r#"{"data": {"id": 302}}"#,
            std::time::Duration::from_millis(150),
        )
        .await;
        let session = SaleSession::with_draft(ready_sale());
        let api = client(&base);

        let (first, second) = tokio::join!(submit_sale(&api, &session), async {
            tokio::time::sleep(std::time::Duration::from_millis(30)).await;
            submit_sale(&api, &session).await
        });
        assert_eq!(first.unwrap()["id"], 302);
        assert!(matches!(second, Err(AppError::Busy)));
        assert_eq!(recorder.requests().len(), 1);
        assert!(!session.guard.is_submitting());
    }

    #[tokio::test]
    async fn test_sale_edited_during_submit_is_kept() {
        let (base, _recorder) = test_server::spawn_delayed(
            201,
            r#"{"data": {"id": 303}}"#,
            std::time::Duration::from_millis(150),
        )
        .await;
        let session = SaleSession::with_draft(ready_sale());
        let api = client(&base);

        let (result, ()) = tokio::join!(submit_sale(&api, &session), async {
            tokio::time::sleep(std::time::Duration::from_millis(30)).await;
            session.lock().paid = 10.0;
        });
        assert_eq!(result.unwrap()["id"], 303);
        let draft = session.lock();
        assert_eq!(draft.paid, 10.0);
        assert_eq!(draft.product_lines.len(), 1);
    }
}
