//! Job card submission.
//!
//! A validated draft is flattened into one multipart request: scalar fields
//! as text parts, line items as JSON-encoded text parts and photographs as
//! file parts. Each attempt carries an idempotency key. Retries of an
//! unchanged draft reuse the key so the backend can collapse duplicates.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use reqwest::multipart::{Form, Part};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::api::{unwrap_data, ApiClient};
use crate::draft::{JobCardDraft, Totals};
use crate::error::{AppError, AppResult};
use crate::photos::Photo;

pub const JOB_CARDS_PATH: &str = "/api/job-cards";

// ---------------------------------------------------------------------------
// Flattened line items
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceRecord {
    pub category_id: String,
    pub service_id: String,
    pub quantity: u32,
    pub price: f64,
    pub total: f64,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductRecord {
    pub product_id: String,
    pub size_id: Option<String>,
    pub quantity: u32,
    pub price: f64,
    pub total: f64,
}

#[derive(Debug, Clone)]
pub struct JobCardForm {
    pub job_card_id: Option<String>,
    pub fields: Vec<(&'static str, String)>,
    pub files: Vec<(String, Photo)>,
    pub services: Vec<ServiceRecord>,
    pub products: Vec<ProductRecord>,
    pub totals: Totals,
}

fn date_field(date: Option<chrono::NaiveDate>) -> String {
    date.map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

impl JobCardForm {
    /// Validate the draft and flatten it. Nothing here touches the network.
    pub fn from_draft(draft: &JobCardDraft) -> AppResult<Self> {
        draft.validate()?;
        let (Some(customer), Some(vehicle)) = (&draft.customer, &draft.vehicle) else {
            return Err(AppError::validation("Please select a customer and vehicle"));
        };

        let services: Vec<ServiceRecord> = draft
            .groups()
            .into_iter()
            .flat_map(|group| {
                let notes = draft.note_for(&group.local_id).map(str::to_string);
                group.services.iter().map(move |s| ServiceRecord {
                    category_id: group.category_id.clone(),
                    service_id: s.service_id.clone(),
                    quantity: s.quantity,
                    price: s.price,
                    total: crate::draft::round2(s.total()),
                    notes: notes.clone(),
                })
            })
            .collect();
        let products: Vec<ProductRecord> = draft
            .products
            .iter()
            .map(|l| ProductRecord {
                product_id: l.product_id.clone(),
                size_id: l.size_id.clone(),
                quantity: l.quantity,
                price: l.price,
                total: l.total(),
            })
            .collect();
        let totals = draft.totals();

        let mut fields: Vec<(&'static str, String)> = vec![
            ("customer_id", customer.id.clone()),
            ("vehicle_id", vehicle.id.clone()),
            ("status", draft.status.as_str().to_string()),
            ("priority", draft.priority.as_str().to_string()),
            ("service_date", date_field(draft.service_date)),
            (
                "estimated_delivery_date",
                date_field(draft.estimated_delivery_date),
            ),
            ("next_service_date", date_field(draft.next_service_date)),
            ("discount", draft.discount.to_string()),
            ("advance_amount", draft.advance.to_string()),
            ("subtotal", totals.subtotal.to_string()),
            ("total", totals.total.to_string()),
            ("balance", totals.balance.to_string()),
            ("common_note", draft.common_note.trim().to_string()),
            ("services", serde_json::to_string(&services)?),
            ("products", serde_json::to_string(&products)?),
        ];
        if let Some(km) = vehicle.odometer {
            fields.push(("odometer", km.to_string()));
        }
        if draft.job_card_id.is_some() {
            fields.push(("_method", "PUT".to_string()));
        }

        let mut files = Vec::new();
        for side in crate::draft::VehicleSide::ALL {
            if let Some(photo) = draft.photos.vehicle.get(&side) {
                files.push((format!("vehicle_images[{}]", side.as_str()), photo.clone()));
            }
        }
        for photo in draft.photos.documents.iter().flatten() {
            files.push(("document_images[]".to_string(), photo.clone()));
        }
        for photo in &draft.photos.extra {
            files.push(("additional_images[]".to_string(), photo.clone()));
        }

        Ok(Self {
            job_card_id: draft.job_card_id.clone(),
            fields,
            files,
            services,
            products,
            totals,
        })
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn path(&self) -> String {
        match &self.job_card_id {
            Some(id) => format!("{JOB_CARDS_PATH}/{id}"),
            None => JOB_CARDS_PATH.to_string(),
        }
    }

    pub fn into_multipart(self) -> AppResult<Form> {
        let mut form = Form::new();
        for (name, value) in self.fields {
            form = form.text(name, value);
        }
        for (name, photo) in self.files {
            let part = Part::bytes(photo.bytes)
                .file_name(photo.file_name)
                .mime_str(&photo.mime)?;
            form = form.part(name, part);
        }
        Ok(form)
    }
}

// ---------------------------------------------------------------------------
// In-flight guard and idempotency
// ---------------------------------------------------------------------------

/// Single-flight guard for a submission, with idempotency key reuse.
///
/// `S` identifies what is being submitted. A retry after a failure reuses the
/// previous key only when it is for the same `S`.
#[derive(Debug)]
pub struct SubmitGuard<S = u64> {
    in_flight: AtomicBool,
    /// Key of the last failed attempt and what it was for.
    pending: Mutex<Option<(S, String)>>,
}

impl<S> Default for SubmitGuard<S> {
    fn default() -> Self {
        Self {
            in_flight: AtomicBool::new(false),
            pending: Mutex::new(None),
        }
    }
}

/// Held while a submission is running. Dropping it, including when the
/// submitting future is cancelled, releases the guard.
#[derive(Debug)]
pub struct InFlight<'a, S> {
    guard: &'a SubmitGuard<S>,
    key: String,
}

impl<S> InFlight<'_, S> {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The backend accepted the request; the key must not be sent again.
    pub fn succeeded(self) {
        *self.guard.pending.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

impl<S> Drop for InFlight<'_, S> {
    fn drop(&mut self) {
        self.guard.in_flight.store(false, Ordering::SeqCst);
    }
}

impl<S: PartialEq> SubmitGuard<S> {
    /// Mark a submission of `subject` as started.
    pub fn begin(&self, subject: S) -> AppResult<InFlight<'_, S>> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(AppError::Busy);
        }
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        let key = match pending.as_ref() {
            Some((last, key)) if *last == subject => key.clone(),
            _ => Uuid::new_v4().to_string(),
        };
        *pending = Some((subject, key.clone()));
        Ok(InFlight { guard: self, key })
    }
}

impl<S> SubmitGuard<S> {
    pub fn is_submitting(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Drop the key of a failed attempt, e.g. when a different draft is
    /// loaded into the screen.
    pub fn forget(&self) {
        *self.pending.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

/// Which draft, and which edit of it, a submission was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DraftStamp {
    pub generation: u64,
    pub revision: u64,
}

/// State behind the job card create/edit screen.
#[derive(Debug, Default)]
pub struct ComposeSession {
    draft: Mutex<JobCardDraft>,
    /// Bumped whenever a different draft is swapped in. Never reused, unlike
    /// the draft's own revision which restarts at zero.
    generation: AtomicU64,
    pub guard: SubmitGuard<DraftStamp>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitResult {
    pub job_card_id: Option<String>,
    pub updated: bool,
    pub totals: Totals,
    pub response: Value,
}

impl ComposeSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_draft(draft: JobCardDraft) -> Self {
        Self {
            draft: Mutex::new(draft),
            ..Self::default()
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, JobCardDraft> {
        self.draft.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Stamp of the draft behind `draft`, which must be this session's lock.
    fn stamp(&self, draft: &JobCardDraft) -> DraftStamp {
        DraftStamp {
            generation: self.generation.load(Ordering::SeqCst),
            revision: draft.revision(),
        }
    }

    pub fn replace_draft(&self, draft: JobCardDraft) {
        let mut current = self.lock();
        *current = draft;
        self.generation.fetch_add(1, Ordering::SeqCst);
        drop(current);
        self.guard.forget();
    }
}

/// Validate, send, and on success clear the draft. The draft is left as it
/// was when the request fails so the user can retry.
pub async fn submit(api: &ApiClient, session: &ComposeSession) -> AppResult<SubmitResult> {
    let (form, stamp) = {
        let draft = session.lock();
        (JobCardForm::from_draft(&draft)?, session.stamp(&draft))
    };
    let ticket = session.guard.begin(stamp)?;

    let path = form.path();
    let updated = form.job_card_id.is_some();
    let totals = form.totals;
    let result = match form.into_multipart() {
        Ok(multipart) => api.send_multipart(&path, multipart, Some(ticket.key())).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(response) => {
            ticket.succeeded();
            let data = unwrap_data(response.clone());
            let job_card_id = data
                .get("id")
                .or_else(|| data.get("job_card").and_then(|j| j.get("id")))
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                });
            {
                let mut draft = session.lock();
                if session.stamp(&draft) == stamp {
                    draft.reset();
                } else {
                    warn!("draft replaced or edited while submitting; keeping it");
                }
            }
            info!(job_card_id = ?job_card_id, updated, total = totals.total, "job card submitted");
            Ok(SubmitResult {
                job_card_id,
                updated,
                totals,
                response,
            })
        }
        Err(e) => {
            drop(ticket);
            warn!(path = %path, error = %e, "job card submission failed");
            Err(e)
        }
    }
}
