//! The job card being composed on the create/edit screen.
//!
//! Everything that ends up in the submission lives in one [`JobCardDraft`]
//! and changes only through [`JobCardDraft::apply`]. Service groups are keyed
//! by category id, so picking a category that is already on the card
//! overwrites that group instead of adding a second one.

use std::collections::HashMap;

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{
    Customer, JobCard, JobCardStatus, Priority, Product, ServiceCategory, SubService, Vehicle,
};
use crate::photos::{Photo, PhotoUpload};

pub const DOCUMENT_PHOTO_COUNT: usize = 2;

// ---------------------------------------------------------------------------
// Line items
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectedService {
    pub service_id: String,
    pub name: String,
    pub price: f64,
    pub quantity: u32,
}

impl SelectedService {
    fn from_sub_service(s: &SubService) -> Self {
        Self {
            service_id: s.id.clone(),
            name: s.name.clone(),
            price: s.price,
            quantity: 1,
        }
    }

    pub fn total(&self) -> f64 {
        self.price * f64::from(self.quantity)
    }
}

/// All sub-services picked under one category.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceGroup {
    /// Client-side id, stable across overwrites of the same category.
    pub local_id: String,
    pub category_id: String,
    pub category_name: String,
    pub services: Vec<SelectedService>,
    #[serde(skip)]
    position: u64,
}

impl ServiceGroup {
    pub fn total(&self) -> f64 {
        round2(self.services.iter().map(SelectedService::total).sum())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductLine {
    pub product_id: String,
    pub size_id: Option<String>,
    pub name: String,
    pub price: f64,
    pub quantity: u32,
    pub available_quantity: u32,
}

impl ProductLine {
    pub fn total(&self) -> f64 {
        round2(self.price * f64::from(self.quantity))
    }

    fn is(&self, product_id: &str, size_id: Option<&str>) -> bool {
        self.product_id == product_id && self.size_id.as_deref() == size_id
    }
}

/// Sub-service selection for the category currently open in the picker.
/// Toggling here never touches groups already on the card.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ServicePicker {
    pub category: Option<ServiceCategory>,
    pub selected: Vec<SubService>,
}

impl ServicePicker {
    pub fn is_selected(&self, service_id: &str) -> bool {
        self.selected.iter().any(|s| s.id == service_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleSide {
    Front,
    Back,
    Left,
    Right,
}

impl VehicleSide {
    pub const ALL: [VehicleSide; 4] = [Self::Front, Self::Back, Self::Left, Self::Right];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Front => "front",
            Self::Back => "back",
            Self::Left => "left",
            Self::Right => "right",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DraftPhotos {
    pub vehicle: HashMap<VehicleSide, Photo>,
    pub documents: [Option<Photo>; DOCUMENT_PHOTO_COUNT],
    pub extra: Vec<Photo>,
}

impl DraftPhotos {
    pub fn missing_sides(&self) -> Vec<VehicleSide> {
        VehicleSide::ALL
            .into_iter()
            .filter(|side| !self.vehicle.contains_key(side))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Totals
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Totals {
    pub subtotal: f64,
    pub total: f64,
    pub balance: f64,
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// `total = max(0, subtotal - discount)`.
pub fn total_after_discount(subtotal: f64, discount: f64) -> f64 {
    round2((subtotal - discount).max(0.0))
}

/// `balance = max(0, total - paid)`.
pub fn balance_after_payment(total: f64, paid: f64) -> f64 {
    round2((total - paid).max(0.0))
}

pub(crate) fn validate_amount(label: &str, value: f64) -> AppResult<f64> {
    if !value.is_finite() || value < 0.0 {
        return Err(AppError::validation(format!(
            "{label} must be zero or a positive amount"
        )));
    }
    Ok(round2(value))
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum DraftAction {
    SetCustomer(Customer),
    ClearCustomer,
    SetVehicle(Vehicle),
    SetStatus(JobCardStatus),
    SetPriority(Priority),
    SetServiceDate(Option<NaiveDate>),
    SetEstimatedDeliveryDate(Option<NaiveDate>),
    SetNextServiceDate(Option<NaiveDate>),
    SetDiscount(f64),
    SetAdvance(f64),
    SetCommonNote(String),

    BeginServicePick(ServiceCategory),
    ToggleSubService(SubService),
    CommitServicePick,
    CancelServicePick,
    RemoveServiceGroup { local_id: String },
    SetServiceNote { local_id: String, note: String },

    SelectProduct(Product),
    SelectSizedProduct(SizedSelection),
    SetProductQuantity { product_id: String, size_id: Option<String>, quantity: u32 },
    IncrementProduct { product_id: String, size_id: Option<String> },
    DecrementProduct { product_id: String, size_id: Option<String> },
    RemoveProduct { product_id: String, size_id: Option<String> },

    SetVehiclePhoto { side: VehicleSide, photo: Photo },
    ClearVehiclePhoto(VehicleSide),
    SetDocumentPhoto { slot: usize, photo: Photo },
    AddExtraPhoto(Photo),
    RemoveExtraPhoto(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Changed,
    Unchanged,
}

/// Action as sent by the webview. Photos arrive as data URLs and product
/// selections may name a size variant.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DraftRequest {
    SetCustomer { customer: Customer },
    ClearCustomer,
    SetVehicle { vehicle: Vehicle },
    SetStatus { status: JobCardStatus },
    SetPriority { priority: Priority },
    SetServiceDate { date: Option<NaiveDate> },
    SetEstimatedDeliveryDate { date: Option<NaiveDate> },
    SetNextServiceDate { date: Option<NaiveDate> },
    SetDiscount { amount: f64 },
    SetAdvance { amount: f64 },
    SetCommonNote { note: String },
    BeginServicePick { category: ServiceCategory },
    ToggleSubService { service: SubService },
    CommitServicePick,
    CancelServicePick,
    RemoveServiceGroup { local_id: String },
    SetServiceNote { local_id: String, note: String },
    SelectProduct {
        product: Product,
        #[serde(default)]
        size_id: Option<String>,
    },
    SetProductQuantity {
        product_id: String,
        #[serde(default)]
        size_id: Option<String>,
        quantity: u32,
    },
    IncrementProduct {
        product_id: String,
        #[serde(default)]
        size_id: Option<String>,
    },
    DecrementProduct {
        product_id: String,
        #[serde(default)]
        size_id: Option<String>,
    },
    RemoveProduct {
        product_id: String,
        #[serde(default)]
        size_id: Option<String>,
    },
    SetVehiclePhoto { side: VehicleSide, photo: PhotoUpload },
    ClearVehiclePhoto { side: VehicleSide },
    SetDocumentPhoto { slot: usize, photo: PhotoUpload },
    AddExtraPhoto { photo: PhotoUpload },
    RemoveExtraPhoto { index: usize },
}

impl DraftRequest {
    /// Decode attached photos and resolve size variants.
    pub fn into_action(self) -> AppResult<DraftAction> {
        Ok(match self {
            Self::SetCustomer { customer } => DraftAction::SetCustomer(customer),
            Self::ClearCustomer => DraftAction::ClearCustomer,
            Self::SetVehicle { vehicle } => DraftAction::SetVehicle(vehicle),
            Self::SetStatus { status } => DraftAction::SetStatus(status),
            Self::SetPriority { priority } => DraftAction::SetPriority(priority),
            Self::SetServiceDate { date } => DraftAction::SetServiceDate(date),
            Self::SetEstimatedDeliveryDate { date } => DraftAction::SetEstimatedDeliveryDate(date),
            Self::SetNextServiceDate { date } => DraftAction::SetNextServiceDate(date),
            Self::SetDiscount { amount } => DraftAction::SetDiscount(amount),
            Self::SetAdvance { amount } => DraftAction::SetAdvance(amount),
            Self::SetCommonNote { note } => DraftAction::SetCommonNote(note),
            Self::BeginServicePick { category } => DraftAction::BeginServicePick(category),
            Self::ToggleSubService { service } => DraftAction::ToggleSubService(service),
            Self::CommitServicePick => DraftAction::CommitServicePick,
            Self::CancelServicePick => DraftAction::CancelServicePick,
            Self::RemoveServiceGroup { local_id } => DraftAction::RemoveServiceGroup { local_id },
            Self::SetServiceNote { local_id, note } => {
                DraftAction::SetServiceNote { local_id, note }
            }
            Self::SelectProduct { product, size_id } => match size_id {
                Some(size_id) => {
                    let sized = product.with_size(&size_id).ok_or_else(|| {
                        AppError::validation(format!("Unknown size for {}", product.name))
                    })?;
                    DraftAction::SelectSizedProduct(SizedSelection {
                        product: sized,
                        size_id,
                    })
                }
                None => DraftAction::SelectProduct(product),
            },
            Self::SetProductQuantity {
                product_id,
                size_id,
                quantity,
            } => DraftAction::SetProductQuantity {
                product_id,
                size_id,
                quantity,
            },
            Self::IncrementProduct {
                product_id,
                size_id,
            } => DraftAction::IncrementProduct {
                product_id,
                size_id,
            },
            Self::DecrementProduct {
                product_id,
                size_id,
            } => DraftAction::DecrementProduct {
                product_id,
                size_id,
            },
            Self::RemoveProduct {
                product_id,
                size_id,
            } => DraftAction::RemoveProduct {
                product_id,
                size_id,
            },
            Self::SetVehiclePhoto { side, photo } => DraftAction::SetVehiclePhoto {
                side,
                photo: Photo::from_upload(&photo)?,
            },
            Self::ClearVehiclePhoto { side } => DraftAction::ClearVehiclePhoto(side),
            Self::SetDocumentPhoto { slot, photo } => DraftAction::SetDocumentPhoto {
                slot,
                photo: Photo::from_upload(&photo)?,
            },
            Self::AddExtraPhoto { photo } => DraftAction::AddExtraPhoto(Photo::from_upload(&photo)?),
            Self::RemoveExtraPhoto { index } => DraftAction::RemoveExtraPhoto(index),
        })
    }
}

/// A product selection for a specific size variant.
#[derive(Debug, Clone)]
pub struct SizedSelection {
    pub product: Product,
    pub size_id: String,
}

// ---------------------------------------------------------------------------
// Draft
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct JobCardDraft {
    /// Set when editing an existing job card.
    pub job_card_id: Option<String>,
    pub customer: Option<Customer>,
    pub vehicle: Option<Vehicle>,
    pub status: JobCardStatus,
    pub priority: Priority,
    pub service_date: Option<NaiveDate>,
    pub estimated_delivery_date: Option<NaiveDate>,
    pub next_service_date: Option<NaiveDate>,
    pub discount: f64,
    pub advance: f64,
    pub common_note: String,
    pub picker: ServicePicker,
    groups: HashMap<String, ServiceGroup>,
    notes: HashMap<String, String>,
    pub products: Vec<ProductLine>,
    pub photos: DraftPhotos,
    next_position: u64,
    revision: u64,
}

impl Default for JobCardDraft {
    fn default() -> Self {
        Self::new()
    }
}

impl JobCardDraft {
    pub fn new() -> Self {
        Self {
            job_card_id: None,
            customer: None,
            vehicle: None,
            status: JobCardStatus::Pending,
            priority: Priority::Medium,
            service_date: Some(Local::now().date_naive()),
            estimated_delivery_date: None,
            next_service_date: None,
            discount: 0.0,
            advance: 0.0,
            common_note: String::new(),
            picker: ServicePicker::default(),
            groups: HashMap::new(),
            notes: HashMap::new(),
            products: Vec::new(),
            photos: DraftPhotos::default(),
            next_position: 0,
            revision: 0,
        }
    }

    /// Seed a draft from an existing job card for the edit screen. Photos
    /// already on the server are kept unless new ones are attached.
    pub fn from_job_card(card: &JobCard) -> Self {
        let mut draft = Self::new();
        draft.job_card_id = Some(card.id.clone());
        draft.customer = Some(card.customer.clone());
        draft.vehicle = Some(card.vehicle.clone());
        draft.status = card.status;
        draft.priority = card.priority;
        draft.service_date = card.service_date;
        draft.estimated_delivery_date = card.estimated_delivery_date;
        draft.next_service_date = card.next_service_date;
        draft.discount = card.discount.max(0.0);
        draft.advance = card.advance.max(0.0);
        draft.common_note = card.common_note.clone().unwrap_or_default();

        for line in &card.services {
            let group = draft.group_for_category(
                &line.category_id,
                line.category_name.as_deref().unwrap_or(""),
            );
            group.services.push(SelectedService {
                service_id: line.service_id.clone(),
                name: line.service_name.clone().unwrap_or_default(),
                price: line.price,
                quantity: line.quantity.max(1),
            });
            let local_id = group.local_id.clone();
            if let Some(note) = line.notes.as_deref().filter(|n| !n.trim().is_empty()) {
                draft.notes.entry(local_id).or_insert_with(|| note.to_string());
            }
        }

        for line in &card.products {
            let quantity = line.quantity.max(1);
            draft.products.push(ProductLine {
                product_id: line.product_id.clone(),
                size_id: line.size_id.clone(),
                name: line.product_name.clone().unwrap_or_default(),
                price: line.price,
                quantity,
                // Stock already reserved for this card counts as available.
                available_quantity: line.available_quantity.max(quantity),
            });
        }
        draft
    }

    fn group_for_category(&mut self, category_id: &str, category_name: &str) -> &mut ServiceGroup {
        let position = self.next_position;
        let group = self
            .groups
            .entry(category_id.to_string())
            .or_insert_with(|| ServiceGroup {
                local_id: Uuid::new_v4().to_string(),
                category_id: category_id.to_string(),
                category_name: category_name.to_string(),
                services: Vec::new(),
                position,
            });
        if group.position == position {
            self.next_position += 1;
        }
        group
    }

    pub fn is_editing(&self) -> bool {
        self.job_card_id.is_some()
    }

    /// Bumped on every change. Submissions use it to tell a retry of the same
    /// draft from a new attempt.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Groups in the order they were first added.
    pub fn groups(&self) -> Vec<&ServiceGroup> {
        let mut groups: Vec<&ServiceGroup> = self.groups.values().collect();
        groups.sort_by_key(|g| g.position);
        groups
    }

    pub fn group_by_local_id(&self, local_id: &str) -> Option<&ServiceGroup> {
        self.groups.values().find(|g| g.local_id == local_id)
    }

    pub fn note_for(&self, local_id: &str) -> Option<&str> {
        self.notes.get(local_id).map(String::as_str)
    }

    pub fn totals(&self) -> Totals {
        let services: f64 = self.groups.values().map(ServiceGroup::total).sum();
        let products: f64 = self.products.iter().map(ProductLine::total).sum();
        let subtotal = round2(services + products);
        let total = total_after_discount(subtotal, self.discount);
        Totals {
            subtotal,
            total,
            balance: balance_after_payment(total, self.advance),
        }
    }

    /// Single entry point for every edit made on the screen.
    pub fn apply(&mut self, action: DraftAction) -> AppResult<Outcome> {
        let outcome = self.reduce(action)?;
        if outcome == Outcome::Changed {
            self.revision += 1;
        }
        Ok(outcome)
    }

    fn reduce(&mut self, action: DraftAction) -> AppResult<Outcome> {
        match action {
            DraftAction::SetCustomer(customer) => {
                if self.customer.as_ref() == Some(&customer) {
                    return Ok(Outcome::Unchanged);
                }
                let vehicle_belongs = self
                    .vehicle
                    .as_ref()
                    .is_some_and(|v| v.customer_id == customer.id);
                if !vehicle_belongs {
                    self.vehicle = None;
                }
                self.customer = Some(customer);
            }
            DraftAction::ClearCustomer => {
                if self.customer.is_none() && self.vehicle.is_none() {
                    return Ok(Outcome::Unchanged);
                }
                self.customer = None;
                self.vehicle = None;
            }
            DraftAction::SetVehicle(vehicle) => {
                let customer = self
                    .customer
                    .as_ref()
                    .ok_or_else(|| AppError::validation("Select a customer first"))?;
                if !vehicle.customer_id.is_empty() && vehicle.customer_id != customer.id {
                    return Err(AppError::validation(
                        "This vehicle belongs to a different customer",
                    ));
                }
                self.vehicle = Some(vehicle);
            }
            DraftAction::SetStatus(status) => self.status = status,
            DraftAction::SetPriority(priority) => self.priority = priority,
            DraftAction::SetServiceDate(date) => self.service_date = date,
            DraftAction::SetEstimatedDeliveryDate(date) => self.estimated_delivery_date = date,
            DraftAction::SetNextServiceDate(date) => self.next_service_date = date,
            DraftAction::SetDiscount(amount) => self.discount = validate_amount("Discount", amount)?,
            DraftAction::SetAdvance(amount) => {
                self.advance = validate_amount("Advance amount", amount)?
            }
            DraftAction::SetCommonNote(note) => self.common_note = note,

            DraftAction::BeginServicePick(category) => {
                let selected = self
                    .groups
                    .get(&category.id)
                    .map(|g| {
                        g.services
                            .iter()
                            .map(|s| SubService {
                                id: s.service_id.clone(),
                                name: s.name.clone(),
                                price: s.price,
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                self.picker = ServicePicker {
                    category: Some(category),
                    selected,
                };
            }
            DraftAction::ToggleSubService(service) => {
                if self.picker.category.is_none() {
                    return Err(AppError::validation("Select a service category first"));
                }
                if let Some(idx) = self.picker.selected.iter().position(|s| s.id == service.id) {
                    self.picker.selected.remove(idx);
                } else {
                    self.picker.selected.push(service);
                }
            }
            DraftAction::CommitServicePick => self.commit_service_pick()?,
            DraftAction::CancelServicePick => {
                if self.picker == ServicePicker::default() {
                    return Ok(Outcome::Unchanged);
                }
                self.picker = ServicePicker::default();
            }
            DraftAction::RemoveServiceGroup { local_id } => {
                let Some(category_id) = self
                    .groups
                    .values()
                    .find(|g| g.local_id == local_id)
                    .map(|g| g.category_id.clone())
                else {
                    return Ok(Outcome::Unchanged);
                };
                self.groups.remove(&category_id);
                self.notes.remove(&local_id);
                debug!(local_id = %local_id, "service group removed");
            }
            DraftAction::SetServiceNote { local_id, note } => {
                if self.group_by_local_id(&local_id).is_none() {
                    return Err(AppError::validation("Service group not found"));
                }
                if note.trim().is_empty() {
                    self.notes.remove(&local_id);
                } else {
                    self.notes.insert(local_id, note);
                }
            }

            DraftAction::SelectProduct(product) => return self.select_product(product, None),
            DraftAction::SelectSizedProduct(SizedSelection { product, size_id }) => {
                return self.select_product(product, Some(size_id))
            }
            DraftAction::SetProductQuantity {
                product_id,
                size_id,
                quantity,
            } => {
                let line = self.product_line_mut(&product_id, size_id.as_deref())?;
                let clamped = quantity.clamp(1, line.available_quantity.max(1));
                if clamped == line.quantity {
                    return Ok(Outcome::Unchanged);
                }
                line.quantity = clamped;
            }
            DraftAction::IncrementProduct {
                product_id,
                size_id,
            } => {
                let line = self.product_line_mut(&product_id, size_id.as_deref())?;
                if line.quantity >= line.available_quantity {
                    return Ok(Outcome::Unchanged);
                }
                line.quantity += 1;
            }
            DraftAction::DecrementProduct {
                product_id,
                size_id,
            } => {
                let line = self.product_line_mut(&product_id, size_id.as_deref())?;
                if line.quantity <= 1 {
                    return Ok(Outcome::Unchanged);
                }
                line.quantity -= 1;
            }
            DraftAction::RemoveProduct {
                product_id,
                size_id,
            } => {
                let before = self.products.len();
                self.products
                    .retain(|l| !l.is(&product_id, size_id.as_deref()));
                if self.products.len() == before {
                    return Ok(Outcome::Unchanged);
                }
            }

            DraftAction::SetVehiclePhoto { side, photo } => {
                self.photos.vehicle.insert(side, photo);
            }
            DraftAction::ClearVehiclePhoto(side) => {
                if self.photos.vehicle.remove(&side).is_none() {
                    return Ok(Outcome::Unchanged);
                }
            }
            DraftAction::SetDocumentPhoto { slot, photo } => {
                let target = self
                    .photos
                    .documents
                    .get_mut(slot)
                    .ok_or_else(|| AppError::validation("Invalid document slot"))?;
                *target = Some(photo);
            }
            DraftAction::AddExtraPhoto(photo) => self.photos.extra.push(photo),
            DraftAction::RemoveExtraPhoto(index) => {
                if index >= self.photos.extra.len() {
                    return Ok(Outcome::Unchanged);
                }
                self.photos.extra.remove(index);
            }
        }
        Ok(Outcome::Changed)
    }

    fn commit_service_pick(&mut self) -> AppResult<()> {
        let category = self
            .picker
            .category
            .clone()
            .ok_or_else(|| AppError::validation("Select a service category first"))?;
        if self.picker.selected.is_empty() {
            return Err(AppError::validation("Select at least one service"));
        }
        let services: Vec<SelectedService> = self
            .picker
            .selected
            .iter()
            .map(SelectedService::from_sub_service)
            .collect();

        let group = self.group_for_category(&category.id, &category.name);
        group.category_name = category.name.clone();
        group.services = services;
        debug!(
            category_id = %category.id,
            local_id = %group.local_id,
            services = group.services.len(),
            "service group saved"
        );
        self.picker = ServicePicker::default();
        Ok(())
    }

    fn select_product(&mut self, product: Product, size_id: Option<String>) -> AppResult<Outcome> {
        if !product.is_in_stock() {
            return Err(AppError::validation(format!(
                "{} is out of stock",
                product.name
            )));
        }
        if self
            .products
            .iter()
            .any(|l| l.is(&product.id, size_id.as_deref()))
        {
            return Ok(Outcome::Unchanged);
        }
        self.products.push(ProductLine {
            product_id: product.id,
            size_id,
            name: product.name,
            price: product.selling_price,
            quantity: 1,
            available_quantity: product.available_quantity,
        });
        Ok(Outcome::Changed)
    }

    fn product_line_mut(
        &mut self,
        product_id: &str,
        size_id: Option<&str>,
    ) -> AppResult<&mut ProductLine> {
        self.products
            .iter_mut()
            .find(|l| l.is(product_id, size_id))
            .ok_or_else(|| AppError::validation("Product is not on this job card"))
    }

    /// Checks run before any network call, in the order the screen reports
    /// them.
    pub fn validate(&self) -> AppResult<()> {
        if !self.is_editing() {
            let missing = self.photos.missing_sides();
            if !missing.is_empty() {
                let names: Vec<&str> = missing.iter().map(|s| s.as_str()).collect();
                return Err(AppError::validation(format!(
                    "Please add all vehicle photos (missing: {})",
                    names.join(", ")
                )));
            }
            if self.photos.documents.iter().any(Option::is_none) {
                return Err(AppError::validation("Please add both document photos"));
            }
        }
        if self.customer.is_none() {
            return Err(AppError::validation("Please select a customer"));
        }
        if self.vehicle.is_none() {
            return Err(AppError::validation("Please select a vehicle"));
        }
        if self.groups.is_empty() {
            return Err(AppError::validation("Please add at least one service"));
        }
        if let (Some(service), Some(delivery)) = (self.service_date, self.estimated_delivery_date)
        {
            if delivery < service {
                return Err(AppError::validation(
                    "Estimated delivery date cannot be before the service date",
                ));
            }
        }
        if let Some(line) = self
            .products
            .iter()
            .find(|l| l.quantity == 0 || l.quantity > l.available_quantity)
        {
            return Err(AppError::validation(format!(
                "Only {} of {} available",
                line.available_quantity, line.name
            )));
        }
        Ok(())
    }

    /// Discard everything after a successful submission.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

/// Read-only snapshot for the screen.
#[derive(Debug, Clone, Serialize)]
pub struct DraftView {
    pub job_card_id: Option<String>,
    pub customer: Option<Customer>,
    pub vehicle: Option<Vehicle>,
    pub status: JobCardStatus,
    pub priority: Priority,
    pub service_date: Option<NaiveDate>,
    pub estimated_delivery_date: Option<NaiveDate>,
    pub next_service_date: Option<NaiveDate>,
    pub discount: f64,
    pub advance: f64,
    pub common_note: String,
    pub picker: ServicePicker,
    pub groups: Vec<GroupView>,
    pub products: Vec<ProductLine>,
    pub vehicle_photos: Vec<VehicleSide>,
    pub document_photos: usize,
    pub extra_photos: usize,
    pub totals: Totals,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupView {
    #[serde(flatten)]
    pub group: ServiceGroup,
    pub total: f64,
    pub note: Option<String>,
}

impl From<&JobCardDraft> for DraftView {
    fn from(d: &JobCardDraft) -> Self {
        let groups = d
            .groups()
            .into_iter()
            .map(|g| GroupView {
                group: g.clone(),
                total: g.total(),
                note: d.note_for(&g.local_id).map(str::to_string),
            })
            .collect();
        let mut vehicle_photos: Vec<VehicleSide> = d.photos.vehicle.keys().copied().collect();
        vehicle_photos.sort_by_key(|s| VehicleSide::ALL.iter().position(|x| x == s));
        Self {
            job_card_id: d.job_card_id.clone(),
            customer: d.customer.clone(),
            vehicle: d.vehicle.clone(),
            status: d.status,
            priority: d.priority,
            service_date: d.service_date,
            estimated_delivery_date: d.estimated_delivery_date,
            next_service_date: d.next_service_date,
            discount: d.discount,
            advance: d.advance,
            common_note: d.common_note.clone(),
            picker: d.picker.clone(),
            groups,
            products: d.products.clone(),
            vehicle_photos,
            document_photos: d.photos.documents.iter().filter(|p| p.is_some()).count(),
            extra_photos: d.photos.extra.len(),
            totals: d.totals(),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_total_never_negative() {
        assert_eq!(total_after_discount(90.0, 10.0), 80.0);
        assert_eq!(total_after_discount(40.0, 55.5), 0.0);
        assert_eq!(total_after_discount(0.0, 0.0), 0.0);
    }

    #[test]
    fn test_balance_never_negative() {
        assert_eq!(balance_after_payment(80.0, 30.0), 50.0);
        assert_eq!(balance_after_payment(80.0, 100.0), 0.0);
    }

    #[test]
    fn test_oil_change_scenario_totals() {
        let mut d = JobCardDraft::new();
        let oil = sub("s1", 50.0);
        add_group(&mut d, category("cat-oil", "Oil Change", vec![oil.clone()]), &[oil]);
        d.apply(DraftAction::SelectProduct(product("p1", 20.0, 5))).unwrap();
        d.apply(DraftAction::IncrementProduct {
            product_id: "p1".into(),
            size_id: None,
        })
        .unwrap();
        d.apply(DraftAction::SetDiscount(10.0)).unwrap();
        d.apply(DraftAction::SetAdvance(30.0)).unwrap();

        let totals = d.totals();
        assert_eq!(totals.subtotal, 90.0);
        assert_eq!(totals.total, 80.0);
        assert_eq!(totals.balance, 50.0);
    }

    #[test]
    fn test_same_category_replaces_group() {
        let mut d = JobCardDraft::new();
        let (s1, s2) = (sub("s1", 10.0), sub("s2", 25.0));
        let cat = category("A", "Brakes", vec![s1.clone(), s2.clone()]);
        add_group(&mut d, cat.clone(), &[s1]);
        let first_local_id = d.groups()[0].local_id.clone();

        add_group(&mut d, cat, &[s2]);
        let groups = d.groups();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].services.len(), 1);
        assert_eq!(groups[0].services[0].service_id, "s2");
        assert_eq!(groups[0].local_id, first_local_id);
        assert_eq!(groups[0].total(), 25.0);
    }

    #[test]
    fn test_begin_pick_preloads_existing_group() {
        let mut d = JobCardDraft::new();
        let s1 = sub("s1", 10.0);
        let cat = category("A", "Brakes", vec![s1.clone()]);
        add_group(&mut d, cat.clone(), &[s1]);
        d.apply(DraftAction::BeginServicePick(cat)).unwrap();
        assert!(d.picker.is_selected("s1"));
    }

    #[test]
    fn test_toggle_only_affects_picker() {
        let mut d = JobCardDraft::new();
        let (s1, s2) = (sub("s1", 10.0), sub("s2", 20.0));
        add_group(&mut d, category("A", "Brakes", vec![s1.clone()]), &[s1.clone()]);

        d.apply(DraftAction::BeginServicePick(category("B", "AC", vec![s2.clone()])))
            .unwrap();
        d.apply(DraftAction::ToggleSubService(s2.clone())).unwrap();
        d.apply(DraftAction::ToggleSubService(s2.clone())).unwrap();
        assert!(d.picker.selected.is_empty());
        assert_eq!(d.groups()[0].services.len(), 1);

        let err = d.apply(DraftAction::CommitServicePick).unwrap_err();
        assert!(err.is_validation());
        assert_eq!(d.groups().len(), 1);
    }

    #[test]
    fn test_toggle_without_category_rejected() {
        let mut d = JobCardDraft::new();
        assert!(d
            .apply(DraftAction::ToggleSubService(sub("s1", 1.0)))
            .unwrap_err()
            .is_validation());
    }

    #[test]
    fn test_remove_group_keeps_siblings() {
        let mut d = JobCardDraft::new();
        let (s1, s2, s3) = (sub("s1", 10.0), sub("s2", 20.0), sub("s3", 30.0));
        add_group(&mut d, category("A", "Brakes", vec![]), &[s1]);
        add_group(&mut d, category("B", "AC", vec![]), &[s2.clone(), s3.clone()]);
        add_group(&mut d, category("C", "Wash", vec![]), &[sub("s4", 5.0)]);

        let target = d.groups()[0].local_id.clone();
        let sibling = d.groups()[1].local_id.clone();
        d.apply(DraftAction::SetServiceNote {
            local_id: target.clone(),
            note: "squeaks".into(),
        })
        .unwrap();
        d.apply(DraftAction::SetServiceNote {
            local_id: sibling.clone(),
            note: "check gas".into(),
        })
        .unwrap();

        d.apply(DraftAction::RemoveServiceGroup { local_id: target.clone() })
            .unwrap();

        let groups = d.groups();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].category_id, "B");
        assert_eq!(groups[0].services, vec![
            SelectedService::from_sub_service(&s2),
            SelectedService::from_sub_service(&s3),
        ]);
        assert_eq!(groups[1].category_id, "C");
        assert!(d.note_for(&target).is_none());
        assert_eq!(d.note_for(&sibling), Some("check gas"));
    }

    #[test]
    fn test_remove_unknown_group_is_noop() {
        let mut d = JobCardDraft::new();
        let rev = d.revision();
        let outcome = d
            .apply(DraftAction::RemoveServiceGroup {
                local_id: "nope".into(),
            })
            .unwrap();
        assert_eq!(outcome, Outcome::Unchanged);
        assert_eq!(d.revision(), rev);
    }

    #[test]
    fn test_note_requires_existing_group() {
        let mut d = JobCardDraft::new();
        let err = d
            .apply(DraftAction::SetServiceNote {
                local_id: "cat-id-not-local-id".into(),
                note: "x".into(),
            })
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_quantity_clamped_to_stock() {
        let mut d = JobCardDraft::new();
        d.apply(DraftAction::SelectProduct(product("p1", 5.0, 2))).unwrap();
        let inc = DraftAction::IncrementProduct {
            product_id: "p1".into(),
            size_id: None,
        };
        assert_eq!(d.apply(inc.clone()).unwrap(), Outcome::Changed);
        assert_eq!(d.apply(inc).unwrap(), Outcome::Unchanged);
        assert_eq!(d.products[0].quantity, 2);

        d.apply(DraftAction::SetProductQuantity {
            product_id: "p1".into(),
            size_id: None,
            quantity: 99,
        })
        .unwrap();
        assert_eq!(d.products[0].quantity, 2);

        d.apply(DraftAction::SetProductQuantity {
            product_id: "p1".into(),
            size_id: None,
            quantity: 0,
        })
        .unwrap();
        assert_eq!(d.products[0].quantity, 1);

        let dec = DraftAction::DecrementProduct {
            product_id: "p1".into(),
            size_id: None,
        };
        assert_eq!(d.apply(dec).unwrap(), Outcome::Unchanged);
        assert_eq!(d.products[0].quantity, 1);
    }

    #[test]
    fn test_out_of_stock_rejected() {
        let mut d = JobCardDraft::new();
        let err = d
            .apply(DraftAction::SelectProduct(product("p0", 9.0, 0)))
            .unwrap_err();
        assert!(err.is_validation());
        assert!(err.user_message().contains("out of stock"));
        assert!(d.products.is_empty());
    }

    #[test]
    fn test_sized_products_are_separate_lines() {
        let mut d = JobCardDraft::new();
        let mut oil = product("p1", 10.0, 5);
        oil.sizes = vec![
            crate::models::ProductSize {
                id: "1l".into(),
                label: "1L".into(),
                price: 10.0,
                available_quantity: 3,
            },
            crate::models::ProductSize {
                id: "4l".into(),
                label: "4L".into(),
                price: 35.0,
                available_quantity: 0,
            },
        ];
        let req: DraftRequest = serde_json::from_value(serde_json::json!({
            "type": "select_product",
            "product": serde_json::to_value(&oil).unwrap(),
            "size_id": "1l"
        }))
        .unwrap();
        d.apply(req.into_action().unwrap()).unwrap();
        d.apply(DraftAction::SelectProduct(oil.clone())).unwrap();
        assert_eq!(d.products.len(), 2);
        assert_eq!(d.products[0].size_id.as_deref(), Some("1l"));
        assert_eq!(d.products[0].available_quantity, 3);

        let out_of_stock = DraftRequest::SelectProduct {
            product: oil,
            size_id: Some("4l".into()),
        }
        .into_action()
        .unwrap();
        assert!(d.apply(out_of_stock).is_err());
    }

    #[test]
    fn test_remove_product_line() {
        let mut d = JobCardDraft::new();
        d.apply(DraftAction::SelectProduct(product("p1", 5.0, 2))).unwrap();
        d.apply(DraftAction::SelectProduct(product("p2", 7.0, 2))).unwrap();
        d.apply(DraftAction::RemoveProduct {
            product_id: "p1".into(),
            size_id: None,
        })
        .unwrap();
        assert_eq!(d.products.len(), 1);
        assert_eq!(d.products[0].product_id, "p2");
    }

    #[test]
    fn test_validation_requires_vehicle_photos_first() {
        let mut d = complete_draft();
        assert!(d.validate().is_ok());

        d.apply(DraftAction::ClearVehiclePhoto(VehicleSide::Left)).unwrap();
        let err = d.validate().unwrap_err();
        assert!(err.user_message().contains("left"));
    }

    #[test]
    fn test_validation_requires_selections() {
        let mut d = complete_draft();
        d.apply(DraftAction::ClearCustomer).unwrap();
        assert!(d.vehicle.is_none());
        assert!(d.validate().unwrap_err().user_message().contains("customer"));

        let mut d = complete_draft();
        let local_id = d.groups()[0].local_id.clone();
        d.apply(DraftAction::RemoveServiceGroup { local_id }).unwrap();
        assert!(d.validate().unwrap_err().user_message().contains("service"));
    }

    #[test]
    fn test_editing_does_not_require_new_photos() {
        let mut d = complete_draft();
        d.photos = DraftPhotos::default();
        d.job_card_id = Some("jc-1".into());
        assert!(d.validate().is_ok());
    }

    #[test]
    fn test_vehicle_must_belong_to_customer() {
        let mut d = JobCardDraft::new();
        assert!(d.apply(DraftAction::SetVehicle(vehicle())).is_err());

        d.apply(DraftAction::SetCustomer(customer())).unwrap();
        let mut other = vehicle();
        other.customer_id = "c2".into();
        assert!(d.apply(DraftAction::SetVehicle(other)).is_err());
        d.apply(DraftAction::SetVehicle(vehicle())).unwrap();

        let mut second = customer();
        second.id = "c2".into();
        d.apply(DraftAction::SetCustomer(second)).unwrap();
        assert!(d.vehicle.is_none());
    }

    #[test]
    fn test_negative_amounts_rejected() {
        let mut d = JobCardDraft::new();
        assert!(d.apply(DraftAction::SetDiscount(-1.0)).is_err());
        assert!(d.apply(DraftAction::SetAdvance(f64::NAN)).is_err());
        assert_eq!(d.discount, 0.0);
    }

    #[test]
    fn test_delivery_before_service_date_rejected() {
        let mut d = complete_draft();
        d.apply(DraftAction::SetServiceDate(NaiveDate::from_ymd_opt(2026, 3, 10)))
            .unwrap();
        d.apply(DraftAction::SetEstimatedDeliveryDate(NaiveDate::from_ymd_opt(2026, 3, 9)))
            .unwrap();
        assert!(d.validate().is_err());
    }

    #[test]
    fn test_revision_tracks_changes() {
        let mut d = JobCardDraft::new();
        let r0 = d.revision();
        d.apply(DraftAction::SetCommonNote("rattle".into())).unwrap();
        assert!(d.revision() > r0);
        let r1 = d.revision();
        d.apply(DraftAction::SelectProduct(product("p1", 1.0, 1))).unwrap();
        assert_eq!(d.revision(), r1 + 1);
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut d = complete_draft();
        d.reset();
        assert!(d.customer.is_none());
        assert!(d.groups().is_empty());
        assert!(d.photos.vehicle.is_empty());
        assert_eq!(d.totals().subtotal, 0.0);
    }

    #[test]
    fn test_from_job_card_groups_lines_by_category() {
        let card: JobCard = serde_json::from_value(serde_json::json!({
            "id": 88,
            "customer": {"id": "c1", "name": "Anita"},
            "vehicle": {"id": "v1", "customer_id": "c1", "name": "Swift", "plate_number": "KA01"},
            "status": "in_progress",
            "priority": "high",
            "services": [
                {"category_id": "A", "category_name": "Brakes", "service_id": "s1", "price": 10, "notes": "pads worn"},
                {"category_id": "B", "service_id": "s2", "price": "20"},
                {"category_id": "A", "service_id": "s3", "price": 5}
            ],
            "products": [{"product_id": "p1", "quantity": 3, "price": 4}],
            "discount": 2,
            "advance_amount": 10
        }))
        .unwrap();
        let d = JobCardDraft::from_job_card(&card);
        assert!(d.is_editing());
        let groups = d.groups();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].category_id, "A");
        assert_eq!(groups[0].services.len(), 2);
        assert_eq!(d.note_for(&groups[0].local_id), Some("pads worn"));
        assert_eq!(d.products[0].available_quantity, 3);
        assert_eq!(d.totals().subtotal, 47.0);
        assert_eq!(d.totals().balance, 35.0);
    }

    #[test]
    fn test_draft_request_parses_tagged_json() {
        let req: DraftRequest = serde_json::from_value(serde_json::json!({
            "type": "set_discount",
            "amount": 12.5
        }))
        .unwrap();
        assert!(matches!(
            req.into_action().unwrap(),
            DraftAction::SetDiscount(a) if a == 12.5
        ));
    }

    #[test]
    fn test_view_lists_groups_in_order() {
        let d = complete_draft();
        let view = DraftView::from(&d);
        assert_eq!(view.groups.len(), 1);
        assert_eq!(view.groups[0].total, 50.0);
        assert_eq!(view.vehicle_photos, VehicleSide::ALL.to_vec());
        assert_eq!(view.document_photos, 2);
    }
}
