//! Domain models for the per-session record.
//!
//! A `SessionRecord` is the full persisted state for one opaque client
//! token: the list of calendar projects, the shopping cart, and the
//! fulfillment artifacts written by the asynchronous webhook collaborator.
//! All invariants that must hold after any mutation live here, so the
//! services in the application layer cannot bypass them.

use crate::catalog::{MonthTheme, ProductType, MAX_QUANTITY, PREVIEW_TTL_HOURS, RETRY_LIMIT};
use crate::error::{AlmanacError, Result};
use crate::generation::{GenerationStage, MonthStatus};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The root persisted entity, one per opaque session key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Creation order is preserved
    pub projects: Vec<Project>,
    /// Always resolves to a member of `projects`; self-healed on access
    pub active_project_id: String,
    pub cart: Vec<CartItem>,
    /// Fulfillment receipt, set by the webhook collaborator
    pub order: Option<OrderInfo>,
    /// Mockup metadata keyed by product-type tag (opaque to this core)
    pub preview_mockups: HashMap<String, MockupInfo>,
    /// Opaque binary payload handed over at delivery time
    pub delivery_image: Option<Vec<u8>>,
}

impl SessionRecord {
    /// Creates a fresh record containing one new, active project.
    pub fn new(first_project_id: String) -> Self {
        let project = Project::new(first_project_id);
        let active_project_id = project.id.clone();
        Self {
            projects: vec![project],
            active_project_id,
            cart: Vec::new(),
            order: None,
            preview_mockups: HashMap::new(),
            delivery_image: None,
        }
    }

    pub fn project_by_id(&self, id: &str) -> Option<&Project> {
        self.projects.iter().find(|p| p.id == id)
    }

    pub fn project_by_id_mut(&mut self, id: &str) -> Option<&mut Project> {
        self.projects.iter_mut().find(|p| p.id == id)
    }

    /// Returns the active project, repairing `active_project_id` when it
    /// no longer resolves (corrupted state): falls back to the first
    /// project, or creates a new one via `fresh_id` if none exist. Never
    /// fails.
    pub fn ensure_active_project<F>(&mut self, fresh_id: F) -> &mut Project
    where
        F: FnOnce() -> String,
    {
        let pos = match self
            .projects
            .iter()
            .position(|p| p.id == self.active_project_id)
        {
            Some(pos) => pos,
            None => {
                if self.projects.is_empty() {
                    self.projects.push(Project::new(fresh_id()));
                }
                self.active_project_id = self.projects[0].id.clone();
                0
            }
        };
        &mut self.projects[pos]
    }

    /// Non-healing view of the active project, for read paths.
    pub fn active_project(&self) -> Option<&Project> {
        self.project_by_id(&self.active_project_id)
    }

    pub fn cart_item(&self, id: &str) -> Option<&CartItem> {
        self.cart.iter().find(|i| i.id == id)
    }

    pub fn cart_item_mut(&mut self, id: &str) -> Option<&mut CartItem> {
        self.cart.iter_mut().find(|i| i.id == id)
    }

    /// Existing cart line for a `(project, product)` pair, if any.
    pub fn cart_item_for(&mut self, project_id: &str, product: ProductType) -> Option<&mut CartItem> {
        self.cart
            .iter_mut()
            .find(|i| i.project_id == project_id && i.product_type == product)
    }

    /// Sum of `price * quantity` across the cart.
    pub fn cart_total(&self) -> f64 {
        self.cart
            .iter()
            .map(|i| i.price * f64::from(i.quantity))
            .sum()
    }
}

/// One calendar-creation attempt within a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    /// Opaque unique token, immutable after creation
    pub id: String,
    /// Free-form workflow tag; informational only
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub images: Vec<UploadedImage>,
    /// 0..=13 entries (0 = cover slot, 1..=12 = calendar months)
    pub months: Vec<CalendarMonth>,
    /// Opaque customization payload
    pub preferences: Option<serde_json::Value>,
    /// Once set, the preview is stale after this instant
    pub preview_expiry: Option<DateTime<Utc>>,
    /// Externally authorized payment method reference
    pub payment_method_id: Option<String>,
    /// In-flight payment-authorization handshake reference
    pub setup_intent_id: Option<String>,
    pub generation_stage: GenerationStage,
    /// Advisory percentage, 0..=100
    pub generation_progress: u8,
}

impl Project {
    pub fn new(id: String) -> Self {
        Self {
            id,
            status: "new".to_string(),
            created_at: Utc::now(),
            images: Vec::new(),
            months: Vec::new(),
            preferences: None,
            preview_expiry: None,
            payment_method_id: None,
            setup_intent_id: None,
            generation_stage: GenerationStage::NotStarted,
            generation_progress: 0,
        }
    }

    pub fn month(&self, month_number: u8) -> Option<&CalendarMonth> {
        self.months.iter().find(|m| m.month_number == month_number)
    }

    pub fn month_mut(&mut self, month_number: u8) -> Option<&mut CalendarMonth> {
        self.months
            .iter_mut()
            .find(|m| m.month_number == month_number)
    }

    pub fn image_by_id(&self, id: u32) -> Option<&UploadedImage> {
        self.images.iter().find(|i| i.id == id)
    }

    pub fn image_by_filename(&self, filename: &str) -> Option<&UploadedImage> {
        self.images.iter().find(|i| i.filename == filename)
    }

    /// Next monotone image id. Ids are never reused after deletion.
    pub fn next_image_id(&self) -> u32 {
        self.images.iter().map(|i| i.id).max().unwrap_or(0) + 1
    }

    pub fn completed_month_count(&self) -> usize {
        self.months
            .iter()
            .filter(|m| m.generation_status == MonthStatus::Completed)
            .count()
    }

    pub fn has_payment_method(&self) -> bool {
        self.payment_method_id.is_some()
    }

    /// Whether the preview deadline has passed. Independent of the
    /// generation stage; `false` while no deadline is set.
    pub fn is_preview_expired(&self, now: DateTime<Utc>) -> bool {
        self.preview_expiry.is_some_and(|expiry| now > expiry)
    }

    /// Arms the preview deadline at `now + 48h`.
    pub fn arm_preview_expiry(&mut self, now: DateTime<Utc>) {
        self.preview_expiry = Some(now + Duration::hours(PREVIEW_TTL_HOURS));
    }
}

/// A source photo uploaded by the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadedImage {
    /// Sequential within the project, monotone, unique
    pub id: u32,
    pub filename: String,
    /// Full-resolution bytes
    pub file_data: Vec<u8>,
    /// Preview bytes
    pub thumbnail_data: Vec<u8>,
    pub uploaded_at: DateTime<Utc>,
}

/// One themed image slot (cover or calendar month) within a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarMonth {
    /// 0 = cover, 1..=12 = calendar months; unique within a project
    pub month_number: u8,
    pub prompt: String,
    pub title: String,
    pub description: String,
    pub generation_status: MonthStatus,
    /// Generated attempts in order; the selected one is authoritative
    pub image_variants: Vec<ImageVariant>,
    /// Indexes `image_variants` whenever that list is non-empty
    pub selected_variant_index: usize,
    /// 0..=2, hard cap
    pub retry_count: u8,
    pub error_message: Option<String>,
    pub generated_at: Option<DateTime<Utc>>,
}

impl CalendarMonth {
    /// Creates a pending month seeded from a theme entry.
    pub fn from_theme(theme: &MonthTheme) -> Self {
        Self {
            month_number: theme.month_number,
            prompt: theme.prompt.clone(),
            title: theme.title.clone(),
            description: theme.description.clone(),
            generation_status: MonthStatus::Pending,
            image_variants: Vec::new(),
            selected_variant_index: 0,
            retry_count: 0,
            error_message: None,
            generated_at: None,
        }
    }

    /// Bytes of the currently selected variant.
    pub fn selected_image(&self) -> Option<&[u8]> {
        self.image_variants
            .get(self.selected_variant_index)
            .map(|v| v.data.as_slice())
    }

    /// Records a successful generation result. The first result seeds
    /// variant 0; later results replace the data of the selected variant
    /// (regeneration attempts go through [`CalendarMonth::add_variant`]).
    pub fn record_image(&mut self, data: Vec<u8>, now: DateTime<Utc>) {
        if self.image_variants.is_empty() {
            self.image_variants.push(ImageVariant {
                data,
                generated_at: now,
                variant_index: 0,
            });
            self.selected_variant_index = 0;
        } else if let Some(variant) = self.image_variants.get_mut(self.selected_variant_index) {
            variant.data = data;
            variant.generated_at = now;
        }
        self.generated_at = Some(now);
    }

    /// Appends a regeneration attempt and makes it the selection.
    ///
    /// Fails without mutating anything once the retry cap is reached.
    pub fn add_variant(&mut self, data: Vec<u8>, now: DateTime<Utc>) -> Result<usize> {
        if self.retry_count >= RETRY_LIMIT {
            return Err(AlmanacError::RetryLimitReached {
                month_number: self.month_number,
            });
        }

        let new_index = self.image_variants.len();
        self.image_variants.push(ImageVariant {
            data,
            generated_at: now,
            variant_index: new_index as u32,
        });
        self.retry_count += 1;
        self.selected_variant_index = new_index;
        self.generated_at = Some(now);
        Ok(new_index)
    }

    /// Switches the selection to an existing variant.
    pub fn select_variant(&mut self, index: usize) -> Result<()> {
        if index >= self.image_variants.len() {
            return Err(AlmanacError::VariantIndexOutOfRange {
                index,
                len: self.image_variants.len(),
            });
        }
        self.selected_variant_index = index;
        Ok(())
    }
}

/// One generated-image attempt for a month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageVariant {
    pub data: Vec<u8>,
    pub generated_at: DateTime<Utc>,
    pub variant_index: u32,
}

/// A purchasable line referencing a project and a product type.
///
/// The reference is not ownership: deleting the project does not delete
/// the cart line and vice versa.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub id: String,
    pub project_id: String,
    pub product_type: ProductType,
    /// Unit price captured at add time
    pub price: f64,
    /// 1..=99
    pub quantity: u32,
    pub mockup_url: Option<String>,
    pub added_at: DateTime<Utc>,
}

impl CartItem {
    pub fn new(id: String, project_id: String, product_type: ProductType) -> Self {
        Self {
            id,
            project_id,
            product_type,
            price: product_type.price(),
            quantity: 1,
            mockup_url: None,
            added_at: Utc::now(),
        }
    }

    /// Bumps the quantity by one, saturating at the cap.
    pub fn increment_quantity(&mut self) {
        self.quantity = (self.quantity + 1).min(MAX_QUANTITY);
    }
}

/// Fulfillment receipt written once per successful purchase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderInfo {
    pub order_id: String,
    pub placed_at: DateTime<Utc>,
    /// Opaque payload from the fulfillment collaborator
    pub details: serde_json::Value,
}

/// Mockup metadata for one product type; opaque apart from the URL the
/// cart attaches to new lines as a best-effort preview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MockupInfo {
    pub mockup_url: Option<String>,
    #[serde(default)]
    pub details: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn theme(month_number: u8) -> MonthTheme {
        MonthTheme {
            month_number,
            name: format!("Month {month_number}"),
            title: format!("Title {month_number}"),
            description: String::new(),
            prompt: format!("prompt {month_number}"),
        }
    }

    #[test]
    fn test_ensure_active_project_self_heals_to_first() {
        let mut record = SessionRecord::new("p1".to_string());
        record.active_project_id = "missing".to_string();

        let project = record.ensure_active_project(|| "never".to_string());
        assert_eq!(project.id, "p1");
        assert_eq!(record.active_project_id, "p1");
    }

    #[test]
    fn test_ensure_active_project_creates_when_empty() {
        let mut record = SessionRecord::new("p1".to_string());
        record.projects.clear();

        let project = record.ensure_active_project(|| "fresh".to_string());
        assert_eq!(project.id, "fresh");
        assert_eq!(record.active_project_id, "fresh");
        assert_eq!(record.projects.len(), 1);
    }

    #[test]
    fn test_next_image_id_is_monotone_after_delete() {
        let mut project = Project::new("p".to_string());
        for id in 1..=3 {
            project.images.push(UploadedImage {
                id,
                filename: format!("{id}.jpg"),
                file_data: vec![id as u8],
                thumbnail_data: vec![],
                uploaded_at: Utc::now(),
            });
        }
        project.images.retain(|i| i.id != 3);
        // Deleted ids are never reassigned
        assert_eq!(project.next_image_id(), 3);
        project.images.retain(|i| i.id != 2);
        assert_eq!(project.next_image_id(), 2);
    }

    #[test]
    fn test_record_image_seeds_variant_zero() {
        let mut month = CalendarMonth::from_theme(&theme(1));
        month.record_image(vec![1, 2, 3], Utc::now());

        assert_eq!(month.image_variants.len(), 1);
        assert_eq!(month.selected_variant_index, 0);
        assert_eq!(month.selected_image(), Some([1, 2, 3].as_slice()));
        assert_eq!(month.retry_count, 0);
    }

    #[test]
    fn test_add_variant_selects_new_and_counts_retry() {
        let mut month = CalendarMonth::from_theme(&theme(1));
        month.record_image(vec![0], Utc::now());

        let idx = month.add_variant(vec![1], Utc::now()).unwrap();
        assert_eq!(idx, 1);
        assert_eq!(month.selected_variant_index, 1);
        assert_eq!(month.retry_count, 1);
        assert_eq!(month.selected_image(), Some([1].as_slice()));
    }

    #[test]
    fn test_add_variant_rejected_at_retry_cap_without_mutation() {
        let mut month = CalendarMonth::from_theme(&theme(7));
        month.record_image(vec![0], Utc::now());
        month.add_variant(vec![1], Utc::now()).unwrap();
        month.add_variant(vec![2], Utc::now()).unwrap();

        let before = month.clone();
        let err = month.add_variant(vec![3], Utc::now()).unwrap_err();
        assert_eq!(err, AlmanacError::RetryLimitReached { month_number: 7 });
        assert_eq!(month, before);
    }

    #[test]
    fn test_select_variant_bounds_checked() {
        let mut month = CalendarMonth::from_theme(&theme(1));
        month.record_image(vec![0], Utc::now());
        month.add_variant(vec![1], Utc::now()).unwrap();

        month.select_variant(0).unwrap();
        assert_eq!(month.selected_variant_index, 0);

        let err = month.select_variant(2).unwrap_err();
        assert_eq!(err, AlmanacError::VariantIndexOutOfRange { index: 2, len: 2 });
        assert_eq!(month.selected_variant_index, 0);
    }

    #[test]
    fn test_cart_total() {
        let mut record = SessionRecord::new("p1".to_string());
        let mut a = CartItem::new("a".to_string(), "p1".to_string(), ProductType::WallCalendar);
        a.price = 26.50;
        a.quantity = 2;
        let b = CartItem::new("b".to_string(), "p1".to_string(), ProductType::Desktop);
        record.cart = vec![a, b];

        assert!((record.cart_total() - 72.99).abs() < 1e-9);
    }

    #[test]
    fn test_increment_quantity_saturates_at_cap() {
        let mut item = CartItem::new("a".to_string(), "p".to_string(), ProductType::Desktop);
        item.quantity = MAX_QUANTITY;
        item.increment_quantity();
        assert_eq!(item.quantity, MAX_QUANTITY);
    }

    #[test]
    fn test_preview_expiry() {
        let mut project = Project::new("p".to_string());
        let now = Utc::now();
        assert!(!project.is_preview_expired(now));

        project.arm_preview_expiry(now);
        assert!(!project.is_preview_expired(now + Duration::hours(47)));
        assert!(project.is_preview_expired(now + Duration::hours(49)));
    }
}
