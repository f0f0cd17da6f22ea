//! Session record DTOs and migrations.
//!
//! Three on-disk generations exist in the wild:
//!
//! - V1.0.0: the original single-project layout: one `project` block plus
//!   flat `images`/`months`/`preferences` at the top level.
//! - V2.0.0: multi-project + cart; months still carry a single
//!   `master_image_data` field and cart lines have no quantity.
//! - V3.0.0: current; months hold a variant list with a selection index
//!   and retry accounting (the legacy master field becomes variant 0 and
//!   disappears), projects carry preview-expiry/payment/stage fields, cart
//!   lines carry a quantity.
//!
//! Version detection is structural: the loader tries the newest shape
//! first and falls back, so a partially-upgraded record can never confuse
//! the chain. Required (non-defaulted) fields act as the discriminators:
//! `generation_stage` and `image_variants` for V3, `projects` for V2,
//! `project` for V1.

use crate::token;
use almanac_core::catalog::ProductType;
use almanac_core::generation::{infer_stage_from_counts, GenerationStage, MonthStatus};
use almanac_core::record::{
    CalendarMonth, CartItem, ImageVariant, MockupInfo, OrderInfo, Project, SessionRecord,
    UploadedImage,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use version_migrate::{FromDomain, IntoDomain, MigratesTo, Versioned};

/// Product-type key the legacy single-mockup field is folded under.
const LEGACY_MOCKUP_KEY: &str = "calendar_2026";

fn default_status() -> String {
    "new".to_string()
}

// ============================================================================
// V1.0.0: legacy single-project layout
// ============================================================================

/// The `project` block of the legacy layout. Early records did not always
/// carry an id or creation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectMetaV1_0_0 {
    pub id: Option<String>,
    #[serde(default = "default_status")]
    pub status: String,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadedImageV1_0_0 {
    pub id: u32,
    pub filename: String,
    pub file_data: Vec<u8>,
    #[serde(default)]
    pub thumbnail_data: Vec<u8>,
    pub uploaded_at: Option<DateTime<Utc>>,
}

/// Month shape shared by V1 and V2: a single image field, no variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthV1_0_0 {
    pub month_number: u8,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "MonthV1_0_0::default_generation_status")]
    pub generation_status: String,
    pub master_image_data: Option<Vec<u8>>,
    pub error_message: Option<String>,
    pub generated_at: Option<DateTime<Utc>>,
}

impl MonthV1_0_0 {
    fn default_generation_status() -> String {
        "pending".to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MockupV1_0_0 {
    pub mockup_url: Option<String>,
    #[serde(default)]
    pub details: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderInfoV1_0_0 {
    pub order_id: String,
    pub placed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub details: serde_json::Value,
}

/// Legacy single-project record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Versioned)]
#[versioned(version = "1.0.0")]
pub struct RecordV1_0_0 {
    pub project: ProjectMetaV1_0_0,
    #[serde(default)]
    pub images: Vec<UploadedImageV1_0_0>,
    #[serde(default)]
    pub months: Vec<MonthV1_0_0>,
    pub preferences: Option<serde_json::Value>,
    pub order: Option<OrderInfoV1_0_0>,
    /// Single-mockup predecessor of `preview_mockups`
    pub preview_mockup: Option<serde_json::Value>,
    #[serde(default)]
    pub preview_mockups: HashMap<String, MockupV1_0_0>,
}

// ============================================================================
// V2.0.0: multi-project + cart
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectV2_0_0 {
    pub id: String,
    #[serde(default = "default_status")]
    pub status: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub images: Vec<UploadedImageV1_0_0>,
    #[serde(default)]
    pub months: Vec<MonthV1_0_0>,
    pub preferences: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItemV2_0_0 {
    pub id: String,
    pub project_id: String,
    pub product_type: String,
    pub price: f64,
    pub mockup_url: Option<String>,
    pub added_at: DateTime<Utc>,
}

/// Multi-project record, months still in the legacy single-image shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Versioned)]
#[versioned(version = "2.0.0")]
pub struct RecordV2_0_0 {
    pub projects: Vec<ProjectV2_0_0>,
    pub active_project_id: String,
    #[serde(default)]
    pub cart: Vec<CartItemV2_0_0>,
    pub order: Option<OrderInfoV1_0_0>,
    #[serde(default)]
    pub preview_mockups: HashMap<String, MockupV1_0_0>,
    pub preview_mockup: Option<serde_json::Value>,
    pub delivery_image: Option<Vec<u8>>,
}

// ============================================================================
// V3.0.0: current, with variants, stage fields, cart quantities
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageVariantV3_0_0 {
    pub data: Vec<u8>,
    pub generated_at: DateTime<Utc>,
    pub variant_index: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthV3_0_0 {
    pub month_number: u8,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub generation_status: MonthStatus,
    /// Required on purpose: its absence marks a pre-variant record
    pub image_variants: Vec<ImageVariantV3_0_0>,
    pub selected_variant_index: usize,
    pub retry_count: u8,
    pub error_message: Option<String>,
    pub generated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectV3_0_0 {
    pub id: String,
    #[serde(default = "default_status")]
    pub status: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub images: Vec<UploadedImageV1_0_0>,
    pub months: Vec<MonthV3_0_0>,
    pub preferences: Option<serde_json::Value>,
    pub preview_expiry: Option<DateTime<Utc>>,
    pub payment_method_id: Option<String>,
    pub setup_intent_id: Option<String>,
    /// Required on purpose: its absence marks a pre-stage record
    pub generation_stage: GenerationStage,
    pub generation_progress: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItemV3_0_0 {
    pub id: String,
    pub project_id: String,
    pub product_type: String,
    pub price: f64,
    pub quantity: u32,
    pub mockup_url: Option<String>,
    pub added_at: DateTime<Utc>,
}

/// Current record schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Versioned)]
#[versioned(version = "3.0.0")]
pub struct RecordV3_0_0 {
    pub projects: Vec<ProjectV3_0_0>,
    pub active_project_id: String,
    #[serde(default)]
    pub cart: Vec<CartItemV3_0_0>,
    pub order: Option<OrderInfoV1_0_0>,
    #[serde(default)]
    pub preview_mockups: HashMap<String, MockupV1_0_0>,
    pub delivery_image: Option<Vec<u8>>,
}

// ============================================================================
// Migration implementations
// ============================================================================

/// Migration from V1.0.0 to V2.0.0.
/// Wraps the flat single-project fields into a one-element project list.
impl MigratesTo<RecordV2_0_0> for RecordV1_0_0 {
    fn migrate(self) -> RecordV2_0_0 {
        let project_id = self
            .project
            .id
            .unwrap_or_else(token::mint_entity_id);

        let project = ProjectV2_0_0 {
            id: project_id.clone(),
            status: self.project.status,
            created_at: self.project.created_at.unwrap_or_else(Utc::now),
            images: self.images,
            months: self.months,
            preferences: self.preferences,
        };

        RecordV2_0_0 {
            projects: vec![project],
            active_project_id: project_id,
            cart: Vec::new(),
            order: self.order,
            preview_mockups: self.preview_mockups,
            preview_mockup: self.preview_mockup,
            delivery_image: None,
        }
    }
}

fn parse_month_status(tag: &str) -> MonthStatus {
    match tag {
        "processing" => MonthStatus::Processing,
        "completed" => MonthStatus::Completed,
        "failed" => MonthStatus::Failed,
        _ => MonthStatus::Pending,
    }
}

/// Migration from V2.0.0 to V3.0.0.
///
/// The legacy `master_image_data` value becomes variant 0; the generation
/// stage is backfilled from month counts (records written before the
/// staged workflow existed never stored one).
impl MigratesTo<RecordV3_0_0> for RecordV2_0_0 {
    fn migrate(self) -> RecordV3_0_0 {
        let projects = self
            .projects
            .into_iter()
            .map(|p| {
                let months: Vec<MonthV3_0_0> = p
                    .months
                    .into_iter()
                    .map(|m| {
                        let image_variants = match m.master_image_data {
                            Some(data) => vec![ImageVariantV3_0_0 {
                                data,
                                generated_at: m.generated_at.unwrap_or_else(Utc::now),
                                variant_index: 0,
                            }],
                            None => Vec::new(),
                        };
                        MonthV3_0_0 {
                            month_number: m.month_number,
                            prompt: m.prompt,
                            title: m.title,
                            description: m.description,
                            generation_status: parse_month_status(&m.generation_status),
                            image_variants,
                            selected_variant_index: 0,
                            retry_count: 0,
                            error_message: m.error_message,
                            generated_at: m.generated_at,
                        }
                    })
                    .collect();

                let completed = months
                    .iter()
                    .filter(|m| m.generation_status == MonthStatus::Completed)
                    .count();
                let total = months.len();
                let progress = if total == 0 {
                    0
                } else {
                    ((completed * 100) / total) as u8
                };

                ProjectV3_0_0 {
                    id: p.id,
                    status: p.status,
                    created_at: p.created_at,
                    images: p.images,
                    months,
                    preferences: p.preferences,
                    preview_expiry: None,
                    payment_method_id: None,
                    setup_intent_id: None,
                    generation_stage: infer_stage_from_counts(total, completed),
                    generation_progress: progress,
                }
            })
            .collect();

        let cart = self
            .cart
            .into_iter()
            .map(|item| CartItemV3_0_0 {
                id: item.id,
                project_id: item.project_id,
                product_type: item.product_type,
                price: item.price,
                quantity: 1,
                mockup_url: item.mockup_url,
                added_at: item.added_at,
            })
            .collect();

        // Fold the legacy single-mockup field into the per-product map
        let mut preview_mockups = self.preview_mockups;
        if preview_mockups.is_empty() {
            if let Some(legacy) = self.preview_mockup {
                let mockup_url = legacy
                    .get("mockup_url")
                    .and_then(|v| v.as_str())
                    .map(str::to_string);
                preview_mockups.insert(
                    LEGACY_MOCKUP_KEY.to_string(),
                    MockupV1_0_0 {
                        mockup_url,
                        details: legacy,
                    },
                );
            }
        }

        RecordV3_0_0 {
            projects,
            active_project_id: self.active_project_id,
            cart,
            order: self.order,
            preview_mockups,
            delivery_image: self.delivery_image,
        }
    }
}

// ============================================================================
// Domain model conversions
// ============================================================================

impl IntoDomain<SessionRecord> for RecordV3_0_0 {
    fn into_domain(self) -> SessionRecord {
        let projects = self
            .projects
            .into_iter()
            .map(|p| Project {
                id: p.id,
                status: p.status,
                created_at: p.created_at,
                images: p
                    .images
                    .into_iter()
                    .map(|i| UploadedImage {
                        id: i.id,
                        filename: i.filename,
                        file_data: i.file_data,
                        thumbnail_data: i.thumbnail_data,
                        uploaded_at: i.uploaded_at.unwrap_or_else(Utc::now),
                    })
                    .collect(),
                months: p
                    .months
                    .into_iter()
                    .map(|m| {
                        let variant_count = m.image_variants.len();
                        CalendarMonth {
                            month_number: m.month_number,
                            prompt: m.prompt,
                            title: m.title,
                            description: m.description,
                            generation_status: m.generation_status,
                            image_variants: m
                                .image_variants
                                .into_iter()
                                .map(|v| ImageVariant {
                                    data: v.data,
                                    generated_at: v.generated_at,
                                    variant_index: v.variant_index,
                                })
                                .collect(),
                            // Clamp a stray selection rather than carrying
                            // an out-of-range index into the domain
                            selected_variant_index: if variant_count == 0 {
                                0
                            } else {
                                m.selected_variant_index.min(variant_count - 1)
                            },
                            retry_count: m.retry_count,
                            error_message: m.error_message,
                            generated_at: m.generated_at,
                        }
                    })
                    .collect(),
                preferences: p.preferences,
                preview_expiry: p.preview_expiry,
                payment_method_id: p.payment_method_id,
                setup_intent_id: p.setup_intent_id,
                generation_stage: p.generation_stage,
                generation_progress: p.generation_progress.min(100),
            })
            .collect();

        let cart = self
            .cart
            .into_iter()
            .filter_map(|item| match item.product_type.parse::<ProductType>() {
                Ok(product_type) => Some(CartItem {
                    id: item.id,
                    project_id: item.project_id,
                    product_type,
                    price: item.price,
                    quantity: item.quantity.clamp(1, 99),
                    mockup_url: item.mockup_url,
                    added_at: item.added_at,
                }),
                Err(_) => {
                    tracing::warn!(
                        product_type = %item.product_type,
                        cart_item = %item.id,
                        "dropping cart item with unknown product type"
                    );
                    None
                }
            })
            .collect();

        SessionRecord {
            projects,
            active_project_id: self.active_project_id,
            cart,
            order: self.order.map(|o| OrderInfo {
                order_id: o.order_id,
                placed_at: o.placed_at.unwrap_or_else(Utc::now),
                details: o.details,
            }),
            preview_mockups: self
                .preview_mockups
                .into_iter()
                .map(|(k, v)| {
                    (
                        k,
                        MockupInfo {
                            mockup_url: v.mockup_url,
                            details: v.details,
                        },
                    )
                })
                .collect(),
            delivery_image: self.delivery_image,
        }
    }
}

impl FromDomain<SessionRecord> for RecordV3_0_0 {
    fn from_domain(record: SessionRecord) -> Self {
        RecordV3_0_0 {
            projects: record
                .projects
                .into_iter()
                .map(|p| ProjectV3_0_0 {
                    id: p.id,
                    status: p.status,
                    created_at: p.created_at,
                    images: p
                        .images
                        .into_iter()
                        .map(|i| UploadedImageV1_0_0 {
                            id: i.id,
                            filename: i.filename,
                            file_data: i.file_data,
                            thumbnail_data: i.thumbnail_data,
                            uploaded_at: Some(i.uploaded_at),
                        })
                        .collect(),
                    months: p
                        .months
                        .into_iter()
                        .map(|m| MonthV3_0_0 {
                            month_number: m.month_number,
                            prompt: m.prompt,
                            title: m.title,
                            description: m.description,
                            generation_status: m.generation_status,
                            image_variants: m
                                .image_variants
                                .into_iter()
                                .map(|v| ImageVariantV3_0_0 {
                                    data: v.data,
                                    generated_at: v.generated_at,
                                    variant_index: v.variant_index,
                                })
                                .collect(),
                            selected_variant_index: m.selected_variant_index,
                            retry_count: m.retry_count,
                            error_message: m.error_message,
                            generated_at: m.generated_at,
                        })
                        .collect(),
                    preferences: p.preferences,
                    preview_expiry: p.preview_expiry,
                    payment_method_id: p.payment_method_id,
                    setup_intent_id: p.setup_intent_id,
                    generation_stage: p.generation_stage,
                    generation_progress: p.generation_progress,
                })
                .collect(),
            active_project_id: record.active_project_id,
            cart: record
                .cart
                .into_iter()
                .map(|item| CartItemV3_0_0 {
                    id: item.id,
                    project_id: item.project_id,
                    product_type: item.product_type.as_str().to_string(),
                    price: item.price,
                    quantity: item.quantity,
                    mockup_url: item.mockup_url,
                    added_at: item.added_at,
                })
                .collect(),
            order: record.order.map(|o| OrderInfoV1_0_0 {
                order_id: o.order_id,
                placed_at: Some(o.placed_at),
                details: o.details,
            }),
            preview_mockups: record
                .preview_mockups
                .into_iter()
                .map(|(k, v)| {
                    (
                        k,
                        MockupV1_0_0 {
                            mockup_url: v.mockup_url,
                            details: v.details,
                        },
                    )
                })
                .collect(),
            delivery_image: record.delivery_image,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn legacy_record() -> RecordV1_0_0 {
        RecordV1_0_0 {
            project: ProjectMetaV1_0_0 {
                id: Some("legacy-project".to_string()),
                status: "processing".to_string(),
                created_at: Some(Utc::now()),
            },
            images: vec![UploadedImageV1_0_0 {
                id: 1,
                filename: "family.jpg".to_string(),
                file_data: vec![1, 2, 3],
                thumbnail_data: vec![1],
                uploaded_at: Some(Utc::now()),
            }],
            months: vec![MonthV1_0_0 {
                month_number: 1,
                prompt: "january".to_string(),
                title: String::new(),
                description: String::new(),
                generation_status: "completed".to_string(),
                master_image_data: Some(vec![9, 9, 9]),
                error_message: None,
                generated_at: Some(Utc::now()),
            }],
            preferences: Some(serde_json::json!({"style": "warm"})),
            order: None,
            preview_mockup: None,
            preview_mockups: HashMap::new(),
        }
    }

    #[test]
    fn test_v1_migration_wraps_single_project() {
        let v2: RecordV2_0_0 = legacy_record().migrate();

        assert_eq!(v2.projects.len(), 1);
        assert_eq!(v2.projects[0].id, "legacy-project");
        assert_eq!(v2.active_project_id, "legacy-project");
        assert_eq!(v2.projects[0].images.len(), 1);
        assert_eq!(v2.projects[0].months.len(), 1);
        assert!(v2.cart.is_empty());
    }

    #[test]
    fn test_v2_migration_moves_master_image_into_variant_zero() {
        let v3: RecordV3_0_0 = legacy_record().migrate().migrate();

        let month = &v3.projects[0].months[0];
        assert_eq!(month.image_variants.len(), 1);
        assert_eq!(month.image_variants[0].data, vec![9, 9, 9]);
        assert_eq!(month.selected_variant_index, 0);
        assert_eq!(month.retry_count, 0);
        assert_eq!(month.generation_status, MonthStatus::Completed);
    }

    #[test]
    fn test_v2_migration_backfills_stage_from_counts() {
        // One completed month out of a 1-month table: below the full-wave
        // threshold, so the backfill lands on preview_only
        let v3: RecordV3_0_0 = legacy_record().migrate().migrate();
        assert_eq!(v3.projects[0].generation_stage, GenerationStage::PreviewOnly);

        // An empty project backfills to not_started
        let mut legacy = legacy_record();
        legacy.months.clear();
        let v3: RecordV3_0_0 = legacy.migrate().migrate();
        assert_eq!(v3.projects[0].generation_stage, GenerationStage::NotStarted);
    }

    #[test]
    fn test_legacy_single_mockup_folded_into_map() {
        let mut legacy = legacy_record();
        legacy.preview_mockup = Some(serde_json::json!({"mockup_url": "https://m/x.png"}));

        let v3: RecordV3_0_0 = legacy.migrate().migrate();
        let mockup = v3.preview_mockups.get(LEGACY_MOCKUP_KEY).unwrap();
        assert_eq!(mockup.mockup_url.as_deref(), Some("https://m/x.png"));
    }

    #[test]
    fn test_domain_round_trip() {
        let v3: RecordV3_0_0 = legacy_record().migrate().migrate();
        let domain: SessionRecord = v3.clone().into_domain();
        let back = RecordV3_0_0::from_domain(domain);
        assert_eq!(back, v3);
    }

    #[test]
    fn test_unknown_product_type_dropped_on_load() {
        let mut v3: RecordV3_0_0 = legacy_record().migrate().migrate();
        v3.cart.push(CartItemV3_0_0 {
            id: "c1".to_string(),
            project_id: "legacy-project".to_string(),
            product_type: "mug".to_string(),
            price: 9.99,
            quantity: 1,
            mockup_url: None,
            added_at: Utc::now(),
        });

        let domain: SessionRecord = v3.into_domain();
        assert!(domain.cart.is_empty());
    }
}
