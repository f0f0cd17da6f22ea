//! Project lifecycle: creation, uploads, preferences, payment references,
//! and the two month-creation waves.

use almanac_core::catalog::{theme_for, MonthTheme, PREVIEW_MONTH_NUMBERS};
use almanac_core::generation::{GenerationStage, MonthStatus};
use almanac_core::record::{CalendarMonth, Project, UploadedImage};
use almanac_core::{AlmanacError, Result};
use almanac_infrastructure::SessionStore;
use chrono::Utc;
use std::sync::Arc;

pub struct ProjectService {
    store: Arc<SessionStore>,
}

impl ProjectService {
    pub fn new(store: Arc<SessionStore>) -> Self {
        Self { store }
    }

    /// Creates a new empty project and makes it active. Existing projects
    /// in the session stay untouched.
    pub fn create_project(&self, session_key: &str) -> Result<String> {
        self.store.update(session_key, |record| {
            let id = almanac_infrastructure::token::mint_entity_id();
            record.projects.push(Project::new(id.clone()));
            record.active_project_id = id.clone();
            tracing::info!(project_id = %id, total = record.projects.len(), "created project");
            Ok(id)
        })
    }

    /// Switches the active project. The target must exist.
    pub fn set_active_project(&self, session_key: &str, project_id: &str) -> Result<()> {
        self.store.update(session_key, |record| {
            if record.project_by_id(project_id).is_none() {
                return Err(AlmanacError::not_found("project", project_id));
            }
            record.active_project_id = project_id.to_string();
            Ok(())
        })
    }

    pub fn active_project(&self, session_key: &str) -> Result<Project> {
        self.store.with_active_project(session_key, Project::clone)
    }

    pub fn project_by_id(&self, session_key: &str, project_id: &str) -> Result<Project> {
        self.store.with_record(session_key, |record| {
            record
                .project_by_id(project_id)
                .cloned()
                .ok_or_else(|| AlmanacError::not_found("project", project_id))
        })?
    }

    pub fn update_project_status(&self, session_key: &str, status: &str) -> Result<()> {
        self.store.update_active_project(session_key, |project| {
            project.status = status.to_string();
            Ok(())
        })
    }

    // ------------------------------------------------------------------
    // Uploaded images
    // ------------------------------------------------------------------

    /// Stores an uploaded photo on the active project and returns its id.
    ///
    /// Re-uploading a filename that already exists returns the existing id
    /// instead of duplicating the bytes (double-submit protection).
    pub fn add_uploaded_image(
        &self,
        session_key: &str,
        filename: &str,
        file_data: Vec<u8>,
        thumbnail_data: Vec<u8>,
    ) -> Result<u32> {
        self.store.update_active_project(session_key, |project| {
            if let Some(existing) = project.image_by_filename(filename) {
                return Ok(existing.id);
            }
            let id = project.next_image_id();
            project.images.push(UploadedImage {
                id,
                filename: filename.to_string(),
                file_data,
                thumbnail_data,
                uploaded_at: Utc::now(),
            });
            Ok(id)
        })
    }

    pub fn image(&self, session_key: &str, image_id: u32) -> Result<UploadedImage> {
        self.store.with_active_project(session_key, |project| {
            project
                .image_by_id(image_id)
                .cloned()
                .ok_or_else(|| AlmanacError::not_found("image", image_id.to_string()))
        })?
    }

    pub fn images(&self, session_key: &str) -> Result<Vec<UploadedImage>> {
        self.store
            .with_active_project(session_key, |project| project.images.clone())
    }

    pub fn delete_image(&self, session_key: &str, image_id: u32) -> Result<()> {
        self.store.update_active_project(session_key, |project| {
            let before = project.images.len();
            project.images.retain(|i| i.id != image_id);
            if project.images.len() == before {
                return Err(AlmanacError::not_found("image", image_id.to_string()));
            }
            Ok(())
        })
    }

    /// Removes every uploaded image in one persisted write.
    pub fn clear_all_images(&self, session_key: &str) -> Result<usize> {
        self.store.update_active_project(session_key, |project| {
            let removed = project.images.len();
            project.images.clear();
            Ok(removed)
        })
    }

    // ------------------------------------------------------------------
    // Preferences and payment references
    // ------------------------------------------------------------------

    pub fn preferences(&self, session_key: &str) -> Result<Option<serde_json::Value>> {
        self.store
            .with_active_project(session_key, |project| project.preferences.clone())
    }

    pub fn set_preferences(&self, session_key: &str, preferences: serde_json::Value) -> Result<()> {
        self.store.update_active_project(session_key, |project| {
            project.preferences = Some(preferences);
            Ok(())
        })
    }

    pub fn save_payment_method(&self, session_key: &str, payment_method_id: &str) -> Result<()> {
        self.store.update_active_project(session_key, |project| {
            project.payment_method_id = Some(payment_method_id.to_string());
            Ok(())
        })
    }

    pub fn payment_method(&self, session_key: &str) -> Result<Option<String>> {
        self.store
            .with_active_project(session_key, |project| project.payment_method_id.clone())
    }

    pub fn save_setup_intent(&self, session_key: &str, setup_intent_id: &str) -> Result<()> {
        self.store.update_active_project(session_key, |project| {
            project.setup_intent_id = Some(setup_intent_id.to_string());
            Ok(())
        })
    }

    pub fn setup_intent(&self, session_key: &str) -> Result<Option<String>> {
        self.store
            .with_active_project(session_key, |project| project.setup_intent_id.clone())
    }

    // ------------------------------------------------------------------
    // Month waves and generation results
    // ------------------------------------------------------------------

    /// First wave: seeds the three preview months from the theme table,
    /// moves the project to the preview stage, and arms the 48h deadline.
    pub fn create_preview_months(&self, session_key: &str, themes: &[MonthTheme]) -> Result<()> {
        // Validate the table before touching the record
        let mut months = Vec::with_capacity(PREVIEW_MONTH_NUMBERS.len());
        for number in PREVIEW_MONTH_NUMBERS {
            months.push(CalendarMonth::from_theme(theme_for(themes, number)?));
        }

        self.store.update_active_project(session_key, move |project| {
            project.generation_stage = project
                .generation_stage
                .transition(GenerationStage::PreviewOnly)?;
            project.months = months;
            project.generation_progress = 0;
            project.arm_preview_expiry(Utc::now());
            Ok(())
        })
    }

    /// Second wave after payment: appends the cover slot and the remaining
    /// months, moving the project into full generation.
    pub fn create_remaining_months(&self, session_key: &str, themes: &[MonthTheme]) -> Result<()> {
        let mut months = Vec::new();
        months.push(CalendarMonth::from_theme(theme_for(themes, 0)?));
        for number in 4..=12 {
            months.push(CalendarMonth::from_theme(theme_for(themes, number)?));
        }

        self.store.update_active_project(session_key, move |project| {
            project.generation_stage = project
                .generation_stage
                .transition(GenerationStage::GeneratingFull)?;
            project.generation_progress = 0;
            project.months.extend(months);
            Ok(())
        })
    }

    /// Records a status change for one month, optionally with result bytes
    /// on completion. Illegal transitions are rejected without touching
    /// the record; re-asserting the current status is a no-op success.
    pub fn update_month_status(
        &self,
        session_key: &str,
        month_number: u8,
        status: MonthStatus,
        image_data: Option<Vec<u8>>,
        error_message: Option<String>,
    ) -> Result<()> {
        self.store.update_active_project(session_key, |project| {
            let month = project
                .month_mut(month_number)
                .ok_or_else(|| AlmanacError::not_found("month", month_number.to_string()))?;

            month.generation_status = month.generation_status.transition(status)?;
            match status {
                MonthStatus::Completed => {
                    if let Some(data) = image_data {
                        month.record_image(data, Utc::now());
                    }
                    month.error_message = None;
                }
                MonthStatus::Failed => {
                    month.error_message = error_message;
                }
                _ => {}
            }
            Ok(())
        })
    }

    pub fn months(&self, session_key: &str) -> Result<Vec<CalendarMonth>> {
        self.store
            .with_active_project(session_key, |project| project.months.clone())
    }

    /// Bytes of the selected variant for one month, if generated.
    pub fn month_image_data(&self, session_key: &str, month_number: u8) -> Result<Option<Vec<u8>>> {
        self.store.with_active_project(session_key, |project| {
            project
                .month(month_number)
                .and_then(|m| m.selected_image())
                .map(<[u8]>::to_vec)
        })
    }

    /// `(completed, total)` month counts for the active project.
    pub fn completion_count(&self, session_key: &str) -> Result<(usize, usize)> {
        self.store.with_active_project(session_key, |project| {
            (project.completed_month_count(), project.months.len())
        })
    }

    /// Advisory progress percentage reported by the generation worker.
    pub fn update_generation_progress(&self, session_key: &str, progress: u8) -> Result<()> {
        self.store.update_active_project(session_key, |project| {
            project.generation_progress = progress.min(100);
            Ok(())
        })
    }
}
