//! Generation workflow queries and stage changes.

use almanac_core::generation::{status_of, GenerationStage, GenerationStatus};
use almanac_core::Result;
use almanac_infrastructure::SessionStore;
use chrono::Utc;
use std::sync::Arc;

pub struct GenerationService {
    store: Arc<SessionStore>,
}

impl GenerationService {
    pub fn new(store: Arc<SessionStore>) -> Self {
        Self { store }
    }

    /// Generation status of the active project, derived from the month
    /// rows rather than the stored stage field.
    pub fn status(&self, session_key: &str) -> Result<GenerationStatus> {
        self.store.with_active_project(session_key, status_of)
    }

    /// Whether the active project's preview deadline has passed.
    pub fn is_preview_expired(&self, session_key: &str) -> Result<bool> {
        self.store
            .with_active_project(session_key, |project| project.is_preview_expired(Utc::now()))
    }

    /// Moves the active project to a new stage, rejecting illegal
    /// transitions.
    pub fn set_stage(&self, session_key: &str, stage: GenerationStage) -> Result<()> {
        self.store.update_active_project(session_key, |project| {
            project.generation_stage = project.generation_stage.transition(stage)?;
            Ok(())
        })
    }
}
