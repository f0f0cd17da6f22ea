//! Variant regeneration and selection for generated month images.

use almanac_core::{AlmanacError, Result};
use almanac_infrastructure::SessionStore;
use chrono::Utc;
use std::sync::Arc;

pub struct VariantService {
    store: Arc<SessionStore>,
}

impl VariantService {
    pub fn new(store: Arc<SessionStore>) -> Self {
        Self { store }
    }

    /// Appends a regeneration result for a month and selects it. Returns
    /// the new variant index. Fails once the retry cap is used up.
    pub fn add_variant(
        &self,
        session_key: &str,
        month_number: u8,
        data: Vec<u8>,
    ) -> Result<usize> {
        self.store.update_active_project(session_key, |project| {
            let month = project
                .month_mut(month_number)
                .ok_or_else(|| AlmanacError::not_found("month", month_number.to_string()))?;
            month.add_variant(data, Utc::now())
        })
    }

    /// Switches the selection for a month to an existing variant.
    pub fn select_variant(
        &self,
        session_key: &str,
        month_number: u8,
        variant_index: usize,
    ) -> Result<()> {
        self.store.update_active_project(session_key, |project| {
            let month = project
                .month_mut(month_number)
                .ok_or_else(|| AlmanacError::not_found("month", month_number.to_string()))?;
            month.select_variant(variant_index)
        })
    }

    /// How many regeneration attempts remain for a month.
    pub fn retries_remaining(&self, session_key: &str, month_number: u8) -> Result<u8> {
        self.store.with_active_project(session_key, |project| {
            project
                .month(month_number)
                .map(|m| almanac_core::catalog::RETRY_LIMIT.saturating_sub(m.retry_count))
                .ok_or_else(|| AlmanacError::not_found("month", month_number.to_string()))
        })?
    }
}
