//! Accessors for the fulfillment collaborator (payment webhooks, order
//! placement, mockup and delivery artifacts).
//!
//! This side runs in a different process from the interactive handlers,
//! so every read reloads from disk first and every write refuses to
//! materialize sessions it has never seen: an unknown key here means a
//! stale or forged webhook, not a new visitor.

use almanac_core::record::{CalendarMonth, CartItem, MockupInfo, OrderInfo};
use almanac_core::{AlmanacError, Result};
use almanac_infrastructure::SessionStore;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;

pub struct FulfillmentService {
    store: Arc<SessionStore>,
}

impl FulfillmentService {
    pub fn new(store: Arc<SessionStore>) -> Self {
        Self { store }
    }

    fn reload_existing(&self, session_key: &str) -> Result<()> {
        if !self.store.force_reload(session_key)? {
            return Err(AlmanacError::not_found("session", session_key));
        }
        Ok(())
    }

    /// Month rows for a session, scoped to one project or to the active
    /// project when no id is given.
    pub fn months_by_session(
        &self,
        session_key: &str,
        project_id: Option<&str>,
    ) -> Result<Vec<CalendarMonth>> {
        self.reload_existing(session_key)?;
        match project_id {
            Some(id) => self.store.with_record(session_key, |record| {
                record
                    .project_by_id(id)
                    .map(|p| p.months.clone())
                    .ok_or_else(|| AlmanacError::not_found("project", id))
            })?,
            None => self
                .store
                .with_active_project(session_key, |project| project.months.clone()),
        }
    }

    pub fn cart_by_session(&self, session_key: &str) -> Result<Vec<CartItem>> {
        self.reload_existing(session_key)?;
        self.store.with_record(session_key, |record| record.cart.clone())
    }

    /// Empties the cart after a successful purchase.
    pub fn clear_cart_by_session(&self, session_key: &str) -> Result<()> {
        self.store.update_existing(session_key, |record| {
            record.cart.clear();
            Ok(())
        })
    }

    /// Writes the fulfillment receipt. Replaces any previous receipt; the
    /// caller decides whether repeat webhooks are an error.
    pub fn save_order_info(
        &self,
        session_key: &str,
        order_id: &str,
        details: serde_json::Value,
    ) -> Result<()> {
        self.store.update_existing(session_key, |record| {
            record.order = Some(OrderInfo {
                order_id: order_id.to_string(),
                placed_at: Utc::now(),
                details,
            });
            Ok(())
        })
    }

    pub fn order_info(&self, session_key: &str) -> Result<Option<OrderInfo>> {
        self.reload_existing(session_key)?;
        self.store.with_record(session_key, |record| record.order.clone())
    }

    /// Stores mockup metadata for one product type, replacing any earlier
    /// mockup for the same product.
    pub fn save_preview_mockup(
        &self,
        session_key: &str,
        product_type: &str,
        mockup_url: Option<String>,
        details: serde_json::Value,
    ) -> Result<()> {
        self.store.update_existing(session_key, |record| {
            record.preview_mockups.insert(
                product_type.to_string(),
                MockupInfo { mockup_url, details },
            );
            Ok(())
        })
    }

    pub fn preview_mockups(&self, session_key: &str) -> Result<HashMap<String, MockupInfo>> {
        self.reload_existing(session_key)?;
        self.store
            .with_record(session_key, |record| record.preview_mockups.clone())
    }

    pub fn set_delivery_image(&self, session_key: &str, data: Vec<u8>) -> Result<()> {
        self.store.update_existing(session_key, |record| {
            record.delivery_image = Some(data);
            Ok(())
        })
    }

    pub fn delivery_image(&self, session_key: &str) -> Result<Option<Vec<u8>>> {
        self.reload_existing(session_key)?;
        self.store
            .with_record(session_key, |record| record.delivery_image.clone())
    }
}
