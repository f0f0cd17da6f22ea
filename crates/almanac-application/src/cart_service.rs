//! Shopping cart operations.
//!
//! Cart reads go through a disk reload first: the fulfillment collaborator
//! runs in a separate process against the same directory, and checkout
//! must see its writes (and vice versa) without restarting either side.

use almanac_core::catalog::{ProductType, MAX_QUANTITY, MIN_QUANTITY};
use almanac_core::record::CartItem;
use almanac_core::{AlmanacError, Result};
use almanac_infrastructure::{token, SessionStore};
use std::sync::Arc;

pub struct CartService {
    store: Arc<SessionStore>,
}

impl CartService {
    pub fn new(store: Arc<SessionStore>) -> Self {
        Self { store }
    }

    /// Adds a product for a project to the cart.
    ///
    /// Adding a `(project, product)` pair that is already in the cart
    /// bumps that line's quantity instead of creating a duplicate. New
    /// lines pick up the stored preview mockup URL for the product when
    /// one exists.
    pub fn add_to_cart(
        &self,
        session_key: &str,
        project_id: &str,
        product_type: &str,
    ) -> Result<CartItem> {
        let product: ProductType = product_type.parse()?;

        self.store.update(session_key, |record| {
            if record.project_by_id(project_id).is_none() {
                return Err(AlmanacError::not_found("project", project_id));
            }

            if let Some(existing) = record.cart_item_for(project_id, product) {
                existing.increment_quantity();
                return Ok(existing.clone());
            }

            let mut item = CartItem::new(
                token::mint_entity_id(),
                project_id.to_string(),
                product,
            );
            item.mockup_url = record
                .preview_mockups
                .get(product.as_str())
                .and_then(|m| m.mockup_url.clone());
            record.cart.push(item.clone());
            Ok(item)
        })
    }

    /// Sets the quantity of a cart line. Out-of-range quantities are
    /// rejected before the record is touched.
    pub fn update_quantity(&self, session_key: &str, item_id: &str, quantity: u32) -> Result<()> {
        if !(MIN_QUANTITY..=MAX_QUANTITY).contains(&quantity) {
            return Err(AlmanacError::QuantityOutOfRange(quantity));
        }
        self.store.update(session_key, |record| {
            let item = record
                .cart_item_mut(item_id)
                .ok_or_else(|| AlmanacError::not_found("cart item", item_id))?;
            item.quantity = quantity;
            Ok(())
        })
    }

    pub fn remove_from_cart(&self, session_key: &str, item_id: &str) -> Result<()> {
        self.store.update(session_key, |record| {
            let before = record.cart.len();
            record.cart.retain(|i| i.id != item_id);
            if record.cart.len() == before {
                return Err(AlmanacError::not_found("cart item", item_id));
            }
            Ok(())
        })
    }

    pub fn clear_cart(&self, session_key: &str) -> Result<()> {
        self.store.update(session_key, |record| {
            record.cart.clear();
            Ok(())
        })
    }

    /// Current cart lines, freshly reloaded from disk.
    pub fn items(&self, session_key: &str) -> Result<Vec<CartItem>> {
        self.store.force_reload(session_key)?;
        self.store.with_record(session_key, |record| record.cart.clone())
    }

    /// Total number of units across all lines.
    pub fn count(&self, session_key: &str) -> Result<u32> {
        self.store.force_reload(session_key)?;
        self.store
            .with_record(session_key, |record| {
                record.cart.iter().map(|i| i.quantity).sum()
            })
    }

    /// Sum of `price * quantity` across the cart.
    pub fn total(&self, session_key: &str) -> Result<f64> {
        self.store.force_reload(session_key)?;
        self.store.with_record(session_key, |record| record.cart_total())
    }
}
