//! Application services over the session store.
//!
//! Each service is a thin stateless facade owning an `Arc<SessionStore>`;
//! all invariants live in `almanac-core`, all durability in
//! `almanac-infrastructure`. Handlers construct these once and share them.

pub mod cart_service;
pub mod fulfillment_service;
pub mod generation_service;
pub mod project_service;
pub mod variant_service;

pub use crate::cart_service::CartService;
pub use crate::fulfillment_service::FulfillmentService;
pub use crate::generation_service::GenerationService;
pub use crate::project_service::ProjectService;
pub use crate::variant_service::VariantService;
