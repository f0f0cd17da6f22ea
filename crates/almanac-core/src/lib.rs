pub mod catalog;
pub mod error;
pub mod generation;
pub mod record;
pub mod repository;

// Re-export common error type
pub use error::{AlmanacError, Result};
