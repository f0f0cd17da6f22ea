pub mod dto;
pub mod record_repository;
pub mod store;
pub mod token;

pub use crate::record_repository::FileRecordRepository;
pub use crate::store::SessionStore;
