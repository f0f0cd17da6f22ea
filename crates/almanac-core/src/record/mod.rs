//! Session record domain model.

pub mod model;

pub use model::{
    CalendarMonth, CartItem, ImageVariant, MockupInfo, OrderInfo, Project, SessionRecord,
    UploadedImage,
};
