//! Persistence DTOs and the versioned migration chain.

pub mod record;

pub use record::{
    CartItemV2_0_0, CartItemV3_0_0, MockupV1_0_0, MonthV1_0_0, MonthV3_0_0, OrderInfoV1_0_0,
    ProjectMetaV1_0_0, ProjectV2_0_0, ProjectV3_0_0, RecordV1_0_0, RecordV2_0_0, RecordV3_0_0,
    UploadedImageV1_0_0,
};
