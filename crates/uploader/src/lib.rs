//! Publishing builds to Buildstash.
//!
//! This crate provides:
//! - The registry API client and a retry helper
//! - The upload planner (`POST /uploads`)
//! - The transfer orchestrator: direct and multipart presigned uploads,
//!   finalization
//! - The publication pipeline tying them together

pub mod api;
pub mod error;
pub mod pipeline;
pub mod planner;
pub mod retry;
pub mod transfer;

pub use api::ApiClient;
pub use error::{ApiError, PublishError, PublishResult};
pub use pipeline::{Artifacts, Publisher};
pub use planner::UploadPlanner;
pub use retry::RetryPolicy;
pub use transfer::TransferOrchestrator;
