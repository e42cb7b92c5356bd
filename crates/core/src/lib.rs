//! Core domain types and shared logic for Buildstash publishing.
//!
//! This crate defines the data model used across all other crates:
//! - The upload request and its `POST /uploads` payload
//! - Version-control provenance and URL heuristics
//! - Upload protocol wire types and validated transfer plans
//! - Configuration

pub mod config;
pub mod error;
pub mod request;
pub mod upload;
pub mod vcs;

pub use config::AppConfig;
pub use error::{Error, Result};
pub use request::{CiProvenance, FileDescriptor, Structure, UploadRequest, Version, parse_list};
pub use upload::{BuildRecord, PartRange, PendingUpload, TransferMode, UploadPlan};
pub use vcs::{HostType, VcProvenance, VcsHost};
