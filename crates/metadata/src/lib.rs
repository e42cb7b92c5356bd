//! Provenance metadata for Buildstash uploads.
//!
//! This crate provides:
//! - The detection context: SCM snapshot plus build environment
//! - Detectors for native SCM data, Git and Perforce environment variables
//! - The resolver that folds detector output under caller-supplied values
//! - The CI context builder

pub mod ci;
pub mod context;
pub mod detectors;
pub mod resolver;

pub use ci::{CiContextBuilder, RunInfo, StaticRootUrl, UrlBaseResolver};
pub use context::{DetectionContext, RecordedAction, Revision, RevisionTracking, ScmSnapshot};
pub use detectors::{Detector, EnvironmentDetector, NativeScmDetector, PerforceDetector};
pub use resolver::Resolver;
