//! Provenance detectors.
//!
//! Each detector reads one information source and reports whatever it found
//! as a partial [`VcProvenance`]. Absence is not an error: a detector that
//! finds nothing returns `None`.

mod environment;
mod native;
mod perforce;

pub use environment::EnvironmentDetector;
pub use native::NativeScmDetector;
pub use perforce::PerforceDetector;

use crate::context::DetectionContext;
use buildstash_core::VcProvenance;

/// One source of version-control provenance.
pub trait Detector: Send + Sync {
    /// Short name for logging.
    fn name(&self) -> &'static str;

    /// Inspect `ctx` and report any fields this source knows.
    fn attempt(&self, ctx: &DetectionContext) -> Option<VcProvenance>;
}

/// Detectors in precedence order: native SCM, then Git environment
/// variables, then Perforce environment variables.
pub fn default_chain() -> Vec<Box<dyn Detector>> {
    vec![
        Box::new(NativeScmDetector),
        Box::new(EnvironmentDetector),
        Box::new(PerforceDetector),
    ]
}

/// `Some` unless every field is blank.
pub(crate) fn found(provenance: VcProvenance) -> Option<VcProvenance> {
    let provenance = provenance.normalized();
    (!provenance.is_empty()).then_some(provenance)
}
