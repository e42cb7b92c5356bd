//! Provenance resolution.
//!
//! The resolver folds detector results left to right over the caller's
//! partial provenance. Every step only fills blank fields, so caller values
//! always win, then the native SCM, then environment variables.

use crate::context::DetectionContext;
use crate::detectors::{Detector, default_chain};
use buildstash_core::vcs::{commit_url, extract_repo_name};
use buildstash_core::{VcProvenance, VcsHost};
use std::panic::{AssertUnwindSafe, catch_unwind};
use tracing::{debug, warn};

/// Runs a chain of detectors and synthesizes derived fields.
pub struct Resolver {
    detectors: Vec<Box<dyn Detector>>,
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new(default_chain())
    }
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<_> = self.detectors.iter().map(|d| d.name()).collect();
        f.debug_struct("Resolver").field("detectors", &names).finish()
    }
}

impl Resolver {
    pub fn new(detectors: Vec<Box<dyn Detector>>) -> Self {
        Self { detectors }
    }

    /// Resolve provenance for one publication. Never fails: a detector that
    /// finds nothing, or panics, contributes nothing.
    pub fn resolve(&self, ctx: &DetectionContext, partial: VcProvenance) -> VcProvenance {
        let mut resolved = partial.normalized();

        for detector in &self.detectors {
            match catch_unwind(AssertUnwindSafe(|| detector.attempt(ctx))) {
                Ok(Some(found)) => {
                    debug!(detector = detector.name(), ?found, "Detector reported provenance");
                    resolved.fill_from(&found);
                }
                Ok(None) => {
                    debug!(detector = detector.name(), "Detector found nothing");
                }
                Err(_) => {
                    warn!(detector = detector.name(), "Detector failed, skipping");
                }
            }
        }

        derive_fields(&mut resolved);
        resolved
    }
}

/// Fill host, repo name and commit URL from the resolved repo URL and commit.
fn derive_fields(provenance: &mut VcProvenance) {
    let Some(repo_url) = provenance.repo_url.clone() else {
        return;
    };

    let derived = VcProvenance {
        host: VcsHost::from_url(&repo_url).map(|h| h.as_str().to_string()),
        repo_name: extract_repo_name(&repo_url),
        ..Default::default()
    };
    provenance.fill_from(&derived);

    if provenance.commit_url.is_none()
        && let Some(commit) = provenance.commit_sha.as_deref()
    {
        let host = provenance.host.as_deref().and_then(VcsHost::parse);
        provenance.commit_url = commit_url(&repo_url, commit, host);
    }
}
