use super::{Detector, found};
use crate::context::DetectionContext;
use buildstash_core::vcs::{perforce_changelist_url, perforce_repo_name, perforce_repo_url};
use buildstash_core::{HostType, VcProvenance, VcsHost};

pub const P4_CHANGELIST: &str = "P4_CHANGELIST";
pub const P4_DEPOT_PATH: &str = "P4_DEPOT_PATH";
pub const P4_PORT: &str = "P4_PORT";
pub const P4_STREAM: &str = "P4_STREAM";

/// Reads the `P4_*` variables exported by the Perforce integration.
///
/// Triggers when any of the changelist, depot path or port variables is set.
/// Changelists stand in for commits, streams (or the depot path) for
/// branches.
#[derive(Clone, Copy, Debug, Default)]
pub struct PerforceDetector;

impl Detector for PerforceDetector {
    fn name(&self) -> &'static str {
        "perforce-environment"
    }

    fn attempt(&self, ctx: &DetectionContext) -> Option<VcProvenance> {
        if ![P4_CHANGELIST, P4_DEPOT_PATH, P4_PORT]
            .iter()
            .any(|name| ctx.has_var(name))
        {
            return None;
        }

        let changelist = ctx.var(P4_CHANGELIST);
        let depot_path = ctx.var(P4_DEPOT_PATH);
        let port = ctx.var(P4_PORT);

        found(VcProvenance {
            host_type: Some(HostType::Perforce.as_str().to_string()),
            host: Some(VcsHost::Perforce.as_str().to_string()),
            repo_name: depot_path.and_then(perforce_repo_name),
            repo_url: depot_path.map(|depot| perforce_repo_url(port, depot)),
            branch: ctx.var(P4_STREAM).or(depot_path).map(str::to_string),
            commit_sha: changelist.map(str::to_string),
            commit_url: changelist
                .zip(port)
                .and_then(|(changelist, port)| perforce_changelist_url(port, changelist)),
        })
    }
}
