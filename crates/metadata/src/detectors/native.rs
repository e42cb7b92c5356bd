use super::{Detector, found};
use crate::context::{DetectionContext, ScmSnapshot, non_blank};
use buildstash_core::vcs::{clean_branch, extract_repo_name};
use buildstash_core::{HostType, VcProvenance, VcsHost};

/// Reads the CI server's view of the job's configured SCM.
#[derive(Clone, Copy, Debug, Default)]
pub struct NativeScmDetector;

impl Detector for NativeScmDetector {
    fn name(&self) -> &'static str {
        "native-scm"
    }

    fn attempt(&self, ctx: &DetectionContext) -> Option<VcProvenance> {
        let scm = ctx.scm.as_ref()?;

        let repo_url = repo_url(scm);
        let provenance = VcProvenance {
            host_type: HostType::from_scm_label(&scm.label).map(|t| t.as_str().to_string()),
            host: repo_url
                .and_then(VcsHost::from_url)
                .map(|h| h.as_str().to_string()),
            repo_name: repo_url.and_then(extract_repo_name),
            repo_url: repo_url.map(str::to_string),
            branch: branch(scm),
            commit_sha: commit(scm).map(str::to_string),
            commit_url: None,
        };
        found(provenance)
    }
}

/// Configured remotes (Git only), then remotes recorded by revision tracking.
fn repo_url(scm: &ScmSnapshot) -> Option<&str> {
    let configured = scm
        .is_git()
        .then(|| first_non_blank(&scm.remote_urls))
        .flatten();

    configured.or_else(|| {
        scm.revision_tracking
            .as_ref()
            .and_then(|tracking| first_non_blank(&tracking.remote_urls))
    })
}

/// Last built revision's branch, then the first tracked branch, then the
/// first configured branch specifier (Git only).
fn branch(scm: &ScmSnapshot) -> Option<String> {
    let tracked = scm.revision_tracking.as_ref().and_then(|tracking| {
        tracking
            .last_built_revision
            .as_ref()
            .and_then(|revision| non_blank(revision.branch.as_deref()))
            .or_else(|| {
                tracking
                    .builds_by_branch
                    .first()
                    .and_then(|(name, _)| non_blank(Some(name.as_str())))
            })
    });

    let configured = || {
        scm.is_git()
            .then(|| first_non_blank(&scm.branch_specs))
            .flatten()
    };

    tracked.or_else(configured).and_then(clean_branch)
}

/// Minimum length for a bare revision name to be accepted as a commit id.
const MIN_COMMIT_LEN: usize = 7;

/// Commit identifier from revision tracking, the change log, or any recorded
/// build-data action, in that order.
fn commit(scm: &ScmSnapshot) -> Option<&str> {
    let tracking = scm.revision_tracking.as_ref();

    let last_built = scm.last_built_revision().and_then(|r| r.commit());

    let by_branch = || {
        tracking
            .and_then(|t| t.builds_by_branch.first())
            .and_then(|(_, revision)| {
                non_blank(revision.sha1_string.as_deref()).or_else(|| {
                    revision
                        .commit()
                        .filter(|commit| commit.len() >= MIN_COMMIT_LEN)
                })
            })
    };

    let changelog = || scm.changelog.first().and_then(|id| non_blank(Some(id.as_str())));

    let actions = || {
        scm.actions
            .iter()
            .filter(|action| action.kind.contains("BuildData"))
            .find_map(|action| {
                action
                    .last_built_revision
                    .as_ref()
                    .and_then(|revision| non_blank(revision.sha1_string.as_deref()))
            })
    };

    last_built
        .or_else(by_branch)
        .or_else(changelog)
        .or_else(actions)
}

fn first_non_blank(values: &[String]) -> Option<&str> {
    values.iter().find_map(|value| non_blank(Some(value.as_str())))
}
