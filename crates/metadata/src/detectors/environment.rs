use super::{Detector, found};
use crate::context::DetectionContext;
use buildstash_core::vcs::{clean_branch, extract_repo_name};
use buildstash_core::{HostType, VcProvenance, VcsHost};

pub const GIT_URL: &str = "GIT_URL";
pub const GIT_BRANCH: &str = "GIT_BRANCH";
pub const GIT_COMMIT: &str = "GIT_COMMIT";
pub const GIT_COMMIT_SHORT: &str = "GIT_COMMIT_SHORT";

/// Reads the `GIT_*` variables exported by the Git integration. Useful for
/// scripted pipelines where the job has no configured SCM.
#[derive(Clone, Copy, Debug, Default)]
pub struct EnvironmentDetector;

impl Detector for EnvironmentDetector {
    fn name(&self) -> &'static str {
        "git-environment"
    }

    fn attempt(&self, ctx: &DetectionContext) -> Option<VcProvenance> {
        let repo_url = ctx.var(GIT_URL);
        let full_commit = ctx.var(GIT_COMMIT);

        let commit_sha = full_commit
            .map(str::to_string)
            .or_else(|| ctx.var(GIT_COMMIT_SHORT).map(|short| expand_short_commit(ctx, short)));

        let host_type = (repo_url.is_some() || full_commit.is_some())
            .then(|| HostType::Git.as_str().to_string());

        found(VcProvenance {
            host_type,
            host: repo_url
                .and_then(VcsHost::from_url)
                .map(|h| h.as_str().to_string()),
            repo_name: repo_url.and_then(extract_repo_name),
            repo_url: repo_url.map(str::to_string),
            branch: ctx.var(GIT_BRANCH).and_then(clean_branch),
            commit_sha,
            commit_url: None,
        })
    }
}

/// Expand a short commit to the tracked full revision when it is a prefix of
/// it; otherwise keep the short form.
fn expand_short_commit(ctx: &DetectionContext, short: &str) -> String {
    ctx.scm
        .as_ref()
        .and_then(|scm| scm.last_built_revision())
        .and_then(|revision| revision.sha1_string.as_deref())
        .filter(|full| full.starts_with(short))
        .unwrap_or(short)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Revision, RevisionTracking, ScmSnapshot};
    use std::collections::BTreeMap;

    fn env(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn empty_environment_yields_nothing() {
        let ctx = DetectionContext::new(None, env(&[("PATH", "/usr/bin")]));
        assert!(EnvironmentDetector.attempt(&ctx).is_none());
    }

    #[test]
    fn reads_git_variables() {
        let ctx = DetectionContext::new(
            None,
            env(&[
                (GIT_URL, "https://gitlab.com/acme/widget.git"),
                (GIT_BRANCH, "origin/feature/login"),
                (GIT_COMMIT, "0123456789abcdef"),
            ]),
        );

        let found = EnvironmentDetector.attempt(&ctx).unwrap();
        assert_eq!(found.host_type.as_deref(), Some("git"));
        assert_eq!(found.host.as_deref(), Some("gitlab"));
        assert_eq!(found.repo_name.as_deref(), Some("widget"));
        assert_eq!(found.branch.as_deref(), Some("feature/login"));
        assert_eq!(found.commit_sha.as_deref(), Some("0123456789abcdef"));
    }

    #[test]
    fn short_commit_expands_against_tracked_revision() {
        let scm = ScmSnapshot {
            revision_tracking: Some(RevisionTracking {
                last_built_revision: Some(Revision {
                    sha1_string: Some("abcdef0123456789".to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        };

        let ctx = DetectionContext::new(Some(scm.clone()), env(&[(GIT_COMMIT_SHORT, "abcdef0")]));
        let found = EnvironmentDetector.attempt(&ctx).unwrap();
        assert_eq!(found.commit_sha.as_deref(), Some("abcdef0123456789"));
        // A short commit alone does not imply the host type.
        assert!(found.host_type.is_none());

        let ctx = DetectionContext::new(Some(scm), env(&[(GIT_COMMIT_SHORT, "9999999")]));
        let found = EnvironmentDetector.attempt(&ctx).unwrap();
        assert_eq!(found.commit_sha.as_deref(), Some("9999999"));
    }

    #[test]
    fn full_commit_wins_over_short() {
        let ctx = DetectionContext::new(
            None,
            env(&[(GIT_COMMIT, "full-sha-value"), (GIT_COMMIT_SHORT, "short")]),
        );
        let found = EnvironmentDetector.attempt(&ctx).unwrap();
        assert_eq!(found.commit_sha.as_deref(), Some("full-sha-value"));
    }
}
