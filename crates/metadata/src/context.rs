//! Inputs available to detectors.
//!
//! A [`DetectionContext`] is a snapshot taken once per publication: what the
//! CI server knows about the configured SCM and the build's environment.
//! Detectors only read it.

use buildstash_core::HostType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A revision recorded by the SCM integration.
///
/// Different integrations populate different accessors, so the commit
/// identifier may live in any of `sha1_string`, `sha1` or `name`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Revision {
    pub sha1_string: Option<String>,
    pub sha1: Option<String>,
    pub name: Option<String>,
    /// Branch the revision was built from, e.g. `origin/main`.
    pub branch: Option<String>,
}

impl Revision {
    /// Commit identifier, checking accessors from most to least specific.
    pub fn commit(&self) -> Option<&str> {
        [&self.sha1_string, &self.sha1, &self.name]
            .into_iter()
            .find_map(|value| non_blank(value.as_deref()))
    }
}

/// Build-level revision tracking (what was checked out for this run).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RevisionTracking {
    pub last_built_revision: Option<Revision>,
    /// Branch name to the revision last built from it, in recorded order.
    pub builds_by_branch: Vec<(String, Revision)>,
    pub remote_urls: Vec<String>,
}

/// An action recorded on the build, identified by its kind label.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordedAction {
    pub kind: String,
    pub last_built_revision: Option<Revision>,
}

/// What the CI server exposes about the job's configured SCM.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScmSnapshot {
    /// Identifying label of the SCM implementation, e.g.
    /// `hudson.plugins.git.GitSCM`.
    pub label: String,
    /// Configured remote URLs, first is primary.
    pub remote_urls: Vec<String>,
    /// Configured branch specifiers, e.g. `*/main`.
    pub branch_specs: Vec<String>,
    pub revision_tracking: Option<RevisionTracking>,
    /// Commit ids from the build's change log, newest first.
    pub changelog: Vec<String>,
    pub actions: Vec<RecordedAction>,
}

impl ScmSnapshot {
    /// True for Git-based SCM implementations.
    pub fn is_git(&self) -> bool {
        HostType::from_scm_label(&self.label) == Some(HostType::Git)
    }

    pub fn last_built_revision(&self) -> Option<&Revision> {
        self.revision_tracking
            .as_ref()
            .and_then(|tracking| tracking.last_built_revision.as_ref())
    }
}

/// Everything detectors may look at.
#[derive(Clone, Debug, Default)]
pub struct DetectionContext {
    pub scm: Option<ScmSnapshot>,
    pub env: BTreeMap<String, String>,
}

impl DetectionContext {
    pub fn new(scm: Option<ScmSnapshot>, env: BTreeMap<String, String>) -> Self {
        Self { scm, env }
    }

    /// Context built from the current process environment.
    pub fn from_process_env(scm: Option<ScmSnapshot>) -> Self {
        Self::new(scm, std::env::vars().collect())
    }

    /// Non-blank environment value.
    pub fn var(&self, name: &str) -> Option<&str> {
        non_blank(self.env.get(name).map(String::as_str))
    }

    /// True when the variable is set at all, even if blank.
    pub fn has_var(&self, name: &str) -> bool {
        self.env.contains_key(name)
    }
}

pub(crate) fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revision_commit_prefers_sha1_string() {
        let revision = Revision {
            sha1_string: Some(" ".to_string()),
            sha1: Some("abc".to_string()),
            name: Some("def".to_string()),
            branch: None,
        };
        assert_eq!(revision.commit(), Some("abc"));
        assert_eq!(Revision::default().commit(), None);
    }

    #[test]
    fn snapshot_deserializes_with_defaults() {
        let snapshot: ScmSnapshot = serde_json::from_str(
            r#"{"label": "hudson.plugins.git.GitSCM", "remote_urls": ["https://github.com/acme/widget.git"]}"#,
        )
        .unwrap();
        assert!(snapshot.is_git());
        assert!(snapshot.revision_tracking.is_none());
        assert!(snapshot.changelog.is_empty());
    }

    #[test]
    fn var_ignores_blank_values() {
        let env = BTreeMap::from([
            ("GIT_URL".to_string(), "  ".to_string()),
            ("GIT_COMMIT".to_string(), "abc".to_string()),
        ]);
        let ctx = DetectionContext::new(None, env);
        assert_eq!(ctx.var("GIT_URL"), None);
        assert!(ctx.has_var("GIT_URL"));
        assert_eq!(ctx.var("GIT_COMMIT"), Some("abc"));
    }
}
