//! Version-control provenance model and URL heuristics.
//!
//! Everything in here is pure string work: no I/O, no environment access.
//! The detectors in `buildstash-metadata` feed raw values through these
//! helpers so every source agrees on host names, repo names and branch
//! spelling.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Version-control facts describing where a build came from.
///
/// Every field is optional. A field that already holds a non-blank value is
/// treated as authoritative and is never replaced by [`fill_from`].
///
/// [`fill_from`]: VcProvenance::fill_from
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VcProvenance {
    #[serde(rename = "vc_host_type", default, skip_serializing_if = "Option::is_none")]
    pub host_type: Option<String>,
    #[serde(rename = "vc_host", default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(rename = "vc_repo_name", default, skip_serializing_if = "Option::is_none")]
    pub repo_name: Option<String>,
    #[serde(rename = "vc_repo_url", default, skip_serializing_if = "Option::is_none")]
    pub repo_url: Option<String>,
    #[serde(rename = "vc_branch", default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(rename = "vc_commit_sha", default, skip_serializing_if = "Option::is_none")]
    pub commit_sha: Option<String>,
    #[serde(rename = "vc_commit_url", default, skip_serializing_if = "Option::is_none")]
    pub commit_url: Option<String>,
}

impl VcProvenance {
    /// Fill every blank field from `other`, leaving populated fields alone.
    pub fn fill_from(&mut self, other: &VcProvenance) {
        fill(&mut self.host_type, &other.host_type);
        fill(&mut self.host, &other.host);
        fill(&mut self.repo_name, &other.repo_name);
        fill(&mut self.repo_url, &other.repo_url);
        fill(&mut self.branch, &other.branch);
        fill(&mut self.commit_sha, &other.commit_sha);
        fill(&mut self.commit_url, &other.commit_url);
    }

    /// Drop blank strings so that `Some("")` and `None` mean the same thing.
    pub fn normalized(mut self) -> Self {
        for field in [
            &mut self.host_type,
            &mut self.host,
            &mut self.repo_name,
            &mut self.repo_url,
            &mut self.branch,
            &mut self.commit_sha,
            &mut self.commit_url,
        ] {
            if is_blank(field.as_deref()) {
                *field = None;
            }
        }
        self
    }

    /// True when no field carries a value.
    pub fn is_empty(&self) -> bool {
        self.clone().normalized() == Self::default()
    }
}

fn fill(target: &mut Option<String>, source: &Option<String>) {
    if is_blank(target.as_deref())
        && let Some(value) = source.as_deref().map(str::trim)
        && !value.is_empty()
    {
        *target = Some(value.to_string());
    }
}

/// True for `None`, empty and whitespace-only strings.
pub fn is_blank(value: Option<&str>) -> bool {
    value.is_none_or(|v| v.trim().is_empty())
}

/// Version-control system family.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HostType {
    Git,
    Svn,
    Mercurial,
    Bazaar,
    Perforce,
    Cvs,
}

impl HostType {
    /// Wire spelling of the host type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Git => "git",
            Self::Svn => "svn",
            Self::Mercurial => "hg",
            Self::Bazaar => "bzr",
            Self::Perforce => "perforce",
            Self::Cvs => "cvs",
        }
    }

    /// Classify an SCM implementation by its identifying label
    /// (e.g. `hudson.plugins.git.GitSCM`). First match wins.
    pub fn from_scm_label(label: &str) -> Option<Self> {
        let label = label.to_ascii_lowercase();
        if label.contains("git") {
            Some(Self::Git)
        } else if label.contains("svn") || label.contains("subversion") {
            Some(Self::Svn)
        } else if label.contains("mercurial") || label.contains("hg") {
            Some(Self::Mercurial)
        } else if label.contains("bazaar") || label.contains("bzr") {
            Some(Self::Bazaar)
        } else if label.contains("perforce") {
            Some(Self::Perforce)
        } else if label.contains("cvs") {
            Some(Self::Cvs)
        } else {
            None
        }
    }
}

impl fmt::Display for HostType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Known repository hosting services.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VcsHost {
    GitHub,
    GitLab,
    GitLabSelfHosted,
    Bitbucket,
    Gitea,
    Forgejo,
    Gogs,
    Codeberg,
    SourceForge,
    Sourcehut,
    AwsCodeCommit,
    AzureRepos,
    Perforce,
    Gitee,
}

/// URL signatures checked in order. More specific signatures come first so
/// that `gitlab.com` wins over the generic `gitlab`.
const HOST_SIGNATURES: &[(&[&str], VcsHost)] = &[
    (&["github.com"], VcsHost::GitHub),
    (&["gitlab.com"], VcsHost::GitLab),
    (&["gitlab"], VcsHost::GitLabSelfHosted),
    (&["bitbucket.org"], VcsHost::Bitbucket),
    (&["bitbucket"], VcsHost::Bitbucket),
    (&["gitea"], VcsHost::Gitea),
    (&["forgejo"], VcsHost::Forgejo),
    (&["gogs"], VcsHost::Gogs),
    (&["codeberg"], VcsHost::Codeberg),
    (&["sourceforge"], VcsHost::SourceForge),
    (&["sourcehut", "sr.ht"], VcsHost::Sourcehut),
    (&["codecommit"], VcsHost::AwsCodeCommit),
    (
        &["azure.com", "visualstudio.com", "dev.azure.com"],
        VcsHost::AzureRepos,
    ),
    (&["perforce"], VcsHost::Perforce),
    (&["gitee"], VcsHost::Gitee),
];

impl VcsHost {
    /// Wire spelling of the host.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GitHub => "github",
            Self::GitLab => "gitlab",
            Self::GitLabSelfHosted => "gitlab-self",
            Self::Bitbucket => "bitbucket",
            Self::Gitea => "gitea",
            Self::Forgejo => "forgejo",
            Self::Gogs => "gogs",
            Self::Codeberg => "codeberg",
            Self::SourceForge => "sourceforge",
            Self::Sourcehut => "sourcehut",
            Self::AwsCodeCommit => "aws-codecommit",
            Self::AzureRepos => "azure-repos",
            Self::Perforce => "perforce",
            Self::Gitee => "gitee",
        }
    }

    /// Parse the wire spelling back into a host.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim().to_ascii_lowercase();
        HOST_SIGNATURES
            .iter()
            .map(|(_, host)| *host)
            .find(|host| host.as_str() == value)
    }

    /// Identify the hosting service from a repository URL.
    pub fn from_url(url: &str) -> Option<Self> {
        let url = url.trim().to_ascii_lowercase();
        if url.is_empty() {
            return None;
        }
        HOST_SIGNATURES
            .iter()
            .find(|(needles, _)| needles.iter().any(|needle| url.contains(needle)))
            .map(|(_, host)| *host)
    }
}

impl fmt::Display for VcsHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strip `refs/heads/`, `origin/`, `*/` and bare `*` prefixes until none
/// remain. Returns `None` when nothing is left.
pub fn clean_branch(branch: &str) -> Option<String> {
    const PREFIXES: [&str; 4] = ["refs/heads/", "origin/", "*/", "*"];

    let mut current = branch.trim();
    loop {
        let stripped = PREFIXES
            .iter()
            .find_map(|prefix| current.strip_prefix(prefix));
        match stripped {
            Some(rest) => current = rest,
            None => break,
        }
    }

    if current.is_empty() {
        None
    } else {
        Some(current.to_string())
    }
}

/// Path component of a repository URL with query, fragment, trailing
/// slashes and `.git` removed. Handles `scheme://host/path` and scp-style
/// `user@host:path` remotes.
fn repo_path(url: &str) -> &str {
    let url = url.trim();
    let path = match url.split_once("://") {
        Some((_, rest)) => rest.find('/').map_or("", |idx| &rest[idx..]),
        None => match (url.find(':'), url.find('/')) {
            (Some(colon), Some(slash)) if colon < slash => &url[colon + 1..],
            (Some(colon), None) => &url[colon + 1..],
            _ => url,
        },
    };
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let path = path.trim_end_matches('/');
    path.strip_suffix(".git").unwrap_or(path)
}

/// Extract the repository name from a repository URL.
///
/// - `https://github.com/acme/widget.git` → `widget`
/// - `https://dev.azure.com/org/proj/_git/my-repo` → `my-repo`
/// - `https://bitbucket.example.com/scm/proj/widget.git` → `widget`
/// - `https://bitbucket.example.com/projects/ABC/repos/widget` → `widget`
pub fn extract_repo_name(url: &str) -> Option<String> {
    let segments: Vec<&str> = repo_path(url)
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect();
    let host = VcsHost::from_url(url);
    let lower = url.to_ascii_lowercase();

    if host == Some(VcsHost::AzureRepos)
        && lower.contains("/_git/")
        && let Some(idx) = segments
            .iter()
            .position(|segment| segment.eq_ignore_ascii_case("_git"))
        && let Some(name) = segments.get(idx + 1)
    {
        return Some((*name).to_string());
    }

    if host == Some(VcsHost::Bitbucket) && (lower.contains("/scm/") || lower.contains("/projects/"))
    {
        return segments
            .iter()
            .rev()
            .find(|segment| {
                !["scm", "projects", "repos"]
                    .iter()
                    .any(|keyword| segment.eq_ignore_ascii_case(keyword))
            })
            .map(|segment| (*segment).to_string());
    }

    segments.last().map(|segment| (*segment).to_string())
}

/// Build a browsable commit URL for `commit` in the repository at `repo_url`.
///
/// `host` is used when the URL alone does not identify the service (for
/// example self-hosted instances with custom domains).
pub fn commit_url(repo_url: &str, commit: &str, host: Option<VcsHost>) -> Option<String> {
    let commit = commit.trim();
    if commit.is_empty() || repo_url.trim().is_empty() {
        return None;
    }

    let host = VcsHost::from_url(repo_url).or(host)?;
    let base = repo_url.trim().trim_end_matches('/');
    let base = base.strip_suffix(".git").unwrap_or(base).trim_end_matches('/');

    let url = match host {
        VcsHost::GitHub
        | VcsHost::Gitea
        | VcsHost::Forgejo
        | VcsHost::Gogs
        | VcsHost::Codeberg
        | VcsHost::Sourcehut
        | VcsHost::AzureRepos => format!("{base}/commit/{commit}"),
        VcsHost::GitLab | VcsHost::GitLabSelfHosted => format!("{base}/-/commit/{commit}"),
        VcsHost::Bitbucket => format!("{base}/commits/{commit}"),
        VcsHost::Perforce => {
            let (port, _) = split_perforce_url(repo_url)?;
            return perforce_changelist_url(port, commit);
        }
        VcsHost::SourceForge | VcsHost::AwsCodeCommit | VcsHost::Gitee => return None,
    };
    Some(url)
}

/// Ensure a depot path carries the `//` depot prefix.
fn normalize_depot_path(depot_path: &str) -> String {
    let depot_path = depot_path.trim();
    if depot_path.starts_with("//") {
        depot_path.to_string()
    } else {
        format!("//{}", depot_path.trim_start_matches('/'))
    }
}

/// Repository URL for a Perforce depot path, optionally prefixed with the
/// server address (`P4PORT`): `ssl:p4.example.com:1666//depot/main`.
pub fn perforce_repo_url(port: Option<&str>, depot_path: &str) -> String {
    let depot_path = normalize_depot_path(depot_path);
    match port.map(str::trim).filter(|port| !port.is_empty()) {
        Some(port) => format!("{}{depot_path}", port.trim_end_matches('/')),
        None => depot_path,
    }
}

/// Split a URL built by [`perforce_repo_url`] into `(port, depot_path)`.
/// Returns `None` when no server address is present.
fn split_perforce_url(repo_url: &str) -> Option<(&str, &str)> {
    let trimmed = repo_url.trim();
    let body = trimmed.strip_prefix("perforce://").unwrap_or(trimmed);
    let idx = body.find("//")?;
    let (port, depot) = body.split_at(idx);
    if port.is_empty() {
        None
    } else {
        Some((port, depot))
    }
}

/// Host name portion of a `P4PORT` value (`ssl:p4.example.com:1666` →
/// `p4.example.com`).
pub fn perforce_server(port: &str) -> Option<String> {
    const PROTOCOLS: [&str; 7] = ["ssl:", "ssl4:", "ssl6:", "tcp:", "tcp4:", "tcp6:", "rsh:"];

    let mut server = port.trim();
    server = server.strip_prefix("perforce://").unwrap_or(server);
    if let Some(rest) = PROTOCOLS
        .iter()
        .find_map(|protocol| server.strip_prefix(protocol))
    {
        server = rest;
    }
    let server = server.split(':').next().unwrap_or_default();
    let server = server.trim_end_matches('/');
    if server.is_empty() {
        None
    } else {
        Some(server.to_string())
    }
}

/// Best-effort changelist link. Perforce has no canonical web UI, so this is
/// informational rather than clickable.
pub fn perforce_changelist_url(port: &str, changelist: &str) -> Option<String> {
    let changelist = changelist.trim();
    if changelist.is_empty() {
        return None;
    }
    let server = perforce_server(port)?;
    Some(format!("perforce://{server}/changes/{changelist}"))
}

/// Repository name for a depot path: the last segment that is not one of the
/// generic `depot`, `streams` or `main` names, else the last segment.
pub fn perforce_repo_name(depot_path: &str) -> Option<String> {
    let path = depot_path.trim();
    let path = path.strip_prefix("//").unwrap_or(path);
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    segments
        .iter()
        .rev()
        .find(|segment| {
            !["depot", "streams", "main"]
                .iter()
                .any(|generic| segment.eq_ignore_ascii_case(generic))
        })
        .or(segments.last())
        .map(|segment| (*segment).to_string())
}
