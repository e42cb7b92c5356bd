//! Native SCM snapshot of a local Git checkout.

use buildstash_metadata::{Revision, RevisionTracking, ScmSnapshot};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

/// Label reported for snapshots taken from the `git` binary.
pub const GIT_SCM_LABEL: &str = "git";

/// Query `git` in `workspace`. Returns `None` when the directory is not a
/// work tree or `git` is unavailable.
pub async fn snapshot(workspace: &Path) -> Option<ScmSnapshot> {
    if git(workspace, &["rev-parse", "--is-inside-work-tree"]).await? != "true" {
        return None;
    }

    let remote_urls = remote_urls(workspace).await;
    let head = git(workspace, &["rev-parse", "HEAD"]).await;
    let branch = git(workspace, &["rev-parse", "--abbrev-ref", "HEAD"])
        .await
        .filter(|b| b != "HEAD");
    let upstream = git(
        workspace,
        &["rev-parse", "--abbrev-ref", "--symbolic-full-name", "@{u}"],
    )
    .await;

    tracing::debug!(
        remotes = remote_urls.len(),
        head = head.as_deref().unwrap_or_default(),
        branch = branch.as_deref().unwrap_or_default(),
        "Read Git checkout"
    );

    Some(ScmSnapshot {
        label: GIT_SCM_LABEL.to_string(),
        remote_urls: remote_urls.clone(),
        branch_specs: upstream.into_iter().collect(),
        revision_tracking: Some(RevisionTracking {
            last_built_revision: Some(Revision {
                sha1_string: head,
                branch,
                ..Default::default()
            }),
            remote_urls,
            ..Default::default()
        }),
        ..Default::default()
    })
}

/// Remote URLs with `origin` first.
async fn remote_urls(workspace: &Path) -> Vec<String> {
    let Some(names) = git(workspace, &["remote"]).await else {
        return Vec::new();
    };
    let mut names: Vec<&str> = names.lines().map(str::trim).filter(|n| !n.is_empty()).collect();
    names.sort_by_key(|name| *name != "origin");

    let mut urls = Vec::with_capacity(names.len());
    for name in names {
        if let Some(url) = git(workspace, &["remote", "get-url", name]).await {
            urls.push(url);
        }
    }
    urls
}

/// Run `git -C <workspace> <args>` and return trimmed stdout on success.
async fn git(workspace: &Path, args: &[&str]) -> Option<String> {
    let output = Command::new("git")
        .arg("-C")
        .arg(workspace)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let stdout = String::from_utf8(output.stdout).ok()?;
    let trimmed = stdout.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
