//! CI run context.

use crate::context::non_blank;
use buildstash_core::CiProvenance;
use std::sync::Arc;
use time::{Duration, OffsetDateTime};

/// Supplies the CI server's root URL, used to make run and pipeline links
/// absolute.
pub trait UrlBaseResolver: Send + Sync {
    fn root_url(&self) -> Option<String>;
}

/// A fixed root URL, typically from configuration.
#[derive(Clone, Debug, Default)]
pub struct StaticRootUrl(pub Option<String>);

impl UrlBaseResolver for StaticRootUrl {
    fn root_url(&self) -> Option<String> {
        self.0.clone()
    }
}

/// What the CI server reports about the current run.
#[derive(Clone, Debug, Default)]
pub struct RunInfo {
    pub pipeline_name: Option<String>,
    pub run_number: Option<String>,
    /// Run link, relative to the root URL or already absolute.
    pub run_path: Option<String>,
    /// Pipeline link, relative to the root URL or already absolute.
    pub pipeline_path: Option<String>,
    /// Recorded duration. Zero or unset means the run is still going.
    pub duration: Option<Duration>,
    pub started_at: Option<OffsetDateTime>,
}

/// Builds [`CiProvenance`] from run info.
#[derive(Clone)]
pub struct CiContextBuilder {
    urls: Arc<dyn UrlBaseResolver>,
    source: String,
}

impl CiContextBuilder {
    pub fn new(urls: Arc<dyn UrlBaseResolver>, source: impl Into<String>) -> Self {
        Self {
            urls,
            source: source.into(),
        }
    }

    pub fn build(&self, run: &RunInfo) -> CiProvenance {
        self.build_at(run, OffsetDateTime::now_utc())
    }

    /// Like [`build`](Self::build) with an explicit clock for elapsed time.
    pub fn build_at(&self, run: &RunInfo, now: OffsetDateTime) -> CiProvenance {
        let root = self.urls.root_url();

        let duration = match run.duration {
            Some(recorded) if recorded > Duration::ZERO => Some(recorded),
            _ => run.started_at.map(|started| now - started),
        };

        CiProvenance {
            pipeline: non_blank(run.pipeline_name.as_deref()).map(str::to_string),
            run_id: non_blank(run.run_number.as_deref()).map(str::to_string),
            run_url: non_blank(run.run_path.as_deref())
                .map(|path| absolute_url(root.as_deref(), path)),
            pipeline_url: non_blank(run.pipeline_path.as_deref())
                .map(|path| absolute_url(root.as_deref(), path)),
            build_duration: duration.map(format_duration),
            source: self.source.trim().to_string(),
        }
    }
}

/// Join a root URL and a relative path. Absolute paths and a missing root
/// pass the path through unchanged.
pub fn absolute_url(root: Option<&str>, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    match root.map(|r| r.trim().trim_end_matches('/')) {
        Some(root) if !root.is_empty() => {
            format!("{root}/{}", path.trim_start_matches('/'))
        }
        _ => path.to_string(),
    }
}

/// `HH:MM:SS`; hours are not capped at 99. Negative durations clamp to zero.
pub fn format_duration(duration: Duration) -> String {
    let total = duration.whole_seconds().max(0);
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}
