//! CI run details from the build environment.

use buildstash_metadata::RunInfo;
use std::collections::BTreeMap;
use time::OffsetDateTime;

/// Millisecond timestamps for any date after 1973 exceed this.
const MILLIS_THRESHOLD: i64 = 100_000_000_000;

/// Run details from Jenkins-style variables (`JOB_NAME`, `BUILD_NUMBER`,
/// `BUILD_URL`, `JOB_URL`). The run's start time is not in the
/// environment, so callers pass it in.
pub fn run_info(env: &BTreeMap<String, String>, started_at: Option<OffsetDateTime>) -> RunInfo {
    let get = |name: &str| {
        env.get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    RunInfo {
        pipeline_name: get("JOB_NAME"),
        run_number: get("BUILD_NUMBER"),
        run_path: get("BUILD_URL"),
        pipeline_path: get("JOB_URL"),
        duration: None,
        started_at,
    }
}

/// Parse a run start time given as Unix seconds or milliseconds, e.g.
/// `$(date +%s)` or Jenkins' `currentBuild.startTimeInMillis`.
pub fn parse_started_at(value: &str) -> Result<OffsetDateTime, String> {
    let raw: i64 = value
        .trim()
        .parse()
        .map_err(|_| format!("{value} is not a Unix timestamp"))?;
    let seconds = if raw.abs() >= MILLIS_THRESHOLD {
        raw / 1000
    } else {
        raw
    };
    OffsetDateTime::from_unix_timestamp(seconds).map_err(|e| e.to_string())
}

/// Root URL of the CI server when the environment names one.
pub fn root_url(env: &BTreeMap<String, String>) -> Option<String> {
    env.get("JENKINS_URL")
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
