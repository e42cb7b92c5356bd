//! Publication error types.

use std::time::Duration;
use thiserror::Error;

/// Failures talking to the registry API or presigned storage URLs.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("API error ({status}): {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("malformed response: {0}")]
    Decode(String),

    #[error("invalid URL: {0}")]
    Url(String),
}

impl ApiError {
    /// Transport failures and 5xx responses may succeed on a later attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { status, .. } => status.is_server_error(),
            Self::Decode(_) | Self::Url(_) => false,
        }
    }
}

/// A failed publication, tagged with the stage that failed.
#[derive(Debug, Error)]
pub enum PublishError {
    /// Missing field or file, detected before any network call.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The planning round trip failed or returned an unusable plan.
    #[error("upload planning failed: {0}")]
    Planning(String),

    /// A part or direct PUT failed after exhausting its retry budget.
    #[error(
        "transfer of {filename}{} failed after {attempts} attempt(s): {message}",
        part_suffix(.part_number)
    )]
    Transfer {
        filename: String,
        part_number: Option<u32>,
        attempts: u32,
        message: String,
    },

    /// Every file was transferred but the completion call failed. A retry
    /// must start a new pending upload.
    #[error("finalizing pending upload {pending_upload_id} failed: {message}")]
    Finalize {
        pending_upload_id: String,
        message: String,
    },

    #[error("publication cancelled")]
    Cancelled,

    #[error("publication timed out after {0:?}")]
    TimedOut(Duration),
}

fn part_suffix(part_number: &Option<u32>) -> String {
    part_number
        .map(|n| format!(" part {n}"))
        .unwrap_or_default()
}

impl From<buildstash_core::Error> for PublishError {
    fn from(err: buildstash_core::Error) -> Self {
        match err {
            buildstash_core::Error::InvalidPlan(message) => Self::Planning(message),
            other => Self::Validation(other.to_string()),
        }
    }
}

/// Result type for publication operations.
pub type PublishResult<T> = std::result::Result<T, PublishError>;
