//! Wire types for the upload protocol and the transfer plans derived from
//! them.
//!
//! The registry answers `POST /uploads` with one [`FileUploadInfo`] per file.
//! [`PendingUpload::from_response`] checks that response once and turns it
//! into [`UploadPlan`]s the transfer side can trust.

use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// One MiB, the unit of `chunked_part_size_mb`.
pub const MIB: u64 = 1024 * 1024;

/// Most parts a chunked plan may name.
pub const MAX_PARTS: u32 = 10_000;

/// Headers the presigned request must carry, already normalized to one
/// string value per name.
pub type PresignedHeaders = BTreeMap<String, String>;

/// Presigned target for a direct upload.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct PresignedData {
    pub url: String,
    #[serde(default, deserialize_with = "deserialize_headers")]
    pub headers: PresignedHeaders,
}

/// Header values arrive either as a string or as a list; the first list
/// element wins and non-string values are stringified. Nulls and empty lists
/// are dropped.
fn deserialize_headers<'de, D>(deserializer: D) -> std::result::Result<PresignedHeaders, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<BTreeMap<String, serde_json::Value>>::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(name, value)| header_value(value).map(|value| (name, value)))
        .collect())
}

fn header_value(value: serde_json::Value) -> Option<String> {
    use serde_json::Value;

    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        Value::Array(items) => items.into_iter().next().and_then(header_value),
        other => Some(other.to_string()),
    }
}

/// Server-issued transfer instructions for one file.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct FileUploadInfo {
    pub filename: String,
    #[serde(default)]
    pub chunked_upload: bool,
    #[serde(default)]
    pub chunked_number_parts: Option<u32>,
    #[serde(default)]
    pub chunked_part_size_mb: Option<u64>,
    #[serde(default)]
    pub presigned_data: Option<PresignedData>,
}

/// Response to `POST /uploads`.
#[derive(Clone, Debug, Deserialize)]
pub struct UploadRequestResponse {
    #[serde(default)]
    pub message: Option<String>,
    pub pending_upload_id: String,
    pub primary_file: FileUploadInfo,
    #[serde(default)]
    pub expansion_files: Vec<FileUploadInfo>,
}

/// Body of `POST /uploads/{id}/parts`.
#[derive(Clone, Debug, Serialize)]
pub struct PartUrlRequest<'a> {
    pub filename: &'a str,
    pub part_number: u32,
    pub content_length: u64,
}

/// Response to `POST /uploads/{id}/parts`.
#[derive(Clone, Debug, Deserialize)]
pub struct PartUrlResponse {
    #[serde(default)]
    pub message: Option<String>,
    pub part_presigned_url: String,
    #[serde(default)]
    pub part_number: Option<u32>,
}

/// A part whose PUT succeeded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CompletedPart {
    pub part_number: u32,
    #[serde(rename = "eTag")]
    pub etag: String,
}

/// Ordered parts of one chunked file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CompletedFile {
    pub filename: String,
    pub parts: Vec<CompletedPart>,
}

/// Body of `POST /uploads/{id}/complete`. Only chunked files are listed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CompleteUploadRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_file: Option<CompletedFile>,
    pub expansion_files: Vec<CompletedFile>,
}

/// Published build as reported by the completion endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRecord {
    #[serde(default)]
    pub message: Option<String>,
    pub build_id: String,
    #[serde(default)]
    pub pending_processing: bool,
    #[serde(default)]
    pub build_info_url: Option<String>,
    #[serde(default)]
    pub download_url: Option<String>,
}

/// How a file is moved to storage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransferMode {
    /// One PUT of the whole file to a presigned URL.
    Direct {
        url: String,
        headers: PresignedHeaders,
    },
    /// Multipart upload; each part gets its own presigned URL.
    Chunked { part_count: u32, part_size_mb: u64 },
}

/// Validated transfer plan for one file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadPlan {
    pub filename: String,
    pub mode: TransferMode,
}

impl UploadPlan {
    /// Validate one `FileUploadInfo`.
    pub fn from_info(info: FileUploadInfo) -> Result<Self> {
        if info.filename.trim().is_empty() {
            return Err(Error::InvalidPlan("file entry has no filename".to_string()));
        }

        let mode = if info.chunked_upload {
            let part_count = info.chunked_number_parts.unwrap_or(0);
            if part_count == 0 {
                return Err(Error::InvalidPlan(format!(
                    "{}: chunked upload with no parts",
                    info.filename
                )));
            }
            TransferMode::Chunked {
                part_count,
                part_size_mb: info.chunked_part_size_mb.unwrap_or(0),
            }
        } else {
            let presigned = info
                .presigned_data
                .filter(|p| !p.url.trim().is_empty())
                .ok_or_else(|| {
                    Error::InvalidPlan(format!("{}: missing presigned URL", info.filename))
                })?;
            TransferMode::Direct {
                url: presigned.url,
                headers: presigned.headers,
            }
        };

        Ok(Self {
            filename: info.filename,
            mode,
        })
    }

    pub fn is_chunked(&self) -> bool {
        matches!(self.mode, TransferMode::Chunked { .. })
    }

    /// Byte ranges for every part of a chunked plan. Direct plans have a
    /// single range covering the file.
    pub fn part_ranges(&self, file_size: u64) -> Result<Vec<PartRange>> {
        match self.mode {
            TransferMode::Direct { .. } => Ok(vec![PartRange {
                part_number: 1,
                offset: 0,
                length: file_size,
            }]),
            TransferMode::Chunked {
                part_count,
                part_size_mb,
            } => part_ranges(&self.filename, file_size, part_count, part_size_mb),
        }
    }
}

/// Byte range uploaded as one part.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PartRange {
    /// 1-based.
    pub part_number: u32,
    pub offset: u64,
    pub length: u64,
}

/// Split `file_size` bytes into `part_count` contiguous ranges.
///
/// Part size is `part_size_mb` MiB when positive, otherwise the file size
/// divided by the part count, rounded up. The last part absorbs any
/// remainder. Every part must carry at least one byte.
pub fn part_ranges(
    filename: &str,
    file_size: u64,
    part_count: u32,
    part_size_mb: u64,
) -> Result<Vec<PartRange>> {
    if part_count == 0 {
        return Err(Error::InvalidPlan(format!("{filename}: zero parts")));
    }
    if part_count > MAX_PARTS {
        return Err(Error::InvalidPlan(format!(
            "{filename}: {part_count} parts exceeds the limit of {MAX_PARTS}"
        )));
    }

    let count = u64::from(part_count);
    let part_size = if part_size_mb > 0 {
        part_size_mb.saturating_mul(MIB)
    } else {
        file_size.div_ceil(count)
    };

    // Offsets only grow, so a non-empty last part means every part is.
    let last_offset = (count - 1)
        .checked_mul(part_size)
        .filter(|offset| *offset < file_size && count <= file_size);
    let Some(last_offset) = last_offset else {
        return Err(Error::InvalidPlan(format!(
            "{filename}: {part_count} parts of {part_size} bytes would leave \
             part {part_count} empty ({file_size} bytes)"
        )));
    };

    let mut ranges = Vec::with_capacity(part_count as usize);
    for part_number in 1..part_count {
        let offset = u64::from(part_number - 1) * part_size;
        ranges.push(PartRange {
            part_number,
            offset,
            length: part_size,
        });
    }
    ranges.push(PartRange {
        part_number: part_count,
        offset: last_offset,
        length: file_size - last_offset,
    });
    Ok(ranges)
}

/// Server-issued correlation id plus a plan per file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingUpload {
    pub id: String,
    pub primary: UploadPlan,
    pub expansion: Option<UploadPlan>,
}

impl PendingUpload {
    /// Validate a planning response. `expect_expansion` says whether the
    /// request carried an expansion file.
    pub fn from_response(response: UploadRequestResponse, expect_expansion: bool) -> Result<Self> {
        if response.pending_upload_id.trim().is_empty() {
            return Err(Error::InvalidPlan("missing pending_upload_id".to_string()));
        }

        let primary = UploadPlan::from_info(response.primary_file)?;
        let expansion = match (expect_expansion, response.expansion_files.into_iter().next()) {
            (true, Some(info)) => Some(UploadPlan::from_info(info)?),
            (true, None) => {
                return Err(Error::InvalidPlan(
                    "expansion file requested but no plan returned".to_string(),
                ));
            }
            (false, _) => None,
        };

        Ok(Self {
            id: response.pending_upload_id,
            primary,
            expansion,
        })
    }
}
