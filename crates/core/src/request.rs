//! Upload request model and the `POST /uploads` payload.

use crate::error::{Error, Result};
use crate::vcs::{VcProvenance, is_blank};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Shape of the artifact being published.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Structure {
    /// A single primary file.
    #[default]
    #[serde(rename = "file")]
    File,
    /// A primary file plus one expansion file.
    #[serde(rename = "file+expansion")]
    FileExpansion,
}

impl Structure {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::FileExpansion => "file+expansion",
        }
    }

    pub fn requires_expansion(&self) -> bool {
        matches!(self, Self::FileExpansion)
    }
}

impl fmt::Display for Structure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Structure {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "" | "file" => Ok(Self::File),
            "file+expansion" => Ok(Self::FileExpansion),
            other => Err(Error::InvalidStructure(other.to_string())),
        }
    }
}

/// Name and size of a file taking part in an upload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub filename: String,
    #[serde(rename = "size_bytes")]
    pub size: u64,
}

impl FileDescriptor {
    /// Create a descriptor. The name must be a bare file name.
    pub fn new(filename: impl Into<String>, size: u64) -> Result<Self> {
        let filename = filename.into();
        if filename.trim().is_empty() {
            return Err(Error::InvalidFileName("file name is empty".to_string()));
        }
        if filename.contains(['/', '\\']) || filename == "." || filename == ".." {
            return Err(Error::InvalidFileName(format!(
                "{filename} is not a bare file name"
            )));
        }
        Ok(Self { filename, size })
    }
}

/// Version tuple. Major, minor and patch are required.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    #[serde(rename = "version_component_1_major")]
    pub major: String,
    #[serde(rename = "version_component_2_minor")]
    pub minor: String,
    #[serde(rename = "version_component_3_patch")]
    pub patch: String,
    #[serde(
        rename = "version_component_extra",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub extra: Option<String>,
    #[serde(
        rename = "version_component_meta",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub meta: Option<String>,
}

impl Version {
    pub fn new(
        major: impl Into<String>,
        minor: impl Into<String>,
        patch: impl Into<String>,
    ) -> Self {
        Self {
            major: major.into(),
            minor: minor.into(),
            patch: patch.into(),
            extra: None,
            meta: None,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(extra) = self.extra.as_deref().filter(|e| !e.is_empty()) {
            write!(f, "-{extra}")?;
        }
        if let Some(meta) = self.meta.as_deref().filter(|m| !m.is_empty()) {
            write!(f, "+{meta}")?;
        }
        Ok(())
    }
}

/// CI run that produced the artifact.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CiProvenance {
    #[serde(rename = "ci_pipeline", default, skip_serializing_if = "Option::is_none")]
    pub pipeline: Option<String>,
    #[serde(rename = "ci_run_id", default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(rename = "ci_run_url", default, skip_serializing_if = "Option::is_none")]
    pub run_url: Option<String>,
    #[serde(rename = "ci_pipeline_url", default, skip_serializing_if = "Option::is_none")]
    pub pipeline_url: Option<String>,
    /// Formatted `HH:MM:SS`.
    #[serde(rename = "ci_build_duration", default, skip_serializing_if = "Option::is_none")]
    pub build_duration: Option<String>,
    /// Integration tag. Always sent, even when blank.
    #[serde(default)]
    pub source: String,
}

/// Everything the registry needs to know about one publication.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UploadRequest {
    pub structure: Structure,
    pub primary_file: Option<FileDescriptor>,
    pub expansion_file: Option<FileDescriptor>,
    pub version: Version,
    pub custom_build_number: Option<String>,
    pub labels: Vec<String>,
    pub architectures: Vec<String>,
    pub platform: String,
    pub stream: String,
    pub notes: Option<String>,
    pub ci: CiProvenance,
    pub vc: VcProvenance,
}

impl UploadRequest {
    /// Check the invariants that must hold before any network call.
    pub fn validate(&self) -> Result<()> {
        let primary = self
            .primary_file
            .as_ref()
            .ok_or(Error::MissingField("primary file"))?;
        if primary.filename.trim().is_empty() {
            return Err(Error::MissingField("primary file name"));
        }
        if self.structure.requires_expansion()
            && self
                .expansion_file
                .as_ref()
                .is_none_or(|f| f.filename.trim().is_empty())
        {
            return Err(Error::MissingExpansionFile);
        }

        let required = [
            (self.version.major.as_str(), "major version component"),
            (self.version.minor.as_str(), "minor version component"),
            (self.version.patch.as_str(), "patch version component"),
            (self.platform.as_str(), "platform"),
            (self.stream.as_str(), "stream"),
        ];
        for (value, field) in required {
            if is_blank(Some(value)) {
                return Err(Error::MissingField(field));
            }
        }
        Ok(())
    }

    /// Replace the VC provenance, returning the updated request.
    pub fn with_vc(mut self, vc: VcProvenance) -> Self {
        self.vc = vc;
        self
    }

    /// Build the `POST /uploads` body. Validates first.
    pub fn payload(&self) -> Result<UploadPayload<'_>> {
        self.validate()?;
        let primary_file = self
            .primary_file
            .as_ref()
            .ok_or(Error::MissingField("primary file"))?;

        let expansion_files = match (self.structure, self.expansion_file.as_ref()) {
            (Structure::FileExpansion, Some(expansion)) => vec![expansion],
            _ => Vec::new(),
        };

        Ok(UploadPayload {
            structure: self.structure,
            primary_file,
            expansion_files,
            version: &self.version,
            custom_build_number: non_blank(self.custom_build_number.as_deref()),
            labels: &self.labels,
            architectures: &self.architectures,
            ci: &self.ci,
            vc: &self.vc,
            platform: &self.platform,
            stream: &self.stream,
            notes: non_blank(self.notes.as_deref()),
        })
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Serialized form of an [`UploadRequest`].
#[derive(Debug, Serialize)]
pub struct UploadPayload<'a> {
    pub structure: Structure,
    pub primary_file: &'a FileDescriptor,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub expansion_files: Vec<&'a FileDescriptor>,
    #[serde(flatten)]
    pub version: &'a Version,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_build_number: Option<&'a str>,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    pub labels: &'a [String],
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    pub architectures: &'a [String],
    #[serde(flatten)]
    pub ci: &'a CiProvenance,
    #[serde(flatten)]
    pub vc: &'a VcProvenance,
    pub platform: &'a str,
    pub stream: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<&'a str>,
}

impl UploadPayload<'_> {
    pub fn to_json(&self) -> Result<serde_json::Value> {
        serde_json::to_value(self).map_err(|e| Error::Serialization(e.to_string()))
    }
}

/// Split newline-separated text (`\n` or `\r\n`) into trimmed, non-empty
/// entries.
pub fn parse_list(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
