//! Shared core types used across the mapping, checkpoint, and deploy layers.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque unique identifier for one piece of content in the remote platform.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Guid(String);

impl Guid {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Guid {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Guid {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Content type tag (TABLE, MODEL, LIVEBOARD, ...). Open set; compared
/// case-insensitively and stored uppercase.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct MetadataType(String);

impl MetadataType {
    pub fn new(value: impl AsRef<str>) -> Self {
        Self(value.as_ref().trim().to_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for MetadataType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(MetadataType::new(raw))
    }
}

impl fmt::Display for MetadataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MetadataType {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Name of one deployment target of the remote platform. Purely an identifier;
/// also used as the file stem for the environment's mapping file, hence the
/// restricted character set.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Environment(String);

impl Environment {
    pub fn new(name: impl Into<String>) -> anyhow::Result<Self> {
        let name = name.into();
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid {
            anyhow::bail!(
                "Invalid environment name '{}': only ASCII letters, digits, '.', '-' and '_' are allowed",
                name
            );
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Environment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// A reference from one package to another object it depends on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageRef {
    pub guid: Guid,

    /// Metadata type the reference expects, when the source system reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<MetadataType>,
}

impl PackageRef {
    pub fn new(guid: impl Into<Guid>) -> Self {
        Self {
            guid: guid.into(),
            kind: None,
        }
    }

    pub fn with_kind(mut self, kind: MetadataType) -> Self {
        self.kind = Some(kind);
        self
    }
}

/// One exported piece of content: envelope metadata plus the raw payload.
///
/// `guid` stays the source-side GUID for the package's whole lifetime; the
/// target-side GUID only ever lives in the mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentPackage {
    pub guid: Guid,
    pub metadata_type: MetadataType,
    pub name: String,
    pub modified_at: DateTime<Utc>,
    pub payload: serde_json::Value,
    #[serde(default)]
    pub references: Vec<PackageRef>,
}

/// Search hit returned by the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentSummary {
    pub guid: Guid,
    pub metadata_type: MetadataType,
    pub name: String,
    pub modified_at: DateTime<Utc>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Server-side content selection.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchFilter {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub metadata_types: Vec<MetadataType>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

/// Deploy-type selecting changed-since-last-success objects or all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeployType {
    Delta,
    Full,
}

impl DeployType {
    pub fn record_mode(self) -> RecordMode {
        match self {
            DeployType::Delta => RecordMode::Delta,
            DeployType::Full => RecordMode::Full,
        }
    }
}

impl fmt::Display for DeployType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeployType::Delta => f.write_str("DELTA"),
            DeployType::Full => f.write_str("FULL"),
        }
    }
}

/// Policy controlling whether failures in individual objects abort the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeployPolicy {
    ValidateOnly,
    Partial,
    AllOrNone,
}

impl fmt::Display for DeployPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeployPolicy::ValidateOnly => f.write_str("VALIDATE_ONLY"),
            DeployPolicy::Partial => f.write_str("PARTIAL"),
            DeployPolicy::AllOrNone => f.write_str("ALL_OR_NONE"),
        }
    }
}

/// Outcome level shared by history records, import responses, and run reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Ok,
    Warning,
    Error,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Ok => f.write_str("OK"),
            RunStatus::Warning => f.write_str("WARNING"),
            RunStatus::Error => f.write_str("ERROR"),
        }
    }
}

/// What kind of invocation a history record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordMode {
    Export,
    Delta,
    Full,
}

impl fmt::Display for RecordMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordMode::Export => f.write_str("EXPORT"),
            RecordMode::Delta => f.write_str("DELTA"),
            RecordMode::Full => f.write_str("FULL"),
        }
    }
}
