//! Durable GUID mapping state for one environment.
//!
//! A `MappingFile` records every GUID ever checkpointed from an environment,
//! what each one maps to on the other side (if known yet), an operator-editable
//! override table, and an append-only deployment history.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Environment, Guid, RecordMode, RunStatus};

pub mod merge;
pub mod store;

pub use merge::{MergeConflict, Resolution, WorkingMapping, merge_mappings};
pub use store::{FsMappingStore, MappingStore, MemoryMappingStore};

/// Current on-disk schema version. Files carrying any other version are
/// rejected as corrupt rather than silently misread.
pub const MAPPING_SCHEMA_VERSION: u32 = 1;

/// Versioned mapping state for one environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingFile {
    /// Mapping file format version.
    pub schema_version: u32,

    pub metadata: MappingMetadata,

    /// Old GUID -> new GUID, or null while the target side is unknown.
    /// A given old GUID appears at most once.
    #[serde(default)]
    pub mapping: BTreeMap<Guid, Option<Guid>>,

    /// Operator overrides, consulted before `mapping`.
    #[serde(default)]
    pub additional_mapping: BTreeMap<Guid, Option<Guid>>,

    /// Append-only; existing records are never mutated or deleted.
    #[serde(default)]
    pub history: Vec<DeploymentRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingMetadata {
    /// Environment this file was produced from.
    pub extract_environment: String,
}

impl MappingFile {
    /// Create an empty, well-formed file for an environment.
    pub fn new(environment: &Environment) -> Self {
        Self {
            schema_version: MAPPING_SCHEMA_VERSION,
            metadata: MappingMetadata {
                extract_environment: environment.to_string(),
            },
            mapping: BTreeMap::new(),
            additional_mapping: BTreeMap::new(),
            history: Vec::new(),
        }
    }

    /// Validate the persisted structure.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.schema_version != MAPPING_SCHEMA_VERSION {
            anyhow::bail!("unsupported schema version {}", self.schema_version);
        }
        if self.metadata.extract_environment.is_empty() {
            anyhow::bail!("missing metadata.extract_environment");
        }
        Ok(())
    }

    /// Register a GUID seen during checkpoint as a pending entry. Existing
    /// entries, resolved or pending, are left untouched. Returns `true` when
    /// the GUID was new.
    pub fn register(&mut self, guid: Guid) -> bool {
        use std::collections::btree_map::Entry;
        match self.mapping.entry(guid) {
            Entry::Vacant(entry) => {
                entry.insert(None);
                true
            }
            Entry::Occupied(_) => false,
        }
    }
}

/// One line of deployment history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    /// Actor string, e.g. "ferry/0.1.0 deploy".
    pub by: String,
    pub at: DateTime<Utc>,
    pub mode: RecordMode,
    pub status: RunStatus,
    #[serde(default)]
    pub info: RecordInfo,
}

impl DeploymentRecord {
    pub fn new(by: impl Into<String>, mode: RecordMode, status: RunStatus) -> Self {
        Self {
            by: by.into(),
            at: Utc::now(),
            mode,
            status,
            info: RecordInfo::default(),
        }
    }

    pub fn with_info(mut self, info: RecordInfo) -> Self {
        self.info = info;
        self
    }
}

/// Counts attached to a history record; keys are omitted when not relevant to
/// the record's mode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files_expected: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files_exported: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objects_imported: Option<u64>,
}
