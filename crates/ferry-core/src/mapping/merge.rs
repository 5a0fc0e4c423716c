//! Merge of source and target mapping files into one working mapping.
//!
//! The target environment's file is ground truth for "what GUID does this
//! object have there", so on disagreement the target value wins. That
//! tie-break keeps the merge deterministic: repeating it with the same target
//! never changes a previously agreed value.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::warn;

use crate::types::Guid;

use super::MappingFile;

/// Two files claiming different non-null targets for the same old GUID.
/// Resolved deterministically (target wins), reported for operator review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeConflict {
    pub guid: Guid,
    pub source_value: Guid,
    pub target_value: Guid,
}

/// How one GUID resolves through the working mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution<'a> {
    /// Forced by an operator override.
    Override(&'a Guid),
    /// Known target-side GUID.
    Mapped(&'a Guid),
    /// Seen, but the target side is not resolved yet.
    Pending,
    /// No entry anywhere.
    Unknown,
}

/// Read-only mapping for a single deploy run, produced by [`merge_mappings`].
///
/// Import outcomes are recorded here during the run; the result is written
/// back to the persistent files only after final per-object outcomes are in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkingMapping {
    mapping: BTreeMap<Guid, Option<Guid>>,
    overrides: BTreeMap<Guid, Guid>,
    conflicts: Vec<MergeConflict>,
}

/// Combine the source environment's view with the target environment's view.
///
/// - equal non-null values agree and are kept;
/// - different non-null values are a conflict, the target value wins;
/// - a value only the source knows carries through (including pending ones);
/// - target-only entries are preserved verbatim — they are manual additions or
///   objects created directly in the target and must not be clobbered.
///
/// Overrides from both files' `additional_mapping` are folded into a separate
/// table consulted before the computed mapping, target file winning on
/// override collisions.
pub fn merge_mappings(source: &MappingFile, target: &MappingFile) -> WorkingMapping {
    let mut mapping = BTreeMap::new();
    let mut conflicts = Vec::new();

    for (guid, source_value) in &source.mapping {
        let merged = match (source_value, target.mapping.get(guid)) {
            (Some(source_new), Some(Some(target_new))) if source_new != target_new => {
                warn!(
                    guid = %guid,
                    source = %source_new,
                    target = %target_new,
                    "mapping conflict, keeping the target environment's value"
                );
                conflicts.push(MergeConflict {
                    guid: guid.clone(),
                    source_value: source_new.clone(),
                    target_value: target_new.clone(),
                });
                Some(target_new.clone())
            }
            (_, Some(Some(target_new))) => Some(target_new.clone()),
            // target absent or itself pending: the source view carries
            (value, _) => value.clone(),
        };
        mapping.insert(guid.clone(), merged);
    }

    for (guid, target_value) in &target.mapping {
        if !mapping.contains_key(guid) {
            mapping.insert(guid.clone(), target_value.clone());
        }
    }

    let mut overrides = BTreeMap::new();
    for (guid, value) in source
        .additional_mapping
        .iter()
        .chain(target.additional_mapping.iter())
    {
        if let Some(value) = value {
            overrides.insert(guid.clone(), value.clone());
        }
    }

    WorkingMapping {
        mapping,
        overrides,
        conflicts,
    }
}

impl WorkingMapping {
    pub fn resolve(&self, guid: &Guid) -> Resolution<'_> {
        if let Some(value) = self.overrides.get(guid) {
            return Resolution::Override(value);
        }
        match self.mapping.get(guid) {
            Some(Some(value)) => Resolution::Mapped(value),
            Some(None) => Resolution::Pending,
            None => Resolution::Unknown,
        }
    }

    pub fn contains(&self, guid: &Guid) -> bool {
        self.overrides.contains_key(guid) || self.mapping.contains_key(guid)
    }

    /// Fill in the target-side GUID discovered from an import response.
    pub fn record_import(&mut self, old: &Guid, new: Guid) {
        self.mapping.insert(old.clone(), Some(new));
    }

    pub fn mapping(&self) -> &BTreeMap<Guid, Option<Guid>> {
        &self.mapping
    }

    pub fn conflicts(&self) -> &[MergeConflict] {
        &self.conflicts
    }

    /// Write the computed mapping into a persistent file. Overrides are the
    /// operator's and are never written back.
    pub fn apply_to(&self, file: &mut MappingFile) {
        for (guid, value) in &self.mapping {
            file.mapping.insert(guid.clone(), value.clone());
        }
    }
}
