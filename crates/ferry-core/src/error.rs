//! Typed error taxonomy for the promotion core.
//!
//! Fatal conditions (`CorruptMappingFile`) abort an invocation before any API
//! call; per-package conditions (`ValidationError`, import failures) are
//! collected into run reports instead of being thrown.

use serde::Serialize;
use thiserror::Error;

use crate::types::{DeployPolicy, Guid, MetadataType};

#[derive(Debug, Error)]
pub enum CoreError {
    /// Persisted mapping state does not match the expected schema. Never
    /// repaired in place; the operator has to inspect the file.
    #[error("corrupt mapping file for environment '{environment}': {reason}")]
    CorruptMappingFile { environment: String, reason: String },

    /// The platform rejected an import request outright.
    #[error("import of {guid} ({metadata_type}) failed: {message}")]
    ImportError {
        guid: Guid,
        metadata_type: MetadataType,
        message: String,
    },

    /// The chosen policy forbids committing the run's partial outcome.
    #[error("deploy policy {policy} violated: {failed} of {selected} packages failed")]
    PolicyViolation {
        policy: DeployPolicy,
        failed: usize,
        selected: usize,
    },
}

/// A per-package validation failure found while rewriting references.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum ValidationError {
    #[error("{package}: reference {reference} cannot be resolved in the target environment")]
    UnresolvedReference { package: Guid, reference: Guid },

    #[error("{package}: reference {reference} expects {expected} but resolves to a {actual}")]
    ReferenceTypeMismatch {
        package: Guid,
        reference: Guid,
        expected: MetadataType,
        actual: MetadataType,
    },
}

impl ValidationError {
    /// GUID of the package the error is attached to.
    pub fn package(&self) -> &Guid {
        match self {
            ValidationError::UnresolvedReference { package, .. } => package,
            ValidationError::ReferenceTypeMismatch { package, .. } => package,
        }
    }
}
