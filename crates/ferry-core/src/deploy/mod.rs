//! Deploy operation: rewrite checkpointed packages through the merged mapping
//! and submit them to a target environment under a deploy policy.

use serde::Serialize;

use crate::error::ValidationError;
use crate::mapping::MergeConflict;
use crate::types::{DeployPolicy, DeployType, Environment, Guid, MetadataType, RunStatus};

pub mod delta;
pub mod executor;
pub mod validate;

pub use delta::{DeltaSelection, select_packages};
pub use executor::Deployer;
pub use validate::{PreparedPackage, prepare_package};

pub const DEFAULT_IMPORT_CONCURRENCY: usize = 4;

/// Position in the per-invocation state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    Pending,
    Validating,
    Importing,
    Committed,
    Failed,
}

#[derive(Debug, Clone)]
pub struct DeployOptions {
    pub source: Environment,
    pub target: Environment,
    pub deploy_type: DeployType,
    pub policy: DeployPolicy,
    /// Metadata-type filter; empty selects every type.
    pub metadata_types: Vec<MetadataType>,
    /// Import order between types, supplied by the caller.
    pub type_order: Vec<MetadataType>,
    pub concurrency: usize,
    /// Actor string recorded in history.
    pub actor: String,
}

impl DeployOptions {
    pub fn new(source: Environment, target: Environment) -> Self {
        Self {
            source,
            target,
            deploy_type: DeployType::Delta,
            policy: DeployPolicy::Partial,
            metadata_types: Vec::new(),
            type_order: Vec::new(),
            concurrency: DEFAULT_IMPORT_CONCURRENCY,
            actor: format!("ferry/{} deploy", env!("CARGO_PKG_VERSION")),
        }
    }

    pub fn with_deploy_type(mut self, deploy_type: DeployType) -> Self {
        self.deploy_type = deploy_type;
        self
    }

    pub fn with_policy(mut self, policy: DeployPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_metadata_types(mut self, metadata_types: Vec<MetadataType>) -> Self {
        self.metadata_types = metadata_types;
        self
    }

    pub fn with_type_order(mut self, type_order: Vec<MetadataType>) -> Self {
        self.type_order = type_order;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = actor.into();
        self
    }
}

/// One successfully imported object.
#[derive(Debug, Clone, Serialize)]
pub struct ImportedObject {
    pub guid: Guid,
    pub target_guid: Guid,
    pub status: RunStatus,
}

/// One object the platform rejected or the transport lost.
#[derive(Debug, Clone, Serialize)]
pub struct PackageFailure {
    pub guid: Guid,
    pub message: String,
}

/// Final outcome of one deploy invocation.
#[derive(Debug, Serialize)]
pub struct DeployReport {
    pub state: RunState,
    pub status: RunStatus,
    pub deploy_type: DeployType,
    pub policy: DeployPolicy,
    /// Packages the selector picked for this run.
    pub selected: usize,
    /// Packages the delta baseline filtered out.
    pub skipped: usize,
    pub imported: Vec<ImportedObject>,
    pub failures: Vec<PackageFailure>,
    pub validation_errors: Vec<ValidationError>,
    pub conflicts: Vec<MergeConflict>,
    /// Set when the policy refused to commit the run's outcome.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy_error: Option<String>,
}

impl DeployReport {
    pub fn is_committed(&self) -> bool {
        self.state == RunState::Committed
    }

    /// Exit-code contract: WARNING still exits clean, ERROR does not.
    pub fn exit_ok(&self) -> bool {
        self.status != RunStatus::Error
    }
}
