//! Ferry Core Library
//!
//! Provides the domain logic for promoting content between environments of a
//! content-management platform: checkpointing packages out of a source
//! environment, maintaining durable GUID mappings per environment, and
//! deploying packages into a target under a deploy policy.

pub mod api;
pub mod checkpoint;
pub mod config;
pub mod deploy;
pub mod error;
pub mod mapping;
pub mod packages;
pub mod types;

/// Re-exports of commonly used types
pub mod prelude {
    // Core types
    pub use crate::types::{
        ContentPackage, ContentSummary, DeployPolicy, DeployType, Environment, Guid, MetadataType,
        PackageRef, RecordMode, RunStatus, SearchFilter,
    };

    // Mapping
    pub use crate::mapping::{
        DeploymentRecord, FsMappingStore, MappingFile, MappingStore, MemoryMappingStore,
        RecordInfo, WorkingMapping, merge_mappings,
    };

    // Operations
    pub use crate::checkpoint::{CheckpointOptions, CheckpointReport, Checkpointer};
    pub use crate::deploy::{DeployOptions, DeployReport, Deployer, RunState};

    // Collaborators
    pub use crate::api::{ContentApi, ImportOutcome, RestContentApi};
    pub use crate::packages::FsPackageStore;

    // Errors
    pub use crate::error::{CoreError, ValidationError};
}
