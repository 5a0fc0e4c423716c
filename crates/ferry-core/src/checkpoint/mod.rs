//! Checkpoint operation: export content from an environment and register its
//! GUIDs in that environment's mapping file.

use std::sync::Arc;

use anyhow::Context;
use serde::Serialize;
use tracing::{info, warn};

use crate::api::ContentApi;
use crate::mapping::{DeploymentRecord, MappingStore, RecordInfo};
use crate::packages::FsPackageStore;
use crate::types::{Environment, Guid, MetadataType, RecordMode, RunStatus, SearchFilter};

/// Selection for one checkpoint invocation.
#[derive(Debug, Clone)]
pub struct CheckpointOptions {
    pub environment: Environment,
    pub metadata_types: Vec<MetadataType>,
    pub tags: Vec<String>,
    /// Explicit GUIDs; when empty the selection comes from search alone.
    pub guids: Vec<Guid>,
    /// Actor string recorded in history, e.g. "ferry/0.1.0 checkpoint".
    pub actor: String,
}

impl CheckpointOptions {
    pub fn new(environment: Environment) -> Self {
        Self {
            environment,
            metadata_types: Vec::new(),
            tags: Vec::new(),
            guids: Vec::new(),
            actor: format!("ferry/{} checkpoint", env!("CARGO_PKG_VERSION")),
        }
    }

    pub fn with_metadata_types(mut self, metadata_types: Vec<MetadataType>) -> Self {
        self.metadata_types = metadata_types;
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_guids(mut self, guids: Vec<Guid>) -> Self {
        self.guids = guids;
        self
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = actor.into();
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportFailure {
    pub guid: Guid,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct CheckpointReport {
    pub status: RunStatus,
    /// Objects the selection matched.
    pub expected: usize,
    /// Packages actually written.
    pub exported: usize,
    /// GUIDs newly registered in the mapping file.
    pub registered: usize,
    pub failures: Vec<ExportFailure>,
}

impl CheckpointReport {
    pub fn exit_ok(&self) -> bool {
        self.status != RunStatus::Error
    }
}

pub struct Checkpointer<'a> {
    api: Arc<dyn ContentApi>,
    mapping_store: &'a dyn MappingStore,
    package_store: &'a FsPackageStore,
}

impl<'a> Checkpointer<'a> {
    pub fn new(
        api: Arc<dyn ContentApi>,
        mapping_store: &'a dyn MappingStore,
        package_store: &'a FsPackageStore,
    ) -> Self {
        Self {
            api,
            mapping_store,
            package_store,
        }
    }

    pub async fn run(&self, options: &CheckpointOptions) -> anyhow::Result<CheckpointReport> {
        // mapping state must be readable before anything is exported
        let mut file = self.mapping_store.load(&options.environment)?;

        let filter = SearchFilter {
            metadata_types: options.metadata_types.clone(),
            tags: options.tags.clone(),
            pattern: None,
        };
        let summaries = self
            .api
            .search(&filter)
            .await
            .context("Content search failed")?;

        let mut failures = Vec::new();
        let targets: Vec<(Guid, MetadataType)> = if options.guids.is_empty() {
            summaries
                .into_iter()
                .map(|s| (s.guid, s.metadata_type))
                .collect()
        } else {
            let mut targets = Vec::new();
            for guid in &options.guids {
                match summaries.iter().find(|s| &s.guid == guid) {
                    Some(summary) => {
                        targets.push((summary.guid.clone(), summary.metadata_type.clone()))
                    }
                    None => failures.push(ExportFailure {
                        guid: guid.clone(),
                        message: "not found in the source environment".to_string(),
                    }),
                }
            }
            targets
        };

        let expected = targets.len() + failures.len();
        info!(
            environment = %options.environment,
            expected,
            "checkpointing content"
        );

        let mut exported = 0usize;
        let mut registered = 0usize;
        for (guid, metadata_type) in &targets {
            match self.api.export_package(guid, metadata_type).await {
                Ok(package) => {
                    self.package_store.save(&options.environment, &package)?;
                    if file.register(package.guid.clone()) {
                        registered += 1;
                    }
                    exported += 1;
                }
                Err(err) => {
                    warn!(guid = %guid, error = %err, "export failed");
                    failures.push(ExportFailure {
                        guid: guid.clone(),
                        message: err.to_string(),
                    });
                }
            }
        }

        let status = if failures.is_empty() {
            RunStatus::Ok
        } else if exported > 0 {
            RunStatus::Warning
        } else {
            RunStatus::Error
        };

        let record = DeploymentRecord::new(options.actor.clone(), RecordMode::Export, status)
            .with_info(RecordInfo {
                files_expected: Some(expected as u64),
                files_exported: Some(exported as u64),
                objects_imported: None,
            });
        file.history.push(record);
        self.mapping_store.save(&options.environment, &file)?;

        Ok(CheckpointReport {
            status,
            expected,
            exported,
            registered,
            failures,
        })
    }
}
