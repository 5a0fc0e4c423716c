//! Shared test helpers: a scripted in-memory ContentApi and package builders.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use ferry_core::api::{ContentApi, ImportOutcome};
use ferry_core::types::{
    ContentPackage, ContentSummary, Guid, MetadataType, PackageRef, RunStatus, SearchFilter,
};

/// ContentApi whose responses are scripted per GUID.
///
/// Imports default to succeeding with the package's own GUID (an in-place
/// update); `map_import` and `fail_import` override that per object.
#[derive(Default)]
pub struct ScriptedApi {
    catalog: Vec<ContentSummary>,
    packages: BTreeMap<Guid, ContentPackage>,
    import_plan: BTreeMap<Guid, ImportOutcome>,
    export_failures: BTreeMap<Guid, String>,
    imports_seen: Mutex<Vec<ContentPackage>>,
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_package(mut self, package: ContentPackage) -> Self {
        self.catalog.push(ContentSummary {
            guid: package.guid.clone(),
            metadata_type: package.metadata_type.clone(),
            name: package.name.clone(),
            modified_at: package.modified_at,
            tags: Vec::new(),
        });
        self.packages.insert(package.guid.clone(), package);
        self
    }

    /// Script an import to succeed with a different target-side GUID.
    pub fn map_import(mut self, old: &str, new: &str) -> Self {
        self.import_plan.insert(
            Guid::from(old),
            ImportOutcome {
                guid: Guid::from(new),
                status: RunStatus::Ok,
                message: None,
            },
        );
        self
    }

    /// Script an import to come back as an ERROR outcome.
    pub fn fail_import(mut self, guid: &str, message: &str) -> Self {
        self.import_plan.insert(
            Guid::from(guid),
            ImportOutcome {
                guid: Guid::from(guid),
                status: RunStatus::Error,
                message: Some(message.to_string()),
            },
        );
        self
    }

    /// Script an import to succeed with a WARNING.
    pub fn warn_import(mut self, guid: &str, message: &str) -> Self {
        self.import_plan.insert(
            Guid::from(guid),
            ImportOutcome {
                guid: Guid::from(guid),
                status: RunStatus::Warning,
                message: Some(message.to_string()),
            },
        );
        self
    }

    /// Script an export to fail at the transport level.
    pub fn fail_export(mut self, guid: &str, message: &str) -> Self {
        self.export_failures
            .insert(Guid::from(guid), message.to_string());
        self
    }

    /// Packages submitted for import, in submission-completion order.
    pub fn imports_seen(&self) -> Vec<ContentPackage> {
        self.imports_seen
            .lock()
            .expect("imports_seen lock poisoned")
            .clone()
    }

    pub fn import_count(&self) -> usize {
        self.imports_seen
            .lock()
            .expect("imports_seen lock poisoned")
            .len()
    }
}

#[async_trait]
impl ContentApi for ScriptedApi {
    async fn search(&self, filter: &SearchFilter) -> anyhow::Result<Vec<ContentSummary>> {
        Ok(self
            .catalog
            .iter()
            .filter(|summary| {
                filter.metadata_types.is_empty()
                    || filter.metadata_types.contains(&summary.metadata_type)
            })
            .cloned()
            .collect())
    }

    async fn export_package(
        &self,
        guid: &Guid,
        _metadata_type: &MetadataType,
    ) -> anyhow::Result<ContentPackage> {
        if let Some(message) = self.export_failures.get(guid) {
            anyhow::bail!("{message}");
        }
        self.packages
            .get(guid)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no such object: {guid}"))
    }

    async fn import_package(&self, package: &ContentPackage) -> anyhow::Result<ImportOutcome> {
        self.imports_seen
            .lock()
            .expect("imports_seen lock poisoned")
            .push(package.clone());
        Ok(self
            .import_plan
            .get(&package.guid)
            .cloned()
            .unwrap_or_else(|| ImportOutcome {
                guid: package.guid.clone(),
                status: RunStatus::Ok,
                message: None,
            }))
    }

    async fn delete(&self, _guid: &Guid, _metadata_type: &MetadataType) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Package builder used across the integration tests.
pub fn package(guid: &str, metadata_type: &str, modified_at: DateTime<Utc>) -> ContentPackage {
    ContentPackage {
        guid: Guid::from(guid),
        metadata_type: MetadataType::new(metadata_type),
        name: format!("{guid} object"),
        modified_at,
        payload: serde_json::json!({ "guid": guid, "name": format!("{guid} object") }),
        references: Vec::new(),
    }
}

pub fn package_with_refs(
    guid: &str,
    metadata_type: &str,
    modified_at: DateTime<Utc>,
    refs: &[&str],
) -> ContentPackage {
    let mut pkg = package(guid, metadata_type, modified_at);
    pkg.payload = serde_json::json!({
        "guid": guid,
        "depends_on": refs,
    });
    pkg.references = refs.iter().map(|r| PackageRef::new(*r)).collect();
    pkg
}
