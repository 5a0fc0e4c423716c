//! Remote platform surface consumed by the checkpoint and deploy layers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::{ContentPackage, ContentSummary, Guid, MetadataType, RunStatus, SearchFilter};

pub mod rest;

pub use rest::RestContentApi;

/// Result of submitting one package for import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportOutcome {
    /// Target-side GUID of the object the import created or updated.
    pub guid: Guid,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Stateless export/import calls keyed by GUID.
///
/// Timeouts and retries live behind this trait, not in the promotion core.
#[async_trait]
pub trait ContentApi: Send + Sync {
    async fn search(&self, filter: &SearchFilter) -> anyhow::Result<Vec<ContentSummary>>;

    async fn export_package(
        &self,
        guid: &Guid,
        metadata_type: &MetadataType,
    ) -> anyhow::Result<ContentPackage>;

    async fn import_package(&self, package: &ContentPackage) -> anyhow::Result<ImportOutcome>;

    async fn delete(&self, guid: &Guid, metadata_type: &MetadataType) -> anyhow::Result<()>;
}
