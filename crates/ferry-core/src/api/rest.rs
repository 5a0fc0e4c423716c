//! REST client for the platform's metadata endpoints.

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use url::Url;

use crate::error::CoreError;
use crate::types::{ContentPackage, ContentSummary, Guid, MetadataType, SearchFilter};

use super::{ContentApi, ImportOutcome};

/// Bearer-token session against one platform instance.
pub struct RestContentApi {
    client: Client,
    base_url: Url,
    token: String,
}

impl RestContentApi {
    pub fn new(base_url: Url, token: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url,
            token: token.into(),
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> anyhow::Result<Url> {
        self.base_url
            .join(path)
            .with_context(|| format!("Invalid endpoint path: {path}"))
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> anyhow::Result<T>
    where
        B: Serialize + Sync + ?Sized,
        T: serde::de::DeserializeOwned,
    {
        let url = self.endpoint(path)?;
        let response = self
            .client
            .post(url.clone())
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await
            .with_context(|| format!("Request to {url} failed"))?;

        if !response.status().is_success() {
            anyhow::bail!("Platform returned HTTP {} for {}", response.status(), url);
        }

        response
            .json::<T>()
            .await
            .with_context(|| format!("Failed to decode response from {url}"))
    }
}

#[derive(Serialize)]
struct ObjectRequest<'a> {
    guid: &'a Guid,
    metadata_type: &'a MetadataType,
}

#[async_trait]
impl ContentApi for RestContentApi {
    async fn search(&self, filter: &SearchFilter) -> anyhow::Result<Vec<ContentSummary>> {
        self.post("api/v2/metadata/search", filter).await
    }

    async fn export_package(
        &self,
        guid: &Guid,
        metadata_type: &MetadataType,
    ) -> anyhow::Result<ContentPackage> {
        self.post(
            "api/v2/metadata/export",
            &ObjectRequest {
                guid,
                metadata_type,
            },
        )
        .await
    }

    async fn import_package(&self, package: &ContentPackage) -> anyhow::Result<ImportOutcome> {
        let url = self.endpoint("api/v2/metadata/import")?;
        let response = self
            .client
            .post(url.clone())
            .bearer_auth(&self.token)
            .json(package)
            .send()
            .await
            .with_context(|| format!("Request to {url} failed"))?;

        if !response.status().is_success() {
            return Err(CoreError::ImportError {
                guid: package.guid.clone(),
                metadata_type: package.metadata_type.clone(),
                message: format!("platform returned HTTP {}", response.status()),
            }
            .into());
        }

        response
            .json::<ImportOutcome>()
            .await
            .with_context(|| format!("Failed to decode response from {url}"))
    }

    async fn delete(&self, guid: &Guid, metadata_type: &MetadataType) -> anyhow::Result<()> {
        let url = self.endpoint("api/v2/metadata/delete")?;
        let response = self
            .client
            .post(url.clone())
            .bearer_auth(&self.token)
            .json(&ObjectRequest {
                guid,
                metadata_type,
            })
            .send()
            .await
            .with_context(|| format!("Request to {url} failed"))?;

        if !response.status().is_success() {
            anyhow::bail!("Platform returned HTTP {} for {}", response.status(), url);
        }
        Ok(())
    }
}
