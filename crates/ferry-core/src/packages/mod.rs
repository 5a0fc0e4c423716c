//! On-disk store of checkpointed packages.
//!
//! One package per GUID, addressable by GUID and type:
//! `<root>/<environment>/<TYPE>/<guid>.json`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::types::{ContentPackage, Environment, Guid, MetadataType};

#[derive(Debug, Clone)]
pub struct FsPackageStore {
    root: PathBuf,
}

impl FsPackageStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn package_path(
        &self,
        environment: &Environment,
        metadata_type: &MetadataType,
        guid: &Guid,
    ) -> PathBuf {
        self.root
            .join(environment.as_str())
            .join(metadata_type.as_str())
            .join(format!("{}.json", guid))
    }

    pub fn save(&self, environment: &Environment, package: &ContentPackage) -> anyhow::Result<()> {
        let path = self.package_path(environment, &package.metadata_type, &package.guid);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create package directory: {}", parent.display())
            })?;
        }
        let bytes = serde_json::to_vec_pretty(package)
            .with_context(|| format!("Failed to serialize package {}", package.guid))?;
        fs::write(&path, bytes)
            .with_context(|| format!("Failed to write package file: {}", path.display()))?;
        Ok(())
    }

    pub fn load(
        &self,
        environment: &Environment,
        metadata_type: &MetadataType,
        guid: &Guid,
    ) -> anyhow::Result<ContentPackage> {
        let path = self.package_path(environment, metadata_type, guid);
        let bytes = fs::read(&path)
            .with_context(|| format!("Failed to read package file: {}", path.display()))?;
        serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse package file: {}", path.display()))
    }

    /// Every checkpointed package for an environment, ordered by type then
    /// GUID so repeated runs see the set in the same order.
    pub fn list(&self, environment: &Environment) -> anyhow::Result<Vec<ContentPackage>> {
        let env_dir = self.root.join(environment.as_str());
        if !env_dir.exists() {
            return Ok(Vec::new());
        }

        let mut packages = Vec::new();
        for type_entry in fs::read_dir(&env_dir)
            .with_context(|| format!("Failed to read package directory: {}", env_dir.display()))?
        {
            let type_dir = type_entry?.path();
            if !type_dir.is_dir() {
                continue;
            }
            for file_entry in fs::read_dir(&type_dir).with_context(|| {
                format!("Failed to read package directory: {}", type_dir.display())
            })? {
                let path = file_entry?.path();
                if path.extension().map(|ext| ext != "json").unwrap_or(true) {
                    continue;
                }
                let bytes = fs::read(&path)
                    .with_context(|| format!("Failed to read package file: {}", path.display()))?;
                let package: ContentPackage = serde_json::from_slice(&bytes)
                    .with_context(|| format!("Failed to parse package file: {}", path.display()))?;
                packages.push(package);
            }
        }

        packages.sort_by(|a, b| {
            (&a.metadata_type, &a.guid).cmp(&(&b.metadata_type, &b.guid))
        });
        Ok(packages)
    }
}
