//! Mapping file persistence.
//!
//! One JSON mapping file per environment, kept under a storage root rather
//! than the working directory, so every caller names the environment it is
//! operating on and tests can point the store at a scratch location or swap in
//! the in-memory backend.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;

use crate::error::CoreError;
use crate::types::Environment;

use super::{DeploymentRecord, MappingFile};

/// Durable store of one `MappingFile` per environment.
///
/// Loading an environment that has never been saved yields an empty,
/// well-formed file; "not found" is not an error. Any IO or schema failure is
/// fatal to the invocation and must never be swallowed, since a partially-read
/// mapping risks duplicating content on the next deploy.
pub trait MappingStore {
    fn load(&self, environment: &Environment) -> anyhow::Result<MappingFile>;

    fn save(&self, environment: &Environment, file: &MappingFile) -> anyhow::Result<()>;

    /// Load/mutate/save convenience that preserves the append-only history.
    fn append_history(
        &self,
        environment: &Environment,
        record: DeploymentRecord,
    ) -> anyhow::Result<()> {
        let mut file = self.load(environment)?;
        file.history.push(record);
        self.save(environment, &file)
    }
}

/// Filesystem-backed store: `<root>/<environment>.mapping.json`.
#[derive(Debug, Clone)]
pub struct FsMappingStore {
    root: PathBuf,
}

impl FsMappingStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Default mapping root in the platform state directory.
    ///
    /// - Unix: `$XDG_STATE_HOME/ferry/mappings` or `~/.local/state/ferry/mappings`
    /// - Windows: `%LOCALAPPDATA%\ferry\mappings`
    pub fn default_root() -> anyhow::Result<PathBuf> {
        let base = if cfg!(unix) {
            dirs::state_dir()
                .or_else(dirs::data_local_dir)
                .ok_or_else(|| anyhow::anyhow!("Cannot determine state directory"))?
        } else {
            dirs::data_local_dir()
                .ok_or_else(|| anyhow::anyhow!("Cannot determine local app data directory"))?
        };
        Ok(base.join("ferry").join("mappings"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, environment: &Environment) -> PathBuf {
        self.root.join(format!("{}.mapping.json", environment))
    }
}

impl MappingStore for FsMappingStore {
    fn load(&self, environment: &Environment) -> anyhow::Result<MappingFile> {
        let path = self.path_for(environment);
        if !path.exists() {
            return Ok(MappingFile::new(environment));
        }

        let bytes = fs::read(&path)
            .with_context(|| format!("Failed to read mapping file: {}", path.display()))?;
        let file: MappingFile = serde_json::from_slice(&bytes).map_err(|err| {
            CoreError::CorruptMappingFile {
                environment: environment.to_string(),
                reason: err.to_string(),
            }
        })?;
        file.validate().map_err(|err| CoreError::CorruptMappingFile {
            environment: environment.to_string(),
            reason: err.to_string(),
        })?;
        Ok(file)
    }

    /// Save atomically (tmp + rename) so a reader never observes a
    /// half-written file.
    fn save(&self, environment: &Environment, file: &MappingFile) -> anyhow::Result<()> {
        fs::create_dir_all(&self.root).with_context(|| {
            format!("Failed to create mapping directory: {}", self.root.display())
        })?;

        let path = self.path_for(environment);
        let tmp_path = self.root.join(format!(
            "{}.mapping.json.tmp.{}",
            environment,
            std::process::id()
        ));

        // Serialize first so nothing touches disk on encoding failures
        let bytes = serde_json::to_vec_pretty(file).context("Failed to serialize mapping file")?;

        fs::write(&tmp_path, bytes)
            .with_context(|| format!("Failed to write tmp mapping file: {}", tmp_path.display()))?;

        // Atomic rename (remove target first on Windows for replace semantics)
        if path.exists() {
            fs::remove_file(&path).with_context(|| {
                format!("Failed to remove existing mapping file: {}", path.display())
            })?;
        }
        fs::rename(&tmp_path, &path)
            .with_context(|| format!("Failed to rename tmp mapping file: {}", tmp_path.display()))?;

        Ok(())
    }
}

/// In-memory store backing tests and embedded callers.
#[derive(Debug, Default)]
pub struct MemoryMappingStore {
    entries: Mutex<BTreeMap<String, MappingFile>>,
}

impl MemoryMappingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MappingStore for MemoryMappingStore {
    fn load(&self, environment: &Environment) -> anyhow::Result<MappingFile> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("mapping store lock poisoned"))?;
        Ok(entries
            .get(environment.as_str())
            .cloned()
            .unwrap_or_else(|| MappingFile::new(environment)))
    }

    fn save(&self, environment: &Environment, file: &MappingFile) -> anyhow::Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("mapping store lock poisoned"))?;
        entries.insert(environment.to_string(), file.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Guid, RecordMode, RunStatus};
    use tempfile::TempDir;

    fn env(name: &str) -> Environment {
        Environment::new(name).unwrap()
    }

    #[test]
    fn test_load_creates_empty_file() {
        let tmp = TempDir::new().expect("tempdir should succeed");
        let store = FsMappingStore::new(tmp.path().join("mappings"));

        let file = store.load(&env("dev")).expect("load should succeed");

        assert_eq!(file.metadata.extract_environment, "dev");
        assert!(file.mapping.is_empty());
        assert!(file.history.is_empty());
    }

    #[test]
    fn test_save_and_load_persist_data() {
        let tmp = TempDir::new().expect("tempdir should succeed");
        let store = FsMappingStore::new(tmp.path().join("mappings"));

        let mut file = store.load(&env("dev")).expect("load should succeed");
        file.mapping.insert(Guid::from("g1"), Some(Guid::from("t1")));
        file.mapping.insert(Guid::from("g2"), None);
        store.save(&env("dev"), &file).expect("save should succeed");

        let loaded = store.load(&env("dev")).expect("load should succeed");
        assert_eq!(loaded, file);
    }

    #[test]
    fn test_save_leaves_no_tmp_file() {
        let tmp = TempDir::new().expect("tempdir should succeed");
        let root = tmp.path().join("mappings");
        let store = FsMappingStore::new(root.clone());

        let file = MappingFile::new(&env("dev"));
        for _ in 0..3 {
            store.save(&env("dev"), &file).expect("save should succeed");
        }

        let leftovers: Vec<_> = fs::read_dir(&root)
            .expect("read_dir should succeed")
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().map(|ext| ext != "json").unwrap_or(true))
            .collect();
        assert!(leftovers.is_empty(), "tmp file should be renamed away");
        assert!(root.join("dev.mapping.json").exists());
    }

    #[test]
    fn test_load_rejects_unparseable_file() {
        let tmp = TempDir::new().expect("tempdir should succeed");
        let root = tmp.path().join("mappings");
        fs::create_dir_all(&root).expect("create_dir_all should succeed");
        fs::write(root.join("dev.mapping.json"), b"{ not json").expect("write should succeed");

        let store = FsMappingStore::new(root);
        let err = store.load(&env("dev")).expect_err("load should fail");
        assert!(err.to_string().contains("corrupt mapping file"));
    }

    #[test]
    fn test_load_rejects_unknown_schema_version() {
        let tmp = TempDir::new().expect("tempdir should succeed");
        let root = tmp.path().join("mappings");
        fs::create_dir_all(&root).expect("create_dir_all should succeed");
        fs::write(
            root.join("dev.mapping.json"),
            br#"{"schema_version": 42, "metadata": {"extract_environment": "dev"}}"#,
        )
        .expect("write should succeed");

        let store = FsMappingStore::new(root);
        let err = store.load(&env("dev")).expect_err("load should fail");
        assert!(err.to_string().contains("schema version"));
    }

    #[test]
    fn test_append_history_is_append_only() {
        let tmp = TempDir::new().expect("tempdir should succeed");
        let store = FsMappingStore::new(tmp.path().join("mappings"));

        store
            .append_history(
                &env("dev"),
                DeploymentRecord::new("ferry/test", RecordMode::Export, RunStatus::Ok),
            )
            .expect("append should succeed");
        store
            .append_history(
                &env("dev"),
                DeploymentRecord::new("ferry/test", RecordMode::Delta, RunStatus::Warning),
            )
            .expect("append should succeed");

        let file = store.load(&env("dev")).expect("load should succeed");
        assert_eq!(file.history.len(), 2);
        assert_eq!(file.history[0].mode, RecordMode::Export);
        assert_eq!(file.history[1].mode, RecordMode::Delta);
        assert_eq!(file.history[1].status, RunStatus::Warning);
    }

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemoryMappingStore::new();

        let mut file = store.load(&env("dev")).expect("load should succeed");
        file.mapping.insert(Guid::from("g1"), None);
        store.save(&env("dev"), &file).expect("save should succeed");

        let loaded = store.load(&env("dev")).expect("load should succeed");
        assert_eq!(loaded.mapping.len(), 1);
        // other environments stay independent
        let other = store.load(&env("prod")).expect("load should succeed");
        assert!(other.mapping.is_empty());
    }
}
