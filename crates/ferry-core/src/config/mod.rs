//! Tool configuration (ferry.toml).
//!
//! Environments are independently-managed platform instances, so each one
//! carries its own endpoint. Tokens stay out of the file; the config only
//! names the environment variable to read them from.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::types::{Environment, MetadataType};

pub const DEFAULT_TOKEN_ENV: &str = "FERRY_TOKEN";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FerryConfig {
    #[serde(default)]
    pub platform: PlatformConfig,

    /// Environment name -> endpoint. Deploy targets must be listed here.
    #[serde(default)]
    pub environments: BTreeMap<String, EnvironmentConfig>,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub deploy: DeployDefaults,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// Environment variable holding the API token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            token_env: default_token_env(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    pub url: Url,

    /// Per-environment token variable, overriding `platform.token_env`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_env: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root for mapping files and checkpointed packages. Defaults to the
    /// platform state directory when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployDefaults {
    /// Import order between metadata types. The correct order is a
    /// platform-specific fact supplied here, never discovered by the engine.
    #[serde(default = "default_type_order")]
    pub type_order: Vec<String>,

    /// Parallel imports within one type batch.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for DeployDefaults {
    fn default() -> Self {
        Self {
            type_order: default_type_order(),
            concurrency: default_concurrency(),
        }
    }
}

fn default_token_env() -> String {
    DEFAULT_TOKEN_ENV.to_string()
}

fn default_type_order() -> Vec<String> {
    ["CONNECTION", "TABLE", "VIEW", "MODEL", "ANSWER", "LIVEBOARD"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_concurrency() -> usize {
    4
}

impl FerryConfig {
    pub fn environment(&self, name: &Environment) -> anyhow::Result<&EnvironmentConfig> {
        self.environments.get(name.as_str()).ok_or_else(|| {
            anyhow::anyhow!("Environment '{}' is not configured in ferry.toml", name)
        })
    }

    /// API token for an environment, read from the configured variable.
    pub fn token_for(&self, environment: &EnvironmentConfig) -> anyhow::Result<String> {
        let var = environment
            .token_env
            .as_deref()
            .unwrap_or(&self.platform.token_env);
        std::env::var(var).with_context(|| format!("API token variable {var} is not set"))
    }

    pub fn storage_root(&self) -> anyhow::Result<PathBuf> {
        match &self.storage.root {
            Some(root) => Ok(root.clone()),
            None => default_state_root(),
        }
    }

    pub fn type_order(&self) -> Vec<MetadataType> {
        self.deploy
            .type_order
            .iter()
            .map(MetadataType::new)
            .collect()
    }
}

/// Default state root for mapping files and packages.
///
/// - Unix: `$XDG_STATE_HOME/ferry` or `~/.local/state/ferry`
/// - Windows: `%LOCALAPPDATA%\ferry`
pub fn default_state_root() -> anyhow::Result<PathBuf> {
    let base = if cfg!(unix) {
        dirs::state_dir()
            .or_else(dirs::data_local_dir)
            .ok_or_else(|| anyhow::anyhow!("Cannot determine state directory"))?
    } else {
        dirs::data_local_dir()
            .ok_or_else(|| anyhow::anyhow!("Cannot determine local app data directory"))?
    };
    Ok(base.join("ferry"))
}

/// Loader for ferry.toml at an explicit or default location.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    config_path: PathBuf,
}

impl ConfigStore {
    pub fn from_default_location() -> anyhow::Result<Self> {
        let dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?
            .join("ferry");
        Ok(Self {
            config_path: dir.join("ferry.toml"),
        })
    }

    pub fn from_path(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn load(&self) -> anyhow::Result<FerryConfig> {
        if !self.config_path.exists() {
            anyhow::bail!(
                "No configuration found at {}; create a ferry.toml listing your environments",
                self.config_path.display()
            );
        }
        let raw = fs::read_to_string(&self.config_path).with_context(|| {
            format!("Failed to read config file: {}", self.config_path.display())
        })?;
        toml::from_str(&raw).with_context(|| {
            format!("Failed to parse config file: {}", self.config_path.display())
        })
    }

    pub fn save(&self, config: &FerryConfig) -> anyhow::Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        let content =
            toml::to_string_pretty(config).context("Failed to serialize config to TOML")?;
        fs::write(&self.config_path, content).with_context(|| {
            format!("Failed to write config file: {}", self.config_path.display())
        })?;
        Ok(())
    }
}
