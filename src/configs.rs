use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::storage::ArtifactStore;

pub const DEFAULT_CONFIG_PATH: &str = "cert-provisioner.toml";
pub const SUPPORTED_KEY_LENGTHS: [u32; 3] = [2048, 3072, 4096];

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub keys: KeyConfig,
    #[serde(default)]
    pub identity_defaults: IdentityDefaults,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    #[serde(default = "default_output_root")]
    pub root: PathBuf,
    #[serde(default = "default_chain_file_name")]
    pub chain_file_name: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            root: default_output_root(),
            chain_file_name: default_chain_file_name(),
        }
    }
}

fn default_output_root() -> PathBuf {
    PathBuf::from("output")
}

fn default_chain_file_name() -> String {
    "ca-chain.crt".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct KeyConfig {
    #[serde(default = "default_key_length")]
    pub length: u32,
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self {
            length: default_key_length(),
        }
    }
}

fn default_key_length() -> u32 {
    2048
}

/// Values offered as defaults when prompting for the subject identity.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct IdentityDefaults {
    pub country: Option<String>,
    pub state: Option<String>,
    pub locality: Option<String>,
    pub organization: Option<String>,
    pub organizational_unit: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

fn default_log_filter() -> String {
    "warn".to_string()
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config_str = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: AppConfig =
            toml::from_str(&config_str).context("Failed to parse config file")?;
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from `path`, or the default path when `None`.
    ///
    /// A missing default file yields the built-in defaults; an explicitly
    /// named file must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => Self::from_file(DEFAULT_CONFIG_PATH),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !SUPPORTED_KEY_LENGTHS.contains(&self.keys.length) {
            bail!(
                "Unsupported key length {} (expected one of {:?})",
                self.keys.length,
                SUPPORTED_KEY_LENGTHS
            );
        }
        if self.output.chain_file_name.trim().is_empty()
            || self.output.chain_file_name.contains(['/', '\\'])
        {
            bail!(
                "Invalid chain file name '{}': must be a plain file name",
                self.output.chain_file_name
            );
        }
        Ok(())
    }

    pub fn artifact_store(&self) -> ArtifactStore {
        ArtifactStore::new(&self.output.root, &self.output.chain_file_name)
    }
}
