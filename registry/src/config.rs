//! Registry configuration, usually read from TOML
//!
//! ```toml
//! bucket = "registry"
//! root = "docker/registry/v2"
//! scratch = "/var/tmp/registry"
//! chunk-size = 65536
//!
//! [storage]
//! local = { path = "/var/lib/registry" }
//! ```

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use storage::StorageConfig;

use crate::api::{Registry, RegistryBuilder};
use crate::blob::DEFAULT_CHUNK_SIZE;
use crate::error::RegistryResult;
use crate::layout::DEFAULT_ROOT;

/// Configuration problems.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// No storage backend was provided.
    #[error("storage backend must be configured")]
    MissingStorage,

    /// A value is out of range.
    #[error("{0}")]
    Invalid(String),

    /// The configuration file couldn't be read.
    #[error("reading {path}: {source}")]
    Read {
        /// The file.
        path: Utf8PathBuf,
        /// What went wrong.
        source: std::io::Error,
    },

    /// The configuration isn't valid TOML for [`RegistryConfig`].
    #[error("parsing configuration: {0}")]
    Parse(#[from] toml_edit::de::Error),
}

fn default_bucket() -> String {
    "registry".into()
}

fn default_root() -> Utf8PathBuf {
    DEFAULT_ROOT.into()
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

/// Everything needed to build a [`Registry`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RegistryConfig {
    /// The storage engine.
    pub storage: StorageConfig,

    /// Bucket holding the registry.
    #[serde(default = "default_bucket")]
    pub bucket: String,

    /// Key prefix of the registry inside the bucket.
    #[serde(default = "default_root")]
    pub root: Utf8PathBuf,

    /// Directory for upload scratch files.
    #[serde(default)]
    pub scratch: Option<Utf8PathBuf>,

    /// Chunk size used when consuming uploads.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

impl RegistryConfig {
    /// Parse a TOML document.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml_edit::de::from_str(text)?)
    }

    /// Read and parse a TOML file.
    pub async fn from_file(path: &Utf8Path) -> Result<Self, ConfigError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_owned(),
                source,
            })?;
        Self::from_toml(&text)
    }

    /// Construct the storage engine and the registry on top of it.
    #[tracing::instrument(skip(self), fields(bucket = %self.bucket))]
    pub async fn build(self) -> RegistryResult<Registry> {
        let storage = self.storage.build().await?;
        let mut builder = RegistryBuilder::new()
            .storage(storage)
            .bucket(self.bucket)
            .root(self.root)
            .chunk_size(self.chunk_size);
        if let Some(scratch) = self.scratch {
            builder = builder.scratch_dir(scratch);
        }
        builder.build()
    }
}
