//! Registry facade and builder

use camino::Utf8PathBuf;

use crate::blob::{BlobStore, DEFAULT_CHUNK_SIZE};
use crate::config::ConfigError;
use crate::error::RegistryResult;
use crate::layout::{DEFAULT_ROOT, Layout};
use crate::name::RepositoryName;
use crate::repository::Repository;

/// Entry point to a registry's storage: the shared blob store, and a
/// [`Repository`] per name.
#[derive(Debug, Clone)]
pub struct Registry {
    storage: storage::StorageBucket,
    layout: Layout,
    blobs: BlobStore,
}

impl Registry {
    /// Start configuring a registry.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// The content-addressable blob store.
    pub fn blobs(&self) -> &BlobStore {
        &self.blobs
    }

    /// The key layout in use.
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// A resolver for the repository `name`.
    pub fn repository(&self, name: RepositoryName) -> Repository {
        Repository::new(
            name,
            self.storage.clone(),
            self.layout.clone(),
            self.blobs.clone(),
        )
    }
}

/// Registry builder for configuring and creating the registry storage core
#[derive(Debug)]
pub struct RegistryBuilder {
    storage: Option<storage::Storage>,
    bucket: Option<String>,
    root: Option<Utf8PathBuf>,
    scratch: Option<Utf8PathBuf>,
    chunk_size: Option<usize>,
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryBuilder {
    /// Create a new registry builder
    pub fn new() -> Self {
        Self {
            storage: None,
            bucket: None,
            root: None,
            scratch: None,
            chunk_size: None,
        }
    }

    /// Set the storage backend
    pub fn storage(mut self, storage: storage::Storage) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Set the bucket name for storage
    pub fn bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = Some(bucket.into());
        self
    }

    /// Set the key prefix inside the bucket, `docker/registry/v2` by default
    pub fn root(mut self, root: impl Into<Utf8PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    /// Set the directory for upload scratch files
    pub fn scratch_dir(mut self, dir: impl Into<Utf8PathBuf>) -> Self {
        self.scratch = Some(dir.into());
        self
    }

    /// Set the chunk size used when consuming uploads
    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = Some(chunk_size);
        self
    }

    /// Build the registry
    pub fn build(self) -> RegistryResult<Registry> {
        let storage = self.storage.ok_or(ConfigError::MissingStorage)?;
        let bucket = self.bucket.unwrap_or_else(|| "registry".to_string());
        let chunk_size = self.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE);
        if chunk_size == 0 {
            return Err(ConfigError::Invalid("chunk size must be positive".into()).into());
        }

        let layout = Layout::new(self.root.unwrap_or_else(|| DEFAULT_ROOT.into()));
        let storage = storage.bucket(bucket);

        let mut blobs = BlobStore::new(storage.clone(), layout.clone()).with_chunk_size(chunk_size);
        if let Some(scratch) = self.scratch {
            blobs = blobs.with_scratch_dir(scratch);
        }

        tracing::debug!(
            driver = storage.name(),
            bucket = %storage.bucket,
            root = %layout.root(),
            "Built registry"
        );

        Ok(Registry {
            storage,
            layout,
            blobs,
        })
    }
}
