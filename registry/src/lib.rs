//! # Container registry storage
//!
//! The storage core of a container image registry: content-addressable
//! blobs, and per-repository manifest resolution through link files, laid
//! out the same way as a docker distribution registry so existing data can
//! be served as-is.
//!
//! Any [`storage::Driver`] can back the registry. Uploads are hashed while
//! they stream through a scratch file, and only published once the whole
//! stream has been read.
//!
//! ## Example
//!
//! ```no_run
//! use registry::{Reference, Registry, RepositoryName};
//! use storage::MemoryStorage;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let storage = MemoryStorage::with_buckets(&["registry"]);
//! let registry = Registry::builder()
//!     .storage(storage.into())
//!     .bucket("registry")
//!     .build()?;
//!
//! let config = registry.blobs().put_bytes(br#"{"architecture":"amd64"}"#).await?;
//! println!("stored {config}");
//!
//! let repo = registry.repository(RepositoryName::new("library/alpine")?);
//! let manifest = repo.manifest(&"latest".parse::<Reference>()?).await?;
//! println!("{} is {}", manifest.digest(), manifest.media_type());
//! # Ok(())
//! # }
//! ```

mod api;
mod blob;
mod config;
mod digest;
mod error;
pub mod layout;
mod manifest;
mod name;
mod reference;
mod repository;
mod scratch;

pub use api::{Registry, RegistryBuilder};
pub use blob::{BlobReader, BlobStore, DEFAULT_CHUNK_SIZE};
pub use config::{ConfigError, RegistryConfig};
pub use digest::{Algorithm, Digest, DigestHasher, MalformedLink, UnsupportedAlgorithm};
pub use error::{RegistryError, RegistryResult};
pub use layout::Layout;
pub use manifest::{
    DOCKER_MANIFEST_LIST, DOCKER_MANIFEST_V1, DOCKER_MANIFEST_V2, Manifest, OCI_MANIFEST,
};
pub use name::{NameError, RepositoryName, Tag, TagError};
pub use reference::{Reference, ReferenceError};
pub use repository::Repository;
