//! Resolve references within a repository to manifests

use camino::Utf8Path;
use serde::de::IgnoredAny;
use storage::{StorageBucket, StorageError};
use tokio::io::AsyncReadExt;

use crate::blob::BlobStore;
use crate::digest::{Digest, MalformedLink};
use crate::error::{RegistryError, RegistryResult};
use crate::layout::Layout;
use crate::manifest::Manifest;
use crate::name::{RepositoryName, Tag};
use crate::reference::Reference;

/// A single image repository.
///
/// Holds no data of its own: every call reads link files and blobs from the
/// backing store, so a `Repository` is cheap to create and to clone.
#[derive(Debug, Clone)]
pub struct Repository {
    name: RepositoryName,
    storage: StorageBucket,
    layout: Layout,
    blobs: BlobStore,
}

impl Repository {
    pub(crate) fn new(
        name: RepositoryName,
        storage: StorageBucket,
        layout: Layout,
        blobs: BlobStore,
    ) -> Self {
        Self {
            name,
            storage,
            layout,
            blobs,
        }
    }

    /// The repository name.
    pub fn name(&self) -> &RepositoryName {
        &self.name
    }

    fn manifest_not_found(&self, reference: &Reference) -> RegistryError {
        RegistryError::ManifestNotFound {
            name: self.name.clone(),
            reference: reference.clone(),
        }
    }

    /// Resolve `reference` to the manifest its link file points at.
    ///
    /// A missing link file, or a link to a missing blob, is reported as
    /// [`RegistryError::ManifestNotFound`].
    #[tracing::instrument(skip(self), fields(repository = %self.name, %reference))]
    pub async fn manifest(&self, reference: &Reference) -> RegistryResult<Manifest> {
        let link = self.layout.link(&self.name, reference);
        let digest = match self.read_link(&link).await {
            Err(RegistryError::Storage(err)) if err.is_not_found() => {
                return Err(self.manifest_not_found(reference));
            }
            other => other?,
        };
        tracing::trace!(%link, %digest, "Resolved link");

        match self.blobs.read(&digest).await {
            Ok(bytes) => Ok(Manifest::new(digest, bytes)),
            Err(RegistryError::BlobNotFound(_)) => {
                tracing::warn!(%link, %digest, "Link points to a missing blob");
                Err(self.manifest_not_found(reference))
            }
            Err(err) => Err(err),
        }
    }

    /// Resolve `reference` and parse the manifest as JSON.
    pub async fn manifest_json(&self, reference: &Reference) -> RegistryResult<serde_json::Value> {
        self.manifest(reference).await?.json()
    }

    async fn read_link(&self, path: &Utf8Path) -> RegistryResult<Digest> {
        let mut reader = self.storage.open(path).await?;
        let mut data = Vec::new();
        reader.read_to_end(&mut data).await?;
        let digest = match std::str::from_utf8(&data) {
            Ok(text) => Digest::parse(text),
            Err(_) => Err(MalformedLink::not_utf8(&String::from_utf8_lossy(&data))),
        };
        digest.map_err(|source| RegistryError::MalformedLink {
            path: path.to_owned(),
            source,
        })
    }

    async fn write_link(&self, reference: &Reference, digest: &Digest) -> Result<(), StorageError> {
        let path = self.layout.link(&self.name, reference);
        let text = digest.to_string();
        tracing::trace!(%path, %digest, "Writing link");
        self.storage.upload(&path, &mut text.as_bytes()).await
    }

    /// Store a manifest, link its digest as a revision and, if given, point
    /// `tag` at it.
    ///
    /// The manifest must be JSON; its schema is not checked.
    #[tracing::instrument(skip(self, manifest), fields(repository = %self.name))]
    pub async fn put_manifest(&self, manifest: &[u8], tag: Option<&Tag>) -> RegistryResult<Digest> {
        serde_json::from_slice::<IgnoredAny>(manifest)?;

        let digest = self.blobs.put_bytes(manifest).await?;
        self.write_link(&Reference::Digest(digest.clone()), &digest)
            .await?;

        if let Some(tag) = tag {
            self.tag(tag, &digest).await?;
        }

        tracing::debug!(%digest, "Stored manifest");
        Ok(digest)
    }

    /// Point `tag` at the manifest revision `digest`.
    ///
    /// The revision must already exist in this repository.
    pub async fn tag(&self, tag: &Tag, digest: &Digest) -> RegistryResult<()> {
        let revision = Reference::Digest(digest.clone());
        match self.storage.metadata(&self.layout.link(&self.name, &revision)).await {
            Ok(_) => {}
            Err(err) if err.is_not_found() => return Err(self.manifest_not_found(&revision)),
            Err(err) => return Err(err.into()),
        }

        self.write_link(&Reference::Tag(tag.clone()), digest).await?;
        Ok(())
    }

    /// All tags in the repository, sorted.
    pub async fn tags(&self) -> RegistryResult<Vec<Tag>> {
        let prefix = self.layout.tags(&self.name);
        let files = match self.storage.list(Some(&prefix)).await {
            Ok(files) => files,
            Err(err) if err.is_not_found() => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut tags: Vec<Tag> = files
            .iter()
            .filter_map(|file| {
                let relative = Utf8Path::new(file).strip_prefix(&prefix).ok()?;
                let mut components = relative.components().map(|c| c.as_str());
                match (
                    components.next(),
                    components.next(),
                    components.next(),
                    components.next(),
                ) {
                    (Some(tag), Some("current"), Some("link"), None) => Tag::new(tag).ok(),
                    _ => None,
                }
            })
            .collect();
        tags.sort();
        Ok(tags)
    }
}
