use std::collections::HashMap;
use std::io::Cursor;

use bytes::Bytes;
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use tokio::{io::AsyncWriteExt, sync::RwLock};

use storage_driver::{Driver, Metadata, Reader, StorageError, StorageErrorKind, Writer};

const ENGINE: &str = "memory";

fn io_error(err: std::io::Error) -> StorageError {
    StorageError::new(ENGINE, StorageErrorKind::from_io(&err), err)
}

fn bucket_not_found(bucket: &str) -> StorageError {
    StorageError::builder(
        ENGINE,
        StorageErrorKind::NotFound,
        format!("Bucket not found: {bucket}"),
    )
    .bucket(bucket)
    .context("bucket not found")
    .build()
}

fn path_not_found(bucket: &str, remote: &Utf8Path) -> StorageError {
    StorageError::builder(
        ENGINE,
        StorageErrorKind::NotFound,
        format!("Path not found: {remote}"),
    )
    .bucket(bucket)
    .path(remote.as_str())
    .context("path not found")
    .build()
}

#[derive(Debug)]
struct MemoryFileItem {
    created: DateTime<Utc>,
    data: Bytes,
}

impl From<Vec<u8>> for MemoryFileItem {
    fn from(data: Vec<u8>) -> Self {
        Self {
            created: Utc::now(),
            data: data.into(),
        }
    }
}

impl From<&MemoryFileItem> for Metadata {
    fn from(value: &MemoryFileItem) -> Self {
        Self {
            created: value.created,
            size: value.data.len() as u64,
        }
    }
}

type Bucket = HashMap<Utf8PathBuf, MemoryFileItem>;

/// Storage driver that stores files in memory.
///
/// Uploads are buffered completely before they are inserted, so a concurrent
/// reader never sees a partially written file.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    buckets: RwLock<HashMap<String, Bucket>>,
}

impl MemoryStorage {
    /// Create a new `MemoryStorage` instance, with no buckets.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new `MemoryStorage` instance, with the given buckets.
    pub fn with_buckets(buckets: &[&str]) -> Self {
        let map = buckets
            .iter()
            .map(|bucket| (bucket.to_string(), HashMap::new()))
            .collect();

        Self {
            buckets: RwLock::new(map),
        }
    }

    /// Create a new bucket in the storage.
    pub async fn create_bucket(&self, bucket: String) {
        let mut buckets = self.buckets.write().await;
        buckets.entry(bucket).or_default();
    }

    /// A shared handle to the stored bytes for `remote`.
    async fn bytes(&self, bucket: &str, remote: &Utf8Path) -> Result<Bytes, StorageError> {
        let buckets = self.buckets.read().await;
        let bucket_map = buckets.get(bucket).ok_or_else(|| bucket_not_found(bucket))?;
        bucket_map
            .get(remote)
            .map(|item| item.data.clone())
            .ok_or_else(|| path_not_found(bucket, remote))
    }
}

#[async_trait::async_trait]
impl Driver for MemoryStorage {
    fn name(&self) -> &'static str {
        ENGINE
    }

    async fn metadata(&self, bucket: &str, remote: &Utf8Path) -> Result<Metadata, StorageError> {
        let buckets = self.buckets.read().await;
        let bucket_map = buckets.get(bucket).ok_or_else(|| bucket_not_found(bucket))?;
        Ok(bucket_map
            .get(remote)
            .ok_or_else(|| path_not_found(bucket, remote))?
            .into())
    }

    async fn delete(&self, bucket: &str, remote: &Utf8Path) -> Result<(), StorageError> {
        let mut buckets = self.buckets.write().await;
        let bucket_map = buckets
            .get_mut(bucket)
            .ok_or_else(|| bucket_not_found(bucket))?;
        bucket_map.remove(remote);

        Ok(())
    }

    async fn upload(
        &self,
        bucket: &str,
        remote: &Utf8Path,
        local: &mut Reader<'_>,
    ) -> Result<(), StorageError> {
        let mut buf = Vec::new();

        tokio::io::copy(local, &mut buf).await.map_err(io_error)?;

        buf.shutdown().await.map_err(io_error)?;

        let mut buckets = self.buckets.write().await;
        let bucket_map = buckets.entry(bucket.to_string()).or_default();
        bucket_map.insert(remote.to_owned(), buf.into());

        Ok(())
    }

    async fn download(
        &self,
        bucket: &str,
        remote: &Utf8Path,
        local: &mut Writer<'_>,
    ) -> Result<(), StorageError> {
        let data = self.bytes(bucket, remote).await?;

        local.write_all(&data).await.map_err(io_error)?;
        local.flush().await.map_err(io_error)?;

        Ok(())
    }

    async fn open(
        &self,
        bucket: &str,
        remote: &Utf8Path,
    ) -> Result<Box<Reader<'static>>, StorageError> {
        let data = self.bytes(bucket, remote).await?;
        Ok(Box::new(Cursor::new(data)))
    }

    async fn list(
        &self,
        bucket: &str,
        prefix: Option<&Utf8Path>,
    ) -> Result<Vec<String>, StorageError> {
        tracing::trace!(%bucket, ?prefix, "list memory bucket");

        let buckets = self.buckets.read().await;
        let bucket_map = buckets.get(bucket).ok_or_else(|| bucket_not_found(bucket))?;

        let paths = bucket_map
            .keys()
            .filter(|path| prefix.is_none_or(|prefix| path.starts_with(prefix)))
            .map(|path| path.to_string())
            .collect();

        Ok(paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn missing_bucket_and_path_are_not_found() {
        let storage = MemoryStorage::with_buckets(&["registry"]);

        let err = storage
            .metadata("other", Utf8Path::new("a"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.bucket(), Some("other"));

        let err = storage
            .open("registry", Utf8Path::new("blobs/sha256/00/00/data"))
            .await
            .err()
            .expect("missing path should not open");
        assert!(err.is_not_found());
        assert_eq!(err.path(), Some("blobs/sha256/00/00/data"));
    }

    #[tokio::test]
    async fn upload_then_open() {
        let storage = MemoryStorage::new();
        let mut data: &[u8] = b"layer bytes";
        storage
            .upload("registry", Utf8Path::new("blob"), &mut data)
            .await
            .unwrap();

        let mut reader = storage
            .open("registry", Utf8Path::new("blob"))
            .await
            .unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"layer bytes");
    }

    #[tokio::test]
    async fn list_filters_by_path_prefix() {
        let storage = MemoryStorage::with_buckets(&["registry"]);
        for path in ["tags/a/current/link", "tags/b/current/link", "tagsx/c"] {
            let mut data: &[u8] = b"x";
            storage
                .upload("registry", Utf8Path::new(path), &mut data)
                .await
                .unwrap();
        }

        let mut listed = storage
            .list("registry", Some(Utf8Path::new("tags")))
            .await
            .unwrap();
        listed.sort();
        assert_eq!(listed, vec!["tags/a/current/link", "tags/b/current/link"]);
    }

    #[tokio::test]
    async fn delete_removes_file() {
        let storage = MemoryStorage::with_buckets(&["registry"]);
        let mut data: &[u8] = b"x";
        storage
            .upload("registry", Utf8Path::new("f"), &mut data)
            .await
            .unwrap();
        storage.delete("registry", Utf8Path::new("f")).await.unwrap();
        assert!(storage
            .metadata("registry", Utf8Path::new("f"))
            .await
            .unwrap_err()
            .is_not_found());
    }
}
