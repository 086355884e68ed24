//! Content-addressable blob storage

use bytes::Bytes;
use camino::Utf8PathBuf;
use storage::{Metadata, Reader, StorageBucket, StorageError};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::digest::{Algorithm, Digest};
use crate::error::{RegistryError, RegistryResult};
use crate::layout::Layout;
use crate::scratch::Scratch;

/// Chunk size used to consume upload streams.
pub const DEFAULT_CHUNK_SIZE: usize = 8192;

/// A stream over a blob's contents.
pub type BlobReader = Box<Reader<'static>>;

/// Stores and retrieves blobs by the digest of their contents.
///
/// Blobs are written once under `blobs/<algorithm>/<hex[0:2]>/<hex>/data`
/// and never modified. Writing the same content again is harmless.
#[derive(Debug, Clone)]
pub struct BlobStore {
    storage: StorageBucket,
    layout: Layout,
    scratch: Option<Utf8PathBuf>,
    chunk_size: usize,
}

impl BlobStore {
    /// Create a blob store over `storage`, with keys laid out by `layout`.
    pub fn new(storage: StorageBucket, layout: Layout) -> Self {
        Self {
            storage,
            layout,
            scratch: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Directory for scratch files while uploads are in flight.
    ///
    /// Defaults to the system temporary directory.
    pub fn with_scratch_dir(mut self, dir: impl Into<Utf8PathBuf>) -> Self {
        self.scratch = Some(dir.into());
        self
    }

    /// Read uploads in chunks of at most `chunk_size` bytes. Zero is treated as one.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    fn not_found(digest: &Digest) -> impl FnOnce(StorageError) -> RegistryError + '_ {
        move |err| {
            if err.is_not_found() {
                RegistryError::BlobNotFound(digest.clone())
            } else {
                err.into()
            }
        }
    }

    /// Open a blob for reading.
    #[tracing::instrument(skip(self), fields(%digest))]
    pub async fn get(&self, digest: &Digest) -> RegistryResult<BlobReader> {
        let path = self.layout.blob(digest);
        tracing::trace!(%path, "Opening blob");
        self.storage
            .open(&path)
            .await
            .map_err(Self::not_found(digest))
    }

    /// Read a whole blob into memory.
    pub async fn read(&self, digest: &Digest) -> RegistryResult<Bytes> {
        let mut reader = self.get(digest).await?;
        let mut data = Vec::new();
        reader.read_to_end(&mut data).await?;
        Ok(data.into())
    }

    /// Whether a blob is present.
    pub async fn exists(&self, digest: &Digest) -> RegistryResult<bool> {
        match self.metadata(digest).await {
            Ok(_) => Ok(true),
            Err(RegistryError::BlobNotFound(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Size and creation time of a blob.
    pub async fn metadata(&self, digest: &Digest) -> RegistryResult<Metadata> {
        self.storage
            .metadata(&self.layout.blob(digest))
            .await
            .map_err(Self::not_found(digest))
    }

    /// Consume `source` to the end, store it, and return its digest.
    ///
    /// Each chunk is hashed and appended to a scratch file before the next is
    /// read. Once the stream ends the scratch file is published at the
    /// content-addressed path for the final digest. If the stream fails, or
    /// this future is dropped, nothing is published and the scratch file is
    /// removed.
    #[tracing::instrument(skip_all, fields(driver = self.storage.name()))]
    pub async fn put<R>(&self, mut source: R) -> RegistryResult<Digest>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut scratch = Scratch::create(self.scratch.clone()).await?;
        let mut hasher = Algorithm::Sha256.hasher();
        let mut chunk = vec![0u8; self.chunk_size];
        let mut size: u64 = 0;

        loop {
            let n = source.read(&mut chunk).await?;
            if n == 0 {
                break;
            }
            hasher.update(&chunk[..n]);
            scratch.append(&chunk[..n]).await?;
            size += n as u64;
        }

        let digest = hasher.finalize();
        let path = self.layout.blob(&digest);

        let mut reader = scratch.reader().await?;
        self.storage.upload(&path, &mut reader).await?;

        tracing::debug!(%digest, size, "Stored blob");
        Ok(digest)
    }

    /// Store an in-memory blob.
    pub async fn put_bytes(&self, data: &[u8]) -> RegistryResult<Digest> {
        self.put(data).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storage::MemoryStorage;

    fn store() -> BlobStore {
        let storage = storage::Storage::from(MemoryStorage::with_buckets(&["test"]));
        BlobStore::new(storage.bucket("test"), Layout::default())
    }

    #[tokio::test]
    async fn put_then_get() {
        let store = store();
        let digest = store.put_bytes(&[0x00, 0x01, 0x02, 0x03]).await.unwrap();
        assert_eq!(
            digest.to_string(),
            "sha256:054edec1d0211f624fed0cbca9d4f9400b0e491c43742af2c5b0abebf0c990d8"
        );

        let data = store.read(&digest).await.unwrap();
        assert_eq!(&data[..], &[0x00, 0x01, 0x02, 0x03]);
        assert!(store.exists(&digest).await.unwrap());
        assert_eq!(store.metadata(&digest).await.unwrap().size, 4);
    }

    #[tokio::test]
    async fn blobs_are_stored_at_content_addressed_paths() {
        let storage = storage::Storage::from(MemoryStorage::with_buckets(&["test"]));
        let store = BlobStore::new(storage.bucket("test"), Layout::default());
        store.put_bytes(&[0x00, 0x01, 0x02, 0x03]).await.unwrap();

        let listed = storage.list("test", None).await.unwrap();
        assert_eq!(
            listed,
            vec![
                "docker/registry/v2/blobs/sha256/05/\
                 054edec1d0211f624fed0cbca9d4f9400b0e491c43742af2c5b0abebf0c990d8/data"
            ]
        );
    }

    #[tokio::test]
    async fn missing_blob_is_not_found() {
        let store = store();
        let digest = Digest::from_bytes(Algorithm::Sha256, b"never stored");

        let err = store.get(&digest).await.err().expect("blob was never stored");
        assert!(matches!(err, RegistryError::BlobNotFound(ref d) if d == &digest));
        assert!(!store.exists(&digest).await.unwrap());
    }

    #[tokio::test]
    async fn digest_is_independent_of_chunk_size() {
        let data: Vec<u8> = (0..50_000u32).map(|i| (i % 251) as u8).collect();
        let expected = Digest::from_bytes(Algorithm::Sha256, &data);

        for chunk_size in [0, 1, 7, 4096, DEFAULT_CHUNK_SIZE, 1 << 20] {
            let store = store().with_chunk_size(chunk_size);
            let digest = store.put_bytes(&data).await.unwrap();
            assert_eq!(digest, expected, "chunk size {chunk_size}");
            assert_eq!(&store.read(&digest).await.unwrap()[..], &data[..]);
        }
    }

    #[tokio::test]
    async fn putting_twice_is_idempotent() {
        let store = store();
        let first = store.put_bytes(b"layer").await.unwrap();
        let second = store.put_bytes(b"layer").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(&store.read(&first).await.unwrap()[..], b"layer");
    }

    #[tokio::test]
    async fn empty_blob() {
        let store = store();
        let digest = store.put_bytes(b"").await.unwrap();
        assert_eq!(
            digest.hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert!(store.read(&digest).await.unwrap().is_empty());
    }
}
