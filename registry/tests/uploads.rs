use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use camino::Utf8PathBuf;
use registry::{Algorithm, Digest, Registry, RegistryError};
use storage::{LocalDriver, MemoryStorage, Storage};
use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::oneshot;

/// Yields one chunk, then fails.
struct FailingReader {
    sent: bool,
}

impl AsyncRead for FailingReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.sent {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "client went away",
            )));
        }
        self.sent = true;
        buf.put_slice(b"partial");
        Poll::Ready(Ok(()))
    }
}

/// Yields one chunk, signals, then never makes progress again.
struct StalledReader {
    sent: bool,
    stalled: Option<oneshot::Sender<()>>,
}

impl AsyncRead for StalledReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if !self.sent {
            self.sent = true;
            buf.put_slice(b"partial");
            return Poll::Ready(Ok(()));
        }
        if let Some(tx) = self.stalled.take() {
            let _ = tx.send(());
        }
        Poll::Pending
    }
}

fn utf8_dir(dir: &tempfile::TempDir) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(dir.path().to_owned()).unwrap()
}

fn entries(dir: &tempfile::TempDir) -> usize {
    std::fs::read_dir(dir.path()).unwrap().count()
}

fn memory_registry(scratch: &tempfile::TempDir) -> (Storage, Registry) {
    let storage = Storage::from(MemoryStorage::with_buckets(&["registry"]));
    let registry = Registry::builder()
        .storage(storage.clone())
        .bucket("registry")
        .scratch_dir(utf8_dir(scratch))
        .chunk_size(16)
        .build()
        .unwrap();
    (storage, registry)
}

#[tokio::test]
async fn failed_stream_leaves_nothing_behind() {
    let scratch = tempfile::tempdir().unwrap();
    let (storage, registry) = memory_registry(&scratch);

    let err = registry
        .blobs()
        .put(FailingReader { sent: false })
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::Io(ref e) if e.kind() == io::ErrorKind::ConnectionReset));

    assert_eq!(entries(&scratch), 0);
    assert!(storage.list("registry", None).await.unwrap().is_empty());

    let partial = Digest::from_bytes(Algorithm::Sha256, b"partial");
    let err = registry
        .blobs()
        .get(&partial)
        .await
        .err()
        .expect("partial upload must not be published");
    assert!(matches!(err, RegistryError::BlobNotFound(_)));
}

#[tokio::test]
async fn cancelled_upload_leaves_nothing_behind() {
    let scratch = tempfile::tempdir().unwrap();
    let (storage, registry) = memory_registry(&scratch);

    let (tx, rx) = oneshot::channel();
    let upload = registry.blobs().put(StalledReader {
        sent: false,
        stalled: Some(tx),
    });

    tokio::select! {
        result = upload => panic!("upload should not finish: {result:?}"),
        _ = rx => {}
    }

    assert_eq!(entries(&scratch), 0);
    assert!(storage.list("registry", None).await.unwrap().is_empty());
}

#[tokio::test]
async fn concurrent_identical_uploads() {
    let scratch = tempfile::tempdir().unwrap();
    let (storage, registry) = memory_registry(&scratch);
    let data = vec![7u8; 10_000];

    let (first, second) = tokio::join!(
        registry.blobs().put_bytes(&data),
        registry.blobs().put_bytes(&data),
    );
    let first = first.unwrap();
    assert_eq!(first, second.unwrap());

    assert_eq!(&registry.blobs().read(&first).await.unwrap()[..], &data[..]);
    assert_eq!(storage.list("registry", None).await.unwrap().len(), 1);
    assert_eq!(entries(&scratch), 0);
}

#[tokio::test]
async fn local_driver_uses_registry_layout_on_disk() {
    let root = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let registry = Registry::builder()
        .storage(LocalDriver::new(utf8_dir(&root)).into())
        .bucket("images")
        .scratch_dir(utf8_dir(&scratch))
        .build()
        .unwrap();

    let digest = registry
        .blobs()
        .put_bytes(&[0x00, 0x01, 0x02, 0x03])
        .await
        .unwrap();
    assert_eq!(
        digest.hex(),
        "054edec1d0211f624fed0cbca9d4f9400b0e491c43742af2c5b0abebf0c990d8"
    );

    let on_disk = utf8_dir(&root)
        .join("images/b")
        .join(registry.layout().blob(&digest));
    assert_eq!(std::fs::read(&on_disk).unwrap(), [0x00, 0x01, 0x02, 0x03]);

    let blob_dir = on_disk.parent().unwrap();
    let names: Vec<String> = std::fs::read_dir(blob_dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(names, vec!["data"]);
    assert_eq!(entries(&scratch), 0);
}
