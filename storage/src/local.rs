use camino::{Utf8Path, Utf8PathBuf};
use eyre::Context;
use tokio::io::AsyncWriteExt;
use tracing::Instrument;

use storage_driver::{Driver, Metadata, Reader, StorageError, StorageErrorKind, Writer};

const ENGINE: &str = "local";

/// Prefix for in-flight uploads, which are renamed into place once complete.
const UPLOAD_PREFIX: &str = ".upload-";

/// Storage driver which keeps files in a directory tree on the local filesystem.
///
/// Each bucket lives at `<root>/<bucket>/b/`. Uploads are written to a hidden
/// sibling of their destination and renamed into place, so a reader never
/// observes a partially written file.
#[derive(Debug)]
pub struct LocalDriver {
    root: Utf8PathBuf,
}

impl LocalDriver {
    /// Create a driver rooted at `root`.
    pub fn new(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    fn bucket_root(&self, bucket: &str) -> Utf8PathBuf {
        let mut path = self.root.join(bucket);
        path.push("b");
        path
    }

    fn path(&self, bucket: &str, remote: &Utf8Path) -> Utf8PathBuf {
        self.bucket_root(bucket).join(remote)
    }
}

fn io_error(bucket: &str, remote: &Utf8Path, context: &str, err: std::io::Error) -> StorageError {
    StorageError::builder(ENGINE, StorageErrorKind::from_io(&err), err)
        .bucket(bucket)
        .path(remote.as_str())
        .context(context)
        .build()
}

#[async_trait::async_trait]
impl Driver for LocalDriver {
    fn name(&self) -> &'static str {
        ENGINE
    }

    async fn metadata(&self, bucket: &str, remote: &Utf8Path) -> Result<Metadata, StorageError> {
        let path = self.path(bucket, remote);
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|err| io_error(bucket, remote, "metadata", err))?;
        let created = metadata
            .created()
            .or_else(|_| metadata.modified())
            .map_err(|err| io_error(bucket, remote, "created timestamp", err))?;
        Ok(Metadata {
            size: metadata.len(),
            created: created.into(),
        })
    }

    async fn delete(&self, bucket: &str, remote: &Utf8Path) -> Result<(), StorageError> {
        let path = self.path(bucket, remote);
        tokio::fs::remove_file(path)
            .await
            .map_err(|err| io_error(bucket, remote, "remove_file", err))?;
        Ok(())
    }

    async fn upload(
        &self,
        bucket: &str,
        remote: &Utf8Path,
        local: &mut Reader<'_>,
    ) -> Result<(), StorageError> {
        let destination = self.path(bucket, remote);
        let (Some(parent), Some(file_name)) = (destination.parent(), destination.file_name())
        else {
            return Err(StorageError::builder(
                ENGINE,
                StorageErrorKind::InvalidRequest,
                format!("not a file path: {remote}"),
            )
            .bucket(bucket)
            .path(remote.as_str())
            .build());
        };

        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|err| io_error(bucket, remote, "create_dir_all", err))?;

        let prefix = format!("{UPLOAD_PREFIX}{file_name}.");
        let dir = parent.to_owned();
        let staging = tokio::task::spawn_blocking(move || {
            tempfile::Builder::new().prefix(&prefix).tempfile_in(dir)
        })
        .await
        .map_err(std::io::Error::other)
        .and_then(|created| created)
        .map_err(|err| io_error(bucket, remote, "create staging file", err))?;

        // Removed on drop until renamed into place, including when this future is dropped.
        let (file, staging) = staging.into_parts();

        let written = write_file(tokio::fs::File::from_std(file), local).await;
        let published = match written {
            Ok(()) => tokio::fs::rename(&staging, &destination)
                .await
                .context("rename into place"),
            Err(err) => Err(err),
        };

        if let Err(err) = published {
            let path = staging.display().to_string();
            if let Err(cleanup) = staging.close() {
                tracing::warn!(staging = %path, "Failed to remove staged upload: {cleanup}");
            }
            return Err(StorageError::builder(ENGINE, StorageErrorKind::Io, err)
                .bucket(bucket)
                .path(remote.as_str())
                .context("upload")
                .build());
        }

        staging
            .keep()
            .map_err(|err| io_error(bucket, remote, "keep published file", err.error))?;

        tracing::trace!(%destination, "Published upload");
        Ok(())
    }

    async fn download(
        &self,
        bucket: &str,
        remote: &Utf8Path,
        local: &mut Writer<'_>,
    ) -> Result<(), StorageError> {
        let mut reader = self.open(bucket, remote).await?;

        tokio::io::copy_buf(&mut reader, local)
            .await
            .map_err(|err| io_error(bucket, remote, "copy", err))?;

        local
            .flush()
            .await
            .map_err(|err| io_error(bucket, remote, "flush writer", err))?;

        Ok(())
    }

    async fn open(
        &self,
        bucket: &str,
        remote: &Utf8Path,
    ) -> Result<Box<Reader<'static>>, StorageError> {
        let path = self.path(bucket, remote);
        let file = tokio::fs::File::open(&path)
            .await
            .map_err(|err| io_error(bucket, remote, "open remote file", err))?;
        Ok(Box::new(tokio::io::BufReader::new(file)))
    }

    async fn list(
        &self,
        bucket: &str,
        prefix: Option<&Utf8Path>,
    ) -> Result<Vec<String>, StorageError> {
        let base = self.bucket_root(bucket);
        let start = match prefix {
            Some(prefix) => base.join(prefix),
            None => base.clone(),
        };

        let items = tokio::task::spawn_blocking(move || collect_list(&base, &start))
            .in_current_span()
            .await
            .wrap_err("local driver: list task")
            .map_err(StorageError::with(ENGINE, StorageErrorKind::Other))?
            .map_err(StorageError::with(ENGINE, StorageErrorKind::Io))?;

        tracing::debug!("Found {} entries", items.len());

        Ok(items.into_iter().map(|p| p.to_string()).collect())
    }
}

async fn write_file(file: tokio::fs::File, reader: &mut Reader<'_>) -> eyre::Result<()> {
    let mut writer = tokio::io::BufWriter::new(file);

    tokio::io::copy_buf(reader, &mut writer)
        .await
        .context("copy")?;

    writer.flush().await.context("flush writer")?;
    writer
        .get_ref()
        .sync_all()
        .await
        .context("sync staging file")?;
    Ok(())
}

/// Files below `start`, as paths relative to `base`. Missing directories list as empty.
#[tracing::instrument]
fn collect_list(base: &Utf8Path, start: &Utf8Path) -> eyre::Result<Vec<Utf8PathBuf>> {
    let mut files = Vec::new();
    if start.is_dir() {
        visit(start, &mut files)?;
    }

    Ok(files
        .into_iter()
        .filter_map(|p| p.strip_prefix(base).ok().map(|p| p.to_owned()))
        .collect())
}

fn visit(path: &Utf8Path, files: &mut Vec<Utf8PathBuf>) -> eyre::Result<()> {
    for entry in path.read_dir_utf8()? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            visit(entry.path(), files)?;
        } else if !entry.file_name().starts_with(UPLOAD_PREFIX) {
            files.push(entry.path().to_owned())
        }
    }

    Ok(())
}
