use std::io;

use camino::Utf8PathBuf;
use tempfile::TempPath;
use tokio::io::{AsyncSeekExt, AsyncWriteExt, BufReader};

/// A temporary file holding an upload until its digest is known.
///
/// The file is deleted when this is dropped, whether the upload finished,
/// failed or was cancelled.
#[derive(Debug)]
pub(crate) struct Scratch {
    file: tokio::fs::File,
    path: TempPath,
}

impl Scratch {
    /// Create an empty scratch file in `dir`, or the system temporary directory.
    pub(crate) async fn create(dir: Option<Utf8PathBuf>) -> io::Result<Self> {
        let named = tokio::task::spawn_blocking(move || {
            let mut builder = tempfile::Builder::new();
            builder.prefix("blob-").suffix(".tmp");
            match dir {
                Some(dir) => builder.tempfile_in(dir),
                None => builder.tempfile(),
            }
        })
        .await
        .map_err(io::Error::other)??;

        let (file, path) = named.into_parts();
        tracing::trace!(path = %path.display(), "Created scratch file");
        Ok(Self {
            file: tokio::fs::File::from_std(file),
            path,
        })
    }

    /// Append a chunk to the end of the file.
    pub(crate) async fn append(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.file.write_all(chunk).await
    }

    /// Make the written contents durable and rewind, returning a reader over them.
    pub(crate) async fn reader(&mut self) -> io::Result<BufReader<&mut tokio::fs::File>> {
        self.file.flush().await?;
        self.file.sync_data().await?;
        self.file.rewind().await?;
        Ok(BufReader::new(&mut self.file))
    }
}

impl Drop for Scratch {
    fn drop(&mut self) {
        tracing::trace!(path = %self.path.display(), "Releasing scratch file");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn scratch_is_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_owned()).unwrap();

        let mut scratch = Scratch::create(Some(root)).await.unwrap();
        scratch.append(b"hello ").await.unwrap();
        scratch.append(b"world").await.unwrap();
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);

        let mut contents = String::new();
        scratch
            .reader()
            .await
            .unwrap()
            .read_to_string(&mut contents)
            .await
            .unwrap();
        assert_eq!(contents, "hello world");

        drop(scratch);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
