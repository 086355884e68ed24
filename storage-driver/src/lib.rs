//! # Storage driver interface
//!
//! The byte-addressable storage engine contract shared by every backend:
//! a [`Driver`] maps `(bucket, path)` keys to byte streams, and reports
//! failures as a [`StorageError`] categorised by [`StorageErrorKind`].

mod driver;
mod error;

pub use driver::Driver;
pub use driver::Metadata;
pub use driver::Reader;
pub use driver::Writer;
pub use error::StorageError;
pub use error::StorageErrorBuilder;
pub use error::StorageErrorKind;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_are_classified() {
        let err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(StorageErrorKind::from_io(&err), StorageErrorKind::NotFound);

        let err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        assert_eq!(
            StorageErrorKind::from_io(&err),
            StorageErrorKind::PermissionDenied
        );

        let err = std::io::Error::other("boom");
        assert_eq!(StorageErrorKind::from_io(&err), StorageErrorKind::Io);
    }

    #[test]
    fn display_includes_context() {
        let err = StorageError::builder(
            "memory",
            StorageErrorKind::NotFound,
            std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
        )
        .bucket("registry")
        .path("blobs/sha256/ab/abcd/data")
        .context("download")
        .build();

        assert!(err.is_not_found());
        assert!(!err.is_retryable());
        assert_eq!(
            err.to_string(),
            "Storage error [not found] from memory (bucket: registry) \
             (path: blobs/sha256/ab/abcd/data) (download): file not found"
        );
    }
}
