//! Error types for the registry

use camino::Utf8PathBuf;
use http::StatusCode;

use crate::digest::{Digest, MalformedLink, UnsupportedAlgorithm};
use crate::name::{NameError, RepositoryName};
use crate::reference::{Reference, ReferenceError};

/// Result type for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Error types for registry operations
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Invalid repository name
    #[error("invalid repository name: {0}")]
    InvalidName(#[from] NameError),

    /// Invalid tag or digest reference
    #[error("invalid reference: {0}")]
    InvalidReference(#[from] ReferenceError),

    /// A link file whose contents are not a digest
    #[error("malformed link at {path}: {source}")]
    MalformedLink {
        /// Key of the link file
        path: Utf8PathBuf,
        /// Why the contents didn't parse
        source: MalformedLink,
    },

    /// Blob not found
    #[error("blob not found: {0}")]
    BlobNotFound(Digest),

    /// Manifest not found
    #[error("manifest not found: {name}:{reference}")]
    ManifestNotFound {
        /// Repository searched
        name: RepositoryName,
        /// Reference which didn't resolve
        reference: Reference,
    },

    /// Invalid manifest
    #[error("invalid manifest: {0}")]
    InvalidManifest(#[from] serde_json::Error),

    /// No implementation for a digest algorithm
    #[error(transparent)]
    UnsupportedAlgorithm(#[from] UnsupportedAlgorithm),

    /// Storage error
    #[error("storage error: {0}")]
    Storage(#[from] storage::StorageError),

    /// IO error, including failures of the caller's upload stream
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

impl RegistryError {
    /// Whether the error means the requested content doesn't exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            RegistryError::BlobNotFound(_) | RegistryError::ManifestNotFound { .. }
        )
    }

    /// Get the HTTP status code a protocol layer should answer with
    pub fn status_code(&self) -> StatusCode {
        match self {
            RegistryError::BlobNotFound(_) | RegistryError::ManifestNotFound { .. } => {
                StatusCode::NOT_FOUND
            }
            RegistryError::InvalidName(_)
            | RegistryError::InvalidReference(_)
            | RegistryError::InvalidManifest(_) => StatusCode::BAD_REQUEST,
            RegistryError::MalformedLink { .. }
            | RegistryError::UnsupportedAlgorithm(_)
            | RegistryError::Storage(_)
            | RegistryError::Io(_)
            | RegistryError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for OCI error responses
    pub fn error_code(&self) -> &'static str {
        match self {
            RegistryError::BlobNotFound(_) => "BLOB_UNKNOWN",
            RegistryError::ManifestNotFound { .. } => "MANIFEST_UNKNOWN",
            RegistryError::InvalidName(_) => "NAME_INVALID",
            RegistryError::InvalidReference(ReferenceError::Digest(_)) => "DIGEST_INVALID",
            RegistryError::InvalidReference(ReferenceError::Tag(_)) => "TAG_INVALID",
            RegistryError::InvalidManifest(_) => "MANIFEST_INVALID",
            RegistryError::MalformedLink { .. }
            | RegistryError::UnsupportedAlgorithm(_)
            | RegistryError::Storage(_)
            | RegistryError::Io(_)
            | RegistryError::Config(_) => "UNKNOWN",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_mapping() {
        let err = RegistryError::BlobNotFound(Digest::parse("sha256:00").unwrap());
        assert!(err.is_not_found());
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.error_code(), "BLOB_UNKNOWN");
        assert_eq!(err.to_string(), "blob not found: sha256:00");

        let err = RegistryError::ManifestNotFound {
            name: RepositoryName::new("app").unwrap(),
            reference: "latest".parse().unwrap(),
        };
        assert_eq!(err.error_code(), "MANIFEST_UNKNOWN");
        assert_eq!(err.to_string(), "manifest not found: app:latest");
    }

    #[test]
    fn validation_errors_are_client_faults() {
        let err: RegistryError = RepositoryName::new("Bad").unwrap_err().into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.error_code(), "NAME_INVALID");

        let err: RegistryError = "sha256:??".parse::<Reference>().unwrap_err().into();
        assert_eq!(err.error_code(), "DIGEST_INVALID");
    }

    #[test]
    fn malformed_links_are_server_faults() {
        let err = RegistryError::MalformedLink {
            path: "repositories/app/_manifests/tags/x/current/link".into(),
            source: Digest::parse("asd").unwrap_err(),
        };
        assert!(!err.is_not_found());
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
