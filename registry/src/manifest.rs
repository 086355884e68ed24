//! Manifest documents as resolved from a repository

use bytes::Bytes;
use serde::de::DeserializeOwned;

use crate::digest::Digest;
use crate::error::RegistryResult;

/// Docker image manifest, schema 1
pub const DOCKER_MANIFEST_V1: &str = "application/vnd.docker.distribution.manifest.v1+json";
/// Docker image manifest, schema 2
pub const DOCKER_MANIFEST_V2: &str = "application/vnd.docker.distribution.manifest.v2+json";
/// Docker manifest list
pub const DOCKER_MANIFEST_LIST: &str = "application/vnd.docker.distribution.manifest.list.v2+json";
/// OCI image manifest
pub const OCI_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";

/// The raw bytes of a manifest, and the digest they were stored under.
///
/// The bytes are returned exactly as stored; nothing is validated against a
/// manifest schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    digest: Digest,
    bytes: Bytes,
}

impl Manifest {
    pub(crate) fn new(digest: Digest, bytes: Bytes) -> Self {
        Self { digest, bytes }
    }

    /// The digest the manifest's link pointed to.
    pub fn digest(&self) -> &Digest {
        &self.digest
    }

    /// The manifest bytes.
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    /// Take the manifest bytes.
    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }

    /// Parse as a generic JSON document.
    pub fn json(&self) -> RegistryResult<serde_json::Value> {
        self.parse()
    }

    /// Parse into a caller-provided type.
    pub fn parse<T: DeserializeOwned>(&self) -> RegistryResult<T> {
        Ok(serde_json::from_slice(&self.bytes)?)
    }

    /// Best-effort media type, from `mediaType` or else `schemaVersion`.
    pub fn media_type(&self) -> String {
        let Ok(json) = self.json() else {
            return OCI_MANIFEST.to_string();
        };

        if let Some(media_type) = json.get("mediaType").and_then(|v| v.as_str()) {
            return media_type.to_string();
        }

        match json.get("schemaVersion").and_then(|v| v.as_u64()) {
            Some(1) => DOCKER_MANIFEST_V1,
            Some(2) if json.get("manifests").is_some() => DOCKER_MANIFEST_LIST,
            Some(2) => DOCKER_MANIFEST_V2,
            _ => OCI_MANIFEST,
        }
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::Algorithm;

    fn manifest(body: &'static str) -> Manifest {
        let bytes = Bytes::from_static(body.as_bytes());
        Manifest::new(Digest::from_bytes(Algorithm::Sha256, &bytes), bytes)
    }

    #[test]
    fn explicit_media_type() {
        let m = manifest(r#"{"schemaVersion":2,"mediaType":"application/vnd.oci.image.index.v1+json"}"#);
        assert_eq!(m.media_type(), "application/vnd.oci.image.index.v1+json");
    }

    #[test]
    fn media_type_from_schema_version() {
        assert_eq!(manifest(r#"{"schemaVersion":1}"#).media_type(), DOCKER_MANIFEST_V1);
        assert_eq!(manifest(r#"{"schemaVersion":2}"#).media_type(), DOCKER_MANIFEST_V2);
        assert_eq!(
            manifest(r#"{"schemaVersion":2,"manifests":[]}"#).media_type(),
            DOCKER_MANIFEST_LIST
        );
        assert_eq!(manifest("not json").media_type(), OCI_MANIFEST);
    }

    #[test]
    fn parse_typed_fields() {
        #[derive(serde::Deserialize)]
        struct Config {
            digest: Digest,
        }

        #[derive(serde::Deserialize)]
        struct ImageManifest {
            config: Config,
        }

        let m = manifest(r#"{"config":{"digest":"sha256:e563"}}"#);
        let parsed: ImageManifest = m.parse().unwrap();
        assert_eq!(parsed.config.digest, Digest::parse("sha256:e563").unwrap());
        assert!(manifest("{").json().is_err());
    }
}
