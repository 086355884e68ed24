//! Key layout in the backing store, compatible with existing docker
//! distribution registries:
//!
//! ```text
//! <root>
//! ├── blobs/<algorithm>/<hex[0:2]>/<hex>/data
//! └── repositories/<name>/_manifests
//!     ├── tags/<tag>/current/link
//!     └── revisions/<algorithm>/<hex>/link
//! ```

use camino::{Utf8Path, Utf8PathBuf};

use crate::digest::Digest;
use crate::name::RepositoryName;
use crate::reference::Reference;

/// The conventional root of a v2 registry inside its storage bucket.
pub const DEFAULT_ROOT: &str = "docker/registry/v2";

/// Path of a blob's data, relative to the registry root.
pub fn blob_path(digest: &Digest) -> Utf8PathBuf {
    let hex = digest.hex();
    let shard = hex.get(..2).unwrap_or(hex);
    ["blobs", digest.algorithm(), shard, hex, "data"]
        .iter()
        .collect()
}

/// Path of a repository's manifest links, relative to the registry root.
pub fn manifests_path(name: &RepositoryName) -> Utf8PathBuf {
    ["repositories", name.as_str(), "_manifests"].iter().collect()
}

/// Path of the link file for `reference`, relative to the registry root.
pub fn link_path(name: &RepositoryName, reference: &Reference) -> Utf8PathBuf {
    manifests_path(name).join(reference.path())
}

/// Resolves registry paths to keys under a root prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    root: Utf8PathBuf,
}

impl Default for Layout {
    fn default() -> Self {
        Self::new(DEFAULT_ROOT)
    }
}

impl Layout {
    /// A layout rooted at `root`.
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The root prefix.
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Key of a blob's data.
    pub fn blob(&self, digest: &Digest) -> Utf8PathBuf {
        self.root.join(blob_path(digest))
    }

    /// Key of the link file for `reference` in repository `name`.
    pub fn link(&self, name: &RepositoryName, reference: &Reference) -> Utf8PathBuf {
        self.root.join(link_path(name, reference))
    }

    /// Directory containing one subdirectory per tag of repository `name`.
    pub fn tags(&self, name: &RepositoryName) -> Utf8PathBuf {
        self.root.join(manifests_path(name)).join("tags")
    }
}
