//! Manifest references and the link files they resolve through.

use std::fmt;
use std::str::FromStr;

use camino::Utf8PathBuf;

use crate::digest::{Digest, MalformedLink};
use crate::name::{Tag, TagError};

/// A reference string which is neither a valid tag nor a valid digest.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReferenceError {
    /// Contains `:`, but isn't a digest.
    #[error(transparent)]
    Digest(#[from] MalformedLink),

    /// Not a valid tag.
    #[error(transparent)]
    Tag(#[from] TagError),
}

/// Points at a manifest, either by tag or by digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Reference {
    /// A mutable, human readable name.
    Tag(Tag),

    /// An immutable manifest revision.
    Digest(Digest),
}

impl Reference {
    /// Path to this reference's link file, relative to the repository's
    /// `_manifests` directory.
    pub fn path(&self) -> Utf8PathBuf {
        match self {
            Reference::Tag(tag) => ["tags", tag.as_str(), "current", "link"].iter().collect(),
            Reference::Digest(digest) => ["revisions", digest.algorithm(), digest.hex(), "link"]
                .iter()
                .collect(),
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reference::Tag(tag) => tag.fmt(f),
            Reference::Digest(digest) => digest.fmt(f),
        }
    }
}

impl FromStr for Reference {
    type Err = ReferenceError;

    /// Anything containing `:` is a digest, everything else a tag.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.contains(':') {
            Ok(Reference::Digest(Digest::parse(s)?))
        } else {
            Ok(Reference::Tag(Tag::new(s)?))
        }
    }
}

impl From<Tag> for Reference {
    fn from(value: Tag) -> Self {
        Reference::Tag(value)
    }
}

impl From<Digest> for Reference {
    fn from(value: Digest) -> Self {
        Reference::Digest(value)
    }
}
