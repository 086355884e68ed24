//! Validated repository names and tags.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

/// Names must be shorter than this, slashes included.
const MAX_NAME_LEN: usize = 256;

static COMPONENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]+(?:[._-][a-z0-9]+)*$").expect("valid regex"));

static TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.-]{0,127}$").expect("valid regex"));

/// Why a repository name was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NameError {
    /// The name was the empty string.
    #[error("repository name can't be empty")]
    Empty,

    /// The name is too long.
    #[error("repository name must be between 1 and {} chars long, got {length}", MAX_NAME_LEN - 1)]
    TooLong {
        /// Length of the rejected name.
        length: usize,
    },

    /// The name ends in `/`.
    #[error("repository name can't end with a slash")]
    TrailingSlash,

    /// A `/`-separated component doesn't match `[a-z0-9]+(?:[._-][a-z0-9]+)*`.
    #[error("invalid repository name component: {component:?}")]
    InvalidComponent {
        /// The offending component.
        component: String,
    },
}

/// The name of an image repository, e.g. `library/alpine`.
///
/// Only valid names can be constructed, so paths derived from a
/// `RepositoryName` never need re-checking.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepositoryName(String);

impl RepositoryName {
    /// Validate `candidate` as a repository name.
    pub fn new(candidate: impl Into<String>) -> Result<Self, NameError> {
        let candidate = candidate.into();
        if candidate.is_empty() {
            return Err(NameError::Empty);
        }
        if candidate.len() >= MAX_NAME_LEN {
            return Err(NameError::TooLong {
                length: candidate.len(),
            });
        }
        if candidate.ends_with('/') {
            return Err(NameError::TrailingSlash);
        }
        if let Some(component) = candidate.split('/').find(|part| !COMPONENT.is_match(part)) {
            return Err(NameError::InvalidComponent {
                component: component.to_owned(),
            });
        }
        Ok(Self(candidate))
    }

    /// The name as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RepositoryName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RepositoryName {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for RepositoryName {
    type Error = NameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RepositoryName> for String {
    fn from(value: RepositoryName) -> Self {
        value.0
    }
}

impl AsRef<str> for RepositoryName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A tag which doesn't match `[A-Za-z0-9_][A-Za-z0-9_.-]{0,127}`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid tag: {0:?}")]
pub struct TagError(String);

/// A human readable manifest reference, e.g. `latest` or `1.2.3`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag(String);

impl Tag {
    /// Validate `name` as a tag.
    pub fn new(name: impl Into<String>) -> Result<Self, TagError> {
        let name = name.into();
        if TAG.is_match(&name) {
            Ok(Self(name))
        } else {
            Err(TagError(name))
        }
    }

    /// The tag as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Tag {
    type Err = TagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_names() {
        for name in ["test", "a/b-c_1", "library/alpine", "my.registry/team_x/app-1"] {
            assert_eq!(RepositoryName::new(name).unwrap().as_str(), name);
        }
    }

    #[test]
    fn rejects_empty_name() {
        assert_eq!(RepositoryName::new("").unwrap_err(), NameError::Empty);
    }

    #[test]
    fn rejects_long_names() {
        let name = "a".repeat(256);
        assert_eq!(
            RepositoryName::new(name).unwrap_err(),
            NameError::TooLong { length: 256 }
        );

        let longest = "a".repeat(255);
        assert!(RepositoryName::new(longest).is_ok());
    }

    #[test]
    fn rejects_trailing_slash() {
        assert_eq!(
            RepositoryName::new("library/").unwrap_err(),
            NameError::TrailingSlash
        );
    }

    #[test]
    fn rejects_bad_components() {
        for (name, component) in [
            ("Library/alpine", "Library"),
            ("a//b", ""),
            ("/a", ""),
            ("a/b$c", "b$c"),
            ("a-/b", "a-"),
            ("a/.b", ".b"),
            ("team__x/app", "team__x"),
            ("a..b", "a..b"),
        ] {
            assert_eq!(
                RepositoryName::new(name).unwrap_err(),
                NameError::InvalidComponent {
                    component: component.into()
                },
                "{name}"
            );
        }
    }

    #[test]
    fn tags() {
        assert!(Tag::new("latest").is_ok());
        assert!(Tag::new("1.2.3_rc-1").is_ok());
        assert!(Tag::new("_x").is_ok());
        assert!(Tag::new("").is_err());
        assert!(Tag::new(".hidden").is_err());
        assert!(Tag::new("a/b").is_err());
        assert!(Tag::new("a".repeat(129)).is_err());
    }
}
