//! Hierarchical artifact keys.
//!
//! A key is a path of lowercase hex segments joined by `/`. Root keys have one
//! segment; a child key is its parent's value plus one fresh segment. Because
//! a child's value always starts with `parent + "/"`, a storage backend can
//! answer "all descendants of X" with a single prefix scan.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Separator between key segments
pub const SEPARATOR: char = '/';

/// Errors produced when parsing a key read back from storage or user input
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("Artifact key is empty")]
    Empty,

    #[error("Artifact key has an empty segment: {0}")]
    EmptySegment(String),

    #[error("Artifact key has an invalid character: {0}")]
    InvalidCharacter(String),
}

/// Hierarchical, path-like artifact identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ArtifactKey(String);

impl ArtifactKey {
    /// Mint a fresh root key.
    ///
    /// Segments come from UUIDv7, so keys minted later sort after keys minted
    /// earlier.
    pub fn create_root() -> Self {
        Self(fresh_segment())
    }

    /// Mint a fresh key one level below this one
    pub fn create_child(&self) -> Self {
        Self(format!("{}{}{}", self.0, SEPARATOR, fresh_segment()))
    }

    /// Parse and validate an existing key value
    pub fn parse(value: impl Into<String>) -> Result<Self, KeyError> {
        let value = value.into();
        if value.is_empty() {
            return Err(KeyError::Empty);
        }

        for segment in value.split(SEPARATOR) {
            if segment.is_empty() {
                return Err(KeyError::EmptySegment(value));
            }
            if !segment
                .chars()
                .all(|c| c.is_ascii_digit() || c.is_ascii_lowercase() || c == '-' || c == '_')
            {
                return Err(KeyError::InvalidCharacter(value));
            }
        }

        Ok(Self(value))
    }

    /// The raw string value
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this key is a root key (no parent)
    pub fn is_root(&self) -> bool {
        !self.0.contains(SEPARATOR)
    }

    /// The parent key, or `None` for a root key
    pub fn parent(&self) -> Option<ArtifactKey> {
        self.0
            .rfind(SEPARATOR)
            .map(|idx| Self(self.0[..idx].to_string()))
    }

    /// The depth-1 ancestor of this key (itself when already a root)
    pub fn root(&self) -> ArtifactKey {
        match self.0.find(SEPARATOR) {
            Some(idx) => Self(self.0[..idx].to_string()),
            None => self.clone(),
        }
    }

    /// Whether `other` is this key's direct parent
    pub fn is_child_of(&self, other: &ArtifactKey) -> bool {
        self.parent().as_ref() == Some(other)
    }

    /// Whether this key lies strictly below `other`
    pub fn is_descendant_of(&self, other: &ArtifactKey) -> bool {
        self.0.len() > other.0.len()
            && self.0.starts_with(&other.0)
            && self.0[other.0.len()..].starts_with(SEPARATOR)
    }

    /// Number of path segments (a root has depth 1)
    pub fn depth(&self) -> usize {
        self.0.matches(SEPARATOR).count() + 1
    }

    /// Keys strictly below `ancestor` down to and including this key,
    /// outermost first. `None` if this key is not a descendant of `ancestor`.
    pub fn path_from(&self, ancestor: &ArtifactKey) -> Option<Vec<ArtifactKey>> {
        if !self.is_descendant_of(ancestor) {
            return None;
        }

        let mut path = Vec::with_capacity(self.depth() - ancestor.depth());
        let mut end = ancestor.0.len();
        while let Some(offset) = self.0[end + 1..].find(SEPARATOR) {
            end = end + 1 + offset;
            path.push(Self(self.0[..end].to_string()));
        }
        path.push(self.clone());

        Some(path)
    }
}

fn fresh_segment() -> String {
    Uuid::now_v7().simple().to_string()
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ArtifactKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ArtifactKey {
    type Error = KeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<ArtifactKey> for String {
    fn from(key: ArtifactKey) -> Self {
        key.0
    }
}

impl std::str::FromStr for ArtifactKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
