//! File records and content classification
//!
//! A [`FileRecord`] is what the reader produces for every matched path and
//! what plugins receive, inside a [`FileCollection`], at every step.

use serde::Serialize;
use std::path::{Path, PathBuf};

/// Decoded file content.
///
/// Decided once at read time: valid UTF-8 becomes [`Content::Text`], anything
/// else is kept byte-for-byte as [`Content::Binary`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Content {
    /// UTF-8 text
    Text(String),
    /// Raw bytes that are not valid UTF-8
    Binary(Vec<u8>),
}

impl Content {
    /// Classify raw bytes as text or binary without copying them.
    pub fn classify(bytes: Vec<u8>) -> Self {
        match String::from_utf8(bytes) {
            Ok(text) => Self::Text(text),
            Err(err) => Self::Binary(err.into_bytes()),
        }
    }

    /// The text, if this content was decoded as UTF-8
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Binary(_) => None,
        }
    }

    /// The raw bytes, regardless of classification
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Binary(bytes) => bytes,
        }
    }

    /// Whether the content was kept as raw bytes
    pub fn is_binary(&self) -> bool {
        matches!(self, Self::Binary(_))
    }

    /// Length in bytes
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    /// Whether the content is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<&str> for Content {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for Content {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Vec<u8>> for Content {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Binary(bytes)
    }
}

/// One input file and its content
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRecord {
    /// Matched path (absolute when the pattern was absolute)
    pub path: PathBuf,

    /// Content as classified at read time
    pub content: Content,
}

impl FileRecord {
    /// Create a record from a path and content
    pub fn new(path: impl Into<PathBuf>, content: impl Into<Content>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }

    /// Path relative to `root`, or `None` when the record lives outside it
    /// or the relative path climbs out with `..`.
    pub fn relative_to(&self, root: &Path) -> Option<&Path> {
        let rel = self.path.strip_prefix(root).ok()?;
        let escapes = rel
            .components()
            .any(|c| matches!(c, std::path::Component::ParentDir));
        (!escapes).then_some(rel)
    }
}

/// Ordered sequence of file records, in glob match order unless a plugin
/// deliberately reorders it.
pub type FileCollection = Vec<FileRecord>;
