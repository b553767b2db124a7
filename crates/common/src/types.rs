use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Key of a single document within a collection.
///
/// Keys are either assigned by the store on insert (push keys) or supplied
/// by the caller, e.g. a formatted sequential id such as `ORD-0001`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentKey(String);

impl DocumentKey {
    /// Creates a key from an existing string.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Generates a new random push key.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for DocumentKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for DocumentKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for DocumentKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Slash-separated location inside the document store.
///
/// ```text
/// orders                  collection
/// orders/-Nx1             document
/// users/-Nx2/role         field inside a document
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentPath {
    segments: Vec<String>,
}

impl DocumentPath {
    /// Parses a path, ignoring empty segments (leading, trailing or doubled slashes).
    pub fn parse(path: &str) -> Self {
        Self {
            segments: path
                .split('/')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    /// Path of a top-level collection.
    pub fn collection(name: impl Into<String>) -> Self {
        Self {
            segments: vec![name.into()],
        }
    }

    /// Path of one document, `None` when `key` is empty or spans several
    /// segments and would address something other than a single document.
    pub fn document(collection: impl Into<String>, key: &str) -> Option<Self> {
        if key.is_empty() || key.contains('/') {
            return None;
        }
        Some(Self {
            segments: vec![collection.into(), key.to_string()],
        })
    }

    /// Returns a new path with `segment` appended.
    pub fn child(&self, segment: impl AsRef<str>) -> Self {
        let mut segments = self.segments.clone();
        segments.extend(
            segment
                .as_ref()
                .split('/')
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        );
        Self { segments }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    pub fn is_collection(&self) -> bool {
        self.segments.len() == 1
    }

    pub fn is_document(&self) -> bool {
        self.segments.len() == 2
    }

    /// Name of the collection this path lives in.
    pub fn collection_name(&self) -> Option<&str> {
        self.segments.first().map(String::as_str)
    }

    /// Field segments below the document, empty for collection and document paths.
    pub fn field_segments(&self) -> &[String] {
        self.segments.get(2..).unwrap_or(&[])
    }
}

impl std::fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.segments.join("/"))
    }
}

impl From<&str> for DocumentPath {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}
