/// Thumbnail cache key and value

use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use axum::body::Bytes;

/// Cache identity of a thumbnail: the canonical source path plus its change detector.
///
/// A modified or resized source produces a different key, so stale thumbnails are never served.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ThumbnailKey {
    path: PathBuf,
    modified: Option<SystemTime>,
    size: u64,
}

impl ThumbnailKey {
    pub fn new(path: impl Into<PathBuf>, modified: Option<SystemTime>, size: u64) -> Self {
        Self {
            path: path.into(),
            modified,
            size,
        }
    }

    pub fn from_metadata(path: impl Into<PathBuf>, metadata: &Metadata) -> Self {
        Self::new(path, metadata.modified().ok(), metadata.len())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn modified(&self) -> Option<SystemTime> {
        self.modified
    }

    /// Whether `self` describes a later version of the same source than `other`.
    pub fn supersedes(&self, other: &ThumbnailKey) -> bool {
        self.path == other.path && self.modified > other.modified
    }

    /// Quoted strong ETag for the rendered preview: the change detector plus the box it was fit into.
    pub fn etag(&self, max_dimension: u32) -> String {
        let source = etag_for(self.modified, self.size);
        format!("{}-t{}\"", source.trim_end_matches('"'), max_dimension)
    }
}

pub fn etag_for(modified: Option<SystemTime>, size: u64) -> String {
    let millis = modified
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis())
        .unwrap_or_default();
    format!("\"{:x}-{:x}\"", millis, size)
}

/// Encoded preview image. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThumbnailEntry {
    pub bytes: Bytes,
    pub content_type: &'static str,
    pub created_at: SystemTime,
}

impl ThumbnailEntry {
    pub fn new(bytes: impl Into<Bytes>, content_type: &'static str) -> Self {
        Self {
            bytes: bytes.into(),
            content_type,
            created_at: SystemTime::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}
