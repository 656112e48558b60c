/// File classification
/// Extension-based MIME sniffing decides listing icons and thumbnail eligibility

use std::path::Path;

/// What a path on disk is, as far as the browser UI cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Directory,
    Image,
    Video,
    Audio,
    Pdf,
    Text,
    Archive,
    Other,
}

/// The two codec pipelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThumbnailKind {
    Image,
    Video,
}

impl FileKind {
    /// Classify a regular file by its extension.
    pub fn from_path(path: &Path) -> Self {
        match mime_guess::from_path(path).first_raw() {
            Some(mime) => Self::from_mime(mime),
            None => Self::Other,
        }
    }

    pub fn from_mime(mime: &str) -> Self {
        if mime.starts_with("image/") {
            Self::Image
        } else if mime.starts_with("video/") {
            Self::Video
        } else if mime.starts_with("audio/") {
            Self::Audio
        } else if mime == "application/pdf" {
            Self::Pdf
        } else if mime.starts_with("text/") || mime == "application/json" {
            Self::Text
        } else if mime.contains("zip")
            || mime.contains("archive")
            || mime.contains("rar")
            || mime.contains("tar")
            || mime.contains("7z")
        {
            Self::Archive
        } else {
            Self::Other
        }
    }

    pub fn thumbnail_kind(self) -> Option<ThumbnailKind> {
        match self {
            Self::Image => Some(ThumbnailKind::Image),
            Self::Video => Some(ThumbnailKind::Video),
            Self::Directory | Self::Audio | Self::Pdf | Self::Text | Self::Archive | Self::Other => {
                None
            }
        }
    }

    /// Placeholder glyph used by the directory listing.
    pub fn emoji(self) -> &'static str {
        match self {
            Self::Directory => "📁",
            Self::Image => "🖼️",
            Self::Video => "🎬",
            Self::Audio => "🎵",
            Self::Pdf => "📄",
            Self::Text => "📝",
            Self::Archive => "📦",
            Self::Other => "📁",
        }
    }

    /// Whether a browser shows the file inline rather than downloading it.
    pub fn is_viewable(self) -> bool {
        matches!(
            self,
            Self::Image | Self::Video | Self::Audio | Self::Pdf | Self::Text
        )
    }
}

/// Content type for a response body, `application/octet-stream` when unknown.
pub fn content_type_for(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_raw()
        .map(|mime| {
            if mime.starts_with("text/") {
                format!("{}; charset=utf-8", mime)
            } else {
                mime.to_string()
            }
        })
        .unwrap_or_else(|| "application/octet-stream".to_string())
}
