/// Thumbnail codec
/// Image and video sources end in the same resize + JPEG pipeline

mod icon;
mod image;
mod video;

pub use self::icon::{generic_icon, SVG_CONTENT_TYPE};
pub use self::image::{decode_file, encode_thumbnail};
pub use self::video::{FfmpegExtractor, FrameExtractor};

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::ServerConfig;
use crate::error::ThumbnailError;
use crate::types::file_kind::{FileKind, ThumbnailKind};
use crate::types::thumbnail::ThumbnailEntry;

pub const THUMBNAIL_CONTENT_TYPE: &str = "image/jpeg";

#[derive(Debug, Clone)]
pub struct CodecSettings {
    pub max_dimension: u32,
    pub frame_offset: Duration,
    pub extraction_timeout: Duration,
}

impl Default for CodecSettings {
    fn default() -> Self {
        Self {
            max_dimension: 200,
            frame_offset: Duration::from_secs(1),
            extraction_timeout: Duration::from_secs(10),
        }
    }
}

impl From<&ServerConfig> for CodecSettings {
    fn from(config: &ServerConfig) -> Self {
        Self {
            max_dimension: config.thumbnail_max_dimension,
            frame_offset: config.frame_offset,
            extraction_timeout: config.extraction_timeout,
        }
    }
}

#[derive(Clone)]
pub struct ThumbnailCodec {
    settings: CodecSettings,
    extractor: Arc<dyn FrameExtractor>,
}

impl ThumbnailCodec {
    pub fn new(settings: CodecSettings, extractor: Arc<dyn FrameExtractor>) -> Self {
        Self {
            settings,
            extractor,
        }
    }

    /// Build the preview for `source`. Kinds without a pipeline are `UnsupportedFormat`.
    pub async fn generate(
        &self,
        source: &Path,
        kind: FileKind,
    ) -> Result<ThumbnailEntry, ThumbnailError> {
        let Some(kind) = kind.thumbnail_kind() else {
            return Err(ThumbnailError::UnsupportedFormat(format!(
                "no thumbnail pipeline for {:?}",
                kind
            )));
        };

        debug!("[THUMB] generating {:?} thumbnail: {}", kind, source.display());
        let bytes = match kind {
            ThumbnailKind::Image => self.resize_file(source.to_path_buf()).await?,
            ThumbnailKind::Video => self.video_thumbnail(source).await?,
        };
        Ok(ThumbnailEntry::new(bytes, THUMBNAIL_CONTENT_TYPE))
    }

    /// Decode and shrink on the blocking pool.
    async fn resize_file(&self, path: PathBuf) -> Result<Vec<u8>, ThumbnailError> {
        let max_dimension = self.settings.max_dimension;
        tokio::task::spawn_blocking(move || {
            let img = decode_file(&path)?;
            encode_thumbnail(img, max_dimension)
        })
        .await
        .map_err(|e| ThumbnailError::Internal(e.to_string()))?
    }

    async fn video_thumbnail(&self, source: &Path) -> Result<Vec<u8>, ThumbnailError> {
        if !tokio::fs::try_exists(source).await.unwrap_or(false) {
            return Err(ThumbnailError::NotFound(source.to_path_buf()));
        }

        // deleted when `frame` drops, on every path out of this function
        let frame = tempfile::Builder::new()
            .prefix(".thumb-")
            .suffix(".png")
            .tempfile()
            .map_err(|e| ThumbnailError::Io(e.to_string()))?
            .into_temp_path();

        let budget = self.settings.extraction_timeout;
        match tokio::time::timeout(budget, self.extract_into(source, &frame)).await {
            Ok(result) => result?,
            Err(_) => {
                warn!("[VIDEO] extraction timed out after {:?}: {}", budget, source.display());
                return Err(ThumbnailError::ExtractionTimeout(budget));
            }
        }

        let bytes = self.resize_file(frame.to_path_buf()).await;
        drop(frame);
        bytes
    }

    async fn extract_into(&self, source: &Path, frame: &Path) -> Result<(), ThumbnailError> {
        let offset = self.settings.frame_offset;
        self.extractor.extract_frame(source, offset, frame).await?;

        // clips shorter than the offset yield no frame
        if frame_is_empty(frame).await && !offset.is_zero() {
            debug!("[VIDEO] no frame at {:?}, retrying at start: {}", offset, source.display());
            self.extractor
                .extract_frame(source, Duration::ZERO, frame)
                .await?;
        }

        if frame_is_empty(frame).await {
            return Err(ThumbnailError::ExternalToolUnavailable(format!(
                "extractor produced no frame for {}",
                source.display()
            )));
        }
        Ok(())
    }
}

async fn frame_is_empty(frame: &Path) -> bool {
    tokio::fs::metadata(frame)
        .await
        .map(|m| m.len() == 0)
        .unwrap_or(true)
}
