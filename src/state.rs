use std::sync::Arc;

use crate::cache::thumbnail::ThumbnailCache;
use crate::config::ServerConfig;
use crate::thumbnail::{CodecSettings, FfmpegExtractor, FrameExtractor, ThumbnailCodec};

/// Shared by every connection: configuration, the thumbnail cache and the codec in front of it.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub cache: ThumbnailCache,
    pub codec: ThumbnailCodec,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        let extractor = Arc::new(FfmpegExtractor::new(config.ffmpeg_path.clone()));
        Self::with_extractor(config, extractor)
    }

    pub fn with_extractor(config: ServerConfig, extractor: Arc<dyn FrameExtractor>) -> Self {
        let codec = ThumbnailCodec::new(CodecSettings::from(&config), extractor);
        Self {
            cache: ThumbnailCache::new(config.cache_capacity),
            codec,
            config: Arc::new(config),
        }
    }
}
