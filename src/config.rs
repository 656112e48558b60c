/// Server configuration
/// Environment variables first, then the positional `[folder] [port] [bind_address]` arguments

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Directory tree being served
    pub root: PathBuf,
    /// Listen port
    pub port: u16,
    /// Listen address
    pub host: String,
    /// Maximum number of resident thumbnails
    pub cache_capacity: usize,
    /// Longest side of a generated thumbnail, in pixels
    pub thumbnail_max_dimension: u32,
    /// Directory listing page size
    pub items_per_page: usize,
    /// Frame extraction binary
    pub ffmpeg_path: PathBuf,
    /// Where in the video the preview frame is taken
    pub frame_offset: Duration,
    /// Wall-clock budget for one frame extraction
    pub extraction_timeout: Duration,
    /// Upload request body limit
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            port: 4098,
            host: "0.0.0.0".into(),
            cache_capacity: 500,
            thumbnail_max_dimension: 200,
            items_per_page: 50,
            ffmpeg_path: PathBuf::from("ffmpeg"),
            frame_offset: Duration::from_secs(1),
            extraction_timeout: Duration::from_secs(10),
            max_upload_bytes: 512 * 1024 * 1024,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            root: std::env::var("SERVE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.root),
            port: env_parse("PORT").unwrap_or(defaults.port),
            host: std::env::var("BIND_ADDRESS").unwrap_or(defaults.host),
            cache_capacity: env_parse("THUMB_CACHE_SIZE").unwrap_or(defaults.cache_capacity),
            thumbnail_max_dimension: env_parse("THUMB_MAX_DIMENSION")
                .unwrap_or(defaults.thumbnail_max_dimension),
            items_per_page: env_parse("ITEMS_PER_PAGE").unwrap_or(defaults.items_per_page),
            ffmpeg_path: std::env::var("FFMPEG_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.ffmpeg_path),
            frame_offset: env_parse("VIDEO_FRAME_OFFSET_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.frame_offset),
            extraction_timeout: env_parse("EXTRACTION_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.extraction_timeout),
            max_upload_bytes: env_parse("MAX_UPLOAD_BYTES").unwrap_or(defaults.max_upload_bytes),
        }
    }

    /// Overlay positional arguments (program name already stripped).
    ///
    /// A lone numeric first argument is the port: `thumbserve 8000`.
    pub fn with_args<I>(mut self, args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = String>,
    {
        let args: Vec<String> = args.into_iter().collect();
        let mut rest = args.iter();

        if let Some(first) = rest.next() {
            if first.chars().all(|c| c.is_ascii_digit()) {
                self.port = parse_port(first)?;
            } else {
                self.root = PathBuf::from(first);
                if let Some(port) = rest.next() {
                    self.port = parse_port(port)?;
                }
            }
        }
        if let Some(host) = rest.next() {
            self.host = host.clone();
        }
        Ok(self)
    }

    /// Canonicalise the root and make sure it is a directory.
    pub fn validate(mut self) -> Result<Self, ConfigError> {
        let root = std::fs::canonicalize(&self.root)
            .map_err(|_| ConfigError::RootMissing(self.root.clone()))?;
        if !root.is_dir() {
            return Err(ConfigError::RootNotDirectory(root));
        }
        if self.cache_capacity == 0 {
            return Err(ConfigError::Invalid("THUMB_CACHE_SIZE must be at least 1".into()));
        }
        if self.items_per_page == 0 {
            return Err(ConfigError::Invalid("ITEMS_PER_PAGE must be at least 1".into()));
        }
        self.root = root;
        Ok(self)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_port(value: &str) -> Result<u16, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("invalid port: {}", value)))
}
