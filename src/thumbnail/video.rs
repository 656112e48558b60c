/// Video frame extraction
/// The external tool sits behind `FrameExtractor` so tests can swap in fakes

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::ThumbnailError;

/// Writes one decodable still image of `source`, taken `at` into the video, to `output`.
///
/// Implementations must not outlive cancellation: dropping the future has to stop the work.
#[async_trait]
pub trait FrameExtractor: Send + Sync {
    async fn extract_frame(
        &self,
        source: &Path,
        at: Duration,
        output: &Path,
    ) -> Result<(), ThumbnailError>;
}

#[derive(Debug, Clone)]
pub struct FfmpegExtractor {
    program: PathBuf,
}

impl FfmpegExtractor {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for FfmpegExtractor {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

#[async_trait]
impl FrameExtractor for FfmpegExtractor {
    async fn extract_frame(
        &self,
        source: &Path,
        at: Duration,
        output: &Path,
    ) -> Result<(), ThumbnailError> {
        debug!(
            "[VIDEO] {} -ss {:.3} -i {}",
            self.program.display(),
            at.as_secs_f64(),
            source.display()
        );

        // kill_on_drop: a timed-out extraction takes the child down with it
        let result = Command::new(&self.program)
            .arg("-nostdin")
            .args(["-loglevel", "error"])
            .arg("-ss")
            .arg(format!("{:.3}", at.as_secs_f64()))
            .arg("-i")
            .arg(source)
            .args(["-frames:v", "1", "-f", "image2", "-y"])
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await;

        let finished = match result {
            Ok(finished) => finished,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ThumbnailError::ExternalToolUnavailable(format!(
                    "{} not found",
                    self.program.display()
                )));
            }
            Err(e) => {
                return Err(ThumbnailError::ExternalToolUnavailable(format!(
                    "failed to start {}: {}",
                    self.program.display(),
                    e
                )));
            }
        };

        if !finished.status.success() {
            let stderr = String::from_utf8_lossy(&finished.stderr);
            debug!("[VIDEO] extractor stderr: {}", stderr.trim());
            return Err(ThumbnailError::ExternalToolUnavailable(format!(
                "{} exited with {}",
                self.program.display(),
                finished.status
            )));
        }

        Ok(())
    }
}
