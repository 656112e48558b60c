/// Request path -> filesystem path
/// Everything served must stay strictly inside the configured root

use std::fs::Metadata;
use std::path::{Component, Path, PathBuf};

use tracing::warn;

use crate::error::ServeError;

/// A request target that exists inside the root.
#[derive(Debug, Clone)]
pub struct Resolved {
    /// Canonical filesystem path
    pub path: PathBuf,
    /// Decoded, normalised URL segments relative to the root
    pub segments: Vec<String>,
    pub metadata: Metadata,
}

impl Resolved {
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Percent-encoded URL path of this target, always starting with `/`.
    pub fn url_path(&self) -> String {
        url_path(&self.segments)
    }
}

pub fn url_path(segments: &[String]) -> String {
    let mut url = String::from("/");
    let encoded: Vec<String> = segments
        .iter()
        .map(|s| urlencoding::encode(s).into_owned())
        .collect();
    url.push_str(&encoded.join("/"));
    url
}

/// Decode a raw URI path and fold `.`/`..` segments.
///
/// A `..` that climbs above the root, or a segment that is not a plain file name, is `Forbidden`.
pub fn normalize_request_path(raw: &str) -> Result<Vec<String>, ServeError> {
    let decoded = urlencoding::decode(raw)
        .map_err(|_| ServeError::BadRequest("path is not valid UTF-8".into()))?;
    if decoded.contains('\0') {
        return Err(ServeError::BadRequest("path contains NUL".into()));
    }

    let mut segments: Vec<String> = Vec::new();
    for segment in decoded.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                if segments.pop().is_none() {
                    return Err(ServeError::Forbidden);
                }
            }
            name => {
                let mut components = Path::new(name).components();
                match (components.next(), components.next()) {
                    (Some(Component::Normal(_)), None) => segments.push(name.to_string()),
                    _ => return Err(ServeError::Forbidden),
                }
            }
        }
    }
    Ok(segments)
}

/// Map a request path onto an existing file or directory under `root`.
///
/// `root` must already be canonical. Symlinks are followed and the final target must still be
/// inside `root`.
pub async fn resolve(root: &Path, raw: &str) -> Result<Resolved, ServeError> {
    let segments = normalize_request_path(raw)?;

    let mut candidate = root.to_path_buf();
    candidate.extend(segments.iter());

    let path = match tokio::fs::canonicalize(&candidate).await {
        Ok(path) => path,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(ServeError::NotFound),
        Err(e) => return Err(e.into()),
    };

    if !path.starts_with(root) {
        warn!(
            "[DISPATCH] blocked escape from root: {} -> {}",
            raw,
            path.display()
        );
        return Err(ServeError::Forbidden);
    }

    let metadata = tokio::fs::metadata(&path).await?;
    Ok(Resolved {
        path,
        segments,
        metadata,
    })
}
