/// Multipart upload into the requested directory

use std::path::Path;

use axum::{
    extract::{multipart::Field, FromRequest, Multipart, Request},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::error::ServeError;
use crate::services::resolve::Resolved;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct UploadSummary {
    pub uploaded: usize,
    pub files: Vec<String>,
}

/// Keep only the final component of a client-supplied file name.
pub fn sanitize_file_name(raw: &str) -> Option<String> {
    let base = raw.rsplit(['/', '\\']).next()?.trim();
    match base {
        "" | "." | ".." => None,
        name if name.contains('\0') => None,
        name => Some(name.to_string()),
    }
}

pub async fn accept_upload(
    state: &AppState,
    target: &Resolved,
    req: Request,
) -> Result<Response, ServeError> {
    let mut multipart = Multipart::from_request(req, state)
        .await
        .map_err(|e| ServeError::BadRequest(e.body_text()))?;

    let mut files = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServeError::BadRequest(e.body_text()))?
    {
        let Some(name) = field.file_name().and_then(sanitize_file_name) else {
            continue;
        };

        let dest = target.path.join(&name);
        // never write through a link that could point outside the root
        if let Ok(existing) = tokio::fs::symlink_metadata(&dest).await {
            if existing.file_type().is_symlink() || existing.is_dir() {
                warn!("[UPLOAD] refusing to overwrite {}", dest.display());
                return Err(ServeError::Forbidden);
            }
        }

        let written = write_field(field, &target.path, &dest).await?;
        state.cache.invalidate_path(&dest);
        info!("[UPLOAD] {} ({} bytes)", dest.display(), written);
        files.push(name);
    }

    Ok(Json(UploadSummary {
        uploaded: files.len(),
        files,
    })
    .into_response())
}

/// Stream one part to disk chunk by chunk.
///
/// The part lands in a hidden temp file next to `dest` and is renamed over it only once complete;
/// an aborted upload leaves neither a partial file nor a clobbered original.
async fn write_field(mut field: Field<'_>, dir: &Path, dest: &Path) -> Result<u64, ServeError> {
    let (file, temp_path) = tempfile::Builder::new()
        .prefix(".upload-")
        .tempfile_in(dir)?
        .into_parts();
    let mut file = tokio::fs::File::from_std(file);

    let mut written = 0u64;
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| ServeError::BadRequest(e.body_text()))?
    {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    drop(file);

    temp_path.persist(dest).map_err(|e| ServeError::Io(e.error))?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_directories_from_file_names() {
        assert_eq!(sanitize_file_name("photo.jpg").as_deref(), Some("photo.jpg"));
        assert_eq!(sanitize_file_name("../../etc/passwd").as_deref(), Some("passwd"));
        assert_eq!(sanitize_file_name("C:\\Users\\me\\pic.png").as_deref(), Some("pic.png"));
        assert_eq!(sanitize_file_name("dir/"), None);
        assert_eq!(sanitize_file_name(".."), None);
        assert_eq!(sanitize_file_name(""), None);
    }
}
