/// Selected-file download
/// One selected file comes back as an attachment, several as a zip archive built in a temp file

use std::collections::HashSet;
use std::io::{Seek, SeekFrom};
use std::path::{Path, PathBuf};

use axum::{
    body::Body,
    extract::{FromRequest, Request},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Form,
};
use serde::Deserialize;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::files::CHUNK_SIZE;
use crate::error::ServeError;
use crate::services::resolve::{resolve, Resolved};
use crate::state::AppState;

const ARCHIVE_NAME: &str = "download.zip";
const ZIP64_THRESHOLD: u64 = 0xFFFF_FFFF;

#[derive(Debug, Deserialize)]
pub struct DownloadForm {
    /// Comma-separated, percent-encoded names relative to the requested directory
    pub files_to_download: String,
}

pub fn selected_names(raw: &str) -> Vec<&str> {
    raw.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .collect()
}

/// `attachment` disposition with an ASCII fallback name and the exact name in `filename*`.
pub fn content_disposition(file_name: &str) -> String {
    let fallback: String = file_name
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c == ' ' || c.is_ascii_graphic() => c,
            _ => '_',
        })
        .collect();
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        urlencoding::encode(file_name)
    )
}

/// Name of `member` inside the archive: its path below `base`, or just its file name.
fn archive_name(base: &Resolved, member: &Resolved) -> Option<String> {
    match member.segments.strip_prefix(base.segments.as_slice()) {
        Some(rest) if !rest.is_empty() => Some(rest.join("/")),
        _ => member.segments.last().cloned(),
    }
}

/// Resolve one selected name below `dir`. Goes through the same root check as any request path.
async fn resolve_selected(root: &Path, dir: &Resolved, name: &str) -> Result<Resolved, ServeError> {
    resolve(root, &format!("{}/{}", dir.url_path(), name)).await
}

pub async fn download_selection(
    state: &AppState,
    target: &Resolved,
    req: Request,
) -> Result<Response, ServeError> {
    let Form(form) = Form::<DownloadForm>::from_request(req, state)
        .await
        .map_err(|e| ServeError::BadRequest(e.body_text()))?;

    let names = selected_names(&form.files_to_download);
    if names.is_empty() {
        return Err(ServeError::BadRequest("no files selected".into()));
    }

    let root = &state.config.root;
    if let [name] = names.as_slice() {
        let selected = resolve_selected(root, target, name).await?;
        if selected.metadata.is_file() {
            return send_attachment(&selected).await;
        }
    }

    let mut members = Vec::new();
    let mut seen = HashSet::new();
    for name in names {
        let selected = match resolve_selected(root, target, name).await {
            Ok(selected) => selected,
            Err(ServeError::Forbidden) => {
                warn!("[DOWNLOAD] skipping {} outside the root", name);
                continue;
            }
            Err(ServeError::NotFound) | Err(ServeError::BadRequest(_)) => {
                debug!("[DOWNLOAD] skipping missing {}", name);
                continue;
            }
            Err(e) => return Err(e),
        };
        if !selected.metadata.is_file() {
            debug!("[DOWNLOAD] skipping non-file {}", selected.path.display());
            continue;
        }
        let Some(entry_name) = archive_name(target, &selected) else {
            continue;
        };
        if seen.insert(entry_name.clone()) {
            members.push((entry_name, selected.path, selected.metadata.len()));
        }
    }

    if members.is_empty() {
        return Err(ServeError::NotFound);
    }
    send_archive(members).await
}

async fn send_attachment(selected: &Resolved) -> Result<Response, ServeError> {
    let file = tokio::fs::File::open(&selected.path).await?;
    let name = selected
        .segments
        .last()
        .map(String::as_str)
        .unwrap_or("download");
    info!("[DOWNLOAD] {}", selected.path.display());

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_DISPOSITION, content_disposition(name))
        .header(header::CONTENT_LENGTH, selected.metadata.len())
        .body(Body::from_stream(ReaderStream::with_capacity(file, CHUNK_SIZE)))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()))
}

async fn send_archive(members: Vec<(String, PathBuf, u64)>) -> Result<Response, ServeError> {
    let count = members.len();
    let archive = tokio::task::spawn_blocking(move || write_archive(&members))
        .await
        .map_err(|e| ServeError::Io(std::io::Error::other(e)))??;
    let len = archive.metadata()?.len();
    info!("[DOWNLOAD] {} file(s) as {} ({} bytes)", count, ARCHIVE_NAME, len);

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/zip")
        .header(header::CONTENT_DISPOSITION, content_disposition(ARCHIVE_NAME))
        .header(header::CONTENT_LENGTH, len)
        .body(Body::from_stream(ReaderStream::with_capacity(
            tokio::fs::File::from_std(archive),
            CHUNK_SIZE,
        )))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()))
}

/// Deflate every member into an unnamed temp file; the OS reclaims it once the response drops it.
fn write_archive(members: &[(String, PathBuf, u64)]) -> Result<std::fs::File, ServeError> {
    let mut zip = ZipWriter::new(tempfile::tempfile()?);
    for (name, path, len) in members {
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .large_file(*len >= ZIP64_THRESHOLD);
        zip.start_file(name.as_str(), options).map_err(zip_error)?;
        let mut source = std::fs::File::open(path)?;
        std::io::copy(&mut source, &mut zip)?;
    }
    let mut file = zip.finish().map_err(zip_error)?;
    file.seek(SeekFrom::Start(0))?;
    Ok(file)
}

fn zip_error(err: zip::result::ZipError) -> ServeError {
    ServeError::Io(std::io::Error::other(err))
}
