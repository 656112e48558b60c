/// Thumbnail responses
/// Cache in front of the codec; failures degrade to a generic icon instead of breaking the page

use axum::{
    body::Body,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::{debug, error, warn};

use super::{if_none_match, not_modified, CACHE_ONE_DAY};
use crate::error::ThumbnailError;
use crate::services::resolve::Resolved;
use crate::state::AppState;
use crate::thumbnail::{generic_icon, SVG_CONTENT_TYPE};
use crate::types::file_kind::FileKind;
use crate::types::thumbnail::ThumbnailKey;

const ICON_CACHE: &str = "public, max-age=3600";
const NO_CACHE: &str = "no-cache";

pub async fn serve_thumbnail(state: &AppState, target: &Resolved, headers: &HeaderMap) -> Response {
    let kind = FileKind::from_path(&target.path);
    if kind.thumbnail_kind().is_none() {
        return icon_response(kind, StatusCode::OK, ICON_CACHE);
    }

    let key = ThumbnailKey::from_metadata(&target.path, &target.metadata);
    let etag = key.etag(state.config.thumbnail_max_dimension);
    if if_none_match(headers, &etag) {
        debug!("[THUMB] not modified: {}", target.path.display());
        return not_modified(&etag);
    }

    let codec = state.codec.clone();
    let path = target.path.clone();
    let result = state
        .cache
        .get_or_create(key, move || async move { codec.generate(&path, kind).await })
        .await;

    match result {
        Ok(entry) => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, entry.content_type)
            .header(header::CONTENT_LENGTH, entry.len())
            .header(header::ETAG, &etag)
            .header(header::CACHE_CONTROL, CACHE_ONE_DAY)
            .body(Body::from(entry.bytes.clone()))
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()),
        Err(ThumbnailError::UnsupportedFormat(reason)) => {
            debug!("[THUMB] unsupported {}: {}", target.path.display(), reason);
            icon_response(kind, StatusCode::OK, ICON_CACHE)
        }
        Err(ThumbnailError::NotFound(_)) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            if e.is_transient() {
                warn!("[THUMB] {} failed: {}", target.path.display(), e);
            } else {
                error!("[THUMB] {} failed: {}", target.path.display(), e);
            }
            icon_response(kind, StatusCode::BAD_GATEWAY, NO_CACHE)
        }
    }
}

fn icon_response(kind: FileKind, status: StatusCode, cache_control: &'static str) -> Response {
    let icon = generic_icon(kind);
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, SVG_CONTENT_TYPE)
        .header(header::CONTENT_LENGTH, icon.len())
        .header(header::CACHE_CONTROL, cache_control)
        .body(Body::from(icon))
        .unwrap_or_else(|_| status.into_response())
}
