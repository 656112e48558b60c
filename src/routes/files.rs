/// Raw file responses
/// ETag/304, single byte ranges for video seeking, 64 KiB streamed chunks

use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use http_range::{HttpRange, HttpRangeParseError};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, SeekFrom};
use tokio_util::io::ReaderStream;
use tracing::debug;

use super::{if_none_match, not_modified, CACHE_ONE_DAY};
use crate::error::ServeError;
use crate::services::resolve::Resolved;
use crate::types::file_kind::content_type_for;
use crate::types::thumbnail::etag_for;

pub(super) const CHUNK_SIZE: usize = 65536;

pub async fn serve_file(target: &Resolved, headers: &HeaderMap) -> Result<Response, ServeError> {
    let len = target.metadata.len();
    let etag = etag_for(target.metadata.modified().ok(), len);

    if if_none_match(headers, &etag) {
        return Ok(not_modified(&etag));
    }

    let mut file = File::open(&target.path).await?;
    let resp = Response::builder()
        .header(header::CONTENT_TYPE, content_type_for(&target.path))
        .header(header::ETAG, &etag)
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::CACHE_CONTROL, CACHE_ONE_DAY);

    // A stale If-Range means the client gets the whole current file instead
    let range_applies = headers
        .get(header::IF_RANGE)
        .map(|v| v.as_bytes() == etag.as_bytes())
        .unwrap_or(true);

    if let (Some(range), true) = (headers.get(header::RANGE), range_applies && len > 0) {
        let parsed = range
            .to_str()
            .map_err(|_| HttpRangeParseError::InvalidRange)
            .and_then(|r| HttpRange::parse(r, len));

        match parsed.as_deref() {
            Ok([range]) => {
                let end = range.start + range.length - 1;
                debug!(
                    "[FILE] range {}-{}/{}: {}",
                    range.start,
                    end,
                    len,
                    target.path.display()
                );
                file.seek(SeekFrom::Start(range.start)).await?;
                return Ok(resp
                    .status(StatusCode::PARTIAL_CONTENT)
                    .header(
                        header::CONTENT_RANGE,
                        format!("bytes {}-{}/{}", range.start, end, len),
                    )
                    .header(header::CONTENT_LENGTH, range.length)
                    .body(Body::from_stream(ReaderStream::with_capacity(
                        file.take(range.length),
                        CHUNK_SIZE,
                    )))
                    .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()));
            }
            // syntactically broken ranges are ignored
            Err(HttpRangeParseError::InvalidRange) => {}
            // multi-range or no overlap
            Ok(_) | Err(HttpRangeParseError::NoOverlap) => {
                return Ok(range_not_satisfiable(len));
            }
        }
    }

    Ok(resp
        .status(StatusCode::OK)
        .header(header::CONTENT_LENGTH, len)
        .body(Body::from_stream(ReaderStream::with_capacity(file, CHUNK_SIZE)))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()))
}

fn range_not_satisfiable(len: u64) -> Response {
    let content_range = HeaderValue::from_str(&format!("bytes */{}", len))
        .unwrap_or_else(|_| HeaderValue::from_static("bytes */*"));
    Response::builder()
        .status(StatusCode::RANGE_NOT_SATISFIABLE)
        .header(header::CONTENT_RANGE, content_range)
        .body(Body::empty())
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
