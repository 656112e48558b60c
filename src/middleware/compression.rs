/// Response compression
/// gzip for textual bodies only; images, video and partial content pass through untouched

use axum::body::HttpBody;
use axum::http::{header, Response, StatusCode};
use tower_http::compression::predicate::{And, Predicate, SizeAbove};
use tower_http::compression::CompressionLayer;

const MIN_COMPRESS_SIZE: u16 = 256;

pub fn is_textual(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    mime.starts_with("text/")
        || matches!(
            mime.as_str(),
            "application/json" | "application/javascript" | "application/xml"
        )
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TextualContent;

impl Predicate for TextualContent {
    fn should_compress<B>(&self, response: &Response<B>) -> bool
    where
        B: HttpBody,
    {
        if response.status() == StatusCode::PARTIAL_CONTENT
            || response.headers().contains_key(header::CONTENT_RANGE)
        {
            return false;
        }
        response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(is_textual)
            .unwrap_or(false)
    }
}

pub fn compression_layer() -> CompressionLayer<And<SizeAbove, TextualContent>> {
    CompressionLayer::new().compress_when(SizeAbove::new(MIN_COMPRESS_SIZE).and(TextualContent))
}
