/// Connection acceptor
/// `axum::serve` runs every accepted connection on its own tokio task, so a slow thumbnail on one
/// connection never holds up another

use std::future::Future;

use axum::{extract::DefaultBodyLimit, Router};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::middleware::compression::compression_layer;
use crate::routes::dispatch::dispatch;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let upload_limit = state.config.max_upload_bytes;

    Router::new()
        .fallback(dispatch)
        .layer(DefaultBodyLimit::max(upload_limit))
        .layer(compression_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

/// Resolves on Ctrl+C, or SIGTERM on unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("✋ shutting down");
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use http_body_util::BodyExt;
    use image::{ImageFormat, Rgb, RgbImage};
    use tower::ServiceExt;

    use super::*;
    use crate::config::ServerConfig;
    use crate::error::ThumbnailError;
    use crate::thumbnail::FrameExtractor;

    struct BrokenExtractor;

    #[async_trait]
    impl FrameExtractor for BrokenExtractor {
        async fn extract_frame(
            &self,
            _source: &Path,
            _at: Duration,
            _output: &Path,
        ) -> Result<(), ThumbnailError> {
            Err(ThumbnailError::ExternalToolUnavailable("ffmpeg exited with 1".into()))
        }
    }

    fn fixture() -> (tempfile::TempDir, PathBuf) {
        let tmp = tempfile::tempdir().unwrap();
        let root = std::fs::canonicalize(tmp.path()).unwrap();
        std::fs::create_dir(root.join("photos")).unwrap();
        RgbImage::from_fn(400, 300, |x, y| Rgb([x as u8, y as u8, 64]))
            .save_with_format(root.join("photos/cat.png"), ImageFormat::Png)
            .unwrap();
        std::fs::write(root.join("notes.txt"), "hello ".repeat(200)).unwrap();
        std::fs::write(root.join("clip.mp4"), b"not really a video").unwrap();
        (tmp, root)
    }

    fn router(root: PathBuf) -> (Router, AppState) {
        router_with(ServerConfig {
            root,
            ..ServerConfig::default()
        })
    }

    fn router_with(config: ServerConfig) -> (Router, AppState) {
        let state = AppState::with_extractor(config, Arc::new(BrokenExtractor));
        (build_router(state.clone()), state)
    }

    fn download(uri: &str, names: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(format!(
                "files_to_download={}",
                urlencoding::encode(names)
            )))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body(resp: axum::response::Response) -> Vec<u8> {
        resp.into_body().collect().await.unwrap().to_bytes().to_vec()
    }

    #[tokio::test]
    async fn traversal_is_forbidden() {
        let (_tmp, root) = fixture();
        let (app, _) = router(root);

        for uri in ["/../etc/passwd", "/%2e%2e/%2e%2e/etc/passwd", "/photos/..%2f..%2fsecret"] {
            let resp = app.clone().oneshot(get(uri)).await.unwrap();
            assert_eq!(resp.status(), StatusCode::FORBIDDEN, "{uri}");
        }

        let resp = app.oneshot(get("/missing.jpg")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unknown_methods_are_rejected() {
        let (_tmp, root) = fixture();
        let (app, _) = router(root);
        let req = Request::builder()
            .method("DELETE")
            .uri("/notes.txt")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn image_thumbnail_is_cached_and_revalidated() {
        let (_tmp, root) = fixture();
        let (app, state) = router(root);

        let resp = app
            .clone()
            .oneshot(get("/photos/cat.png?thumbnail=1"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "image/jpeg");
        assert_eq!(resp.headers()[header::CACHE_CONTROL], "public, max-age=86400");
        let etag = resp.headers()[header::ETAG].clone();
        let first = body(resp).await;
        assert_eq!(state.cache.len(), 1);

        let resp = app
            .clone()
            .oneshot(get("/photos/cat.png?thumbnail=1"))
            .await
            .unwrap();
        assert_eq!(body(resp).await, first);
        assert_eq!(state.cache.len(), 1);

        let req = Request::builder()
            .uri("/photos/cat.png?thumbnail=1")
            .header(header::IF_NONE_MATCH, etag)
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_MODIFIED);
        assert!(body(resp).await.is_empty());
    }

    #[tokio::test]
    async fn unsupported_thumbnail_falls_back_to_icon() {
        let (_tmp, root) = fixture();
        let (app, state) = router(root);

        let resp = app.oneshot(get("/notes.txt?thumbnail=1")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "image/svg+xml");
        assert!(state.cache.is_empty());
    }

    #[tokio::test]
    async fn extractor_failure_is_bad_gateway_with_icon() {
        let (_tmp, root) = fixture();
        let (app, state) = router(root);

        let resp = app.oneshot(get("/clip.mp4?thumbnail=1")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "image/svg+xml");
        assert_eq!(resp.headers()[header::CACHE_CONTROL], "no-cache");
        assert!(state.cache.is_empty());
    }

    #[tokio::test]
    async fn text_is_gzipped_but_thumbnails_are_not() {
        let (_tmp, root) = fixture();
        let (app, _) = router(root);

        for uri in ["/notes.txt", "/", "/photos"] {
            let req = Request::builder()
                .uri(uri)
                .header(header::ACCEPT_ENCODING, "gzip")
                .body(Body::empty())
                .unwrap();
            let resp = app.clone().oneshot(req).await.unwrap();
            assert_eq!(resp.status(), StatusCode::OK, "{uri}");
            assert_eq!(resp.headers()[header::CONTENT_ENCODING], "gzip", "{uri}");
        }

        let req = Request::builder()
            .uri("/photos/cat.png?thumbnail=1")
            .header(header::ACCEPT_ENCODING, "gzip")
            .body(Body::empty())
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert!(!resp.headers().contains_key(header::CONTENT_ENCODING));

        let req = Request::builder()
            .uri("/notes.txt")
            .header(header::ACCEPT_ENCODING, "gzip")
            .header(header::RANGE, "bytes=0-9")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::PARTIAL_CONTENT);
        assert!(!resp.headers().contains_key(header::CONTENT_ENCODING));
        assert_eq!(body(resp).await, b"hello hell");
    }

    #[tokio::test]
    async fn listing_links_thumbnails_and_paginates() {
        let (_tmp, root) = fixture();
        for i in 0..60 {
            std::fs::write(root.join(format!("file{i:02}.txt")), b"x").unwrap();
        }
        let (app, _) = router(root);

        let resp = app.clone().oneshot(get("/photos")).await.unwrap();
        assert_eq!(resp.headers()[header::CACHE_CONTROL], "no-cache");
        let html = String::from_utf8(body(resp).await).unwrap();
        assert!(html.contains("/photos/cat.png?thumbnail=1"));
        assert!(html.contains("href=\"/\""));

        let resp = app.oneshot(get("/?page=2")).await.unwrap();
        let html = String::from_utf8(body(resp).await).unwrap();
        assert!(html.contains("Page 2 of 2"));
        assert!(html.contains("file59.txt"));
        assert!(!html.contains("file00.txt"));
    }

    #[tokio::test]
    async fn upload_writes_into_directory() {
        let (_tmp, root) = fixture();
        let (app, _) = router(root.clone());

        let boundary = "XBOUNDARYX";
        let payload = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"files\"; filename=\"../new.txt\"\r\n\
             Content-Type: text/plain\r\n\r\nuploaded body\r\n--{b}--\r\n",
            b = boundary
        );
        let req = Request::builder()
            .method("POST")
            .uri("/photos")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", boundary),
            )
            .body(Body::from(payload))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let json: serde_json::Value = serde_json::from_slice(&body(resp).await).unwrap();
        assert_eq!(json["uploaded"], 1);
        assert_eq!(json["files"][0], "new.txt");
        assert_eq!(
            std::fs::read_to_string(root.join("photos/new.txt")).unwrap(),
            "uploaded body"
        );
        assert!(!root.join("new.txt").exists());
    }

    #[tokio::test]
    async fn single_selected_file_downloads_as_attachment() {
        let (_tmp, root) = fixture();
        let (app, _) = router(root);

        let resp = app.oneshot(download("/photos", "cat.png")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/octet-stream");
        assert!(resp.headers()[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .starts_with("attachment; filename=\"cat.png\""));
        let bytes = body(resp).await;
        assert!(image::load_from_memory(&bytes).is_ok());
    }

    #[tokio::test]
    async fn several_selected_files_download_as_zip() {
        use std::io::Read;

        let (_tmp, root) = fixture();
        let (app, _) = router(root);

        let resp = app
            .oneshot(download(
                "/",
                "notes.txt,photos%2Fcat.png,..%2F..%2Fetc%2Fpasswd,missing.txt,photos",
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/zip");
        assert!(resp.headers()[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .contains("download.zip"));

        let bytes = body(resp).await;
        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).unwrap();
        let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
        names.sort();
        assert_eq!(names, ["notes.txt", "photos/cat.png"]);

        let mut notes = String::new();
        archive
            .by_name("notes.txt")
            .unwrap()
            .read_to_string(&mut notes)
            .unwrap();
        assert_eq!(notes, "hello ".repeat(200));
    }

    #[tokio::test]
    async fn selected_file_outside_root_is_forbidden() {
        let (_tmp, root) = fixture();
        let (app, _) = router(root);

        let resp = app
            .clone()
            .oneshot(download("/photos", "..%2F..%2F..%2Fetc%2Fpasswd"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let resp = app.oneshot(download("/photos", " , ")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn truncated_upload_leaves_nothing_behind() {
        let (_tmp, root) = fixture();
        let (app, _) = router(root.clone());

        let boundary = "XBOUNDARYX";
        let payload = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"files\"; filename=\"broken.txt\"\r\n\
             Content-Type: text/plain\r\n\r\nhalf of the body",
            b = boundary
        );
        let req = Request::builder()
            .method("POST")
            .uri("/photos")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", boundary),
            )
            .body(Body::from(payload))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let left: Vec<String> = std::fs::read_dir(root.join("photos"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(left, ["cat.png"]);
    }

    #[tokio::test]
    async fn thumbnail_etag_changes_with_box_size() {
        let (_tmp, root) = fixture();
        let (small, _) = router(root.clone());

        let resp = small
            .oneshot(get("/photos/cat.png?thumbnail=1"))
            .await
            .unwrap();
        let etag = resp.headers()[header::ETAG].clone();

        let (large, _) = router_with(ServerConfig {
            root,
            thumbnail_max_dimension: 320,
            ..ServerConfig::default()
        });
        let req = Request::builder()
            .uri("/photos/cat.png?thumbnail=1")
            .header(header::IF_NONE_MATCH, etag.clone())
            .body(Body::empty())
            .unwrap();
        let resp = large.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_ne!(resp.headers()[header::ETAG], etag);

        let thumb = image::load_from_memory(&body(resp).await).unwrap();
        assert_eq!((thumb.width(), thumb.height()), (320, 240));
    }
}
