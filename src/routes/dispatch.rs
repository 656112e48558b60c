/// Single entry point for every request
/// Resolves the path inside the root, classifies the request and hands it to the matching handler

use std::collections::HashMap;

use axum::{
    extract::{Query, Request, State},
    http::{header, HeaderMap, Method},
    response::{IntoResponse, Response},
};
use tracing::debug;

use super::{download, files, listing, thumbnails, upload};
use crate::error::ServeError;
use crate::services::resolve::{resolve, Resolved};
use crate::state::AppState;

#[derive(Debug)]
pub enum RequestKind {
    StaticFile(Resolved),
    Thumbnail(Resolved),
    DirectoryListing { target: Resolved, page: usize },
    Upload(Resolved),
    Download(Resolved),
}

impl RequestKind {
    pub fn classify(
        method: &Method,
        target: Resolved,
        query: &HashMap<String, String>,
        headers: &HeaderMap,
    ) -> Result<Self, ServeError> {
        match *method {
            Method::POST => {
                if !target.metadata.is_dir() {
                    return Err(ServeError::BadRequest("POST target must be a directory".into()));
                }
                if is_form_post(headers) {
                    Ok(Self::Download(target))
                } else {
                    Ok(Self::Upload(target))
                }
            }
            Method::GET | Method::HEAD => {
                if target.metadata.is_dir() {
                    Ok(Self::DirectoryListing {
                        page: page_param(query),
                        target,
                    })
                } else if wants_thumbnail(query) {
                    Ok(Self::Thumbnail(target))
                } else {
                    Ok(Self::StaticFile(target))
                }
            }
            _ => Err(ServeError::MethodNotAllowed),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::StaticFile(_) => "file",
            Self::Thumbnail(_) => "thumbnail",
            Self::DirectoryListing { .. } => "listing",
            Self::Upload(_) => "upload",
            Self::Download(_) => "download",
        }
    }
}

/// The selection form posts urlencoded; uploads are multipart.
fn is_form_post(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.trim_start().starts_with("application/x-www-form-urlencoded"))
        .unwrap_or(false)
}

fn wants_thumbnail(query: &HashMap<String, String>) -> bool {
    query
        .get("thumbnail")
        .map(|v| !matches!(v.as_str(), "0" | "false"))
        .unwrap_or(false)
}

/// `?page=N`, anything unparsable or below 1 is page 1.
fn page_param(query: &HashMap<String, String>) -> usize {
    query
        .get("page")
        .and_then(|p| p.parse::<usize>().ok())
        .filter(|p| *p >= 1)
        .unwrap_or(1)
}

pub async fn dispatch(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
    req: Request,
) -> Response {
    match handle(&state, &query, req).await {
        Ok(resp) => resp,
        Err(e) => e.into_response(),
    }
}

async fn handle(
    state: &AppState,
    query: &HashMap<String, String>,
    req: Request,
) -> Result<Response, ServeError> {
    if !matches!(*req.method(), Method::GET | Method::HEAD | Method::POST) {
        return Err(ServeError::MethodNotAllowed);
    }

    let target = resolve(&state.config.root, req.uri().path()).await?;
    let kind = RequestKind::classify(req.method(), target, query, req.headers())?;
    debug!("[DISPATCH] {} {} -> {}", req.method(), req.uri().path(), kind.name());

    match kind {
        RequestKind::StaticFile(target) => files::serve_file(&target, req.headers()).await,
        RequestKind::Thumbnail(target) => {
            Ok(thumbnails::serve_thumbnail(state, &target, req.headers()).await)
        }
        RequestKind::DirectoryListing { target, page } => {
            listing::render_listing(state, &target, page).await
        }
        RequestKind::Upload(target) => upload::accept_upload(state, &target, req).await,
        RequestKind::Download(target) => download::download_selection(state, &target, req).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    async fn target(dir: bool) -> (tempfile::TempDir, Resolved) {
        let tmp = tempfile::tempdir().unwrap();
        let root = std::fs::canonicalize(tmp.path()).unwrap();
        std::fs::create_dir(root.join("dir")).unwrap();
        std::fs::write(root.join("file.jpg"), b"x").unwrap();
        let path = if dir { "/dir" } else { "/file.jpg" };
        let resolved = resolve(&root, path).await.unwrap();
        (tmp, resolved)
    }

    #[tokio::test]
    async fn classifies_by_method_target_and_query() {
        let plain = HeaderMap::new();
        let (_tmp, file) = target(false).await;

        let kind = RequestKind::classify(&Method::GET, file.clone(), &query(&[]), &plain).unwrap();
        assert!(matches!(kind, RequestKind::StaticFile(_)));

        let thumb = query(&[("thumbnail", "1")]);
        let kind = RequestKind::classify(&Method::GET, file.clone(), &thumb, &plain).unwrap();
        assert!(matches!(kind, RequestKind::Thumbnail(_)));

        let no_thumb = query(&[("thumbnail", "0")]);
        let kind = RequestKind::classify(&Method::HEAD, file.clone(), &no_thumb, &plain).unwrap();
        assert!(matches!(kind, RequestKind::StaticFile(_)));

        assert!(matches!(
            RequestKind::classify(&Method::POST, file.clone(), &query(&[]), &plain),
            Err(ServeError::BadRequest(_))
        ));
        assert!(matches!(
            RequestKind::classify(&Method::DELETE, file, &query(&[]), &plain),
            Err(ServeError::MethodNotAllowed)
        ));

        let (_tmp, dir) = target(true).await;
        let page = query(&[("page", "3")]);
        let kind = RequestKind::classify(&Method::GET, dir.clone(), &page, &plain).unwrap();
        assert!(matches!(kind, RequestKind::DirectoryListing { page: 3, .. }));

        let kind = RequestKind::classify(&Method::POST, dir.clone(), &query(&[]), &plain).unwrap();
        assert!(matches!(kind, RequestKind::Upload(_)));

        let mut form = HeaderMap::new();
        form.insert(
            header::CONTENT_TYPE,
            "application/x-www-form-urlencoded".parse().unwrap(),
        );
        let kind = RequestKind::classify(&Method::POST, dir, &query(&[]), &form).unwrap();
        assert!(matches!(kind, RequestKind::Download(_)));
    }

    #[test]
    fn bad_page_numbers_fall_back_to_first_page() {
        assert_eq!(page_param(&query(&[("page", "0")])), 1);
        assert_eq!(page_param(&query(&[("page", "-4")])), 1);
        assert_eq!(page_param(&query(&[("page", "two")])), 1);
        assert_eq!(page_param(&query(&[])), 1);
        assert_eq!(page_param(&query(&[("page", "7")])), 7);
    }
}
