/// Directory listing page
/// Directories first, then files by case-insensitive name; paginated; thumbnails lazy-loaded

use std::fmt::Write as _;

use axum::{
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
};
use html_escape::{encode_double_quoted_attribute as attr, encode_text as text};
use tracing::warn;

use crate::error::ServeError;
use crate::services::resolve::{url_path, Resolved};
use crate::state::AppState;
use crate::types::file_kind::FileKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    pub name: String,
    pub kind: FileKind,
    pub size: u64,
}

impl ListingEntry {
    pub fn is_dir(&self) -> bool {
        self.kind == FileKind::Directory
    }
}

/// One page of a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub page: usize,
    pub total_pages: usize,
    pub start: usize,
    pub end: usize,
}

/// Clamp `page` into `1..=total_pages` and compute the slice bounds.
pub fn paginate(total: usize, per_page: usize, page: usize) -> PageWindow {
    let per_page = per_page.max(1);
    let total_pages = total.div_ceil(per_page).max(1);
    let page = page.clamp(1, total_pages);
    let start = (page - 1) * per_page;
    let end = (start + per_page).min(total);
    PageWindow {
        page,
        total_pages,
        start,
        end,
    }
}

pub fn format_size(bytes: u64) -> String {
    let mut size = bytes as f64;
    for unit in ["B", "KB", "MB", "GB"] {
        if size < 1024.0 {
            return trim_decimal(size, unit);
        }
        size /= 1024.0;
    }
    trim_decimal(size, "TB")
}

fn trim_decimal(value: f64, unit: &str) -> String {
    let text = format!("{:.1}", value);
    let text = text.strip_suffix(".0").unwrap_or(&text);
    format!("{} {}", text, unit)
}

pub fn sort_entries(entries: &mut [ListingEntry]) {
    entries.sort_by(|a, b| {
        b.is_dir()
            .cmp(&a.is_dir())
            .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
    });
}

async fn read_entries(target: &Resolved) -> Result<Vec<ListingEntry>, ServeError> {
    let mut dir = tokio::fs::read_dir(&target.path).await?;
    let mut entries = Vec::new();
    while let Some(entry) = dir.next_entry().await? {
        // a lossy name would link to a path that does not exist
        let name = match entry.file_name().into_string() {
            Ok(name) => name,
            Err(raw) => {
                warn!(
                    "[DISPATCH] skipping non UTF-8 name in {}: {:?}",
                    target.path.display(),
                    raw
                );
                continue;
            }
        };
        // follow symlinks; dangling ones are skipped
        let Ok(metadata) = tokio::fs::metadata(entry.path()).await else {
            continue;
        };
        let kind = if metadata.is_dir() {
            FileKind::Directory
        } else {
            FileKind::from_path(&entry.path())
        };
        entries.push(ListingEntry {
            name,
            kind,
            size: metadata.len(),
        });
    }
    sort_entries(&mut entries);
    Ok(entries)
}

pub async fn render_listing(
    state: &AppState,
    target: &Resolved,
    page: usize,
) -> Result<Response, ServeError> {
    let entries = read_entries(target).await?;
    let window = paginate(entries.len(), state.config.items_per_page, page);
    let html = render_page(target, &entries, window);

    Ok((
        StatusCode::OK,
        [(header::CACHE_CONTROL, "no-cache")],
        Html(html),
    )
        .into_response())
}

fn entry_url(target: &Resolved, name: &str) -> String {
    let mut segments = target.segments.clone();
    segments.push(name.to_string());
    url_path(&segments)
}

const STYLE: &str = concat!(
    "body { font-family: sans-serif; margin: 20px; background: #f5f5f5; }\n",
    ".container { display: grid; grid-template-columns: repeat(auto-fill, minmax(160px, 1fr)); gap: 12px; }\n",
    ".item { background: #fff; border-radius: 6px; overflow: hidden; box-shadow: 0 1px 3px rgba(0,0,0,.15); }\n",
    ".item.selected { outline: 3px solid #28a745; }\n",
    ".item a { color: inherit; text-decoration: none; display: block; }\n",
    ".item-header { padding: 4px 6px; font-size: 12px; }\n",
    ".thumbnail { height: 120px; background: #e8e8e8; display: flex; align-items: center; justify-content: center; font-size: 48px; overflow: hidden; }\n",
    ".thumbnail img { width: 100%; height: 100%; object-fit: cover; }\n",
    ".directory .thumbnail { background: #e3f2fd; }\n",
    ".info { padding: 6px 8px; font-size: 12px; word-break: break-all; }\n",
    ".size { color: #777; }\n",
    ".download-section { background: #fff; padding: 12px; border-radius: 6px; margin-bottom: 12px; }\n",
    ".pagination { margin-top: 24px; text-align: center; }\n",
    ".pagination a, .pagination span { margin: 0 4px; }\n",
    ".pagination .current { font-weight: bold; }\n",
    ".pagination .disabled { color: #aaa; }\n",
);

// Checked boxes hold percent-encoded names; the form posts them comma-joined.
const SELECTION_SCRIPT: &str = concat!(
    "<script>\n",
    "function selectedBoxes() { return Array.from(document.querySelectorAll('.file-checkbox:checked')); }\n",
    "function updateSelection() {\n",
    "  const boxes = document.querySelectorAll('.file-checkbox');\n",
    "  boxes.forEach(cb => cb.closest('.item').classList.toggle('selected', cb.checked));\n",
    "  const count = selectedBoxes().length;\n",
    "  document.getElementById('selectedCount').textContent = count + ' selected';\n",
    "  document.getElementById('downloadButton').disabled = count === 0;\n",
    "}\n",
    "function toggleSelectAll(all) {\n",
    "  document.querySelectorAll('.file-checkbox').forEach(cb => { cb.checked = all.checked; });\n",
    "  updateSelection();\n",
    "}\n",
    "function downloadSelected() {\n",
    "  const names = selectedBoxes().map(cb => cb.value);\n",
    "  if (names.length === 0) { return; }\n",
    "  document.getElementById('filesToDownload').value = names.join(',');\n",
    "  document.getElementById('downloadForm').submit();\n",
    "}\n",
    "</script>\n",
);

fn render_page(target: &Resolved, entries: &[ListingEntry], window: PageWindow) -> String {
    let display_path = format!("/{}", target.segments.join("/"));
    let here = target.url_path();
    let mut html = String::with_capacity(8 * 1024);

    let _ = write!(
        html,
        concat!(
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n",
            "<meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n",
            "<title>File Browser - {title}</title>\n<style>\n{style}</style>\n</head>\n<body>\n",
            "<h1>{title}</h1>\n",
            "<form method=\"post\" enctype=\"multipart/form-data\" action=\"{action}\">",
            "<input type=\"file\" name=\"files\" multiple> <button type=\"submit\">Upload</button></form>\n",
            "<div class=\"download-section\" id=\"downloadSection\">",
            "<label><input type=\"checkbox\" id=\"selectAll\" onchange=\"toggleSelectAll(this)\"> <strong>Select All</strong></label> ",
            "<span id=\"selectedCount\">0 selected</span> ",
            "<button type=\"button\" id=\"downloadButton\" onclick=\"downloadSelected()\" disabled>⬇️ Download Selected</button>",
            "<form id=\"downloadForm\" method=\"post\" action=\"{action}\">",
            "<input type=\"hidden\" name=\"files_to_download\" id=\"filesToDownload\"></form>",
            "</div>\n{script}",
            "<div class=\"container\">\n"
        ),
        title = text(&display_path),
        style = STYLE,
        action = attr(&here),
        script = SELECTION_SCRIPT,
    );

    if !target.is_root() {
        let parent = url_path(&target.segments[..target.segments.len() - 1]);
        let _ = writeln!(
            html,
            "<div class=\"item directory\"><a href=\"{}\"><div class=\"thumbnail\">⬆️</div><div class=\"info\">..</div></a></div>",
            attr(&parent)
        );
    }

    for entry in &entries[window.start..window.end] {
        let url = entry_url(target, &entry.name);

        if entry.is_dir() {
            let _ = writeln!(
                html,
                "<div class=\"item directory\"><a href=\"{url}\"><div class=\"thumbnail\">{icon}</div><div class=\"info\">{name}</div></a></div>",
                url = attr(&url),
                icon = FileKind::Directory.emoji(),
                name = text(&entry.name),
            );
            continue;
        }

        let preview = match entry.kind.thumbnail_kind() {
            Some(_) => format!(
                "<img loading=\"lazy\" src=\"{}?thumbnail=1\" alt=\"{}\">",
                attr(&url),
                attr(&entry.name)
            ),
            None => entry.kind.emoji().to_string(),
        };
        let target_attr = if entry.kind.is_viewable() {
            " target=\"_blank\""
        } else {
            ""
        };
        let _ = writeln!(
            html,
            concat!(
                "<div class=\"item\"><div class=\"item-header\">",
                "<input type=\"checkbox\" class=\"file-checkbox\" value=\"{value}\" onchange=\"updateSelection()\"></div>",
                "<a href=\"{url}\"{target_attr}><div class=\"thumbnail\">{preview}</div>",
                "<div class=\"info\">{name}<div class=\"size\">{size}</div></div></a></div>"
            ),
            value = attr(&urlencoding::encode(&entry.name)),
            url = attr(&url),
            target_attr = target_attr,
            preview = preview,
            name = text(&entry.name),
            size = format_size(entry.size),
        );
    }
    html.push_str("</div>\n");

    render_pagination(&mut html, &here, entries.len(), window);
    html.push_str("</body>\n</html>\n");
    html
}

fn render_pagination(html: &mut String, here: &str, total: usize, window: PageWindow) {
    let here = attr(here);
    let shown = window.end - window.start;

    if window.total_pages <= 1 {
        let _ = writeln!(
            html,
            "<div class=\"pagination\">Showing {} item{}</div>",
            total,
            if total == 1 { "" } else { "s" }
        );
        return;
    }

    let page_link = |p: usize, label: &str| format!("<a href=\"{}?page={}\">{}</a>", here, p, label);

    let _ = write!(
        html,
        "<div class=\"pagination\"><div>Page {} of {} • Showing {} of {} items</div>",
        window.page, window.total_pages, shown, total
    );

    if window.page > 1 {
        html.push_str(&page_link(window.page - 1, "← Previous"));
    } else {
        html.push_str("<span class=\"disabled\">← Previous</span>");
    }

    let first = window.page.saturating_sub(2).max(1);
    let last = (window.page + 2).min(window.total_pages);

    if first > 1 {
        html.push_str(&page_link(1, "1"));
        if first > 2 {
            html.push_str("<span>...</span>");
        }
    }
    for p in first..=last {
        if p == window.page {
            let _ = write!(html, "<span class=\"current\">{}</span>", p);
        } else {
            html.push_str(&page_link(p, &p.to_string()));
        }
    }
    if last < window.total_pages {
        if last < window.total_pages - 1 {
            html.push_str("<span>...</span>");
        }
        html.push_str(&page_link(window.total_pages, &window.total_pages.to_string()));
    }

    if window.page < window.total_pages {
        html.push_str(&page_link(window.page + 1, "Next →"));
    } else {
        html.push_str("<span class=\"disabled\">Next →</span>");
    }
    html.push_str("</div>\n");
}
