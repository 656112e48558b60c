use axum::body::Bytes;

use crate::types::file_kind::FileKind;

pub const SVG_CONTENT_TYPE: &str = "image/svg+xml";

// Placeholder when a preview cannot be produced
pub fn generic_icon(kind: FileKind) -> Bytes {
    let (label, fill) = match kind {
        FileKind::Directory => ("DIR", "#90caf9"),
        FileKind::Image => ("IMG", "#a5d6a7"),
        FileKind::Video => ("VID", "#ef9a9a"),
        FileKind::Audio => ("AUD", "#ce93d8"),
        FileKind::Pdf => ("PDF", "#ffab91"),
        FileKind::Text => ("TXT", "#e0e0e0"),
        FileKind::Archive => ("ZIP", "#ffe082"),
        FileKind::Other => ("FILE", "#cfd8dc"),
    };

    Bytes::from(format!(
        concat!(
            r##"<svg xmlns="http://www.w3.org/2000/svg" width="200" height="200" viewBox="0 0 200 200">"##,
            r##"<rect x="30" y="20" width="140" height="160" rx="12" fill="{fill}"/>"##,
            r##"<text x="100" y="112" font-family="sans-serif" font-size="32" "##,
            r##"text-anchor="middle" fill="#37474f">{label}</text></svg>"##
        ),
        fill = fill,
        label = label,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn icons_are_svg_with_a_label() {
        let icon = generic_icon(FileKind::Video);
        let text = std::str::from_utf8(&icon).unwrap();
        assert!(text.starts_with("<svg"));
        assert!(text.contains(">VID<"));
        assert!(text.contains(r##"fill="#37474f""##));
        assert!(text.ends_with("</svg>"));
        assert_ne!(generic_icon(FileKind::Pdf), icon);
    }
}
