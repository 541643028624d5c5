//! Inline `[IMAGE:...]` placeholders in study text content

use regex::{Captures, Regex};
use std::sync::OnceLock;

/// Matches `[IMAGE:<anything except ]>]`
fn marker_regex() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    MARKER.get_or_init(|| Regex::new(r"\[IMAGE:[^\]]*\]").expect("invalid image marker regex"))
}

/// Result of placing an image into section content
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkerEdit {
    /// The marker at this zero-based position was replaced
    Replaced { index: usize, content: String },
    /// The content had no markers; one was appended
    Appended { content: String },
    /// `markerIndex` pointed past the last marker; content untouched
    IndexOutOfRange { marker_count: usize },
}

impl MarkerEdit {
    /// New content, if anything changed
    pub fn content(&self) -> Option<&str> {
        match self {
            MarkerEdit::Replaced { content, .. } | MarkerEdit::Appended { content } => {
                Some(content.as_str())
            }
            MarkerEdit::IndexOutOfRange { .. } => None,
        }
    }
}

/// Number of markers in `content`
pub fn count_markers(content: &str) -> usize {
    marker_regex().find_iter(content).count()
}

/// Render a marker pointing at `url`
pub fn image_marker(url: &str) -> String {
    format!("[IMAGE:{}]", url)
}

/// Place `url` into `content`.
///
/// Markers are counted left to right from zero. Without `marker_index` only the first marker
/// is replaced; with it only that occurrence is. Every other marker is left byte-for-byte.
/// Content with no markers at all is kept byte-for-byte and gets a new marker appended after
/// a blank line; empty content becomes just the marker.
pub fn place_image(content: &str, url: &str, marker_index: Option<usize>) -> MarkerEdit {
    let marker_count = count_markers(content);
    let marker = image_marker(url);

    if marker_count == 0 {
        let content = if content.is_empty() {
            marker
        } else {
            format!("{}\n\n{}", content, marker)
        };
        return MarkerEdit::Appended { content };
    }

    let wanted = marker_index.unwrap_or(0);
    if wanted >= marker_count {
        return MarkerEdit::IndexOutOfRange { marker_count };
    }

    let mut seen = 0usize;
    let replaced = marker_regex().replace_all(content, |caps: &Captures| {
        let current = seen;
        seen += 1;
        if current == wanted {
            marker.clone()
        } else {
            caps[0].to_string()
        }
    });

    MarkerEdit::Replaced {
        index: wanted,
        content: replaced.into_owned(),
    }
}
