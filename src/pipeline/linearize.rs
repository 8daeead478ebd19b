//! Content linearization: per-page fragments → one ordered text stream.
//!
//! Within a page the order is text, then tables, then image placeholders,
//! each category sorted by its source-order hint. This approximates reading
//! order; the guarantee is only that a page's fragments stay contiguous and
//! precede the next page's.

use crate::model::{Document, Fragment, Page};
use tracing::debug;

/// Marker comment that separates pages. Stripped from fragment content
/// before joining, so it cannot occur anywhere except at a page boundary.
pub const PAGE_BREAK_MARKER: &str = "<!-- docparse:page-break -->";

/// Full separator inserted between consecutive pages.
pub const PAGE_BREAK: &str = "\n\n<!-- docparse:page-break -->\n\n";

/// Separator between fragments of the same page.
const FRAGMENT_SEPARATOR: &str = "\n\n";

/// Flatten a document into a single string.
///
/// A page with no extractable fragments contributes an empty segment.
pub fn linearize(document: &Document) -> String {
    let segments: Vec<String> = document.pages.iter().map(linearize_page).collect();
    debug!("Linearized {} pages", segments.len());
    segments.join(PAGE_BREAK)
}

/// Render one page's fragments in category order.
pub fn linearize_page(page: &Page) -> String {
    let mut texts = Vec::new();
    let mut tables = Vec::new();
    let mut images = Vec::new();
    for fragment in &page.fragments {
        match fragment {
            Fragment::Text { .. } => texts.push(fragment),
            Fragment::Table { .. } => tables.push(fragment),
            Fragment::Image { .. } => images.push(fragment),
        }
    }
    // sort_by_key is stable: equal hints keep reader order
    for group in [&mut texts, &mut tables, &mut images] {
        group.sort_by_key(|f| f.order());
    }

    texts
        .into_iter()
        .chain(tables)
        .chain(images)
        .map(render_fragment)
        .filter(|s| !s.trim().is_empty())
        .collect::<Vec<_>>()
        .join(FRAGMENT_SEPARATOR)
}

fn render_fragment(fragment: &Fragment) -> String {
    match fragment {
        Fragment::Text { text, .. } => sanitize(text).trim_matches('\n').to_string(),
        Fragment::Table { markup, .. } => sanitize(markup).trim().to_string(),
        Fragment::Image { reference, alt, .. } => {
            let reference = sanitize(reference);
            if reference.trim().is_empty() {
                return String::new();
            }
            format!(
                "![{}]({})",
                escape_alt(&sanitize(alt)),
                render_destination(reference.trim())
            )
        }
    }
}

/// Remove every marker, including ones re-formed by removing a nested one.
fn sanitize(s: &str) -> String {
    let mut out = s.replace(PAGE_BREAK_MARKER, "");
    while out.contains(PAGE_BREAK_MARKER) {
        out = out.replace(PAGE_BREAK_MARKER, "");
    }
    out
}

/// A bare destination when the segmenter grammar accepts it as-is, otherwise
/// the `<...>` form with `<`, `>` and line breaks percent-encoded.
fn render_destination(reference: &str) -> String {
    let bare = !reference.contains(|c: char| c.is_whitespace() || matches!(c, '(' | ')' | '<' | '>'));
    if bare {
        return reference.to_string();
    }
    let mut out = String::with_capacity(reference.len() + 2);
    out.push('<');
    for c in reference.chars() {
        match c {
            '<' => out.push_str("%3C"),
            '>' => out.push_str("%3E"),
            '\n' => out.push_str("%0A"),
            '\r' => out.push_str("%0D"),
            c => out.push(c),
        }
    }
    out.push('>');
    out
}

/// Keep alt text on one line and free of brackets so the placeholder grammar
/// still matches it.
fn escape_alt(alt: &str) -> String {
    alt.chars()
        .map(|c| match c {
            '[' | ']' | '\n' | '\r' => ' ',
            c => c,
        })
        .collect::<String>()
        .trim()
        .to_string()
}
