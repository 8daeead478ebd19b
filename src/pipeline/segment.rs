//! Atomic-unit segmentation of the linearized stream.
//!
//! Tables (HTML `<table>` blocks and GFM pipe tables) and Markdown image
//! placeholders become indivisible units; everything between them becomes
//! text units split after each blank-line run. Concatenating the raw text of
//! the returned units reproduces the input exactly.
//!
//! When two candidate spans overlap, the earlier-starting one wins (the longer
//! one on a tie) and the other is discarded, so its remaining characters fall
//! through to plain text.

use crate::model::{ContentUnit, ImagePlaceholder};
use once_cell::sync::Lazy;
use regex::Regex;
use std::cmp::Reverse;
use tracing::debug;

/// `![alt](dest "title")`. `dest` is either `<...>` (may hold spaces and
/// parentheses) or a bare run with at most one level of balanced parentheses.
static RE_IMAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"!\[([^\]\n]*)\]\(\s*(?:<([^<>\n]+)>|((?:[^()\s]|\([^()\s]*\))+))(?:\s+"[^"\n]*")?\s*\)"#,
    )
    .unwrap()
});

static RE_HTML_TABLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<table\b.*?</table\s*>").unwrap());

static RE_PARAGRAPH_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n(?:[ \t]*\n)+").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
enum SpanKind {
    Table,
    Image { alt: String, reference: String },
}

#[derive(Debug, Clone)]
struct Span {
    start: usize,
    end: usize,
    kind: SpanKind,
}

/// Split linearized text into ordered content units.
pub fn segment(text: &str) -> Vec<ContentUnit> {
    let spans = select_spans(find_candidates(text));
    let mut units = Vec::new();
    let mut cursor = 0;

    for span in spans {
        push_text(&text[cursor..span.start], &mut units);
        let raw = &text[span.start..span.end];
        units.push(match span.kind {
            SpanKind::Table => ContentUnit::Table(raw.to_string()),
            SpanKind::Image { alt, reference } => ContentUnit::Image(ImagePlaceholder {
                raw: raw.to_string(),
                alt,
                reference,
            }),
        });
        cursor = span.end;
    }
    push_text(&text[cursor..], &mut units);

    debug!(
        "Segmented {} bytes into {} units ({} atomic)",
        text.len(),
        units.len(),
        units.iter().filter(|u| u.is_atomic()).count()
    );
    units
}

fn find_candidates(text: &str) -> Vec<Span> {
    let mut spans: Vec<Span> = RE_IMAGE
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            Some(Span {
                start: whole.start(),
                end: whole.end(),
                kind: SpanKind::Image {
                    alt: caps[1].trim().to_string(),
                    reference: caps.get(2).or_else(|| caps.get(3))?.as_str().to_string(),
                },
            })
        })
        .collect();

    spans.extend(RE_HTML_TABLE.find_iter(text).map(|m| Span {
        start: m.start(),
        end: m.end(),
        kind: SpanKind::Table,
    }));

    spans.extend(find_pipe_tables(text).into_iter().map(|(start, end)| Span {
        start,
        end,
        kind: SpanKind::Table,
    }));

    spans
}

/// Greedy left-to-right selection of non-overlapping spans.
fn select_spans(mut candidates: Vec<Span>) -> Vec<Span> {
    candidates.sort_by_key(|s| (s.start, Reverse(s.end)));
    let mut selected: Vec<Span> = Vec::with_capacity(candidates.len());
    let mut cursor = 0;
    for span in candidates {
        if span.start >= cursor {
            cursor = span.end;
            selected.push(span);
        } else if span.end > cursor {
            // partial overlap: malformed markup, the tail degrades to text
            debug!(
                "Overlapping {:?} span at {}..{} discarded; tail {}..{} kept as text",
                span.kind, span.start, span.end, cursor, span.end
            );
        }
    }
    selected
}

/// Byte ranges of GFM pipe tables: a header row, a delimiter row, then any
/// number of body rows. The range excludes the final newline.
fn find_pipe_tables(text: &str) -> Vec<(usize, usize)> {
    let mut lines = Vec::new();
    let mut offset = 0;
    for line in text.split('\n') {
        lines.push((offset, line));
        offset += line.len() + 1;
    }

    let mut tables = Vec::new();
    let mut i = 0;
    while i + 1 < lines.len() {
        let (start, header) = lines[i];
        let (_, delimiter) = lines[i + 1];
        if is_table_row(header) && !is_delimiter_row(header) && is_delimiter_row(delimiter) {
            let mut last = i + 1;
            while last + 1 < lines.len() && is_table_row(lines[last + 1].1) {
                last += 1;
            }
            let (last_start, last_line) = lines[last];
            tables.push((start, last_start + last_line.len()));
            i = last + 1;
        } else {
            i += 1;
        }
    }
    tables
}

fn is_table_row(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with('|') && trimmed.ends_with('|') && trimmed.len() > 2
}

fn is_delimiter_row(line: &str) -> bool {
    let trimmed = line.trim();
    is_table_row(trimmed)
        && trimmed.contains('-')
        && trimmed
            .chars()
            .all(|c| c == '|' || c == '-' || c == ':' || c == ' ' || c == '\t')
}

/// Push `text` as paragraph-sized text units, each ending after its
/// blank-line run.
fn push_text(text: &str, units: &mut Vec<ContentUnit>) {
    let mut start = 0;
    for m in RE_PARAGRAPH_BREAK.find_iter(text) {
        units.push(ContentUnit::Text(text[start..m.end()].to_string()));
        start = m.end();
    }
    if start < text.len() {
        units.push(ContentUnit::Text(text[start..].to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::linearize::PAGE_BREAK;

    fn rebuild(units: &[ContentUnit]) -> String {
        units.iter().map(|u| u.raw()).collect()
    }

    fn kinds(units: &[ContentUnit]) -> Vec<&'static str> {
        units
            .iter()
            .map(|u| match u {
                ContentUnit::Text(_) => "text",
                ContentUnit::Table(_) => "table",
                ContentUnit::Image(_) => "image",
            })
            .collect()
    }

    #[test]
    fn empty_input_has_no_units() {
        assert!(segment("").is_empty());
    }

    #[test]
    fn plain_paragraphs_split_at_blank_lines() {
        let input = "first para\nstill first\n\n\nsecond para\n  \nthird";
        let units = segment(input);
        assert_eq!(
            units,
            vec![
                ContentUnit::Text("first para\nstill first\n\n\n".into()),
                ContentUnit::Text("second para\n  \n".into()),
                ContentUnit::Text("third".into()),
            ]
        );
        assert_eq!(rebuild(&units), input);
    }

    #[test]
    fn image_placeholder_is_atomic() {
        let input = "see ![Fig 1](https://x.test/a.png \"title\") here";
        let units = segment(input);
        assert_eq!(kinds(&units), vec!["text", "image", "text"]);
        match &units[1] {
            ContentUnit::Image(p) => {
                assert_eq!(p.alt, "Fig 1");
                assert_eq!(p.reference, "https://x.test/a.png");
                assert_eq!(p.raw, "![Fig 1](https://x.test/a.png \"title\")");
            }
            other => panic!("expected image, got {other:?}"),
        }
        assert_eq!(rebuild(&units), input);
    }

    #[test]
    fn data_uri_reference_is_kept_whole() {
        let input = "![](data:image/png;base64,iVBORw0KGgo=)";
        let units = segment(input);
        assert_eq!(kinds(&units), vec!["image"]);
    }

    #[test]
    fn angle_bracket_destination_allows_spaces() {
        let units = segment("![fig](<my figure (v2).png>)");
        assert_eq!(kinds(&units), vec!["image"]);
        match &units[0] {
            ContentUnit::Image(p) => assert_eq!(p.reference, "my figure (v2).png"),
            other => panic!("expected image, got {other:?}"),
        }
    }

    #[test]
    fn balanced_parentheses_stay_in_reference() {
        let units = segment("x ![](Foo_(bar).png) y");
        assert_eq!(kinds(&units), vec!["text", "image", "text"]);
        match &units[1] {
            ContentUnit::Image(p) => {
                assert_eq!(p.reference, "Foo_(bar).png");
                assert_eq!(p.raw, "![](Foo_(bar).png)");
            }
            other => panic!("expected image, got {other:?}"),
        }
    }

    #[test]
    fn pipe_table_is_atomic_and_excludes_trailing_newline() {
        let input = "intro\n\n| a | b |\n| --- | :-: |\n| 1 | 2 |\n| 3 | 4 |\nafter";
        let units = segment(input);
        assert_eq!(kinds(&units), vec!["text", "table", "text"]);
        assert_eq!(units[1].raw(), "| a | b |\n| --- | :-: |\n| 1 | 2 |\n| 3 | 4 |");
        assert_eq!(units[2].raw(), "\nafter");
        assert_eq!(rebuild(&units), input);
    }

    #[test]
    fn pipe_rows_without_delimiter_are_text() {
        let input = "| a | b |\n| 1 | 2 |";
        assert_eq!(kinds(&segment(input)), vec!["text"]);
    }

    #[test]
    fn html_table_is_atomic_across_blank_lines() {
        let input = "x\n\n<TABLE border=1><tr><td>a</td></tr>\n\n<tr><td>b</td></tr></table>\n\ny";
        let units = segment(input);
        assert_eq!(kinds(&units), vec!["text", "table", "text", "text"]);
        assert!(units[1].raw().starts_with("<TABLE"));
        assert!(units[1].raw().ends_with("</table>"));
        assert_eq!(rebuild(&units), input);
    }

    #[test]
    fn image_inside_table_belongs_to_table() {
        let input = "<table><tr><td>![](a.png)</td></tr></table>";
        let units = segment(input);
        assert_eq!(kinds(&units), vec!["table"]);
    }

    #[test]
    fn partial_overlap_earlier_span_wins() {
        // the image starts first and swallows the opening `<table>` tag
        let input = "![a](<table>x.png) tail</table>";
        let units = segment(input);
        assert_eq!(kinds(&units), vec!["image", "text"]);
        assert_eq!(units[1].raw(), " tail</table>");
        assert_eq!(rebuild(&units), input);
    }

    #[test]
    fn page_break_survives_round_trip() {
        let input = format!("page one{PAGE_BREAK}| h |\n| - |\n| v |{PAGE_BREAK}![](i.png)");
        let units = segment(&input);
        assert_eq!(rebuild(&units), input);
        assert_eq!(units.iter().filter(|u| u.is_atomic()).count(), 2);
    }

    #[test]
    fn multibyte_text_round_trips() {
        let input = "héllo wörld\n\n![ç](ü.png)\n\n日本語のテキスト";
        assert_eq!(rebuild(&segment(input)), input);
    }
}
