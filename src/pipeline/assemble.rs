//! Chunk assembly: greedy packing of content units into bounded chunks.
//!
//! One pass over the unit list. A unit that does not fit closes the current
//! chunk and the next chunk starts with the trailing `chunk_overlap` chars of
//! the closed one. Text is split only when it cannot fit even a fresh chunk,
//! at the last whitespace inside the budget. Atomic units are never split; one
//! longer than `chunk_size` gets a chunk of its own.
//!
//! Every chunk's `content` equals `linearized[start_offset..end_offset]`.

use crate::model::{Chunk, ContentUnit};
use tracing::debug;

/// Pack `units` into chunks of at most `chunk_size` chars.
///
/// Expects `chunk_overlap < chunk_size` (enforced by the config builder);
/// a larger overlap is clamped to `chunk_size - 1`.
pub fn assemble(units: &[ContentUnit], chunk_size: usize, chunk_overlap: usize) -> Vec<Chunk> {
    let chunk_size = chunk_size.max(1);
    let mut acc = Accumulator::new(chunk_size, chunk_overlap.min(chunk_size - 1));
    for unit in units {
        match unit {
            ContentUnit::Text(text) => acc.push_text(text),
            atomic => acc.push_atomic(atomic),
        }
    }
    acc.close();
    debug!(
        "Assembled {} units into {} chunks (size={}, overlap={})",
        units.len(),
        acc.chunks.len(),
        chunk_size,
        chunk_overlap
    );
    acc.chunks
}

struct Accumulator {
    chunk_size: usize,
    chunk_overlap: usize,
    /// Overlap copy seeding the open chunk.
    seed: String,
    /// Units newly placed in the open chunk.
    units: Vec<ContentUnit>,
    /// Open chunk length in chars, seed included.
    len: usize,
    /// Byte offset where the open chunk starts.
    start: usize,
    /// Byte offset just past the last placed unit.
    cursor: usize,
    chunks: Vec<Chunk>,
}

impl Accumulator {
    fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
            seed: String::new(),
            units: Vec::new(),
            len: 0,
            start: 0,
            cursor: 0,
            chunks: Vec::new(),
        }
    }

    fn budget(&self) -> usize {
        self.chunk_size.saturating_sub(self.len)
    }

    fn push_atomic(&mut self, unit: &ContentUnit) {
        let n = unit.char_len();
        if n > self.budget() && !self.units.is_empty() {
            self.close();
        }
        if n > self.budget() && !self.seed.is_empty() {
            self.drop_seed();
        }
        self.place(unit.clone(), n);
    }

    fn push_text(&mut self, text: &str) {
        let mut rest = text;
        while !rest.is_empty() {
            let n = rest.chars().count();
            if n <= self.budget() {
                self.place(ContentUnit::Text(rest.to_string()), n);
                return;
            }
            if !self.units.is_empty() {
                self.close();
                continue;
            }
            // Fresh chunk and it still does not fit: split. The budget is at
            // least 1 here because the seed is shorter than chunk_size.
            let budget = self.budget().max(1);
            let at = whitespace_split(rest, budget).unwrap_or_else(|| char_split(rest, budget));
            let (head, tail) = rest.split_at(at);
            self.place(ContentUnit::Text(head.to_string()), head.chars().count());
            self.close();
            rest = tail;
        }
    }

    fn place(&mut self, unit: ContentUnit, char_len: usize) {
        self.cursor += unit.raw().len();
        self.len += char_len;
        self.units.push(unit);
    }

    fn drop_seed(&mut self) {
        self.start += self.seed.len();
        self.len = 0;
        self.seed.clear();
    }

    /// Emit the open chunk (if it holds any new unit) and seed the next one.
    fn close(&mut self) {
        if self.units.is_empty() {
            return;
        }
        let units = std::mem::take(&mut self.units);
        let mut content = std::mem::take(&mut self.seed);
        let overlap_len = content.chars().count();

        // start of the trailing text run: just past the last atomic unit
        let mut run_start = 0;
        for unit in &units {
            content.push_str(unit.raw());
            if unit.is_atomic() {
                run_start = content.len();
            }
        }

        let seed = last_chars(&content[run_start..], self.chunk_overlap).to_string();
        self.chunks.push(Chunk {
            seq: self.chunks.len(),
            content,
            start_offset: self.start,
            end_offset: self.cursor,
            overlap_len,
            units,
            images: Vec::new(),
        });

        self.start = self.cursor - seed.len();
        self.len = seed.chars().count();
        self.seed = seed;
    }
}

/// The last `n` chars of `s`.
fn last_chars(s: &str, n: usize) -> &str {
    if n == 0 {
        return "";
    }
    match s.char_indices().rev().nth(n - 1) {
        Some((i, _)) => &s[i..],
        None => s,
    }
}

/// Largest byte index just after a whitespace char such that the head holds
/// at most `budget` chars. `None` when the first word is already too long.
fn whitespace_split(s: &str, budget: usize) -> Option<usize> {
    let mut best = None;
    for (count, (i, c)) in s.char_indices().enumerate() {
        if count >= budget {
            break;
        }
        if c.is_whitespace() {
            best = Some(i + c.len_utf8());
        }
    }
    best
}

/// Byte index of the `budget`-th char.
fn char_split(s: &str, budget: usize) -> usize {
    s.char_indices().nth(budget).map(|(i, _)| i).unwrap_or(s.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ImagePlaceholder;
    use crate::pipeline::segment::segment;

    fn text(s: &str) -> ContentUnit {
        ContentUnit::Text(s.into())
    }

    fn image(reference: &str) -> ContentUnit {
        ContentUnit::Image(ImagePlaceholder {
            raw: format!("![]({reference})"),
            alt: String::new(),
            reference: reference.into(),
        })
    }

    fn is_pure_text(chunk: &Chunk) -> bool {
        chunk.units.iter().all(|u| !u.is_atomic())
    }

    fn check_invariants(source: &str, chunks: &[Chunk], size: usize) {
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.seq, i, "sequence numbers must run 0..N-1");
            assert_eq!(&source[c.start_offset..c.end_offset], c.content);
            if is_pure_text(c) {
                assert!(c.content.chars().count() <= size, "chunk {i} too long");
            }
        }
        let rebuilt: String = chunks
            .iter()
            .flat_map(|c| c.units.iter().map(|u| u.raw()))
            .collect();
        assert_eq!(rebuilt, source, "new units must rebuild the source in order");
    }

    #[test]
    fn zero_units_zero_chunks() {
        assert!(assemble(&[], 100, 10).is_empty());
    }

    #[test]
    fn small_input_is_one_chunk() {
        let chunks = assemble(&[text("hello "), text("world")], 100, 10);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "hello world");
        assert_eq!(chunks[0].overlap_len, 0);
    }

    #[test]
    fn units_move_whole_to_next_chunk() {
        let units = vec![text("aaaa "), text("bbbb "), text("cccc")];
        let chunks = assemble(&units, 10, 0);
        let contents: Vec<_> = chunks.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(contents, vec!["aaaa bbbb ", "cccc"]);
    }

    #[test]
    fn overlap_copies_trailing_chars_between_text_chunks() {
        let source = "one two three four five six seven eight nine ten eleven twelve";
        let units = segment(source);
        let chunks = assemble(&units, 20, 5);
        assert!(chunks.len() > 2);
        for pair in chunks.windows(2) {
            let prev: Vec<char> = pair[0].content.chars().collect();
            let next: String = pair[1].content.chars().take(5).collect();
            let tail: String = prev[prev.len() - 5..].iter().collect();
            assert_eq!(next, tail);
            assert_eq!(pair[1].overlap_len, 5);
        }
        check_invariants(source, &chunks, 20);
    }

    #[test]
    fn long_word_is_hard_split() {
        let source = "x".repeat(25);
        let chunks = assemble(&segment(&source), 10, 0);
        let lens: Vec<_> = chunks.iter().map(|c| c.content.len()).collect();
        assert_eq!(lens, vec![10, 10, 5]);
        check_invariants(&source, &chunks, 10);
    }

    #[test]
    fn text_split_prefers_whitespace() {
        let source = "alpha beta gamma delta";
        let chunks = assemble(&segment(source), 12, 0);
        assert_eq!(chunks[0].content, "alpha beta ");
        check_invariants(source, &chunks, 12);
    }

    #[test]
    fn oversized_atomic_unit_gets_own_chunk() {
        let table = ContentUnit::Table(format!("<table>{}</table>", "x".repeat(40)));
        let units = vec![text("before "), table.clone(), text("after")];
        let chunks = assemble(&units, 20, 3);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[1].units, vec![table]);
        assert_eq!(chunks[1].overlap_len, 0, "seed dropped for oversized unit");
        // nothing of the table leaks into the next chunk
        assert_eq!(chunks[2].overlap_len, 0);
        assert_eq!(chunks[2].content, "after");
    }

    #[test]
    fn atomic_units_are_never_split() {
        let units = vec![text("aaa "), image("one.png"), text("bbb "), image("two.png")];
        let chunks = assemble(&units, 14, 2);
        for c in &chunks {
            for p in c.placeholders() {
                assert!(c.content.contains(&p.raw));
            }
        }
        let placed: usize = chunks.iter().map(|c| c.placeholders().count()).sum();
        assert_eq!(placed, 2);
    }

    #[test]
    fn overlap_never_reaches_into_atomic_unit() {
        let units = vec![image("abcdefgh"), text(" tail text here")];
        let chunks = assemble(&units, 16, 8);
        assert_eq!(chunks.len(), 2);
        // the first chunk ends with the image: no trailing text to seed from
        assert_eq!(chunks[1].overlap_len, 0);
    }

    #[test]
    fn mixed_document_invariants() {
        let source = format!(
            "Intro paragraph with several words in it.\n\n\
             | h1 | h2 |\n| --- | --- |\n| {} | v |\n\n\
             More text follows the table here.\n\n\
             ![first](a.png) and ![second](b.png)\n\nClosing words.",
            "w".repeat(60)
        );
        let chunks = assemble(&segment(&source), 40, 6);
        check_invariants(&source, &chunks, 40);
    }

    #[test]
    fn multibyte_overlap_is_char_based() {
        let source = "äöü äöü äöü äöü äöü äöü";
        let chunks = assemble(&segment(source), 8, 2);
        check_invariants(source, &chunks, 8);
        assert!(chunks.iter().skip(1).all(|c| c.overlap_len == 2));
    }

    #[test]
    fn last_chars_helper() {
        assert_eq!(last_chars("hello", 2), "lo");
        assert_eq!(last_chars("hi", 5), "hi");
        assert_eq!(last_chars("hi", 0), "");
    }
}
