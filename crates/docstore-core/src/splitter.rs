//! Character-window text splitter.
//!
//! Windows are at most `chunk_size` characters and consecutive windows share
//! exactly `chunk_overlap` characters. Where possible a window ends just after
//! a paragraph break, a newline or a space rather than mid-word.

use crate::config::ChunkingConfig;
use crate::error::Result;

/// Boundaries tried in order when a window has to be cut early.
const SEPARATORS: [&[char]; 3] = [&['\n', '\n'], &['\n'], &[' ']];

/// A slice of the normalized document text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSpan {
    /// Character offset of the span in the source text.
    pub start: usize,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct TextSplitter {
    config: ChunkingConfig,
}

impl TextSplitter {
    pub fn new(config: ChunkingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ChunkingConfig { &self.config }

    pub fn split(&self, text: &str) -> Vec<TextSpan> {
        let chars: Vec<char> = text.chars().collect();
        let n = chars.len();
        let mut spans = Vec::new();
        if n == 0 {
            return spans;
        }
        let mut start = 0usize;
        loop {
            let hard_end = (start + self.config.chunk_size).min(n);
            let end = if hard_end == n { n } else { self.snap_end(&chars, start, hard_end) };
            spans.push(TextSpan { start, text: chars[start..end].iter().collect() });
            if end == n {
                break;
            }
            start = end - self.config.chunk_overlap;
        }
        spans
    }

    /// Latest separator boundary in `[floor, hard_end]`. The floor keeps every
    /// window longer than the overlap so the next start always advances.
    fn snap_end(&self, chars: &[char], start: usize, hard_end: usize) -> usize {
        let floor = (start + self.config.chunk_size / 2).max(start + self.config.chunk_overlap + 1);
        if floor >= hard_end {
            return hard_end;
        }
        for sep in SEPARATORS {
            let found = (floor..=hard_end)
                .rev()
                .find(|&p| p >= sep.len() && &chars[p - sep.len()..p] == sep);
            if let Some(p) = found {
                return p;
            }
        }
        hard_end
    }
}

/// Normalizes decoded text before splitting: unified newlines, collapsed
/// intra-line whitespace, at most one blank line in a row, trimmed ends.
pub fn normalize_text(raw: &str) -> String {
    let unified = raw.replace("\r\n", "\n").replace('\r', "\n");
    let mut out = String::with_capacity(unified.len());
    let mut pending_newlines = 0usize;
    for line in unified.split('\n') {
        let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() {
            pending_newlines += 1;
            continue;
        }
        if !out.is_empty() {
            out.push_str(if pending_newlines > 0 { "\n\n" } else { "\n" });
        }
        out.push_str(&collapsed);
        pending_newlines = 0;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MIN_CHUNK_SIZE;
    use proptest::prelude::*;

    fn splitter(size: usize, overlap: usize) -> TextSplitter {
        TextSplitter::new(ChunkingConfig { chunk_size: size, chunk_overlap: overlap }).unwrap()
    }

    fn char_len(s: &str) -> usize { s.chars().count() }

    fn prefix(s: &str, n: usize) -> String { s.chars().take(n).collect() }

    fn suffix(s: &str, n: usize) -> String {
        let len = char_len(s);
        s.chars().skip(len.saturating_sub(n)).collect()
    }

    #[test]
    fn short_text_is_one_span() {
        let spans = splitter(1000, 200).split("Short text");
        assert_eq!(spans, vec![TextSpan { start: 0, text: "Short text".into() }]);
    }

    #[test]
    fn empty_text_has_no_spans() {
        assert!(splitter(10, 2).split("").is_empty());
    }

    #[test]
    fn prefers_word_boundaries() {
        let text = "alpha bravo charlie delta echo foxtrot golf hotel india juliet";
        let spans = splitter(20, 5).split(text);
        assert!(spans.len() > 1);
        for span in &spans[..spans.len() - 1] {
            assert!(span.text.ends_with(' '), "span {:?} should end on a space", span.text);
        }
    }

    #[test]
    fn prefers_paragraph_breaks_over_spaces() {
        let text = format!("{}\n\n{}", "a ".repeat(35).trim_end(), "b ".repeat(40).trim_end());
        let spans = splitter(100, 10).split(&text);
        assert!(spans[0].text.ends_with("\n\n"), "first span: {:?}", spans[0].text);
    }

    #[test]
    fn default_config_keeps_size_and_overlap() {
        let text = "lorem ipsum dolor sit amet ".repeat(200);
        let spans = splitter(1000, 200).split(&text);
        assert!(spans.len() >= 6);
        for pair in spans.windows(2) {
            assert!(char_len(&pair[0].text) <= 1000);
            assert_eq!(suffix(&pair[0].text, 200), prefix(&pair[1].text, 200));
        }
    }

    #[test]
    fn unbroken_text_is_cut_hard() {
        let text = "x".repeat(25);
        let spans = splitter(10, 3).split(&text);
        let lens: Vec<usize> = spans.iter().map(|s| char_len(&s.text)).collect();
        assert_eq!(lens, vec![10, 10, 10, 4]);
        assert_eq!(spans.iter().map(|s| s.start).collect::<Vec<_>>(), vec![0, 7, 14, 21]);
    }

    #[test]
    fn counts_characters_not_bytes() {
        let text = "żółw ".repeat(30);
        for span in splitter(16, 4).split(&text) {
            assert!(char_len(&span.text) <= 16);
        }
    }

    #[test]
    fn normalize_collapses_whitespace_and_blank_lines() {
        let raw = "  Title\r\n\r\n\r\n\tfirst   line  \nsecond\t\tline\n\n\n\n  \nend  ";
        assert_eq!(normalize_text(raw), "Title\n\nfirst line\nsecond line\n\nend");
        assert_eq!(normalize_text(" \n\t\r\n "), "");
    }

    proptest! {
        #[test]
        fn spans_respect_size_and_overlap(
            text in "[a-z \n]{0,2000}",
            (size, overlap) in (MIN_CHUNK_SIZE..300).prop_flat_map(|s| (Just(s), 0..s)),
        ) {
            let spans = splitter(size, overlap).split(&text);
            let total = char_len(&text);
            prop_assert_eq!(spans.is_empty(), total == 0);
            for span in &spans {
                prop_assert!(char_len(&span.text) <= size);
                prop_assert!(!span.text.is_empty());
            }
            let mut rebuilt = String::new();
            for (i, pair) in spans.windows(2).enumerate() {
                prop_assert_eq!(suffix(&pair[0].text, overlap), prefix(&pair[1].text, overlap));
                prop_assert_eq!(pair[1].start, pair[0].start + char_len(&pair[0].text) - overlap);
                if i == 0 { rebuilt.push_str(&pair[0].text); }
                rebuilt.extend(pair[1].text.chars().skip(overlap));
            }
            if spans.len() == 1 { rebuilt.push_str(&spans[0].text); }
            prop_assert_eq!(rebuilt, text);
        }

        #[test]
        fn normalized_text_never_yields_blank_spans(
            raw in "[a-z \t\r\n]{0,600}",
            (size, overlap) in (MIN_CHUNK_SIZE..40usize).prop_flat_map(|s| (Just(s), 0..s)),
        ) {
            let text = normalize_text(&raw);
            for span in splitter(size, overlap).split(&text) {
                prop_assert!(!span.text.trim().is_empty(), "blank span {:?}", span.text);
            }
        }
    }
}
