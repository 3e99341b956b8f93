//! Text splitter trait and the default paragraph-window splitter.

use askdocs_shared::{Result, TextSegment};

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Trait for splitting extracted text into ordered segments.
///
/// Sequence indices must start at 0 and be contiguous; they anchor the
/// embedding round-trip and the final batch ordering.
pub trait TextSplitter: Send + Sync {
    fn split(&self, text: &str) -> Result<Vec<TextSegment>>;
}

// ---------------------------------------------------------------------------
// ParagraphSplitter
// ---------------------------------------------------------------------------

/// Packs whole paragraphs into windows of at most `max_chars` characters,
/// carrying `overlap` characters of context between adjacent windows.
/// Paragraphs longer than a window are hard-split on character boundaries.
pub struct ParagraphSplitter {
    max_chars: usize,
    overlap: usize,
}

impl ParagraphSplitter {
    pub fn new(max_chars: usize, overlap: usize) -> Self {
        let max_chars = max_chars.max(1);
        Self {
            max_chars,
            // Overlap must leave room for the window to advance.
            overlap: overlap.min(max_chars - 1),
        }
    }
}

impl TextSplitter for ParagraphSplitter {
    fn split(&self, text: &str) -> Result<Vec<TextSegment>> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Vec::new());
        }

        let mut chunks: Vec<String> = Vec::new();
        let mut current = String::new();

        for para in text
            .split("\n\n")
            .map(str::trim)
            .filter(|p| !p.is_empty())
        {
            let para_len = para.chars().count();

            if para_len > self.max_chars {
                if !current.is_empty() {
                    chunks.push(std::mem::take(&mut current));
                }
                chunks.extend(hard_split(para, self.max_chars, self.overlap));
                continue;
            }

            let current_len = current.chars().count();
            if current_len > 0 && current_len + 2 + para_len > self.max_chars {
                let tail = overlap_tail(&current, self.overlap);
                chunks.push(std::mem::take(&mut current));
                current = tail;
            }

            if !current.is_empty() {
                current.push_str("\n\n");
            }
            current.push_str(para);
        }

        if !current.is_empty() {
            chunks.push(current);
        }

        Ok(chunks
            .into_iter()
            .enumerate()
            .map(|(index, chunk)| TextSegment::new(index, chunk))
            .collect())
    }
}

/// Split an oversized paragraph into overlapping windows of `max_chars`.
fn hard_split(para: &str, max_chars: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = para.chars().collect();
    let step = (max_chars - overlap).max(1);

    let mut windows = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + max_chars).min(chars.len());
        windows.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }
    windows
}

/// The last `n` characters of `s`, carried into the next window.
fn overlap_tail(s: &str, n: usize) -> String {
    if n == 0 {
        return String::new();
    }
    let chars: Vec<char> = s.chars().collect();
    let start = chars.len().saturating_sub(n);
    chars[start..].iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_yields_no_segments() {
        let splitter = ParagraphSplitter::new(100, 10);
        assert!(splitter.split("").unwrap().is_empty());
        assert!(splitter.split("   \n\n  ").unwrap().is_empty());
    }

    #[test]
    fn short_text_is_one_segment() {
        let splitter = ParagraphSplitter::new(100, 10);
        let segments = splitter.split("a short note").unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].index, 0);
        assert_eq!(segments[0].text, "a short note");
    }

    #[test]
    fn paragraphs_pack_into_windows() {
        let splitter = ParagraphSplitter::new(30, 0);
        let text = "first paragraph\n\nsecond one\n\nthird paragraph here\n\nfourth";
        let segments = splitter.split(text).unwrap();

        assert!(segments.len() >= 2);
        // Indices are contiguous from zero
        for (i, segment) in segments.iter().enumerate() {
            assert_eq!(segment.index, i);
        }
        // Every paragraph survives somewhere
        let joined: String = segments.iter().map(|s| s.text.as_str()).collect();
        for para in ["first paragraph", "second one", "third paragraph here", "fourth"] {
            assert!(joined.contains(para), "missing {para:?}");
        }
    }

    #[test]
    fn oversized_paragraph_hard_splits_with_overlap() {
        let splitter = ParagraphSplitter::new(10, 3);
        let text = "abcdefghijklmnopqrstuvwxyz";
        let segments = splitter.split(text).unwrap();

        assert!(segments.len() > 1);
        for segment in &segments {
            assert!(segment.text.chars().count() <= 10);
        }
        // Adjacent windows share the configured overlap
        let first = &segments[0].text;
        let second = &segments[1].text;
        let tail: String = first.chars().rev().take(3).collect::<Vec<_>>().into_iter().rev().collect();
        assert!(second.starts_with(&tail));
    }

    #[test]
    fn window_overlap_carries_context() {
        let splitter = ParagraphSplitter::new(20, 5);
        let text = "one two three\n\nfour five six\n\nseven eight nine";
        let segments = splitter.split(text).unwrap();
        assert!(segments.len() >= 2);

        // The second window starts with the tail of the first
        let tail: String = {
            let chars: Vec<char> = segments[0].text.chars().collect();
            chars[chars.len().saturating_sub(5)..].iter().collect()
        };
        assert!(segments[1].text.starts_with(&tail));
    }
}
