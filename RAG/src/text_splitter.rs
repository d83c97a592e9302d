use crate::config::RagConfig;
use crate::models::{Chunk, ChunkSource, Document};
use regex::Regex;
use std::sync::OnceLock;
use unicode_segmentation::UnicodeSegmentation;

/// Recursive character splitter with a fixed-width overlap.
///
/// Text is broken at the coarsest boundary that yields pieces short enough
/// to fit (paragraph, line, sentence, word, then single characters) and the
/// pieces are packed greedily into chunks. Every chunk after the first
/// starts with the last `chunk_overlap` characters of its predecessor, so a
/// chunk is at most `chunk_size` characters long. Lengths count `char`s.
#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Boundary {
    Paragraph,
    Line,
    Sentence,
    Word,
    Character,
}

impl Boundary {
    fn finer(self) -> Boundary {
        match self {
            Boundary::Paragraph => Boundary::Line,
            Boundary::Line => Boundary::Sentence,
            Boundary::Sentence => Boundary::Word,
            Boundary::Word | Boundary::Character => Boundary::Character,
        }
    }
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
        }
    }

    pub fn from_config(config: &RagConfig) -> Self {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    /// Chunks every page of a document. Positions run across the whole
    /// document; empty pages contribute nothing.
    pub fn split_document(&self, document: &Document) -> Vec<Chunk> {
        let mut chunks = Vec::new();

        for page in &document.pages {
            for content in self.split_text(&page.text) {
                chunks.push(Chunk {
                    position: chunks.len(),
                    content,
                    source: ChunkSource {
                        filename: document.filename.clone(),
                        page: page.number,
                    },
                });
            }
        }

        log::info!("Created {} chunks from {}", chunks.len(), document.filename);
        chunks
    }

    pub fn split_text(&self, text: &str) -> Vec<String> {
        let text = text.trim();
        if text.is_empty() {
            return Vec::new();
        }
        if char_len(text) <= self.chunk_size {
            return vec![text.to_string()];
        }

        let body_limit = self.chunk_size - self.chunk_overlap;
        let mut pieces = Vec::new();
        collect_pieces(text, body_limit, Boundary::Paragraph, &mut pieces);

        let mut chunks: Vec<String> = Vec::new();
        let mut body = String::new();
        let mut body_len = 0;

        for piece in pieces {
            // The first chunk carries no overlap prefix and may use the whole budget.
            let limit = if chunks.is_empty() {
                self.chunk_size
            } else {
                body_limit
            };
            let piece_len = char_len(piece);

            if body_len > 0 && body_len + piece_len > limit {
                self.push_chunk(&mut chunks, &body);
                body.clear();
                body_len = 0;
            }
            body.push_str(piece);
            body_len += piece_len;
        }
        if body_len > 0 {
            self.push_chunk(&mut chunks, &body);
        }

        chunks
    }

    fn push_chunk(&self, chunks: &mut Vec<String>, body: &str) {
        if body.trim().is_empty() {
            return;
        }
        let chunk = match chunks.last() {
            Some(previous) => format!("{}{}", tail_chars(previous, self.chunk_overlap), body),
            None => body.to_string(),
        };
        chunks.push(chunk);
    }
}

/// Appends slices of `text`, each at most `limit` chars, that concatenate
/// back to `text`.
fn collect_pieces<'a>(text: &'a str, limit: usize, boundary: Boundary, out: &mut Vec<&'a str>) {
    if char_len(text) <= limit {
        out.push(text);
        return;
    }

    if boundary == Boundary::Character {
        out.extend(char_windows(text, limit));
        return;
    }

    let parts = split_at(text, boundary);
    if parts.len() <= 1 {
        collect_pieces(text, limit, boundary.finer(), out);
        return;
    }

    for part in parts {
        collect_pieces(part, limit, boundary.finer(), out);
    }
}

fn split_at(text: &str, boundary: Boundary) -> Vec<&str> {
    static PARAGRAPH: OnceLock<Regex> = OnceLock::new();

    match boundary {
        Boundary::Paragraph => {
            let re = PARAGRAPH.get_or_init(|| Regex::new(r"\n[ \t]*\n").unwrap());
            split_before(text, re.find_iter(text).map(|m| m.start()))
        }
        Boundary::Line => split_before(text, text.match_indices('\n').map(|(idx, _)| idx)),
        Boundary::Sentence => text.split_sentence_bounds().collect(),
        Boundary::Word => text.split_word_bounds().collect(),
        Boundary::Character => char_windows(text, 1),
    }
}

/// Cuts `text` in front of each separator offset so the separator leads
/// the following part.
fn split_before(text: &str, offsets: impl Iterator<Item = usize>) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    for offset in offsets {
        if offset > start {
            parts.push(&text[start..offset]);
            start = offset;
        }
    }
    if start < text.len() {
        parts.push(&text[start..]);
    }
    parts
}

fn char_windows(text: &str, width: usize) -> Vec<&str> {
    let width = width.max(1);
    let mut windows = Vec::new();
    let mut start = 0;
    let mut count = 0;

    for (idx, _) in text.char_indices() {
        if count == width {
            windows.push(&text[start..idx]);
            start = idx;
            count = 0;
        }
        count += 1;
    }
    if start < text.len() {
        windows.push(&text[start..]);
    }
    windows
}

fn tail_chars(text: &str, n: usize) -> &str {
    if n == 0 {
        return "";
    }
    let len = char_len(text);
    if len <= n {
        return text;
    }
    match text.char_indices().nth(len - n) {
        Some((idx, _)) => &text[idx..],
        None => text,
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}
