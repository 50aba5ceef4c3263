//! Document to node splitting.
//!
//! [`ParagraphSplitter`] packs `\n\n`-separated paragraphs into nodes of at
//! most `chunk_tokens` (estimated at four characters per token). A
//! paragraph longer than that is cut at the last newline or space before
//! the limit. Every document yields at least one node.

use uuid::Uuid;

use ragstudio_core::models::node::{Document, Node};

const CHARS_PER_TOKEN: usize = 4;

pub const DEFAULT_CHUNK_TOKENS: usize = 1024;

/// Turns a document into index nodes.
pub trait NodeParser: Send + Sync {
    fn parse(&self, document: &Document) -> Vec<Node>;
}

#[derive(Debug, Clone, Copy)]
pub struct ParagraphSplitter {
    pub chunk_tokens: usize,
}

impl Default for ParagraphSplitter {
    fn default() -> Self {
        Self {
            chunk_tokens: DEFAULT_CHUNK_TOKENS,
        }
    }
}

impl ParagraphSplitter {
    pub fn new(chunk_tokens: usize) -> Self {
        Self { chunk_tokens }
    }

    fn max_chars(&self) -> usize {
        (self.chunk_tokens * CHARS_PER_TOKEN).max(1)
    }

    /// Split `text` into chunk strings.
    pub fn split(&self, text: &str) -> Vec<String> {
        let max_chars = self.max_chars();
        let mut chunks = Vec::new();
        let mut buf = String::new();

        for para in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
            let would_be = if buf.is_empty() {
                para.len()
            } else {
                buf.len() + 2 + para.len()
            };
            if would_be > max_chars && !buf.is_empty() {
                chunks.push(std::mem::take(&mut buf));
            }

            if para.len() > max_chars {
                hard_split(para, max_chars, &mut chunks);
                continue;
            }

            if !buf.is_empty() {
                buf.push_str("\n\n");
            }
            buf.push_str(para);
        }

        if !buf.is_empty() {
            chunks.push(buf);
        }
        if chunks.is_empty() {
            chunks.push(text.trim().to_string());
        }
        chunks
    }
}

impl NodeParser for ParagraphSplitter {
    fn parse(&self, document: &Document) -> Vec<Node> {
        self.split(&document.text)
            .into_iter()
            .map(|text| Node {
                id: Uuid::new_v4(),
                ref_doc_id: document.id,
                text,
                metadata: document.metadata.clone(),
            })
            .collect()
    }
}

fn hard_split(para: &str, max_chars: usize, out: &mut Vec<String>) {
    let mut rest = para;
    while !rest.is_empty() {
        if rest.len() <= max_chars {
            out.push(rest.trim().to_string());
            break;
        }
        let limit = floor_char_boundary(rest, max_chars);
        let cut = rest[..limit]
            .rfind(['\n', ' '])
            .map(|pos| pos + 1)
            .unwrap_or(limit);
        // A single character wider than the limit still has to make progress.
        let cut = if cut == 0 {
            rest.chars().next().map_or(rest.len(), char::len_utf8)
        } else {
            cut
        };

        let piece = rest[..cut].trim();
        if !piece.is_empty() {
            out.push(piece.to_string());
        }
        rest = &rest[cut..];
    }
}

fn floor_char_boundary(s: &str, index: usize) -> usize {
    let mut i = index.min(s.len());
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}
