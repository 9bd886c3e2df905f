use crate::error::ChatError;
use crate::models::{DocumentRef, TextChunk};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub overlap_chars: usize,
    pub min_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: 1_200,
            overlap_chars: 120,
            min_chars: 1,
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), ChatError> {
        if self.max_chars == 0 {
            return Err(ChatError::Validation(
                "chunk max_chars must be greater than zero".to_string(),
            ));
        }
        if self.overlap_chars >= self.max_chars {
            return Err(ChatError::Validation(format!(
                "chunk overlap {} must be smaller than max_chars {}",
                self.overlap_chars, self.max_chars
            )));
        }
        Ok(())
    }

    fn window_step(&self) -> usize {
        self.max_chars.saturating_sub(self.overlap_chars).max(1)
    }
}

pub fn normalize_whitespace(text: &str) -> String {
    text.replace('\u{a0}', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Splits on blank lines and normalizes each paragraph to single spaces.
pub fn split_paragraphs(text: &str) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            flush_paragraph(&mut current, &mut paragraphs);
        } else {
            current.push(line);
        }
    }
    flush_paragraph(&mut current, &mut paragraphs);

    paragraphs
}

fn flush_paragraph(lines: &mut Vec<&str>, paragraphs: &mut Vec<String>) {
    if lines.is_empty() {
        return;
    }
    let paragraph = normalize_whitespace(&lines.join(" "));
    if !paragraph.is_empty() {
        paragraphs.push(paragraph);
    }
    lines.clear();
}

pub fn chunk_text(text: &str, config: ChunkingConfig) -> Vec<String> {
    let max_chars = config.max_chars.max(1);
    let mut chunks = Vec::new();

    for paragraph in split_paragraphs(text) {
        let chars: Vec<char> = paragraph.chars().collect();
        if chars.len() < config.min_chars {
            continue;
        }

        if chars.len() <= max_chars {
            chunks.push(paragraph);
            continue;
        }

        let mut start = 0;
        while start < chars.len() {
            let end = (start + max_chars).min(chars.len());
            chunks.push(chars[start..end].iter().collect());
            if end == chars.len() {
                break;
            }
            start = start.saturating_add(config.window_step());
        }
    }

    chunks
}

/// Chunks every document in order; `index` counts across all documents.
pub fn chunk_documents(documents: &[(DocumentRef, String)], config: ChunkingConfig) -> Vec<TextChunk> {
    let mut cursor = 0usize;
    let mut result = Vec::new();

    for (reference, text) in documents {
        for piece in chunk_text(text, config) {
            result.push(TextChunk {
                document_id: reference.document_id.clone(),
                filename: reference.filename.clone(),
                index: cursor,
                text: piece,
            });
            cursor = cursor.saturating_add(1);
        }
    }

    result
}
