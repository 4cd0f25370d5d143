//! Passage splitting.
//!
//! Paragraphs (blank-line separated) are packed into passages of at most
//! `max_chars` characters. Oversized paragraphs are split on lines, and
//! oversized lines on character boundaries.

use tandem_core::retrieval::Passage;

use crate::corpus::Document;

/// Split a document into passages of at most `max_chars` characters.
pub fn split_passages(doc: &Document, max_chars: usize) -> Vec<Passage> {
    let max_chars = max_chars.max(1);
    let mut pieces: Vec<String> = Vec::new();

    for paragraph in doc.text.split("\n\n") {
        let paragraph = paragraph.trim();
        if paragraph.is_empty() {
            continue;
        }
        if char_len(paragraph) <= max_chars {
            pieces.push(paragraph.to_string());
        } else {
            for line in paragraph.lines() {
                pieces.extend(hard_split(line, max_chars));
            }
        }
    }

    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();
    for piece in pieces {
        let joined_len = char_len(&current) + char_len(&piece) + 2;
        if !current.is_empty() && joined_len > max_chars {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(&piece);
    }
    if !current.trim().is_empty() {
        chunks.push(current);
    }

    chunks
        .into_iter()
        .enumerate()
        .map(|(i, content)| Passage {
            id: format!("{}#{i}", doc.source),
            source: doc.source.clone(),
            content,
            score: 0.0,
        })
        .collect()
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn hard_split(line: &str, max_chars: usize) -> Vec<String> {
    let line = line.trim_end();
    if line.is_empty() {
        return Vec::new();
    }
    let chars: Vec<char> = line.chars().collect();
    chars
        .chunks(max_chars)
        .map(|c| c.iter().collect::<String>())
        .collect()
}
