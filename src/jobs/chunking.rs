//! Boundary-aware document splitting
//!
//! Splitting is deterministic: the same text and limit always produce the
//! same chunks. Each chunk holds at most `max_chars` characters. Within the
//! window of the next `max_chars` characters the split point is the last
//! paragraph break, else the last line break, else the last sentence end,
//! else the last whitespace; a window with none of these is cut hard.

/// Split `text` into ordered, trimmed, non-empty chunks
pub fn split_document(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    let mut chunks = Vec::new();

    let mut pos = skip_whitespace(&chars, 0);
    while pos < len {
        let end = if len - pos <= max_chars {
            len
        } else {
            find_cut(&chars, pos, pos + max_chars)
        };

        let chunk: String = chars[pos..end].iter().collect();
        let chunk = chunk.trim();
        if !chunk.is_empty() {
            chunks.push(chunk.to_string());
        }

        pos = skip_whitespace(&chars, end);
    }

    chunks
}

fn skip_whitespace(chars: &[char], mut pos: usize) -> usize {
    while pos < chars.len() && chars[pos].is_whitespace() {
        pos += 1;
    }
    pos
}

/// Exclusive end of the next chunk within `start..limit`
fn find_cut(chars: &[char], start: usize, limit: usize) -> usize {
    let window = start + 1..limit;

    // paragraph break
    if let Some(i) = window
        .clone()
        .rev()
        .find(|&i| chars[i] == '\n' && chars[i - 1] == '\n')
        .filter(|&i| i - 1 > start)
    {
        return i - 1;
    }

    // line break
    if let Some(i) = window.clone().rev().find(|&i| chars[i] == '\n') {
        return i;
    }

    // sentence end followed by whitespace
    if let Some(i) = window.clone().rev().find(|&i| {
        matches!(chars[i - 1], '.' | '!' | '?' | '。' | '！' | '？') && chars[i].is_whitespace()
    }) {
        return i;
    }

    // any whitespace
    if let Some(i) = window.rev().find(|&i| chars[i].is_whitespace()) {
        return i;
    }

    limit
}
