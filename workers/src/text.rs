// Text helpers shared by retrieval and the extractive responder

/// Splits `text` into windows of at most `chunk_size` characters, each
/// starting `chunk_overlap` characters before the previous one ended.
///
/// A window that would cut through a word backs off to the last whitespace,
/// as long as that keeps more than half of the window. Pieces are trimmed and
/// blank pieces dropped, so empty input yields no chunks.
pub fn split_text(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let size = chunk_size.max(1);
    let overlap = chunk_overlap.min(size - 1);

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let mut end = (start + size).min(chars.len());
        if end < chars.len() {
            if let Some(ws) = chars[start..end].iter().rposition(|c| c.is_whitespace()) {
                if ws > size / 2 {
                    end = start + ws;
                }
            }
        }

        let piece: String = chars[start..end].iter().collect();
        let piece = piece.trim();
        if !piece.is_empty() {
            chunks.push(piece.to_string());
        }
        if end >= chars.len() {
            break;
        }

        let next = end.saturating_sub(overlap);
        start = if next > start { next } else { end };
    }
    chunks
}

/// Lowercased alphanumeric terms of `query`, deduplicated, single characters dropped.
pub fn query_terms(query: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for raw in query.split(|c: char| !c.is_alphanumeric()) {
        if raw.chars().count() < 2 {
            continue;
        }
        let term = raw.to_lowercase();
        if !terms.contains(&term) {
            terms.push(term);
        }
    }
    terms
}

/// Number of distinct `terms` found in `text`, case-insensitively.
pub fn term_hits(text: &str, terms: &[String]) -> usize {
    let lower = text.to_lowercase();
    terms.iter().filter(|t| lower.contains(t.as_str())).count()
}

/// Sentence-ish pieces of `text`, split after `.`, `!`, `?` and on newlines.
pub fn sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut begin = 0;
    for (i, c) in text.char_indices() {
        if matches!(c, '.' | '!' | '?' | '\n') {
            let end = i + c.len_utf8();
            let piece = text[begin..end].trim();
            if !piece.is_empty() && piece.chars().any(char::is_alphanumeric) {
                out.push(piece);
            }
            begin = end;
        }
    }
    let tail = text[begin..].trim();
    if !tail.is_empty() && tail.chars().any(char::is_alphanumeric) {
        out.push(tail);
    }
    out
}
