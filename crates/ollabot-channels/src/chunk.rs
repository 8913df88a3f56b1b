/// Split `text` into chunks of at most `max_chars` characters, preferring
/// whitespace boundaries so words are not cut mid-way.
///
/// Lengths are counted in `char`s (chat platforms count characters, not
/// bytes) and every split lands on a UTF-8 boundary. Blank input yields no
/// chunks.
pub fn split_chunks(text: &str, max_chars: usize) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }
    if max_chars == 0 || text.chars().count() <= max_chars {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while remaining.chars().count() > max_chars {
        // Byte offset of the first char past the window.
        let window_end = remaining
            .char_indices()
            .nth(max_chars)
            .map(|(i, _)| i)
            .unwrap_or(remaining.len());
        let window = &remaining[..window_end];

        let split_at = window
            .rfind(char::is_whitespace)
            .filter(|&i| i > 0)
            .unwrap_or(window_end);

        chunks.push(remaining[..split_at].trim_end().to_string());
        remaining = remaining[split_at..].trim_start();
    }

    if !remaining.is_empty() {
        chunks.push(remaining.to_string());
    }

    chunks
}
