/// Truncate a string to at most `max` characters without splitting a char.
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Number of lines in `text`, counting line breaks + 1 (an empty string is one line).
pub fn count_lines(text: &str) -> usize {
    text.matches('\n').count() + 1
}

/// Strip a markdown code fence wrapping an LLM response.
///
/// Only a fence at the very start of the (trimmed) response is recognized:
/// 1. the opening ``` and an optional language tag (```json, ```python) are removed
/// 2. a closing ``` at the end is removed if present
///
/// Text without a leading fence is returned trimmed.
pub fn strip_code_fence(response: &str) -> &str {
    let trimmed = response.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    // Skip language identifier directly after the fence
    let tag_len = rest
        .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '+' | '_')))
        .unwrap_or(rest.len());
    let body = rest[tag_len..].trim();

    body.strip_suffix("```").map(str::trim).unwrap_or(body)
}

/// Extract the span from the first `{` to the last `}` (inclusive).
///
/// Used when a response wraps its JSON in prose. Returns None if there is no
/// such span.
pub fn extract_braced(response: &str) -> Option<&str> {
    let start = response.find('{')?;
    let end = response.rfind('}')?;
    if start < end {
        Some(&response[start..=end])
    } else {
        None
    }
}
