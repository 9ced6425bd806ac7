// src/util.rs — Small string helpers for terminal output

/// Longest prefix of `s` that fits in `max_len` bytes without splitting a
/// UTF-8 character.
pub fn truncate_str(s: &str, max_len: usize) -> &str {
    if s.len() <= max_len {
        return s;
    }
    let mut end = max_len;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
