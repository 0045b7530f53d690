/// Truncates `text` to at most `max_chars` characters, respecting char boundaries.
pub fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Binary megabyte; config limits and user-facing sizes both use it.
pub const MEGABYTE: u64 = 1024 * 1024;

pub fn format_megabytes(bytes: u64) -> String {
    format!("{:.1}MB", bytes as f64 / MEGABYTE as f64)
}

/// Rounds seconds to two decimals.
pub fn round_secs(secs: f64) -> f64 {
    (secs * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("", 5), "");
        assert_eq!(truncate("hello", 5), "hello");
        assert_eq!(truncate("hello world", 5), "hello");
        assert_eq!(truncate("привет", 3), "при");
    }

    #[test]
    fn test_format_megabytes() {
        assert_eq!(format_megabytes(0), "0.0MB");
        assert_eq!(format_megabytes(25 * MEGABYTE), "25.0MB");
        assert_eq!(format_megabytes(MEGABYTE * 3 / 2), "1.5MB");
        assert_eq!(format_megabytes(25_000_000), "23.8MB");
    }

    #[test]
    fn test_round_secs() {
        assert_eq!(round_secs(1.234), 1.23);
        assert_eq!(round_secs(1.235_1), 1.24);
        assert_eq!(round_secs(0.0), 0.0);
    }
}
