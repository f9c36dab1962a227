pub fn is_valid_email(value: &str) -> bool {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.len() > 320 {
        return false;
    }

    let mut segments = trimmed.split('@');
    let local = segments.next().unwrap_or_default();
    let domain = segments.next().unwrap_or_default();

    if segments.next().is_some() {
        return false;
    }

    if local.is_empty() || domain.is_empty() {
        return false;
    }

    let invalid = |ch: u8| ch <= b' ' || matches!(ch, b'@' | b';' | b',' | b'"');
    if local.bytes().any(invalid) || domain.bytes().any(invalid) {
        return false;
    }

    domain.contains('.')
}

/// Trimmed, non-empty document title capped at `max_chars` characters.
pub fn normalize_title(value: &str, max_chars: usize) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(max_chars).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_validation_rejects_malformed_addresses() {
        assert!(is_valid_email("teacher@school.edu"));
        assert!(!is_valid_email("teacher@school"));
        assert!(!is_valid_email("a@b@c.com"));
        assert!(!is_valid_email("with space@x.com"));
        assert!(!is_valid_email(""));
    }

    #[test]
    fn titles_are_trimmed_and_capped() {
        assert_eq!(normalize_title("  Fractions ", 64).as_deref(), Some("Fractions"));
        assert_eq!(normalize_title("   ", 64), None);
        assert_eq!(normalize_title("abcdef", 3).as_deref(), Some("abc"));
    }
}
