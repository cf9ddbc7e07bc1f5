//! Glob matching for query keys.
//!
//! Patterns are written against the displayed key form (`client:42:sessions`)
//! and support `*` as a wildcard matching any run of characters, including
//! `:` separators and the empty string.

use super::QueryKey;

/// Checks if a displayed key matches a glob pattern.
///
/// # Examples
///
/// ```
/// use clinicsync_core::cache::pattern_matches;
///
/// assert!(pattern_matches("client:42", "client:42"));
/// assert!(pattern_matches("client:42:*", "client:42:sessions"));
/// assert!(pattern_matches("client:*:sessions", "client:7:sessions"));
/// assert!(!pattern_matches("client:42:*", "client:43:sessions"));
/// ```
pub fn pattern_matches(pattern: &str, key: &str) -> bool {
    let pattern = pattern.as_bytes();
    let key = key.as_bytes();

    let (mut p, mut k) = (0, 0);
    // Position of the last `*` seen and the key offset it was tried against.
    let mut backtrack: Option<(usize, usize)> = None;

    while k < key.len() {
        if p < pattern.len() && pattern[p] == b'*' {
            backtrack = Some((p, k));
            p += 1;
        } else if p < pattern.len() && pattern[p] == key[k] {
            p += 1;
            k += 1;
        } else if let Some((star, matched)) = backtrack {
            // Let the last `*` swallow one more character.
            p = star + 1;
            k = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|&c| c == b'*')
}

/// Checks if a query key matches a glob pattern.
pub fn key_matches(pattern: &str, key: &QueryKey) -> bool {
    pattern_matches(pattern, &key.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{client_key, client_sessions_key, session_list_key};

    #[test]
    fn test_exact_match() {
        assert!(pattern_matches("session", "session"));
        assert!(pattern_matches("client:42", "client:42"));
        assert!(!pattern_matches("client:42", "client:420"));
    }

    #[test]
    fn test_trailing_wildcard() {
        assert!(pattern_matches("client:42:*", "client:42:sessions"));
        assert!(pattern_matches("client:42:*", "client:42:"));
        assert!(!pattern_matches("client:42:*", "client:42"));
    }

    #[test]
    fn test_leading_wildcard() {
        assert!(pattern_matches("*:sessions", "client:42:sessions"));
        assert!(pattern_matches("*:sessions", "therapist:7:sessions"));
        assert!(!pattern_matches("*:sessions", "client:42:consultations"));
    }

    #[test]
    fn test_wildcard_in_middle() {
        assert!(pattern_matches("client:*:sessions", "client:42:sessions"));
        assert!(!pattern_matches("client:*:sessions", "therapist:42:sessions"));
        assert!(!pattern_matches("client:*:sessions", "client:42:consultations"));
    }

    #[test]
    fn test_wildcard_needs_backtracking() {
        // The first candidate for "s" is not the one that completes the match.
        assert!(pattern_matches("*s:x", "sss:x"));
        assert!(pattern_matches("a*b*c", "aXbYbZc"));
        assert!(!pattern_matches("a*b*c", "aXbYbZ"));
    }

    #[test]
    fn test_wildcard_only() {
        assert!(pattern_matches("*", ""));
        assert!(pattern_matches("*", "client:42:sessions"));
        assert!(pattern_matches("**", "anything"));
    }

    #[test]
    fn test_empty_pattern() {
        assert!(pattern_matches("", ""));
        assert!(!pattern_matches("", "client"));
    }

    #[test]
    fn test_key_matches() {
        assert!(key_matches("client:42*", &client_key("42")));
        assert!(key_matches("client:42*", &client_sessions_key("42")));
        assert!(!key_matches("client:*", &session_list_key()));
    }
}
