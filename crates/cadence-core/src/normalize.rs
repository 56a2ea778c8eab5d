//! Merchant identity normalization and matching
//!
//! Free-text bank descriptors ("NETFLIX.COM 866-579-7172 CA") are reduced to
//! stable grouping keys so the same recurring source lands in the same bucket
//! across statements. Matching comes in three strictness levels:
//!
//! - loose: substring containment either way (AI-originated patterns)
//! - strict: exact key or first-two-token agreement (manual/income patterns)
//! - dismissal: the loose rules plus two-token agreement, deliberately the
//!   most permissive so a dismissed pattern stays dismissed

use crate::models::Transaction;

/// Default token count for grouping keys
pub const MATCH_KEY_TOKENS: usize = 3;

/// Token count for income/manual registration, where a more specific key
/// avoids accidental merges between employers with similar names
pub const INCOME_KEY_TOKENS: usize = 6;

/// Derive a merchant key from a raw descriptor.
///
/// Lower-cases, strips everything outside `[a-z0-9 ]`, collapses whitespace,
/// and keeps the first `max_tokens` tokens. Pure; an input that strips to
/// nothing yields an empty key, which callers must exclude from grouping.
pub fn merchant_key(descriptor: &str, max_tokens: usize) -> String {
    let cleaned: String = descriptor
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();

    cleaned
        .split_whitespace()
        .take(max_tokens)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Best available descriptor for a transaction: the user's display name wins,
/// then the aggregator's merchant name, then the raw bank descriptor.
pub fn best_descriptor(tx: &Transaction) -> &str {
    tx.user_display_name
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .or_else(|| {
            tx.merchant_name
                .as_deref()
                .filter(|s| !s.trim().is_empty())
        })
        .unwrap_or(&tx.description)
}

/// Grouping key for a transaction at the default token width.
pub fn transaction_key(tx: &Transaction) -> String {
    merchant_key(best_descriptor(tx), MATCH_KEY_TOKENS)
}

fn first_tokens(key: &str, n: usize) -> String {
    key.split_whitespace().take(n).collect::<Vec<_>>().join(" ")
}

/// Loose matching: equal keys or substring containment in either direction.
/// Used for AI-originated patterns, where descriptor drift is expected.
pub fn keys_match_loose(a: &str, b: &str) -> bool {
    if a.is_empty() || b.is_empty() {
        return false;
    }
    a == b || a.contains(b) || b.contains(a)
}

/// Strict matching: exact key equality or agreement on the first two tokens.
/// Used for manual and income patterns, whose precision must not be diluted
/// by generic substring drift.
pub fn keys_match_strict(a: &str, b: &str) -> bool {
    if a.is_empty() || b.is_empty() {
        return false;
    }
    a == b || first_tokens(a, 2) == first_tokens(b, 2)
}

/// Dismissal matching: exact, containment either way, or two-token agreement.
/// More permissive than pattern matching, to minimize "the pattern came back
/// after I dismissed it" regressions.
pub fn dismissal_matches(dismissed_key: &str, candidate_key: &str) -> bool {
    if dismissed_key.is_empty() || candidate_key.is_empty() {
        return false;
    }
    keys_match_loose(dismissed_key, candidate_key)
        || first_tokens(dismissed_key, 2) == first_tokens(candidate_key, 2)
}

/// Extract learning keywords from a descriptor for a dismissal record.
///
/// Drops purely numeric tokens (store numbers, phone fragments) and anything
/// shorter than three characters.
pub fn extract_keywords(descriptor: &str) -> Vec<String> {
    let key = merchant_key(descriptor, usize::MAX);
    let mut keywords: Vec<String> = key
        .split_whitespace()
        .filter(|t| t.len() >= 3 && !t.chars().all(|c| c.is_ascii_digit()))
        .map(|t| t.to_string())
        .collect();
    keywords.dedup();
    keywords
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merchant_key_strips_and_truncates() {
        assert_eq!(
            merchant_key("NETFLIX.COM 866-579-7172 CA", MATCH_KEY_TOKENS),
            "netflix com 866"
        );
        assert_eq!(merchant_key("SQ *BLUE BOTTLE COFFEE", 3), "sq blue bottle");
        assert_eq!(merchant_key("  Spotify   USA  ", 3), "spotify usa");
    }

    #[test]
    fn test_merchant_key_empty_after_strip() {
        assert_eq!(merchant_key("***", MATCH_KEY_TOKENS), "");
        assert_eq!(merchant_key("", MATCH_KEY_TOKENS), "");
    }

    #[test]
    fn test_income_key_is_wider() {
        let key = merchant_key("ACME CORP PAYROLL DEP PPD ID 12345", INCOME_KEY_TOKENS);
        assert_eq!(key, "acme corp payroll dep ppd id");
    }

    #[test]
    fn test_loose_matching_containment() {
        assert!(keys_match_loose("netflix com", "netflix"));
        assert!(keys_match_loose("netflix", "netflix com 866"));
        assert!(!keys_match_loose("netflix", "spotify usa"));
        assert!(!keys_match_loose("", "netflix"));
    }

    #[test]
    fn test_strict_matching_requires_prefix_agreement() {
        assert!(keys_match_strict("acme corp payroll", "acme corp"));
        // Containment alone is not enough for strict mode
        assert!(!keys_match_strict("corp payroll", "acme corp payroll"));
        assert!(keys_match_strict("netflix com", "netflix com"));
    }

    #[test]
    fn test_dismissal_matching_is_most_permissive() {
        assert!(dismissal_matches("netflix com", "netflix"));
        assert!(dismissal_matches("netflix", "netflix com 866"));
        assert!(dismissal_matches("acme corp payroll", "acme corp dep"));
        assert!(!dismissal_matches("netflix", "spotify"));
    }

    #[test]
    fn test_extract_keywords_drops_noise() {
        let keywords = extract_keywords("NETFLIX.COM 866-579-7172 CA");
        assert_eq!(keywords, vec!["netflix".to_string(), "com".to_string()]);
    }
}
