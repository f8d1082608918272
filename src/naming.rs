//! Transaction name normalization.
//!
//! Transaction names end up inside SQL comments (`/* trans_start:<name> */`),
//! so they are reduced to a lowercase, underscore-separated token first.

/// Converts a human label into a token that is safe to embed in a SQL comment.
pub trait NameNormalizer: Send + Sync {
    fn to_canonical_token(&self, name: &str) -> String;
}

/// Default normalizer: `"My Report"` and `"MyReport"` both become `my_report`.
///
/// Word boundaries are camel-case humps, acronym ends (`HTTPServer` → `http_server`)
/// and any run of characters that are not alphanumeric. Only alphanumerics and `_`
/// survive, so the output can never terminate the surrounding comment.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnderscoreNormalizer;

impl NameNormalizer for UnderscoreNormalizer {
    fn to_canonical_token(&self, name: &str) -> String {
        let chars: Vec<char> = name.chars().collect();
        let mut token = String::with_capacity(name.len() + 4);

        for (i, &c) in chars.iter().enumerate() {
            if !c.is_alphanumeric() {
                push_separator(&mut token);
                continue;
            }
            if c.is_uppercase() && i > 0 {
                let prev = chars[i - 1];
                let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
                if prev.is_lowercase()
                    || prev.is_numeric()
                    || (prev.is_uppercase() && next_is_lower)
                {
                    push_separator(&mut token);
                }
            }
            token.extend(c.to_lowercase());
        }

        token.trim_end_matches('_').to_string()
    }
}

fn push_separator(token: &mut String) {
    if !token.is_empty() && !token.ends_with('_') {
        token.push('_');
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(name: &str) -> String {
        UnderscoreNormalizer.to_canonical_token(name)
    }

    #[test]
    fn test_spaces_become_underscores() {
        assert_eq!(token("My Report"), "my_report");
        assert_eq!(token("  monthly   totals  "), "monthly_totals");
    }

    #[test]
    fn test_camel_and_pascal_case() {
        assert_eq!(token("MonthlyReport"), "monthly_report");
        assert_eq!(token("importUsers2024Batch"), "import_users2024_batch");
        assert_eq!(token("HTTPServerSync"), "http_server_sync");
    }

    #[test]
    fn test_already_canonical_is_unchanged() {
        assert_eq!(token("nightly_cleanup"), "nightly_cleanup");
    }

    #[test]
    fn test_comment_terminators_are_stripped() {
        let t = token("evil */ DROP TABLE users; /*");
        assert!(!t.contains("*/"));
        assert!(!t.contains('/'));
        assert!(!t.contains(';'));
        assert_eq!(t, "evil_drop_table_users");
    }

    #[test]
    fn test_empty_and_symbol_only() {
        assert_eq!(token(""), "");
        assert_eq!(token("---"), "");
    }
}
