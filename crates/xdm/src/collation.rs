//! String collations.
//!
//! Every function that compares, sorts or groups strings routes through a
//! [`Collation`] resolved from a URI. Two collations are built in: Unicode
//! codepoint order and an ASCII case-insensitive one; `?lang=` URIs fall
//! back to a case-folding comparison for the requested language.

use std::cmp::Ordering;

use crate::error::XdmError;

/// URI of the Unicode codepoint collation, the default everywhere.
pub const CODEPOINT_URI: &str = "http://www.w3.org/2005/xpath-functions/collation/codepoint";
/// URI of the HTML ASCII case-insensitive collation.
pub const HTML_ASCII_CASE_INSENSITIVE_URI: &str =
    "http://www.w3.org/2005/xpath-functions/collation/html-ascii-case-insensitive";
/// Prefix of the Unicode Collation Algorithm family of URIs.
pub const UCA_PREFIX: &str = "http://www.w3.org/2013/collation/UCA";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Collation {
    /// Unicode codepoint order.
    Codepoint,
    /// ASCII case-insensitive comparison.
    CaseBlind,
    /// Language-tagged comparison; compares case-folded, ties broken by
    /// codepoint order so the ordering stays total.
    Locale(String),
}

impl Default for Collation {
    fn default() -> Self {
        Collation::Codepoint
    }
}

impl Collation {
    /// Resolves a collation URI. Unknown URIs are an error; callers map it
    /// to the error code their context requires.
    pub fn for_uri(uri: &str) -> Result<Collation, XdmError> {
        if uri == CODEPOINT_URI {
            return Ok(Collation::Codepoint);
        }
        if uri == HTML_ASCII_CASE_INSENSITIVE_URI {
            return Ok(Collation::CaseBlind);
        }
        if let Some(query) = uri.strip_prefix(UCA_PREFIX) {
            let lang = query
                .split(['?', '&', ';'])
                .find_map(|part| part.strip_prefix("lang="))
                .unwrap_or("und");
            return Ok(Collation::Locale(lang.to_string()));
        }
        Err(XdmError::UnknownCollation(uri.to_string()))
    }

    /// The URI this collation round-trips through [`Collation::for_uri`].
    pub fn uri(&self) -> String {
        match self {
            Collation::Codepoint => CODEPOINT_URI.to_string(),
            Collation::CaseBlind => HTML_ASCII_CASE_INSENSITIVE_URI.to_string(),
            Collation::Locale(lang) => format!("{}?lang={}", UCA_PREFIX, lang),
        }
    }

    pub fn compare(&self, a: &str, b: &str) -> Ordering {
        match self {
            Collation::Codepoint => a.cmp(b),
            Collation::CaseBlind => {
                let fold = |s: &str| s.chars().map(|c| c.to_ascii_lowercase()).collect::<String>();
                fold(a).cmp(&fold(b))
            }
            Collation::Locale(_) => {
                let fold = |s: &str| s.to_lowercase();
                fold(a).cmp(&fold(b)).then_with(|| a.cmp(b))
            }
        }
    }

    pub fn eq(&self, a: &str, b: &str) -> bool {
        self.compare(a, b) == Ordering::Equal
    }

    /// Canonical key under this collation; equal strings map to equal keys.
    /// Used when grouping values in hash maps.
    pub fn key(&self, s: &str) -> String {
        match self {
            Collation::Codepoint => s.to_string(),
            Collation::CaseBlind => s.chars().map(|c| c.to_ascii_lowercase()).collect(),
            Collation::Locale(_) => s.to_lowercase(),
        }
    }

    pub fn contains(&self, haystack: &str, needle: &str) -> bool {
        self.key(haystack).contains(&self.key(needle))
    }

    pub fn starts_with(&self, haystack: &str, needle: &str) -> bool {
        self.key(haystack).starts_with(&self.key(needle))
    }

    pub fn ends_with(&self, haystack: &str, needle: &str) -> bool {
        self.key(haystack).ends_with(&self.key(needle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codepoint_uri_round_trips() {
        let c = Collation::for_uri(CODEPOINT_URI).unwrap();
        assert_eq!(c, Collation::Codepoint);
        assert_eq!(Collation::for_uri(&c.uri()).unwrap(), c);
    }

    #[test]
    fn locale_uri_round_trips() {
        let c = Collation::for_uri("http://www.w3.org/2013/collation/UCA?lang=de").unwrap();
        assert_eq!(c, Collation::Locale("de".to_string()));
        assert_eq!(Collation::for_uri(&c.uri()).unwrap(), c);
    }

    #[test]
    fn unknown_uri_is_an_error() {
        assert!(Collation::for_uri("http://example.com/not-a-collation").is_err());
    }

    #[test]
    fn case_blind_compares_case_insensitively() {
        let c = Collation::for_uri(HTML_ASCII_CASE_INSENSITIVE_URI).unwrap();
        assert!(c.eq("Hello", "hELLO"));
        assert_eq!(c.compare("abc", "ABD"), Ordering::Less);
    }

    #[test]
    fn codepoint_is_case_sensitive() {
        assert!(!Collation::Codepoint.eq("Hello", "hello"));
        assert_eq!(Collation::Codepoint.compare("B", "a"), Ordering::Less);
    }
}
