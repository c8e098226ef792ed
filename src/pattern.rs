//! The pattern-matching engine behind network filters.
//!
//! Network filter patterns use the filter-list syntax (`*` wildcards, `^`
//! separator placeholders, `||`/`|` anchors, `/…/` literal regular
//! expressions). The core never interprets that syntax itself; it hands the
//! pattern to a [`PatternMatcher`] and caches whatever comes back. The
//! default engine translates the syntax to a [`regex::Regex`].

use regex::Regex;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum PatternError {
    #[error("pattern failed to compile: {0}")]
    Syntax(#[from] regex::Error),
}

/// A compiled pattern, ready to be tested against request URLs.
pub trait CompiledPattern: Send + Sync {
    fn matches(&self, url: &str) -> bool;
}

impl CompiledPattern for Regex {
    fn matches(&self, url: &str) -> bool {
        self.is_match(url)
    }
}

/// Compiles filter-list patterns. Compilation is invoked lazily, on the
/// first match attempt of a filter.
pub trait PatternMatcher {
    fn compile(
        &self,
        pattern: &str,
        match_case: bool,
    ) -> Result<Box<dyn CompiledPattern>, PatternError>;
}

/// Matches any separator character or the end of the URL.
const SEPARATOR_CLASS: &str = "(?:[^\\w\\d_.%-]|$)";

/// Matches a scheme followed by any hostname label prefix, for `||` anchors.
const HOSTNAME_ANCHOR: &str = "^[\\w-]+:/+(?:[^/]+\\.)?";

fn is_meta(ch: char) -> bool {
    matches!(
        ch,
        '^' | '$' | '.' | '|' | '?' | '*' | '+' | '(' | ')' | '[' | ']' | '{' | '}' | '\\'
    )
}

/// Translates a filter-list pattern into regex source text.
pub fn filter_to_regex(pattern: &str) -> String {
    // Patterns wrapped in slashes are raw regular expressions.
    if pattern.len() >= 2 && pattern.starts_with('/') && pattern.ends_with('/') {
        return pattern[1..pattern.len() - 1].to_string();
    }

    // Collapse runs of wildcards, and treat a trailing "^|" like "^" so the
    // separator class can take over the anchoring.
    let mut collapsed = String::with_capacity(pattern.len());
    let mut last_star = false;
    for ch in pattern.chars() {
        if ch == '*' && last_star {
            continue;
        }
        last_star = ch == '*';
        collapsed.push(ch);
    }
    if collapsed.ends_with("^|") {
        collapsed.pop();
    }

    let mut rest = collapsed.as_str();
    let mut result = String::with_capacity(collapsed.len() * 2);
    if let Some(after) = rest.strip_prefix("||") {
        result.push_str(HOSTNAME_ANCHOR);
        rest = after;
    } else if let Some(after) = rest.strip_prefix('|') {
        result.push('^');
        rest = after;
    }

    let last = rest.chars().count().wrapping_sub(1);
    for (i, ch) in rest.chars().enumerate() {
        match ch {
            '*' => result.push_str(".*"),
            '^' => result.push_str(SEPARATOR_CLASS),
            '|' if i == last => result.push('$'),
            ch if is_meta(ch) => {
                result.push('\\');
                result.push(ch);
            }
            ch => result.push(ch),
        }
    }

    // Leading and trailing ".*" are implied by the lack of anchors.
    if result.starts_with(".*") {
        result.drain(..2);
    }
    if result.ends_with(".*") {
        result.truncate(result.len() - 2);
    }
    result
}

/// The default matcher backed by the `regex` crate.
#[derive(Debug, Default)]
pub struct RegexEngine;

impl PatternMatcher for RegexEngine {
    fn compile(
        &self,
        pattern: &str,
        match_case: bool,
    ) -> Result<Box<dyn CompiledPattern>, PatternError> {
        let source = filter_to_regex(pattern);
        let compiled = if match_case {
            Regex::new(&source)?
        } else {
            Regex::new(&format!("(?i){}", source))?
        };
        Ok(Box::new(compiled))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(pattern: &str, url: &str) -> bool {
        RegexEngine
            .compile(pattern, false)
            .unwrap()
            .matches(url)
    }

    #[test]
    fn plain_substring() {
        assert!(matches("/banner/", "http://example.com/banner/img.gif"));
        assert!(!matches("/banner/", "http://example.com/img.gif"));
    }

    #[test]
    fn wildcard_and_separator() {
        assert!(matches("ads*banner", "http://example.com/ads/big/banner.gif"));
        assert!(matches("||example.com^", "http://example.com/ad"));
        assert!(matches("||example.com^", "http://sub.example.com/ad"));
        assert!(!matches("||example.com^", "http://badexample.com/ad"));
        // '^' matches the end of the URL as well.
        assert!(matches("||example.com^", "http://example.com"));
    }

    #[test]
    fn anchors() {
        assert!(matches("|http://example.com", "http://example.com/x"));
        assert!(!matches("|ttp://example.com", "http://example.com/x"));
        assert!(matches("swf|", "http://example.com/annoyingflash.swf"));
        assert!(!matches("swf|", "http://example.com/swf/index.html"));
    }

    #[test]
    fn literal_regex_passthrough() {
        assert!(matches("/ad[0-9]+\\./", "http://example.com/ad12."));
        assert!(!matches("/ad[0-9]+\\./", "http://example.com/ad."));
    }

    #[test]
    fn case_sensitivity() {
        assert!(matches("BANNER", "http://example.com/banner"));
        let compiled = RegexEngine.compile("BANNER", true).unwrap();
        assert!(!compiled.matches("http://example.com/banner"));
        assert!(compiled.matches("http://example.com/BANNER"));
    }

    #[test]
    fn bad_pattern_reports_error() {
        assert!(RegexEngine.compile("/[/", true).is_err());
    }
}
