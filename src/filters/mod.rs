//! Representations of individual filter rules: the taxonomy, the parser
//! entry point and the deduplicating registry.
//!
//! All rule texts flow through [`Filter::from_text`]. It normalizes
//! whitespace, classifies the line as one of the seven filter variants and
//! returns a shared instance: as long as a filter for the same canonical
//! text is alive anywhere in the process, the same instance is handed out
//! again. The registry itself only holds weak references; strong ownership
//! lies with subscriptions and the matching indexes.

pub mod active;
pub mod elemhide;
pub mod network;

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use once_cell::sync::Lazy;
use thiserror::Error;

use crate::notifier::{self, Topic};
use crate::pattern::PatternMatcher;
use crate::request::Request;
use active::ActiveFilter;
use elemhide::{ElemHideData, ElemHideKind, ElemHideParse};
use network::NetworkFilter;

/// Shared handle to a filter. Subscriptions and indexes keep these alive.
pub type FilterRef = Arc<Filter>;

/// Reason codes attached to rules that parse into a recognizable shape but
/// violate its semantics. The codes are stable identifiers that UI layers
/// map to localized messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InvalidReason {
    #[error("filter_invalid_domain")]
    InvalidDomain,
    #[error("filter_unknown_option")]
    UnknownOption,
    #[error("filter_elemhideemulation_nodomain")]
    EmulationNoDomain,
}

/// The seven filter variants. Active variants carry their payload; the
/// shared active-filter state is reachable through [`Filter::active`].
pub enum FilterKind {
    Invalid(InvalidReason),
    Comment,
    Blocking(NetworkFilter),
    Whitelist(NetworkFilter),
    ElemHide(ElemHideData),
    ElemHideException(ElemHideData),
    ElemHideEmulation(ElemHideData),
}

/// One parsed rule line. Value identity is the canonical text.
pub struct Filter {
    text: String,
    kind: FilterKind,
}

static KNOWN_FILTERS: Lazy<Mutex<HashMap<String, Weak<Filter>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Trims leading characters up to and including space, removes other
/// control characters anywhere, and trims trailing spaces. The result is
/// what filter identity is keyed on.
pub(crate) fn normalize_whitespace(text: &str) -> Cow<'_, str> {
    let trimmed = text.trim_start_matches(|c: char| c <= ' ');
    let cleaned: Cow<str> = if trimmed.bytes().any(|b| b < b' ') {
        Cow::Owned(trimmed.chars().filter(|&c| c >= ' ').collect())
    } else {
        Cow::Borrowed(trimmed)
    };
    match cleaned {
        Cow::Borrowed(s) => Cow::Borrowed(s.trim_end_matches(' ')),
        Cow::Owned(mut s) => {
            s.truncate(s.trim_end_matches(' ').len());
            Cow::Owned(s)
        }
    }
}

/// Classification order: comment, element-hide family, network. The
/// element-hide parser may rewrite the text; network rules accept anything,
/// so no line ever remains unrecognized.
fn classify(normalized: &str) -> (Cow<'_, str>, FilterKind) {
    if normalized.starts_with('!') {
        return (Cow::Borrowed(normalized), FilterKind::Comment);
    }
    match elemhide::parse(normalized) {
        ElemHideParse::Parsed { kind, text, data } => {
            let kind = match kind {
                ElemHideKind::Hide => FilterKind::ElemHide(data),
                ElemHideKind::Exception => FilterKind::ElemHideException(data),
                ElemHideKind::Emulation => {
                    if data.active.is_generic() {
                        FilterKind::Invalid(InvalidReason::EmulationNoDomain)
                    } else {
                        FilterKind::ElemHideEmulation(data)
                    }
                }
            };
            (text, kind)
        }
        ElemHideParse::Invalid { text, reason } => (text, FilterKind::Invalid(reason)),
        ElemHideParse::Unknown => match network::parse(normalized) {
            Ok((data, true)) => (Cow::Borrowed(normalized), FilterKind::Whitelist(data)),
            Ok((data, false)) => (Cow::Borrowed(normalized), FilterKind::Blocking(data)),
            Err(reason) => (Cow::Borrowed(normalized), FilterKind::Invalid(reason)),
        },
    }
}

impl Filter {
    /// Parses `text` into a shared filter instance. Lines that are empty
    /// after normalization yield `None`.
    pub fn from_text(text: &str) -> Option<FilterRef> {
        let normalized = normalize_whitespace(text);
        if normalized.is_empty() {
            return None;
        }
        let (canonical, kind) = classify(&normalized);

        let mut known = KNOWN_FILTERS
            .lock()
            .expect("acquire filter registry mutex");
        if let Some(existing) = known.get(canonical.as_ref()).and_then(Weak::upgrade) {
            return Some(existing);
        }
        let filter = Arc::new(Filter {
            text: canonical.into_owned(),
            kind,
        });
        // The key is the filter's own canonical text, owned by the map; the
        // parse buffer above may be a borrowed view into the caller's line.
        known.insert(filter.text.clone(), Arc::downgrade(&filter));
        Some(filter)
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn kind(&self) -> &FilterKind {
        &self.kind
    }

    /// The variant name as exposed to embedders.
    pub fn filter_type(&self) -> &'static str {
        match self.kind {
            FilterKind::Invalid(_) => "invalid",
            FilterKind::Comment => "comment",
            FilterKind::Blocking(_) => "blocking",
            FilterKind::Whitelist(_) => "whitelist",
            FilterKind::ElemHide(_) => "elemhide",
            FilterKind::ElemHideException(_) => "elemhideexception",
            FilterKind::ElemHideEmulation(_) => "elemhideemulation",
        }
    }

    pub fn reason(&self) -> Option<InvalidReason> {
        match self.kind {
            FilterKind::Invalid(reason) => Some(reason),
            _ => None,
        }
    }

    /// The shared state of the five active variants; `None` for comments
    /// and invalid rules.
    pub fn active(&self) -> Option<&ActiveFilter> {
        match &self.kind {
            FilterKind::Blocking(data) | FilterKind::Whitelist(data) => Some(&data.active),
            FilterKind::ElemHide(data)
            | FilterKind::ElemHideException(data)
            | FilterKind::ElemHideEmulation(data) => Some(&data.active),
            FilterKind::Invalid(_) | FilterKind::Comment => None,
        }
    }

    fn network(&self) -> Option<&NetworkFilter> {
        match &self.kind {
            FilterKind::Blocking(data) | FilterKind::Whitelist(data) => Some(data),
            _ => None,
        }
    }

    fn elem_hide(&self) -> Option<&ElemHideData> {
        match &self.kind {
            FilterKind::ElemHide(data)
            | FilterKind::ElemHideException(data)
            | FilterKind::ElemHideEmulation(data) => Some(data),
            _ => None,
        }
    }

    pub fn disabled(&self) -> bool {
        self.active().map_or(false, ActiveFilter::disabled)
    }

    pub fn set_disabled(&self, value: bool) {
        if let Some(active) = self.active() {
            if active.swap_disabled(value) != value {
                notifier::filter_change(Topic::FilterDisabled, self);
            }
        }
    }

    pub fn hit_count(&self) -> u32 {
        self.active().map_or(0, ActiveFilter::hit_count)
    }

    pub fn set_hit_count(&self, value: u32) {
        if let Some(active) = self.active() {
            if active.swap_hit_count(value) != value {
                notifier::filter_change(Topic::FilterHitcount, self);
            }
        }
    }

    pub fn last_hit(&self) -> u64 {
        self.active().map_or(0, ActiveFilter::last_hit)
    }

    pub fn set_last_hit(&self, value: u64) {
        if let Some(active) = self.active() {
            if active.swap_last_hit(value) != value {
                notifier::filter_change(Topic::FilterLasthit, self);
            }
        }
    }

    /// Tests a network rule against a request. Non-network filters never
    /// match.
    pub fn matches(&self, request: &Request, matcher: &dyn PatternMatcher) -> bool {
        self.network()
            .map_or(false, |data| data.matches(&self.text, request, matcher))
    }

    /// The pattern part of a network rule.
    pub fn pattern(&self) -> Option<&str> {
        self.network().map(|data| data.pattern(&self.text))
    }

    /// The collapse preference of a blocking rule.
    pub fn collapse(&self) -> Option<bool> {
        match &self.kind {
            FilterKind::Blocking(data) => data.collapse(),
            _ => None,
        }
    }

    /// The selector of an element-hiding rule, curly braces escaped.
    pub fn selector(&self) -> Option<Cow<'_, str>> {
        self.elem_hide().map(|data| data.selector(&self.text))
    }

    /// The selector exactly as written in the rule.
    pub fn raw_selector(&self) -> Option<&str> {
        self.elem_hide().map(|data| data.raw_selector(&self.text))
    }

    /// The include-mode domains of an element-hiding rule, comma-joined.
    pub fn selector_domain(&self) -> Option<String> {
        self.elem_hide().map(ElemHideData::selector_domain)
    }

    /// The textual form consumed by storage layers.
    pub fn serialize(&self) -> String {
        let mut result = String::from("[Filter]\ntext=");
        result.push_str(&self.text);
        result.push('\n');
        if let Some(active) = self.active() {
            if active.disabled() {
                result.push_str("disabled=true\n");
            }
            let hit_count = active.hit_count();
            if hit_count != 0 {
                result.push_str(&format!("hitCount={}\n", hit_count));
            }
            let last_hit = active.last_hit();
            if last_hit != 0 {
                result.push_str(&format!("lastHit={}\n", last_hit));
            }
        }
        result
    }
}

impl Drop for Filter {
    fn drop(&mut self) {
        // Purge the stale registry entry, unless a newer filter with the
        // same text already replaced it.
        if let Ok(mut known) = KNOWN_FILTERS.lock() {
            if let Some(entry) = known.get(&self.text) {
                if entry.upgrade().is_none() {
                    known.remove(&self.text);
                }
            }
        }
    }
}

impl PartialEq for Filter {
    fn eq(&self, other: &Self) -> bool {
        self.text == other.text
    }
}

impl Eq for Filter {}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({:?})", self.filter_type(), self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_text(text: &str) -> FilterRef {
        Filter::from_text(text).expect("filter expected")
    }

    #[test]
    fn normalization() {
        assert_eq!(normalize_whitespace("  ||ads.example.com^  "), "||ads.example.com^");
        assert_eq!(normalize_whitespace("\t\r\n foo \x01bar "), "foo bar");
        assert_eq!(normalize_whitespace("   "), "");
        // Interior spaces survive, interior control characters do not.
        assert_eq!(normalize_whitespace("a b\x02c"), "a bc");
        // Idempotent.
        let once = normalize_whitespace(" a\x02 b ").into_owned();
        assert_eq!(normalize_whitespace(&once), once);
    }

    #[test]
    fn empty_input_yields_no_filter() {
        assert!(Filter::from_text("").is_none());
        assert!(Filter::from_text(" \t ").is_none());
    }

    #[test]
    fn classification() {
        assert_eq!(from_text("!comment").filter_type(), "comment");
        assert_eq!(from_text("! Title: x").filter_type(), "comment");
        assert_eq!(from_text("||example.com^").filter_type(), "blocking");
        assert_eq!(from_text("@@||example.com^").filter_type(), "whitelist");
        assert_eq!(from_text("##.banner").filter_type(), "elemhide");
        assert_eq!(from_text("foo.com#@#.banner").filter_type(), "elemhideexception");
        assert_eq!(
            from_text("foo.com#?#div:-abp-has(.ad)").filter_type(),
            "elemhideemulation"
        );
        assert_eq!(from_text("||example.com^$bogus").filter_type(), "invalid");
    }

    #[test]
    fn invalid_reasons() {
        assert_eq!(
            from_text("foo.com,,bar.com##.ad").reason(),
            Some(InvalidReason::InvalidDomain)
        );
        assert_eq!(
            from_text("||example.com^$nonsense").reason(),
            Some(InvalidReason::UnknownOption)
        );
        assert_eq!(
            from_text("#?#div:-abp-has(.ad)").reason(),
            Some(InvalidReason::EmulationNoDomain)
        );
        // An emulation rule with only exclusions stays generic.
        assert_eq!(
            from_text("~foo.com#?#div:-abp-has(.ad)").reason(),
            Some(InvalidReason::EmulationNoDomain)
        );
        assert_eq!(from_text("foo.com#?#div:-abp-has(.ad)").reason(), None);
    }

    #[test]
    fn whitespace_normalization_dedups() {
        let padded = from_text("  ||ads.example.com^  ");
        let plain = from_text("||ads.example.com^");
        assert_eq!(padded.text(), "||ads.example.com^");
        assert!(Arc::ptr_eq(&padded, &plain));
    }

    #[test]
    fn elemhide_rewrite_dedups() {
        let spaced = from_text("Foo.com ## .ad-spaced");
        let plain = from_text("foo.com##.ad-spaced");
        assert_eq!(spaced.text(), "foo.com##.ad-spaced");
        assert!(Arc::ptr_eq(&spaced, &plain));
    }

    #[test]
    fn registry_entry_expires_with_last_reference() {
        let first = from_text("||registry-expiry.example^");
        let again = from_text("||registry-expiry.example^");
        assert!(Arc::ptr_eq(&first, &again));
        drop(first);
        drop(again);
        // All strong references are gone, so a new instance is created.
        let fresh = from_text("||registry-expiry.example^");
        assert_eq!(fresh.text(), "||registry-expiry.example^");
    }

    #[test]
    fn serialize_roundtrip_fields() {
        let filter = from_text("||serialize.example^$script");
        assert_eq!(
            filter.serialize(),
            "[Filter]\ntext=||serialize.example^$script\n"
        );

        filter.set_disabled(true);
        filter.set_hit_count(12);
        filter.set_last_hit(1_234_567);
        assert_eq!(
            filter.serialize(),
            "[Filter]\ntext=||serialize.example^$script\n\
             disabled=true\nhitCount=12\nlastHit=1234567\n"
        );

        filter.set_disabled(false);
        filter.set_hit_count(0);
        filter.set_last_hit(0);
        assert_eq!(
            filter.serialize(),
            "[Filter]\ntext=||serialize.example^$script\n"
        );
    }

    #[test]
    fn comments_carry_no_active_state() {
        let comment = from_text("! some comment");
        assert!(comment.active().is_none());
        comment.set_disabled(true);
        assert!(!comment.disabled());
        assert_eq!(comment.serialize(), "[Filter]\ntext=! some comment\n");
    }

    #[test]
    fn value_identity_is_the_text() {
        let a = from_text("||identity.example^");
        let b = from_text("||identity.example^$~script");
        assert_ne!(*a, *b);
        assert_eq!(*a, *from_text(" ||identity.example^ "));
    }
}
