//! State and domain-scoping logic shared by every active filter variant.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use crate::scanner::StringScanner;

/// Key of the sentinel entry describing "everywhere else".
pub const DEFAULT_DOMAIN: &str = "";

/// One segment of a domain list, as byte offsets into the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DomainSegment {
    pub pos: usize,
    pub len: usize,
    pub reverse: bool,
}

/// Outcome of scanning a separated domain list.
#[derive(Debug, Default)]
pub(crate) struct ParsedDomains {
    pub segments: Vec<DomainSegment>,
    pub has_includes: bool,
    pub has_empty: bool,
}

/// Splits `source` on `separator`. A segment starting with `~` is a
/// reverse (exclusion) entry; with `ignore_trailing_dot` a single trailing
/// dot is dropped. Empty segments are not emitted but recorded in
/// `has_empty`. The scanner's terminator doubles as a virtual separator so
/// the final segment is closed like any other.
pub(crate) fn parse_domain_list(
    source: &str,
    separator: u8,
    ignore_trailing_dot: bool,
) -> ParsedDomains {
    let mut parsed = ParsedDomains::default();
    let bytes = source.as_bytes();
    let mut scanner = StringScanner::new(source, 0, separator);
    let mut start = 0usize;
    let mut reverse = false;

    let mut done = scanner.done();
    while !done {
        done = scanner.done();
        let ch = scanner.next();
        if ch == b'~' && scanner.position() == start {
            start += 1;
            reverse = true;
        } else if ch == separator {
            let mut len = scanner.position() - start;
            if len > 0 && ignore_trailing_dot && bytes[start + len - 1] == b'.' {
                len -= 1;
            }
            if len > 0 {
                parsed.segments.push(DomainSegment {
                    pos: start,
                    len,
                    reverse,
                });
                if !reverse {
                    parsed.has_includes = true;
                }
            } else {
                parsed.has_empty = true;
            }
            start = scanner.position() + 1;
            reverse = false;
        }
    }
    parsed
}

/// The mutable state and scoping data shared by blocking, whitelist and
/// element-hiding filters. Domain maps and sitekey sets are built once at
/// parse time; only the hit statistics and the disabled flag change
/// afterwards.
pub struct ActiveFilter {
    disabled: AtomicBool,
    hit_count: AtomicU32,
    last_hit: AtomicU64,
    domains: Option<HashMap<String, bool>>,
    sitekeys: Option<HashSet<String>>,
    ignore_trailing_dot: bool,
}

impl ActiveFilter {
    pub(crate) fn new(ignore_trailing_dot: bool) -> Self {
        ActiveFilter {
            disabled: AtomicBool::new(false),
            hit_count: AtomicU32::new(0),
            last_hit: AtomicU64::new(0),
            domains: None,
            sitekeys: None,
            ignore_trailing_dot,
        }
    }

    /// Builds the domain map from parsed segments. The sentinel entry is
    /// always present and excludes "everywhere else" as soon as a single
    /// include entry exists.
    pub(crate) fn fill_domains(&mut self, source: &str, parsed: &ParsedDomains) {
        let mut map = HashMap::with_capacity(parsed.segments.len() + 1);
        for segment in &parsed.segments {
            map.insert(
                source[segment.pos..segment.pos + segment.len].to_string(),
                !segment.reverse,
            );
        }
        map.insert(DEFAULT_DOMAIN.to_string(), !parsed.has_includes);
        self.domains = Some(map);
    }

    pub(crate) fn set_sitekeys(&mut self, sitekeys: HashSet<String>) {
        self.sitekeys = Some(sitekeys);
    }

    pub fn domains(&self) -> Option<&HashMap<String, bool>> {
        self.domains.as_ref()
    }

    pub fn sitekeys(&self) -> Option<&HashSet<String>> {
        self.sitekeys.as_ref()
    }

    fn normalize_doc_domain<'a>(&self, doc_domain: &'a str) -> std::borrow::Cow<'a, str> {
        let stripped = if self.ignore_trailing_dot {
            doc_domain.strip_suffix('.').unwrap_or(doc_domain)
        } else {
            doc_domain
        };
        if stripped.bytes().any(|b| b.is_ascii_uppercase()) {
            std::borrow::Cow::Owned(stripped.to_ascii_lowercase())
        } else {
            std::borrow::Cow::Borrowed(stripped)
        }
    }

    /// Whether the filter applies on a document from `doc_domain` with the
    /// given sitekey. The most specific matching host entry wins: the full
    /// host is looked up first, then each dotted suffix.
    pub fn is_active_on_domain(&self, doc_domain: &str, sitekey: &str) -> bool {
        if let Some(sitekeys) = &self.sitekeys {
            if !sitekeys.contains(sitekey) {
                return false;
            }
        }

        // Without a domain list the filter matches everywhere.
        let domains = match &self.domains {
            Some(domains) => domains,
            None => return true,
        };

        // A document without a host name only matches unrestricted filters.
        if doc_domain.is_empty() {
            return domains.get(DEFAULT_DOMAIN).copied().unwrap_or(false);
        }

        let doc_domain = self.normalize_doc_domain(doc_domain);
        let mut current: &str = &doc_domain;
        loop {
            if let Some(&value) = domains.get(current) {
                return value;
            }
            match current.find('.') {
                Some(dot) => current = &current[dot + 1..],
                None => break,
            }
        }
        domains.get(DEFAULT_DOMAIN).copied().unwrap_or(false)
    }

    /// Whether the filter is scoped to `doc_domain` (or its subdomains) and
    /// nothing else.
    pub fn is_active_only_on_domain(&self, doc_domain: &str) -> bool {
        let domains = match &self.domains {
            Some(domains) => domains,
            None => return false,
        };
        if doc_domain.is_empty() || domains.get(DEFAULT_DOMAIN).copied().unwrap_or(false) {
            return false;
        }

        let doc_domain = self.normalize_doc_domain(doc_domain);
        for (entry, &included) in domains {
            if !included || entry.as_str() == doc_domain {
                continue;
            }
            let is_subdomain = entry.len() > doc_domain.len()
                && entry.ends_with(doc_domain.as_ref())
                && entry.as_bytes()[entry.len() - doc_domain.len() - 1] == b'.';
            if !is_subdomain {
                return false;
            }
        }
        true
    }

    /// A filter is generic when neither sitekeys nor include-mode domains
    /// restrict it.
    pub fn is_generic(&self) -> bool {
        self.sitekeys.is_none()
            && match &self.domains {
                Some(domains) => domains.get(DEFAULT_DOMAIN).copied().unwrap_or(false),
                None => true,
            }
    }

    pub fn disabled(&self) -> bool {
        self.disabled.load(Ordering::Relaxed)
    }

    pub fn hit_count(&self) -> u32 {
        self.hit_count.load(Ordering::Relaxed)
    }

    pub fn last_hit(&self) -> u64 {
        self.last_hit.load(Ordering::Relaxed)
    }

    /// Returns the previous value; the caller decides whether to notify.
    pub(crate) fn swap_disabled(&self, value: bool) -> bool {
        self.disabled.swap(value, Ordering::Relaxed)
    }

    pub(crate) fn swap_hit_count(&self, value: u32) -> u32 {
        self.hit_count.swap(value, Ordering::Relaxed)
    }

    pub(crate) fn swap_last_hit(&self, value: u64) -> u64 {
        self.last_hit.swap(value, Ordering::Relaxed)
    }
}
