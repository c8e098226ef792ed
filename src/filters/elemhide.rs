//! Parsing of element-hiding rules: `domains##selector`, exceptions
//! (`#@#`) and emulation rules (`#?#`).
//!
//! The payload stores byte offsets into the canonical filter text rather
//! than copies; the selector and the domain source are recovered on demand.

use std::borrow::Cow;

use itertools::Itertools;

use crate::filters::active::{parse_domain_list, ActiveFilter};
use crate::filters::InvalidReason;
use crate::scanner::StringScanner;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ElemHideKind {
    Hide,
    Exception,
    Emulation,
}

/// Payload of the three element-hiding variants.
pub struct ElemHideData {
    pub(crate) active: ActiveFilter,
    domains_end: usize,
    selector_start: usize,
}

pub(crate) enum ElemHideParse<'a> {
    /// Not an element-hiding rule at all; the caller falls through to the
    /// network parser.
    Unknown,
    Invalid {
        text: Cow<'a, str>,
        reason: InvalidReason,
    },
    Parsed {
        kind: ElemHideKind,
        text: Cow<'a, str>,
        data: ElemHideData,
    },
}

/// Removes the spaces preceding the selector and shifts the recorded
/// offsets accordingly. The first character is never a space; the text was
/// trimmed before parsing.
fn strip_spaces(text: &str, domains_end: &mut usize, selector_start: &mut usize) -> String {
    let mut result = String::with_capacity(text.len());
    let mut removed = 0;
    let mut new_domains_end = *domains_end;
    for (pos, ch) in text.char_indices() {
        if pos == *domains_end {
            new_domains_end = *domains_end - removed;
        }
        if pos > 0 && pos < *selector_start && ch == ' ' {
            removed += 1;
        } else {
            result.push(ch);
        }
    }
    *selector_start -= removed;
    *domains_end = new_domains_end;
    result
}

/// Classifies `text` as an element-hiding rule, rewriting it if spaces or
/// uppercase domain characters need to be normalized away.
pub(crate) fn parse(text: &str) -> ElemHideParse<'_> {
    let mut scanner = StringScanner::new(text, 0, 0);

    // Domains part, up to the first '#'.
    let mut seen_spaces = false;
    let mut domains_end = 0usize;
    while !scanner.done() {
        let next = scanner.next();
        if next == b'#' {
            domains_end = scanner.position();
            break;
        }
        match next {
            b'/' | b'*' | b'|' | b'@' | b'"' | b'!' => return ElemHideParse::Unknown,
            b' ' => seen_spaces = true,
            _ => {}
        }
    }

    seen_spaces |= scanner.skip(b' ');
    let exception = scanner.skip_one(b'@');
    let mut emulation = false;
    if exception {
        seen_spaces |= scanner.skip(b' ');
    } else {
        emulation = scanner.skip_one(b'?');
    }

    if scanner.next() != b'#' {
        return ElemHideParse::Unknown;
    }

    // Selector part; it must not be empty.
    seen_spaces |= scanner.skip(b' ');
    if scanner.done() {
        return ElemHideParse::Unknown;
    }
    let mut selector_start = scanner.position() + 1;

    let needs_lowercase = text.as_bytes()[..domains_end]
        .iter()
        .any(u8::is_ascii_uppercase);
    let text: Cow<str> = if seen_spaces {
        let mut rewritten = strip_spaces(text, &mut domains_end, &mut selector_start);
        rewritten[..domains_end].make_ascii_lowercase();
        Cow::Owned(rewritten)
    } else if needs_lowercase {
        let mut rewritten = text.to_string();
        rewritten[..domains_end].make_ascii_lowercase();
        Cow::Owned(rewritten)
    } else {
        Cow::Borrowed(text)
    };

    let mut active = ActiveFilter::new(false);
    if domains_end > 0 {
        let parsed = parse_domain_list(&text[..domains_end], b',', false);
        if parsed.has_empty {
            return ElemHideParse::Invalid {
                text,
                reason: InvalidReason::InvalidDomain,
            };
        }
        active.fill_domains(&text[..domains_end], &parsed);
    }

    let kind = if exception {
        ElemHideKind::Exception
    } else if emulation {
        ElemHideKind::Emulation
    } else {
        ElemHideKind::Hide
    };

    ElemHideParse::Parsed {
        kind,
        text,
        data: ElemHideData {
            active,
            domains_end,
            selector_start,
        },
    }
}

const OPENING_CURLY_REPLACEMENT: &str = "\\7B ";
const CLOSING_CURLY_REPLACEMENT: &str = "\\7D ";

impl ElemHideData {
    pub fn has_domains(&self) -> bool {
        self.domains_end != 0
    }

    /// The comma-separated domains prefix, exactly as written.
    pub fn domains_source<'a>(&self, text: &'a str) -> &'a str {
        &text[..self.domains_end]
    }

    pub(crate) fn raw_selector<'a>(&self, text: &'a str) -> &'a str {
        &text[self.selector_start..]
    }

    /// The selector with curly braces escaped, safe for direct insertion
    /// into a stylesheet.
    pub(crate) fn selector<'a>(&self, text: &'a str) -> Cow<'a, str> {
        let selector = self.raw_selector(text);
        if !selector.contains(|c: char| c == '{' || c == '}') {
            return Cow::Borrowed(selector);
        }
        let mut escaped = String::with_capacity(selector.len() + 8);
        for ch in selector.chars() {
            match ch {
                '{' => escaped.push_str(OPENING_CURLY_REPLACEMENT),
                '}' => escaped.push_str(CLOSING_CURLY_REPLACEMENT),
                ch => escaped.push(ch),
            }
        }
        Cow::Owned(escaped)
    }

    /// The include-mode domains joined with commas, for display purposes.
    pub(crate) fn selector_domain(&self) -> String {
        match self.active.domains() {
            Some(domains) => domains
                .iter()
                .filter(|(domain, &included)| included && !domain.is_empty())
                .map(|(domain, _)| domain.as_str())
                .join(","),
            None => String::new(),
        }
    }
}
