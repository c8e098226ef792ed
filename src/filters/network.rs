//! Parsing and matching of network rules: `[@@]pattern[$option,…]`.

use bitflags::bitflags;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::filters::active::{parse_domain_list, ActiveFilter};
use crate::filters::InvalidReason;
use crate::pattern::{CompiledPattern, PatternError, PatternMatcher};
use crate::request::Request;

bitflags! {
    /// Content types a network filter can apply to. The bit values are part
    /// of the serialized state of existing installations and must not change.
    #[derive(Serialize, Deserialize)]
    pub struct TypeMask: u32 {
        const OTHER = 1;
        const SCRIPT = 1 << 1;
        const IMAGE = 1 << 2;
        const STYLESHEET = 1 << 3;
        const OBJECT = 1 << 4;
        const SUBDOCUMENT = 1 << 5;
        const DOCUMENT = 1 << 6;
        const WEBSOCKET = 1 << 7;
        const WEBRTC = 1 << 8;
        const PING = 1 << 10;
        const XMLHTTPREQUEST = 1 << 11;
        const OBJECT_SUBREQUEST = 1 << 12;
        const MEDIA = 1 << 14;
        const FONT = 1 << 15;
        const POPUP = 1 << 24;
        const GENERICBLOCK = 1 << 25;
        const GENERICHIDE = 1 << 26;
        const ELEMHIDE = 1 << 27;

        /// What a filter applies to when no type option says otherwise:
        /// every request type, but none of the page-level types.
        const DEFAULT = Self::OTHER.bits
            | Self::SCRIPT.bits
            | Self::IMAGE.bits
            | Self::STYLESHEET.bits
            | Self::OBJECT.bits
            | Self::SUBDOCUMENT.bits
            | Self::WEBSOCKET.bits
            | Self::WEBRTC.bits
            | Self::PING.bits
            | Self::XMLHTTPREQUEST.bits
            | Self::OBJECT_SUBREQUEST.bits
            | Self::MEDIA.bits
            | Self::FONT.bits;
    }
}

fn type_option(name: &str) -> Option<TypeMask> {
    let mask = match name {
        "other" => TypeMask::OTHER,
        "script" => TypeMask::SCRIPT,
        "image" => TypeMask::IMAGE,
        "stylesheet" => TypeMask::STYLESHEET,
        "object" => TypeMask::OBJECT,
        "subdocument" => TypeMask::SUBDOCUMENT,
        "document" => TypeMask::DOCUMENT,
        "websocket" => TypeMask::WEBSOCKET,
        "webrtc" => TypeMask::WEBRTC,
        "ping" => TypeMask::PING,
        "xmlhttprequest" => TypeMask::XMLHTTPREQUEST,
        "object-subrequest" => TypeMask::OBJECT_SUBREQUEST,
        "media" => TypeMask::MEDIA,
        "font" => TypeMask::FONT,
        "popup" => TypeMask::POPUP,
        "genericblock" => TypeMask::GENERICBLOCK,
        "generichide" => TypeMask::GENERICHIDE,
        "elemhide" => TypeMask::ELEMHIDE,
        _ => return None,
    };
    Some(mask)
}

/// Payload of blocking and whitelist rules. The pattern is kept as offsets
/// into the canonical text and only compiled on the first match attempt.
pub struct NetworkFilter {
    pub(crate) active: ActiveFilter,
    pattern_start: usize,
    pattern_end: usize,
    content_type: TypeMask,
    match_case: bool,
    third_party: Option<bool>,
    collapse: Option<bool>,
    compiled: OnceCell<Result<Box<dyn CompiledPattern>, PatternError>>,
}

/// The `$` separating pattern from options, scanning from the right and
/// skipping escaped dollars.
fn find_options_separator(text: &str, from: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    for i in (from..bytes.len()).rev() {
        if bytes[i] == b'$' && (i == 0 || bytes[i - 1] != b'\\') {
            return Some(i);
        }
    }
    None
}

/// Parses a network rule. Returns the payload and whether the rule is an
/// exception (`@@` prefix). Unlike the element-hiding parser this one never
/// falls through: anything that is not option-invalid is a valid pattern.
pub(crate) fn parse(text: &str) -> Result<(NetworkFilter, bool), InvalidReason> {
    let exception = text.starts_with("@@");
    let pattern_start = if exception { 2 } else { 0 };
    let mut pattern_end = text.len();

    let mut active = ActiveFilter::new(true);
    let mut match_case = false;
    let mut third_party: Option<bool> = None;
    let mut collapse: Option<bool> = None;
    let mut cpt: Option<TypeMask> = None;

    if let Some(dollar) = find_options_separator(text, pattern_start) {
        pattern_end = dollar;
        for option in text[dollar + 1..].split(',') {
            let negation = option.starts_with('~');
            let option = if negation { &option[1..] } else { option };
            let mut parts = option.splitn(2, '=');
            let key = parts.next().unwrap_or_default().to_ascii_lowercase();
            let value = parts.next().unwrap_or_default();

            match (key.as_str(), negation) {
                ("domain", false) if !value.is_empty() => {
                    let source = value.to_ascii_lowercase();
                    let parsed = parse_domain_list(&source, b'|', true);
                    active.fill_domains(&source, &parsed);
                }
                ("sitekey", false) if !value.is_empty() => {
                    active.set_sitekeys(value.split('|').map(str::to_string).collect());
                }
                ("match-case", false) => match_case = true,
                ("third-party", false) => third_party = Some(true),
                ("third-party", true) => third_party = Some(false),
                ("collapse", false) => collapse = Some(true),
                ("collapse", true) => collapse = Some(false),
                _ => match type_option(&key) {
                    Some(mask) if negation => {
                        cpt = Some(cpt.unwrap_or(TypeMask::DEFAULT) & !mask);
                    }
                    Some(mask) => cpt = Some(cpt.unwrap_or_else(TypeMask::empty) | mask),
                    None => {
                        log::debug!("rejecting filter option {:?} in {:?}", option, text);
                        return Err(InvalidReason::UnknownOption);
                    }
                },
            }
        }
    }

    let content_type = match cpt {
        Some(mask) if !mask.is_empty() => mask,
        _ => TypeMask::DEFAULT,
    };

    Ok((
        NetworkFilter {
            active,
            pattern_start,
            pattern_end,
            content_type,
            match_case,
            third_party,
            collapse,
            compiled: OnceCell::new(),
        },
        exception,
    ))
}

impl NetworkFilter {
    pub fn pattern<'a>(&self, text: &'a str) -> &'a str {
        &text[self.pattern_start..self.pattern_end]
    }

    #[inline]
    pub fn content_type(&self) -> TypeMask {
        self.content_type
    }

    #[inline]
    pub fn match_case(&self) -> bool {
        self.match_case
    }

    #[inline]
    pub fn third_party(&self) -> Option<bool> {
        self.third_party
    }

    #[inline]
    pub fn collapse(&self) -> Option<bool> {
        self.collapse
    }

    /// Set once the first match attempt hit a pattern that would not
    /// compile; such a filter never matches.
    pub fn compile_error(&self) -> Option<&PatternError> {
        self.compiled.get().and_then(|result| result.as_ref().err())
    }

    pub fn matches(&self, text: &str, request: &Request, matcher: &dyn PatternMatcher) -> bool {
        if !self.content_type.intersects(request.content_type) {
            return false;
        }
        if let Some(third_party) = self.third_party {
            if third_party != request.third_party {
                return false;
            }
        }
        if !self
            .active
            .is_active_on_domain(request.doc_domain, request.sitekey)
        {
            return false;
        }
        let compiled = self.compiled.get_or_init(|| {
            let result = matcher.compile(self.pattern(text), self.match_case);
            if let Err(err) = &result {
                log::warn!("pattern of filter {:?} failed to compile: {}", text, err);
            }
            result
        });
        match compiled {
            Ok(pattern) => pattern.matches(request.url),
            Err(_) => false,
        }
    }
}
