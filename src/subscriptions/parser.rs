//! Parser for downloaded filter-list bodies: the `[Adblock …]` header,
//! `!key: value` metadata params and the filter lines themselves.

use std::collections::HashMap;

use memchr::memchr2;

use crate::filters::{Filter, FilterRef};
use crate::notifier::{self, Topic};
use crate::scanner::StringScanner;
use crate::subscriptions::Subscription;

const MILLIS_IN_HOUR: i64 = 60 * 60 * 1000;
const MILLIS_IN_DAY: i64 = 24 * MILLIS_IN_HOUR;

const ADBLOCK_HEADER: &str = "[Adblock";
const ADBLOCK_PLUS_EXTRA_HEADER: &str = "Plus";

pub const ERROR_INVALID_DATA: &str = "synchronize_invalid_data";

/// Streaming parser for one download. Feed the body to [`process`], then
/// apply the outcome to a subscription with [`finalize`].
///
/// [`process`]: ListParser::process
/// [`finalize`]: ListParser::finalize
#[derive(Default)]
pub struct ListParser {
    filters_text: Vec<String>,
    params: HashMap<String, String>,
    required_version: String,
    error: Option<&'static str>,
}

/// Splits on runs of `\r`/`\n`. A body starting with a line break yields a
/// leading empty line, which then fails the header check like any other
/// invalid first line.
fn split_lines(body: &str) -> Vec<&str> {
    let mut lines = Vec::new();
    let bytes = body.as_bytes();
    let mut pos = 0;
    loop {
        match memchr2(b'\r', b'\n', &bytes[pos..]) {
            Some(offset) => {
                lines.push(&body[pos..pos + offset]);
                pos += offset + 1;
                while pos < bytes.len() && (bytes[pos] == b'\r' || bytes[pos] == b'\n') {
                    pos += 1;
                }
                if pos >= bytes.len() {
                    break;
                }
            }
            None => {
                lines.push(&body[pos..]);
                break;
            }
        }
    }
    lines
}

/// Parses a `!key: value` header param. Returns `None` for anything else,
/// including plain `!` comments.
fn parse_param(line: &str) -> Option<(String, String)> {
    if !line.starts_with('!') {
        return None;
    }
    let bytes = line.as_bytes();
    let mut found_colon = false;
    let mut begin_param = 0;
    let mut end_param = 0;
    let mut begin_value = 0;
    for i in 1..bytes.len() {
        match bytes[i] {
            b' ' | b'\t' => {
                if begin_param > 0 && !found_colon && end_param == 0 {
                    end_param = i;
                }
            }
            b':' => {
                found_colon = true;
                if end_param == 0 {
                    end_param = i;
                }
            }
            _ => {
                if found_colon {
                    begin_value = i;
                } else if begin_param == 0 {
                    begin_param = i;
                }
            }
        }
        if begin_value > 0 {
            break;
        }
    }
    if begin_value == 0 {
        return None;
    }
    Some((
        line[begin_param..end_param].to_ascii_lowercase(),
        line[begin_value..].to_string(),
    ))
}

/// Parses an `Expires` value into milliseconds: a number followed by an
/// optional unit, `h` for hours, anything else meaning days. Returns zero
/// for malformed input and on overflow.
pub fn parse_expires(expires: &str) -> i64 {
    let mut scanner = StringScanner::new(expires, 0, 0);
    let mut num_start = 0;
    let mut num_len = 0;
    while !scanner.done() {
        let ch = scanner.next();
        if ch.is_ascii_digit() {
            if num_len == 0 {
                num_start = scanner.position();
            }
            num_len += 1;
        } else if ch.is_ascii_whitespace() {
            if num_len > 0 {
                break;
            }
        } else {
            if num_len > 0 {
                scanner.back();
            }
            break;
        }
    }

    let num: i64 = expires[num_start..num_start + num_len].parse().unwrap_or(0);
    if num == 0 {
        return 0;
    }

    let mut is_hour = false;
    while !scanner.done() {
        let ch = scanner.next();
        if ch.is_ascii_whitespace() {
            continue;
        }
        if ch == b'h' {
            is_hour = true;
        }
        // The rest of the value is ignored.
        break;
    }

    let millis = if is_hour { MILLIS_IN_HOUR } else { MILLIS_IN_DAY };
    if num > i64::MAX / millis {
        return 0;
    }
    num * millis
}

impl ListParser {
    pub fn new() -> Self {
        Default::default()
    }

    /// Consumes a downloaded body. Returns false and records
    /// [`ERROR_INVALID_DATA`] when the header line is not a valid
    /// `[Adblock …]` marker.
    pub fn process(&mut self, body: &str) -> bool {
        let mut first_line = true;
        for line in split_lines(body) {
            if first_line {
                if !self.process_first_line(line) {
                    log::debug!("rejecting filter list with header line {:?}", line);
                    self.error = Some(ERROR_INVALID_DATA);
                    return false;
                }
                first_line = false;
            } else {
                self.process_line(line);
            }
        }
        true
    }

    fn process_first_line(&mut self, line: &str) -> bool {
        let index = match line.find(ADBLOCK_HEADER) {
            Some(index) => index,
            None => return false,
        };
        let current = &line[index + ADBLOCK_HEADER.len()..];

        let mut scanner = StringScanner::new(current, 0, 0);
        if scanner.skip_whitespace() && scanner.skip_string(ADBLOCK_PLUS_EXTRA_HEADER) {
            scanner.skip_whitespace();
        }
        let version_start = scanner.position().wrapping_add(1);
        let mut ch;
        loop {
            ch = scanner.next();
            if ch != 0 && (ch == b'.' || ch.is_ascii_digit()) {
                continue;
            }
            break;
        }
        if ch != 0 {
            scanner.back();
        }
        let version_end = scanner.position().wrapping_add(1);

        if ch != b']' {
            return false;
        }
        if version_end > version_start {
            self.required_version = current[version_start..version_end].to_string();
        }
        true
    }

    fn process_line(&mut self, line: &str) {
        match parse_param(line) {
            Some((key, value)) => {
                self.params.insert(key, value);
            }
            None => {
                // Plain comments stay in the filter list.
                if !line.is_empty() {
                    self.filters_text.push(line.to_string());
                }
            }
        }
    }

    pub fn error(&self) -> Option<&'static str> {
        self.error
    }

    pub fn required_version(&self) -> &str {
        &self.required_version
    }

    pub fn params(&self) -> &HashMap<String, String> {
        &self.params
    }

    pub fn filters_text(&self) -> &[String] {
        &self.filters_text
    }

    pub fn redirect(&self) -> &str {
        self.params.get("redirect").map_or("", String::as_str)
    }

    pub fn homepage(&self) -> &str {
        self.params.get("homepage").map_or("", String::as_str)
    }

    /// Applies the parse outcome: metadata first, then the subscription's
    /// filters are replaced in one step, bracketed by the two
    /// filters-replaced notifications. Returns the expiration interval in
    /// milliseconds, zero if the list does not say.
    pub fn finalize(&self, subscription: &mut Subscription) -> i64 {
        notifier::subscription_change(Topic::SubscriptionBeforeFiltersReplaced, subscription);

        if !self.required_version.is_empty() {
            subscription.set_required_version(&self.required_version);
        }

        match self.params.get("title") {
            Some(title) => {
                subscription.set_title(title);
                subscription.set_fixed_title(true);
            }
            None => subscription.set_fixed_title(false),
        }

        let data_revision = self
            .params
            .get("version")
            .and_then(|version| version.parse().ok())
            .unwrap_or(0);
        subscription.set_data_revision(data_revision);

        let expires = self
            .params
            .get("expires")
            .map_or(0, |expires| parse_expires(expires));

        let filters: Vec<FilterRef> = self
            .filters_text
            .iter()
            .filter_map(|text| Filter::from_text(text))
            .collect();
        subscription.set_filters(filters);

        notifier::subscription_change(Topic::SubscriptionFiltersReplaced, subscription);
        expires
    }
}
