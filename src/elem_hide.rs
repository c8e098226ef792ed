//! Lookup indexes answering "which selectors should be hidden on this
//! host". Hiding rules are bucketed by their include-mode domains, with a
//! separate unconditional set for rules that apply everywhere; exception
//! rules mask equal selectors wherever the exception is in scope.

use std::collections::{HashMap, HashSet};

use crate::filters::{Filter, FilterKind, FilterRef};

/// Index over element-hiding rules and their exceptions.
pub struct ElemHide {
    /// Every indexed filter by its key, exceptions included.
    filters: HashMap<u64, FilterRef>,
    keys_by_text: HashMap<String, u64>,
    /// Hiding rules bucketed by each include-mode domain.
    by_domain: HashMap<String, Vec<u64>>,
    /// Hiding rules without include-mode domains.
    unconditional: HashSet<u64>,
    /// Exception rules bucketed by the selector they exempt.
    exceptions: HashMap<String, Vec<u64>>,
    next_key: u64,
}

impl Default for ElemHide {
    fn default() -> Self {
        Self::new()
    }
}

impl ElemHide {
    pub fn new() -> Self {
        ElemHide {
            filters: HashMap::new(),
            keys_by_text: HashMap::new(),
            by_domain: HashMap::new(),
            unconditional: HashSet::new(),
            exceptions: HashMap::new(),
            next_key: 1,
        }
    }

    /// Indexes an element-hiding rule or exception. Re-adding a filter that
    /// is already indexed, or passing any other filter variant, does
    /// nothing.
    pub fn add(&mut self, filter: &FilterRef) {
        let exception = match filter.kind() {
            FilterKind::ElemHideException(_) => true,
            FilterKind::ElemHide(_) | FilterKind::ElemHideEmulation(_) => false,
            _ => return,
        };
        if self.keys_by_text.contains_key(filter.text()) {
            return;
        }
        let selector = match filter.raw_selector() {
            Some(selector) => selector.to_string(),
            None => return,
        };

        let key = self.next_key;
        self.next_key += 1;
        self.keys_by_text.insert(filter.text().to_string(), key);
        self.filters.insert(key, filter.clone());

        if exception {
            self.exceptions.entry(selector).or_default().push(key);
            return;
        }

        let include_domains: Vec<String> = filter
            .active()
            .and_then(|active| active.domains())
            .map(|domains| {
                domains
                    .iter()
                    .filter(|(domain, &included)| included && !domain.is_empty())
                    .map(|(domain, _)| domain.clone())
                    .collect()
            })
            .unwrap_or_default();

        if include_domains.is_empty() {
            self.unconditional.insert(key);
        } else {
            for domain in include_domains {
                self.by_domain.entry(domain).or_default().push(key);
            }
        }
    }

    /// Drops a previously added filter from all indexes.
    pub fn remove(&mut self, filter: &Filter) {
        let key = match self.keys_by_text.remove(filter.text()) {
            Some(key) => key,
            None => return,
        };
        self.filters.remove(&key);
        self.unconditional.remove(&key);
        self.by_domain.retain(|_, keys| {
            keys.retain(|k| *k != key);
            !keys.is_empty()
        });
        self.exceptions.retain(|_, keys| {
            keys.retain(|k| *k != key);
            !keys.is_empty()
        });
    }

    pub fn clear(&mut self) {
        *self = ElemHide::new();
    }

    fn masked(&self, selector: &str, host: &str) -> bool {
        self.exceptions.get(selector).map_or(false, |keys| {
            keys.iter().any(|key| {
                self.filters
                    .get(key)
                    .and_then(|filter| filter.active())
                    .map_or(false, |active| active.is_active_on_domain(host, ""))
            })
        })
    }

    fn push_if_live(&self, key: u64, host: &str, results: &mut Vec<(String, u64)>) {
        let filter = match self.filters.get(&key) {
            Some(filter) => filter,
            None => return,
        };
        let active = match filter.active() {
            Some(active) => active,
            None => return,
        };
        if !active.is_active_on_domain(host, "") {
            return;
        }
        let raw = match filter.raw_selector() {
            Some(raw) => raw,
            None => return,
        };
        if self.masked(raw, host) {
            return;
        }
        if let Some(selector) = filter.selector() {
            results.push((selector.into_owned(), key));
        }
    }

    /// All `(selector, filter key)` pairs that apply on `host`, with
    /// exceptions already subtracted. When the same selector comes from
    /// several filters each contribution is returned; callers may dedupe.
    pub fn selectors_for_domain(&self, host: &str) -> Vec<(String, u64)> {
        let host = host.to_ascii_lowercase();
        let mut results = Vec::new();
        let mut seen = HashSet::new();

        let mut current: &str = &host;
        loop {
            if let Some(keys) = self.by_domain.get(current) {
                for &key in keys {
                    if seen.insert(key) {
                        self.push_if_live(key, &host, &mut results);
                    }
                }
            }
            match current.find('.') {
                Some(dot) => current = &current[dot + 1..],
                None => break,
            }
        }

        for &key in &self.unconditional {
            self.push_if_live(key, &host, &mut results);
        }

        results.sort_unstable_by_key(|(_, key)| *key);
        results
    }

    /// The selectors applying on every page, minus those masked by an
    /// exception that is in scope for documents without a host.
    pub fn unconditional_selectors(&self) -> Vec<String> {
        let mut keys: Vec<u64> = self.unconditional.iter().copied().collect();
        keys.sort_unstable();
        let mut results = Vec::with_capacity(keys.len());
        for key in keys {
            let filter = match self.filters.get(&key) {
                Some(filter) => filter,
                None => continue,
            };
            let raw = match filter.raw_selector() {
                Some(raw) => raw,
                None => continue,
            };
            if self.masked(raw, "") {
                continue;
            }
            if let Some(selector) = filter.selector() {
                results.push(selector.into_owned());
            }
        }
        results
    }
}

/// The element-hiding emulation rules, kept apart from the plain index:
/// they are handed to a content script instead of a stylesheet.
#[derive(Default)]
pub struct ElemHideEmulation {
    filters: Vec<FilterRef>,
}

impl ElemHideEmulation {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn add(&mut self, filter: &FilterRef) {
        if !matches!(filter.kind(), FilterKind::ElemHideEmulation(_)) {
            return;
        }
        if self.filters.iter().any(|f| f.text() == filter.text()) {
            return;
        }
        self.filters.push(filter.clone());
    }

    pub fn remove(&mut self, filter: &Filter) {
        self.filters.retain(|f| f.text() != filter.text());
    }

    pub fn clear(&mut self) {
        self.filters.clear();
    }

    pub fn rules_for_domain(&self, host: &str) -> Vec<FilterRef> {
        self.filters
            .iter()
            .filter(|filter| {
                filter
                    .active()
                    .map_or(false, |active| active.is_active_on_domain(host, ""))
            })
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::Filter;

    fn add(index: &mut ElemHide, text: &str) -> FilterRef {
        let filter = Filter::from_text(text).expect("filter expected");
        index.add(&filter);
        filter
    }

    fn selectors(index: &ElemHide, host: &str) -> Vec<String> {
        index
            .selectors_for_domain(host)
            .into_iter()
            .map(|(selector, _)| selector)
            .collect()
    }

    #[test]
    fn unconditional_and_conditional_lookup() {
        let mut index = ElemHide::new();
        add(&mut index, "##.eh-generic");
        add(&mut index, "cond.example##.eh-scoped");

        assert_eq!(
            selectors(&index, "cond.example"),
            vec![".eh-generic", ".eh-scoped"]
        );
        assert_eq!(
            selectors(&index, "sub.cond.example"),
            vec![".eh-generic", ".eh-scoped"]
        );
        assert_eq!(selectors(&index, "other.example"), vec![".eh-generic"]);
        assert_eq!(index.unconditional_selectors(), vec![".eh-generic"]);
    }

    #[test]
    fn exclusions_apply_to_unconditional_rules() {
        let mut index = ElemHide::new();
        add(&mut index, "~excl.example##.eh-excluded");
        assert_eq!(selectors(&index, "somewhere.example"), vec![".eh-excluded"]);
        assert!(selectors(&index, "excl.example").is_empty());
        assert!(selectors(&index, "sub.excl.example").is_empty());
        // Still part of the unconditional set.
        assert_eq!(index.unconditional_selectors(), vec![".eh-excluded"]);
    }

    #[test]
    fn exceptions_mask_matching_selectors() {
        let mut index = ElemHide::new();
        add(&mut index, "exc.example##.eh-masked");
        add(&mut index, "exc.example##.eh-kept");
        add(&mut index, "exc.example#@#.eh-masked");

        assert_eq!(selectors(&index, "exc.example"), vec![".eh-kept"]);
        // The exception is scoped to exc.example and covers its subdomains.
        assert_eq!(selectors(&index, "sub.exc.example"), vec![".eh-kept"]);
    }

    #[test]
    fn generic_exception_masks_unconditional_selectors() {
        let mut index = ElemHide::new();
        add(&mut index, "##.eh-everywhere");
        assert_eq!(index.unconditional_selectors(), vec![".eh-everywhere"]);

        let exception = add(&mut index, "#@#.eh-everywhere");
        assert!(index.unconditional_selectors().is_empty());
        assert!(selectors(&index, "any.example").is_empty());

        index.remove(&exception);
        assert_eq!(index.unconditional_selectors(), vec![".eh-everywhere"]);
    }

    #[test]
    fn domain_scoped_exception_leaves_other_hosts_alone() {
        let mut index = ElemHide::new();
        add(&mut index, "##.eh-partial");
        add(&mut index, "quiet.example#@#.eh-partial");

        assert!(selectors(&index, "quiet.example").is_empty());
        assert_eq!(selectors(&index, "loud.example"), vec![".eh-partial"]);
        // Not masked for the empty host, so still unconditional.
        assert_eq!(index.unconditional_selectors(), vec![".eh-partial"]);
    }

    #[test]
    fn same_selector_from_two_filters() {
        let mut index = ElemHide::new();
        add(&mut index, "a.example##.eh-shared");
        add(&mut index, "b.example,a.example##.eh-shared");
        let result = index.selectors_for_domain("a.example");
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].0, ".eh-shared");
        assert_eq!(result[1].0, ".eh-shared");
        assert_ne!(result[0].1, result[1].1);
    }

    #[test]
    fn selectors_are_escaped() {
        let mut index = ElemHide::new();
        add(&mut index, "curly.example##div{color:red}");
        assert_eq!(
            selectors(&index, "curly.example"),
            vec!["div\\7B color:red\\7D "]
        );
    }

    #[test]
    fn remove_and_clear() {
        let mut index = ElemHide::new();
        let scoped = add(&mut index, "gone.example##.eh-gone");
        add(&mut index, "##.eh-stays");
        index.remove(&scoped);
        assert_eq!(selectors(&index, "gone.example"), vec![".eh-stays"]);

        index.clear();
        assert!(selectors(&index, "gone.example").is_empty());
        assert!(index.unconditional_selectors().is_empty());
    }

    #[test]
    fn non_elemhide_filters_are_ignored() {
        let mut index = ElemHide::new();
        let network = Filter::from_text("||ignored.example^").expect("filter");
        index.add(&network);
        assert!(index.unconditional_selectors().is_empty());
        assert!(selectors(&index, "ignored.example").is_empty());
    }

    #[test]
    fn emulation_rules_by_domain() {
        let mut emulation = ElemHideEmulation::new();
        let rule = Filter::from_text("emu.example#?#div:-abp-has(.ad)").expect("filter");
        emulation.add(&rule);
        // Plain hiding rules don't belong here.
        let plain = Filter::from_text("emu.example##.plain").expect("filter");
        emulation.add(&plain);

        assert_eq!(emulation.rules_for_domain("emu.example").len(), 1);
        assert_eq!(emulation.rules_for_domain("sub.emu.example").len(), 1);
        assert!(emulation.rules_for_domain("other.example").is_empty());

        emulation.remove(&rule);
        assert!(emulation.rules_for_domain("emu.example").is_empty());
    }
}
