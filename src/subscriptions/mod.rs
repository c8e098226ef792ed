//! Subscriptions: named, ordered collections of shared filters, either
//! maintained by the user or downloaded from a filter-list server.

pub mod parser;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::filters::{Filter, FilterKind, FilterRef};
use crate::notifier::{self, Topic};

bitflags! {
    /// Filter categories a user-defined subscription can be the default
    /// destination for.
    #[derive(Serialize, Deserialize)]
    pub struct FilterCategories: u8 {
        const WHITELIST = 1;
        const BLOCKING = 2;
        const ELEMHIDE = 4;
    }
}

fn category_of(filter: &Filter) -> FilterCategories {
    match filter.kind() {
        FilterKind::Blocking(_) => FilterCategories::BLOCKING,
        FilterKind::Whitelist(_) => FilterCategories::WHITELIST,
        FilterKind::ElemHide(_)
        | FilterKind::ElemHideException(_)
        | FilterKind::ElemHideEmulation(_) => FilterCategories::ELEMHIDE,
        FilterKind::Invalid(_) | FilterKind::Comment => FilterCategories::empty(),
    }
}

/// State only user-defined subscriptions carry.
pub struct UserDefinedData {
    defaults: FilterCategories,
}

/// State only downloadable subscriptions carry. Timestamps are
/// milliseconds; zero means "never".
pub struct DownloadableData {
    fixed_title: bool,
    homepage: String,
    last_check: u64,
    hard_expiration: u64,
    soft_expiration: u64,
    last_download: u64,
    download_status: String,
    last_success: u64,
    error_count: u32,
    data_revision: u64,
    required_version: String,
    download_count: u32,
}

pub enum SubscriptionDetails {
    UserDefined(UserDefinedData),
    Downloadable(DownloadableData),
}

/// A subscription. Mutating setters fire the corresponding notifier topic,
/// and only when the value actually changes.
pub struct Subscription {
    id: String,
    title: String,
    disabled: bool,
    listed: bool,
    filters: Vec<FilterRef>,
    details: SubscriptionDetails,
}

impl Subscription {
    /// Creates the right subscription variant for an id. Ids of the form
    /// `~user~<n>` denote user-defined subscriptions; anything else is a
    /// downloadable list whose title defaults to its location.
    pub fn from_id(id: &str) -> Subscription {
        if id.starts_with("~user~") {
            Subscription::user_defined(id)
        } else {
            Subscription::downloadable(id)
        }
    }

    pub fn user_defined(id: &str) -> Subscription {
        Subscription {
            id: id.to_string(),
            title: String::new(),
            disabled: false,
            listed: false,
            filters: Vec::new(),
            details: SubscriptionDetails::UserDefined(UserDefinedData {
                defaults: FilterCategories::empty(),
            }),
        }
    }

    pub fn downloadable(id: &str) -> Subscription {
        Subscription {
            id: id.to_string(),
            title: id.to_string(),
            disabled: false,
            listed: false,
            filters: Vec::new(),
            details: SubscriptionDetails::Downloadable(DownloadableData {
                fixed_title: false,
                homepage: String::new(),
                last_check: 0,
                hard_expiration: 0,
                soft_expiration: 0,
                last_download: 0,
                download_status: String::new(),
                last_success: 0,
                error_count: 0,
                data_revision: 0,
                required_version: String::new(),
                download_count: 0,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn details(&self) -> &SubscriptionDetails {
        &self.details
    }

    pub fn is_downloadable(&self) -> bool {
        matches!(self.details, SubscriptionDetails::Downloadable(_))
    }

    fn downloadable_data(&self) -> Option<&DownloadableData> {
        match &self.details {
            SubscriptionDetails::Downloadable(data) => Some(data),
            SubscriptionDetails::UserDefined(_) => None,
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn set_title(&mut self, title: &str) {
        if self.title != title {
            self.title = title.to_string();
            notifier::subscription_change(Topic::SubscriptionTitle, self);
        }
    }

    pub fn disabled(&self) -> bool {
        self.disabled
    }

    pub fn set_disabled(&mut self, disabled: bool) {
        if self.disabled != disabled {
            self.disabled = disabled;
            notifier::subscription_change(Topic::SubscriptionDisabled, self);
        }
    }

    /// Whether the subscription is currently part of storage.
    pub fn listed(&self) -> bool {
        self.listed
    }

    pub(crate) fn set_listed(&mut self, listed: bool) {
        self.listed = listed;
    }

    pub fn filters(&self) -> &[FilterRef] {
        &self.filters
    }

    pub fn filter_count(&self) -> usize {
        self.filters.len()
    }

    pub fn filter_at(&self, index: usize) -> Option<&FilterRef> {
        self.filters.get(index)
    }

    /// Filters are shared instances, so position is found by identity.
    pub fn index_of_filter(&self, filter: &Filter) -> Option<usize> {
        self.filters
            .iter()
            .position(|f| std::ptr::eq(f.as_ref(), filter))
    }

    pub fn contains_filter(&self, filter: &Filter) -> bool {
        self.index_of_filter(filter).is_some()
    }

    pub(crate) fn set_filters(&mut self, filters: Vec<FilterRef>) {
        self.filters = filters;
    }

    /// Inserts into a user-defined subscription, clamping the position.
    /// Downloadable subscriptions only change through list downloads.
    pub fn insert_filter_at(&mut self, filter: FilterRef, index: usize) {
        if let SubscriptionDetails::UserDefined(_) = self.details {
            let index = index.min(self.filters.len());
            self.filters.insert(index, filter);
        }
    }

    pub fn remove_filter_at(&mut self, index: usize) -> Option<FilterRef> {
        match self.details {
            SubscriptionDetails::UserDefined(_) if index < self.filters.len() => {
                Some(self.filters.remove(index))
            }
            _ => None,
        }
    }

    /// Whether new filters of this kind should land here by default.
    pub fn is_default_for(&self, filter: &Filter) -> bool {
        match &self.details {
            SubscriptionDetails::UserDefined(data) => {
                let category = category_of(filter);
                !category.is_empty() && data.defaults.contains(category)
            }
            SubscriptionDetails::Downloadable(_) => false,
        }
    }

    pub fn make_default_for(&mut self, filter: &Filter) {
        if let SubscriptionDetails::UserDefined(data) = &mut self.details {
            data.defaults |= category_of(filter);
        }
    }

    pub fn fixed_title(&self) -> bool {
        self.downloadable_data().map_or(false, |d| d.fixed_title)
    }

    pub fn set_fixed_title(&mut self, fixed_title: bool) {
        if let SubscriptionDetails::Downloadable(data) = &mut self.details {
            if data.fixed_title != fixed_title {
                data.fixed_title = fixed_title;
                notifier::subscription_change(Topic::SubscriptionFixedtitle, self);
            }
        }
    }

    pub fn homepage(&self) -> &str {
        self.downloadable_data()
            .map_or("", |d| d.homepage.as_str())
    }

    pub fn set_homepage(&mut self, homepage: &str) {
        if let SubscriptionDetails::Downloadable(data) = &mut self.details {
            if data.homepage != homepage {
                data.homepage = homepage.to_string();
                notifier::subscription_change(Topic::SubscriptionHomepage, self);
            }
        }
    }

    pub fn last_check(&self) -> u64 {
        self.downloadable_data().map_or(0, |d| d.last_check)
    }

    pub fn set_last_check(&mut self, last_check: u64) {
        if let SubscriptionDetails::Downloadable(data) = &mut self.details {
            if data.last_check != last_check {
                data.last_check = last_check;
                notifier::subscription_change(Topic::SubscriptionLastcheck, self);
            }
        }
    }

    pub fn hard_expiration(&self) -> u64 {
        self.downloadable_data().map_or(0, |d| d.hard_expiration)
    }

    pub fn set_hard_expiration(&mut self, value: u64) {
        if let SubscriptionDetails::Downloadable(data) = &mut self.details {
            data.hard_expiration = value;
        }
    }

    pub fn soft_expiration(&self) -> u64 {
        self.downloadable_data().map_or(0, |d| d.soft_expiration)
    }

    pub fn set_soft_expiration(&mut self, value: u64) {
        if let SubscriptionDetails::Downloadable(data) = &mut self.details {
            data.soft_expiration = value;
        }
    }

    pub fn last_download(&self) -> u64 {
        self.downloadable_data().map_or(0, |d| d.last_download)
    }

    pub fn set_last_download(&mut self, value: u64) {
        if let SubscriptionDetails::Downloadable(data) = &mut self.details {
            if data.last_download != value {
                data.last_download = value;
                notifier::subscription_change(Topic::SubscriptionLastdownload, self);
            }
        }
    }

    pub fn download_status(&self) -> &str {
        self.downloadable_data()
            .map_or("", |d| d.download_status.as_str())
    }

    pub fn set_download_status(&mut self, status: &str) {
        if let SubscriptionDetails::Downloadable(data) = &mut self.details {
            if data.download_status != status {
                data.download_status = status.to_string();
                notifier::subscription_change(Topic::SubscriptionDownloadstatus, self);
            }
        }
    }

    pub fn last_success(&self) -> u64 {
        self.downloadable_data().map_or(0, |d| d.last_success)
    }

    pub fn set_last_success(&mut self, value: u64) {
        if let SubscriptionDetails::Downloadable(data) = &mut self.details {
            data.last_success = value;
        }
    }

    pub fn error_count(&self) -> u32 {
        self.downloadable_data().map_or(0, |d| d.error_count)
    }

    pub fn set_error_count(&mut self, value: u32) {
        if let SubscriptionDetails::Downloadable(data) = &mut self.details {
            if data.error_count != value {
                data.error_count = value;
                notifier::subscription_change(Topic::SubscriptionErrors, self);
            }
        }
    }

    pub fn data_revision(&self) -> u64 {
        self.downloadable_data().map_or(0, |d| d.data_revision)
    }

    pub fn set_data_revision(&mut self, value: u64) {
        if let SubscriptionDetails::Downloadable(data) = &mut self.details {
            data.data_revision = value;
        }
    }

    pub fn required_version(&self) -> &str {
        self.downloadable_data()
            .map_or("", |d| d.required_version.as_str())
    }

    pub fn set_required_version(&mut self, version: &str) {
        if let SubscriptionDetails::Downloadable(data) = &mut self.details {
            data.required_version = version.to_string();
        }
    }

    pub fn download_count(&self) -> u32 {
        self.downloadable_data().map_or(0, |d| d.download_count)
    }

    pub fn set_download_count(&mut self, value: u32) {
        if let SubscriptionDetails::Downloadable(data) = &mut self.details {
            data.download_count = value;
        }
    }

    /// The textual form consumed by storage layers. Filters are serialized
    /// separately, see [`Subscription::serialize_filters`].
    pub fn serialize(&self) -> String {
        let mut result = String::from("[Subscription]\nurl=");
        result.push_str(&self.id);
        result.push('\n');
        if !self.title.is_empty() {
            result.push_str(&format!("title={}\n", self.title));
        }
        if self.disabled {
            result.push_str("disabled=true\n");
        }
        if let SubscriptionDetails::Downloadable(data) = &self.details {
            if data.fixed_title {
                result.push_str("fixedTitle=true\n");
            }
            if !data.homepage.is_empty() {
                result.push_str(&format!("homepage={}\n", data.homepage));
            }
            if data.last_check != 0 {
                result.push_str(&format!("lastCheck={}\n", data.last_check));
            }
            if data.hard_expiration != 0 {
                result.push_str(&format!("expires={}\n", data.hard_expiration));
            }
            if data.soft_expiration != 0 {
                result.push_str(&format!("softExpiration={}\n", data.soft_expiration));
            }
            if data.last_download != 0 {
                result.push_str(&format!("lastDownload={}\n", data.last_download));
            }
            if !data.download_status.is_empty() {
                result.push_str(&format!("downloadStatus={}\n", data.download_status));
            }
            if data.last_success != 0 {
                result.push_str(&format!("lastSuccess={}\n", data.last_success));
            }
            if data.error_count != 0 {
                result.push_str(&format!("errors={}\n", data.error_count));
            }
            if data.data_revision != 0 {
                result.push_str(&format!("version={}\n", data.data_revision));
            }
            if !data.required_version.is_empty() {
                result.push_str(&format!("requiredVersion={}\n", data.required_version));
            }
            if data.download_count != 0 {
                result.push_str(&format!("downloadCount={}\n", data.download_count));
            }
        }
        result
    }

    /// The filter texts of this subscription, one per line.
    pub fn serialize_filters(&self) -> String {
        let mut result = String::from("[Subscription filters]\n");
        for filter in &self.filters {
            result.push_str(filter.text());
            result.push('\n');
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::{add_listener, remove_listener, FilterListener};
    use std::sync::{Arc, Mutex};

    #[test]
    fn id_prefix_picks_the_variant() {
        assert!(!Subscription::from_id("~user~12345").is_downloadable());
        assert!(Subscription::from_id("https://example.org/list.txt").is_downloadable());
        // A downloadable subscription starts out titled by its location.
        assert_eq!(
            Subscription::from_id("https://example.org/list.txt").title(),
            "https://example.org/list.txt"
        );
        assert_eq!(Subscription::from_id("~user~12345").title(), "");
    }

    #[test]
    fn filter_membership() {
        let mut subscription = Subscription::user_defined("~user~200001");
        let a = Filter::from_text("||membership-a.example^").unwrap();
        let b = Filter::from_text("||membership-b.example^").unwrap();
        subscription.insert_filter_at(a.clone(), 0);
        subscription.insert_filter_at(b.clone(), 99);

        assert_eq!(subscription.filter_count(), 2);
        assert_eq!(subscription.index_of_filter(&a), Some(0));
        assert_eq!(subscription.index_of_filter(&b), Some(1));
        assert!(subscription.filter_at(2).is_none());

        let removed = subscription.remove_filter_at(0).unwrap();
        assert!(Arc::ptr_eq(&removed, &a));
        assert_eq!(subscription.index_of_filter(&b), Some(0));
        assert!(subscription.remove_filter_at(5).is_none());
    }

    #[test]
    fn defaults_track_filter_categories() {
        let mut subscription = Subscription::user_defined("~user~200002");
        let blocking = Filter::from_text("||defaults.example^").unwrap();
        let hiding = Filter::from_text("##.defaults").unwrap();
        let comment = Filter::from_text("! defaults").unwrap();

        assert!(!subscription.is_default_for(&blocking));
        subscription.make_default_for(&blocking);
        assert!(subscription.is_default_for(&blocking));
        assert!(!subscription.is_default_for(&hiding));

        subscription.make_default_for(&comment);
        assert!(!subscription.is_default_for(&comment));
    }

    struct Recorder {
        events: Arc<Mutex<Vec<(Topic, String)>>>,
    }

    impl FilterListener for Recorder {
        fn subscription_change(&self, topic: Topic, subscription: &Subscription) {
            self.events
                .lock()
                .unwrap()
                .push((topic, subscription.id().to_string()));
        }
    }

    #[test]
    fn setters_notify_only_on_change() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let handle = add_listener(Box::new(Recorder {
            events: events.clone(),
        }));

        let id = "https://notify.example/list.txt";
        let mut subscription = Subscription::from_id(id);
        subscription.set_title("A list");
        subscription.set_title("A list");
        subscription.set_disabled(true);
        subscription.set_error_count(2);
        subscription.set_homepage("https://notify.example");
        // Silent properties.
        subscription.set_data_revision(7);
        subscription.set_soft_expiration(1000);
        remove_listener(handle);

        let seen: Vec<Topic> = events
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, sub)| sub == id)
            .map(|(topic, _)| *topic)
            .collect();
        assert_eq!(
            seen,
            vec![
                Topic::SubscriptionTitle,
                Topic::SubscriptionDisabled,
                Topic::SubscriptionErrors,
                Topic::SubscriptionHomepage,
            ]
        );
    }

    #[test]
    fn serialize_downloadable() {
        let mut subscription = Subscription::downloadable("https://serialize.example/list.txt");
        assert_eq!(
            subscription.serialize(),
            "[Subscription]\nurl=https://serialize.example/list.txt\n\
             title=https://serialize.example/list.txt\n"
        );

        subscription.set_title("Test List");
        subscription.set_fixed_title(true);
        subscription.set_homepage("https://serialize.example");
        subscription.set_last_download(123);
        subscription.set_error_count(1);
        subscription.set_data_revision(42);
        subscription.set_required_version("2.0");
        assert_eq!(
            subscription.serialize(),
            "[Subscription]\nurl=https://serialize.example/list.txt\n\
             title=Test List\n\
             fixedTitle=true\n\
             homepage=https://serialize.example\n\
             lastDownload=123\n\
             errors=1\n\
             version=42\n\
             requiredVersion=2.0\n"
        );
    }

    #[test]
    fn serialize_filters_lists_texts() {
        let mut subscription = Subscription::user_defined("~user~200003");
        subscription.insert_filter_at(
            Filter::from_text("||serialize-filters.example^").unwrap(),
            0,
        );
        subscription.insert_filter_at(Filter::from_text("##.serialize-filters").unwrap(), 1);
        assert_eq!(
            subscription.serialize_filters(),
            "[Subscription filters]\n||serialize-filters.example^\n##.serialize-filters\n"
        );
    }
}
