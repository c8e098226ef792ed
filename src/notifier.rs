//! Synchronous change notifications for filters and subscriptions.
//!
//! The host registers listeners; mutations in this crate call them in the
//! caller's context, before or after the change as documented on each
//! operation. Listeners must not re-enter the notifier or mutate the
//! collection that triggered the event.

use std::sync::Mutex;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::filters::Filter;
use crate::subscriptions::Subscription;

/// Topics a listener can receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Topic {
    None,
    FilterDisabled,
    FilterHitcount,
    FilterLasthit,
    SubscriptionAdded,
    SubscriptionRemoved,
    SubscriptionMoved,
    SubscriptionTitle,
    SubscriptionFixedtitle,
    SubscriptionDisabled,
    SubscriptionHomepage,
    SubscriptionLastcheck,
    SubscriptionLastdownload,
    SubscriptionDownloadstatus,
    SubscriptionErrors,
    SubscriptionBeforeFiltersReplaced,
    SubscriptionFiltersReplaced,
}

/// Sink for change events. Both methods default to doing nothing so a
/// listener only has to implement the side it cares about.
pub trait FilterListener: Send {
    fn filter_change(&self, _topic: Topic, _filter: &Filter) {}
    fn subscription_change(&self, _topic: Topic, _subscription: &Subscription) {}
}

/// Handle returned by [`add_listener`], used to unregister again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerHandle(u64);

struct Registry {
    next_id: u64,
    listeners: Vec<(u64, Box<dyn FilterListener>)>,
}

static LISTENERS: Lazy<Mutex<Registry>> = Lazy::new(|| {
    Mutex::new(Registry {
        next_id: 1,
        listeners: Vec::new(),
    })
});

pub fn add_listener(listener: Box<dyn FilterListener>) -> ListenerHandle {
    let mut registry = LISTENERS.lock().expect("acquire listener registry mutex");
    let id = registry.next_id;
    registry.next_id += 1;
    registry.listeners.push((id, listener));
    ListenerHandle(id)
}

pub fn remove_listener(handle: ListenerHandle) {
    let mut registry = LISTENERS.lock().expect("acquire listener registry mutex");
    registry.listeners.retain(|(id, _)| *id != handle.0);
}

pub(crate) fn filter_change(topic: Topic, filter: &Filter) {
    let registry = LISTENERS.lock().expect("acquire listener registry mutex");
    for (_, listener) in &registry.listeners {
        listener.filter_change(topic, filter);
    }
}

pub(crate) fn subscription_change(topic: Topic, subscription: &Subscription) {
    let registry = LISTENERS.lock().expect("acquire listener registry mutex");
    for (_, listener) in &registry.listeners {
        listener.subscription_change(topic, subscription);
    }
}
