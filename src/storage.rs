//! Ownership of the ordered subscription list.

use crate::filters::Filter;
use crate::notifier::{self, Topic};
use crate::subscriptions::Subscription;

/// Holds every listed subscription, at most one per id, in user-visible
/// order. Mutations notify synchronously; invalid requests (duplicate ids,
/// unknown subscriptions) are silent no-ops.
#[derive(Default)]
pub struct FilterStorage {
    subscriptions: Vec<Subscription>,
}

impl FilterStorage {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn subscription_at(&self, index: usize) -> Option<&Subscription> {
        self.subscriptions.get(index)
    }

    pub fn index_of_subscription(&self, id: &str) -> Option<usize> {
        self.subscriptions.iter().position(|s| s.id() == id)
    }

    pub fn subscription(&self, id: &str) -> Option<&Subscription> {
        self.index_of_subscription(id)
            .and_then(|index| self.subscriptions.get(index))
    }

    pub fn subscription_mut(&mut self, id: &str) -> Option<&mut Subscription> {
        let index = self.index_of_subscription(id)?;
        self.subscriptions.get_mut(index)
    }

    /// The first listed subscription containing the shared filter instance.
    pub fn subscription_for_filter(&self, filter: &Filter) -> Option<&Subscription> {
        self.subscriptions
            .iter()
            .find(|subscription| subscription.contains_filter(filter))
    }

    /// Appends a subscription. Returns false when one with the same id is
    /// already listed.
    pub fn add_subscription(&mut self, mut subscription: Subscription) -> bool {
        if self.index_of_subscription(subscription.id()).is_some() {
            return false;
        }
        subscription.set_listed(true);
        self.subscriptions.push(subscription);
        let added = self
            .subscriptions
            .last()
            .expect("subscription was just appended");
        notifier::subscription_change(Topic::SubscriptionAdded, added);
        true
    }

    pub fn remove_subscription(&mut self, id: &str) -> Option<Subscription> {
        let index = self.index_of_subscription(id)?;
        let mut removed = self.subscriptions.remove(index);
        removed.set_listed(false);
        notifier::subscription_change(Topic::SubscriptionRemoved, &removed);
        Some(removed)
    }

    /// Moves a listed subscription to `new_index` (clamped). Returns true
    /// when the order actually changed.
    pub fn move_subscription(&mut self, id: &str, new_index: usize) -> bool {
        let current = match self.index_of_subscription(id) {
            Some(index) => index,
            None => return false,
        };
        let new_index = new_index.min(self.subscriptions.len() - 1);
        if current == new_index {
            return false;
        }
        let subscription = self.subscriptions.remove(current);
        self.subscriptions.insert(new_index, subscription);
        notifier::subscription_change(Topic::SubscriptionMoved, &self.subscriptions[new_index]);
        true
    }

    /// Replaces a subscription's filters with an empty list.
    pub fn clear_subscription_filters(&mut self, id: &str) {
        let index = match self.index_of_subscription(id) {
            Some(index) => index,
            None => return,
        };
        notifier::subscription_change(
            Topic::SubscriptionBeforeFiltersReplaced,
            &self.subscriptions[index],
        );
        self.subscriptions[index].set_filters(Vec::new());
        notifier::subscription_change(
            Topic::SubscriptionFiltersReplaced,
            &self.subscriptions[index],
        );
    }
}
