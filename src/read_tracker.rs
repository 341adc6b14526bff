use std::collections::HashSet;

use tracing::{debug, warn};

use crate::data::FeedApi;
use crate::feed::SortMethod;

/// Ids of items scrolled past the top of the viewport since the last flush.
#[derive(Debug, Default)]
pub struct ReadTracker {
    order: Vec<String>,
    ids: HashSet<String>,
}

impl ReadTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_seen_on_scroll_past(&mut self, id: &str) -> bool {
        if !self.ids.insert(id.to_string()) {
            return false;
        }
        self.order.push(id.to_string());
        true
    }

    /// Records a visibility exit. Only exits through the top edge count.
    pub fn on_left(&mut self, id: &str, top: f64) -> bool {
        if top < 0.0 {
            self.mark_seen_on_scroll_past(id)
        } else {
            false
        }
    }

    pub fn pending(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.ids.clear();
    }

    /// Empties the set and returns the ids worth sending. Marking read only
    /// means something for signed-in users on the curated feed.
    pub fn take_batch(&mut self, is_authenticated: bool, sort: SortMethod) -> Option<Vec<String>> {
        if self.is_empty() {
            return None;
        }
        let ids = std::mem::take(&mut self.order);
        self.ids.clear();
        if !is_authenticated || sort != SortMethod::Curated {
            debug!(dropped = ids.len(), "read ids discarded for this feed");
            return None;
        }
        Some(ids)
    }

    /// Flushes synchronously. Returns whether a request was made.
    pub fn flush(&mut self, api: &dyn FeedApi, is_authenticated: bool, sort: SortMethod) -> bool {
        match self.take_batch(is_authenticated, sort) {
            Some(ids) => {
                send_batch(api, &ids);
                true
            }
            None => false,
        }
    }
}

/// Sends one batch; failures are logged and dropped.
pub fn send_batch(api: &dyn FeedApi, ids: &[String]) {
    match api.mark_seen(ids) {
        Ok(()) => debug!(count = ids.len(), "marked items seen"),
        Err(err) => warn!(count = ids.len(), "mark seen failed: {err:#}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::MockFeedApi;

    #[test]
    fn only_top_exits_count() {
        let mut tracker = ReadTracker::new();
        assert!(!tracker.on_left("a", 120.0));
        assert!(!tracker.on_left("a", 0.0));
        assert!(tracker.on_left("a", -3.0));
        assert!(!tracker.on_left("a", -40.0));
        assert_eq!(tracker.pending(), ["a".to_string()]);
    }

    #[test]
    fn flush_sends_for_curated_when_signed_in() {
        let api = MockFeedApi::default();
        let mut tracker = ReadTracker::new();
        tracker.mark_seen_on_scroll_past("a");
        tracker.mark_seen_on_scroll_past("b");
        assert!(tracker.flush(&api, true, SortMethod::Curated));
        assert!(tracker.is_empty());
        assert_eq!(api.marked(), vec![vec!["a".to_string(), "b".to_string()]]);
        assert!(!tracker.flush(&api, true, SortMethod::Curated));
    }

    #[test]
    fn flush_clears_without_sending_elsewhere() {
        let api = MockFeedApi::default();
        let mut tracker = ReadTracker::new();
        tracker.mark_seen_on_scroll_past("a");
        assert!(!tracker.flush(&api, true, SortMethod::Hot));
        assert!(tracker.is_empty());
        tracker.mark_seen_on_scroll_past("b");
        assert!(!tracker.flush(&api, false, SortMethod::Curated));
        assert!(tracker.is_empty());
        assert!(api.marked().is_empty());
    }

    #[test]
    fn failed_flush_still_clears() {
        let api = MockFeedApi::default();
        api.fail_mark_seen(true);
        let mut tracker = ReadTracker::new();
        tracker.mark_seen_on_scroll_past("a");
        assert!(tracker.flush(&api, true, SortMethod::Curated));
        assert!(tracker.is_empty());
        assert_eq!(api.marked().len(), 1);
    }
}
