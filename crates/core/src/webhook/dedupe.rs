use std::collections::{HashSet, VecDeque};

pub const DEFAULT_DEDUPE_CAPACITY: usize = 1000;

/// Bounded first-in-first-out record of event ids already delivered.
#[derive(Clone, Debug)]
pub struct ProcessedEventLog {
    capacity: usize,
    order: VecDeque<String>,
    seen: HashSet<String>,
}

impl Default for ProcessedEventLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_DEDUPE_CAPACITY)
    }
}

impl ProcessedEventLog {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { capacity, order: VecDeque::with_capacity(capacity), seen: HashSet::new() }
    }

    /// Rebuilds the log from persisted ids, oldest first.
    pub fn from_ids<I>(ids: I, capacity: usize) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut log = Self::with_capacity(capacity);
        for id in ids {
            log.record(id);
        }
        log
    }

    pub fn contains(&self, event_id: &str) -> bool {
        self.seen.contains(event_id)
    }

    /// Returns `false` when the id was already present.
    pub fn record(&mut self, event_id: impl Into<String>) -> bool {
        let event_id = event_id.into();
        if self.seen.contains(&event_id) {
            return false;
        }

        while self.order.len() >= self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.seen.remove(&evicted);
            }
        }
        self.seen.insert(event_id.clone());
        self.order.push_back(event_id);
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Ids in insertion order, for persisting into workflow state.
    pub fn ids(&self) -> Vec<String> {
        self.order.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::ProcessedEventLog;

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut log = ProcessedEventLog::default();
        assert!(log.record("ev_1"));
        assert!(!log.record("ev_1"));
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn oldest_ids_are_evicted_at_capacity() {
        let mut log = ProcessedEventLog::with_capacity(3);
        for id in ["a", "b", "c", "d"] {
            assert!(log.record(id));
        }

        assert_eq!(log.ids(), vec!["b", "c", "d"]);
        assert!(!log.contains("a"));
        assert!(log.record("a"), "evicted id is accepted again");
        assert_eq!(log.ids(), vec!["c", "d", "a"]);
    }

    #[test]
    fn restoring_from_state_keeps_the_newest_entries() {
        let persisted = (0..1005).map(|n| format!("ev_{n}"));
        let log = ProcessedEventLog::from_ids(persisted, 1000);

        assert_eq!(log.len(), 1000);
        assert!(!log.contains("ev_4"));
        assert!(log.contains("ev_5"));
        assert!(log.contains("ev_1004"));
    }
}
