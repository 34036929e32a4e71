//! Signal intake deduplication.
//!
//! Remembers signal ids for a bounded retention window so duplicate
//! deliveries are rejected without side effects. Ids age out of the window
//! and may then be reused; within the window the first submission wins.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Bounded-retention id window for at-most-once ingestion.
pub struct DedupWindow {
    retention: Duration,
    seen: Mutex<HashMap<String, Instant>>,
}

impl DedupWindow {
    /// Create a window with the given retention.
    #[must_use]
    pub fn new(retention: Duration) -> Self {
        Self {
            retention,
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// Record an id; returns `false` if it was already seen within the
    /// retention window.
    pub fn check_and_insert(&self, id: &str) -> bool {
        let now = Instant::now();
        let mut seen = self.seen.lock();

        match seen.get(id) {
            Some(at) if now.duration_since(*at) < self.retention => false,
            _ => {
                seen.insert(id.to_string(), now);
                true
            }
        }
    }

    /// Drop ids older than the retention window.
    pub fn prune(&self) {
        let now = Instant::now();
        self.seen
            .lock()
            .retain(|_, at| now.duration_since(*at) < self.retention);
    }

    /// Number of ids currently tracked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.lock().len()
    }

    /// Whether no ids are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_submission_wins() {
        let window = DedupWindow::new(Duration::from_secs(60));
        assert!(window.check_and_insert("sig-1"));
        assert!(!window.check_and_insert("sig-1"));
        assert!(window.check_and_insert("sig-2"));
    }

    #[test]
    fn ids_age_out_of_the_window() {
        let window = DedupWindow::new(Duration::from_millis(20));
        assert!(window.check_and_insert("sig-1"));
        assert!(!window.check_and_insert("sig-1"));

        std::thread::sleep(Duration::from_millis(30));
        assert!(window.check_and_insert("sig-1"));
    }

    #[test]
    fn prune_drops_stale_ids() {
        let window = DedupWindow::new(Duration::from_millis(10));
        let _ = window.check_and_insert("sig-1");
        let _ = window.check_and_insert("sig-2");
        assert_eq!(window.len(), 2);

        std::thread::sleep(Duration::from_millis(20));
        window.prune();
        assert!(window.is_empty());
    }
}
