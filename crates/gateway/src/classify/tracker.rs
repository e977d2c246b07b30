//! Per-source recent-message tracking for flood detection.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

struct SourceWindow {
    recent: VecDeque<String>,
    last_seen: Instant,
}

/// Bounded ring of recent message contents per source. Equal-content
/// repeats inside the ring boost the flood score; sources idle past the
/// TTL are evicted by [`SourceTracker::sweep`].
pub struct SourceTracker {
    entries: Mutex<HashMap<String, SourceWindow>>,
    ring_capacity: usize,
    idle_ttl: Duration,
}

impl SourceTracker {
    pub fn new(ring_capacity: usize, idle_ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ring_capacity: ring_capacity.max(1),
            idle_ttl,
        }
    }

    /// Record `content` for `source` and return how many identical
    /// messages the ring already held.
    pub fn observe(&self, source: &str, content: &str) -> usize {
        let mut entries = self.entries.lock();
        let window = entries.entry(source.to_string()).or_insert_with(|| SourceWindow {
            recent: VecDeque::with_capacity(self.ring_capacity),
            last_seen: Instant::now(),
        });

        let repeats = window.recent.iter().filter(|c| c.as_str() == content).count();

        if window.recent.len() == self.ring_capacity {
            window.recent.pop_front();
        }
        window.recent.push_back(content.to_string());
        window.last_seen = Instant::now();

        repeats
    }

    /// Evict sources idle past the TTL.
    pub fn sweep(&self) {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, w| now.duration_since(w.last_seen) < self.idle_ttl);
        let evicted = before - entries.len();
        if evicted > 0 {
            tracing::debug!(evicted, remaining = entries.len(), "swept idle sources");
        }
    }

    pub fn tracked_sources(&self) -> usize {
        self.entries.lock().len()
    }

    /// Maintenance loop; one per processor, bound to its cancel token.
    pub async fn run_sweeper(self: Arc<Self>, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval.max(Duration::from_secs(1)));
        loop {
            tokio::select! {
                _ = ticker.tick() => self.sweep(),
                _ = cancel.cancelled() => return,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeats_count_identical_content_only() {
        let tracker = SourceTracker::new(16, Duration::from_secs(300));
        assert_eq!(tracker.observe("nick!u@h", "hello"), 0);
        assert_eq!(tracker.observe("nick!u@h", "hello"), 1);
        assert_eq!(tracker.observe("nick!u@h", "different"), 0);
        assert_eq!(tracker.observe("nick!u@h", "hello"), 2);
    }

    #[test]
    fn sources_are_independent() {
        let tracker = SourceTracker::new(16, Duration::from_secs(300));
        tracker.observe("a", "spam");
        tracker.observe("a", "spam");
        assert_eq!(tracker.observe("b", "spam"), 0);
    }

    #[test]
    fn ring_is_bounded() {
        let tracker = SourceTracker::new(3, Duration::from_secs(300));
        tracker.observe("a", "x");
        tracker.observe("a", "y");
        tracker.observe("a", "z");
        // "x" fell out of the ring, so a new "x" sees zero repeats.
        assert_eq!(tracker.observe("a", "x"), 0);
    }

    #[test]
    fn tenth_identical_message_counts_nine_repeats() {
        let tracker = SourceTracker::new(16, Duration::from_secs(300));
        let mut last = 0;
        for _ in 0..10 {
            last = tracker.observe("flooder!u@h", "aaaaaaaaaaaaaaaaaaaa");
        }
        assert_eq!(last, 9);
    }

    #[test]
    fn sweep_evicts_idle_sources() {
        let tracker = SourceTracker::new(16, Duration::from_millis(0));
        tracker.observe("a", "x");
        std::thread::sleep(Duration::from_millis(2));
        tracker.sweep();
        assert_eq!(tracker.tracked_sources(), 0);
    }
}
