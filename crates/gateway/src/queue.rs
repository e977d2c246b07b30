//! Bounded bidirectional queue between the I/O plane and the controller.
//!
//! A full queue rejects with `backpressure` — it never blocks the caller,
//! so webhook tail latency stays bounded. Items live in priority bands;
//! FIFO within a band preserves per-`(source, priority)` ordering, and
//! consumers drain bands round-robin so no priority starves another.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use aegis_domain::{Error, InputEvent, OutputCommand, Result};

/// Anything the queue can order: events and commands.
pub trait Prioritized {
    fn priority(&self) -> i32;
}

impl Prioritized for InputEvent {
    fn priority(&self) -> i32 {
        self.priority
    }
}

impl Prioritized for OutputCommand {
    fn priority(&self) -> i32 {
        self.priority
    }
}

struct Bands<T> {
    bands: BTreeMap<i32, VecDeque<T>>,
    len: usize,
    /// Priority of the band served last; drives the round-robin cursor.
    cursor: Option<i32>,
}

pub struct BoundedQueue<T> {
    name: &'static str,
    capacity: usize,
    inner: Mutex<Bands<T>>,
    notify: Notify,
    drops: AtomicU64,
}

impl<T: Prioritized> BoundedQueue<T> {
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            name,
            capacity: capacity.max(1),
            inner: Mutex::new(Bands {
                bands: BTreeMap::new(),
                len: 0,
                cursor: None,
            }),
            notify: Notify::new(),
            drops: AtomicU64::new(0),
        }
    }

    /// Enqueue or reject. Rejection records a drop — callers treat it as
    /// "channel saturated; try later".
    pub fn enqueue(&self, item: T) -> Result<()> {
        {
            let mut inner = self.inner.lock();
            if inner.len >= self.capacity {
                drop(inner);
                self.drops.fetch_add(1, Ordering::Relaxed);
                return Err(Error::Backpressure(format!("{} queue full", self.name)));
            }
            inner.bands.entry(item.priority()).or_default().push_back(item);
            inner.len += 1;
        }
        self.notify.notify_one();
        Ok(())
    }

    /// Put an item back at the head of its band after a failed hand-off.
    /// Deliberately ignores capacity: the item was dequeued moments ago,
    /// so the queue cannot grow past `capacity + in-flight`.
    pub fn requeue_front(&self, item: T) {
        {
            let mut inner = self.inner.lock();
            inner.bands.entry(item.priority()).or_default().push_front(item);
            inner.len += 1;
        }
        self.notify.notify_one();
    }

    /// Round-robin over non-empty bands, highest priority first on entry,
    /// FIFO inside each band.
    pub fn try_dequeue(&self) -> Option<T> {
        let mut inner = self.inner.lock();
        if inner.len == 0 {
            return None;
        }

        // Band keys in descending priority order.
        let keys: Vec<i32> = inner.bands.keys().rev().copied().collect();
        let start = match inner.cursor {
            Some(cursor) => keys
                .iter()
                .position(|&k| k < cursor)
                .unwrap_or(0),
            None => 0,
        };

        for offset in 0..keys.len() {
            let key = keys[(start + offset) % keys.len()];
            if let Some(band) = inner.bands.get_mut(&key) {
                if let Some(item) = band.pop_front() {
                    if band.is_empty() {
                        inner.bands.remove(&key);
                    }
                    inner.len -= 1;
                    inner.cursor = Some(key);
                    return Some(item);
                }
            }
        }
        None
    }

    /// Await the next item. Returns `None` once cancelled.
    pub async fn dequeue(&self, cancel: &CancellationToken) -> Option<T> {
        loop {
            if let Some(item) = self.try_dequeue() {
                return Some(item);
            }
            tokio::select! {
                _ = self.notify.notified() => {}
                _ = cancel.cancelled() => return None,
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn drops(&self) -> u64 {
        self.drops.load(Ordering::Relaxed)
    }
}

/// The gateway's two data directions.
pub struct IoQueue {
    /// Classified events waiting for the controller stream.
    pub inbound: BoundedQueue<InputEvent>,
    /// Commands waiting for a sender.
    pub outbound: BoundedQueue<OutputCommand>,
}

impl IoQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inbound: BoundedQueue::new("inbound", capacity),
            outbound: BoundedQueue::new("outbound", capacity),
        }
    }

    pub fn stats(&self) -> serde_json::Value {
        serde_json::json!({
            "inbound": { "depth": self.inbound.len(), "capacity": self.inbound.capacity(), "drops": self.inbound.drops() },
            "outbound": { "depth": self.outbound.len(), "capacity": self.outbound.capacity(), "drops": self.outbound.drops() },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_domain::{ChannelKind, Classification};

    fn event(source: &str, priority: i32, content: &str) -> InputEvent {
        InputEvent::new(ChannelKind::Sms, source, content, Classification::benign(&[]))
            .with_priority(priority)
    }

    #[test]
    fn rejects_exactly_when_full() {
        let queue = BoundedQueue::new("test", 2);
        queue.enqueue(event("a", 0, "1")).unwrap();
        queue.enqueue(event("a", 0, "2")).unwrap();

        let err = queue.enqueue(event("a", 0, "3")).unwrap_err();
        assert_eq!(err.kind(), "backpressure");
        assert_eq!(queue.drops(), 1);

        // Draining one slot makes room again.
        queue.try_dequeue().unwrap();
        queue.enqueue(event("a", 0, "3")).unwrap();
    }

    #[test]
    fn fifo_within_same_priority() {
        let queue = BoundedQueue::new("test", 16);
        for i in 0..5 {
            queue.enqueue(event("src", 0, &i.to_string())).unwrap();
        }
        let drained: Vec<String> = std::iter::from_fn(|| queue.try_dequeue())
            .map(|e| e.content)
            .collect();
        assert_eq!(drained, vec!["0", "1", "2", "3", "4"]);
    }

    #[test]
    fn per_source_order_survives_mixed_sources() {
        let queue = BoundedQueue::new("test", 16);
        queue.enqueue(event("a", 0, "a1")).unwrap();
        queue.enqueue(event("b", 0, "b1")).unwrap();
        queue.enqueue(event("a", 0, "a2")).unwrap();
        queue.enqueue(event("b", 0, "b2")).unwrap();

        let drained: Vec<String> = std::iter::from_fn(|| queue.try_dequeue())
            .map(|e| e.content)
            .collect();
        let a_order: Vec<&String> = drained.iter().filter(|c| c.starts_with('a')).collect();
        let b_order: Vec<&String> = drained.iter().filter(|c| c.starts_with('b')).collect();
        assert_eq!(a_order, ["a1", "a2"]);
        assert_eq!(b_order, ["b1", "b2"]);
    }

    #[test]
    fn bands_are_served_round_robin() {
        let queue = BoundedQueue::new("test", 16);
        queue.enqueue(event("hi", 5, "h1")).unwrap();
        queue.enqueue(event("hi", 5, "h2")).unwrap();
        queue.enqueue(event("lo", 0, "l1")).unwrap();
        queue.enqueue(event("lo", 0, "l2")).unwrap();

        let drained: Vec<String> = std::iter::from_fn(|| queue.try_dequeue())
            .map(|e| e.content)
            .collect();
        // High goes first, then the low band gets its turn: no starvation.
        assert_eq!(drained, vec!["h1", "l1", "h2", "l2"]);
    }

    #[test]
    fn requeue_front_restores_head_position() {
        let queue = BoundedQueue::new("test", 16);
        queue.enqueue(event("a", 0, "first")).unwrap();
        queue.enqueue(event("a", 0, "second")).unwrap();

        let popped = queue.try_dequeue().unwrap();
        assert_eq!(popped.content, "first");
        queue.requeue_front(popped);

        assert_eq!(queue.try_dequeue().unwrap().content, "first");
        assert_eq!(queue.try_dequeue().unwrap().content, "second");
    }

    #[tokio::test]
    async fn dequeue_wakes_on_enqueue_and_stops_on_cancel() {
        let queue = std::sync::Arc::new(BoundedQueue::new("test", 4));
        let cancel = CancellationToken::new();

        let waiter = {
            let queue = queue.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { queue.dequeue(&cancel).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        queue.enqueue(event("a", 0, "x")).unwrap();
        assert_eq!(waiter.await.unwrap().unwrap().content, "x");

        let waiter = {
            let queue = queue.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { queue.dequeue(&cancel).await })
        };
        cancel.cancel();
        assert!(waiter.await.unwrap().is_none());
    }

    #[tokio::test]
    async fn mpmc_under_contention_loses_nothing() {
        let queue = std::sync::Arc::new(BoundedQueue::new("test", 1024));
        let cancel = CancellationToken::new();

        let mut producers = Vec::new();
        for p in 0..4 {
            let queue = queue.clone();
            producers.push(tokio::spawn(async move {
                for i in 0..50 {
                    queue.enqueue(event(&format!("p{p}"), 0, &i.to_string())).unwrap();
                }
            }));
        }

        let mut consumers = Vec::new();
        for _ in 0..4 {
            let queue = queue.clone();
            let cancel = cancel.clone();
            consumers.push(tokio::spawn(async move {
                let mut seen = 0usize;
                while let Some(_item) = queue.dequeue(&cancel).await {
                    seen += 1;
                }
                seen
            }));
        }

        for producer in producers {
            producer.await.unwrap();
        }
        // Give consumers time to drain, then stop them.
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        cancel.cancel();

        let total: usize = futures_total(consumers).await;
        assert_eq!(total, 200);
    }

    async fn futures_total(handles: Vec<tokio::task::JoinHandle<usize>>) -> usize {
        let mut total = 0;
        for handle in handles {
            total += handle.await.unwrap();
        }
        total
    }
}
