//! Explicit publish/subscribe for state snapshots and cues.
//!
//! Subscribers get their own `mpsc` receiver and an id to unsubscribe with.
//! A subscriber that drops its receiver is pruned on the next publish.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

pub struct Subscription<T> {
    pub id: SubscriptionId,
    pub rx: Receiver<T>,
}

pub struct Broadcaster<T> {
    next_id: AtomicU64,
    subscribers: Mutex<Vec<(SubscriptionId, Sender<T>)>>,
}

impl<T: Clone> Broadcaster<T> {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn subscribe(&self) -> Subscription<T> {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel();
        self.lock().push((id, tx));
        Subscription { id, rx }
    }

    /// Returns false if `id` was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.lock();
        let before = subscribers.len();
        subscribers.retain(|(sub_id, _)| *sub_id != id);
        subscribers.len() != before
    }

    pub fn publish(&self, value: &T) {
        self.lock()
            .retain(|(_, tx)| tx.send(value.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(SubscriptionId, Sender<T>)>> {
        // the list stays consistent even if a publish panicked mid-send
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<T: Clone> Default for Broadcaster<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribers_receive_published_values() {
        let b = Broadcaster::new();
        let first = b.subscribe();
        let second = b.subscribe();

        b.publish(&5u32);

        assert_eq!(first.rx.try_recv().unwrap(), 5);
        assert_eq!(second.rx.try_recv().unwrap(), 5);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let b = Broadcaster::new();
        let sub = b.subscribe();
        assert!(b.unsubscribe(sub.id));
        assert!(!b.unsubscribe(sub.id));

        b.publish(&1u32);
        assert!(sub.rx.try_recv().is_err());
        assert_eq!(b.subscriber_count(), 0);
    }

    #[test]
    fn dropped_receivers_are_pruned() {
        let b = Broadcaster::new();
        let kept = b.subscribe();
        drop(b.subscribe());
        assert_eq!(b.subscriber_count(), 2);

        b.publish(&"x".to_string());
        assert_eq!(b.subscriber_count(), 1);
        assert_eq!(kept.rx.try_recv().unwrap(), "x");
    }
}
