// src/pipeline/queue.rs
//! Bounded newest-wins history of trigger windows

use crate::processing::trigger::TriggerWindow;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

struct QueueInner {
    windows: Mutex<VecDeque<TriggerWindow>>,
    available: Condvar,
    capacity: usize,
    pushed: AtomicU64,
    evicted: AtomicU64,
}

/// The caller's view of emitted windows.
///
/// Holds at most `capacity` windows; pushing onto a full queue evicts the
/// oldest. Clones share the same queue.
#[derive(Clone)]
pub struct ResultQueue {
    inner: Arc<QueueInner>,
}

impl ResultQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(QueueInner {
                windows: Mutex::new(VecDeque::with_capacity(capacity)),
                available: Condvar::new(),
                capacity,
                pushed: AtomicU64::new(0),
                evicted: AtomicU64::new(0),
            }),
        }
    }

    /// Append a window, returning the one evicted to make room
    pub fn push(&self, window: TriggerWindow) -> Option<TriggerWindow> {
        let evicted = {
            let mut windows = self.inner.windows.lock();
            let evicted = if windows.len() >= self.inner.capacity {
                windows.pop_front()
            } else {
                None
            };
            windows.push_back(window);
            evicted
        };
        self.inner.pushed.fetch_add(1, Ordering::Relaxed);
        if evicted.is_some() {
            self.inner.evicted.fetch_add(1, Ordering::Relaxed);
        }
        self.inner.available.notify_one();
        evicted
    }

    pub fn pop_oldest(&self) -> Option<TriggerWindow> {
        self.inner.windows.lock().pop_front()
    }

    /// Most recent window, left in the queue
    pub fn latest(&self) -> Option<TriggerWindow> {
        self.inner.windows.lock().back().cloned()
    }

    /// Remove and return everything, oldest first
    pub fn drain(&self) -> Vec<TriggerWindow> {
        self.inner.windows.lock().drain(..).collect()
    }

    /// Copy of the current contents, oldest first
    pub fn snapshot(&self) -> Vec<TriggerWindow> {
        self.inner.windows.lock().iter().cloned().collect()
    }

    /// Pop the oldest window, waiting up to `timeout` for one to arrive
    pub fn wait_pop(&self, timeout: Duration) -> Option<TriggerWindow> {
        let deadline = Instant::now() + timeout;
        let mut windows = self.inner.windows.lock();
        loop {
            if let Some(window) = windows.pop_front() {
                return Some(window);
            }
            if self.inner.available.wait_until(&mut windows, deadline).timed_out() {
                return windows.pop_front();
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.windows.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.windows.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Windows ever pushed
    pub fn pushed(&self) -> u64 {
        self.inner.pushed.load(Ordering::Relaxed)
    }

    /// Windows dropped to make room for newer ones
    pub fn evicted(&self) -> u64 {
        self.inner.evicted.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for ResultQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultQueue")
            .field("len", &self.len())
            .field("capacity", &self.inner.capacity)
            .field("evicted", &self.evicted())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::trigger::{RisingEdgeTrigger, TriggerConfig};
    use std::thread;

    /// `count` windows whose crossing indices increase
    fn windows(count: usize) -> Vec<TriggerWindow> {
        let mut trigger = RisingEdgeTrigger::new(TriggerConfig {
            threshold: 100,
            pre_samples: 1,
            post_samples: 1,
        })
        .unwrap();
        let stream: Vec<u8> = (0..count).flat_map(|_| [0u8, 200, 0]).collect();
        let windows = trigger.push(&stream);
        assert_eq!(windows.len(), count);
        windows
    }

    #[test]
    fn test_keeps_most_recent() {
        let queue = ResultQueue::new(10);
        let all = windows(25);
        for window in all.iter().cloned() {
            queue.push(window);
        }

        assert_eq!(queue.len(), 10);
        assert_eq!(queue.evicted(), 15);
        assert_eq!(queue.pushed(), 25);
        assert_eq!(queue.snapshot(), all[15..].to_vec());
        assert_eq!(queue.latest(), all.last().cloned());
    }

    #[test]
    fn test_push_returns_evicted() {
        let queue = ResultQueue::new(2);
        let all = windows(3);
        assert!(queue.push(all[0].clone()).is_none());
        assert!(queue.push(all[1].clone()).is_none());
        assert_eq!(queue.push(all[2].clone()), Some(all[0].clone()));
    }

    #[test]
    fn test_pop_and_drain_order() {
        let queue = ResultQueue::new(4);
        let all = windows(3);
        for window in all.iter().cloned() {
            queue.push(window);
        }
        assert_eq!(queue.pop_oldest(), Some(all[0].clone()));
        assert_eq!(queue.drain(), all[1..].to_vec());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_wait_pop_wakes_on_push() {
        let queue = ResultQueue::new(4);
        let producer = queue.clone();
        let window = windows(1).remove(0);
        let expected = window.clone();

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            producer.push(window);
        });

        assert_eq!(queue.wait_pop(Duration::from_secs(5)), Some(expected));
        handle.join().unwrap();
    }

    #[test]
    fn test_wait_pop_times_out() {
        let queue = ResultQueue::new(1);
        assert!(queue.wait_pop(Duration::from_millis(10)).is_none());
    }

    #[test]
    fn test_zero_capacity_clamped() {
        assert_eq!(ResultQueue::new(0).capacity(), 1);
    }
}
