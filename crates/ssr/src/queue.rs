//! FIFO handoff queue with suspending acquisition.
//!
//! Idle items wait in `idle`; callers that find it empty park a oneshot
//! sender in `waiters`. `enqueue` always serves the earliest live waiter
//! before storing anything, so an item is either idle, in flight to exactly
//! one waiter, or held by exactly one caller.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;

use crate::error::{Result, SsrError};

struct State<T> {
    idle: VecDeque<T>,
    waiters: VecDeque<oneshot::Sender<T>>,
    closed: bool,
}

/// Async FIFO queue of interchangeable resources.
pub struct BlockingQueue<T> {
    state: Arc<Mutex<State<T>>>,
}

impl<T> Clone for BlockingQueue<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T> Default for BlockingQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> BlockingQueue<T> {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                idle: VecDeque::new(),
                waiters: VecDeque::new(),
                closed: false,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        // The critical sections never panic halfway through a mutation.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hand `item` to the earliest pending waiter, or store it as idle.
    ///
    /// Never blocks.
    pub fn enqueue(&self, item: T) {
        let mut state = self.lock();
        let mut item = item;
        while let Some(waiter) = state.waiters.pop_front() {
            match waiter.send(item) {
                Ok(()) => return,
                // Waiter went away; try the next one.
                Err(returned) => item = returned,
            }
        }
        state.idle.push_back(item);
    }

    /// [`BlockingQueue::enqueue`] unless the queue is closed, in which case
    /// the item comes back to the caller.
    ///
    /// The closed check and the hand-off happen under one lock, so an item
    /// is either drained by whoever closed the queue or returned here.
    pub fn try_enqueue(&self, item: T) -> std::result::Result<(), T> {
        let mut state = self.lock();
        if state.closed {
            return Err(item);
        }
        let mut item = item;
        while let Some(waiter) = state.waiters.pop_front() {
            match waiter.send(item) {
                Ok(()) => return Ok(()),
                Err(returned) => item = returned,
            }
        }
        state.idle.push_back(item);
        Ok(())
    }

    /// Take the next item, suspending until one is enqueued.
    ///
    /// Pending calls are served strictly in registration order. Dropping the
    /// returned future never loses an item: anything already handed to it is
    /// passed on to the next waiter or back to the idle list.
    pub async fn dequeue(&self) -> Result<T> {
        let rx = {
            let mut state = self.lock();
            if state.closed {
                return Err(SsrError::QueueClosed);
            }
            if let Some(item) = state.idle.pop_front() {
                return Ok(item);
            }
            let (tx, rx) = oneshot::channel();
            state.waiters.push_back(tx);
            rx
        };

        let mut waiter = Waiter {
            rx,
            queue: self.clone(),
        };
        let received = (&mut waiter.rx).await;
        received.map_err(|_| SsrError::QueueClosed)
    }

    /// Take an idle item without waiting.
    pub fn try_dequeue(&self) -> Option<T> {
        let mut state = self.lock();
        if state.closed {
            return None;
        }
        state.idle.pop_front()
    }

    /// Number of idle items.
    pub fn idle_len(&self) -> usize {
        self.lock().idle.len()
    }

    /// Number of callers currently suspended in `dequeue`.
    pub fn waiting_len(&self) -> usize {
        self.lock()
            .waiters
            .iter()
            .filter(|waiter| !waiter.is_closed())
            .count()
    }

    /// Remove and return every idle item.
    pub fn drain_idle(&self) -> Vec<T> {
        self.lock().idle.drain(..).collect()
    }

    /// Fail all pending and future `dequeue` calls with `QueueClosed`.
    ///
    /// Idle items stay in place for `drain_idle`.
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        state.waiters.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

/// Pending dequeue; returns an undelivered item on drop.
struct Waiter<T> {
    rx: oneshot::Receiver<T>,
    queue: BlockingQueue<T>,
}

impl<T> Drop for Waiter<T> {
    fn drop(&mut self) {
        self.rx.close();
        if let Ok(item) = self.rx.try_recv() {
            self.queue.enqueue(item);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::time::Duration;

    use rand::Rng;

    use super::*;

    async fn wait_for_waiters<T>(queue: &BlockingQueue<T>, n: usize) {
        while queue.waiting_len() < n {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_dequeue_returns_idle_immediately() {
        let queue = BlockingQueue::new();
        queue.enqueue(1);
        queue.enqueue(2);
        assert_eq!(queue.idle_len(), 2);
        assert_eq!(queue.dequeue().await.unwrap(), 1);
        assert_eq!(queue.dequeue().await.unwrap(), 2);
        assert_eq!(queue.idle_len(), 0);
    }

    #[tokio::test]
    async fn test_enqueue_hands_item_directly_to_waiter() {
        let queue = BlockingQueue::new();
        let waiter = tokio::spawn({
            let queue = queue.clone();
            async move { queue.dequeue().await }
        });
        wait_for_waiters(&queue, 1).await;

        queue.enqueue("ctx");
        assert_eq!(waiter.await.unwrap().unwrap(), "ctx");
        // Handed over, never stored
        assert_eq!(queue.idle_len(), 0);
    }

    #[tokio::test]
    async fn test_waiters_served_in_registration_order() {
        let queue = BlockingQueue::new();
        let mut handles = Vec::new();
        for i in 0..5 {
            let q = queue.clone();
            handles.push(tokio::spawn(async move { (i, q.dequeue().await.unwrap()) }));
            wait_for_waiters(&queue, i + 1).await;
        }

        for item in 100..105 {
            queue.enqueue(item);
        }

        for handle in handles {
            let (i, item) = handle.await.unwrap();
            assert_eq!(item, 100 + i);
        }
    }

    #[tokio::test]
    async fn test_dropped_waiter_is_skipped() {
        let queue = BlockingQueue::new();

        let abandoned = tokio::spawn({
            let queue = queue.clone();
            async move { queue.dequeue().await }
        });
        wait_for_waiters(&queue, 1).await;
        let served = tokio::spawn({
            let queue = queue.clone();
            async move { queue.dequeue().await }
        });
        wait_for_waiters(&queue, 2).await;

        abandoned.abort();
        let _ = abandoned.await;

        queue.enqueue(7);
        assert_eq!(served.await.unwrap().unwrap(), 7);
        assert_eq!(queue.idle_len(), 0);
    }

    #[tokio::test]
    async fn test_timed_out_dequeue_loses_nothing() {
        let queue: BlockingQueue<u32> = BlockingQueue::new();
        let result = tokio::time::timeout(Duration::from_millis(10), queue.dequeue()).await;
        assert!(result.is_err());
        assert_eq!(queue.waiting_len(), 0);

        queue.enqueue(1);
        assert_eq!(queue.idle_len(), 1);
    }

    #[tokio::test]
    async fn test_close_fails_waiters_and_future_dequeues() {
        let queue: BlockingQueue<u32> = BlockingQueue::new();
        let waiter = tokio::spawn({
            let queue = queue.clone();
            async move { queue.dequeue().await }
        });
        wait_for_waiters(&queue, 1).await;

        queue.enqueue(1);
        queue.close();
        queue.enqueue(2);

        // First waiter was served before close
        assert_eq!(waiter.await.unwrap().unwrap(), 1);
        assert!(matches!(queue.dequeue().await, Err(SsrError::QueueClosed)));
        assert_eq!(queue.try_dequeue(), None);
        assert_eq!(queue.drain_idle(), vec![2]);
    }

    #[tokio::test]
    async fn test_try_enqueue_returns_item_once_closed() {
        let queue: BlockingQueue<u32> = BlockingQueue::new();
        let waiter = tokio::spawn({
            let queue = queue.clone();
            async move { queue.dequeue().await }
        });
        wait_for_waiters(&queue, 1).await;

        assert_eq!(queue.try_enqueue(1), Ok(()));
        assert_eq!(waiter.await.unwrap().unwrap(), 1);
        assert_eq!(queue.try_enqueue(2), Ok(()));

        queue.close();
        assert_eq!(queue.try_enqueue(3), Err(3));
        assert_eq!(queue.drain_idle(), vec![2]);
        assert_eq!(queue.idle_len(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_randomized_load_never_loses_or_duplicates() {
        const ITEMS: u32 = 4;
        const TASKS: usize = 32;

        let queue = BlockingQueue::new();
        for item in 0..ITEMS {
            queue.enqueue(item);
        }
        let held = Arc::new(Mutex::new(HashSet::new()));

        let mut handles = Vec::new();
        for _ in 0..TASKS {
            let queue = queue.clone();
            let held = Arc::clone(&held);
            handles.push(tokio::spawn(async move {
                for _ in 0..20 {
                    let item = queue.dequeue().await.unwrap();
                    assert!(held.lock().unwrap().insert(item), "item {item} held twice");

                    let pause = rand::rng().random_range(0..200);
                    tokio::time::sleep(Duration::from_micros(pause)).await;

                    held.lock().unwrap().remove(&item);
                    queue.enqueue(item);
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let mut remaining = queue.drain_idle();
        remaining.sort_unstable();
        assert_eq!(remaining, (0..ITEMS).collect::<Vec<_>>());
    }
}
