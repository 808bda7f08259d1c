use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::error::Elapsed;
use tokio_util::sync::CancellationToken;

/// The queue refused an item because the runtime is shutting down.
///
/// Carries the rejected item back so the caller can dispose of the
/// resources it owns.
#[derive(Debug)]
pub(crate) struct PushError<T>(pub T);

/// A bounded FIFO handoff between two pipeline stages.
///
/// `push` suspends while the queue is full and `pop` while it is empty;
/// both observe the shared cancellation token. A cancelled queue keeps
/// handing out whatever it still holds, so shutdown can drain the
/// pipeline without losing items.
pub(crate) struct BoundedQueue<T> {
    items: Mutex<VecDeque<T>>,
    not_empty: Notify,
    not_full: Notify,
    capacity: usize,
    cancel: CancellationToken,
}

impl<T> BoundedQueue<T> {
    pub fn new(capacity: usize, cancel: CancellationToken) -> Self {
        assert!(capacity > 0, "queue capacity must be positive");
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            not_empty: Notify::new(),
            not_full: Notify::new(),
            capacity,
            cancel,
        }
    }

    /// Append an item, suspending while the queue is full.
    ///
    /// On cancellation the item is handed back inside [`PushError`].
    pub async fn push(&self, item: T) -> Result<(), PushError<T>> {
        loop {
            // Arm the wakeup before the capacity check so a pop between
            // the check and the await is not lost.
            let slot_freed = self.not_full.notified();
            {
                let mut items = self.items.lock().unwrap();
                if items.len() < self.capacity {
                    items.push_back(item);
                    drop(items);
                    self.not_empty.notify_one();
                    return Ok(());
                }
            }
            tokio::select! {
                _ = slot_freed => {}
                _ = self.cancel.cancelled() => return Err(PushError(item)),
            }
        }
    }

    /// Remove the oldest item, suspending while the queue is empty.
    ///
    /// Returns `None` only once the queue is cancelled *and* empty;
    /// items queued before cancellation are still delivered.
    pub async fn pop(&self) -> Option<T> {
        loop {
            let item_queued = self.not_empty.notified();
            {
                let mut items = self.items.lock().unwrap();
                if let Some(item) = items.pop_front() {
                    drop(items);
                    self.not_full.notify_one();
                    return Some(item);
                }
            }
            if self.cancel.is_cancelled() {
                return None;
            }
            tokio::select! {
                _ = item_queued => {}
                _ = self.cancel.cancelled() => {}
            }
        }
    }

    /// [`pop`](Self::pop) bounded by a timeout.
    pub async fn pop_timeout(&self, timeout: Duration) -> Result<Option<T>, Elapsed> {
        tokio::time::timeout(timeout, self.pop()).await
    }

    /// Empty the queue, handing the remaining items back for disposal.
    pub fn drain(&self) -> Vec<T> {
        let drained: Vec<T> = self.items.lock().unwrap().drain(..).collect();
        self.not_full.notify_waiters();
        drained
    }

    pub fn len(&self) -> usize {
        self.items.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn queue<T>(capacity: usize) -> (Arc<BoundedQueue<T>>, CancellationToken) {
        let cancel = CancellationToken::new();
        (Arc::new(BoundedQueue::new(capacity, cancel.clone())), cancel)
    }

    #[tokio::test]
    async fn preserves_fifo_order() {
        let (queue, _cancel) = queue(8);
        for value in 0..5 {
            queue.push(value).await.unwrap();
        }
        for expected in 0..5 {
            assert_eq!(queue.pop().await, Some(expected));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn push_suspends_when_full() {
        let (queue, _cancel) = queue(2);
        queue.push(1).await.unwrap();
        queue.push(2).await.unwrap();

        let pusher = tokio::spawn({
            let queue = queue.clone();
            async move { queue.push(3).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!pusher.is_finished());

        assert_eq!(queue.pop().await, Some(1));
        pusher.await.unwrap().unwrap();
        assert_eq!(queue.pop().await, Some(2));
        assert_eq!(queue.pop().await, Some(3));
    }

    #[tokio::test]
    async fn pop_wakes_on_push() {
        let (queue, _cancel) = queue(2);
        let popper = tokio::spawn({
            let queue = queue.clone();
            async move { queue.pop().await }
        });
        queue.push(42).await.unwrap();
        assert_eq!(popper.await.unwrap(), Some(42));
    }

    #[tokio::test]
    async fn cancelled_push_returns_the_item() {
        let (queue, cancel) = queue(1);
        queue.push("first").await.unwrap();

        let pusher = tokio::spawn({
            let queue = queue.clone();
            async move { queue.push("second").await }
        });
        cancel.cancel();
        let rejected = pusher.await.unwrap().unwrap_err();
        assert_eq!(rejected.0, "second");
    }

    #[tokio::test]
    async fn cancelled_pop_drains_before_exiting() {
        let (queue, cancel) = queue(4);
        queue.push(1).await.unwrap();
        queue.push(2).await.unwrap();
        cancel.cancel();

        assert_eq!(queue.pop().await, Some(1));
        assert_eq!(queue.pop().await, Some(2));
        assert_eq!(queue.pop().await, None);
    }

    #[tokio::test]
    async fn cancellation_wakes_a_blocked_pop() {
        let (queue, cancel) = queue::<i32>(4);
        let popper = tokio::spawn({
            let queue = queue.clone();
            async move { queue.pop().await }
        });
        cancel.cancel();
        assert_eq!(popper.await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn pop_timeout_elapses_on_an_empty_queue() {
        let (queue, _cancel) = queue::<i32>(4);
        let result = queue.pop_timeout(Duration::from_millis(50)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn drain_returns_the_backlog() {
        let (queue, _cancel) = queue(4);
        for value in 0..3 {
            queue.push(value).await.unwrap();
        }
        assert_eq!(queue.drain(), vec![0, 1, 2]);
        assert_eq!(queue.len(), 0);
    }
}
