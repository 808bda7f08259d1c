use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Result, RuntimeError};

/// A fixed-size byte region the engine uses as the output staging area
/// for one job.
#[derive(Debug)]
pub struct ScratchBuffer {
    bytes: Vec<u8>,
}

impl ScratchBuffer {
    pub fn new(size: usize) -> Self {
        Self {
            bytes: vec![0; size],
        }
    }

    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

/// Bounded pool of scratch buffers reused across submissions.
///
/// Checkout suspends until a buffer is available; this is the
/// backpressure that caps in-flight concurrency at the pool size.
/// Every buffer is exclusively owned by whoever holds it, and between
/// construction and [`drain`](Self::drain) the pooled count plus the
/// checked-out count always equals the pool capacity.
pub(crate) struct ScratchPool {
    buffers: Mutex<VecDeque<ScratchBuffer>>,
    returned: Notify,
    cancel: CancellationToken,
    capacity: usize,
    buffer_size: usize,
    outstanding: AtomicUsize,
    drained: AtomicBool,
}

impl ScratchPool {
    pub fn new(count: usize, buffer_size: usize, cancel: CancellationToken) -> Result<Self> {
        if count == 0 {
            return Err(RuntimeError::AllocationFailed(
                "scratch pool would hold zero buffers".into(),
            ));
        }
        let buffers = (0..count).map(|_| ScratchBuffer::new(buffer_size)).collect();
        debug!(count, buffer_size, "scratch pool allocated");
        Ok(Self {
            buffers: Mutex::new(buffers),
            returned: Notify::new(),
            cancel,
            capacity: count,
            buffer_size,
            outstanding: AtomicUsize::new(0),
            drained: AtomicBool::new(false),
        })
    }

    /// Remove and return a pooled buffer, suspending until one is
    /// available or the runtime shuts down.
    pub async fn checkout(&self) -> Result<ScratchBuffer> {
        loop {
            // Arm the wakeup before checking so a return between the
            // check and the await is not lost.
            let returned = self.returned.notified();
            {
                let mut buffers = self.buffers.lock().unwrap();
                if let Some(buffer) = buffers.pop_front() {
                    self.outstanding.fetch_add(1, Ordering::SeqCst);
                    return Ok(buffer);
                }
            }
            tokio::select! {
                _ = returned => {}
                _ = self.cancel.cancelled() => return Err(RuntimeError::ShuttingDown),
            }
        }
    }

    /// Return a checked-out buffer to the pool. Never suspends.
    pub fn give_back(&self, buffer: ScratchBuffer) {
        if self.drained.load(Ordering::SeqCst) {
            // Returned after teardown; drop it instead of repopulating.
            self.outstanding.fetch_sub(1, Ordering::SeqCst);
            return;
        }
        self.buffers.lock().unwrap().push_back(buffer);
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
        self.returned.notify_one();
    }

    /// Release a checked-out buffer without repooling it.
    ///
    /// Shutdown uses this to dispose of buffers recovered from drained
    /// queues while keeping the checkout accounting balanced.
    pub fn forget(&self, buffer: ScratchBuffer) {
        drop(buffer);
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
    }

    /// Free all pooled buffers and report any still outstanding.
    pub fn drain(&self) -> usize {
        self.drained.store(true, Ordering::SeqCst);
        let freed = {
            let mut buffers = self.buffers.lock().unwrap();
            let freed = buffers.len();
            buffers.clear();
            freed
        };
        let leaked = self.outstanding.load(Ordering::SeqCst);
        if leaked > 0 {
            warn!(leaked, "scratch buffers were never returned to the pool");
        }
        freed
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Buffers currently pooled.
    pub fn available(&self) -> usize {
        self.buffers.lock().unwrap().len()
    }

    /// Buffers currently checked out.
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn pool(count: usize) -> (Arc<ScratchPool>, CancellationToken) {
        let cancel = CancellationToken::new();
        let pool = ScratchPool::new(count, 16, cancel.clone()).unwrap();
        (Arc::new(pool), cancel)
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let result = ScratchPool::new(0, 16, CancellationToken::new());
        assert!(matches!(result, Err(RuntimeError::AllocationFailed(_))));
    }

    #[tokio::test]
    async fn balance_is_conserved() {
        let (pool, _cancel) = pool(3);
        assert_eq!(pool.available() + pool.outstanding(), 3);

        let a = pool.checkout().await.unwrap();
        let b = pool.checkout().await.unwrap();
        assert_eq!(pool.available(), 1);
        assert_eq!(pool.outstanding(), 2);
        assert_eq!(pool.available() + pool.outstanding(), 3);

        pool.give_back(a);
        pool.give_back(b);
        assert_eq!(pool.available() + pool.outstanding(), 3);
        assert_eq!(pool.outstanding(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn checkout_suspends_until_a_return() {
        let (pool, _cancel) = pool(1);
        let held = pool.checkout().await.unwrap();

        let waiter = tokio::spawn({
            let pool = pool.clone();
            async move { pool.checkout().await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        pool.give_back(held);
        let buffer = waiter.await.unwrap().unwrap();
        assert_eq!(buffer.capacity(), 16);
    }

    #[tokio::test]
    async fn cancellation_unblocks_checkout() {
        let (pool, cancel) = pool(1);
        let _held = pool.checkout().await.unwrap();

        let waiter = tokio::spawn({
            let pool = pool.clone();
            async move { pool.checkout().await }
        });
        cancel.cancel();
        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(RuntimeError::ShuttingDown)));
    }

    #[tokio::test]
    async fn drain_frees_pooled_buffers() {
        let (pool, _cancel) = pool(2);
        let held = pool.checkout().await.unwrap();
        assert_eq!(pool.drain(), 1);
        assert_eq!(pool.available(), 0);

        // A late return after drain is dropped, not repooled.
        pool.give_back(held);
        assert_eq!(pool.available(), 0);
        assert_eq!(pool.outstanding(), 0);
    }
}
