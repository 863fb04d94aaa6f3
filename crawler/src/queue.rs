use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use tokio::sync::{Notify, Semaphore};

/// FIFO work queue shared by the crawl workers.
///
/// Every pushed item must be acknowledged with [`task_done`], even when
/// processing failed, so [`join`] reliably resolves once the frontier is
/// drained. [`close`] wakes all blocked consumers with `None`.
///
/// [`task_done`]: WorkQueue::task_done
/// [`join`]: WorkQueue::join
/// [`close`]: WorkQueue::close
pub struct WorkQueue {
    items: Mutex<VecDeque<String>>,
    ready: Semaphore,
    unfinished: AtomicUsize,
    drained: Notify,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            ready: Semaphore::new(0),
            unfinished: AtomicUsize::new(0),
            drained: Notify::new(),
        }
    }

    /// Enqueue a URL. Returns false (dropping the item) once the queue is
    /// closed.
    pub fn push(&self, url: String) -> bool {
        if self.ready.is_closed() {
            return false;
        }
        self.unfinished.fetch_add(1, Ordering::AcqRel);
        self.items.lock().push_back(url);
        self.ready.add_permits(1);
        true
    }

    /// Wait for the next URL; `None` once the queue is closed.
    pub async fn pop(&self) -> Option<String> {
        loop {
            match self.ready.acquire().await {
                Ok(permit) => {
                    permit.forget();
                    if let Some(url) = self.items.lock().pop_front() {
                        return Some(url);
                    }
                }
                Err(_) => return None,
            }
        }
    }

    /// Acknowledge one popped URL as fully processed.
    pub fn task_done(&self) {
        if self.unfinished.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.drained.notify_waiters();
        }
    }

    /// Resolves once every pushed URL has been acknowledged.
    pub async fn join(&self) {
        loop {
            if self.unfinished.load(Ordering::Acquire) == 0 {
                return;
            }
            let drained = self.drained.notified();
            tokio::pin!(drained);
            // Register for wakeups before the re-check so an acknowledgement
            // landing in between cannot be missed.
            drained.as_mut().enable();
            if self.unfinished.load(Ordering::Acquire) == 0 {
                return;
            }
            drained.await;
        }
    }

    pub fn close(&self) {
        self.ready.close();
    }
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn pops_in_fifo_order() {
        let queue = WorkQueue::new();
        assert!(queue.push("a".into()));
        assert!(queue.push("b".into()));
        assert_eq!(queue.pop().await.as_deref(), Some("a"));
        assert_eq!(queue.pop().await.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn join_waits_for_acknowledgements() {
        let queue = Arc::new(WorkQueue::new());
        queue.push("a".into());
        queue.pop().await.unwrap();

        let joined = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.join().await })
        };
        // Popped but not acknowledged: join must still be pending.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!joined.is_finished());

        queue.task_done();
        tokio::time::timeout(Duration::from_secs(1), joined)
            .await
            .expect("join should resolve")
            .unwrap();
    }

    #[tokio::test]
    async fn join_resolves_immediately_when_empty() {
        let queue = WorkQueue::new();
        tokio::time::timeout(Duration::from_secs(1), queue.join())
            .await
            .expect("empty queue joins immediately");
    }

    #[tokio::test]
    async fn close_wakes_blocked_consumers() {
        let queue = Arc::new(WorkQueue::new());
        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.pop().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.close();
        let popped = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .expect("pop should unblock")
            .unwrap();
        assert_eq!(popped, None);
        assert!(!queue.push("late".into()));
    }
}
