//! Bounded producer/consumer hand-off for change batches.
//!
//! Single producer, single consumer. Batches are delivered in send order;
//! an idempotent completion marker lets the consumer drain everything that
//! was sent before observing end-of-stream. Capacity and the full-queue
//! policy are explicit so backpressure is a testable property instead of
//! unbounded memory growth.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::sync::Notify;

use crate::event::ChangeBatch;

/// What `send` does when the queue is at capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Suspend the producer until the consumer makes room
    Block,
    /// Evict the oldest queued batch to make room
    DropOldest,
    /// Fail the send with [`SendError::Full`]
    Reject,
}

/// Queue capacity and overflow behavior.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Maximum number of queued batches
    pub capacity: usize,
    /// Behavior when the queue is full
    pub policy: OverflowPolicy,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: 64,
            policy: OverflowPolicy::Block,
        }
    }
}

/// Errors returned by [`BatchSender::send`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendError {
    /// Send was called after completion was marked. Only the producer
    /// marks completion, so this indicates a programming error.
    #[error("send after queue completion")]
    Completed,
    /// Queue at capacity under [`OverflowPolicy::Reject`]
    #[error("queue full")]
    Full,
}

struct Shared {
    buf: Mutex<VecDeque<ChangeBatch>>,
    completed: AtomicBool,
    capacity: usize,
    policy: OverflowPolicy,
    // notify_one stores a permit, so wakeups between a state check and the
    // matching notified().await are not lost
    not_empty: Notify,
    not_full: Notify,
}

/// Producer half of the change queue.
pub struct BatchSender {
    shared: Arc<Shared>,
}

/// Consumer half of the change queue.
pub struct BatchReceiver {
    shared: Arc<Shared>,
}

/// Create a connected sender/receiver pair.
pub fn change_queue(config: QueueConfig) -> (BatchSender, BatchReceiver) {
    let shared = Arc::new(Shared {
        buf: Mutex::new(VecDeque::with_capacity(config.capacity.min(1024))),
        completed: AtomicBool::new(false),
        capacity: config.capacity,
        policy: config.policy,
        not_empty: Notify::new(),
        not_full: Notify::new(),
    });
    (
        BatchSender {
            shared: shared.clone(),
        },
        BatchReceiver { shared },
    )
}

impl BatchSender {
    /// Enqueue a batch.
    ///
    /// Suspends only under [`OverflowPolicy::Block`] when the queue is at
    /// capacity. Fails if completion has already been marked.
    pub async fn send(&self, batch: ChangeBatch) -> Result<(), SendError> {
        let mut batch = Some(batch);
        loop {
            if self.shared.completed.load(Ordering::Acquire) {
                return Err(SendError::Completed);
            }
            {
                let mut buf = self.shared.buf.lock().expect("queue lock poisoned");
                if buf.len() < self.shared.capacity {
                    buf.push_back(batch.take().expect("batch consumed twice"));
                    drop(buf);
                    self.shared.not_empty.notify_one();
                    return Ok(());
                }
                match self.shared.policy {
                    OverflowPolicy::DropOldest => {
                        buf.pop_front();
                        buf.push_back(batch.take().expect("batch consumed twice"));
                        drop(buf);
                        self.shared.not_empty.notify_one();
                        return Ok(());
                    }
                    OverflowPolicy::Reject => return Err(SendError::Full),
                    OverflowPolicy::Block => {}
                }
            }
            self.shared.not_full.notified().await;
        }
    }

    /// Mark that no further batches will be sent. Idempotent; wakes a
    /// blocked receiver so it can drain and observe end-of-stream.
    pub fn complete(&self) {
        if !self.shared.completed.swap(true, Ordering::AcqRel) {
            self.shared.not_empty.notify_one();
        }
    }

    /// Whether completion has been marked.
    pub fn is_completed(&self) -> bool {
        self.shared.completed.load(Ordering::Acquire)
    }
}

impl BatchReceiver {
    /// Receive the next batch in send order.
    ///
    /// Suspends while the queue is empty and completion has not been
    /// marked. Returns `None` exactly when completion has been marked and
    /// every sent batch has been delivered.
    pub async fn recv(&mut self) -> Option<ChangeBatch> {
        loop {
            {
                let mut buf = self.shared.buf.lock().expect("queue lock poisoned");
                if let Some(batch) = buf.pop_front() {
                    drop(buf);
                    self.shared.not_full.notify_one();
                    return Some(batch);
                }
                if self.shared.completed.load(Ordering::Acquire) {
                    return None;
                }
            }
            self.shared.not_empty.notified().await;
        }
    }

    /// Number of batches currently queued.
    pub fn len(&self) -> usize {
        self.shared.buf.lock().expect("queue lock poisoned").len()
    }

    /// Whether the queue is currently empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{ChangeOp, ChangeRow};
    use crate::position::Lsn;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn batch(seq: u64) -> ChangeBatch {
        vec![ChangeRow {
            table: "t".to_string(),
            operation: ChangeOp::Insert,
            sequence_value: Lsn::from_hex(&format!("{:020x}", seq)).unwrap(),
            commit_lsn: Lsn::min(),
            values: serde_json::Map::new(),
        }]
    }

    fn first_seq(b: &ChangeBatch) -> String {
        b[0].sequence_value.to_hex()
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let (tx, mut rx) = change_queue(QueueConfig::default());
        for i in 1..=3u64 {
            tx.send(batch(i)).await.unwrap();
        }
        tx.complete();
        for i in 1..=3u64 {
            let b = rx.recv().await.unwrap();
            assert_eq!(first_seq(&b), format!("{:020x}", i));
        }
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_drain_after_complete() {
        // Draining law: completion marked right after the last send must
        // not hide already-queued batches.
        let (tx, mut rx) = change_queue(QueueConfig::default());
        tx.send(batch(1)).await.unwrap();
        tx.send(batch(2)).await.unwrap();
        tx.complete();

        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_none());
        // Receiving past end-of-stream stays at end-of-stream
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_complete_is_idempotent() {
        let (tx, mut rx) = change_queue(QueueConfig::default());
        tx.send(batch(1)).await.unwrap();
        tx.complete();
        tx.complete();
        tx.complete();
        assert!(tx.is_completed());
        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_send_after_complete_fails() {
        let (tx, _rx) = change_queue(QueueConfig::default());
        tx.complete();
        assert_eq!(tx.send(batch(1)).await, Err(SendError::Completed));
    }

    #[tokio::test]
    async fn test_reject_when_full() {
        let (tx, mut rx) = change_queue(QueueConfig {
            capacity: 1,
            policy: OverflowPolicy::Reject,
        });
        tx.send(batch(1)).await.unwrap();
        assert_eq!(tx.send(batch(2)).await, Err(SendError::Full));

        // Room opens up after a receive
        rx.recv().await.unwrap();
        tx.send(batch(3)).await.unwrap();
    }

    #[tokio::test]
    async fn test_drop_oldest_keeps_newest() {
        let (tx, mut rx) = change_queue(QueueConfig {
            capacity: 2,
            policy: OverflowPolicy::DropOldest,
        });
        tx.send(batch(1)).await.unwrap();
        tx.send(batch(2)).await.unwrap();
        tx.send(batch(3)).await.unwrap();
        tx.complete();

        assert_eq!(first_seq(&rx.recv().await.unwrap()), format!("{:020x}", 2));
        assert_eq!(first_seq(&rx.recv().await.unwrap()), format!("{:020x}", 3));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_block_applies_backpressure() {
        let (tx, mut rx) = change_queue(QueueConfig {
            capacity: 1,
            policy: OverflowPolicy::Block,
        });
        let second_sent = Arc::new(AtomicUsize::new(0));

        tx.send(batch(1)).await.unwrap();

        let flag = second_sent.clone();
        let producer = tokio::spawn(async move {
            tx.send(batch(2)).await.unwrap();
            flag.store(1, Ordering::SeqCst);
            tx.complete();
        });

        // Producer must still be suspended on the full queue
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(second_sent.load(Ordering::SeqCst), 0);

        // Receiving unblocks it
        assert_eq!(first_seq(&rx.recv().await.unwrap()), format!("{:020x}", 1));
        producer.await.unwrap();
        assert_eq!(second_sent.load(Ordering::SeqCst), 1);

        assert_eq!(first_seq(&rx.recv().await.unwrap()), format!("{:020x}", 2));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_recv_wakes_on_late_send() {
        let (tx, mut rx) = change_queue(QueueConfig::default());
        let recv_task = tokio::spawn(async move {
            let b = rx.recv().await;
            (b, rx.recv().await)
        });
        tokio::task::yield_now().await;
        tx.send(batch(9)).await.unwrap();
        tx.complete();

        let (first, second) = recv_task.await.unwrap();
        assert_eq!(first_seq(&first.unwrap()), format!("{:020x}", 9));
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn test_recv_wakes_on_completion_without_sends() {
        let (tx, mut rx) = change_queue(QueueConfig::default());
        let recv_task = tokio::spawn(async move { rx.recv().await });
        tokio::task::yield_now().await;
        tx.complete();
        assert!(recv_task.await.unwrap().is_none());
    }
}
