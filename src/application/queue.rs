//! Bounded priority holding area for admitted work.
//!
//! Ordering is total: priority class ascending, then submission sequence
//! ascending, so dispatch is FIFO within a class. `submit` never blocks;
//! a full queue is an explicit rejection the caller must handle.

use crate::domain::ports::Clock;
use crate::domain::work::WorkItem;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};

/// Result of a non-blocking submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Accepted,
    /// The queue is at capacity; the caller decides whether to retry,
    /// shed load, or escalate priority.
    RejectedQueueFull,
}

#[derive(Debug)]
struct QueuedItem {
    class: u8,
    seq: u64,
    item: WorkItem,
}

impl PartialEq for QueuedItem {
    fn eq(&self, other: &Self) -> bool {
        self.class == other.class && self.seq == other.seq
    }
}

impl Eq for QueuedItem {}

impl PartialOrd for QueuedItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedItem {
    fn cmp(&self, other: &Self) -> Ordering {
        self.class.cmp(&other.class).then(self.seq.cmp(&other.seq))
    }
}

struct Inner {
    heap: BinaryHeap<Reverse<QueuedItem>>,
    next_seq: u64,
}

pub struct AdmissionQueue {
    capacity: usize,
    inner: Mutex<Inner>,
    available: Notify,
    clock: Arc<dyn Clock>,
}

impl AdmissionQueue {
    pub fn new(capacity: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            capacity,
            inner: Mutex::new(Inner {
                heap: BinaryHeap::new(),
                next_seq: 0,
            }),
            available: Notify::new(),
            clock,
        }
    }

    /// Accepts the item or rejects it immediately if the queue is full.
    /// The submission timestamp is stamped here, under the queue lock.
    pub async fn submit(&self, mut item: WorkItem) -> SubmitOutcome {
        let mut inner = self.inner.lock().await;
        if inner.heap.len() >= self.capacity {
            tracing::warn!(work_id = %item.id, "admission queue full, submission rejected");
            return SubmitOutcome::RejectedQueueFull;
        }

        item.submitted_at = self.clock.now();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.heap.push(Reverse(QueuedItem {
            class: item.priority.class(),
            seq,
            item,
        }));
        drop(inner);

        self.available.notify_one();
        SubmitOutcome::Accepted
    }

    /// Removes and returns the most urgent item, waiting up to `wait` for
    /// one to arrive. `None` means the timeout expired on an empty queue.
    pub async fn take_next(&self, wait: Duration) -> Option<WorkItem> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            let notified = self.available.notified();
            if let Some(item) = self.try_take().await {
                return Some(item);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.try_take().await;
            }
        }
    }

    /// Non-blocking variant of [`take_next`](Self::take_next).
    pub async fn try_take(&self) -> Option<WorkItem> {
        let mut inner = self.inner.lock().await;
        inner.heap.pop().map(|Reverse(queued)| queued.item)
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.heap.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
