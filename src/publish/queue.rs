// src/publish/queue.rs
//! Bounded FIFO of pending publish tasks with a configurable overflow policy.
//!
//! Single consumer. Producers may be many (backfill + live listener); every
//! operation is one critical section, so no caller sees a torn update.

use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::Notify;

use crate::config::OverflowPolicy;
use crate::error::QueueError;
use crate::transform::PublishPayload;

/// A pending publish instruction. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueTask {
    pub payload: PublishPayload,
    pub enqueued_at: DateTime<Utc>,
}

impl QueueTask {
    /// `enqueued_at` comes from the caller's clock.
    pub fn new(payload: PublishPayload, enqueued_at: DateTime<Utc>) -> Self {
        Self {
            payload,
            enqueued_at,
        }
    }
}

/// Outcome of a successful enqueue.
#[derive(Debug, PartialEq, Eq)]
pub enum Admission {
    Queued,
    /// Queue was full; the oldest pending task was evicted to make room.
    EvictedOldest(Box<QueueTask>),
}

struct State {
    tasks: VecDeque<QueueTask>,
    closed: bool,
}

pub struct OverflowQueue {
    state: Mutex<State>,
    capacity: usize,
    policy: OverflowPolicy,
    not_empty: Notify,
    not_full: Notify,
}

impl OverflowQueue {
    /// `capacity` of 0 is treated as 1.
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(State {
                tasks: VecDeque::with_capacity(capacity.min(10_000)),
                closed: false,
            }),
            capacity,
            policy,
            not_empty: Notify::new(),
            not_full: Notify::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // Critical sections never panic mid-update, so a poisoned state is still consistent.
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Add a task. Under `Block` this waits for space; under `DropOldest` it
    /// evicts the oldest pending task when full.
    pub async fn enqueue(&self, task: QueueTask) -> Result<Admission, QueueError> {
        loop {
            let notified = self.not_full.notified();
            tokio::pin!(notified);
            // Register before checking so a dequeue between check and await is not missed.
            notified.as_mut().enable();

            {
                let mut st = self.lock();
                if st.closed {
                    return Err(QueueError::Closed);
                }
                if st.tasks.len() < self.capacity {
                    st.tasks.push_back(task);
                    gauge!("relay_queue_depth").set(st.tasks.len() as f64);
                    drop(st);
                    self.not_empty.notify_one();
                    return Ok(Admission::Queued);
                }
                if self.policy == OverflowPolicy::DropOldest {
                    let evicted = st.tasks.pop_front();
                    st.tasks.push_back(task);
                    drop(st);
                    self.not_empty.notify_one();
                    counter!("relay_queue_evicted_total").increment(1);
                    return Ok(match evicted {
                        Some(old) => {
                            tracing::warn!(
                                target: "publish",
                                channel = %old.payload.channel,
                                kind = old.payload.kind_label(),
                                "queue full, dropped oldest task"
                            );
                            Admission::EvictedOldest(Box::new(old))
                        }
                        None => Admission::Queued,
                    });
                }
            }

            tracing::debug!(target: "publish", capacity = self.capacity, "queue full, waiting for space");
            notified.await;
        }
    }

    /// Wait for the next task. `None` once the queue is closed and drained.
    pub async fn dequeue(&self) -> Option<QueueTask> {
        loop {
            let notified = self.not_empty.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut st = self.lock();
                if let Some(task) = st.tasks.pop_front() {
                    gauge!("relay_queue_depth").set(st.tasks.len() as f64);
                    drop(st);
                    self.not_full.notify_one();
                    return Some(task);
                }
                if st.closed {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Stop accepting tasks and wake every waiter. Pending tasks stay dequeueable.
    pub fn close(&self) {
        self.lock().closed = true;
        self.not_empty.notify_waiters();
        self.not_full.notify_waiters();
    }

    /// Copy of the pending tasks, oldest first.
    pub fn snapshot(&self) -> Vec<QueueTask> {
        self.lock().tasks.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(n: u32) -> QueueTask {
        QueueTask::new(
            PublishPayload::proxy_text("c", format!("cfg-{n}")),
            DateTime::<Utc>::UNIX_EPOCH,
        )
    }

    fn texts(q: &OverflowQueue) -> Vec<String> {
        q.snapshot()
            .into_iter()
            .map(|t| t.payload.fingerprint_source())
            .collect()
    }

    #[tokio::test]
    async fn drop_oldest_evicts_exactly_one_and_keeps_order() {
        let q = OverflowQueue::new(3, OverflowPolicy::DropOldest);
        for n in 1..=3 {
            assert_eq!(q.enqueue(task(n)).await.unwrap(), Admission::Queued);
        }
        let adm = q.enqueue(task(4)).await.unwrap();
        match adm {
            Admission::EvictedOldest(old) => assert_eq!(old.payload.fingerprint_source(), "cfg-1"),
            other => panic!("expected eviction, got {other:?}"),
        }
        assert_eq!(texts(&q), vec!["cfg-2", "cfg-3", "cfg-4"]);
    }

    #[tokio::test]
    async fn close_drains_then_ends() {
        let q = OverflowQueue::new(2, OverflowPolicy::Block);
        q.enqueue(task(1)).await.unwrap();
        q.close();
        assert_eq!(q.enqueue(task(2)).await, Err(QueueError::Closed));
        assert!(q.dequeue().await.is_some());
        assert!(q.dequeue().await.is_none());
    }
}
