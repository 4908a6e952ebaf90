//! In-process work queue implementation.
//!
//! Faithful to the contract rather than to any particular broker: received
//! items become invisible for a configurable window, unacked items are
//! redelivered when the window lapses, and items that keep failing are moved
//! to a dead-letter list once their receive count passes the cap.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::QueueError;
use crate::types::{Delivery, WorkItem};
use crate::WorkQueue;

const DEFAULT_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_MAX_RECEIVE_COUNT: u32 = 5;

#[derive(Debug)]
struct PendingItem {
    item: WorkItem,
    receive_count: u32,
    /// Earliest instant at which the item may be delivered (again).
    not_before: Instant,
}

#[derive(Debug)]
struct InFlightItem {
    item: WorkItem,
    receive_count: u32,
    /// When the delivery becomes eligible for redelivery if never settled.
    deadline: Instant,
}

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<PendingItem>,
    in_flight: HashMap<Uuid, InFlightItem>,
    dead_letter: Vec<WorkItem>,
}

/// In-memory [`WorkQueue`] with visibility-timeout redelivery.
#[derive(Clone)]
pub struct MemoryWorkQueue {
    state: Arc<Mutex<QueueState>>,
    visibility_timeout: Duration,
    max_receive_count: u32,
}

impl Default for MemoryWorkQueue {
    fn default() -> Self {
        Self::new(DEFAULT_VISIBILITY_TIMEOUT, DEFAULT_MAX_RECEIVE_COUNT)
    }
}

impl MemoryWorkQueue {
    pub fn new(visibility_timeout: Duration, max_receive_count: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(QueueState::default())),
            visibility_timeout,
            max_receive_count: max_receive_count.max(1),
        }
    }

    /// Number of items waiting to become visible or be received.
    pub async fn len(&self) -> usize {
        let state = self.state.lock().await;
        state.pending.len() + state.in_flight.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Items dropped after exceeding the receive-count cap.
    pub async fn dead_letter(&self) -> Vec<WorkItem> {
        let state = self.state.lock().await;
        state.dead_letter.clone()
    }

    /// Move in-flight items whose visibility deadline passed back to pending.
    fn reap_expired(state: &mut QueueState, now: Instant) {
        let expired: Vec<Uuid> = state
            .in_flight
            .iter()
            .filter(|(_, inflight)| inflight.deadline <= now)
            .map(|(receipt, _)| *receipt)
            .collect();
        for receipt in expired {
            if let Some(inflight) = state.in_flight.remove(&receipt) {
                tracing::debug!(
                    job_id = %inflight.item.job_id,
                    kind = %inflight.item.kind,
                    receive_count = inflight.receive_count,
                    "visibility timeout lapsed, item eligible for redelivery"
                );
                state.pending.push_back(PendingItem {
                    item: inflight.item,
                    receive_count: inflight.receive_count,
                    not_before: now,
                });
            }
        }
    }
}

#[async_trait::async_trait]
impl WorkQueue for MemoryWorkQueue {
    async fn enqueue(&self, item: WorkItem) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        state.pending.push_back(PendingItem {
            item,
            receive_count: 0,
            not_before: Instant::now(),
        });
        Ok(())
    }

    async fn receive(&self) -> Result<Option<Delivery>, QueueError> {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        Self::reap_expired(&mut state, now);

        // Scan pending for the first item that is visible now, dead-lettering
        // anything that has been delivered too often.
        let mut passed_over = VecDeque::new();
        let delivery = loop {
            let Some(pending) = state.pending.pop_front() else {
                break None;
            };
            if pending.not_before > now {
                passed_over.push_back(pending);
                continue;
            }
            if pending.receive_count >= self.max_receive_count {
                tracing::warn!(
                    job_id = %pending.item.job_id,
                    kind = %pending.item.kind,
                    receive_count = pending.receive_count,
                    "work item exceeded receive cap, moving to dead letter"
                );
                state.dead_letter.push(pending.item);
                continue;
            }

            let receipt = Uuid::new_v4();
            let receive_count = pending.receive_count + 1;
            state.in_flight.insert(
                receipt,
                InFlightItem {
                    item: pending.item.clone(),
                    receive_count,
                    deadline: now + self.visibility_timeout,
                },
            );
            break Some(Delivery {
                item: pending.item,
                receipt,
                receive_count,
            });
        };

        // Preserve order for items that were merely not yet visible.
        while let Some(pending) = passed_over.pop_back() {
            state.pending.push_front(pending);
        }

        Ok(delivery)
    }

    async fn ack(&self, receipt: Uuid) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        if state.in_flight.remove(&receipt).is_none() {
            // The delivery expired and was redelivered; at-least-once makes
            // this a benign race.
            tracing::debug!(%receipt, "ack for unknown or expired receipt");
        }
        Ok(())
    }

    async fn nack(&self, receipt: Uuid) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        if let Some(inflight) = state.in_flight.remove(&receipt) {
            state.pending.push_back(PendingItem {
                item: inflight.item,
                receive_count: inflight.receive_count,
                not_before: inflight.deadline,
            });
        } else {
            tracing::debug!(%receipt, "nack for unknown or expired receipt");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::WorkKind;

    fn item() -> WorkItem {
        WorkItem::dispatch(Uuid::new_v4(), "t1")
    }

    #[tokio::test]
    async fn ack_removes_item_permanently() {
        let queue = MemoryWorkQueue::new(Duration::from_millis(10), 5);
        queue.enqueue(item()).await.expect("enqueue");

        let delivery = queue.receive().await.expect("receive").expect("delivery");
        assert_eq!(delivery.receive_count, 1);
        queue.ack(delivery.receipt).await.expect("ack");

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(queue.receive().await.expect("receive").is_none());
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn unacked_delivery_comes_back_after_visibility_timeout() {
        let queue = MemoryWorkQueue::new(Duration::from_millis(10), 5);
        let original = item();
        queue.enqueue(original.clone()).await.expect("enqueue");

        let first = queue.receive().await.expect("receive").expect("delivery");
        // Invisible while in flight.
        assert!(queue.receive().await.expect("receive").is_none());

        tokio::time::sleep(Duration::from_millis(20)).await;
        let second = queue.receive().await.expect("receive").expect("redelivery");
        assert_eq!(second.item, original);
        assert_eq!(second.receive_count, 2);
        assert_ne!(second.receipt, first.receipt);
    }

    #[tokio::test]
    async fn nacked_delivery_waits_for_its_deadline() {
        let queue = MemoryWorkQueue::new(Duration::from_millis(30), 5);
        queue.enqueue(item()).await.expect("enqueue");

        let delivery = queue.receive().await.expect("receive").expect("delivery");
        queue.nack(delivery.receipt).await.expect("nack");

        // Still within the visibility window: not yet redelivered.
        assert!(queue.receive().await.expect("receive").is_none());

        tokio::time::sleep(Duration::from_millis(40)).await;
        let redelivered = queue.receive().await.expect("receive").expect("redelivery");
        assert_eq!(redelivered.receive_count, 2);
    }

    #[tokio::test]
    async fn exhausted_items_go_to_dead_letter() {
        let queue = MemoryWorkQueue::new(Duration::from_millis(5), 2);
        let doomed = item();
        queue.enqueue(doomed.clone()).await.expect("enqueue");

        for _ in 0..2 {
            let delivery = queue.receive().await.expect("receive").expect("delivery");
            assert_eq!(delivery.item, doomed);
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        // Third receive finds the item over the cap and drops it.
        assert!(queue.receive().await.expect("receive").is_none());
        assert_eq!(queue.dead_letter().await, vec![doomed]);
    }

    #[tokio::test]
    async fn ack_after_expiry_is_a_noop() {
        let queue = MemoryWorkQueue::new(Duration::from_millis(5), 5);
        queue.enqueue(item()).await.expect("enqueue");

        let delivery = queue.receive().await.expect("receive").expect("delivery");
        tokio::time::sleep(Duration::from_millis(10)).await;

        // Redelivered to another consumer before the late ack lands.
        let redelivered = queue.receive().await.expect("receive").expect("redelivery");
        queue.ack(delivery.receipt).await.expect("late ack");

        // The redelivered copy is still in flight and settles normally.
        queue.ack(redelivered.receipt).await.expect("ack");
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn preserves_fifo_order_for_visible_items() {
        let queue = MemoryWorkQueue::new(Duration::from_secs(5), 5);
        let first = WorkItem::dispatch(Uuid::new_v4(), "t1");
        let second = WorkItem::poll(Uuid::new_v4(), "t1");
        queue.enqueue(first.clone()).await.expect("enqueue");
        queue.enqueue(second.clone()).await.expect("enqueue");

        let a = queue.receive().await.expect("receive").expect("delivery");
        let b = queue.receive().await.expect("receive").expect("delivery");
        assert_eq!(a.item, first);
        assert_eq!(b.item, second);
        assert_eq!(b.item.kind, WorkKind::Poll);
    }
}
