//! Work queue abstraction for the job workflow.
//!
//! The workflow only relies on the queue *contract*, not on any particular
//! backend: at-least-once delivery, visibility-timeout-based redelivery, and
//! a per-message receive count. A delivery that is never acknowledged comes
//! back after its visibility timeout; that redelivery is the system's sole
//! retry mechanism for transient failures, so consumers must be idempotent.
//!
//! # Architecture
//!
//! - [`WorkQueue`] - the contract producers and consumers program against
//! - [`WorkItem`] / [`WorkKind`] - the payload routed to workers
//! - [`Delivery`] - one received message plus its receipt handle
//! - [`MemoryWorkQueue`] - in-process implementation used by the default
//!   deployment and by tests

mod error;
mod memory;
mod types;

pub use error::QueueError;
pub use memory::MemoryWorkQueue;
pub use types::{Delivery, WorkItem, WorkKind};

pub use async_trait::async_trait;

/// Contract the job workflow requires from a queue.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Append a work item. Enqueued items become visible immediately.
    async fn enqueue(&self, item: WorkItem) -> Result<(), QueueError>;

    /// Receive the next visible item, if any. The item stays invisible until
    /// it is acked, nacked, or its visibility timeout lapses.
    async fn receive(&self) -> Result<Option<Delivery>, QueueError>;

    /// Acknowledge a delivery, removing the item permanently. Acking a
    /// receipt that already expired is a harmless no-op (at-least-once).
    async fn ack(&self, receipt: uuid::Uuid) -> Result<(), QueueError>;

    /// Return a delivery to the queue. The item becomes visible again once
    /// its visibility deadline passes — the deadline doubles as the backoff
    /// for "not finished yet" deferrals.
    async fn nack(&self, receipt: uuid::Uuid) -> Result<(), QueueError>;
}
