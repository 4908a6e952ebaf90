//! Dispatch and completion workers for the job workflow.
//!
//! Workers are stateless handlers over constructor-injected collaborators:
//! each queue delivery is one invocation, concurrency comes from running the
//! loop on several tasks, and the job store is the only shared mutable state.
//! Two retry mechanisms exist and are kept structurally distinct:
//!
//! - **queue redelivery** (unbounded until the dead-letter cap) handles
//!   transient faults — workers re-raise those and never retry in-process;
//! - **regeneration** (bounded by [`RetryPolicy::max_retries`]) handles
//!   generated content that fails validation — tracked by the job's own
//!   `retry_count`, never by the queue.

mod completion;
mod context;
mod dispatch;
mod error;
mod runner;

pub use completion::{CompletionWorker, FinalizeOutcome};
pub use context::{RetryPolicy, WorkerContext};
pub use dispatch::DispatchWorker;
pub use error::WorkerError;
pub use runner::run_worker_loop;

/// What the run loop should do with the delivery a handler just processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The item is settled; acknowledge it.
    Done,
    /// Not ready yet (external job still running, dispatch not landed):
    /// return the item to the queue and let the visibility timeout provide
    /// the backoff.
    Defer,
}
