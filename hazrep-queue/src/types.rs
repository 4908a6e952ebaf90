//! Payload and delivery types for the work queue.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What a consumer should do with a work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkKind {
    /// Submit the job's input to the external generation API.
    Dispatch,
    /// Check the external API for completion of an already-submitted job.
    Poll,
}

impl std::fmt::Display for WorkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Dispatch => "dispatch",
            Self::Poll => "poll",
        })
    }
}

/// One unit of queued work. Deliberately small: workers re-read the job row
/// rather than trusting a possibly-stale snapshot in the message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub job_id: Uuid,
    pub tenant_id: String,
    pub kind: WorkKind,
}

impl WorkItem {
    #[inline]
    pub fn dispatch(job_id: Uuid, tenant_id: impl Into<String>) -> Self {
        Self {
            job_id,
            tenant_id: tenant_id.into(),
            kind: WorkKind::Dispatch,
        }
    }

    #[inline]
    pub fn poll(job_id: Uuid, tenant_id: impl Into<String>) -> Self {
        Self {
            job_id,
            tenant_id: tenant_id.into(),
            kind: WorkKind::Poll,
        }
    }
}

/// A received work item plus the handle used to settle it.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub item: WorkItem,
    /// Receipt handle for ack/nack. Unique per delivery, not per item.
    pub receipt: Uuid,
    /// How many times this item has been delivered, this delivery included.
    pub receive_count: u32,
}
