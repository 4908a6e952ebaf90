//! Durable job store gateway.
//!
//! Thin typed layer over the relational store that holds Job rows. Every
//! state transition is a conditional `UPDATE` guarded on the current status,
//! so racing dispatch/completion invocations cannot clobber each other: the
//! loser of a race sees `false` and treats the job as already settled.

pub mod config;
pub mod error;
pub mod jobs;
pub mod pool;

pub use config::DbConnectionConfig;
pub use error::StoreError;
pub use pool::{create_pool, DbBackend, DbPool};
