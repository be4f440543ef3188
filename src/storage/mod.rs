//! Storage port.
//!
//! The worker and dispatcher never touch a database directly; they go
//! through [`Storage`]. One storage instance serves one queue namespace
//! (see [`crate::model::QueueDescriptor::storage_key`]).
//!
//! Implementations must make `set` visible before the matching `push` can
//! be popped, and `pop` must be an exclusive claim: no two callers ever
//! receive the same identifier for one push.

pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{JobEnvelope, JobId};

pub use memory::MemoryStorage;

#[async_trait]
pub trait Storage: Send + Sync {
    /// Fetch an envelope. Fails with [`crate::error::Error::NotFound`] if absent.
    async fn get(&self, id: JobId) -> Result<JobEnvelope>;

    /// Upsert an envelope.
    async fn set(&self, id: JobId, envelope: &JobEnvelope) -> Result<()>;

    /// Delete an envelope. Deleting an absent id is not an error.
    async fn clear(&self, id: JobId) -> Result<()>;

    /// Claim one pending identifier, if any.
    async fn pop(&self) -> Result<Option<JobId>>;

    /// Make an identifier eligible for a future `pop`.
    async fn push(&self, id: JobId) -> Result<()>;
}
