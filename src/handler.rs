//! Handler interface, typed jobs, and retry backoff.
//!
//! The worker only ever sees [`Handler`], which operates on raw payload
//! bytes. Applications usually implement [`Job`] instead and register it
//! through [`crate::registry::HandlerRegistry::register`]; [`TypedHandler`]
//! bridges the two with a serde_json codec.

use std::marker::PhantomData;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::model::{JobId, QueueDescriptor};

// ---------------------------------------------------------------------------
// Backoff
// ---------------------------------------------------------------------------

/// When to retry a failed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Retry in-process right away, without a storage round-trip.
    Immediate,
    /// Persist a replacement envelope that becomes eligible after the delay.
    After(Duration),
}

impl Backoff {
    /// Seconds value used by the wire-level convention where `-1` means
    /// "no delay".
    pub const IMMEDIATE_SENTINEL: i64 = -1;

    /// Convert a seconds value. `-1` is [`Backoff::Immediate`]; any other
    /// negative value is treated as a zero-second delay.
    pub fn from_seconds(secs: i64) -> Self {
        if secs == Self::IMMEDIATE_SENTINEL {
            Backoff::Immediate
        } else {
            Backoff::After(Duration::from_secs(secs.max(0) as u64))
        }
    }

    pub fn seconds(secs: u64) -> Self {
        Backoff::After(Duration::from_secs(secs))
    }

    /// `base * 2^(attempt - 1)`, capped at `cap`.
    pub fn exponential(base: Duration, attempt: u32, cap: Duration) -> Self {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        Backoff::After(base.saturating_mul(factor).min(cap))
    }
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// Per-execution context handed to every handler call.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub id: JobId,
    pub queue: QueueDescriptor,
    pub job_name: String,
    /// Retries already consumed before this execution.
    pub attempt: u32,
    /// Retries left if this execution fails.
    pub remaining_tries: u32,
}

// ---------------------------------------------------------------------------
// Handler
// ---------------------------------------------------------------------------

/// Executable logic for one job-type name.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn execute(&self, ctx: &JobContext, payload: &[u8]) -> anyhow::Result<()>;

    /// Cleanup hook once retries are exhausted. Errors are logged and dropped.
    async fn on_error(
        &self,
        _ctx: &JobContext,
        _payload: &[u8],
        _error: &anyhow::Error,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    /// Backoff before retry number `attempt` (1-based).
    fn next_retry_in(&self, attempt: u32) -> Backoff;
}

// ---------------------------------------------------------------------------
// Typed jobs
// ---------------------------------------------------------------------------

/// A strongly typed job. The value itself is the payload.
#[async_trait]
pub trait Job: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Registry key. Unique per process.
    const NAME: &'static str;

    async fn perform(&self, ctx: &JobContext) -> anyhow::Result<()>;

    async fn on_error(&self, _ctx: &JobContext, _error: &anyhow::Error) -> anyhow::Result<()> {
        Ok(())
    }

    fn next_retry_in(_attempt: u32) -> Backoff {
        Backoff::Immediate
    }
}

/// Adapts a [`Job`] into a byte-level [`Handler`].
pub struct TypedHandler<J> {
    _job: PhantomData<fn() -> J>,
}

impl<J: Job> TypedHandler<J> {
    pub fn new() -> Self {
        Self { _job: PhantomData }
    }

    pub fn encode(job: &J) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(job)
    }

    pub fn decode(payload: &[u8]) -> serde_json::Result<J> {
        serde_json::from_slice(payload)
    }
}

impl<J: Job> Default for TypedHandler<J> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<J: Job> Handler for TypedHandler<J> {
    async fn execute(&self, ctx: &JobContext, payload: &[u8]) -> anyhow::Result<()> {
        let job = Self::decode(payload)
            .map_err(|e| anyhow::anyhow!("cannot decode {} payload: {e}", J::NAME))?;
        job.perform(ctx).await
    }

    async fn on_error(
        &self,
        ctx: &JobContext,
        payload: &[u8],
        error: &anyhow::Error,
    ) -> anyhow::Result<()> {
        let job = Self::decode(payload)?;
        job.on_error(ctx, error).await
    }

    fn next_retry_in(&self, attempt: u32) -> Backoff {
        J::next_retry_in(attempt)
    }
}
