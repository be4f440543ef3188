//! Producer side: build an envelope, persist it, enqueue it, announce it.

use std::time::Duration;

use chrono::{DateTime, Utc};
use opentelemetry::KeyValue;
use tracing::{debug, warn};

use crate::context::QueueContext;
use crate::error::{Error, Result};
use crate::handler::{Job, TypedHandler};
use crate::model::{JobEnvelope, JobId, JobSnapshot, deadline_after, storage_precision};
use crate::telemetry::metrics;

/// Per-dispatch options. Defaults: no retries, no delay, fresh id.
#[derive(Debug, Clone, Default)]
pub struct DispatchOptions {
    pub(crate) max_retry_count: u32,
    pub(crate) delay_until: Option<DateTime<Utc>>,
    pub(crate) id: Option<JobId>,
}

impl DispatchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retry_count = n;
        self
    }

    /// Earliest time the job may run.
    pub fn delay_until(mut self, at: DateTime<Utc>) -> Self {
        self.delay_until = Some(at);
        self
    }

    /// Run no earlier than `delay` from now.
    pub fn delay(self, delay: Duration) -> Self {
        self.delay_until(deadline_after(Utc::now(), delay))
    }

    /// Use a caller-chosen identifier instead of a fresh one. Dispatch fails
    /// if a job with this id is already stored.
    pub fn id(mut self, id: JobId) -> Self {
        self.id = Some(id);
        self
    }
}

/// Enqueues jobs onto one queue.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    ctx: QueueContext,
}

impl Dispatcher {
    pub fn new(ctx: QueueContext) -> Self {
        Self { ctx }
    }

    /// Serialize a typed job with its codec and enqueue it.
    pub async fn dispatch<J: Job>(&self, job: &J, options: DispatchOptions) -> Result<JobId> {
        let payload = TypedHandler::<J>::encode(job).inspect_err(|_| {
            Self::count(J::NAME, "error");
        })?;
        self.dispatch_raw(J::NAME, payload, options).await
    }

    /// Enqueue an already-encoded payload for `job_name`.
    ///
    /// A caller-chosen id that already has a stored envelope is refused with
    /// [`Error::AlreadyExists`]; dispatch never overwrites another job.
    /// The envelope is persisted before its id is pushed. If the push fails
    /// the envelope is cleared again so no orphan remains, and the storage
    /// error is returned. The `dispatched` notification only fires once both
    /// writes have succeeded.
    pub async fn dispatch_raw(
        &self,
        job_name: &str,
        payload: Vec<u8>,
        options: DispatchOptions,
    ) -> Result<JobId> {
        let id = match options.id {
            Some(id) => {
                self.ensure_vacant(id).await.inspect_err(|_| {
                    Self::count(job_name, "error");
                })?;
                id
            }
            None => JobId::new(),
        };
        let envelope = JobEnvelope {
            payload,
            job_name: job_name.to_string(),
            max_retry_count: options.max_retry_count,
            attempts: None,
            delay_until: options.delay_until.map(storage_precision),
            queued_at: storage_precision(Utc::now()),
        };

        if let Err(e) = self.ctx.storage.set(id, &envelope).await {
            Self::count(job_name, "error");
            return Err(e);
        }

        if let Err(e) = self.ctx.storage.push(id).await {
            if let Err(cleanup) = self.ctx.storage.clear(id).await {
                warn!(job_id = %id, error = %cleanup, "failed to clear envelope after push failure");
            }
            Self::count(job_name, "error");
            return Err(e);
        }

        debug!(
            job_id = %id,
            job_name,
            queue = %self.ctx.queue,
            max_retry_count = envelope.max_retry_count,
            "envelope persisted and enqueued"
        );
        Self::count(job_name, "ok");

        let snapshot = JobSnapshot::capture(id, self.ctx.queue.name.clone(), &envelope);
        self.ctx.notifier.dispatched(&snapshot);

        Ok(id)
    }

    async fn ensure_vacant(&self, id: JobId) -> Result<()> {
        match self.ctx.storage.get(id).await {
            Ok(_) => Err(Error::AlreadyExists(id)),
            Err(Error::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn count(job_name: &str, result: &'static str) {
        metrics::jobs_dispatched().add(
            1,
            &[
                KeyValue::new("job_name", job_name.to_string()),
                KeyValue::new("result", result),
            ],
        );
    }
}
