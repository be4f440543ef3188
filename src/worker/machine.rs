//! Consumer side: claim one job and drive it to a resting state.

use std::panic::AssertUnwindSafe;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use opentelemetry::KeyValue;
use serde::{Deserialize, Serialize};
use tracing::{Instrument, Span, debug, info, warn};

use crate::context::QueueContext;
use crate::error::{Error, Result};
use crate::handler::{Backoff, Handler, JobContext};
use crate::model::{JobEnvelope, JobId, JobSnapshot, deadline_after};
use crate::notify::panic_message;
use crate::telemetry::job::{
    record_job_name, record_outcome, record_state_transition, start_job_span,
};
use crate::telemetry::metrics;

/// What to do with a job whose name has no registered handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnroutablePolicy {
    /// Keep the envelope and push the id back; it stays claimable until a
    /// handler for its name is registered.
    #[default]
    Requeue,
    /// Delete the envelope and report a failure to observers.
    DeadLetter,
}

/// Result of one [`Worker::run_once`] invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Nothing was pending.
    Idle,
    /// Claimed before its `delay_until`; returned to the queue unchanged.
    Deferred { id: JobId, until: DateTime<Utc> },
    /// No handler for the job name; returned to the queue unchanged.
    Unroutable { id: JobId },
    /// No handler for the job name; envelope deleted.
    DeadLettered { id: JobId },
    /// Handler succeeded; envelope deleted.
    Succeeded { id: JobId, attempts: u32 },
    /// Handler failed with no retries left; envelope deleted.
    Exhausted { id: JobId, attempts: u32 },
    /// Handler failed; a replacement envelope waits until `delay_until`.
    Retrying {
        id: JobId,
        attempts: u32,
        delay_until: DateTime<Utc>,
    },
}

impl RunOutcome {
    pub fn id(&self) -> Option<JobId> {
        match self {
            RunOutcome::Idle => None,
            RunOutcome::Deferred { id, .. }
            | RunOutcome::Unroutable { id }
            | RunOutcome::DeadLettered { id }
            | RunOutcome::Succeeded { id, .. }
            | RunOutcome::Exhausted { id, .. }
            | RunOutcome::Retrying { id, .. } => Some(*id),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RunOutcome::Idle => "idle",
            RunOutcome::Deferred { .. } => "deferred",
            RunOutcome::Unroutable { .. } => "unroutable",
            RunOutcome::DeadLettered { .. } => "dead_lettered",
            RunOutcome::Succeeded { .. } => "succeeded",
            RunOutcome::Exhausted { .. } => "exhausted",
            RunOutcome::Retrying { .. } => "retrying",
        }
    }

    /// Did this invocation move a job forward? Deferred and unroutable jobs
    /// went straight back to the queue, so polling right away would spin.
    pub fn made_progress(&self) -> bool {
        !matches!(
            self,
            RunOutcome::Idle | RunOutcome::Deferred { .. } | RunOutcome::Unroutable { .. }
        )
    }
}

/// Processes at most one job per [`Worker::run_once`] call.
///
/// Holds no locks and no cross-instance state; any number of workers may
/// share one storage backend as long as its `pop` is an exclusive claim.
#[derive(Debug, Clone)]
pub struct Worker {
    ctx: QueueContext,
    unroutable: UnroutablePolicy,
}

impl Worker {
    pub fn new(ctx: QueueContext) -> Self {
        Self {
            ctx,
            unroutable: UnroutablePolicy::default(),
        }
    }

    pub fn unroutable(mut self, policy: UnroutablePolicy) -> Self {
        self.unroutable = policy;
        self
    }

    pub fn context(&self) -> &QueueContext {
        &self.ctx
    }

    /// Claim the next pending job and drive it to completion, deferral, or a
    /// scheduled retry.
    ///
    /// Storage failures abort the invocation and are returned. Handler and
    /// observer failures never are: they only feed the retry decision, logs,
    /// and notifications.
    pub async fn run_once(&self) -> Result<RunOutcome> {
        let Some(id) = self.ctx.storage.pop().await? else {
            return Ok(RunOutcome::Idle);
        };

        let span = start_job_span(&self.ctx.queue.name, &id);
        let outcome = self.process(id, &span).instrument(span.clone()).await?;

        record_outcome(&span, outcome.label());
        metrics::job_outcomes().add(1, &[KeyValue::new("outcome", outcome.label())]);
        Ok(outcome)
    }

    async fn process(&self, id: JobId, span: &Span) -> Result<RunOutcome> {
        let mut envelope = self.ctx.storage.get(id).await?;
        record_job_name(span, &envelope.job_name);
        record_state_transition(span, "idle", "claimed");

        let now = Utc::now();
        if envelope.is_delayed(now) {
            self.ctx.storage.push(id).await?;
            let until = envelope.delay_until.unwrap_or(now);
            record_state_transition(span, "claimed", "requeued");
            debug!(job_id = %id, %until, "job not yet due, returned to queue");
            return Ok(RunOutcome::Deferred { id, until });
        }

        let Some(handler) = self.ctx.registry.get(&envelope.job_name) else {
            return self.handle_unroutable(id, &envelope, span).await;
        };

        self.ctx.notifier.dequeued(&self.snapshot(id, &envelope));
        record_state_transition(span, "claimed", "running");

        // Immediate retries stay in this loop; each pass consumes one retry,
        // so it runs at most `max_retry_count + 1` times.
        loop {
            let job_ctx = self.job_context(id, &envelope);
            let error = match self.execute(handler.as_ref(), &job_ctx, &envelope).await {
                Ok(()) => {
                    record_state_transition(span, "running", "succeeded");
                    info!(job_id = %id, attempts = envelope.attempts(), "job succeeded");
                    self.ctx.notifier.succeeded(&self.snapshot(id, &envelope));
                    self.ctx.storage.clear(id).await?;
                    return Ok(RunOutcome::Succeeded {
                        id,
                        attempts: envelope.attempts(),
                    });
                }
                Err(error) => error,
            };

            if envelope.max_retry_count == 0 {
                record_state_transition(span, "running", "exhausted");
                let hook = handler.on_error(&job_ctx, &envelope.payload, &error);
                if let Err(hook_error) = contain_panic(hook).await {
                    warn!(job_id = %id, error = %hook_error, "on_error hook failed");
                }
                warn!(
                    job_id = %id,
                    attempts = envelope.attempts(),
                    error = %format!("{error:#}"),
                    "job failed, no retries left"
                );
                self.ctx.notifier.failed(&self.snapshot(id, &envelope), &error);
                self.ctx.storage.clear(id).await?;
                return Ok(RunOutcome::Exhausted {
                    id,
                    attempts: envelope.attempts(),
                });
            }

            let attempt = envelope.attempts() + 1;
            match handler.next_retry_in(attempt) {
                Backoff::Immediate => {
                    record_state_transition(span, "running", "immediate_retry");
                    debug!(
                        job_id = %id,
                        attempt,
                        remaining = envelope.max_retry_count - 1,
                        error = %format!("{error:#}"),
                        "job failed, retrying in process"
                    );
                    envelope.consume_retry();
                }
                Backoff::After(delay) => {
                    let delay_until = deadline_after(Utc::now(), delay);
                    let replacement = envelope.retry_at(delay_until);

                    // Upsert over the same id: the old envelope is replaced in
                    // one write, never absent.
                    self.ctx.storage.set(id, &replacement).await?;
                    self.ctx.storage.push(id).await?;

                    record_state_transition(span, "running", "delayed_retry");
                    info!(
                        job_id = %id,
                        attempt,
                        remaining = replacement.max_retry_count,
                        %delay_until,
                        error = %format!("{error:#}"),
                        "job failed, retry scheduled"
                    );
                    return Ok(RunOutcome::Retrying {
                        id,
                        attempts: attempt,
                        delay_until,
                    });
                }
            }
        }
    }

    async fn execute(
        &self,
        handler: &dyn Handler,
        job_ctx: &JobContext,
        envelope: &JobEnvelope,
    ) -> anyhow::Result<()> {
        let started = Instant::now();
        let result = contain_panic(handler.execute(job_ctx, &envelope.payload)).await;
        metrics::job_duration_ms().record(
            started.elapsed().as_secs_f64() * 1000.0,
            &[KeyValue::new("job_name", envelope.job_name.clone())],
        );
        result
    }

    async fn handle_unroutable(
        &self,
        id: JobId,
        envelope: &JobEnvelope,
        span: &Span,
    ) -> Result<RunOutcome> {
        match self.unroutable {
            UnroutablePolicy::Requeue => {
                self.ctx.storage.push(id).await?;
                record_state_transition(span, "claimed", "requeued");
                warn!(
                    job_id = %id,
                    job_name = %envelope.job_name,
                    "no handler registered, job returned to queue"
                );
                Ok(RunOutcome::Unroutable { id })
            }
            UnroutablePolicy::DeadLetter => {
                let error =
                    anyhow::Error::new(Error::UnregisteredHandler(envelope.job_name.clone()));
                warn!(
                    job_id = %id,
                    job_name = %envelope.job_name,
                    "no handler registered, dead-lettering job"
                );
                self.ctx.notifier.failed(&self.snapshot(id, envelope), &error);
                self.ctx.storage.clear(id).await?;
                record_state_transition(span, "claimed", "dead_lettered");
                Ok(RunOutcome::DeadLettered { id })
            }
        }
    }

    fn job_context(&self, id: JobId, envelope: &JobEnvelope) -> JobContext {
        JobContext {
            id,
            queue: self.ctx.queue.clone(),
            job_name: envelope.job_name.clone(),
            attempt: envelope.attempts(),
            remaining_tries: envelope.max_retry_count,
        }
    }

    fn snapshot(&self, id: JobId, envelope: &JobEnvelope) -> JobSnapshot {
        JobSnapshot::capture(id, self.ctx.queue.name.clone(), envelope)
    }
}

/// Run handler code, turning a panic into an ordinary failure so the job
/// takes the retry or exhaust path instead of unwinding out of the worker.
async fn contain_panic<F>(fut: F) -> anyhow::Result<()>
where
    F: Future<Output = anyhow::Result<()>>,
{
    AssertUnwindSafe(fut)
        .catch_unwind()
        .await
        .unwrap_or_else(|payload| {
            Err(anyhow::anyhow!(
                "handler panicked: {}",
                panic_message(&*payload)
            ))
        })
}
