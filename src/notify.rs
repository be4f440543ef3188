//! Lifecycle notifications.
//!
//! Observers subscribe to job transitions (dispatched, dequeued, succeeded,
//! failed) to build dashboards, alerting, or audit logs. The [`Notifier`]
//! fans each event out to every observer in registration order. A failing or
//! panicking observer is logged and skipped; it never reaches the job's own
//! control flow.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use opentelemetry::KeyValue;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::model::{JobId, JobSnapshot};
use crate::telemetry::metrics;

// ---------------------------------------------------------------------------
// Observer
// ---------------------------------------------------------------------------

/// A listener for job lifecycle transitions. Every hook defaults to a no-op.
pub trait Observer: Send + Sync {
    /// Name used when reporting observer failures.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    fn on_dispatched(&self, _job: &JobSnapshot) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_dequeued(&self, _job: &JobSnapshot) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_succeeded(&self, _job: &JobSnapshot) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_failed(&self, _job: &JobSnapshot, _error: &anyhow::Error) -> anyhow::Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Fan-out
// ---------------------------------------------------------------------------

/// Ordered set of observers.
#[derive(Clone, Default)]
pub struct Notifier {
    observers: Vec<Arc<dyn Observer>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an observer after those already registered.
    pub fn with(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    pub fn dispatched(&self, job: &JobSnapshot) {
        self.deliver("dispatched", job.id, |o| o.on_dispatched(job));
    }

    pub fn dequeued(&self, job: &JobSnapshot) {
        self.deliver("dequeued", job.id, |o| o.on_dequeued(job));
    }

    pub fn succeeded(&self, job: &JobSnapshot) {
        self.deliver("succeeded", job.id, |o| o.on_succeeded(job));
    }

    pub fn failed(&self, job: &JobSnapshot, error: &anyhow::Error) {
        self.deliver("failed", job.id, |o| o.on_failed(job, error));
    }

    fn deliver<F>(&self, event: &'static str, id: JobId, hook: F)
    where
        F: Fn(&dyn Observer) -> anyhow::Result<()>,
    {
        for observer in &self.observers {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| hook(observer.as_ref())));
            let error = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e.to_string(),
                Err(payload) => format!("observer panicked: {}", panic_message(&*payload)),
            };
            warn!(
                observer = observer.name(),
                event,
                job_id = %id,
                %error,
                "observer failed, continuing delivery"
            );
            metrics::observer_failures().add(1, &[KeyValue::new("event", event)]);
        }
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.observers.iter().map(|o| o.name()).collect();
        f.debug_struct("Notifier").field("observers", &names).finish()
    }
}

/// Text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}

// ---------------------------------------------------------------------------
// Event log
// ---------------------------------------------------------------------------

/// A sequenced record of one lifecycle transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Monotonic sequence number. Consumers can detect gaps.
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    Dispatched { job: JobSnapshot },
    Dequeued { job: JobSnapshot },
    Succeeded { job: JobSnapshot },
    Failed { job: JobSnapshot, error: String },
}

impl EventKind {
    pub fn job(&self) -> &JobSnapshot {
        match self {
            EventKind::Dispatched { job }
            | EventKind::Dequeued { job }
            | EventKind::Succeeded { job }
            | EventKind::Failed { job, .. } => job,
        }
    }
}

/// In-memory observer that records every event it sees.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Mutex<Vec<Event>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, kind: EventKind) {
        let mut events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        let seq = events.last().map_or(1, |e| e.seq + 1);
        events.push(Event {
            seq,
            timestamp: Utc::now(),
            kind,
        });
    }

    /// Events with `seq` strictly greater than `since_seq`.
    pub fn events_since(&self, since_seq: u64) -> Vec<Event> {
        let events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        events
            .iter()
            .filter(|e| e.seq > since_seq)
            .cloned()
            .collect()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events_since(0)
    }
}

impl Observer for EventLog {
    fn name(&self) -> &str {
        "event_log"
    }

    fn on_dispatched(&self, job: &JobSnapshot) -> anyhow::Result<()> {
        self.record(EventKind::Dispatched { job: job.clone() });
        Ok(())
    }

    fn on_dequeued(&self, job: &JobSnapshot) -> anyhow::Result<()> {
        self.record(EventKind::Dequeued { job: job.clone() });
        Ok(())
    }

    fn on_succeeded(&self, job: &JobSnapshot) -> anyhow::Result<()> {
        self.record(EventKind::Succeeded { job: job.clone() });
        Ok(())
    }

    fn on_failed(&self, job: &JobSnapshot, error: &anyhow::Error) -> anyhow::Result<()> {
        self.record(EventKind::Failed {
            job: job.clone(),
            error: error.to_string(),
        });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tracing
// ---------------------------------------------------------------------------

/// Logs every transition and counts it on `workq.job.events`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl TracingObserver {
    fn count(event: &'static str, job: &JobSnapshot) {
        metrics::job_events().add(
            1,
            &[
                KeyValue::new("event", event),
                KeyValue::new("job_name", job.job_name().to_string()),
            ],
        );
    }
}

impl Observer for TracingObserver {
    fn name(&self) -> &str {
        "tracing"
    }

    fn on_dispatched(&self, job: &JobSnapshot) -> anyhow::Result<()> {
        info!(
            job_id = %job.id,
            job_name = job.job_name(),
            queue = %job.queue,
            delay_until = ?job.envelope.delay_until,
            "job dispatched"
        );
        Self::count("dispatched", job);
        Ok(())
    }

    fn on_dequeued(&self, job: &JobSnapshot) -> anyhow::Result<()> {
        info!(job_id = %job.id, job_name = job.job_name(), "job dequeued");
        Self::count("dequeued", job);
        Ok(())
    }

    fn on_succeeded(&self, job: &JobSnapshot) -> anyhow::Result<()> {
        info!(job_id = %job.id, job_name = job.job_name(), "job succeeded");
        Self::count("succeeded", job);
        Ok(())
    }

    fn on_failed(&self, job: &JobSnapshot, error: &anyhow::Error) -> anyhow::Result<()> {
        warn!(
            job_id = %job.id,
            job_name = job.job_name(),
            attempts = job.envelope.attempts(),
            %error,
            "job failed"
        );
        Self::count("failed", job);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::JobEnvelope;

    fn snapshot() -> JobSnapshot {
        JobSnapshot::capture(JobId::new(), "default", &JobEnvelope::new("noop", Vec::new()))
    }

    #[test]
    fn event_log_sequence_is_monotonic() {
        let log = EventLog::new();
        let job = snapshot();
        log.on_dispatched(&job).unwrap();
        log.on_dequeued(&job).unwrap();
        log.on_succeeded(&job).unwrap();

        let events = log.events();
        assert_eq!(events.len(), 3);
        for window in events.windows(2) {
            assert!(window[1].seq > window[0].seq);
        }
        assert_eq!(log.events_since(2).len(), 1);
    }

    #[test]
    fn event_kind_serializes_with_type_tag() {
        let kind = EventKind::Failed {
            job: snapshot(),
            error: "boom".into(),
        };
        let json = serde_json::to_value(&kind).unwrap();
        assert_eq!(json["type"], "failed");
        assert_eq!(json["error"], "boom");
    }

    #[test]
    fn empty_notifier_is_a_no_op() {
        let notifier = Notifier::new();
        assert!(notifier.is_empty());
        notifier.dispatched(&snapshot());
    }
}
