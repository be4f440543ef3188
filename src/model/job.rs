//! Job identifier, envelope, and event snapshot.

use chrono::{DateTime, SubsecRound, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Identifier
// ---------------------------------------------------------------------------

/// Newtype for job identifiers. Minted at dispatch time, immutable after.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// The persisted record describing one job instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobEnvelope {
    /// Handler-specific serialized input. The engine never interprets it.
    pub payload: Vec<u8>,

    /// Key into the handler registry.
    pub job_name: String,

    /// Retries remaining. Only ever decreases, by one per retry consumed.
    pub max_retry_count: u32,

    /// Retries already consumed. `None` until the first retry.
    pub attempts: Option<u32>,

    /// Earliest time the job may execute.
    pub delay_until: Option<DateTime<Utc>>,

    /// Time of the original dispatch. Carried unchanged across retries.
    pub queued_at: DateTime<Utc>,
}

impl JobEnvelope {
    pub fn new(job_name: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            payload,
            job_name: job_name.into(),
            max_retry_count: 0,
            attempts: None,
            delay_until: None,
            queued_at: storage_precision(Utc::now()),
        }
    }

    /// Retries consumed so far, treating `None` as zero.
    pub fn attempts(&self) -> u32 {
        self.attempts.unwrap_or(0)
    }

    /// Is the job still waiting for its `delay_until`?
    pub fn is_delayed(&self, now: DateTime<Utc>) -> bool {
        self.delay_until.is_some_and(|until| until > now)
    }

    /// Consume one retry in place (immediate, in-process retry).
    pub fn consume_retry(&mut self) {
        self.max_retry_count = self.max_retry_count.saturating_sub(1);
        self.attempts = Some(self.attempts() + 1);
    }

    /// Build the replacement envelope for a backed-off retry.
    ///
    /// Payload, name and `queued_at` carry over; one retry is consumed and the
    /// job becomes eligible again at `delay_until`.
    pub fn retry_at(&self, delay_until: DateTime<Utc>) -> Self {
        let mut next = self.clone();
        next.consume_retry();
        next.delay_until = Some(delay_until);
        next
    }
}

/// `now + delay`, saturating at the largest representable instant, at
/// [`storage_precision`].
pub fn deadline_after(now: DateTime<Utc>, delay: std::time::Duration) -> DateTime<Utc> {
    let deadline = TimeDelta::from_std(delay)
        .ok()
        .and_then(|delay| now.checked_add_signed(delay))
        .unwrap_or(DateTime::<Utc>::MAX_UTC);
    storage_precision(deadline)
}

/// Truncate to whole microseconds, the resolution of Postgres `TIMESTAMPTZ`,
/// so envelope timestamps read back exactly as written.
pub fn storage_precision(at: DateTime<Utc>) -> DateTime<Utc> {
    at.trunc_subsecs(6)
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Immutable copy of an envelope taken when a notification fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub id: JobId,
    pub queue: String,
    pub envelope: JobEnvelope,
    pub taken_at: DateTime<Utc>,
}

impl JobSnapshot {
    pub fn capture(id: JobId, queue: impl Into<String>, envelope: &JobEnvelope) -> Self {
        Self {
            id,
            queue: queue.into(),
            envelope: envelope.clone(),
            taken_at: Utc::now(),
        }
    }

    pub fn job_name(&self) -> &str {
        &self.envelope.job_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn consume_retry_moves_budget_into_attempts() {
        let mut env = JobEnvelope::new("email", b"{}".to_vec());
        env.max_retry_count = 2;

        env.consume_retry();
        assert_eq!(env.max_retry_count, 1);
        assert_eq!(env.attempts, Some(1));

        env.consume_retry();
        assert_eq!(env.max_retry_count, 0);
        assert_eq!(env.attempts, Some(2));
    }

    #[test]
    fn consume_retry_never_underflows() {
        let mut env = JobEnvelope::new("email", Vec::new());
        env.consume_retry();
        assert_eq!(env.max_retry_count, 0);
    }

    #[test]
    fn retry_at_keeps_identity_fields() {
        let mut env = JobEnvelope::new("email", b"payload".to_vec());
        env.max_retry_count = 2;
        let at = deadline_after(Utc::now(), Duration::from_secs(5));

        let next = env.retry_at(at);
        assert_eq!(next.payload, env.payload);
        assert_eq!(next.job_name, env.job_name);
        assert_eq!(next.queued_at, env.queued_at);
        assert_eq!(next.max_retry_count, 1);
        assert_eq!(next.attempts, Some(1));
        assert_eq!(next.delay_until, Some(at));
    }

    #[test]
    fn deadline_after_adds_and_saturates() {
        let now = storage_precision(Utc::now());
        assert_eq!(
            deadline_after(now, Duration::from_secs(5)),
            now + TimeDelta::seconds(5)
        );
        assert_eq!(
            deadline_after(now, Duration::MAX),
            storage_precision(DateTime::<Utc>::MAX_UTC)
        );
    }

    #[test]
    fn timestamps_are_whole_microseconds() {
        let at = DateTime::<Utc>::from_timestamp(1_700_000_000, 123_456_789).unwrap();
        assert_eq!(storage_precision(at).timestamp_subsec_nanos(), 123_456_000);
        assert_eq!(
            deadline_after(at, Duration::from_nanos(1))
                .timestamp_subsec_nanos()
                % 1_000,
            0
        );
        let env = JobEnvelope::new("email", Vec::new());
        assert_eq!(env.queued_at.timestamp_subsec_nanos() % 1_000, 0);
    }

    #[test]
    fn delay_check() {
        let now = Utc::now();
        let mut env = JobEnvelope::new("email", Vec::new());
        assert!(!env.is_delayed(now));

        env.delay_until = Some(now + TimeDelta::seconds(30));
        assert!(env.is_delayed(now));

        env.delay_until = Some(now - TimeDelta::seconds(1));
        assert!(!env.is_delayed(now));
    }

    #[test]
    fn snapshot_is_detached_from_live_envelope() {
        let mut env = JobEnvelope::new("email", Vec::new());
        env.max_retry_count = 3;
        let snap = JobSnapshot::capture(JobId::new(), "default", &env);

        env.consume_retry();
        assert_eq!(snap.envelope.max_retry_count, 3);
        assert_eq!(snap.envelope.attempts, None);
    }

    #[test]
    fn job_id_parses_its_display_form() {
        let id = JobId::new();
        let parsed: JobId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }
}
