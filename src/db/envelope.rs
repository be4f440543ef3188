//! `job_envelopes` table access.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::model::{JobEnvelope, JobId};

#[derive(Debug, sqlx::FromRow)]
struct EnvelopeRow {
    job_name: String,
    payload: Vec<u8>,
    max_retry_count: i32,
    attempts: Option<i32>,
    delay_until: Option<DateTime<Utc>>,
    queued_at: DateTime<Utc>,
}

impl TryFrom<EnvelopeRow> for JobEnvelope {
    type Error = Error;

    fn try_from(row: EnvelopeRow) -> Result<Self> {
        let max_retry_count = u32::try_from(row.max_retry_count).map_err(|_| {
            Error::Storage(format!("negative max_retry_count {}", row.max_retry_count))
        })?;
        let attempts = row
            .attempts
            .map(|n| u32::try_from(n).map_err(|_| Error::Storage(format!("negative attempts {n}"))))
            .transpose()?;
        Ok(JobEnvelope {
            payload: row.payload,
            job_name: row.job_name,
            max_retry_count,
            attempts,
            delay_until: row.delay_until,
            queued_at: row.queued_at,
        })
    }
}

fn to_i32(field: &str, n: u32) -> Result<i32> {
    i32::try_from(n).map_err(|_| Error::Storage(format!("{field} {n} does not fit in INTEGER")))
}

impl super::Db {
    pub async fn get_envelope(&self, queue_key: &str, id: JobId) -> Result<Option<JobEnvelope>> {
        let row = sqlx::query_as::<_, EnvelopeRow>(
            "SELECT job_name, payload, max_retry_count, attempts, delay_until, queued_at \
             FROM job_envelopes WHERE queue_key = $1 AND id = $2",
        )
        .bind(queue_key)
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;
        row.map(JobEnvelope::try_from).transpose()
    }

    /// Insert or replace the envelope for `(queue_key, id)` in one statement.
    pub async fn upsert_envelope(
        &self,
        queue_key: &str,
        id: JobId,
        envelope: &JobEnvelope,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO job_envelopes \
                 (queue_key, id, job_name, payload, max_retry_count, attempts, delay_until, queued_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (queue_key, id) DO UPDATE SET \
                 job_name = EXCLUDED.job_name, \
                 payload = EXCLUDED.payload, \
                 max_retry_count = EXCLUDED.max_retry_count, \
                 attempts = EXCLUDED.attempts, \
                 delay_until = EXCLUDED.delay_until, \
                 queued_at = EXCLUDED.queued_at, \
                 updated_at = now()",
        )
        .bind(queue_key)
        .bind(id.0)
        .bind(&envelope.job_name)
        .bind(&envelope.payload)
        .bind(to_i32("max_retry_count", envelope.max_retry_count)?)
        .bind(
            envelope
                .attempts
                .map(|n| to_i32("attempts", n))
                .transpose()?,
        )
        .bind(envelope.delay_until)
        .bind(envelope.queued_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Delete an envelope. Returns whether a row was removed.
    pub async fn delete_envelope(&self, queue_key: &str, id: JobId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM job_envelopes WHERE queue_key = $1 AND id = $2")
            .bind(queue_key)
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Ids of every stored envelope under `queue_key`, oldest dispatch first.
    pub async fn list_envelopes(&self, queue_key: &str) -> Result<Vec<JobId>> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            "SELECT id FROM job_envelopes WHERE queue_key = $1 ORDER BY queued_at, id",
        )
        .bind(queue_key)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| JobId(id)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> EnvelopeRow {
        EnvelopeRow {
            job_name: "email".into(),
            payload: b"{}".to_vec(),
            max_retry_count: 2,
            attempts: Some(1),
            delay_until: None,
            queued_at: Utc::now(),
        }
    }

    #[test]
    fn row_converts_to_envelope() {
        let env = JobEnvelope::try_from(row()).unwrap();
        assert_eq!(env.job_name, "email");
        assert_eq!(env.max_retry_count, 2);
        assert_eq!(env.attempts, Some(1));
    }

    #[test]
    fn negative_counters_are_rejected() {
        let mut bad = row();
        bad.max_retry_count = -1;
        assert!(matches!(JobEnvelope::try_from(bad), Err(Error::Storage(_))));

        let mut bad = row();
        bad.attempts = Some(-3);
        assert!(matches!(JobEnvelope::try_from(bad), Err(Error::Storage(_))));
    }

    #[test]
    fn oversized_counters_do_not_fit() {
        assert!(to_i32("attempts", u32::MAX).is_err());
        assert_eq!(to_i32("attempts", 7).unwrap(), 7);
    }
}
