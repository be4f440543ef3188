//! pgmq queue operations via direct SQLx.
//!
//! Calls pgmq's SQL functions: pgmq.create, pgmq.send, pgmq.pop.
//! Queue names are restricted by pgmq to lowercase alphanumerics and
//! underscores; [`queue_name`] maps a storage key onto that alphabet.

use crate::error::Result;
use crate::telemetry::metrics;
use opentelemetry::KeyValue;
use sha2::{Digest, Sha256};

/// pgmq prefixes its tables (`q_`, `a_`), and Postgres caps identifiers at
/// 63 bytes.
const MAX_QUEUE_NAME: usize = 47;

/// Hex digits of the key digest appended to every queue name.
const DIGEST_LEN: usize = 12;

/// A message popped from a pgmq queue.
#[derive(Debug, Clone)]
pub struct PgmqMessage {
    pub msg_id: i64,
    pub read_ct: i32,
    pub enqueued_at: chrono::DateTime<chrono::Utc>,
    pub message: serde_json::Value,
}

/// pgmq queue name for a storage key.
///
/// A readable part (lowercased, every other character replaced with `_`,
/// truncated) followed by a SHA-256 digest of the exact key, so keys that
/// sanitize alike still get their own queue.
///
/// `"workq[Mail-Out]"` becomes `"workq_mail_out__<12 hex digits>"`.
pub fn queue_name(storage_key: &str) -> String {
    let readable: String = storage_key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .take(MAX_QUEUE_NAME - DIGEST_LEN - 1)
        .collect();

    let digest = Sha256::digest(storage_key.as_bytes());
    let mut name = readable;
    name.push('_');
    for byte in &digest[..DIGEST_LEN / 2] {
        name.push_str(&format!("{byte:02x}"));
    }
    name
}

fn count(queue_name: &str, operation: &'static str) {
    metrics::storage_operations().add(
        1,
        &[
            KeyValue::new("backend", "postgres"),
            KeyValue::new("queue", queue_name.to_string()),
            KeyValue::new("operation", operation),
        ],
    );
}

impl super::Db {
    /// Create a pgmq queue (idempotent).
    pub async fn create_queue(&self, queue_name: &str) -> Result<()> {
        sqlx::query("SELECT pgmq.create($1)")
            .bind(queue_name)
            .execute(&self.pool)
            .await?;
        count(queue_name, "create");
        Ok(())
    }

    /// Send a message to a pgmq queue. Returns the message ID.
    pub async fn send_to_queue(
        &self,
        queue_name: &str,
        payload: &serde_json::Value,
    ) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT pgmq.send($1, $2)")
            .bind(queue_name)
            .bind(payload)
            .fetch_one(&self.pool)
            .await?;
        count(queue_name, "send");
        Ok(row.0)
    }

    /// Read and delete the oldest visible message in one statement.
    /// Returns None if the queue is empty.
    pub async fn pop_from_queue(&self, queue_name: &str) -> Result<Option<PgmqMessage>> {
        let row = sqlx::query_as::<
            _,
            (
                i64,
                i32,
                chrono::DateTime<chrono::Utc>,
                serde_json::Value,
            ),
        >("SELECT msg_id, read_ct, enqueued_at, message FROM pgmq.pop($1)")
        .bind(queue_name)
        .fetch_optional(&self.pool)
        .await?;

        let msg = row.map(|(msg_id, read_ct, enqueued_at, message)| PgmqMessage {
            msg_id,
            read_ct,
            enqueued_at,
            message,
        });

        count(
            queue_name,
            if msg.is_some() { "pop" } else { "pop_empty" },
        );
        Ok(msg)
    }

    /// Number of messages currently in the queue.
    pub async fn queue_length(&self, queue_name: &str) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT queue_length FROM pgmq.metrics($1)")
            .bind(queue_name)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }
}
