//! [`Storage`] over Postgres: envelopes in `job_envelopes`, pending ids in
//! a pgmq queue.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::error::{Error, Result};
use crate::model::{JobEnvelope, JobId};
use crate::storage::Storage;

use super::{Db, pgmq};

#[derive(Debug, Clone)]
pub struct PgStorage {
    db: Arc<Db>,
    key: String,
    queue: String,
}

impl PgStorage {
    /// Bind to `storage_key`, creating its pgmq queue if needed.
    pub async fn open(db: Arc<Db>, storage_key: impl Into<String>) -> Result<Self> {
        let key = storage_key.into();
        let queue = pgmq::queue_name(&key);
        db.create_queue(&queue).await?;
        Ok(Self { db, key, queue })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Name of the backing pgmq queue.
    pub fn queue_name(&self) -> &str {
        &self.queue
    }

    pub async fn pending_len(&self) -> Result<i64> {
        self.db.queue_length(&self.queue).await
    }

    pub async fn list(&self) -> Result<Vec<JobId>> {
        self.db.list_envelopes(&self.key).await
    }
}

#[async_trait]
impl Storage for PgStorage {
    async fn get(&self, id: JobId) -> Result<JobEnvelope> {
        self.db
            .get_envelope(&self.key, id)
            .await?
            .ok_or(Error::NotFound(id))
    }

    async fn set(&self, id: JobId, envelope: &JobEnvelope) -> Result<()> {
        self.db.upsert_envelope(&self.key, id, envelope).await
    }

    async fn clear(&self, id: JobId) -> Result<()> {
        self.db.delete_envelope(&self.key, id).await?;
        Ok(())
    }

    async fn pop(&self) -> Result<Option<JobId>> {
        let Some(msg) = self.db.pop_from_queue(&self.queue).await? else {
            return Ok(None);
        };
        let id = msg
            .message
            .get("job_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::Storage(format!("pgmq message {} has no job_id", msg.msg_id)))?;
        let id = id
            .parse()
            .map_err(|e| Error::Storage(format!("pgmq message {}: bad job_id: {e}", msg.msg_id)))?;
        Ok(Some(id))
    }

    async fn push(&self, id: JobId) -> Result<()> {
        self.db
            .send_to_queue(&self.queue, &json!({ "job_id": id.to_string() }))
            .await?;
        Ok(())
    }
}
