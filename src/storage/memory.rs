//! In-process storage backend.
//!
//! Envelopes live in a map, pending identifiers in a FIFO. Both sit behind a
//! single async mutex, which makes `pop` an exclusive claim. Clones share
//! state, so several workers can drain one backend.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use opentelemetry::KeyValue;
use tokio::sync::Mutex;

use super::Storage;
use crate::error::{Error, Result};
use crate::model::{JobEnvelope, JobId};
use crate::telemetry::metrics;

#[derive(Debug, Default)]
struct Inner {
    envelopes: HashMap<JobId, JobEnvelope>,
    pending: VecDeque<JobId>,
}

/// Memory-backed [`Storage`].
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    key: Arc<str>,
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStorage {
    /// Create an empty backend for the given storage key.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: Arc::from(key.into()),
            inner: Arc::default(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Number of stored envelopes.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.envelopes.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Number of identifiers waiting to be popped.
    pub async fn pending_len(&self) -> usize {
        self.inner.lock().await.pending.len()
    }

    /// Is `id` currently in the pending set?
    pub async fn is_pending(&self, id: JobId) -> bool {
        self.inner.lock().await.pending.contains(&id)
    }

    fn count(&self, operation: &'static str) {
        metrics::storage_operations().add(
            1,
            &[
                KeyValue::new("backend", "memory"),
                KeyValue::new("operation", operation),
            ],
        );
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get(&self, id: JobId) -> Result<JobEnvelope> {
        self.count("get");
        self.inner
            .lock()
            .await
            .envelopes
            .get(&id)
            .cloned()
            .ok_or(Error::NotFound(id))
    }

    async fn set(&self, id: JobId, envelope: &JobEnvelope) -> Result<()> {
        self.count("set");
        self.inner
            .lock()
            .await
            .envelopes
            .insert(id, envelope.clone());
        Ok(())
    }

    async fn clear(&self, id: JobId) -> Result<()> {
        self.count("clear");
        self.inner.lock().await.envelopes.remove(&id);
        Ok(())
    }

    async fn pop(&self) -> Result<Option<JobId>> {
        self.count("pop");
        Ok(self.inner.lock().await.pending.pop_front())
    }

    async fn push(&self, id: JobId) -> Result<()> {
        self.count("push");
        self.inner.lock().await.pending.push_back(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let storage = MemoryStorage::new("workq[default]");
        let id = JobId::new();
        let mut env = JobEnvelope::new("email", b"hello".to_vec());
        env.max_retry_count = 4;
        env.attempts = Some(1);

        storage.set(id, &env).await.unwrap();
        assert_eq!(storage.get(id).await.unwrap(), env);
    }

    #[tokio::test]
    async fn get_missing_is_not_found() {
        let storage = MemoryStorage::new("workq[default]");
        let id = JobId::new();
        assert!(matches!(storage.get(id).await, Err(Error::NotFound(missing)) if missing == id));
    }

    #[tokio::test]
    async fn clear_is_idempotent() {
        let storage = MemoryStorage::new("workq[default]");
        let id = JobId::new();
        storage
            .set(id, &JobEnvelope::new("email", Vec::new()))
            .await
            .unwrap();

        storage.clear(id).await.unwrap();
        storage.clear(id).await.unwrap();
        assert!(storage.is_empty().await);
    }

    #[tokio::test]
    async fn pop_is_fifo_and_exclusive() {
        let storage = MemoryStorage::new("workq[default]");
        let (a, b) = (JobId::new(), JobId::new());
        storage.push(a).await.unwrap();
        storage.push(b).await.unwrap();

        let other = storage.clone();
        assert_eq!(storage.pop().await.unwrap(), Some(a));
        assert_eq!(other.pop().await.unwrap(), Some(b));
        assert_eq!(storage.pop().await.unwrap(), None);
    }

    #[tokio::test]
    async fn concurrent_pops_never_share_an_id() {
        let storage = MemoryStorage::new("workq[default]");
        for _ in 0..100 {
            storage.push(JobId::new()).await.unwrap();
        }

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..8 {
            let storage = storage.clone();
            tasks.spawn(async move {
                let mut claimed = Vec::new();
                while let Some(id) = storage.pop().await.unwrap() {
                    claimed.push(id);
                }
                claimed
            });
        }

        let mut all = Vec::new();
        while let Some(claimed) = tasks.join_next().await {
            all.extend(claimed.unwrap());
        }
        let unique: std::collections::HashSet<_> = all.iter().collect();
        assert_eq!(all.len(), 100);
        assert_eq!(unique.len(), 100);
    }
}
