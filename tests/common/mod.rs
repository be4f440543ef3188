//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

use async_trait::async_trait;
use workq::error::{Error, Result};
use workq::handler::{Backoff, Handler, JobContext};
use workq::model::{JobEnvelope, JobId, QueueDescriptor};
use workq::notify::{EventKind, EventLog, Notifier};
use workq::registry::HandlerRegistry;
use workq::storage::{MemoryStorage, Storage};
use workq::QueueContext;

/// Handler that fails a fixed number of times, then succeeds.
pub struct ScriptedHandler {
    failures_left: AtomicU32,
    backoff: Backoff,
    pub executions: AtomicU32,
    pub on_error_calls: AtomicU32,
    pub contexts: Mutex<Vec<(u32, u32)>>,
}

impl ScriptedHandler {
    pub fn failing(times: u32, backoff: Backoff) -> Arc<Self> {
        Arc::new(Self {
            failures_left: AtomicU32::new(times),
            backoff,
            executions: AtomicU32::new(0),
            on_error_calls: AtomicU32::new(0),
            contexts: Mutex::new(Vec::new()),
        })
    }

    pub fn always_failing(backoff: Backoff) -> Arc<Self> {
        Self::failing(u32::MAX, backoff)
    }

    pub fn succeeding() -> Arc<Self> {
        Self::failing(0, Backoff::Immediate)
    }

    pub fn executions(&self) -> u32 {
        self.executions.load(Ordering::SeqCst)
    }

    pub fn on_error_calls(&self) -> u32 {
        self.on_error_calls.load(Ordering::SeqCst)
    }

    /// `(attempt, remaining_tries)` seen by each execution.
    pub fn contexts(&self) -> Vec<(u32, u32)> {
        self.contexts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Handler for ScriptedHandler {
    async fn execute(&self, ctx: &JobContext, _payload: &[u8]) -> anyhow::Result<()> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        self.contexts
            .lock()
            .unwrap()
            .push((ctx.attempt, ctx.remaining_tries));

        let left = self.failures_left.load(Ordering::SeqCst);
        if left == 0 {
            return Ok(());
        }
        if left != u32::MAX {
            self.failures_left.store(left - 1, Ordering::SeqCst);
        }
        anyhow::bail!("scripted failure")
    }

    async fn on_error(
        &self,
        _ctx: &JobContext,
        _payload: &[u8],
        _error: &anyhow::Error,
    ) -> anyhow::Result<()> {
        self.on_error_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn next_retry_in(&self, _attempt: u32) -> Backoff {
        self.backoff
    }
}

/// Memory storage that counts calls and can be told to fail writes.
#[derive(Default)]
pub struct CountingStorage {
    pub inner: MemoryStorage,
    pub pops: AtomicUsize,
    pub pushes: AtomicUsize,
    pub sets: AtomicUsize,
    pub clears: AtomicUsize,
    pub fail_set: AtomicBool,
    pub fail_push: AtomicBool,
}

impl CountingStorage {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn pops(&self) -> usize {
        self.pops.load(Ordering::SeqCst)
    }

    pub fn pushes(&self) -> usize {
        self.pushes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Storage for CountingStorage {
    async fn get(&self, id: JobId) -> Result<JobEnvelope> {
        self.inner.get(id).await
    }

    async fn set(&self, id: JobId, envelope: &JobEnvelope) -> Result<()> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        if self.fail_set.load(Ordering::SeqCst) {
            return Err(Error::Storage("set refused".into()));
        }
        self.inner.set(id, envelope).await
    }

    async fn clear(&self, id: JobId) -> Result<()> {
        self.clears.fetch_add(1, Ordering::SeqCst);
        self.inner.clear(id).await
    }

    async fn pop(&self) -> Result<Option<JobId>> {
        self.pops.fetch_add(1, Ordering::SeqCst);
        self.inner.pop().await
    }

    async fn push(&self, id: JobId) -> Result<()> {
        self.pushes.fetch_add(1, Ordering::SeqCst);
        if self.fail_push.load(Ordering::SeqCst) {
            return Err(Error::Storage("push refused".into()));
        }
        self.inner.push(id).await
    }
}

/// Context over `storage` with one handler registered as `"task"` and an
/// event log attached.
pub fn context_with(
    storage: Arc<dyn Storage>,
    handler: Arc<dyn Handler>,
) -> (QueueContext, Arc<EventLog>) {
    let mut registry = HandlerRegistry::empty();
    registry.register_handler("task", handler).unwrap();
    let log = Arc::new(EventLog::new());
    let ctx = QueueContext::new(QueueDescriptor::new("default"), storage)
        .registry(registry)
        .notifier(Notifier::new().with(log.clone()));
    (ctx, log)
}

/// Event names in order, e.g. `["dispatched", "dequeued", "succeeded"]`.
pub fn event_names(log: &EventLog) -> Vec<&'static str> {
    log.events()
        .iter()
        .map(|e| match e.kind {
            EventKind::Dispatched { .. } => "dispatched",
            EventKind::Dequeued { .. } => "dequeued",
            EventKind::Succeeded { .. } => "succeeded",
            EventKind::Failed { .. } => "failed",
        })
        .collect()
}

/// Handler whose every execution panics.
#[derive(Default)]
pub struct PanickingHandler {
    pub executions: AtomicU32,
}

#[async_trait]
impl Handler for PanickingHandler {
    async fn execute(&self, _ctx: &JobContext, _payload: &[u8]) -> anyhow::Result<()> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        panic!("handler bug")
    }

    fn next_retry_in(&self, _attempt: u32) -> Backoff {
        Backoff::Immediate
    }
}
