//! Explicit queue context.
//!
//! Everything a dispatcher or worker needs travels in a [`QueueContext`]
//! value: the queue it serves, the storage port, the handler registry, and
//! the notification fan-out. Nothing is read from process-global state.

use std::sync::Arc;

use crate::dispatch::Dispatcher;
use crate::model::QueueDescriptor;
use crate::notify::Notifier;
use crate::registry::HandlerRegistry;
use crate::storage::Storage;
use crate::worker::{UnroutablePolicy, Worker};

#[derive(Clone)]
pub struct QueueContext {
    pub queue: QueueDescriptor,
    pub storage: Arc<dyn Storage>,
    pub registry: Arc<HandlerRegistry>,
    pub notifier: Arc<Notifier>,
}

impl QueueContext {
    pub fn new(queue: QueueDescriptor, storage: Arc<dyn Storage>) -> Self {
        Self {
            queue,
            storage,
            registry: Arc::new(HandlerRegistry::empty()),
            notifier: Arc::new(Notifier::new()),
        }
    }

    pub fn registry(mut self, registry: HandlerRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    pub fn shared_registry(mut self, registry: Arc<HandlerRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = Arc::new(notifier);
        self
    }

    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(self.clone())
    }

    pub fn worker(&self) -> Worker {
        Worker::new(self.clone())
    }

    pub fn worker_with(&self, unroutable: UnroutablePolicy) -> Worker {
        Worker::new(self.clone()).unroutable(unroutable)
    }
}

impl std::fmt::Debug for QueueContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueContext")
            .field("queue", &self.queue)
            .field("registry", &self.registry)
            .field("notifier", &self.notifier)
            .finish_non_exhaustive()
    }
}
