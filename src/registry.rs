//! Handler registry.
//!
//! Maps a job-type name to its handler. Built once at startup, then shared
//! read-only (`Arc<HandlerRegistry>`) by every worker in the process.

use crate::error::{Error, Result};
use crate::handler::{Handler, Job, TypedHandler};
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of handlers, indexed by job name.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn Handler>>,
}

impl HandlerRegistry {
    /// Create an empty registry with no handlers.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Register a typed job under `J::NAME`.
    pub fn register<J: Job>(&mut self) -> Result<&mut Self> {
        self.register_handler(J::NAME, Arc::new(TypedHandler::<J>::new()))
    }

    /// Register a byte-level handler under `name`.
    pub fn register_handler(
        &mut self,
        name: impl Into<String>,
        handler: Arc<dyn Handler>,
    ) -> Result<&mut Self> {
        let name = name.into();
        if self.handlers.contains_key(&name) {
            return Err(Error::DuplicateHandler(name));
        }
        tracing::debug!(job_name = %name, "handler registered");
        self.handlers.insert(name, handler);
        Ok(self)
    }

    /// Look up a handler by job name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Handler>> {
        self.handlers.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Registered job names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handlers", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{Backoff, JobContext};
    use async_trait::async_trait;

    struct Noop;

    #[async_trait]
    impl Handler for Noop {
        async fn execute(&self, _ctx: &JobContext, _payload: &[u8]) -> anyhow::Result<()> {
            Ok(())
        }

        fn next_retry_in(&self, _attempt: u32) -> Backoff {
            Backoff::Immediate
        }
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut registry = HandlerRegistry::empty();
        registry.register_handler("noop", Arc::new(Noop)).unwrap();

        let err = registry
            .register_handler("noop", Arc::new(Noop))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateHandler(name) if name == "noop"));
    }

    #[test]
    fn lookup_by_name() {
        let mut registry = HandlerRegistry::empty();
        registry
            .register_handler("b", Arc::new(Noop))
            .unwrap()
            .register_handler("a", Arc::new(Noop))
            .unwrap();

        assert!(registry.get("a").is_some());
        assert!(registry.contains("b"));
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.names(), vec!["a", "b"]);
    }
}
