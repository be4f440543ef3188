//! Queue descriptor.

use serde::{Deserialize, Serialize};

/// A named queue plus a sequential-execution hint.
///
/// Equality and hashing consider the name only: two descriptors with the same
/// name address the same storage namespace. `sequential` is a hint for the
/// storage or execution collaborator and is not enforced by the worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueDescriptor {
    pub name: String,
    #[serde(default)]
    pub sequential: bool,
}

impl QueueDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sequential: false,
        }
    }

    pub fn sequential(mut self, sequential: bool) -> Self {
        self.sequential = sequential;
        self
    }

    /// Storage namespace for this queue: `prefix[name]`.
    pub fn storage_key(&self, prefix: &str) -> String {
        format!("{prefix}[{}]", self.name)
    }
}

impl Default for QueueDescriptor {
    fn default() -> Self {
        Self::new("default")
    }
}

impl PartialEq for QueueDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for QueueDescriptor {}

impl std::hash::Hash for QueueDescriptor {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl std::fmt::Display for QueueDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}
