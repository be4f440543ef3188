//! Core data model.
//!
//! A job is one persisted unit of work: an opaque payload, the name of the
//! handler that runs it, and the retry and timing metadata the worker drives.

pub mod job;
pub mod queue;

pub use job::{JobEnvelope, JobId, JobSnapshot, deadline_after, storage_precision};
pub use queue::QueueDescriptor;
