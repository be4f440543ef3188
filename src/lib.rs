//! # workq
//!
//! Persistent background job execution.
//!
//! Producers hand a serialized job to a [`Dispatcher`], which writes a
//! [`JobEnvelope`](model::JobEnvelope) to a [`Storage`](storage::Storage)
//! backend and enqueues its id. A [`Worker`] claims one id at a time, looks
//! up the [`Handler`](handler::Handler) registered for the job's name, runs
//! it, and drives retry, backoff and cleanup. Lifecycle notifications fan
//! out to [`Observer`](notify::Observer)s.
//!
//! Backends: [`MemoryStorage`](storage::MemoryStorage) in process, and
//! [`PgStorage`](db::PgStorage) on Postgres with pgmq.

pub mod config;
pub mod context;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod handler;
pub mod model;
pub mod notify;
pub mod registry;
pub mod storage;
pub mod telemetry;
pub mod worker;

pub use context::QueueContext;
pub use dispatch::{DispatchOptions, Dispatcher};
pub use error::{Error, Result};
pub use handler::{Backoff, Handler, Job, JobContext};
pub use model::{JobEnvelope, JobId, JobSnapshot, QueueDescriptor};
pub use registry::HandlerRegistry;
pub use worker::{RunOutcome, UnroutablePolicy, Worker};
