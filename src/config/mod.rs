//! Typed configuration.
//!
//! Process settings come from environment variables and load once at
//! startup, failing fast if required vars are missing. Sensitive values are
//! wrapped in `secrecy::SecretString` to prevent log leaks.
//!
//! Worker tuning lives in an optional TOML file ([`WorkerSettings`]).

use std::path::Path;
use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::model::QueueDescriptor;
use crate::context::QueueContext;
use crate::worker::{Runner, RunnerConfig, UnroutablePolicy};

pub use secrecy::ExposeSecret;

pub const DEFAULT_PREFIX: &str = "workq";
pub const DEFAULT_QUEUE: &str = "default";

#[derive(Debug)]
pub struct Config {
    pub database_url: SecretString,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
    /// Namespace prefix for storage keys.
    pub prefix: String,
    /// Queue name used when no settings file overrides it.
    pub queue: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    /// In production, systemd EnvironmentFile provides the vars.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: SecretString::from(required_var("DATABASE_URL")?),
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: optional_var("LOG_LEVEL", "info"),
            prefix: optional_var("WORKQ_PREFIX", DEFAULT_PREFIX),
            queue: optional_var("WORKQ_QUEUE", DEFAULT_QUEUE),
        })
    }
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| Error::Config(format!("required environment variable {name} is not set")))
}

fn optional_var(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Worker settings file.
///
/// The `workq` binary reads only `queue`, `sequential` and `prefix` to find
/// the storage key. The remaining fields configure workers in an
/// application that registers its own handlers, via [`WorkerSettings::runner`].
///
/// ```toml
/// queue = "mail"
/// sequential = false
/// concurrency = 4
/// poll_interval_ms = 500
/// unroutable = "dead_letter"
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkerSettings {
    pub queue: String,
    pub sequential: bool,
    pub prefix: String,
    pub concurrency: usize,
    pub poll_interval_ms: u64,
    pub unroutable: UnroutablePolicy,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            queue: DEFAULT_QUEUE.to_string(),
            sequential: false,
            prefix: DEFAULT_PREFIX.to_string(),
            concurrency: 1,
            poll_interval_ms: 1000,
            unroutable: UnroutablePolicy::default(),
        }
    }
}

impl WorkerSettings {
    /// Defaults with `queue` and `prefix` taken from the environment config.
    pub fn from_config(config: &Config) -> Self {
        Self {
            queue: config.queue.clone(),
            prefix: config.prefix.clone(),
            ..Self::default()
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        Self::parse(&raw).map_err(|e| match e {
            Error::Config(msg) => Error::Config(format!("{}: {msg}", path.display())),
            other => other,
        })
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let settings: Self =
            toml::from_str(raw).map_err(|e| Error::Config(format!("invalid settings: {e}")))?;
        if settings.queue.is_empty() {
            return Err(Error::Config("queue name must not be empty".into()));
        }
        if settings.concurrency == 0 {
            return Err(Error::Config("concurrency must be at least 1".into()));
        }
        Ok(settings)
    }

    pub fn queue_descriptor(&self) -> QueueDescriptor {
        QueueDescriptor::new(self.queue.clone()).sequential(self.sequential)
    }

    pub fn storage_key(&self) -> String {
        self.queue_descriptor().storage_key(&self.prefix)
    }

    /// Polling pool over `ctx` with this file's concurrency, poll interval
    /// and unroutable policy.
    pub fn runner(&self, ctx: &QueueContext) -> Runner {
        Runner::new(ctx.worker_with(self.unroutable), self.runner_config())
    }

    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            concurrency: self.concurrency,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_all_defaults() {
        let settings = WorkerSettings::parse("").unwrap();
        assert_eq!(settings, WorkerSettings::default());
        assert_eq!(settings.storage_key(), "workq[default]");
    }

    #[test]
    fn parses_every_field() {
        let settings = WorkerSettings::parse(
            r#"
            queue = "mail"
            sequential = true
            prefix = "app"
            concurrency = 4
            poll_interval_ms = 250
            unroutable = "dead_letter"
            "#,
        )
        .unwrap();

        assert_eq!(settings.storage_key(), "app[mail]");
        assert!(settings.queue_descriptor().sequential);
        assert_eq!(settings.unroutable, UnroutablePolicy::DeadLetter);

        let runner = settings.runner_config();
        assert_eq!(runner.concurrency, 4);
        assert_eq!(runner.poll_interval, Duration::from_millis(250));
    }

    #[test]
    fn rejects_unknown_keys_and_bad_values() {
        assert!(matches!(
            WorkerSettings::parse("queues = \"x\""),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            WorkerSettings::parse("concurrency = 0"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            WorkerSettings::parse("queue = \"\""),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            WorkerSettings::parse("unroutable = \"drop\""),
            Err(Error::Config(_))
        ));
    }
}
