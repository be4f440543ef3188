//! Fan-out ordering and isolation.

use std::sync::{Arc, Mutex};

use workq::model::{JobEnvelope, JobId, JobSnapshot};
use workq::notify::{EventKind, EventLog, Notifier, Observer};

/// Appends `"{tag}:{event}"` to a shared journal.
struct Journal {
    tag: &'static str,
    lines: Arc<Mutex<Vec<String>>>,
}

impl Journal {
    fn note(&self, event: &str) {
        self.lines.lock().unwrap().push(format!("{}:{event}", self.tag));
    }
}

impl Observer for Journal {
    fn on_dispatched(&self, _job: &JobSnapshot) -> anyhow::Result<()> {
        self.note("dispatched");
        Ok(())
    }

    fn on_failed(&self, _job: &JobSnapshot, _error: &anyhow::Error) -> anyhow::Result<()> {
        self.note("failed");
        Ok(())
    }
}

struct Erroring;

impl Observer for Erroring {
    fn on_dispatched(&self, _job: &JobSnapshot) -> anyhow::Result<()> {
        anyhow::bail!("sink unavailable")
    }
}

struct Panicking;

impl Observer for Panicking {
    fn on_dispatched(&self, _job: &JobSnapshot) -> anyhow::Result<()> {
        panic!("observer bug")
    }

    fn on_failed(&self, _job: &JobSnapshot, _error: &anyhow::Error) -> anyhow::Result<()> {
        panic!("{}", String::from("formatted panic"))
    }
}

fn snapshot() -> JobSnapshot {
    JobSnapshot::capture(JobId::new(), "default", &JobEnvelope::new("noop", Vec::new()))
}

#[test]
fn observers_run_in_registration_order() {
    let lines = Arc::new(Mutex::new(Vec::new()));
    let notifier = Notifier::new()
        .with(Arc::new(Journal {
            tag: "a",
            lines: lines.clone(),
        }))
        .with(Arc::new(Journal {
            tag: "b",
            lines: lines.clone(),
        }));
    assert_eq!(notifier.len(), 2);

    let job = snapshot();
    notifier.dispatched(&job);
    notifier.failed(&job, &anyhow::anyhow!("boom"));

    assert_eq!(
        *lines.lock().unwrap(),
        ["a:dispatched", "b:dispatched", "a:failed", "b:failed"]
    );
}

#[test]
fn errors_and_panics_are_contained() {
    let lines = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::new(EventLog::new());
    let notifier = Notifier::new()
        .with(Arc::new(Erroring))
        .with(Arc::new(Panicking))
        .with(Arc::new(Journal {
            tag: "after",
            lines: lines.clone(),
        }))
        .with(log.clone());

    let job = snapshot();
    notifier.dispatched(&job);
    notifier.failed(&job, &anyhow::anyhow!("boom"));

    assert_eq!(*lines.lock().unwrap(), ["after:dispatched", "after:failed"]);

    let events = log.events();
    assert_eq!(events.len(), 2);
    assert!(matches!(&events[0].kind, EventKind::Dispatched { job: j } if j.id == job.id));
    assert!(matches!(&events[1].kind, EventKind::Failed { error, .. } if error == "boom"));
}

#[test]
fn observers_are_shared_between_notifiers() {
    let log = Arc::new(EventLog::new());
    let first = Notifier::new().with(log.clone());
    let second = first.clone();

    first.dispatched(&snapshot());
    second.dispatched(&snapshot());

    let events = log.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].seq, 1);
    assert_eq!(events[1].seq, 2);
    assert_eq!(log.events_since(1).len(), 1);
}
