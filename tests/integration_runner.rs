//! Integration tests for scheduled jobs against the artifact stores.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;

use common::{date, knn_params, quick_config, ts};
use ev_demand::error::{EngineError, Result};
use ev_demand::grid::Granularity;
use ev_demand::runner::{JobKind, JobOutcome, JobRunner};
use ev_demand::session::RawRecord;
use ev_demand::source::{MemorySource, RecordSource, SyntheticSource};
use ev_demand::store::{Artifact, ArtifactStore, FileStore, MemoryStore};

/// Fails the first `failures` reads as unreachable.
struct FlakyStore {
    inner: MemoryStore,
    failures: AtomicUsize,
}

impl FlakyStore {
    fn new(failures: usize) -> Self {
        Self {
            inner: MemoryStore::new(),
            failures: AtomicUsize::new(failures),
        }
    }
}

impl ArtifactStore for FlakyStore {
    fn get(&self, name: &str) -> Result<Artifact> {
        let left = self.failures.load(Ordering::SeqCst);
        if left > 0 {
            self.failures.store(left - 1, Ordering::SeqCst);
            return Err(EngineError::StoreUnavailable("connection refused".into()));
        }
        self.inner.get(name)
    }

    fn set(&self, name: &str, artifact: Artifact) -> Result<()> {
        self.inner.set(name, artifact)
    }
}

/// Counts fetches of a fixed snapshot.
struct CountingSource {
    records: Vec<RawRecord>,
    fetches: usize,
}

impl RecordSource for CountingSource {
    fn fetch(&mut self) -> Result<Vec<RawRecord>> {
        self.fetches += 1;
        Ok(self.records.clone())
    }
}

/// Signals once fetching has begun, then waits to be released.
struct GatedSource {
    records: Vec<RawRecord>,
    started: mpsc::Sender<()>,
    release: mpsc::Receiver<()>,
}

impl RecordSource for GatedSource {
    fn fetch(&mut self) -> Result<Vec<RawRecord>> {
        let _ = self.started.send(());
        let _ = self.release.recv();
        Ok(self.records.clone())
    }
}

fn demo_records(days: u32) -> Vec<RawRecord> {
    SyntheticSource::new(21, date(2024, 3, 1), days).generate()
}

#[test]
fn full_cycle_against_file_store() {
    let dir = tempfile::tempdir().unwrap();
    let runner = JobRunner::new(quick_config(), FileStore::new(dir.path()));
    let mut source = SyntheticSource::new(21, date(2024, 3, 1), 60);
    let as_of = ts("2024-03-01 00:00");

    for kind in JobKind::ALL {
        let outcome = runner.run(kind, &mut source, as_of).unwrap();
        match (kind, outcome) {
            (JobKind::Ingest, JobOutcome::Ingested(report)) => assert!(report.accepted > 0),
            (JobKind::Revalidate, JobOutcome::Revalidated(reports)) => assert_eq!(reports.len(), 2),
            (JobKind::ForecastHourly, JobOutcome::Forecasted(out)) => assert_eq!(out.produced, 72),
            (JobKind::ForecastDaily, JobOutcome::Forecasted(out)) => assert!(out.is_complete()),
            (kind, other) => panic!("unexpected outcome for {kind}: {other:?}"),
        }
    }

    for name in [
        "fiveminutedemand",
        "hourlydemand",
        "dailydemand",
        "monthlydemand",
        "hourlyforecasts",
        "dailyforecasts",
        "hourlyparams",
        "dailyparams",
    ] {
        assert!(dir.path().join(format!("{name}.json")).exists(), "{name} missing");
    }

    // a second store over the same directory sees the same artifacts
    let reopened = FileStore::new(dir.path());
    assert_eq!(
        reopened.get_forecasts(Granularity::Hourly).unwrap(),
        runner.store().get_forecasts(Granularity::Hourly).unwrap()
    );
}

#[test]
fn repeated_forecast_run_is_stable() {
    let runner = JobRunner::new(quick_config(), MemoryStore::new());
    let as_of = ts("2024-03-01 00:00");
    runner
        .run(JobKind::Ingest, &mut MemorySource::new(demo_records(40)), as_of)
        .unwrap();

    let mut none = MemorySource::default();
    runner.run(JobKind::ForecastHourly, &mut none, as_of).unwrap();
    let first = runner.store().get_forecasts(Granularity::Hourly).unwrap();
    runner.run(JobKind::ForecastHourly, &mut none, as_of).unwrap();
    let second = runner.store().get_forecasts(Granularity::Hourly).unwrap();

    assert_eq!(first.len(), 72);
    assert_eq!(first, second);
}

#[test]
fn missing_params_are_computed_once_and_cached() {
    let runner = JobRunner::new(quick_config(), MemoryStore::new());
    let as_of = ts("2024-03-01 00:00");
    runner
        .run(JobKind::Ingest, &mut MemorySource::new(demo_records(40)), as_of)
        .unwrap();
    assert!(matches!(
        runner.store().get_params(Granularity::Hourly),
        Err(EngineError::NoCachedParameters(_))
    ));

    runner
        .run(JobKind::ForecastHourly, &mut MemorySource::default(), as_of)
        .unwrap();
    let params = runner.store().get_params(Granularity::Hourly).unwrap();
    assert_eq!(params.computed_at, as_of);
}

#[test]
fn forecast_job_reuses_stored_params_even_when_stale() {
    let runner = JobRunner::new(quick_config(), MemoryStore::new());
    let as_of = ts("2024-03-01 00:00");
    runner
        .run(JobKind::Ingest, &mut MemorySource::new(demo_records(40)), as_of)
        .unwrap();

    let fresh = knn_params(Granularity::Hourly, 3, 3, "2024-02-20 00:00");
    runner.store().set_params(&fresh).unwrap();
    runner
        .run(JobKind::ForecastHourly, &mut MemorySource::default(), as_of)
        .unwrap();
    assert_eq!(runner.store().get_params(Granularity::Hourly).unwrap(), fresh);

    let stale = knn_params(Granularity::Hourly, 3, 3, "2024-01-15 00:00");
    runner.store().set_params(&stale).unwrap();
    let outcome = runner
        .run(JobKind::ForecastHourly, &mut MemorySource::default(), as_of)
        .unwrap();
    assert!(matches!(outcome, JobOutcome::Forecasted(out) if out.produced == 72));
    assert_eq!(runner.store().get_params(Granularity::Hourly).unwrap(), stale);

    // only the revalidate job replaces them
    runner
        .run(JobKind::Revalidate, &mut MemorySource::default(), as_of)
        .unwrap();
    assert_eq!(
        runner.store().get_params(Granularity::Hourly).unwrap().computed_at,
        as_of
    );
}

#[test]
fn short_history_skips_forecast_without_failing() {
    let runner = JobRunner::new(quick_config(), MemoryStore::new());
    let as_of = ts("2024-03-01 00:00");
    runner
        .run(JobKind::Ingest, &mut MemorySource::new(demo_records(2)), as_of)
        .unwrap();

    let outcome = runner
        .run(JobKind::ForecastHourly, &mut MemorySource::default(), as_of)
        .unwrap();
    let JobOutcome::Forecasted(out) = outcome else {
        panic!("expected a forecast outcome");
    };
    assert_eq!(out.produced, 0);
    assert!(out.history.is_empty());
    assert!(matches!(
        out.skipped[0].reason,
        EngineError::InsufficientHistory { .. }
    ));
}

#[test]
fn store_outages_are_retried() {
    let runner = JobRunner::new(quick_config(), FlakyStore::new(2));
    let mut source = CountingSource {
        records: demo_records(3),
        fetches: 0,
    };
    let outcome = runner.run(JobKind::Ingest, &mut source, ts("2024-03-01 00:00"));
    assert!(matches!(outcome, Ok(JobOutcome::Ingested(_))));
    assert_eq!(source.fetches, 3);
}

#[test]
fn persistent_outage_gives_up_after_configured_attempts() {
    let runner = JobRunner::new(quick_config(), FlakyStore::new(10));
    let mut source = CountingSource {
        records: demo_records(3),
        fetches: 0,
    };
    let outcome = runner.run(JobKind::Ingest, &mut source, ts("2024-03-01 00:00"));
    assert!(matches!(outcome, Err(EngineError::StoreUnavailable(_))));
    assert_eq!(source.fetches, 3);
}

#[test]
fn other_errors_are_not_retried() {
    let runner = JobRunner::new(quick_config(), MemoryStore::new());
    let mut source = CountingSource {
        records: Vec::new(),
        fetches: 0,
    };
    let outcome = runner.run(JobKind::Ingest, &mut source, ts("2024-03-01 00:00"));
    assert!(matches!(outcome, Err(EngineError::EmptySource)));
    assert_eq!(source.fetches, 1);
}

#[test]
fn overlapping_trigger_of_same_kind_is_skipped() {
    let runner = JobRunner::new(quick_config(), MemoryStore::new());
    let as_of = ts("2024-03-01 00:00");
    let (started_tx, started_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();

    thread::scope(|s| {
        let runner = &runner;
        let handle = s.spawn(move || {
            let mut source = GatedSource {
                records: demo_records(3),
                started: started_tx,
                release: release_rx,
            };
            runner.run(JobKind::Ingest, &mut source, as_of)
        });

        started_rx.recv().unwrap();
        let overlapping = runner
            .run(JobKind::Ingest, &mut MemorySource::new(demo_records(3)), as_of)
            .unwrap();
        assert!(matches!(overlapping, JobOutcome::Skipped(JobKind::Ingest)));

        // a different kind still runs; nothing is stored yet
        let other = runner.run(JobKind::Revalidate, &mut MemorySource::default(), as_of);
        assert!(matches!(other, Err(EngineError::NotFound(_))));

        release_tx.send(()).unwrap();
        let first = handle.join().unwrap().unwrap();
        assert!(matches!(first, JobOutcome::Ingested(_)));
    });

    // the lock is released once the run completes
    let again = runner
        .run(JobKind::Ingest, &mut MemorySource::default(), as_of)
        .unwrap();
    assert!(matches!(again, JobOutcome::Ingested(report) if report.reused_prior));
}
