//! Scheduled job execution against the artifact store.
//!
//! Each job kind runs at most once at a time: an overlapping trigger is
//! skipped rather than queued. Jobs failing with a retryable store error are
//! re-run whole with linear backoff.

use std::fmt;
use std::thread;
use std::time::Duration;

use chrono::NaiveDateTime;
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::forecast::{ForecastOutcome, ParamSet, SkippedColumn, ValidationReport};
use crate::grid::{DemandGrid, Granularity};
use crate::pipeline::{derive_grids, forecast, validate};
use crate::reporting::IngestReport;
use crate::source::RecordSource;
use crate::store::ArtifactStore;

/// The recurring triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    Ingest,
    ForecastHourly,
    ForecastDaily,
    Revalidate,
}

impl JobKind {
    /// Order used by a full run.
    pub const ALL: [JobKind; 4] = [
        Self::Ingest,
        Self::Revalidate,
        Self::ForecastHourly,
        Self::ForecastDaily,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Ingest => "ingest",
            Self::ForecastHourly => "forecast-hourly",
            Self::ForecastDaily => "forecast-daily",
            Self::Revalidate => "revalidate",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == s)
    }

    fn index(self) -> usize {
        match self {
            Self::Ingest => 0,
            Self::ForecastHourly => 1,
            Self::ForecastDaily => 2,
            Self::Revalidate => 3,
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a job did.
#[derive(Debug)]
pub enum JobOutcome {
    Ingested(IngestReport),
    Forecasted(ForecastOutcome),
    Revalidated(Vec<ValidationReport>),
    /// Another run of the same kind held the lock.
    Skipped(JobKind),
}

impl fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ingested(report) => write!(f, "{report}"),
            Self::Forecasted(outcome) => write!(f, "{outcome}"),
            Self::Revalidated(reports) if reports.is_empty() => {
                writeln!(f, "no granularity had enough history to validate")
            }
            Self::Revalidated(reports) => reports.iter().try_for_each(|r| write!(f, "{r}")),
            Self::Skipped(kind) => writeln!(f, "{kind} skipped: previous run still active"),
        }
    }
}

/// Runs jobs against one store with per-kind single-writer locking.
pub struct JobRunner<S: ArtifactStore> {
    config: EngineConfig,
    store: S,
    locks: [Mutex<()>; 4],
}

impl<S: ArtifactStore> JobRunner<S> {
    pub fn new(config: EngineConfig, store: S) -> Self {
        Self {
            config,
            store,
            locks: Default::default(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Runs one job, or reports it skipped if the same kind is already running.
    ///
    /// # Errors
    ///
    /// The job's error after retries are exhausted; only
    /// [`EngineError::StoreUnavailable`] is retried.
    pub fn run(
        &self,
        kind: JobKind,
        source: &mut dyn RecordSource,
        as_of: NaiveDateTime,
    ) -> Result<JobOutcome> {
        let Some(_guard) = self.locks[kind.index()].try_lock() else {
            warn!(job = %kind, "previous run still active, skipping trigger");
            return Ok(JobOutcome::Skipped(kind));
        };

        info!(job = %kind, %as_of, "job started");
        let outcome = self.with_retry(kind, || match kind {
            JobKind::Ingest => self.ingest(source, as_of),
            JobKind::ForecastHourly => self.forecast(Granularity::Hourly, as_of),
            JobKind::ForecastDaily => self.forecast(Granularity::Daily, as_of),
            JobKind::Revalidate => self.revalidate(as_of),
        })?;
        info!(job = %kind, "job finished");
        Ok(outcome)
    }

    fn with_retry<T>(&self, kind: JobKind, mut job: impl FnMut() -> Result<T>) -> Result<T> {
        let attempts = self.config.jobs.retry_attempts.max(1);
        let mut attempt = 1;
        loop {
            match job() {
                Err(err) if err.is_retryable() && attempt < attempts => {
                    let delay = self.config.jobs.retry_backoff_ms * u64::from(attempt);
                    warn!(job = %kind, attempt, delay_ms = delay, error = %err, "retrying job");
                    thread::sleep(Duration::from_millis(delay));
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    fn ingest(&self, source: &mut dyn RecordSource, as_of: NaiveDateTime) -> Result<JobOutcome> {
        let records = source.fetch()?;
        let prior = self.store.get_grids()?;
        let (grids, report) = derive_grids(&records, prior.as_ref(), &self.config.ingest, as_of)?;
        if !report.reused_prior {
            self.store.set_grids(&grids)?;
        }
        Ok(JobOutcome::Ingested(report))
    }

    fn forecast(&self, granularity: Granularity, as_of: NaiveDateTime) -> Result<JobOutcome> {
        let grid = self.store.get_grid(granularity)?;
        let history = self.store.get_forecasts(granularity)?;

        let params = match self.current_params(&grid, as_of) {
            Ok(params) => params,
            Err(EngineError::InsufficientHistory {
                column,
                required,
                actual,
            }) => {
                warn!(%granularity, required, actual, "not enough history to validate, forecast skipped");
                return Ok(JobOutcome::Forecasted(ForecastOutcome {
                    history,
                    produced: 0,
                    skipped: vec![SkippedColumn {
                        column,
                        reason: EngineError::InsufficientHistory {
                            column,
                            required,
                            actual,
                        },
                    }],
                }));
            }
            Err(err) => return Err(err),
        };

        let outcome = forecast(&grid, &params, &history, &self.config);
        if outcome.produced > 0 {
            self.store.set_forecasts(&outcome.history)?;
        }
        Ok(JobOutcome::Forecasted(outcome))
    }

    /// Cached parameters, computed synchronously only when none exist yet.
    /// Stale parameters are used as they are until the revalidate job runs.
    fn current_params(&self, grid: &DemandGrid, as_of: NaiveDateTime) -> Result<ParamSet> {
        let granularity = grid.granularity;
        match self.store.get_params(granularity) {
            Ok(params) => {
                if params.is_stale(as_of, self.config.validation.refresh_days) {
                    warn!(%granularity, computed_at = %params.computed_at, "parameters stale, awaiting revalidation");
                }
                Ok(params)
            }
            Err(EngineError::NoCachedParameters(name)) => {
                warn!(artifact = %name, "no cached parameters, validating now");
                let report = validate(grid, &self.config, as_of)?;
                self.store_params(report.param_set())
            }
            Err(err) => Err(err),
        }
    }

    fn store_params(&self, params: ParamSet) -> Result<ParamSet> {
        self.store.set_params(&params)?;
        Ok(params)
    }

    fn revalidate(&self, as_of: NaiveDateTime) -> Result<JobOutcome> {
        let mut reports = Vec::new();
        for granularity in [Granularity::Hourly, Granularity::Daily] {
            let grid = self.store.get_grid(granularity)?;
            match validate(&grid, &self.config, as_of) {
                Ok(report) => {
                    self.store.set_params(&report.param_set())?;
                    reports.push(report);
                }
                Err(err @ EngineError::InsufficientHistory { .. }) => {
                    warn!(%granularity, error = %err, "revalidation skipped");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(JobOutcome::Revalidated(reports))
    }
}
