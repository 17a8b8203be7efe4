//! Engine entry points: grid derivation, forecasting, and revalidation.
//!
//! Each function chains stages by passing values; nothing here holds state
//! between calls.

use chrono::NaiveDateTime;
use tracing::{debug, info};

use crate::config::{EngineConfig, IngestConfig};
use crate::error::{EngineError, Result};
use crate::forecast::{
    DemandForecaster, ForecastHistory, ForecastInput, ForecastOutcome, ParamSet, ValidationReport,
    WalkForwardValidator,
};
use crate::grid::{DemandGrid, GranularityResampler, GridAggregator, GridSet};
use crate::reporting::IngestReport;
use crate::session::{RawRecord, SessionExploder, SessionNormalizer};

/// Derives every demand grid from one snapshot of raw records.
///
/// Records that fail validation are counted in the report and dropped. When
/// no usable session remains, `prior` is returned unchanged so an empty
/// source never overwrites existing grids.
///
/// # Errors
///
/// Returns [`EngineError::EmptySource`] when there are no usable sessions and
/// no prior snapshot to fall back on.
pub fn derive_grids(
    records: &[RawRecord],
    prior: Option<&GridSet>,
    config: &IngestConfig,
    as_of: NaiveDateTime,
) -> Result<(GridSet, IngestReport)> {
    let normalizer = SessionNormalizer::new(config, as_of);
    let mut report = IngestReport {
        records: records.len(),
        ..IngestReport::default()
    };

    let mut sessions = Vec::with_capacity(records.len());
    for (i, record) in records.iter().enumerate() {
        match normalizer.normalize(record) {
            Ok(session) => sessions.push(session),
            Err(err) => {
                debug!(record = i, error = %err, "record dropped");
                report.reject(&err);
            }
        }
    }
    report.accepted = sessions.len();

    if sessions.is_empty() {
        return match prior {
            Some(prior) => {
                info!(records = records.len(), "no usable sessions, keeping prior grids");
                report.reused_prior = true;
                Ok((prior.clone(), report))
            }
            None => Err(EngineError::EmptySource),
        };
    }

    let samples: Vec<_> = sessions.iter().flat_map(|s| SessionExploder.explode(s)).collect();
    report.samples = samples.len();

    let extend_until = config.extend_to_now.then_some(as_of);
    let base = GridAggregator::new(extend_until).aggregate(&samples);
    let grids = GranularityResampler::resample_all(&base);

    info!(
        accepted = report.accepted,
        rejected = report.rejected(),
        five_min = grids.five_min.len(),
        hourly = grids.hourly.len(),
        daily = grids.daily.len(),
        monthly = grids.monthly.len(),
        "derived demand grids"
    );
    Ok((grids, report))
}

/// Extends `history` by the horizon configured for the grid's granularity.
///
/// Five-minute grids use the hourly horizon and monthly grids the daily one.
pub fn forecast(
    grid: &DemandGrid,
    params: &ParamSet,
    history: &ForecastHistory,
    config: &EngineConfig,
) -> ForecastOutcome {
    let horizon = config.forecast.for_granularity(grid.granularity).horizon;
    DemandForecaster::new(horizon, config.validation.seasonal.max_iterations).forecast(
        ForecastInput {
            grid,
            params,
            history,
        },
    )
}

/// [`forecast`] for the hourly grid.
pub fn forecast_hourly(
    grid: &DemandGrid,
    params: &ParamSet,
    history: &ForecastHistory,
    config: &EngineConfig,
) -> ForecastOutcome {
    forecast(grid, params, history, config)
}

/// [`forecast`] for the daily grid.
pub fn forecast_daily(
    grid: &DemandGrid,
    params: &ParamSet,
    history: &ForecastHistory,
    config: &EngineConfig,
) -> ForecastOutcome {
    forecast(grid, params, history, config)
}

/// Runs walk-forward validation for `grid` with the strategy configured for
/// its granularity.
///
/// # Errors
///
/// Propagates [`EngineError::InsufficientHistory`] and model failures.
pub fn validate(grid: &DemandGrid, config: &EngineConfig, as_of: NaiveDateTime) -> Result<ValidationReport> {
    let strategy = config.forecast.for_granularity(grid.granularity).strategy;
    WalkForwardValidator::new(
        strategy,
        &config.validation.knn,
        &config.validation.seasonal,
        as_of,
    )
    .validate(grid)
}

/// Recomputes model parameters for `grid`.
///
/// # Errors
///
/// See [`validate`].
pub fn revalidate(grid: &DemandGrid, config: &EngineConfig, as_of: NaiveDateTime) -> Result<ParamSet> {
    validate(grid, config, as_of).map(|report| report.param_set())
}
