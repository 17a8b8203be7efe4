//! Fixed-horizon forecasting merged into the running forecast history.

use std::fmt;

use chrono::NaiveDateTime;
use tracing::{info, warn};

use crate::error::{EngineError, Result};
use crate::grid::{DemandColumn, DemandGrid};
use crate::stage::Stage;

use super::history::{ForecastHistory, ForecastRecord};
use super::knn::KnnRegressor;
use super::lag::{ColumnSeries, LagFeatureBuilder};
use super::params::{ModelParameters, ParamSet};
use super::seasonal::{Sarima, SarimaOrder};

/// Everything one forecast cycle reads.
#[derive(Debug, Clone, Copy)]
pub struct ForecastInput<'a> {
    pub grid: &'a DemandGrid,
    pub params: &'a ParamSet,
    pub history: &'a ForecastHistory,
}

/// A column left out of this cycle and why.
#[derive(Debug)]
pub struct SkippedColumn {
    pub column: DemandColumn,
    pub reason: EngineError,
}

#[derive(Debug)]
pub struct ForecastOutcome {
    pub history: ForecastHistory,
    /// Records produced this cycle across all columns.
    pub produced: usize,
    pub skipped: Vec<SkippedColumn>,
}

impl ForecastOutcome {
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

impl fmt::Display for ForecastOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} forecast: {} new records, {} in history",
            self.history.granularity,
            self.produced,
            self.history.len()
        )?;
        for s in &self.skipped {
            writeln!(f, "  skipped {}: {}", s.column, s.reason)?;
        }
        Ok(())
    }
}

/// Extends each column by a fixed horizon using the model its parameters name.
///
/// The strategy is read from the [`ModelParameters`] of each column, so the
/// forecaster never chooses hyperparameters itself. A column without enough
/// history is skipped and the history is left as it was for that column.
#[derive(Debug, Clone, Copy)]
pub struct DemandForecaster {
    horizon: usize,
    max_iterations: usize,
}

impl DemandForecaster {
    pub fn new(horizon: usize, max_iterations: usize) -> Self {
        Self {
            horizon,
            max_iterations,
        }
    }

    pub fn horizon(&self) -> usize {
        self.horizon
    }

    pub fn forecast(&self, input: ForecastInput<'_>) -> ForecastOutcome {
        let ForecastInput {
            grid,
            params,
            history,
        } = input;

        let mut records = Vec::new();
        let mut skipped = Vec::new();
        for column in DemandColumn::ALL {
            match self.forecast_column(grid, params, column) {
                Ok(mut produced) => records.append(&mut produced),
                Err(reason) => {
                    warn!(granularity = %grid.granularity, %column, %reason, "forecast skipped");
                    skipped.push(SkippedColumn { column, reason });
                }
            }
        }

        let history = if records.is_empty() {
            history.clone()
        } else {
            history.merge(&records)
        };
        info!(
            granularity = %grid.granularity,
            produced = records.len(),
            skipped = skipped.len(),
            history = history.len(),
            "forecast cycle complete"
        );

        ForecastOutcome {
            history,
            produced: records.len(),
            skipped,
        }
    }

    fn forecast_column(
        &self,
        grid: &DemandGrid,
        params: &ParamSet,
        column: DemandColumn,
    ) -> Result<Vec<ForecastRecord>> {
        let Some(issued_at) = grid.last_timestamp() else {
            return Err(EngineError::InsufficientHistory {
                column,
                required: 1,
                actual: 0,
            });
        };
        let model = params.get(column).ok_or_else(|| {
            EngineError::NoCachedParameters(format!("{}/{column}", grid.granularity.params_key()))
        })?;

        let series = ColumnSeries::from_grid(grid, column);
        let (timestamps, values) = match *model {
            ModelParameters::Knn {
                best_lag_depth,
                best_neighbor_count,
            } => self.knn(&series, column, best_lag_depth, best_neighbor_count)?,
            ModelParameters::Seasonal { .. } => {
                let order = SarimaOrder::from_params(model)
                    .ok_or_else(|| EngineError::Model(format!("not a seasonal model: {model}")))?;
                self.seasonal(&series, column, order)?
            }
        };

        Ok(timestamps
            .into_iter()
            .zip(values)
            .map(|(timestamp, value)| ForecastRecord {
                timestamp,
                column,
                value,
                issued_at,
            })
            .collect())
    }

    /// Trains on every historical row, then fills placeholder rows in time
    /// order. Rows whose lags reach into the horizon use earlier predictions.
    fn knn(
        &self,
        series: &ColumnSeries,
        column: DemandColumn,
        depth: usize,
        neighbors: usize,
    ) -> Result<(Vec<NaiveDateTime>, Vec<f64>)> {
        let builder = LagFeatureBuilder::for_granularity(depth, series.granularity);
        let required = builder.warmup() + neighbors;
        if series.len() < required {
            return Err(EngineError::InsufficientHistory {
                column,
                required,
                actual: series.len(),
            });
        }

        let model = KnnRegressor::fit(neighbors, &builder.build(series).observed())?;
        let observed = series.len();
        let mut extended = series.extend_horizon(self.horizon);
        loop {
            let pending = builder.build(&extended).pending();
            if pending.is_empty() {
                break;
            }
            for row in pending {
                if let Ok(i) = extended.timestamps.binary_search(&row.timestamp) {
                    extended.values[i] = Some(model.predict_one(&row.lags));
                }
            }
        }

        let values = extended.values.split_off(observed).into_iter().flatten().collect();
        Ok((extended.timestamps.split_off(observed), values))
    }

    fn seasonal(
        &self,
        series: &ColumnSeries,
        column: DemandColumn,
        order: SarimaOrder,
    ) -> Result<(Vec<NaiveDateTime>, Vec<f64>)> {
        let required = order.min_observations();
        if series.len() < required {
            return Err(EngineError::InsufficientHistory {
                column,
                required,
                actual: series.len(),
            });
        }

        let values: Vec<f64> = series.values.iter().flatten().copied().collect();
        let model = Sarima::fit(&values, order, self.max_iterations)?;
        let extended = series.extend_horizon(self.horizon);
        Ok((
            extended.timestamps[series.len()..].to_vec(),
            model.forecast(self.horizon),
        ))
    }
}

impl<'a> Stage<ForecastInput<'a>> for DemandForecaster {
    type Output = ForecastOutcome;

    fn apply(&self, input: ForecastInput<'a>) -> Self::Output {
        self.forecast(input)
    }
}
