//! Walk-forward hyperparameter selection.

use std::fmt;
use std::ops::Range;

use chrono::NaiveDateTime;
use tracing::{debug, info};

use crate::config::{KnnSearchConfig, SeasonalSearchConfig, StrategyKind};
use crate::error::{EngineError, Result};
use crate::grid::{DemandColumn, DemandGrid, Granularity};
use crate::stage::Stage;

use super::knn::KnnRegressor;
use super::lag::{ColumnSeries, LagFeatureBuilder, LagRow};
use super::metrics::{Scores, mse};
use super::params::{ModelParameters, ParamSet};
use super::seasonal::{StepwiseSearch, seasonal_period};

/// Contiguous, time-ordered train / validation / test index blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeSplit {
    pub train: Range<usize>,
    pub validation: Range<usize>,
    pub test: Range<usize>,
}

impl TimeSplit {
    /// Holds out the last `test_ratio` of `n` rows, then the last
    /// `validation_ratio` of the remainder. Every block is non-empty or the
    /// split is `None`.
    pub fn nested(n: usize, test_ratio: f64, validation_ratio: f64) -> Option<Self> {
        let fit_end = (n as f64 * (1.0 - test_ratio)).floor() as usize;
        let train_end = (fit_end as f64 * (1.0 - validation_ratio)).floor() as usize;
        if train_end == 0 || train_end >= fit_end || fit_end >= n {
            return None;
        }
        Some(Self {
            train: 0..train_end,
            validation: train_end..fit_end,
            test: fit_end..n,
        })
    }

    /// Train and validation together, for the final refit before testing.
    pub fn fit_range(&self) -> Range<usize> {
        self.train.start..self.validation.end
    }
}

/// What validation chose for one column and how it scored.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnValidation {
    pub column: DemandColumn,
    pub params: ModelParameters,
    /// Validation-fold MSE of the chosen candidate (KNN only).
    pub validation_mse: Option<f64>,
    /// Scores on the held-out test block.
    pub test: Option<Scores>,
    /// Set when the parameters were copied from a linearly related column.
    pub shared_from: Option<DemandColumn>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationReport {
    pub granularity: Granularity,
    pub computed_at: NaiveDateTime,
    pub columns: Vec<ColumnValidation>,
}

impl ValidationReport {
    pub fn param_set(&self) -> ParamSet {
        self.columns.iter().fold(
            ParamSet::new(self.granularity, self.computed_at),
            |set, c| set.with(c.column, c.params),
        )
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== {} validation ===", self.granularity)?;
        for c in &self.columns {
            write!(f, "{:<18} {}", c.column.name(), c.params)?;
            if let Some(from) = c.shared_from {
                write!(f, "  (shared from {from})")?;
            }
            if let Some(v) = c.validation_mse {
                write!(f, "  val_mse={v:.4}")?;
            }
            if let Some(t) = c.test {
                write!(f, "  test_mae={:.4} test_rmse={:.4}", t.mae, t.rmse)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Selects model parameters for every column of a grid using only past data
/// to score predictions of later data.
///
/// Average power and energy demand are scalar multiples of each other at a
/// fixed granularity, so energy reuses the parameters searched for average
/// power. Peak power is searched independently.
#[derive(Debug, Clone)]
pub struct WalkForwardValidator {
    strategy: StrategyKind,
    knn: KnnSearchConfig,
    seasonal: SeasonalSearchConfig,
    computed_at: NaiveDateTime,
}

#[derive(Debug, Clone, Copy)]
struct KnnCandidate {
    lag_depth: usize,
    neighbors: usize,
    validation_mse: f64,
}

fn stepped(min: usize, max: usize, step: usize) -> Vec<usize> {
    (min..=max).step_by(step.max(1)).collect()
}

impl WalkForwardValidator {
    pub fn new(
        strategy: StrategyKind,
        knn: &KnnSearchConfig,
        seasonal: &SeasonalSearchConfig,
        computed_at: NaiveDateTime,
    ) -> Self {
        Self {
            strategy,
            knn: knn.clone(),
            seasonal: seasonal.clone(),
            computed_at,
        }
    }

    /// Runs the search for all three columns of `grid`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InsufficientHistory`] when a column is too short
    /// for even the smallest candidate.
    pub fn validate(&self, grid: &DemandGrid) -> Result<ValidationReport> {
        let search = |column| match self.strategy {
            StrategyKind::Knn => self.search_knn(grid, column),
            StrategyKind::Seasonal => self.search_seasonal(grid, column),
        };

        let avg = search(DemandColumn::AvgPower)?;
        let energy = ColumnValidation {
            column: DemandColumn::Energy,
            params: avg.params,
            validation_mse: None,
            test: None,
            shared_from: Some(DemandColumn::AvgPower),
        };
        let peak = search(DemandColumn::PeakPower)?;

        let report = ValidationReport {
            granularity: grid.granularity,
            computed_at: self.computed_at,
            columns: vec![avg, energy, peak],
        };
        for c in &report.columns {
            info!(
                granularity = %report.granularity,
                column = %c.column,
                params = %c.params,
                "selected model parameters"
            );
        }
        Ok(report)
    }

    /// Rows needed before the smallest KNN candidate has a usable split.
    fn knn_required(&self, period: usize) -> usize {
        let kept = (1.0 - self.knn.test_ratio) * (1.0 - self.knn.validation_ratio);
        let rows = (self.knn.neighbors_min as f64 / kept).ceil() as usize + 2;
        self.knn.lag_depth_min * period + rows
    }

    fn search_knn(&self, grid: &DemandGrid, column: DemandColumn) -> Result<ColumnValidation> {
        let series = ColumnSeries::from_grid(grid, column);
        let period = grid.granularity.lag_period();
        let depths = stepped(self.knn.lag_depth_min, self.knn.lag_depth_max, self.knn.lag_depth_step);
        let ks = stepped(self.knn.neighbors_min, self.knn.neighbors_max, self.knn.neighbors_step);

        let mut best: Option<KnnCandidate> = None;
        for &depth in &depths {
            let rows = LagFeatureBuilder::new(depth, period).build(&series).observed();
            let Some(split) = TimeSplit::nested(rows.len(), self.knn.test_ratio, self.knn.validation_ratio)
            else {
                debug!(%column, depth, rows = rows.len(), "lag depth too deep for history");
                continue;
            };
            let feasible: Vec<usize> = ks.iter().copied().filter(|&k| k <= split.train.len()).collect();
            if feasible.is_empty() {
                continue;
            }

            let model = KnnRegressor::fit(1, &rows[split.train.clone()])?;
            let fold = &rows[split.validation.clone()];
            let actual = targets(fold);
            let per_row: Vec<Vec<f64>> = fold
                .iter()
                .map(|r| model.predict_for_ks(&r.lags, &feasible))
                .collect();

            for (i, &k) in feasible.iter().enumerate() {
                let predicted: Vec<f64> = per_row.iter().map(|p| p[i]).collect();
                let score = mse(&actual, &predicted);
                debug!(%column, depth, k, mse = score, "knn candidate");
                if best.is_none_or(|b| score < b.validation_mse) {
                    best = Some(KnnCandidate {
                        lag_depth: depth,
                        neighbors: k,
                        validation_mse: score,
                    });
                }
            }
        }

        let best = best.ok_or(EngineError::InsufficientHistory {
            column,
            required: self.knn_required(period),
            actual: series.len(),
        })?;

        let rows = LagFeatureBuilder::new(best.lag_depth, period).build(&series).observed();
        let test = TimeSplit::nested(rows.len(), self.knn.test_ratio, self.knn.validation_ratio)
            .map(|split| -> Result<Scores> {
                let model = KnnRegressor::fit(best.neighbors, &rows[split.fit_range()])?;
                let held_out = &rows[split.test.clone()];
                Ok(Scores::compute(&targets(held_out), &model.predict(held_out)))
            })
            .transpose()?;

        Ok(ColumnValidation {
            column,
            params: ModelParameters::Knn {
                best_lag_depth: best.lag_depth,
                best_neighbor_count: best.neighbors,
            },
            validation_mse: Some(best.validation_mse),
            test,
            shared_from: None,
        })
    }

    fn search_seasonal(&self, grid: &DemandGrid, column: DemandColumn) -> Result<ColumnValidation> {
        let values = grid.column(column);
        let period = seasonal_period(grid.granularity);
        let fit_end = (values.len() as f64 * (1.0 - self.seasonal.test_ratio)).floor() as usize;

        let search = StepwiseSearch::new(&self.seasonal, period);
        let smallest = search.min_observations();
        if fit_end < smallest || fit_end >= values.len() {
            let required = (smallest as f64 / (1.0 - self.seasonal.test_ratio)).ceil() as usize + 1;
            return Err(EngineError::InsufficientHistory {
                column,
                required,
                actual: values.len(),
            });
        }

        let (train, test) = values.split_at(fit_end);
        let model = search.search(train)?;
        let scores = Scores::compute(test, &model.forecast(test.len()));
        debug!(%column, order = %model.order(), aic = model.aic(), "seasonal order selected");

        Ok(ColumnValidation {
            column,
            params: model.order().to_params(),
            validation_mse: None,
            test: Some(scores),
            shared_from: None,
        })
    }
}

fn targets(rows: &[LagRow]) -> Vec<f64> {
    rows.iter().filter_map(|r| r.target).collect()
}

impl<'a> Stage<&'a DemandGrid> for WalkForwardValidator {
    type Output = Result<ValidationReport>;

    fn apply(&self, input: &'a DemandGrid) -> Self::Output {
        self.validate(input)
    }
}
