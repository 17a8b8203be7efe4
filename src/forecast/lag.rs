//! Seasonal lag features over one grid column.

use chrono::NaiveDateTime;

use crate::grid::{DemandColumn, DemandGrid, Granularity};
use crate::stage::Stage;

/// One column of a grid, with room for unobserved future rows.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSeries {
    pub granularity: Granularity,
    pub timestamps: Vec<NaiveDateTime>,
    pub values: Vec<Option<f64>>,
}

impl ColumnSeries {
    pub fn from_grid(grid: &DemandGrid, column: DemandColumn) -> Self {
        Self {
            granularity: grid.granularity,
            timestamps: grid.timestamps(),
            values: grid.points.iter().map(|p| Some(column.value(p))).collect(),
        }
    }

    pub fn from_values(granularity: Granularity, start: NaiveDateTime, values: &[f64]) -> Self {
        let mut timestamps = Vec::with_capacity(values.len());
        let mut t = start;
        for _ in values {
            timestamps.push(t);
            t = granularity.next_bucket(t);
        }
        Self {
            granularity,
            timestamps,
            values: values.iter().copied().map(Some).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Number of rows with an observed value.
    pub fn observed(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count()
    }

    /// Appends `horizon` placeholder rows continuing the period sequence.
    pub fn extend_horizon(&self, horizon: usize) -> Self {
        let mut out = self.clone();
        let Some(&last) = self.timestamps.last() else {
            return out;
        };
        let mut t = last;
        for _ in 0..horizon {
            t = self.granularity.next_bucket(t);
            out.timestamps.push(t);
            out.values.push(None);
        }
        out
    }
}

/// A training or forecast-input row: the target plus `lag_1..lag_N`.
#[derive(Debug, Clone, PartialEq)]
pub struct LagRow {
    pub timestamp: NaiveDateTime,
    /// `None` for placeholder rows beyond the observed horizon.
    pub target: Option<f64>,
    /// `lags[k - 1]` is the value `k * period` rows earlier.
    pub lags: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LagMatrix {
    pub depth: usize,
    pub period: usize,
    pub rows: Vec<LagRow>,
}

impl LagMatrix {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows whose target is known, in time order.
    pub fn observed(&self) -> Vec<LagRow> {
        self.rows.iter().filter(|r| r.target.is_some()).cloned().collect()
    }

    /// Placeholder rows to be predicted, in time order.
    pub fn pending(&self) -> Vec<LagRow> {
        self.rows.iter().filter(|r| r.target.is_none()).cloned().collect()
    }
}

/// Builds `depth` lags spaced `period` rows apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LagFeatureBuilder {
    depth: usize,
    period: usize,
}

impl LagFeatureBuilder {
    pub fn new(depth: usize, period: usize) -> Self {
        Self {
            depth,
            period: period.max(1),
        }
    }

    pub fn for_granularity(depth: usize, granularity: Granularity) -> Self {
        Self::new(depth, granularity.lag_period())
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn period(&self) -> usize {
        self.period
    }

    /// Rows needed before the first complete lag vector.
    pub fn warmup(&self) -> usize {
        self.depth * self.period
    }

    /// Rows with any missing lag are dropped; a missing target is kept.
    pub fn build(&self, series: &ColumnSeries) -> LagMatrix {
        let rows = (self.warmup()..series.len())
            .filter_map(|t| {
                let lags = (1..=self.depth)
                    .map(|k| series.values[t - k * self.period])
                    .collect::<Option<Vec<f64>>>()?;
                Some(LagRow {
                    timestamp: series.timestamps[t],
                    target: series.values[t],
                    lags,
                })
            })
            .collect();

        LagMatrix {
            depth: self.depth,
            period: self.period,
            rows,
        }
    }
}

impl<'a> Stage<&'a ColumnSeries> for LagFeatureBuilder {
    type Output = LagMatrix;

    fn apply(&self, input: &'a ColumnSeries) -> Self::Output {
        self.build(input)
    }
}
