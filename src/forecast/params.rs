//! Model hyperparameters as produced by validation and read by forecasting.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::grid::{DemandColumn, Granularity};

/// Hyperparameters for one target column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum ModelParameters {
    /// Nearest-neighbour regression over seasonal lags.
    Knn {
        #[serde(rename = "bestLagDepth")]
        best_lag_depth: usize,
        #[serde(rename = "bestNeighborCount")]
        best_neighbor_count: usize,
    },
    /// Seasonal ARIMA `(p,d,q)x(P,D,Q,m)`.
    Seasonal {
        order: (usize, usize, usize),
        #[serde(rename = "seasonalOrder")]
        seasonal_order: (usize, usize, usize, usize),
    },
}

impl fmt::Display for ModelParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Knn {
                best_lag_depth,
                best_neighbor_count,
            } => write!(f, "knn(lags={best_lag_depth}, k={best_neighbor_count})"),
            Self::Seasonal {
                order: (p, d, q),
                seasonal_order: (sp, sd, sq, m),
            } => write!(f, "sarima({p},{d},{q})x({sp},{sd},{sq},{m})"),
        }
    }
}

/// Parameters for every column of one granularity, stamped with when they were computed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParamSet {
    pub granularity: Granularity,
    pub computed_at: NaiveDateTime,
    pub by_column: BTreeMap<DemandColumn, ModelParameters>,
}

impl ParamSet {
    pub fn new(granularity: Granularity, computed_at: NaiveDateTime) -> Self {
        Self {
            granularity,
            computed_at,
            by_column: BTreeMap::new(),
        }
    }

    pub fn with(mut self, column: DemandColumn, params: ModelParameters) -> Self {
        self.by_column.insert(column, params);
        self
    }

    pub fn get(&self, column: DemandColumn) -> Option<&ModelParameters> {
        self.by_column.get(&column)
    }

    /// True once `refresh_days` have passed since computation.
    pub fn is_stale(&self, as_of: NaiveDateTime, refresh_days: u32) -> bool {
        as_of - self.computed_at >= Duration::days(i64::from(refresh_days))
    }
}
