//! Lag features, models, walk-forward validation, and the forecaster.

pub mod forecaster;
pub mod history;
pub mod knn;
pub mod lag;
pub mod metrics;
pub mod optimize;
pub mod params;
pub mod seasonal;
pub mod validation;

pub use forecaster::{DemandForecaster, ForecastInput, ForecastOutcome, SkippedColumn};
pub use history::{ForecastHistory, ForecastRecord};
pub use lag::{ColumnSeries, LagFeatureBuilder, LagMatrix, LagRow};
pub use params::{ModelParameters, ParamSet};
pub use validation::{ValidationReport, WalkForwardValidator};
