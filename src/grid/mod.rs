//! Dense demand grids and their derivation from exploded samples.

pub mod aggregator;
/// Calendar fields and federal holidays.
pub mod calendar;
pub mod resampler;
pub mod types;

pub use aggregator::GridAggregator;
pub use resampler::GranularityResampler;
pub use types::{AggRule, DemandColumn, DemandGrid, DemandPoint, Granularity, GridSet};
