//! Read-only tabular exports.

pub mod export;

pub use export::{export_all, write_forecast_csv, write_grid_csv};
