//! EV charging demand derivation and forecasting engine.

pub mod config;
pub mod error;
pub mod forecast;
/// Dense demand grids at each granularity.
pub mod grid;
pub mod io;
pub mod pipeline;
pub mod reporting;
pub mod runner;
/// Session normalization and explosion into power samples.
pub mod session;
pub mod source;
pub mod stage;
pub mod store;
pub mod timegrid;
