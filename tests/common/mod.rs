//! Shared test fixtures for integration tests.
#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime};
use ev_demand::config::{EngineConfig, IngestConfig};
use ev_demand::forecast::{ModelParameters, ParamSet};
use ev_demand::grid::{DemandColumn, DemandGrid, DemandPoint, Granularity};
use ev_demand::session::RawRecord;
use ev_demand::timegrid::parse_timestamp;

/// Parses a fixture timestamp.
pub fn ts(s: &str) -> NaiveDateTime {
    parse_timestamp(s).unwrap()
}

/// A REGULAR session record with the minimum required fields.
pub fn record(user: &str, start: &str, finish: &str, energy_wh: f64) -> RawRecord {
    RawRecord::new()
        .with("userId", user)
        .with("stationId", "station-01")
        .with("choice", "REGULAR")
        .with("startChargeTime", start)
        .with("lastUpdate", finish)
        .with("cumEnergyDelivered_Wh", energy_wh.to_string())
}

/// Ingestion without retention and without padding to the reference time.
pub fn ingest_config() -> IngestConfig {
    IngestConfig {
        retention_days: None,
        extend_to_now: false,
        ..IngestConfig::default()
    }
}

/// Quick preset with a small store retry delay.
pub fn quick_config() -> EngineConfig {
    let mut config = EngineConfig::quick();
    config.ingest = ingest_config();
    config.jobs.retry_backoff_ms = 1;
    config
}

/// A grid whose three columns are derived from one value per period.
///
/// Energy is the value itself and peak is twice the value.
pub fn grid(granularity: Granularity, start: &str, values: &[f64]) -> DemandGrid {
    let mut t = ts(start);
    let points = values
        .iter()
        .map(|&v| {
            let p = DemandPoint {
                timestamp: t,
                avg_power_demand_kw: v,
                energy_demand_kwh: v,
                peak_power_kw: 2.0 * v,
                day_of_week: String::new(),
                month_name: String::new(),
                is_holiday: false,
            };
            t = granularity.next_bucket(t);
            p
        })
        .collect();
    DemandGrid { granularity, points }
}

/// Hourly grid over `days` days with a fixed daily profile peaking at 18:00.
pub fn hourly_profile(days: usize) -> DemandGrid {
    let values: Vec<f64> = (0..days * 24)
        .map(|i| {
            let hour = (i % 24) as f64;
            (10.0 - (hour - 18.0).abs()).max(0.0) + (i / 24 % 7) as f64 * 0.1
        })
        .collect();
    grid(Granularity::Hourly, "2024-01-01 00:00", &values)
}

/// The same KNN parameters for every column.
pub fn knn_params(granularity: Granularity, depth: usize, k: usize, computed_at: &str) -> ParamSet {
    let p = ModelParameters::Knn {
        best_lag_depth: depth,
        best_neighbor_count: k,
    };
    DemandColumn::ALL
        .into_iter()
        .fold(ParamSet::new(granularity, ts(computed_at)), |set, c| set.with(c, p))
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}
