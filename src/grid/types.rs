//! Demand grid types: granularities, aggregation rules, points, and grids.

use std::fmt;

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::timegrid::{base_step, floor_to_day, floor_to_hour, floor_to_month, floor_to_step, next_month};

/// A fixed reporting resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Granularity {
    FiveMin,
    Hourly,
    Daily,
    Monthly,
}

impl Granularity {
    pub const ALL: [Granularity; 4] = [Self::FiveMin, Self::Hourly, Self::Daily, Self::Monthly];

    /// Start of the period containing `ts`.
    pub fn bucket_start(self, ts: NaiveDateTime) -> NaiveDateTime {
        match self {
            Self::FiveMin => floor_to_step(ts),
            Self::Hourly => floor_to_hour(ts),
            Self::Daily => floor_to_day(ts),
            Self::Monthly => floor_to_month(ts),
        }
    }

    /// Start of the period after the one beginning at `start`.
    pub fn next_bucket(self, start: NaiveDateTime) -> NaiveDateTime {
        match self {
            Self::FiveMin => start + base_step(),
            Self::Hourly => start + Duration::hours(1),
            Self::Daily => start + Duration::days(1),
            Self::Monthly => next_month(start),
        }
    }

    /// Samples per day, used as the seasonal lag period. Daily and coarser use 1.
    pub fn lag_period(self) -> usize {
        match self {
            Self::FiveMin => 288,
            Self::Hourly => 24,
            Self::Daily | Self::Monthly => 1,
        }
    }

    /// Per-column aggregation rules when rolling up into this granularity.
    pub fn rules(self) -> ColumnRules {
        RESAMPLE_RULES
    }

    fn stem(self) -> &'static str {
        match self {
            Self::FiveMin => "fiveminute",
            Self::Hourly => "hourly",
            Self::Daily => "daily",
            Self::Monthly => "monthly",
        }
    }

    /// Artifact name of the demand grid, e.g. `"hourlydemand"`.
    pub fn demand_key(self) -> String {
        format!("{}demand", self.stem())
    }

    /// Artifact name of the forecast history, e.g. `"dailyforecasts"`.
    pub fn forecast_key(self) -> String {
        format!("{}forecasts", self.stem())
    }

    /// Artifact name of the model parameters, e.g. `"hourlyparams"`.
    pub fn params_key(self) -> String {
        format!("{}params", self.stem())
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.stem())
    }
}

/// How a column collapses when several rows fall into one period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggRule {
    Mean,
    Sum,
    Max,
    First,
}

impl AggRule {
    /// Aggregates a non-empty slice. Returns 0.0 for an empty one.
    pub fn apply(self, values: &[f64]) -> f64 {
        if values.is_empty() {
            return 0.0;
        }
        match self {
            Self::Mean => values.iter().sum::<f64>() / values.len() as f64,
            Self::Sum => values.iter().sum(),
            Self::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Self::First => values[0],
        }
    }
}

/// Aggregation rule per field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnRules {
    pub avg_power: AggRule,
    pub energy: AggRule,
    pub peak_power: AggRule,
    pub calendar: AggRule,
}

const RESAMPLE_RULES: ColumnRules = ColumnRules {
    avg_power: AggRule::Mean,
    energy: AggRule::Sum,
    peak_power: AggRule::Max,
    calendar: AggRule::First,
};

/// A forecastable grid column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DemandColumn {
    #[serde(rename = "avgPowerDemand_kW")]
    AvgPower,
    #[serde(rename = "energyDemand_kWh")]
    Energy,
    #[serde(rename = "peakPower_kW")]
    PeakPower,
}

impl DemandColumn {
    pub const ALL: [DemandColumn; 3] = [Self::AvgPower, Self::Energy, Self::PeakPower];

    pub fn name(self) -> &'static str {
        match self {
            Self::AvgPower => "avgPowerDemand_kW",
            Self::Energy => "energyDemand_kWh",
            Self::PeakPower => "peakPower_kW",
        }
    }

    pub fn value(self, point: &DemandPoint) -> f64 {
        match self {
            Self::AvgPower => point.avg_power_demand_kw,
            Self::Energy => point.energy_demand_kwh,
            Self::PeakPower => point.peak_power_kw,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == s)
    }
}

impl fmt::Display for DemandColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One timestamped sample on a fixed grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemandPoint {
    pub timestamp: NaiveDateTime,
    #[serde(rename = "avgPowerDemand_kW")]
    pub avg_power_demand_kw: f64,
    #[serde(rename = "energyDemand_kWh")]
    pub energy_demand_kwh: f64,
    #[serde(rename = "peakPower_kW")]
    pub peak_power_kw: f64,
    #[serde(rename = "dayOfWeek")]
    pub day_of_week: String,
    #[serde(rename = "monthName")]
    pub month_name: String,
    #[serde(rename = "isHoliday")]
    pub is_holiday: bool,
}

/// A dense, strictly increasing series of points at one granularity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemandGrid {
    pub granularity: Granularity,
    pub points: Vec<DemandPoint>,
}

impl DemandGrid {
    pub fn empty(granularity: Granularity) -> Self {
        Self {
            granularity,
            points: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn last_timestamp(&self) -> Option<NaiveDateTime> {
        self.points.last().map(|p| p.timestamp)
    }

    pub fn timestamps(&self) -> Vec<NaiveDateTime> {
        self.points.iter().map(|p| p.timestamp).collect()
    }

    /// Values of one column in time order.
    pub fn column(&self, column: DemandColumn) -> Vec<f64> {
        self.points.iter().map(|p| column.value(p)).collect()
    }

    /// Whether every consecutive pair is exactly one period apart.
    pub fn is_dense(&self) -> bool {
        self.points
            .windows(2)
            .all(|w| self.granularity.next_bucket(w[0].timestamp) == w[1].timestamp)
    }
}

/// One independently derived grid per granularity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSet {
    pub five_min: DemandGrid,
    pub hourly: DemandGrid,
    pub daily: DemandGrid,
    pub monthly: DemandGrid,
}

impl GridSet {
    pub fn get(&self, granularity: Granularity) -> &DemandGrid {
        match granularity {
            Granularity::FiveMin => &self.five_min,
            Granularity::Hourly => &self.hourly,
            Granularity::Daily => &self.daily,
            Granularity::Monthly => &self.monthly,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &DemandGrid> {
        [&self.five_min, &self.hourly, &self.daily, &self.monthly].into_iter()
    }
}
