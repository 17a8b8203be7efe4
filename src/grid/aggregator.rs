//! Five-minute base grid construction from exploded samples.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDateTime};
use tracing::debug;

use crate::session::PowerSample;
use crate::stage::Stage;
use crate::timegrid::{base_step, floor_to_step};

use super::calendar::{HolidayCalendar, day_name, month_name};
use super::types::{DemandGrid, DemandPoint, Granularity};

/// Five-minute buckets per hour: energy (kWh) = power (kW) / 12.
pub const BUCKETS_PER_HOUR: f64 = 12.0;

/// Sums concurrent session samples onto the dense five-minute grid.
///
/// The grid spans from the earliest sample to the latest sample, or to
/// `extend_until` (floored) when that is later. Buckets without samples are
/// explicit zeros.
#[derive(Debug, Clone, Default)]
pub struct GridAggregator {
    extend_until: Option<NaiveDateTime>,
}

impl GridAggregator {
    pub fn new(extend_until: Option<NaiveDateTime>) -> Self {
        Self { extend_until }
    }

    pub fn aggregate(&self, samples: &[PowerSample]) -> DemandGrid {
        let mut sums_w: BTreeMap<NaiveDateTime, f64> = BTreeMap::new();
        for s in samples {
            *sums_w.entry(floor_to_step(s.timestamp)).or_default() += s.power_w;
        }

        let (Some(&start), Some(&last)) = (sums_w.keys().next(), sums_w.keys().next_back()) else {
            return DemandGrid::empty(Granularity::FiveMin);
        };
        let end = self
            .extend_until
            .map(floor_to_step)
            .map_or(last, |until| until.max(last));

        let holidays = HolidayCalendar::for_years(start.year()..=end.year());
        let step = base_step();
        let mut points = Vec::new();
        let mut t = start;
        while t <= end {
            let power_kw = sums_w.get(&t).copied().unwrap_or(0.0) / 1000.0;
            let date = t.date();
            points.push(DemandPoint {
                timestamp: t,
                avg_power_demand_kw: power_kw,
                energy_demand_kwh: power_kw / BUCKETS_PER_HOUR,
                peak_power_kw: power_kw,
                day_of_week: day_name(date).to_string(),
                month_name: month_name(date).to_string(),
                is_holiday: holidays.is_holiday(date),
            });
            t += step;
        }

        debug!(
            samples = samples.len(),
            active_buckets = sums_w.len(),
            buckets = points.len(),
            "aggregated five-minute grid"
        );

        DemandGrid {
            granularity: Granularity::FiveMin,
            points,
        }
    }
}

impl<'a> Stage<&'a [PowerSample]> for GridAggregator {
    type Output = DemandGrid;

    fn apply(&self, input: &'a [PowerSample]) -> Self::Output {
        self.aggregate(input)
    }
}
