//! Roll-up of the five-minute grid into coarser granularities.

use crate::stage::Stage;

use super::types::{AggRule, DemandGrid, DemandPoint, Granularity, GridSet};

/// Rolls a five-minute grid up into one target granularity.
///
/// Peak power for a period is the largest five-minute average power inside
/// it; five minutes is the finest resolution the session data supports.
#[derive(Debug, Clone, Copy)]
pub struct GranularityResampler {
    target: Granularity,
}

impl GranularityResampler {
    pub fn new(target: Granularity) -> Self {
        Self { target }
    }

    pub fn target(&self) -> Granularity {
        self.target
    }

    pub fn resample(&self, base: &DemandGrid) -> DemandGrid {
        if self.target == base.granularity {
            return base.clone();
        }

        let rules = self.target.rules();
        let mut points = Vec::new();
        let mut rest = base.points.as_slice();

        while let Some(first) = rest.first() {
            let bucket = self.target.bucket_start(first.timestamp);
            let len = rest
                .iter()
                .position(|p| self.target.bucket_start(p.timestamp) != bucket)
                .unwrap_or(rest.len());
            let (group, tail) = rest.split_at(len);

            let avg: Vec<f64> = group.iter().map(|p| p.avg_power_demand_kw).collect();
            let energy: Vec<f64> = group.iter().map(|p| p.energy_demand_kwh).collect();
            let peak: Vec<f64> = group.iter().map(|p| p.peak_power_kw).collect();
            let calendar = &group[calendar_index(rules.calendar, group)];

            points.push(DemandPoint {
                timestamp: bucket,
                avg_power_demand_kw: rules.avg_power.apply(&avg),
                energy_demand_kwh: rules.energy.apply(&energy),
                peak_power_kw: rules.peak_power.apply(&peak),
                day_of_week: calendar.day_of_week.clone(),
                month_name: calendar.month_name.clone(),
                is_holiday: calendar.is_holiday,
            });
            rest = tail;
        }

        DemandGrid {
            granularity: self.target,
            points,
        }
    }

    /// Derives every granularity from one five-minute grid.
    pub fn resample_all(base: &DemandGrid) -> GridSet {
        GridSet {
            five_min: base.clone(),
            hourly: Self::new(Granularity::Hourly).resample(base),
            daily: Self::new(Granularity::Daily).resample(base),
            monthly: Self::new(Granularity::Monthly).resample(base),
        }
    }
}

/// Calendar fields are categorical: only `First` is meaningful, anything else takes the last row.
fn calendar_index(rule: AggRule, group: &[DemandPoint]) -> usize {
    match rule {
        AggRule::First => 0,
        _ => group.len() - 1,
    }
}

impl<'a> Stage<&'a DemandGrid> for GranularityResampler {
    type Output = DemandGrid;

    fn apply(&self, input: &'a DemandGrid) -> Self::Output {
        self.resample(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::aggregator::GridAggregator;
    use crate::session::PowerSample;
    use crate::timegrid::parse_timestamp;

    fn base_grid() -> DemandGrid {
        // 00:00-00:55 at 12 kW, 01:00-01:25 at 6 kW then 01:30 at 24 kW.
        let mut samples = Vec::new();
        for m in (0..60).step_by(5) {
            samples.push(PowerSample {
                timestamp: parse_timestamp(&format!("2024-01-01 00:{m:02}")).unwrap(),
                power_w: 12_000.0,
            });
        }
        for m in (0..30).step_by(5) {
            samples.push(PowerSample {
                timestamp: parse_timestamp(&format!("2024-01-01 01:{m:02}")).unwrap(),
                power_w: 6_000.0,
            });
        }
        samples.push(PowerSample {
            timestamp: parse_timestamp("2024-01-01 01:30").unwrap(),
            power_w: 24_000.0,
        });
        GridAggregator::default().aggregate(&samples)
    }

    #[test]
    fn hourly_rules() {
        let hourly = GranularityResampler::new(Granularity::Hourly).resample(&base_grid());
        assert_eq!(hourly.len(), 2);
        let h0 = &hourly.points[0];
        assert!((h0.avg_power_demand_kw - 12.0).abs() < 1e-9);
        assert!((h0.energy_demand_kwh - 12.0).abs() < 1e-9);
        assert_eq!(h0.peak_power_kw, 12.0);

        let h1 = &hourly.points[1];
        // seven buckets: six at 6 kW, one at 24 kW
        assert!((h1.avg_power_demand_kw - 60.0 / 7.0).abs() < 1e-9);
        assert!((h1.energy_demand_kwh - 5.0).abs() < 1e-9);
        assert_eq!(h1.peak_power_kw, 24.0);
        assert_eq!(h1.day_of_week, "Monday");
    }

    #[test]
    fn resampling_is_idempotent() {
        let base = base_grid();
        let r = GranularityResampler::new(Granularity::Hourly);
        assert_eq!(r.resample(&base), r.resample(&base));
    }

    #[test]
    fn daily_and_monthly_collapse_to_one_bucket() {
        let set = GranularityResampler::resample_all(&base_grid());
        assert_eq!(set.daily.len(), 1);
        assert_eq!(set.monthly.len(), 1);
        assert_eq!(
            set.monthly.points[0].timestamp,
            parse_timestamp("2024-01-01 00:00").unwrap()
        );
        let total_energy: f64 = set.five_min.column(crate::grid::DemandColumn::Energy).iter().sum();
        assert!((set.daily.points[0].energy_demand_kwh - total_energy).abs() < 1e-9);
    }

    #[test]
    fn output_grids_are_dense() {
        let set = GranularityResampler::resample_all(&base_grid());
        assert!(set.iter().all(DemandGrid::is_dense));
    }
}
