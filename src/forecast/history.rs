//! The append-and-merge forecast log.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::grid::{DemandColumn, Granularity};

/// One forecasted value for one column at one period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastRecord {
    pub timestamp: NaiveDateTime,
    pub column: DemandColumn,
    pub value: f64,
    /// Last observed timestamp of the history the forecast was computed from.
    pub issued_at: NaiveDateTime,
}

/// Every forecast ever produced for one granularity, one value per
/// `(column, period)`, ordered by column then timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastHistory {
    pub granularity: Granularity,
    pub records: Vec<ForecastRecord>,
}

impl ForecastHistory {
    pub fn new(granularity: Granularity) -> Self {
        Self {
            granularity,
            records: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn for_column(&self, column: DemandColumn) -> impl Iterator<Item = &ForecastRecord> {
        self.records.iter().filter(move |r| r.column == column)
    }

    /// Returns the history with `incoming` merged in.
    ///
    /// Timestamps are floored to the period start. Where two records share a
    /// `(column, period)`, the one with the later `issued_at` wins; on a tie
    /// the incoming record wins. Merging the same batch twice is a no-op the
    /// second time.
    pub fn merge(&self, incoming: &[ForecastRecord]) -> Self {
        let mut by_key: BTreeMap<(DemandColumn, NaiveDateTime), ForecastRecord> = BTreeMap::new();

        for record in self.records.iter().chain(incoming) {
            let timestamp = self.granularity.bucket_start(record.timestamp);
            let record = ForecastRecord {
                timestamp,
                ..record.clone()
            };
            match by_key.get(&(record.column, timestamp)) {
                Some(existing) if existing.issued_at > record.issued_at => {}
                _ => {
                    by_key.insert((record.column, timestamp), record);
                }
            }
        }

        Self {
            granularity: self.granularity,
            records: by_key.into_values().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timegrid::parse_timestamp;

    fn rec(ts: &str, value: f64, issued: &str) -> ForecastRecord {
        ForecastRecord {
            timestamp: parse_timestamp(ts).unwrap(),
            column: DemandColumn::AvgPower,
            value,
            issued_at: parse_timestamp(issued).unwrap(),
        }
    }

    #[test]
    fn newer_forecast_replaces_overlap() {
        let h = ForecastHistory::new(Granularity::Hourly).merge(&[
            rec("2024-01-02 10:00", 1.0, "2024-01-02 08:00"),
            rec("2024-01-02 11:00", 2.0, "2024-01-02 08:00"),
        ]);
        let h = h.merge(&[
            rec("2024-01-02 11:00", 5.0, "2024-01-02 09:00"),
            rec("2024-01-02 12:00", 6.0, "2024-01-02 09:00"),
        ]);
        let values: Vec<f64> = h.records.iter().map(|r| r.value).collect();
        assert_eq!(values, vec![1.0, 5.0, 6.0]);
    }

    #[test]
    fn stale_replay_does_not_regress() {
        let newer = ForecastHistory::new(Granularity::Hourly)
            .merge(&[rec("2024-01-02 11:00", 5.0, "2024-01-02 09:00")]);
        let replayed = newer.merge(&[rec("2024-01-02 11:00", 2.0, "2024-01-02 08:00")]);
        assert_eq!(replayed, newer);
    }

    #[test]
    fn merge_is_idempotent_under_replay() {
        let batch = [
            rec("2024-01-02 10:00", 1.0, "2024-01-02 08:00"),
            rec("2024-01-02 11:00", 2.0, "2024-01-02 08:00"),
        ];
        let base = ForecastHistory::new(Granularity::Hourly)
            .merge(&[rec("2024-01-02 09:00", 0.5, "2024-01-02 07:00")]);
        let once = base.merge(&batch);
        let twice = once.merge(&batch);
        assert_eq!(once, twice);
    }

    #[test]
    fn timestamps_are_floored_to_period() {
        let h = ForecastHistory::new(Granularity::Hourly)
            .merge(&[rec("2024-01-02 10:35", 1.0, "2024-01-02 08:00")]);
        assert_eq!(h.records[0].timestamp, parse_timestamp("2024-01-02 10:00").unwrap());
    }
}
