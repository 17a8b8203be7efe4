//! Record sources: where raw session records come from.

use std::io;
use std::path::{Path, PathBuf};

use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Weekday};
use rand::{Rng, SeedableRng, rngs::StdRng};
use tracing::{info, warn};

use crate::error::Result;
use crate::session::RawRecord;
use crate::timegrid::format_timestamp;

/// Yields the full snapshot of raw records once per ingestion cycle.
pub trait RecordSource {
    fn fetch(&mut self) -> Result<Vec<RawRecord>>;
}

/// Reads records from a CSV file whose header row names the record keys.
#[derive(Debug, Clone)]
pub struct CsvRecordSource {
    path: PathBuf,
}

impl CsvRecordSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Parses CSV rows into records. Empty cells are left out of the record.
///
/// A row whose width differs from the header is kept as a defective record
/// so the normalizer can count it as malformed.
///
/// # Errors
///
/// Returns a CSV error on unreadable input.
pub fn read_records<R: io::Read>(reader: R) -> Result<Vec<RawRecord>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers = rdr.headers()?.clone();

    let mut records = Vec::new();
    for row in rdr.records() {
        let row = row?;
        let mut record: RawRecord = headers
            .iter()
            .zip(row.iter())
            .filter(|(_, value)| !value.is_empty())
            .collect();
        if row.len() != headers.len() {
            let line = row.position().map_or(0, |p| p.line());
            warn!(line, fields = row.len(), expected = headers.len(), "ragged CSV row");
            record = record.with_defect(format!(
                "line {line} has {} fields, header has {}",
                row.len(),
                headers.len()
            ));
        }
        records.push(record);
    }
    Ok(records)
}

impl RecordSource for CsvRecordSource {
    fn fetch(&mut self) -> Result<Vec<RawRecord>> {
        let file = std::fs::File::open(&self.path)?;
        let records = read_records(file)?;
        info!(path = %self.path.display(), records = records.len(), "read session records");
        Ok(records)
    }
}

/// A fixed in-memory snapshot.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    records: Vec<RawRecord>,
}

impl MemorySource {
    pub fn new(records: Vec<RawRecord>) -> Self {
        Self { records }
    }
}

impl RecordSource for MemorySource {
    fn fetch(&mut self) -> Result<Vec<RawRecord>> {
        Ok(self.records.clone())
    }
}

/// Seeded generator of plausible charging sessions for demos and tests.
///
/// Each station sees a random number of sessions per day (fewer at
/// weekends). Each session samples:
/// - an arrival between 06:00 and 21:00
/// - a dwell time, which sets the deadline of scheduled sessions
/// - the energy wanted, capped at what the charger can deliver in the dwell
///
/// Charging runs at `max_charge_kw` from shortly after arrival until the
/// energy is delivered. Every `fetch` replays the same snapshot.
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    seed: u64,
    end: NaiveDate,
    days: u32,
    stations: u32,
    max_charge_kw: f64,
    energy_kwh_min: f64,
    energy_kwh_max: f64,
    dwell_minutes_min: i64,
    dwell_minutes_max: i64,
}

impl SyntheticSource {
    /// Sessions for the `days` days ending the day before `end`.
    pub fn new(seed: u64, end: NaiveDate, days: u32) -> Self {
        Self {
            seed,
            end,
            days,
            stations: 8,
            max_charge_kw: 7.2,
            energy_kwh_min: 3.0,
            energy_kwh_max: 40.0,
            dwell_minutes_min: 30,
            dwell_minutes_max: 600,
        }
    }

    pub fn with_stations(mut self, stations: u32) -> Self {
        self.stations = stations.max(1);
        self
    }

    pub fn generate(&self) -> Vec<RawRecord> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let first = self.end - Duration::days(i64::from(self.days));
        let mut records = Vec::new();

        for offset in 0..self.days {
            let day = first + Duration::days(i64::from(offset));
            let busiest = match day.weekday() {
                Weekday::Sat | Weekday::Sun => 1,
                _ => 3,
            };
            for station in 0..self.stations {
                for _ in 0..rng.random_range(0..=busiest) {
                    records.push(self.session(&mut rng, day, station));
                }
            }
        }
        records
    }

    fn session(&self, rng: &mut StdRng, day: NaiveDate, station: u32) -> RawRecord {
        let midnight = day.and_time(NaiveTime::MIN);
        let connect = midnight + Duration::minutes(rng.random_range(6 * 60..=21 * 60));
        let dwell = rng.random_range(self.dwell_minutes_min..=self.dwell_minutes_max);
        let deadline = connect + Duration::minutes(dwell);
        let start = connect + Duration::minutes(rng.random_range(0..=10));

        let deliverable_kwh = self.max_charge_kw * (dwell as f64 - 10.0).max(5.0) / 60.0;
        let energy_kwh = rng
            .random_range(self.energy_kwh_min..=self.energy_kwh_max)
            .min(deliverable_kwh);
        let duration_hours = energy_kwh / self.max_charge_kw;
        let finish = start + Duration::seconds((duration_hours * 3600.0).round() as i64);

        let scheduled = rng.random_bool(0.4);
        let mut record = RawRecord::new()
            .with("userId", format!("user-{:03}", rng.random_range(0..200)))
            .with("stationId", format!("station-{station:02}"))
            .with("connectTime", format_timestamp(connect))
            .with("startChargeTime", format_timestamp(start))
            .with("lastUpdate", format_timestamp(finish))
            .with("cumEnergyDelivered_Wh", format!("{:.1}", energy_kwh * 1000.0))
            .with("durationHours", format!("{duration_hours:.4}"))
            .with("choice", if scheduled { "SCHEDULED" } else { "REGULAR" })
            .with("vehicleModel", VEHICLES[rng.random_range(0..VEHICLES.len())]);
        if scheduled {
            record.insert("deadline", format_timestamp(deadline));
        }
        record
    }
}

const VEHICLES: &[&str] = &["Model 3", "Bolt", "Leaf", "Ioniq 5", "ID.4", "Mach-E"];

impl RecordSource for SyntheticSource {
    fn fetch(&mut self) -> Result<Vec<RawRecord>> {
        let records = self.generate();
        info!(
            seed = self.seed,
            days = self.days,
            records = records.len(),
            "generated synthetic session records"
        );
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IngestConfig;
    use crate::session::SessionNormalizer;
    use crate::timegrid::parse_timestamp;

    #[test]
    fn csv_headers_become_keys_and_empty_cells_are_absent() {
        let data = "userId,stationId,deadline,choice\nu1,s1,,REGULAR\n";
        let records = read_records(data.as_bytes()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("userId"), Some("u1"));
        assert_eq!(records[0].get("deadline"), None);
        assert_eq!(records[0].keys().count(), 3);
    }

    #[test]
    fn ragged_rows_become_defective_records() {
        let data = "userId,stationId,choice\nu1,s1,REGULAR\nu2,s1\nu3,s1,REGULAR,extra\nu4,s2,SCHEDULED\n";
        let records = read_records(data.as_bytes()).unwrap();
        assert_eq!(records.len(), 4);
        assert_eq!(records[0].defect(), None);
        assert!(records[1].defect().unwrap().contains("has 2 fields"));
        assert!(records[2].defect().unwrap().contains("has 4 fields"));
        assert_eq!(records[3].defect(), None);
        assert_eq!(records[3].get("choice"), Some("SCHEDULED"));
    }

    #[test]
    fn synthetic_source_is_reproducible() {
        let end = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let a = SyntheticSource::new(7, end, 14).generate();
        let b = SyntheticSource::new(7, end, 14).generate();
        let c = SyntheticSource::new(8, end, 14).generate();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(!a.is_empty());
    }

    #[test]
    fn synthetic_sessions_normalize() {
        let end = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let as_of = parse_timestamp("2024-03-01 00:00").unwrap();
        let normalizer = SessionNormalizer::new(&IngestConfig::default(), as_of);
        for record in SyntheticSource::new(3, end, 10).generate() {
            let session = normalizer.normalize(&record).unwrap();
            assert!(session.duration_hours <= 24.0);
            assert!(session.start_charge_time < as_of);
        }
    }

    #[test]
    fn memory_source_replays() {
        let mut src = MemorySource::new(vec![RawRecord::new().with("userId", "u")]);
        assert_eq!(src.fetch().unwrap(), src.fetch().unwrap());
    }
}
