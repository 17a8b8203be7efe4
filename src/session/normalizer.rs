//! Raw record validation and casting.

use chrono::NaiveDateTime;

use crate::config::IngestConfig;
use crate::error::RecordError;
use crate::stage::Stage;
use crate::timegrid::{hours_between, parse_timestamp};

use super::types::{ChargeChoice, KNOWN_FIELDS, RawRecord, Session};

/// Turns one [`RawRecord`] into a validated [`Session`] or a rejection.
///
/// Pure function of the record, the ingest limits, and the reference time
/// `as_of` used for the retention check.
#[derive(Debug, Clone)]
pub struct SessionNormalizer {
    retention_days: Option<u32>,
    max_session_hours: f64,
    as_of: NaiveDateTime,
}

impl SessionNormalizer {
    pub fn new(config: &IngestConfig, as_of: NaiveDateTime) -> Self {
        Self {
            retention_days: config.retention_days,
            max_session_hours: config.max_session_hours,
            as_of,
        }
    }

    /// Validates and casts a single record.
    ///
    /// # Errors
    ///
    /// * `Malformed` - ragged row, unknown key, missing required field, or unparseable value
    /// * `Degenerate` - zero energy, zero peak power, non-positive or over-long duration
    /// * `Expired` - finished before the retention window
    pub fn normalize(&self, record: &RawRecord) -> Result<Session, RecordError> {
        if let Some(defect) = record.defect() {
            return Err(RecordError::malformed("row", defect));
        }
        if let Some(unknown) = record.keys().find(|k| !KNOWN_FIELDS.contains(k)) {
            return Err(RecordError::malformed(unknown, "unknown field"));
        }

        let user_id = required(record, "userId")?.to_string();
        let station_id = required(record, "stationId")?.to_string();
        let start = required_time(record, "startChargeTime")?;
        let finish = required_time(record, "lastUpdate")?;
        let connect = optional_time(record, "connectTime")?.unwrap_or(start);
        let deadline = optional_time(record, "deadline")?;

        let choice_raw = required(record, "choice")?;
        let choice = ChargeChoice::parse(choice_raw).ok_or_else(|| {
            RecordError::malformed(
                "choice",
                format!("expected REGULAR or SCHEDULED, got \"{choice_raw}\""),
            )
        })?;

        let energy_wh = required_number(record, "cumEnergyDelivered_Wh")?;
        if energy_wh < 0.0 {
            return Err(RecordError::malformed(
                "cumEnergyDelivered_Wh",
                "must be >= 0",
            ));
        }

        let duration_hours = match record.get("durationHours") {
            Some(_) => required_number(record, "durationHours")?,
            None => hours_between(start, finish),
        };

        if finish < start {
            return Err(RecordError::Degenerate(
                "lastUpdate precedes startChargeTime".into(),
            ));
        }
        if energy_wh == 0.0 {
            return Err(RecordError::Degenerate("zero energy delivered".into()));
        }
        if duration_hours <= 0.0 {
            return Err(RecordError::Degenerate(format!(
                "non-positive duration {duration_hours:.3} h"
            )));
        }
        if duration_hours > self.max_session_hours {
            return Err(RecordError::Degenerate(format!(
                "duration {duration_hours:.2} h exceeds {:.0} h",
                self.max_session_hours
            )));
        }

        let true_peak_power_w = (energy_wh / duration_hours).round();
        if true_peak_power_w == 0.0 {
            return Err(RecordError::Degenerate("zero peak power".into()));
        }

        if let Some(retention_days) = self.retention_days {
            let age_days = (self.as_of - finish).num_days();
            if age_days > i64::from(retention_days) {
                return Err(RecordError::Expired {
                    age_days,
                    retention_days,
                });
            }
        }

        let overstay_hours = deadline
            .map(|d| hours_between(d, finish).max(0.0))
            .unwrap_or(0.0);

        Ok(Session {
            user_id,
            connect_time: connect,
            start_charge_time: start,
            finish_charge_time: finish,
            deadline,
            cum_energy_delivered_wh: energy_wh,
            duration_hours,
            true_peak_power_w,
            overstay_hours,
            choice,
            vehicle_model: record.get("vehicleModel").unwrap_or("unknown").to_string(),
            station_id,
        })
    }
}

impl<'a> Stage<&'a RawRecord> for SessionNormalizer {
    type Output = Result<Session, RecordError>;

    fn apply(&self, input: &'a RawRecord) -> Self::Output {
        self.normalize(input)
    }
}

fn required<'r>(record: &'r RawRecord, field: &str) -> Result<&'r str, RecordError> {
    record
        .get(field)
        .ok_or_else(|| RecordError::malformed(field, "missing"))
}

fn required_time(record: &RawRecord, field: &str) -> Result<NaiveDateTime, RecordError> {
    let raw = required(record, field)?;
    parse_timestamp(raw)
        .ok_or_else(|| RecordError::malformed(field, format!("invalid timestamp \"{raw}\"")))
}

fn optional_time(record: &RawRecord, field: &str) -> Result<Option<NaiveDateTime>, RecordError> {
    match record.get(field) {
        None => Ok(None),
        Some(_) => required_time(record, field).map(Some),
    }
}

fn required_number(record: &RawRecord, field: &str) -> Result<f64, RecordError> {
    let raw = required(record, field)?;
    let n: f64 = raw
        .parse()
        .map_err(|_| RecordError::malformed(field, format!("expected number, got \"{raw}\"")))?;
    if !n.is_finite() {
        return Err(RecordError::malformed(field, "expected finite number"));
    }
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn as_of() -> NaiveDateTime {
        parse_timestamp("2024-01-10 00:00").unwrap()
    }

    fn normalizer() -> SessionNormalizer {
        SessionNormalizer::new(&IngestConfig::default(), as_of())
    }

    fn record() -> RawRecord {
        RawRecord::new()
            .with("userId", "u-17")
            .with("startChargeTime", "2024-01-01T00:00:00")
            .with("lastUpdate", "2024-01-01T00:17:00")
            .with("cumEnergyDelivered_Wh", "1000")
            .with("durationHours", "0.283")
            .with("choice", "REGULAR")
            .with("stationId", "st-1")
    }

    #[test]
    fn derives_true_peak_power() {
        let s = normalizer().normalize(&record()).unwrap();
        assert_eq!(s.true_peak_power_w, 3534.0);
        assert_eq!(s.finish_charge_time, parse_timestamp("2024-01-01 00:17").unwrap());
        assert_eq!(s.connect_time, s.start_charge_time);
        assert_eq!(s.vehicle_model, "unknown");
        assert_eq!(s.overstay_hours, 0.0);
    }

    #[test]
    fn duration_defaults_to_charge_span() {
        let mut r = record().with("lastUpdate", "2024-01-01T02:00:00");
        r.insert("durationHours", "");
        let s = normalizer().normalize(&r).unwrap();
        assert!((s.duration_hours - 2.0).abs() < 1e-12);
        assert_eq!(s.true_peak_power_w, 500.0);
    }

    #[test]
    fn missing_required_field_is_malformed() {
        let mut r = record();
        r.insert("stationId", "");
        assert!(matches!(
            normalizer().normalize(&r),
            Err(RecordError::Malformed { field, .. }) if field == "stationId"
        ));
    }

    #[test]
    fn non_numeric_energy_is_malformed() {
        let r = record().with("cumEnergyDelivered_Wh", "lots");
        assert!(matches!(
            normalizer().normalize(&r),
            Err(RecordError::Malformed { .. })
        ));
    }

    #[test]
    fn defective_row_is_malformed() {
        let r = record().with_defect("line 3 has 4 fields, header has 7");
        assert!(matches!(
            normalizer().normalize(&r),
            Err(RecordError::Malformed { field, reason }) if field == "row" && reason.contains("4 fields")
        ));
    }

    #[test]
    fn unknown_field_is_malformed() {
        let r = record().with("spaceId", "A-3");
        assert!(matches!(
            normalizer().normalize(&r),
            Err(RecordError::Malformed { field, .. }) if field == "spaceId"
        ));
    }

    #[test]
    fn zero_energy_is_degenerate() {
        let r = record().with("cumEnergyDelivered_Wh", "0");
        assert!(matches!(
            normalizer().normalize(&r),
            Err(RecordError::Degenerate(_))
        ));
    }

    #[test]
    fn rounding_to_zero_power_is_degenerate() {
        let r = record()
            .with("cumEnergyDelivered_Wh", "0.1")
            .with("durationHours", "1.0");
        assert!(matches!(
            normalizer().normalize(&r),
            Err(RecordError::Degenerate(_))
        ));
    }

    #[test]
    fn over_long_session_is_dropped_not_clipped() {
        let r = record()
            .with("lastUpdate", "2024-01-02T01:00:00")
            .with("durationHours", "25");
        assert!(matches!(
            normalizer().normalize(&r),
            Err(RecordError::Degenerate(_))
        ));
    }

    #[test]
    fn old_sessions_expire() {
        let cfg = IngestConfig {
            retention_days: Some(5),
            ..IngestConfig::default()
        };
        let n = SessionNormalizer::new(&cfg, as_of());
        assert!(matches!(
            n.normalize(&record()),
            Err(RecordError::Expired { age_days: 8, .. })
        ));
    }

    #[test]
    fn overstay_past_deadline() {
        let r = record()
            .with("choice", "scheduled")
            .with("deadline", "2024-01-01T00:05:00");
        let s = normalizer().normalize(&r).unwrap();
        assert_eq!(s.choice, ChargeChoice::Scheduled);
        assert!((s.overstay_hours - 0.2).abs() < 1e-9);
    }

    #[test]
    fn finishing_before_deadline_has_no_overstay() {
        let r = record().with("deadline", "2024-01-01T03:00:00");
        let s = normalizer().normalize(&r).unwrap();
        assert_eq!(s.overstay_hours, 0.0);
    }
}
