//! CSV export for demand grids and forecast histories.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::forecast::ForecastHistory;
use crate::grid::{DemandGrid, GridSet};
use crate::timegrid::format_timestamp;

/// Column header for grid exports.
const GRID_HEADER: &str = "timestamp,avgPowerDemand_kW,energyDemand_kWh,peakPower_kW,\
                           dayOfWeek,monthName,isHoliday";

/// Column header for forecast history exports.
const FORECAST_HEADER: &str = "timestamp,column,value,issuedAt";

/// Writes one grid as CSV, one row per point in time order.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_grid_csv(grid: &DemandGrid, writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);
    wtr.write_record(GRID_HEADER.split(',').map(str::trim))?;

    for p in &grid.points {
        wtr.write_record(&[
            format_timestamp(p.timestamp),
            format!("{:.6}", p.avg_power_demand_kw),
            format!("{:.6}", p.energy_demand_kwh),
            format!("{:.6}", p.peak_power_kw),
            p.day_of_week.clone(),
            p.month_name.clone(),
            p.is_holiday.to_string(),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

/// Writes a forecast history as CSV in its canonical `(column, timestamp)` order.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_forecast_csv(history: &ForecastHistory, writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);
    wtr.write_record(FORECAST_HEADER.split(','))?;

    for r in &history.records {
        wtr.write_record(&[
            format_timestamp(r.timestamp),
            r.column.name().to_string(),
            format!("{:.6}", r.value),
            format_timestamp(r.issued_at),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

fn create(dir: &Path, name: &str) -> io::Result<(PathBuf, io::BufWriter<File>)> {
    let path = dir.join(format!("{name}.csv"));
    let file = File::create(&path)?;
    Ok((path, io::BufWriter::new(file)))
}

/// Writes every grid and forecast history under `dir`, named by artifact key.
///
/// Returns the written paths.
///
/// # Errors
///
/// Returns an `io::Error` if the directory or any file cannot be written.
pub fn export_all(
    dir: &Path,
    grids: &GridSet,
    histories: &[ForecastHistory],
) -> io::Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;
    let mut written = Vec::new();

    for grid in grids.iter() {
        let (path, buf) = create(dir, &grid.granularity.demand_key())?;
        write_grid_csv(grid, buf)?;
        written.push(path);
    }
    for history in histories {
        let (path, buf) = create(dir, &history.granularity.forecast_key())?;
        write_forecast_csv(history, buf)?;
        written.push(path);
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecast::ForecastRecord;
    use crate::grid::{DemandColumn, DemandPoint, Granularity};
    use crate::timegrid::parse_timestamp;

    fn point(ts: &str, kw: f64) -> DemandPoint {
        DemandPoint {
            timestamp: parse_timestamp(ts).unwrap(),
            avg_power_demand_kw: kw,
            energy_demand_kwh: kw / 12.0,
            peak_power_kw: kw,
            day_of_week: "Monday".to_string(),
            month_name: "January".to_string(),
            is_holiday: false,
        }
    }

    fn grid(n: usize) -> DemandGrid {
        let start = parse_timestamp("2024-01-01 00:00").unwrap();
        DemandGrid {
            granularity: Granularity::FiveMin,
            points: (0..n)
                .map(|i| {
                    let ts = start + chrono::Duration::minutes(5 * i as i64);
                    point(&format_timestamp(ts), i as f64)
                })
                .collect(),
        }
    }

    #[test]
    fn grid_header_and_row_count() {
        let mut buf = Vec::new();
        write_grid_csv(&grid(24), &mut buf).unwrap();
        let output = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(
            lines[0],
            "timestamp,avgPowerDemand_kW,energyDemand_kWh,peakPower_kW,dayOfWeek,monthName,isHoliday"
        );
        assert_eq!(lines.len(), 25);
        assert!(lines[1].starts_with("2024-01-01 00:00:00,0.000000,"));
    }

    #[test]
    fn grid_export_is_deterministic() {
        let (mut a, mut b) = (Vec::new(), Vec::new());
        write_grid_csv(&grid(5), &mut a).unwrap();
        write_grid_csv(&grid(5), &mut b).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn forecast_rows_parse_back() {
        let issued = parse_timestamp("2024-01-02 00:00").unwrap();
        let history = ForecastHistory::new(Granularity::Hourly).merge(&[ForecastRecord {
            timestamp: parse_timestamp("2024-01-02 01:00").unwrap(),
            column: DemandColumn::PeakPower,
            value: 3.5,
            issued_at: issued,
        }]);
        let mut buf = Vec::new();
        write_forecast_csv(&history, &mut buf).unwrap();

        let mut rdr = csv::Reader::from_reader(buf.as_slice());
        assert_eq!(rdr.headers().unwrap().len(), 4);
        let rows: Vec<csv::StringRecord> = rdr.records().map(Result::unwrap).collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(&rows[0][1], "peakPower_kW");
        assert_eq!(rows[0][2].parse::<f64>().unwrap(), 3.5);
        assert_eq!(&rows[0][3], "2024-01-02 00:00:00");
    }

    #[test]
    fn export_all_names_files_by_artifact_key() {
        let dir = tempfile::tempdir().unwrap();
        let grids = GridSet {
            five_min: grid(3),
            hourly: DemandGrid::empty(Granularity::Hourly),
            daily: DemandGrid::empty(Granularity::Daily),
            monthly: DemandGrid::empty(Granularity::Monthly),
        };
        let written = export_all(
            dir.path(),
            &grids,
            &[ForecastHistory::new(Granularity::Daily)],
        )
        .unwrap();
        assert_eq!(written.len(), 5);
        assert!(dir.path().join("fiveminutedemand.csv").exists());
        assert!(dir.path().join("dailyforecasts.csv").exists());
    }
}
