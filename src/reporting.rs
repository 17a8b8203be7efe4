use std::fmt;

use crate::error::RecordError;
use crate::grid::GridSet;

/// Per-run ingestion counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub records: usize,
    pub accepted: usize,
    pub malformed: usize,
    pub degenerate: usize,
    pub expired: usize,
    pub samples: usize,
    /// No usable sessions arrived and the prior snapshot was kept.
    pub reused_prior: bool,
}

impl IngestReport {
    pub fn reject(&mut self, error: &RecordError) {
        match error {
            RecordError::Malformed { .. } => self.malformed += 1,
            RecordError::Degenerate(_) => self.degenerate += 1,
            RecordError::Expired { .. } => self.expired += 1,
        }
    }

    pub fn rejected(&self) -> usize {
        self.malformed + self.degenerate + self.expired
    }
}

impl fmt::Display for IngestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Ingest Report ---")?;
        writeln!(f, "Records read: {}", self.records)?;
        writeln!(f, "Sessions accepted: {}", self.accepted)?;
        writeln!(
            f,
            "Dropped: {} malformed, {} degenerate, {} expired",
            self.malformed, self.degenerate, self.expired
        )?;
        writeln!(f, "Power samples: {}", self.samples)?;
        if self.reused_prior {
            writeln!(f, "No usable sessions; prior grids kept")?;
        }
        Ok(())
    }
}

pub fn print_grid_summary(grids: &GridSet) {
    println!("\n--- Demand Grids ---");
    for grid in grids.iter() {
        let peak = grid
            .points
            .iter()
            .map(|p| p.peak_power_kw)
            .fold(0.0_f64, f64::max);
        let energy: f64 = grid.points.iter().map(|p| p.energy_demand_kwh).sum();
        println!(
            "{:<10} {:>7} rows  peak {:>8.2} kW  energy {:>10.2} kWh",
            grid.granularity.to_string(),
            grid.len(),
            peak,
            energy
        );
    }
}
