//! Key-value artifact store for grids, forecast histories, and parameters.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::forecast::{ForecastHistory, ParamSet};
use crate::grid::{DemandGrid, Granularity, GridSet};

/// One stored snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Artifact {
    Grid(DemandGrid),
    Forecasts(ForecastHistory),
    Params(ParamSet),
}

impl Artifact {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Grid(_) => "grid",
            Self::Forecasts(_) => "forecasts",
            Self::Params(_) => "params",
        }
    }
}

fn wrong(name: &str, expected: &'static str, found: &Artifact) -> EngineError {
    EngineError::WrongArtifact {
        name: name.to_string(),
        expected,
        found: found.kind(),
    }
}

/// Named snapshots with whole-value reads and writes.
///
/// A read always sees the latest fully written value. Implementations do not
/// retry; failures to reach the backing store surface as
/// [`EngineError::StoreUnavailable`].
pub trait ArtifactStore: Send + Sync {
    /// # Errors
    ///
    /// [`EngineError::NotFound`] if nothing was stored under `name`.
    fn get(&self, name: &str) -> Result<Artifact>;

    fn set(&self, name: &str, artifact: Artifact) -> Result<()>;

    fn get_grid(&self, granularity: Granularity) -> Result<DemandGrid> {
        let name = granularity.demand_key();
        match self.get(&name)? {
            Artifact::Grid(grid) => Ok(grid),
            other => Err(wrong(&name, "grid", &other)),
        }
    }

    /// All four grids, or `None` if no ingestion has completed yet.
    fn get_grids(&self) -> Result<Option<GridSet>> {
        let grid = |g| match self.get_grid(g) {
            Ok(grid) => Ok(Some(grid)),
            Err(EngineError::NotFound(_)) => Ok(None),
            Err(err) => Err(err),
        };
        let (Some(five_min), Some(hourly), Some(daily), Some(monthly)) = (
            grid(Granularity::FiveMin)?,
            grid(Granularity::Hourly)?,
            grid(Granularity::Daily)?,
            grid(Granularity::Monthly)?,
        ) else {
            return Ok(None);
        };
        Ok(Some(GridSet {
            five_min,
            hourly,
            daily,
            monthly,
        }))
    }

    fn set_grids(&self, grids: &GridSet) -> Result<()> {
        for grid in grids.iter() {
            self.set(&grid.granularity.demand_key(), Artifact::Grid(grid.clone()))?;
        }
        Ok(())
    }

    /// The stored forecast history, or an empty one on first use.
    fn get_forecasts(&self, granularity: Granularity) -> Result<ForecastHistory> {
        let name = granularity.forecast_key();
        match self.get(&name) {
            Ok(Artifact::Forecasts(history)) => Ok(history),
            Ok(other) => Err(wrong(&name, "forecasts", &other)),
            Err(EngineError::NotFound(_)) => Ok(ForecastHistory::new(granularity)),
            Err(err) => Err(err),
        }
    }

    fn set_forecasts(&self, history: &ForecastHistory) -> Result<()> {
        self.set(
            &history.granularity.forecast_key(),
            Artifact::Forecasts(history.clone()),
        )
    }

    /// # Errors
    ///
    /// [`EngineError::NoCachedParameters`] if validation has never run for
    /// this granularity.
    fn get_params(&self, granularity: Granularity) -> Result<ParamSet> {
        let name = granularity.params_key();
        match self.get(&name) {
            Ok(Artifact::Params(params)) => Ok(params),
            Ok(other) => Err(wrong(&name, "params", &other)),
            Err(EngineError::NotFound(_)) => Err(EngineError::NoCachedParameters(name)),
            Err(err) => Err(err),
        }
    }

    fn set_params(&self, params: &ParamSet) -> Result<()> {
        self.set(&params.granularity.params_key(), Artifact::Params(params.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timegrid::parse_timestamp;

    #[test]
    fn typed_getters_check_kind() {
        let store = MemoryStore::new();
        store
            .set("hourlydemand", Artifact::Forecasts(ForecastHistory::new(Granularity::Hourly)))
            .unwrap();
        assert!(matches!(
            store.get_grid(Granularity::Hourly),
            Err(EngineError::WrongArtifact { expected: "grid", found: "forecasts", .. })
        ));
    }

    #[test]
    fn first_use_defaults() {
        let store = MemoryStore::new();
        assert!(store.get_forecasts(Granularity::Daily).unwrap().is_empty());
        assert!(store.get_grids().unwrap().is_none());
        assert!(matches!(
            store.get_params(Granularity::Hourly),
            Err(EngineError::NoCachedParameters(name)) if name == "hourlyparams"
        ));
    }

    #[test]
    fn params_round_trip() {
        let store = MemoryStore::new();
        let params = ParamSet::new(Granularity::Daily, parse_timestamp("2024-02-01 00:00").unwrap());
        store.set_params(&params).unwrap();
        assert_eq!(store.get_params(Granularity::Daily).unwrap(), params);
    }

    #[test]
    fn artifact_json_is_tagged() {
        let a = Artifact::Params(ParamSet::new(
            Granularity::Hourly,
            parse_timestamp("2024-02-01 00:00").unwrap(),
        ));
        let json = serde_json::to_string(&a).unwrap();
        assert!(json.starts_with("{\"kind\":\"params\""));
    }
}
