//! TOML-based engine configuration and preset definitions.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::grid::Granularity;

/// Top-level engine configuration parsed from TOML.
///
/// All fields have defaults matching the production schedule. Load from
/// TOML with [`EngineConfig::from_toml_file`] or use
/// [`EngineConfig::from_preset`] for a built-in profile.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Record normalization limits.
    pub ingest: IngestConfig,
    /// Per-granularity forecast settings.
    pub forecast: ForecastConfig,
    /// Hyperparameter search settings.
    pub validation: ValidationConfig,
    /// Artifact store location.
    pub store: StoreConfig,
    /// Scheduled job behaviour.
    pub jobs: JobsConfig,
}

/// Record normalization limits.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IngestConfig {
    /// Sessions finishing more than this many days before `as_of` are dropped.
    /// Absent means keep everything.
    pub retention_days: Option<u32>,
    /// Longest plausible session (hours). Longer sessions are dropped, not clipped.
    pub max_session_hours: f64,
    /// Pad the five-minute grid with zeros up to `as_of`.
    pub extend_to_now: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            retention_days: Some(1095),
            max_session_hours: 24.0,
            extend_to_now: true,
        }
    }
}

/// Forecasting strategy selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// k-nearest-neighbour regression over seasonal lags.
    Knn,
    /// Seasonal ARIMA.
    Seasonal,
}

/// Resolved forecast settings for one granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HorizonConfig {
    /// Which model family produces this forecast.
    pub strategy: StrategyKind,
    /// Number of future periods per forecast run.
    pub horizon: usize,
}

/// `[forecast.hourly]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HourlyForecastConfig {
    pub strategy: StrategyKind,
    pub horizon: usize,
}

impl Default for HourlyForecastConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::Knn,
            horizon: 24,
        }
    }
}

/// `[forecast.daily]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DailyForecastConfig {
    pub strategy: StrategyKind,
    pub horizon: usize,
}

impl Default for DailyForecastConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::Seasonal,
            horizon: 7,
        }
    }
}

/// Per-granularity forecast settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ForecastConfig {
    pub hourly: HourlyForecastConfig,
    pub daily: DailyForecastConfig,
}

impl ForecastConfig {
    pub fn hourly(&self) -> HorizonConfig {
        HorizonConfig {
            strategy: self.hourly.strategy,
            horizon: self.hourly.horizon,
        }
    }

    pub fn daily(&self) -> HorizonConfig {
        HorizonConfig {
            strategy: self.daily.strategy,
            horizon: self.daily.horizon,
        }
    }

    /// Sub-daily grids follow the hourly settings, the rest the daily ones.
    pub fn for_granularity(&self, granularity: Granularity) -> HorizonConfig {
        match granularity {
            Granularity::FiveMin | Granularity::Hourly => self.hourly(),
            Granularity::Daily | Granularity::Monthly => self.daily(),
        }
    }
}

/// Grid bounds for the nearest-neighbour search.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KnnSearchConfig {
    pub neighbors_min: usize,
    pub neighbors_max: usize,
    pub neighbors_step: usize,
    /// Lag depth in seasonal periods (days for hourly data).
    pub lag_depth_min: usize,
    pub lag_depth_max: usize,
    pub lag_depth_step: usize,
    /// Share of the lag matrix held out as the final test block.
    pub test_ratio: f64,
    /// Share of the remaining rows used as the validation fold.
    pub validation_ratio: f64,
}

impl Default for KnnSearchConfig {
    fn default() -> Self {
        Self {
            neighbors_min: 10,
            neighbors_max: 50,
            neighbors_step: 10,
            lag_depth_min: 40,
            lag_depth_max: 60,
            lag_depth_step: 10,
            test_ratio: 0.2,
            validation_ratio: 0.2,
        }
    }
}

/// Bounds for the stepwise seasonal order search.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SeasonalSearchConfig {
    pub max_p: usize,
    pub max_q: usize,
    #[serde(rename = "max_P")]
    pub max_seasonal_p: usize,
    #[serde(rename = "max_Q")]
    pub max_seasonal_q: usize,
    /// Nelder-Mead iteration cap per candidate fit.
    pub max_iterations: usize,
    /// Share of the series held out to score the selected order.
    pub test_ratio: f64,
}

impl Default for SeasonalSearchConfig {
    fn default() -> Self {
        Self {
            max_p: 3,
            max_q: 3,
            max_seasonal_p: 2,
            max_seasonal_q: 2,
            max_iterations: 400,
            test_ratio: 0.2,
        }
    }
}

/// Hyperparameter search settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ValidationConfig {
    /// Parameters older than this are recomputed before forecasting.
    pub refresh_days: u32,
    pub knn: KnnSearchConfig,
    pub seasonal: SeasonalSearchConfig,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            refresh_days: 30,
            knn: KnnSearchConfig::default(),
            seasonal: SeasonalSearchConfig::default(),
        }
    }
}

/// Artifact store location.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    pub dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("artifacts"),
        }
    }
}

/// Scheduled job behaviour.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JobsConfig {
    /// Total attempts for a job failing with a retryable store error.
    pub retry_attempts: u32,
    /// Delay before the first retry; grows linearly per attempt.
    pub retry_backoff_ms: u64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            retry_attempts: 3,
            retry_backoff_ms: 500,
        }
    }
}

/// Configuration error with field path and constraint description.
#[derive(Debug)]
pub struct ConfigError {
    /// Dotted field path (e.g., `"validation.knn.neighbors_min"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "config error: {}: {}", self.field, self.message)
    }
}

impl EngineConfig {
    /// Short search ranges for small datasets and demos.
    pub fn quick() -> Self {
        Self {
            validation: ValidationConfig {
                knn: KnnSearchConfig {
                    neighbors_min: 3,
                    neighbors_max: 9,
                    neighbors_step: 3,
                    lag_depth_min: 3,
                    lag_depth_max: 7,
                    lag_depth_step: 2,
                    ..KnnSearchConfig::default()
                },
                seasonal: SeasonalSearchConfig {
                    max_p: 2,
                    max_q: 2,
                    max_seasonal_p: 1,
                    max_seasonal_q: 1,
                    max_iterations: 200,
                    ..SeasonalSearchConfig::default()
                },
                ..ValidationConfig::default()
            },
            ..Self::default()
        }
    }

    /// Available preset names.
    pub const PRESETS: &[&str] = &["default", "quick"];

    /// Loads a configuration from a named preset.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the preset name is unknown.
    pub fn from_preset(name: &str) -> Result<Self, ConfigError> {
        match name {
            "default" => Ok(Self::default()),
            "quick" => Ok(Self::quick()),
            _ => Err(ConfigError {
                field: "preset".to_string(),
                message: format!(
                    "unknown preset \"{name}\", available: {}",
                    Self::PRESETS.join(", ")
                ),
            }),
        }
    }

    /// Parses a configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError {
            field: "config".to_string(),
            message: format!("cannot read \"{}\": {e}", path.display()),
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses a configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError {
            field: "toml".to_string(),
            message: e.to_string(),
        })
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if configuration is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let mut check = |ok: bool, field: &str, message: &str| {
            if !ok {
                errors.push(ConfigError {
                    field: field.into(),
                    message: message.into(),
                });
            }
        };

        let i = &self.ingest;
        check(
            i.max_session_hours > 0.0,
            "ingest.max_session_hours",
            "must be > 0",
        );
        check(
            i.retention_days != Some(0),
            "ingest.retention_days",
            "must be > 0 when set",
        );

        check(
            self.forecast.hourly.horizon > 0,
            "forecast.hourly.horizon",
            "must be > 0",
        );
        check(
            self.forecast.daily.horizon > 0,
            "forecast.daily.horizon",
            "must be > 0",
        );

        let k = &self.validation.knn;
        check(
            k.neighbors_min > 0,
            "validation.knn.neighbors_min",
            "must be > 0",
        );
        check(
            k.neighbors_min <= k.neighbors_max,
            "validation.knn.neighbors_min",
            "must be <= validation.knn.neighbors_max",
        );
        check(
            k.neighbors_step > 0,
            "validation.knn.neighbors_step",
            "must be > 0",
        );
        check(
            k.lag_depth_min > 0,
            "validation.knn.lag_depth_min",
            "must be > 0",
        );
        check(
            k.lag_depth_min <= k.lag_depth_max,
            "validation.knn.lag_depth_min",
            "must be <= validation.knn.lag_depth_max",
        );
        check(
            k.lag_depth_step > 0,
            "validation.knn.lag_depth_step",
            "must be > 0",
        );
        check(
            k.test_ratio > 0.0 && k.test_ratio < 1.0,
            "validation.knn.test_ratio",
            "must be in (0.0, 1.0)",
        );
        check(
            k.validation_ratio > 0.0 && k.validation_ratio < 1.0,
            "validation.knn.validation_ratio",
            "must be in (0.0, 1.0)",
        );

        check(
            self.validation.seasonal.max_iterations > 0,
            "validation.seasonal.max_iterations",
            "must be > 0",
        );
        let t = self.validation.seasonal.test_ratio;
        check(
            t > 0.0 && t < 1.0,
            "validation.seasonal.test_ratio",
            "must be in (0.0, 1.0)",
        );
        check(
            self.validation.refresh_days > 0,
            "validation.refresh_days",
            "must be > 0",
        );
        check(self.jobs.retry_attempts > 0, "jobs.retry_attempts", "must be > 0");

        errors
    }
}
