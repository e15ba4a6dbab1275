//! # Run Configuration
//!
//! Loads the run configuration from a TOML file (`tide-tiler.toml` by default).
//! Three sections:
//!
//! - `[prediction]`: time range, sampling, fields and post-processing
//! - `[tiles]`: boundary sources per level, exclusions, target level
//! - `[run]`: workers, static constituent table, point sources, output directory
//!
//! A loaded configuration is checked with [`RunConfig::validate`], which also
//! yields the prediction [`Timeline`].

use crate::error::ConfigurationError;
use crate::predictor::{
    SeriesOptions, ADHOC_CHART_DATUM_CORR_FACTOR, DEFAULT_TREND_THRESHOLD,
    TREND_MAX_INCREMENT_SECONDS,
};
use crate::tiles::{Level, Rect};
use crate::timeline::{Timeline, DEFAULT_TIME_INCREMENT_SECONDS, SECONDS_PER_DAY};
use crate::{Epoch, Field};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub const DEFAULT_CONFIG_PATH: &str = "tide-tiler.toml";

/// 2024-01-01T00:00:00Z
const DEFAULT_START_EPOCH: Epoch = 1_704_067_200;

/// Complete run configuration.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct RunConfig {
    #[serde(default)]
    pub prediction: PredictionConfig,
    #[serde(default)]
    pub tiles: TilesConfig,
    #[serde(default)]
    pub run: RunSettings,
}

/// What to predict and how to post-process it.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PredictionConfig {
    /// First prediction instant, seconds since the Unix epoch (hour-aligned)
    pub start_epoch: Epoch,
    /// Last prediction instant, inclusive (hour-aligned)
    pub end_epoch: Epoch,
    /// Spacing between predictions; must divide 3600
    pub time_increment_seconds: i64,
    /// `["Z"]` for water levels, `["U", "V"]` for currents
    pub fields: Vec<Field>,
    /// Use each dataset's mean latitude for nodal corrections instead of the
    /// point's own latitude
    pub use_dataset_average_latitude: bool,
    /// Counter-clockwise rotation applied to current vectors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotate_uv_degrees: Option<f64>,
    pub apply_datum_correction: bool,
    pub trend_threshold: f64,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        PredictionConfig {
            start_epoch: DEFAULT_START_EPOCH,
            end_epoch: DEFAULT_START_EPOCH + SECONDS_PER_DAY,
            time_increment_seconds: DEFAULT_TIME_INCREMENT_SECONDS,
            fields: vec![Field::Z],
            use_dataset_average_latitude: false,
            rotate_uv_degrees: None,
            apply_datum_correction: true,
            trend_threshold: DEFAULT_TREND_THRESHOLD,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TilesConfig {
    /// Level that points are assigned to
    pub target_level: Level,
    /// Reject base tiles whose corners do not form a regular rectangle
    pub check_regular: bool,
    /// One boundary JSON file per level, base first
    pub boundary_sources: Vec<PathBuf>,
    pub exclusions: Vec<Rect>,
    pub min_points_per_tile: usize,
    /// Drop base tiles that received no children
    pub prune_childless_base: bool,
}

impl Default for TilesConfig {
    fn default() -> Self {
        TilesConfig {
            target_level: Level::Base,
            check_regular: true,
            boundary_sources: vec![PathBuf::from("tiles/base.json")],
            exclusions: Vec::new(),
            min_points_per_tile: 1,
            prune_childless_base: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct PointSourceConfig {
    pub dataset: String,
    pub path: PathBuf,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RunSettings {
    pub workers: usize,
    /// Constituent table JSON; the built-in table is used when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constituent_table: Option<PathBuf>,
    pub output_dir: PathBuf,
    pub point_sources: Vec<PointSourceConfig>,
}

impl Default for RunSettings {
    fn default() -> Self {
        RunSettings {
            workers: 1,
            constituent_table: None,
            output_dir: PathBuf::from("products"),
            point_sources: Vec::new(),
        }
    }
}

impl RunConfig {
    /// Load configuration from the specified path.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigurationError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigurationError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigurationError::Toml {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        toml::to_string_pretty(self).context("serializing run configuration")
    }

    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let path = path.as_ref();
        fs::write(path, self.to_toml_string()?)
            .with_context(|| format!("writing configuration to {}", path.display()))?;
        info!(path = %path.display(), "configuration saved");
        Ok(())
    }

    /// Check every cross-field constraint and build the prediction timeline.
    pub fn validate(&self) -> Result<Timeline, ConfigurationError> {
        let p = &self.prediction;
        let timeline = Timeline::new(p.start_epoch, p.end_epoch, p.time_increment_seconds)?;

        if p.fields.is_empty() {
            return Err(invalid("at least one field must be requested"));
        }
        if self.wants(Field::U) != self.wants(Field::V) {
            return Err(invalid("current fields U and V must be requested together"));
        }
        if !p.trend_threshold.is_finite() || p.trend_threshold < 0.0 {
            return Err(invalid(format!(
                "trend threshold {} must be non-negative",
                p.trend_threshold
            )));
        }

        let t = &self.tiles;
        if t.boundary_sources.is_empty() || t.boundary_sources.len() > Level::ALL.len() {
            return Err(invalid(format!(
                "between 1 and {} boundary sources are required, got {}",
                Level::ALL.len(),
                t.boundary_sources.len()
            )));
        }
        if t.target_level.depth() >= t.boundary_sources.len() {
            return Err(invalid(format!(
                "target level {} needs {} boundary sources",
                t.target_level,
                t.target_level.depth() + 1
            )));
        }

        if self.run.workers == 0 {
            return Err(invalid("worker count must be at least 1"));
        }
        let mut seen = HashSet::new();
        for source in &self.run.point_sources {
            if !seen.insert(source.dataset.as_str()) {
                return Err(invalid(format!("dataset {} is listed twice", source.dataset)));
            }
        }

        Ok(timeline)
    }

    pub fn wants(&self, field: Field) -> bool {
        self.prediction.fields.contains(&field)
    }

    /// Post-processing to apply to every point series.
    pub fn series_options(&self, timeline: &Timeline) -> SeriesOptions {
        let p = &self.prediction;
        let water_levels = self.wants(Field::Z);
        SeriesOptions {
            fields: p.fields.clone(),
            rotate_uv_radians: p
                .rotate_uv_degrees
                .filter(|_| self.wants(Field::U))
                .map(f64::to_radians),
            trend_threshold: (water_levels
                && timeline.increment() == TREND_MAX_INCREMENT_SECONDS)
                .then_some(p.trend_threshold),
            datum_correction_factor: (water_levels && p.apply_datum_correction)
                .then_some(ADHOC_CHART_DATUM_CORR_FACTOR),
        }
    }
}

fn invalid(msg: impl Into<String>) -> ConfigurationError {
    ConfigurationError::InvalidRun(msg.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = RunConfig::default();
        assert_eq!(config.prediction.time_increment_seconds, 900);
        assert_eq!(config.prediction.fields, vec![Field::Z]);
        assert!(config.prediction.apply_datum_correction);
        assert_eq!(config.tiles.target_level, Level::Base);
        assert_eq!(config.tiles.min_points_per_tile, 1);
        assert_eq!(config.run.workers, 1);
        assert!(config.validate().is_ok(), "default config should validate");
    }

    #[test]
    fn test_config_roundtrip() {
        let mut config = RunConfig::default();
        config.prediction.rotate_uv_degrees = Some(12.5);
        config.tiles.exclusions.push(Rect {
            south: 45.0,
            west: -65.0,
            north: 46.0,
            east: -64.0,
        });
        config.run.point_sources.push(PointSourceConfig {
            dataset: "A".to_string(),
            path: PathBuf::from("points/a.json"),
        });

        let toml_str = config.to_toml_string().unwrap();
        let parsed: RunConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_load_nonexistent_file() {
        let err = RunConfig::load_from_path("/nonexistent/path").unwrap_err();
        assert!(matches!(err, ConfigurationError::Io { .. }));
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tide-tiler.toml");
        fs::write(
            &path,
            r#"
[prediction]
fields = ["U", "V"]
time_increment_seconds = 3600

[run]
workers = 4
"#,
        )
        .unwrap();

        let config = RunConfig::load_from_path(&path).unwrap();
        assert_eq!(config.prediction.fields, vec![Field::U, Field::V]);
        assert_eq!(config.prediction.start_epoch, DEFAULT_START_EPOCH);
        assert_eq!(config.run.workers, 4);
        assert!(config.tiles.check_regular);
    }

    #[test]
    fn save_then_load_gives_same_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("saved.toml");
        let config = RunConfig::default();
        config.save_to_path(&path).unwrap();
        assert_eq!(RunConfig::load_from_path(&path).unwrap(), config);
    }

    #[test]
    fn invalid_toml_reports_the_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "[prediction\nfields = 3").unwrap();
        let err = RunConfig::load_from_path(&path).unwrap_err();
        assert!(
            err.to_string().contains("bad.toml"),
            "error should name the file: {}",
            err
        );
    }

    fn assert_rejected(name: &str, mutate: impl FnOnce(&mut RunConfig)) {
        let mut config = RunConfig::default();
        mutate(&mut config);
        assert!(config.validate().is_err(), "{} should be rejected", name);
    }

    #[test]
    fn invalid_runs_are_rejected() {
        assert_rejected("zero workers", |c| c.run.workers = 0);
        assert_rejected("no fields", |c| c.prediction.fields.clear());
        assert_rejected("U without V", |c| c.prediction.fields = vec![Field::U]);
        assert_rejected("unaligned start", |c| c.prediction.start_epoch += 60);
        assert_rejected("end before start", |c| {
            c.prediction.end_epoch = c.prediction.start_epoch
        });
        assert_rejected("increment too large", |c| {
            c.prediction.time_increment_seconds = 7200
        });
        assert_rejected("increment not dividing an hour", |c| {
            c.prediction.time_increment_seconds = 700
        });
        assert_rejected("target without sources", |c| {
            c.tiles.target_level = Level::Fine
        });
        assert_rejected("no boundary sources", |c| c.tiles.boundary_sources.clear());
        assert_rejected("negative trend threshold", |c| {
            c.prediction.trend_threshold = -0.1
        });
        assert_rejected("duplicate dataset", |c| {
            let source = PointSourceConfig {
                dataset: "A".to_string(),
                path: PathBuf::from("a.json"),
            };
            c.run.point_sources = vec![source.clone(), source];
        });
    }

    #[test]
    fn series_options_follow_fields_and_increment() {
        let config = RunConfig::default();
        let timeline = config.validate().unwrap();
        let options = config.series_options(&timeline);
        assert_eq!(options.trend_threshold, Some(0.2));
        assert_eq!(
            options.datum_correction_factor,
            Some(ADHOC_CHART_DATUM_CORR_FACTOR)
        );
        assert_eq!(options.rotate_uv_radians, None);

        let mut currents = RunConfig::default();
        currents.prediction.fields = vec![Field::U, Field::V];
        currents.prediction.time_increment_seconds = 3600;
        currents.prediction.rotate_uv_degrees = Some(90.0);
        let timeline = currents.validate().unwrap();
        let options = currents.series_options(&timeline);
        assert_eq!(options.trend_threshold, None);
        assert_eq!(options.datum_correction_factor, None);
        let angle = options.rotate_uv_radians.unwrap();
        assert!((angle - std::f64::consts::FRAC_PI_2).abs() < 1e-12);
    }
}
