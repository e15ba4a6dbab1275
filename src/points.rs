//! Grid-point harmonic constants.
//!
//! Every grid point carries, per field, the amplitude and Greenwich phase lag of
//! each constituent contributing to that field. Phases arrive in degrees and are
//! stored in radians.

use crate::error::ConfigurationError;
use crate::Field;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Amplitude and phase lag (radians) of one constituent for one field.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldSample {
    pub constituent: String,
    pub amplitude: f64,
    pub phase: f64,
}

/// Everything needed to predict at one grid point.
#[derive(Clone, Debug, PartialEq)]
pub struct PointRecord {
    pub lon: f64,
    pub lat: f64,
    pub fields: BTreeMap<Field, Vec<FieldSample>>,
}

impl PointRecord {
    pub fn samples(&self, field: Field) -> &[FieldSample] {
        self.fields.get(&field).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Sum of the `Z` amplitudes, the basis of the ad-hoc chart datum correction.
    pub fn z_amplitude_sum(&self) -> f64 {
        self.samples(Field::Z).iter().map(|s| s.amplitude).sum()
    }
}

/// On-disk amplitude and phase (degrees).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    pub amplitude: f64,
    pub phase_deg: f64,
}

/// On-disk point: constituent name -> field -> sample.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawPoint {
    pub lon: f64,
    pub lat: f64,
    pub constituents: BTreeMap<String, BTreeMap<Field, RawSample>>,
}

impl From<RawPoint> for PointRecord {
    fn from(raw: RawPoint) -> Self {
        let mut fields: BTreeMap<Field, Vec<FieldSample>> = BTreeMap::new();
        for (constituent, per_field) in raw.constituents {
            for (field, sample) in per_field {
                fields.entry(field).or_default().push(FieldSample {
                    constituent: constituent.clone(),
                    amplitude: sample.amplitude,
                    phase: sample.phase_deg.to_radians(),
                });
            }
        }
        PointRecord {
            lon: raw.lon,
            lat: raw.lat,
            fields,
        }
    }
}

/// Supplies the grid points of one dataset.
pub trait PointDataSource {
    fn dataset_id(&self) -> &str;
    fn load(&self) -> Result<Vec<PointRecord>, ConfigurationError>;
}

/// Points of one dataset stored as a JSON array of [`RawPoint`].
#[derive(Clone, Debug)]
pub struct JsonPointFile {
    pub dataset: String,
    pub path: PathBuf,
}

impl JsonPointFile {
    pub fn new(dataset: impl Into<String>, path: impl AsRef<Path>) -> Self {
        Self {
            dataset: dataset.into(),
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl PointDataSource for JsonPointFile {
    fn dataset_id(&self) -> &str {
        &self.dataset
    }

    fn load(&self) -> Result<Vec<PointRecord>, ConfigurationError> {
        let contents = fs::read_to_string(&self.path).map_err(|source| ConfigurationError::Io {
            path: self.path.clone(),
            source,
        })?;
        let raw: Vec<RawPoint> =
            serde_json::from_str(&contents).map_err(|source| ConfigurationError::Json {
                path: self.path.clone(),
                source,
            })?;
        Ok(raw.into_iter().map(PointRecord::from).collect())
    }
}

/// Points already held in memory.
#[derive(Clone, Debug)]
pub struct PointSet {
    pub dataset: String,
    pub points: Vec<PointRecord>,
}

impl PointDataSource for PointSet {
    fn dataset_id(&self) -> &str {
        &self.dataset
    }

    fn load(&self) -> Result<Vec<PointRecord>, ConfigurationError> {
        Ok(self.points.clone())
    }
}
