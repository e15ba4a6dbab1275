//! # Tide Tiler Core Library
//!
//! This library produces time-stamped harmonic tidal predictions (water levels and
//! current vectors) at geographic grid points and routes every point's series into a
//! three-level hierarchy of rectangular tiles, so that downstream product encoders can
//! emit bounded-size navigational data files.
//!
//! ## Design Philosophy
//!
//! ### Pure Computational Core
//! - **Ephemerides** ([`astro::ephemeris`]) are immutable values computed once per
//!   hour-aligned epoch and freely shared between workers
//! - **Constituent states** ([`astro::clock::AstroClock`]) are mutated every hour and
//!   are owned by exactly one worker; nothing in the prediction math is shared mutably
//! - **No logging and no I/O** inside the astronomy or the predictor: callers decide
//!   what to report based on the returned values
//!
//! ### Construction Then Query
//! The tile index is built and populated on a single thread before any parallel work
//! begins. After that point it is read-only and handed to workers by shared reference.
//!
//! ### Data Flow
//! 1. **Load**: run configuration (TOML), constituent tables (JSON), tile boundaries
//! 2. **Index**: base tiles, then up to two finer levels attached as children
//! 3. **Assign**: every grid point resolved to a tile at the target level, or rejected
//! 4. **Schedule**: populated tiles are partitioned round-robin across workers
//! 5. **Predict + encode**: each worker predicts its tiles and hands them to a
//!    [`scheduler::ProductEncoder`]
//!
//! ## Core Types
//!
//! - [`Field`]: which physical quantity a value describes (`Z`, `U` or `V`)
//! - [`Trend`]: water-level tendency classification
//! - [`FieldValues`]: predicted values at one point and one timestamp
//! - [`PointSeries`]: one point's predictions keyed by timestamp string

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub mod astro;
pub mod config;
pub mod encoder;
pub mod error;
pub mod points;
pub mod predictor;
pub mod scheduler;
pub mod tiles;
pub mod timeline;

/// Seconds since 1970-01-01T00:00:00Z.
pub type Epoch = i64;

/// Identifies a point inside a tile, formatted as `Lon=<lon>,Lat=<lat>`.
pub type PointKey = String;

/// Predicted values for one point, keyed by timestamp string.
///
/// Timestamp strings use the `%Y%m%d.%H%M%SZ` layout, so the map's lexical
/// order is also chronological order.
pub type PointSeries = BTreeMap<String, FieldValues>;

/// Build the key under which a point is stored in its tile.
///
/// # Example
/// ```
/// use tide_tile_lib::point_key;
///
/// assert_eq!(point_key(-64.5, 45.25), "Lon=-64.5,Lat=45.25");
/// ```
pub fn point_key(lon: f64, lat: f64) -> PointKey {
    format!("Lon={},Lat={}", lon, lat)
}

/// A physical quantity carried by tidal constituents.
///
/// Water levels use `Z`; currents use the `U` (eastward) and `V` (northward)
/// components together.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Field {
    Z,
    U,
    V,
}

impl Field {
    pub const ALL: [Field; 3] = [Field::Z, Field::U, Field::V];

    pub fn as_str(self) -> &'static str {
        match self {
            Field::Z => "Z",
            Field::U => "U",
            Field::V => "V",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Water-level tendency around one sample.
///
/// The numeric codes are those carried by S-104 style products.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Steady,
    Decreasing,
    Increasing,
    Unknown,
}

impl Trend {
    pub fn code(self) -> u8 {
        match self {
            Trend::Steady => 0,
            Trend::Decreasing => 1,
            Trend::Increasing => 2,
            Trend::Unknown => 3,
        }
    }
}

/// Predicted values at one point and one timestamp.
///
/// Only the fields requested for the run are populated. `trend` accompanies
/// `z` when the sampling allows it.
///
/// # Example
/// ```
/// use tide_tile_lib::{FieldValues, Trend};
///
/// let values = FieldValues { z: Some(1.25), trend: Some(Trend::Steady), ..Default::default() };
/// assert!(values.u.is_none());
/// assert_eq!(values.trend.map(Trend::code), Some(0));
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldValues {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub z: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub u: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub v: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trend: Option<Trend>,
}

impl FieldValues {
    pub fn get(&self, field: Field) -> Option<f64> {
        match field {
            Field::Z => self.z,
            Field::U => self.u,
            Field::V => self.v,
        }
    }

    pub fn set(&mut self, field: Field, value: f64) {
        match field {
            Field::Z => self.z = Some(value),
            Field::U => self.u = Some(value),
            Field::V => self.v = Some(value),
        }
    }
}
