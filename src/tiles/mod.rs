//! # Multi-Resolution Tiles
//!
//! Grid points are grouped into rectangular tiles organised in three levels:
//!
//! | Level    | Typical size          |
//! |----------|-----------------------|
//! | `Base`   | up to 4° lon × 2° lat |
//! | `Medium` | a subdivision of base |
//! | `Fine`   | a subdivision again   |
//!
//! Base tiles come from a boundary source, are validated against the deployment
//! hemisphere and indexed both by latitude band and by an integer (lon, lat)
//! cell. Finer tiles are attached to the coarser tile containing their centre.

pub mod assign;
pub mod index;

use crate::error::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

/// Widest whole-degree longitude span of a base tile.
pub const BASE_TILE_MAX_LON_EXTENT: i32 = 4;
/// Widest whole-degree latitude span of a base tile.
pub const BASE_TILE_MAX_LAT_EXTENT: i32 = 2;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TileId(String);

impl TileId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TileId {
    fn from(id: &str) -> Self {
        TileId(id.to_string())
    }
}

impl From<String> for TileId {
    fn from(id: String) -> Self {
        TileId(id)
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resolution level of a tile, coarsest first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Base,
    Medium,
    Fine,
}

impl Level {
    pub const ALL: [Level; 3] = [Level::Base, Level::Medium, Level::Fine];

    pub fn depth(self) -> usize {
        match self {
            Level::Base => 0,
            Level::Medium => 1,
            Level::Fine => 2,
        }
    }

    pub fn from_depth(depth: usize) -> Option<Level> {
        Level::ALL.get(depth).copied()
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Level::Base => "base",
            Level::Medium => "medium",
            Level::Fine => "fine",
        };
        f.write_str(name)
    }
}

/// Axis-aligned rectangle in degrees. Containment is inclusive on every edge.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl Rect {
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        lat >= self.south && lat <= self.north && lon >= self.west && lon <= self.east
    }

    /// Centre as (lat, lon).
    pub fn center(&self) -> (f64, f64) {
        (
            0.5 * (self.south + self.north),
            0.5 * (self.west + self.east),
        )
    }

    pub fn union(&self, other: &Rect) -> Rect {
        Rect {
            south: self.south.min(other.south),
            west: self.west.min(other.west),
            north: self.north.max(other.north),
            east: self.east.max(other.east),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LonLat {
    pub lon: f64,
    pub lat: f64,
}

/// The four corners of a tile boundary as read from its source.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Corners {
    pub sw: LonLat,
    pub nw: LonLat,
    pub ne: LonLat,
    pub se: LonLat,
}

impl Corners {
    /// Corners of an axis-aligned rectangle.
    pub fn from_rect(rect: &Rect) -> Self {
        Corners {
            sw: LonLat {
                lon: rect.west,
                lat: rect.south,
            },
            nw: LonLat {
                lon: rect.west,
                lat: rect.north,
            },
            ne: LonLat {
                lon: rect.east,
                lat: rect.north,
            },
            se: LonLat {
                lon: rect.east,
                lat: rect.south,
            },
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &LonLat> {
        [&self.sw, &self.nw, &self.ne, &self.se].into_iter()
    }

    /// Describe the first way these corners fail to form a regular rectangle.
    pub fn irregularity(&self) -> Option<String> {
        if self.nw.lat != self.ne.lat {
            return Some(format!("north corners at lat {} and {}", self.nw.lat, self.ne.lat));
        }
        if self.sw.lat != self.se.lat {
            return Some(format!("south corners at lat {} and {}", self.sw.lat, self.se.lat));
        }
        if self.nw.lon != self.sw.lon {
            return Some(format!("west corners at lon {} and {}", self.nw.lon, self.sw.lon));
        }
        if self.ne.lon != self.se.lon {
            return Some(format!("east corners at lon {} and {}", self.ne.lon, self.se.lon));
        }
        None
    }

    pub fn bounding_rect(&self) -> Rect {
        let mut rect = Rect {
            south: f64::INFINITY,
            west: f64::INFINITY,
            north: f64::NEG_INFINITY,
            east: f64::NEG_INFINITY,
        };
        for c in self.iter() {
            rect.south = rect.south.min(c.lat);
            rect.north = rect.north.max(c.lat);
            rect.west = rect.west.min(c.lon);
            rect.east = rect.east.max(c.lon);
        }
        rect
    }
}

/// One tile as provided by a boundary source.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TileBoundary {
    pub id: TileId,
    pub corners: Corners,
}

impl TileBoundary {
    pub fn from_rect(id: impl Into<TileId>, rect: Rect) -> Self {
        TileBoundary {
            id: id.into(),
            corners: Corners::from_rect(&rect),
        }
    }
}

/// Coordinate range accepted by a deployment, plus the origin of its base
/// tile integer indexing.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Hemisphere {
    pub lon_min: f64,
    pub lon_max: f64,
    pub lat_min: f64,
    pub lat_max: f64,
    pub origin_lon: f64,
    pub origin_lat: f64,
}

impl Hemisphere {
    pub const NORTH_WEST: Hemisphere = Hemisphere {
        lon_min: -179.9,
        lon_max: -0.1,
        lat_min: 0.1,
        lat_max: 89.9,
        origin_lon: -180.0,
        origin_lat: 0.0,
    };

    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        lon >= self.lon_min && lon <= self.lon_max && lat >= self.lat_min && lat <= self.lat_max
    }

    /// Whole-degree (lon, lat) cell of a south-west corner.
    pub fn cell_index(&self, lon: f64, lat: f64) -> (i32, i32) {
        (
            (lon - self.origin_lon).floor() as i32,
            (lat - self.origin_lat).floor() as i32,
        )
    }
}

impl Default for Hemisphere {
    fn default() -> Self {
        Hemisphere::NORTH_WEST
    }
}

/// Read a JSON array of [`TileBoundary`].
pub fn load_boundaries<P: AsRef<Path>>(path: P) -> Result<Vec<TileBoundary>, ConfigurationError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| ConfigurationError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&contents).map_err(|source| ConfigurationError::Json {
        path: path.to_path_buf(),
        source,
    })
}
