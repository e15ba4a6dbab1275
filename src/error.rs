//! # Error Types
//!
//! Four families of failure, each with its own propagation policy:
//!
//! - [`ConfigurationError`]: bad inputs detected while loading or building. Fatal for the run.
//! - [`RejectReason`]: a single grid point cannot be placed. Counted and skipped.
//! - [`PreconditionError`]: the prediction core was driven out of order. A programming
//!   error surfaced as a value instead of a wrong number.
//! - [`WorkerFailure`]: one tile could not be produced. Sibling tiles are unaffected.

use crate::tiles::TileId;
use crate::Epoch;
use std::path::PathBuf;
use thiserror::Error;

/// Invalid static data, geometry or run configuration.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid TOML in {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid run configuration: {0}")]
    InvalidRun(String),

    #[error("invalid constituent table: {0}")]
    InvalidTable(String),

    #[error("shallow water constituent {derived} links to unknown main constituent {main}")]
    UnknownMainConstituent { derived: String, main: String },

    #[error("tile {tile} is not a regular rectangle: {detail}")]
    IrregularTile { tile: TileId, detail: String },

    #[error("tile {tile} has corner (lon {lon}, lat {lat}) outside the valid hemisphere")]
    TileOutsideHemisphere { tile: TileId, lon: f64, lat: f64 },

    #[error("tiles {first} and {second} share base index ({lon_idx}, {lat_idx})")]
    DuplicateBaseIndex {
        first: TileId,
        second: TileId,
        lon_idx: i32,
        lat_idx: i32,
    },

    #[error("base tile {tile} spans {lon_extent} by {lat_extent} degrees, over the 4 by 2 limit")]
    OversizedBaseTile {
        tile: TileId,
        lon_extent: i32,
        lat_extent: i32,
    },

    #[error("tile id {0} appears more than once")]
    DuplicateTileId(TileId),

    #[error("at most two levels can be added below the base level")]
    TooManyLevels,

    #[error("tile {tile} holds dataset {existing}, cannot add dataset {incoming}")]
    DatasetConflict {
        tile: TileId,
        existing: String,
        incoming: String,
    },
}

/// Why a grid point was dropped during assignment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Error)]
pub enum RejectReason {
    #[error("point outside the valid hemisphere range")]
    OutsideHemisphere,
    #[error("point inside an exclusion rectangle")]
    Excluded,
    #[error("point is on land")]
    Dry,
    #[error("no enclosing tile at the requested level")]
    NoEnclosingTile,
    #[error("a point with the same coordinates is already assigned")]
    DuplicatePoint,
}

/// The prediction core was used out of order.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum PreconditionError {
    #[error("epoch {0} is not aligned on an hour boundary")]
    UnalignedEpoch(Epoch),

    #[error("epoch {0} cannot be represented as a UTC date-time")]
    EpochOutOfRange(Epoch),

    #[error("no astronomic update has been performed yet")]
    NotUpdated,

    #[error("epoch {requested} precedes the last astronomic update at {updated}")]
    EpochBeforeUpdate { requested: Epoch, updated: Epoch },

    #[error("shallow water constituent {derived} needs {main} updated for epoch {epoch}")]
    StaleDependency {
        derived: String,
        main: String,
        epoch: Epoch,
    },

    #[error("no astronomic state for constituent {0}")]
    MissingConstituentState(String),

    #[error("latitude {0} rad yields a non-finite astronomic state")]
    DegenerateLatitude(f64),
}

/// Failure while handing a finished tile to a product encoder.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("encoder I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("encoder serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Anything that can stop a single tile from being produced.
#[derive(Debug, Error)]
pub enum TileError {
    #[error(transparent)]
    Precondition(#[from] PreconditionError),

    #[error(transparent)]
    Encode(#[from] EncodeError),
}

/// One tile that could not be produced, with enough detail to retry it.
#[derive(Clone, Debug, PartialEq, Error)]
#[error("tile {tile} (dataset {dataset}) failed: {message}")]
pub struct WorkerFailure {
    pub tile: TileId,
    pub dataset: String,
    pub message: String,
}
