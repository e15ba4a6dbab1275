//! Point assignment: route every grid point to one tile at the target level.
//!
//! Checks run in a fixed order, and the first failing check decides the
//! rejection reason:
//! 1. hemisphere range
//! 2. exclusion rectangles
//! 3. land/water mask
//! 4. tile lookup
//!
//! A point whose key is already present in its tile keeps the first record and
//! is counted as a duplicate.
//!
//! A tile holds points of a single dataset. Mixing datasets in one tile is a
//! configuration error and stops the run.

use super::index::TileIndex;
use super::{Level, Rect, TileId};
use crate::error::{ConfigurationError, RejectReason};
use crate::points::PointRecord;
use crate::{point_key, PointKey};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, trace};

/// External land/water classification.
pub trait LandWaterMask {
    fn is_wet(&self, lon: f64, lat: f64) -> bool;
}

/// Mask that treats every point as water.
#[derive(Clone, Copy, Debug, Default)]
pub struct AllWet;

impl LandWaterMask for AllWet {
    fn is_wet(&self, _lon: f64, _lat: f64) -> bool {
        true
    }
}

/// Result of routing one point.
#[derive(Clone, Debug, PartialEq)]
pub enum Assignment {
    Accepted(TileId),
    Rejected(RejectReason),
}

/// Points attached to one tile.
#[derive(Clone, Debug, PartialEq)]
pub struct TileAssignment {
    pub dataset: String,
    pub points: BTreeMap<PointKey, PointRecord>,
}

/// Per-reason rejection counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RejectionCounts {
    pub outside_hemisphere: usize,
    pub excluded: usize,
    pub dry: usize,
    pub no_enclosing_tile: usize,
    pub duplicate: usize,
}

impl RejectionCounts {
    pub fn record(&mut self, reason: RejectReason) {
        match reason {
            RejectReason::OutsideHemisphere => self.outside_hemisphere += 1,
            RejectReason::Excluded => self.excluded += 1,
            RejectReason::Dry => self.dry += 1,
            RejectReason::NoEnclosingTile => self.no_enclosing_tile += 1,
            RejectReason::DuplicatePoint => self.duplicate += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.outside_hemisphere
            + self.excluded
            + self.dry
            + self.no_enclosing_tile
            + self.duplicate
    }
}

/// Everything the assigner produced, ready for scheduling.
#[derive(Clone, Debug, Default)]
pub struct AssignedTiles {
    pub tiles: BTreeMap<TileId, TileAssignment>,
    /// Tiles with at least one accepted point, per dataset.
    pub populated: BTreeMap<String, BTreeSet<TileId>>,
    pub rejections: RejectionCounts,
    pub accepted: usize,
    latitude_sums: HashMap<String, (f64, usize)>,
}

impl AssignedTiles {
    /// Mean latitude of a dataset's accepted points.
    pub fn dataset_average_latitude(&self, dataset: &str) -> Option<f64> {
        self.latitude_sums
            .get(dataset)
            .filter(|(_, n)| *n > 0)
            .map(|(sum, n)| sum / *n as f64)
    }

    pub fn dataset_average_latitudes(&self) -> HashMap<String, f64> {
        self.latitude_sums
            .keys()
            .filter_map(|d| self.dataset_average_latitude(d).map(|lat| (d.clone(), lat)))
            .collect()
    }
}

pub struct PointAssigner<'i> {
    index: &'i TileIndex,
    target: Level,
    exclusions: Vec<Rect>,
    mask: Option<&'i dyn LandWaterMask>,
    out: AssignedTiles,
}

impl<'i> PointAssigner<'i> {
    pub fn new(index: &'i TileIndex, target: Level) -> Self {
        Self {
            index,
            target,
            exclusions: Vec::new(),
            mask: None,
            out: AssignedTiles::default(),
        }
    }

    pub fn with_exclusions(mut self, exclusions: Vec<Rect>) -> Self {
        self.exclusions = exclusions;
        self
    }

    pub fn with_mask(mut self, mask: &'i dyn LandWaterMask) -> Self {
        self.mask = Some(mask);
        self
    }

    /// Route one point of `dataset` and attach it on success.
    pub fn assign(
        &mut self,
        dataset: &str,
        record: PointRecord,
    ) -> Result<Assignment, ConfigurationError> {
        let (lon, lat) = (record.lon, record.lat);

        let tile_id = match self.resolve(lon, lat) {
            Ok(id) => id,
            Err(reason) => {
                trace!(dataset, lon, lat, %reason, "point rejected");
                self.out.rejections.record(reason);
                return Ok(Assignment::Rejected(reason));
            }
        };

        let entry = self
            .out
            .tiles
            .entry(tile_id.clone())
            .or_insert_with(|| TileAssignment {
                dataset: dataset.to_string(),
                points: BTreeMap::new(),
            });
        if entry.dataset != dataset {
            return Err(ConfigurationError::DatasetConflict {
                tile: tile_id,
                existing: entry.dataset.clone(),
                incoming: dataset.to_string(),
            });
        }
        let key = point_key(lon, lat);
        if entry.points.contains_key(&key) {
            trace!(dataset, lon, lat, "duplicate point ignored");
            self.out.rejections.record(RejectReason::DuplicatePoint);
            return Ok(Assignment::Rejected(RejectReason::DuplicatePoint));
        }
        entry.points.insert(key, record);

        self.out
            .populated
            .entry(dataset.to_string())
            .or_default()
            .insert(tile_id.clone());
        let sums = self
            .out
            .latitude_sums
            .entry(dataset.to_string())
            .or_insert((0.0, 0));
        sums.0 += lat;
        sums.1 += 1;
        self.out.accepted += 1;

        Ok(Assignment::Accepted(tile_id))
    }

    /// Assign every point of a dataset, stopping only on a configuration error.
    pub fn assign_all<I>(&mut self, dataset: &str, records: I) -> Result<usize, ConfigurationError>
    where
        I: IntoIterator<Item = PointRecord>,
    {
        let before = self.out.accepted;
        for record in records {
            self.assign(dataset, record)?;
        }
        let accepted = self.out.accepted - before;
        debug!(dataset, accepted, "dataset assigned");
        Ok(accepted)
    }

    fn resolve(&self, lon: f64, lat: f64) -> Result<TileId, RejectReason> {
        if !self.index.hemisphere().contains(lon, lat) {
            return Err(RejectReason::OutsideHemisphere);
        }
        if self.exclusions.iter().any(|ex| ex.contains(lat, lon)) {
            return Err(RejectReason::Excluded);
        }
        if let Some(mask) = self.mask {
            if !mask.is_wet(lon, lat) {
                return Err(RejectReason::Dry);
            }
        }
        self.index
            .lookup(self.target, lat, lon)
            .map(|tile| tile.id.clone())
            .ok_or(RejectReason::NoEnclosingTile)
    }

    pub fn rejections(&self) -> &RejectionCounts {
        &self.out.rejections
    }

    pub fn finish(self) -> AssignedTiles {
        self.out
    }
}
