//! Tile index: construction, then read-only queries.
//!
//! Tiles live in an arena and refer to their children by index. Base tiles are
//! grouped into latitude bands keyed by `(floor(south), floor(north))`, which
//! bounds the scan needed to find the tile enclosing a point. Deeper levels are
//! only reachable through their parent, so a lookup walks at most two links
//! below the base tile.

use super::{
    Hemisphere, Level, Rect, TileBoundary, TileId, BASE_TILE_MAX_LAT_EXTENT,
    BASE_TILE_MAX_LON_EXTENT,
};
use crate::error::ConfigurationError;
use std::collections::HashMap;
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Clone, Debug, PartialEq)]
pub struct Tile {
    pub id: TileId,
    pub level: Level,
    pub rect: Rect,
    children: Vec<NodeId>,
}

impl Tile {
    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }
}

#[derive(Clone, Debug)]
struct LatitudeBand {
    south: i32,
    north: i32,
    tiles: Vec<NodeId>,
}

impl LatitudeBand {
    /// Whether a tile of this band may contain `lat`. Band keys are floored,
    /// so the band reaches up to the next whole degree past `north`.
    fn covers(&self, lat: f64) -> bool {
        lat >= f64::from(self.south) && lat <= f64::from(self.north) + 1.0
    }
}

/// Options for loading the base level.
#[derive(Clone, Debug)]
pub struct BaseLoadOptions {
    pub check_regular: bool,
    pub exclusions: Vec<Rect>,
    pub hemisphere: Hemisphere,
}

impl Default for BaseLoadOptions {
    fn default() -> Self {
        Self {
            check_regular: true,
            exclusions: Vec::new(),
            hemisphere: Hemisphere::NORTH_WEST,
        }
    }
}

/// Outcome of loading the base level.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BaseLoadReport {
    pub loaded: usize,
    pub excluded: Vec<TileId>,
}

/// Outcome of attaching one finer level.
#[derive(Clone, Debug, PartialEq)]
pub struct OrphanReport {
    pub level: Level,
    pub attached: usize,
    pub orphaned: Vec<TileId>,
}

#[derive(Clone, Debug)]
pub struct TileIndex {
    nodes: Vec<Tile>,
    /// Live tiles per level, base first.
    levels: Vec<Vec<NodeId>>,
    bands: Vec<LatitudeBand>,
    base_cells: HashMap<(i32, i32), NodeId>,
    by_id: HashMap<TileId, NodeId>,
    extent: Option<Rect>,
    hemisphere: Hemisphere,
}

impl TileIndex {
    /// Build the base level from boundary records.
    ///
    /// Tiles with their south-west or north-east corner in an exclusion rectangle
    /// are dropped. Every other tile must be regular (when requested), span at
    /// most 4° of longitude and 2° of latitude in whole degrees, lie in the
    /// hemisphere and occupy a unique integer cell.
    pub fn load_base(
        boundaries: Vec<TileBoundary>,
        options: &BaseLoadOptions,
    ) -> Result<(Self, BaseLoadReport), ConfigurationError> {
        let mut index = TileIndex {
            nodes: Vec::with_capacity(boundaries.len()),
            levels: vec![Vec::new()],
            bands: Vec::new(),
            base_cells: HashMap::new(),
            by_id: HashMap::new(),
            extent: None,
            hemisphere: options.hemisphere,
        };
        let mut report = BaseLoadReport::default();

        for boundary in boundaries {
            let corners = boundary.corners;

            if options.check_regular {
                if let Some(detail) = corners.irregularity() {
                    return Err(ConfigurationError::IrregularTile {
                        tile: boundary.id,
                        detail,
                    });
                }
            }

            let excluded = options.exclusions.iter().any(|ex| {
                ex.contains(corners.sw.lat, corners.sw.lon)
                    || ex.contains(corners.ne.lat, corners.ne.lon)
            });
            if excluded {
                debug!(tile = %boundary.id, "base tile inside an exclusion rectangle");
                report.excluded.push(boundary.id);
                continue;
            }

            let lon_extent = (corners.ne.lon - corners.sw.lon).trunc() as i32;
            let lat_extent = (corners.ne.lat - corners.sw.lat).trunc() as i32;
            if lon_extent > BASE_TILE_MAX_LON_EXTENT || lat_extent > BASE_TILE_MAX_LAT_EXTENT {
                return Err(ConfigurationError::OversizedBaseTile {
                    tile: boundary.id,
                    lon_extent,
                    lat_extent,
                });
            }

            let hemisphere = &options.hemisphere;
            if let Some(c) = corners.iter().find(|c| !hemisphere.contains(c.lon, c.lat)) {
                return Err(ConfigurationError::TileOutsideHemisphere {
                    tile: boundary.id,
                    lon: c.lon,
                    lat: c.lat,
                });
            }

            let rect = corners.bounding_rect();
            let cell = options.hemisphere.cell_index(rect.west, rect.south);
            if let Some(existing) = index.base_cells.get(&cell) {
                return Err(ConfigurationError::DuplicateBaseIndex {
                    first: index.nodes[existing.0].id.clone(),
                    second: boundary.id,
                    lon_idx: cell.0,
                    lat_idx: cell.1,
                });
            }

            let node = index.push(boundary.id, Level::Base, rect)?;
            index.base_cells.insert(cell, node);
            index.band_insert(node);
            index.levels[0].push(node);
            report.loaded += 1;
        }

        index.recompute_extent();
        Ok((index, report))
    }

    /// Attach one finer level below the deepest loaded level.
    ///
    /// Each tile becomes a child of the previous-level tile containing its
    /// centre. Tiles without such a parent are orphaned and left out.
    pub fn add_level(
        &mut self,
        boundaries: Vec<TileBoundary>,
    ) -> Result<OrphanReport, ConfigurationError> {
        let parent_level = Level::from_depth(self.depth() - 1)
            .ok_or(ConfigurationError::TooManyLevels)?;
        let level = Level::from_depth(self.depth()).ok_or(ConfigurationError::TooManyLevels)?;

        let mut attached = 0;
        let mut orphaned = Vec::new();
        let mut members = Vec::new();

        for boundary in boundaries {
            let rect = boundary.corners.bounding_rect();
            let (lat, lon) = rect.center();
            let parent = match self.lookup_node(parent_level, lat, lon) {
                Some(parent) => parent,
                None => {
                    debug!(tile = %boundary.id, %level, "orphaned tile: no enclosing parent");
                    orphaned.push(boundary.id);
                    continue;
                }
            };
            let node = self.push(boundary.id, level, rect)?;
            self.nodes[parent.0].children.push(node);
            members.push(node);
            attached += 1;
        }

        self.levels.push(members);
        Ok(OrphanReport {
            level,
            attached,
            orphaned,
        })
    }

    /// Drop base tiles that received no children. Returns their ids.
    pub fn prune_childless_base(&mut self) -> Vec<TileId> {
        let nodes = &self.nodes;
        let (keep, pruned): (Vec<NodeId>, Vec<NodeId>) = self.levels[0]
            .iter()
            .copied()
            .partition(|n| nodes[n.0].has_children());

        for node in &pruned {
            self.by_id.remove(&self.nodes[node.0].id);
        }
        self.base_cells.retain(|_, n| !pruned.contains(n));
        for band in &mut self.bands {
            band.tiles.retain(|n| !pruned.contains(n));
        }
        self.bands.retain(|b| !b.tiles.is_empty());
        self.levels[0] = keep;
        self.recompute_extent();

        pruned.iter().map(|n| self.nodes[n.0].id.clone()).collect()
    }

    /// Most specific tile at `level` containing (lat, lon).
    pub fn lookup(&self, level: Level, lat: f64, lon: f64) -> Option<&Tile> {
        self.lookup_node(level, lat, lon).map(|n| &self.nodes[n.0])
    }

    fn lookup_node(&self, level: Level, lat: f64, lon: f64) -> Option<NodeId> {
        let extent = self.extent?;
        if !extent.contains(lat, lon) {
            return None;
        }

        let mut current = self
            .bands
            .iter()
            .filter(|band| band.covers(lat))
            .flat_map(|band| band.tiles.iter())
            .copied()
            .find(|n| self.nodes[n.0].rect.contains(lat, lon))?;

        for _ in 0..level.depth() {
            current = self.nodes[current.0]
                .children
                .iter()
                .copied()
                .find(|c| self.nodes[c.0].rect.contains(lat, lon))?;
        }
        Some(current)
    }

    pub fn tile(&self, id: &TileId) -> Option<&Tile> {
        self.by_id.get(id).map(|n| &self.nodes[n.0])
    }

    pub fn children<'a>(&'a self, tile: &'a Tile) -> impl Iterator<Item = &'a Tile> + 'a {
        tile.children.iter().map(move |c| &self.nodes[c.0])
    }

    /// Direct lookup of a base tile by its whole-degree cell.
    pub fn base_tile_at_index(&self, lon_idx: i32, lat_idx: i32) -> Option<&Tile> {
        self.base_cells
            .get(&(lon_idx, lat_idx))
            .map(|n| &self.nodes[n.0])
    }

    pub fn tiles_at(&self, level: Level) -> impl Iterator<Item = &Tile> {
        self.levels
            .get(level.depth())
            .into_iter()
            .flatten()
            .map(move |n| &self.nodes[n.0])
    }

    /// Number of loaded levels, base included.
    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    pub fn extent(&self) -> Option<Rect> {
        self.extent
    }

    pub fn hemisphere(&self) -> &Hemisphere {
        &self.hemisphere
    }

    pub fn band_count(&self) -> usize {
        self.bands.len()
    }

    fn push(&mut self, id: TileId, level: Level, rect: Rect) -> Result<NodeId, ConfigurationError> {
        if self.by_id.contains_key(&id) {
            return Err(ConfigurationError::DuplicateTileId(id));
        }
        let node = NodeId(self.nodes.len());
        self.by_id.insert(id.clone(), node);
        self.nodes.push(Tile {
            id,
            level,
            rect,
            children: Vec::new(),
        });
        Ok(node)
    }

    fn band_insert(&mut self, node: NodeId) {
        let rect = self.nodes[node.0].rect;
        let south = rect.south.floor() as i32;
        let north = rect.north.floor() as i32;
        match self
            .bands
            .iter_mut()
            .find(|b| b.south == south && b.north == north)
        {
            Some(band) => band.tiles.push(node),
            None => self.bands.push(LatitudeBand {
                south,
                north,
                tiles: vec![node],
            }),
        }
    }

    fn recompute_extent(&mut self) {
        let nodes = &self.nodes;
        self.extent = self.levels[0]
            .iter()
            .map(|n| nodes[n.0].rect)
            .reduce(|acc, r| acc.union(&r));
    }
}
