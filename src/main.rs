//! # Tide Tiler Application Entry Point
//!
//! Loads a run configuration, builds the tile index, assigns grid points and
//! produces one prediction product per populated tile.
//!
//! ```text
//! tide-tiler [CONFIG]          run with CONFIG (default: tide-tiler.toml)
//! tide-tiler --default-config  print a default configuration and exit
//! ```
//!
//! Logging goes to stderr and honours `RUST_LOG` (default `info`).

#[cfg(test)]
mod tests;

use anyhow::{bail, Context};
use std::collections::HashMap;
use std::env;
use std::sync::Arc;
use tide_tile_lib::astro::ephemeris::EphemerisCache;
use tide_tile_lib::astro::AstroTables;
use tide_tile_lib::config::{RunConfig, DEFAULT_CONFIG_PATH};
use tide_tile_lib::encoder::JsonProductEncoder;
use tide_tile_lib::points::{JsonPointFile, PointDataSource};
use tide_tile_lib::scheduler::{BatchReport, BatchScheduler, ProductionJob};
use tide_tile_lib::tiles::assign::{AllWet, AssignedTiles, PointAssigner};
use tide_tile_lib::tiles::index::{BaseLoadOptions, TileIndex};
use tide_tile_lib::tiles::load_boundaries;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    if args.iter().any(|arg| arg == "--default-config") {
        print!("{}", RunConfig::default().to_toml_string()?);
        return Ok(());
    }

    let path = args
        .iter()
        .find(|arg| !arg.starts_with("--"))
        .map(String::as_str)
        .unwrap_or(DEFAULT_CONFIG_PATH);
    let config = RunConfig::load_from_path(path)
        .with_context(|| format!("loading run configuration from {}", path))?;

    let report = run(&config)?;
    if !report.all_succeeded() {
        let failed = report.failed_tiles();
        for failure in &failed {
            error!(tile = %failure.tile, dataset = %failure.dataset, "{}", failure.message);
        }
        bail!(
            "{} of {} tiles failed; {} written",
            failed.len(),
            report.outcomes.len(),
            report.written()
        );
    }
    Ok(())
}

/// Build the tile index from every configured boundary source.
fn build_index(config: &RunConfig) -> anyhow::Result<TileIndex> {
    let tiles = &config.tiles;
    let mut sources = tiles.boundary_sources.iter();
    let base_path = sources.next().context("no base boundary source")?;

    let base = load_boundaries(base_path)
        .with_context(|| format!("loading base tiles from {}", base_path.display()))?;
    let options = BaseLoadOptions {
        check_regular: tiles.check_regular,
        exclusions: tiles.exclusions.clone(),
        ..Default::default()
    };
    let (mut index, report) = TileIndex::load_base(base, &options).context("building base tiles")?;
    info!(
        loaded = report.loaded,
        excluded = report.excluded.len(),
        "base tiles loaded"
    );

    for path in sources {
        let boundaries = load_boundaries(path)
            .with_context(|| format!("loading tiles from {}", path.display()))?;
        let orphans = index
            .add_level(boundaries)
            .with_context(|| format!("attaching tiles from {}", path.display()))?;
        info!(
            level = %orphans.level,
            attached = orphans.attached,
            orphaned = orphans.orphaned.len(),
            "tile level loaded"
        );
    }

    if tiles.prune_childless_base && index.depth() > 1 {
        let pruned = index.prune_childless_base();
        info!(pruned = pruned.len(), "childless base tiles removed");
    }
    Ok(index)
}

/// Route every point of every configured dataset to its tile.
fn assign_points(config: &RunConfig, index: &TileIndex) -> anyhow::Result<AssignedTiles> {
    let mask = AllWet;
    let mut assigner = PointAssigner::new(index, config.tiles.target_level)
        .with_exclusions(config.tiles.exclusions.clone())
        .with_mask(&mask);

    for source in &config.run.point_sources {
        let file = JsonPointFile::new(source.dataset.as_str(), &source.path);
        let points = file
            .load()
            .with_context(|| format!("loading points of dataset {}", file.dataset_id()))?;
        assigner
            .assign_all(file.dataset_id(), points)
            .with_context(|| format!("assigning points of dataset {}", file.dataset_id()))?;
    }

    let assigned = assigner.finish();
    let r = &assigned.rejections;
    info!(
        accepted = assigned.accepted,
        tiles = assigned.tiles.len(),
        rejected = r.total(),
        outside_hemisphere = r.outside_hemisphere,
        excluded = r.excluded,
        dry = r.dry,
        no_enclosing_tile = r.no_enclosing_tile,
        duplicate = r.duplicate,
        "points assigned"
    );
    Ok(assigned)
}

/// Run one complete production from a loaded configuration.
pub fn run(config: &RunConfig) -> anyhow::Result<BatchReport> {
    let timeline = config.validate().context("validating run configuration")?;

    let tables = match &config.run.constituent_table {
        Some(path) => AstroTables::load_from_path(path)
            .with_context(|| format!("loading constituent table from {}", path.display()))?,
        None => AstroTables::builtin(),
    };

    let index = build_index(config)?;
    let assigned = assign_points(config, &index)?;

    let cache = EphemerisCache::for_timeline(tables.ephemerides.clone(), &timeline)
        .context("computing ephemerides")?;
    let dataset_latitudes = if config.prediction.use_dataset_average_latitude {
        assigned.dataset_average_latitudes()
    } else {
        HashMap::new()
    };
    let options = config.series_options(&timeline);

    let job = ProductionJob {
        tables: &tables,
        cache: Arc::new(cache),
        timeline: &timeline,
        options: &options,
        dataset_latitudes,
        min_points_per_tile: config.tiles.min_points_per_tile,
    };
    let encoder = JsonProductEncoder::new(&config.run.output_dir);
    let scheduler = BatchScheduler::new(config.run.workers);

    Ok(scheduler.run(&job, &assigned.tiles, &encoder))
}
