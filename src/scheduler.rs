//! # Batch Scheduler
//!
//! Splits populated tiles into balanced partitions and produces them in
//! parallel. Every worker builds its own [`AstroClock`], so constituent state is
//! never shared; the tile assignments, the static tables and the ephemeris
//! cache are shared read-only.
//!
//! Failures are attributed per tile. A tile that fails, or panics, is reported
//! as [`TileOutcome::Failed`] and never discards the tiles produced around it.

use crate::astro::clock::AstroClock;
use crate::astro::ephemeris::EphemerisCache;
use crate::astro::AstroTables;
use crate::error::{EncodeError, TileError, WorkerFailure};
use crate::predictor::{HarmonicPredictor, SeriesOptions};
use crate::tiles::assign::TileAssignment;
use crate::tiles::TileId;
use crate::timeline::Timeline;
use crate::{PointKey, PointSeries};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Split tile ids round-robin across `min(requested, cores)` buckets.
///
/// Ids are sorted first so the result is deterministic. Bucket sizes differ by
/// at most one, and empty buckets are dropped.
pub fn partition(
    tile_ids: &[TileId],
    requested_workers: usize,
    available_cores: usize,
) -> Vec<Vec<TileId>> {
    let workers = requested_workers.min(available_cores).max(1);
    let mut sorted = tile_ids.to_vec();
    sorted.sort();

    let mut buckets: Vec<Vec<TileId>> = vec![Vec::new(); workers];
    for (i, id) in sorted.into_iter().enumerate() {
        buckets[i % workers].push(id);
    }
    buckets.retain(|b| !b.is_empty());
    buckets
}

/// Everything the downstream encoder receives for one tile.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TileProduct {
    pub tile: TileId,
    pub dataset: String,
    pub datum_corrected: bool,
    pub points: BTreeMap<PointKey, PointSeries>,
}

/// Downstream consumer of finished tiles. Owns all file formats.
pub trait ProductEncoder: Sync {
    fn encode(&self, product: &TileProduct) -> Result<(), EncodeError>;
}

#[derive(Clone, Debug, PartialEq)]
pub enum TileOutcome {
    Written { points: usize },
    /// Too few points to be worth a product.
    Skipped { points: usize },
    Failed(WorkerFailure),
}

/// Per-tile outcomes of one batch.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BatchReport {
    pub outcomes: BTreeMap<TileId, TileOutcome>,
    pub workers: usize,
}

impl BatchReport {
    pub fn all_succeeded(&self) -> bool {
        self.failed_tiles().is_empty()
    }

    pub fn failed_tiles(&self) -> Vec<&WorkerFailure> {
        self.outcomes
            .values()
            .filter_map(|o| match o {
                TileOutcome::Failed(failure) => Some(failure),
                _ => None,
            })
            .collect()
    }

    pub fn written(&self) -> usize {
        self.count(|o| matches!(o, TileOutcome::Written { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, TileOutcome::Skipped { .. }))
    }

    fn count(&self, pred: impl Fn(&TileOutcome) -> bool) -> usize {
        self.outcomes.values().filter(|o| pred(o)).count()
    }
}

/// Shared, read-only context of one production run.
pub struct ProductionJob<'a> {
    pub tables: &'a AstroTables,
    pub cache: Arc<EphemerisCache>,
    pub timeline: &'a Timeline,
    pub options: &'a SeriesOptions,
    /// Latitude used for nodal corrections, per dataset. Datasets absent here
    /// use each point's own latitude.
    pub dataset_latitudes: HashMap<String, f64>,
    pub min_points_per_tile: usize,
}

impl ProductionJob<'_> {
    /// Predict every point of one tile, in key order.
    fn produce(
        &self,
        tile: &TileId,
        assignment: &TileAssignment,
    ) -> Result<TileProduct, TileError> {
        let mut predictor = HarmonicPredictor::new(AstroClock::new(self.tables), &self.cache);
        let fixed_latitude = self.dataset_latitudes.get(&assignment.dataset).copied();

        let mut points = BTreeMap::new();
        for (key, record) in &assignment.points {
            let latitude = fixed_latitude.unwrap_or(record.lat);
            let series = predictor.predict_series(record, self.timeline, latitude, self.options)?;
            points.insert(key.clone(), series);
        }

        Ok(TileProduct {
            tile: tile.clone(),
            dataset: assignment.dataset.clone(),
            datum_corrected: self.options.datum_correction_factor.is_some(),
            points,
        })
    }
}

pub struct BatchScheduler {
    requested_workers: usize,
    available_cores: usize,
}

impl BatchScheduler {
    pub fn new(requested_workers: usize) -> Self {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self::with_cores(requested_workers, cores)
    }

    pub fn with_cores(requested_workers: usize, available_cores: usize) -> Self {
        Self {
            requested_workers,
            available_cores,
        }
    }

    pub fn effective_workers(&self) -> usize {
        self.requested_workers.min(self.available_cores).max(1)
    }

    /// Produce every tile and block until all partitions are done.
    pub fn run(
        &self,
        job: &ProductionJob<'_>,
        tiles: &BTreeMap<TileId, TileAssignment>,
        encoder: &dyn ProductEncoder,
    ) -> BatchReport {
        let workers = self.effective_workers();
        if workers < self.requested_workers {
            warn!(
                requested = self.requested_workers,
                cores = self.available_cores,
                workers,
                "worker count clamped to available cores"
            );
        }

        let mut report = BatchReport {
            outcomes: BTreeMap::new(),
            workers,
        };

        let mut eligible = Vec::new();
        for (id, assignment) in tiles {
            let points = assignment.points.len();
            if points < job.min_points_per_tile {
                warn!(
                    tile = %id,
                    points,
                    min = job.min_points_per_tile,
                    "tile skipped, too few points"
                );
                let skipped = TileOutcome::Skipped { points };
                report.outcomes.insert(id.clone(), skipped);
            } else {
                eligible.push(id.clone());
            }
        }

        let partitions = partition(&eligible, self.requested_workers, self.available_cores);
        let produce = |ids: &Vec<TileId>| produce_partition(job, tiles, ids, encoder);

        let results: Vec<Vec<(TileId, TileOutcome)>> = if workers == 1 {
            partitions.iter().map(produce).collect()
        } else {
            match rayon::ThreadPoolBuilder::new().num_threads(workers).build() {
                Ok(pool) => pool.install(|| partitions.par_iter().map(produce).collect()),
                Err(e) => {
                    warn!(error = %e, "thread pool unavailable, producing tiles serially");
                    partitions.iter().map(produce).collect()
                }
            }
        };

        report.outcomes.extend(results.into_iter().flatten());

        info!(
            written = report.written(),
            skipped = report.skipped(),
            failed = report.failed_tiles().len(),
            workers,
            "batch finished"
        );
        report
    }
}

fn produce_partition(
    job: &ProductionJob<'_>,
    tiles: &BTreeMap<TileId, TileAssignment>,
    ids: &[TileId],
    encoder: &dyn ProductEncoder,
) -> Vec<(TileId, TileOutcome)> {
    let mut outcomes = Vec::with_capacity(ids.len());
    for id in ids {
        let Some(assignment) = tiles.get(id) else {
            continue;
        };
        let attempt = panic::catch_unwind(AssertUnwindSafe(|| -> Result<usize, TileError> {
            let product = job.produce(id, assignment)?;
            encoder.encode(&product)?;
            Ok(product.points.len())
        }));

        let outcome = match attempt {
            Ok(Ok(points)) => {
                debug!(tile = %id, dataset = %assignment.dataset, points, "tile written");
                TileOutcome::Written { points }
            }
            Ok(Err(e)) => failed(id, &assignment.dataset, e.to_string()),
            Err(payload) => failed(id, &assignment.dataset, panic_message(payload.as_ref())),
        };
        outcomes.push((id.clone(), outcome));
    }
    outcomes
}

fn failed(tile: &TileId, dataset: &str, message: String) -> TileOutcome {
    warn!(tile = %tile, dataset, %message, "tile failed");
    TileOutcome::Failed(WorkerFailure {
        tile: tile.clone(),
        dataset: dataset.to_string(),
        message,
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn ids(n: usize) -> Vec<TileId> {
        (0..n).map(|i| TileId::from(format!("T{:02}", i))).collect()
    }

    /// 10 tiles over 3 workers: sizes 4/3/3, nothing lost, nothing repeated.
    #[test]
    fn scenario_e_partition_is_balanced_and_complete() {
        let tiles = ids(10);
        let parts = partition(&tiles, 3, 8);
        assert_eq!(parts.len(), 3);

        let sizes: Vec<usize> = parts.iter().map(Vec::len).collect();
        let max = *sizes.iter().max().unwrap();
        let min = *sizes.iter().min().unwrap();
        assert!(max - min <= 1, "unbalanced partition sizes: {:?}", sizes);

        let union: BTreeSet<&TileId> = parts.iter().flatten().collect();
        assert_eq!(union.len(), 10);
        assert_eq!(parts.iter().map(Vec::len).sum::<usize>(), 10);
    }

    #[test]
    fn workers_are_clamped_to_cores() {
        assert_eq!(partition(&ids(10), 8, 2).len(), 2);
        assert_eq!(BatchScheduler::with_cores(8, 2).effective_workers(), 2);
        assert_eq!(BatchScheduler::with_cores(1, 16).effective_workers(), 1);
    }

    #[test]
    fn partition_is_deterministic_regardless_of_input_order() {
        let mut shuffled = ids(7);
        shuffled.reverse();
        assert_eq!(partition(&shuffled, 3, 3), partition(&ids(7), 3, 3));
        assert_eq!(partition(&ids(7), 3, 3)[0][0], TileId::from("T00"));
    }

    #[test]
    fn fewer_tiles_than_workers_leaves_no_empty_bucket() {
        let parts = partition(&ids(2), 4, 4);
        assert_eq!(parts.len(), 2);
        assert!(partition(&[], 4, 4).is_empty());
    }

    #[test]
    fn report_attributes_failures() {
        let mut outcomes = BTreeMap::new();
        outcomes.insert(TileId::from("A"), TileOutcome::Written { points: 3 });
        outcomes.insert(TileId::from("B"), TileOutcome::Skipped { points: 0 });
        let clean = BatchReport {
            outcomes: outcomes.clone(),
            workers: 1,
        };
        assert!(clean.all_succeeded());

        let failure = WorkerFailure {
            tile: TileId::from("C"),
            dataset: "A".to_string(),
            message: "boom".to_string(),
        };
        outcomes.insert(TileId::from("C"), TileOutcome::Failed(failure.clone()));
        let report = BatchReport {
            outcomes,
            workers: 1,
        };
        assert!(!report.all_succeeded());
        assert_eq!(report.failed_tiles(), vec![&failure]);
        assert_eq!(report.written(), 1);
        assert_eq!(report.skipped(), 1);
    }

    #[test]
    fn panic_payloads_become_messages() {
        let payload: Box<dyn Any + Send> = Box::new("index out of bounds");
        assert_eq!(
            panic_message(payload.as_ref()),
            "panicked: index out of bounds"
        );
        let payload: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(payload.as_ref()), "panicked");
    }

    proptest! {
        #[test]
        fn partition_sizes_differ_by_at_most_one(
            n in 0usize..200,
            requested in 1usize..16,
            cores in 1usize..16,
        ) {
            let parts = partition(&ids(n), requested, cores);
            prop_assert!(parts.len() <= requested.min(cores));
            prop_assert_eq!(parts.iter().map(Vec::len).sum::<usize>(), n);
            if let (Some(max), Some(min)) = (
                parts.iter().map(Vec::len).max(),
                parts.iter().map(Vec::len).min(),
            ) {
                prop_assert!(max - min <= 1);
            }
        }
    }
}
