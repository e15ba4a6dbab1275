use crate::run;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tide_tile_lib::config::{PointSourceConfig, RunConfig};
use tide_tile_lib::points::{RawPoint, RawSample};
use tide_tile_lib::scheduler::{TileOutcome, TileProduct};
use tide_tile_lib::tiles::{Level, Rect, TileBoundary, TileId};
use tide_tile_lib::{Field, Trend};

const JAN_1_2024: i64 = 1_704_067_200;

fn rect(south: f64, west: f64, north: f64, east: f64) -> Rect {
    Rect {
        south,
        west,
        north,
        east,
    }
}

fn sample(amplitude: f64, phase_deg: f64) -> RawSample {
    RawSample {
        amplitude,
        phase_deg,
    }
}

fn write_json<T: serde::Serialize>(dir: &Path, name: &str, value: &T) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, serde_json::to_string(value).unwrap()).unwrap();
    path
}

/// Water level point driven by M2, S2 and K1.
fn tidal_point(lon: f64, lat: f64) -> RawPoint {
    let mut constituents = BTreeMap::new();
    let harmonics = [("M2", 1.2, 40.0), ("S2", 0.3, 75.0), ("K1", 0.15, 200.0)];
    for (name, amplitude, phase_deg) in harmonics {
        let mut fields = BTreeMap::new();
        fields.insert(Field::Z, sample(amplitude, phase_deg));
        fields.insert(Field::U, sample(amplitude / 2.0, phase_deg));
        fields.insert(Field::V, sample(amplitude / 3.0, phase_deg + 90.0));
        constituents.insert(name.to_string(), fields);
    }
    RawPoint {
        lon,
        lat,
        constituents,
    }
}

/// Two adjacent one-degree base tiles, T1 west of T2.
fn fixture(dir: &Path, datasets: &[(&str, Vec<RawPoint>)]) -> RunConfig {
    let base = vec![
        TileBoundary::from_rect("T1", rect(45.0, -65.0, 46.0, -64.0)),
        TileBoundary::from_rect("T2", rect(45.0, -64.0, 46.0, -63.0)),
    ];
    let base_path = write_json(dir, "base.json", &base);

    let mut config = RunConfig::default();
    config.prediction.end_epoch = JAN_1_2024 + 6 * 3600;
    config.tiles.boundary_sources = vec![base_path];
    config.run.output_dir = dir.join("out");
    for (dataset, points) in datasets {
        let path = write_json(dir, &format!("{}.json", dataset), points);
        config.run.point_sources.push(PointSourceConfig {
            dataset: dataset.to_string(),
            path,
        });
    }
    config
}

fn read_product(config: &RunConfig, dataset: &str, tile: &str) -> TileProduct {
    let out = &config.run.output_dir;
    let path = out.join(dataset).join(format!("{}.json", tile));
    let text = fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("missing product {}: {}", path.display(), e));
    serde_json::from_str(&text).unwrap()
}

/// Points land in their tiles and every tile is written with full series.
#[test]
fn water_levels_are_produced_per_tile() {
    let dir = TempDir::new().unwrap();
    let points = vec![
        tidal_point(-64.5, 45.5),
        tidal_point(-64.25, 45.75),
        tidal_point(-63.5, 45.5),
        tidal_point(-64.5, 60.0),
    ];
    let config = fixture(dir.path(), &[("A", points)]);

    let report = run(&config).unwrap();
    assert!(
        report.all_succeeded(),
        "failures: {:?}",
        report.failed_tiles()
    );
    assert_eq!(report.written(), 2);

    let t1 = read_product(&config, "A", "T1");
    assert_eq!(t1.tile, TileId::from("T1"));
    assert!(t1.datum_corrected);
    assert_eq!(t1.points.len(), 2);

    let series = &t1.points["Lon=-64.5,Lat=45.5"];
    // Six hours at 15 minutes, both ends included
    assert_eq!(series.len(), 25);
    assert!(series.contains_key("20240101.000000Z"));
    assert!(series.contains_key("20240101.060000Z"));

    let values: Vec<_> = series.values().collect();
    assert!(values.iter().all(|v| v.z.is_some() && v.u.is_none()));
    assert_eq!(values[0].trend, Some(Trend::Unknown));
    let interior = &values[2..23];
    assert!(interior.iter().all(|v| v.trend != Some(Trend::Unknown)));

    // Levels stay within the datum-corrected envelope
    let corr = 0.979 * (1.2 + 0.3 + 0.15);
    let envelope = 1.2 * 1.2 + 0.3 * 1.2 + 0.15 * 1.5;
    for v in &values {
        let z = v.z.unwrap();
        assert!((z - corr).abs() <= envelope, "level {} out of range", z);
    }

    assert_eq!(read_product(&config, "A", "T2").points.len(), 1);
}

#[test]
fn under_populated_tiles_are_skipped_not_failed() {
    let dir = TempDir::new().unwrap();
    let points = vec![
        tidal_point(-64.5, 45.5),
        tidal_point(-64.25, 45.25),
        tidal_point(-63.5, 45.5),
    ];
    let mut config = fixture(dir.path(), &[("A", points)]);
    config.tiles.min_points_per_tile = 2;

    let report = run(&config).unwrap();
    assert!(report.all_succeeded());
    assert_eq!(report.written(), 1);
    assert_eq!(report.skipped(), 1);
    assert_eq!(
        report.outcomes[&TileId::from("T2")],
        TileOutcome::Skipped { points: 1 }
    );
    assert!(!config.run.output_dir.join("A").join("T2.json").exists());
}

/// Two datasets in one tile stop the run before any product is written.
#[test]
fn mixing_datasets_in_a_tile_aborts_the_run() {
    let dir = TempDir::new().unwrap();
    let config = fixture(
        dir.path(),
        &[
            ("A", vec![tidal_point(-64.5, 45.5)]),
            ("B", vec![tidal_point(-64.4, 45.6)]),
        ],
    );

    let err = run(&config).unwrap_err();
    let chain = format!("{:#}", err);
    assert!(
        chain.contains("cannot add dataset B"),
        "unexpected error: {}",
        chain
    );
    assert!(!config.run.output_dir.exists());
}

/// A tile that cannot be predicted is reported on its own; its sibling is still written.
#[test]
fn failed_tile_does_not_discard_siblings() {
    let dir = TempDir::new().unwrap();
    let mut broken = tidal_point(-63.5, 45.5);
    let mut unknown = BTreeMap::new();
    unknown.insert(Field::Z, sample(0.1, 0.0));
    broken.constituents.insert("SA".to_string(), unknown);

    let points = vec![tidal_point(-64.5, 45.5), broken];
    let mut config = fixture(dir.path(), &[("A", points)]);
    config.run.workers = 2;

    let report = run(&config).unwrap();
    assert!(!report.all_succeeded());

    let failed = report.failed_tiles();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].tile, TileId::from("T2"));
    assert_eq!(failed[0].dataset, "A");
    assert!(
        failed[0].message.contains("SA"),
        "message should name the constituent: {}",
        failed[0].message
    );

    assert_eq!(
        report.outcomes[&TileId::from("T1")],
        TileOutcome::Written { points: 1 }
    );
    assert_eq!(read_product(&config, "A", "T1").points.len(), 1);
}

#[test]
fn points_go_to_the_target_level_and_childless_base_tiles_are_pruned() {
    let dir = TempDir::new().unwrap();
    let points = vec![
        tidal_point(-64.5, 45.25),
        tidal_point(-64.5, 45.75),
        tidal_point(-63.5, 45.5),
    ];
    let mut config = fixture(dir.path(), &[("A", points)]);
    let medium = vec![
        TileBoundary::from_rect("T1S", rect(45.0, -65.0, 45.5, -64.0)),
        TileBoundary::from_rect("T1N", rect(45.5, -65.0, 46.0, -64.0)),
    ];
    let medium_path = write_json(dir.path(), "medium.json", &medium);
    config.tiles.boundary_sources.push(medium_path);
    config.tiles.target_level = Level::Medium;
    config.tiles.prune_childless_base = true;

    let report = run(&config).unwrap();
    assert!(report.all_succeeded());

    let ids: Vec<&str> = report.outcomes.keys().map(TileId::as_str).collect();
    assert_eq!(ids, vec!["T1N", "T1S"]);
    let south = read_product(&config, "A", "T1S");
    assert!(south.points.contains_key("Lon=-64.5,Lat=45.25"));
    let north = read_product(&config, "A", "T1N");
    assert!(north.points.contains_key("Lon=-64.5,Lat=45.75"));
}

#[test]
fn hourly_currents_are_rotated_and_carry_no_trend() {
    let dir = TempDir::new().unwrap();
    let mut config = fixture(dir.path(), &[("A", vec![tidal_point(-64.5, 45.5)])]);
    config.prediction.fields = vec![Field::U, Field::V];
    config.prediction.time_increment_seconds = 3600;
    config.prediction.use_dataset_average_latitude = true;
    let unrotated_dir = dir.path().join("plain");

    let mut plain = config.clone();
    plain.run.output_dir = unrotated_dir;
    run(&plain).unwrap();
    config.prediction.rotate_uv_degrees = Some(90.0);
    run(&config).unwrap();

    let rotated = read_product(&config, "A", "T1");
    let unrotated = read_product(&plain, "A", "T1");
    assert!(!rotated.datum_corrected);

    let key = "Lon=-64.5,Lat=45.5";
    let rotated = &rotated.points[key];
    let unrotated = &unrotated.points[key];
    assert_eq!(rotated.len(), 7);
    for (r, p) in rotated.values().zip(unrotated.values()) {
        assert!(r.z.is_none() && r.trend.is_none());
        // 90 degrees counter-clockwise: (u, v) -> (-v, u)
        assert!((r.u.unwrap() + p.v.unwrap()).abs() < 1e-9);
        assert!((r.v.unwrap() - p.u.unwrap()).abs() < 1e-9);
    }
}

#[test]
fn invalid_configuration_is_reported_with_context() {
    let dir = TempDir::new().unwrap();
    let mut config = fixture(dir.path(), &[]);
    config.run.workers = 0;
    let chain = format!("{:#}", run(&config).unwrap_err());
    assert!(
        chain.contains("validating run configuration"),
        "missing context: {}",
        chain
    );
    assert!(chain.contains("worker count"), "missing cause: {}", chain);
}
