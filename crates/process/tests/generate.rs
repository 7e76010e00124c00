mod common;

use std::path::PathBuf;

use common::PbfFixture;
use extract::RuleClassifier;
use process::generate;
use prost::Message;
use tempfile::TempDir;
use types::{Coordinate, TileMakerConfig};
use util::{geo_math::tile_for, vector_tile::Tile, StoredTileKey, TileStore};

const CAMERA: (f64, f64) = (49.0101, 8.4052);

fn fixture() -> PbfFixture {
    PbfFixture::new()
        .node(1, 49.0100, 8.4000, &[])
        .node(2, 49.0100, 8.4100, &[])
        .node(3, 49.0105, 8.4200, &[])
        .node(
            4,
            CAMERA.0,
            CAMERA.1,
            &[("highway", "speed_camera"), ("maxspeed", "50")],
        )
        .node(5, 49.5, 9.0, &[("amenity", "bench")])
        .way(
            100,
            &[1, 2, 3],
            &[("highway", "primary"), ("name", "Kaiserallee"), ("ref", "B10")],
        )
        .way(101, &[2, 999], &[("highway", "service")])
        .way(102, &[5, 1], &[("building", "yes")])
}

fn write_fixture(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("fixture.osm.pbf");
    std::fs::write(&path, fixture().to_bytes()).unwrap();
    path
}

#[test]
fn generates_flipped_tiles_and_metadata() {
    let dir = TempDir::new().unwrap();
    let input = write_fixture(&dir);
    let output = dir.path().join("out.mbtiles");
    let config = TileMakerConfig::default();

    let report = generate(&config, &RuleClassifier::default(), &input, &output, 2).unwrap();
    assert_eq!(report.nodes, 5);
    assert_eq!(report.ways, 3);
    assert_eq!(report.missing_refs, 1);
    assert_eq!(report.features, 3);
    assert!(report.tiles_written >= 3);

    let store = TileStore::open(&output).unwrap();
    assert_eq!(store.tile_count().unwrap(), report.tiles_written as u64);
    assert_eq!(store.metadata("name").unwrap().as_deref(), Some("pace"));
    assert_eq!(store.metadata("format").unwrap().as_deref(), Some("pbf"));
    assert_eq!(store.metadata("maxzoom").unwrap().as_deref(), Some("16"));
    let json = store.metadata("json").unwrap().unwrap();
    assert!(json.contains("\"r1\""));

    let bounds: types::Bounds = store.metadata("bounds").unwrap().unwrap().parse().unwrap();
    assert!((bounds.left - 8.4).abs() < 1e-6);
    assert!((bounds.right - 8.42).abs() < 1e-6);

    let camera = tile_for(&Coordinate::new(CAMERA.0, CAMERA.1), 16);
    let data = store
        .tile(&StoredTileKey::from(&camera))
        .unwrap()
        .expect("camera tile stored under the flipped row");
    let tile = Tile::decode(data.as_slice()).unwrap();

    let pois = tile.layer("pi").unwrap();
    assert_eq!(pois.features.len(), 1);
    assert_eq!(pois.features[0].id, Some(4));

    let roads = tile.layer("r1").unwrap();
    assert_eq!(roads.features[0].id, Some(100));
    assert!(roads.keys.contains(&"rf".to_owned()));
}

#[test]
fn corrupt_input_fails_without_tiles() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("broken.osm.pbf");
    let mut bytes = fixture().to_bytes();
    bytes.truncate(bytes.len() - 5);
    std::fs::write(&input, bytes).unwrap();

    let output = dir.path().join("out.mbtiles");
    let result = generate(
        &TileMakerConfig::default(),
        &RuleClassifier::default(),
        &input,
        &output,
        2,
    );
    assert!(result.is_err());
    assert!(!output.exists());
}

#[test]
fn zoom_above_maximum_is_rejected() {
    let dir = TempDir::new().unwrap();
    let input = write_fixture(&dir);
    let output = dir.path().join("out.mbtiles");
    let config = TileMakerConfig {
        zoom: types::MAX_ZOOM + 1,
        ..TileMakerConfig::default()
    };

    let error = generate(&config, &RuleClassifier::default(), &input, &output, 2).unwrap_err();
    assert!(error.to_string().contains("maximum zoom"));
    assert!(!output.exists());
}
