//! Vector tile encoding: geometry command streams with clipping at the tile
//! edge, and per-layer key/value dictionaries.

use std::collections::HashMap;

use prost::Message;
use types::{Coordinate, GeometryKind, TileKey, ValueKey};
use util::{
    geo_math::{column_from_longitude_f, row_from_latitude_f, tile_for},
    vector_tile::{self, GeomType, Tile},
};

use crate::bucketer::TileFeatureSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Command {
    MoveTo = 1,
    LineTo = 2,
    ClosePath = 7,
}

/// Packs a command id and its repeat count into one command word.
pub fn command_integer(id: Command, count: u32) -> u32 {
    (id as u32 & 0x7) | (count << 3)
}

pub fn zigzag(value: i32) -> u32 {
    ((value << 1) ^ (value >> 31)) as u32
}

/// Encodes feature geometries relative to one tile.
///
/// The cursor (`current_x`, `current_y`) carries over between the commands
/// of one feature and must be reset before the next feature.
#[derive(Debug, Clone)]
pub struct GeometryEncoder {
    tile: TileKey,
    extent: u32,
    current_x: i64,
    current_y: i64,
}

impl GeometryEncoder {
    pub fn new(tile: TileKey, extent: u32) -> Self {
        GeometryEncoder {
            tile,
            extent,
            current_x: 0,
            current_y: 0,
        }
    }

    pub fn reset(&mut self) {
        self.current_x = 0;
        self.current_y = 0;
    }

    fn contains(&self, coordinate: &Coordinate) -> bool {
        let key = tile_for(coordinate, self.tile.zoom);
        key.row == self.tile.row && key.column == self.tile.column
    }

    /// Tile local pixel position, truncated towards zero.
    fn position(&self, coordinate: &Coordinate) -> (i64, i64) {
        let zoom = self.tile.zoom;
        let extent = self.extent as f64;
        let x = (column_from_longitude_f(coordinate.longitude, zoom) - self.tile.column as f64)
            * extent;
        let y = (row_from_latitude_f(coordinate.latitude, zoom) - self.tile.row as f64) * extent;
        (x as i64, y as i64)
    }

    /// One command word followed by a zigzag encoded delta pair per coordinate.
    pub fn command(&mut self, id: Command, coordinates: &[Coordinate]) -> Vec<u32> {
        let mut encoded = Vec::with_capacity(coordinates.len() * 2 + 1);
        encoded.push(command_integer(id, coordinates.len() as u32));

        for coordinate in coordinates {
            let (x, y) = self.position(coordinate);
            encoded.push(zigzag((x - self.current_x) as i32));
            encoded.push(zigzag((y - self.current_y) as i32));
            self.current_x = x;
            self.current_y = y;
        }
        encoded
    }

    /// Splits a line into the runs that lie in this tile and encodes each
    /// run as MoveTo + LineTo.
    ///
    /// A run starts with the outside point before it, if any, and ends with
    /// the first outside point after it, so the edges crossing the tile
    /// border are drawn. Runs of a single point are dropped.
    pub fn clip_line(&mut self, coordinates: &[Coordinate]) -> Vec<u32> {
        let mut runs: Vec<Vec<Coordinate>> = Vec::new();
        let mut current: Vec<Coordinate> = Vec::new();
        let mut previous: Option<&Coordinate> = None;

        for coordinate in coordinates {
            if self.contains(coordinate) {
                if current.is_empty() {
                    current.extend(previous.copied());
                }
                current.push(*coordinate);
            } else if !current.is_empty() {
                current.push(*coordinate);
                runs.push(std::mem::take(&mut current));
            }
            previous = Some(coordinate);
        }
        if !current.is_empty() {
            runs.push(current);
        }

        let mut encoded = Vec::new();
        for run in runs.iter().filter(|run| run.len() >= 2) {
            encoded.extend(self.command(Command::MoveTo, &run[..1]));
            encoded.extend(self.command(Command::LineTo, &run[1..]));
        }
        encoded
    }

    pub fn encode_point(&mut self, coordinates: &[Coordinate]) -> Vec<u32> {
        self.reset();
        match coordinates.first() {
            Some(coordinate) => self.command(Command::MoveTo, std::slice::from_ref(coordinate)),
            None => Vec::new(),
        }
    }

    pub fn encode_line(&mut self, coordinates: &[Coordinate]) -> Vec<u32> {
        self.reset();
        self.clip_line(coordinates)
    }

    pub fn encode_polygon(&mut self, coordinates: &[Coordinate]) -> Vec<u32> {
        let mut encoded = self.encode_line(coordinates);
        if !encoded.is_empty() {
            encoded.push(command_integer(Command::ClosePath, 1));
        }
        encoded
    }

    pub fn encode(&mut self, kind: GeometryKind, coordinates: &[Coordinate]) -> Vec<u32> {
        match kind {
            GeometryKind::Point => self.encode_point(coordinates),
            GeometryKind::Line => self.encode_line(coordinates),
            GeometryKind::Polygon => self.encode_polygon(coordinates),
        }
    }
}

/// A serialized tile, addressed with a north-origin row.
#[derive(Debug, Clone)]
pub struct EncodedTile {
    pub key: TileKey,
    pub data: Vec<u8>,
    pub feature_count: usize,
}

#[derive(Default)]
struct LayerDictionary {
    keys: HashMap<String, u32>,
    values: HashMap<ValueKey, u32>,
}

/// Encodes every feature of the set that has geometry inside the tile.
///
/// Layers appear in the order their first feature appears. Keys and values
/// are deduplicated per layer; features without geometry in this tile
/// contribute nothing, not even dictionary entries.
pub fn encode_tile(set: &TileFeatureSet, extent: u32) -> EncodedTile {
    let mut tile = Tile::default();
    let mut dictionaries: HashMap<String, LayerDictionary> = HashMap::new();
    let mut encoder = GeometryEncoder::new(set.key, extent);
    let mut feature_count = 0;

    for feature in &set.features {
        let geometry = encoder.encode(feature.kind, &feature.coordinates);
        if geometry.is_empty() {
            continue;
        }

        let layer_index = tile.get_or_create_layer(&feature.layer, extent);
        let layer = &mut tile.layers[layer_index];
        let dictionary = dictionaries.entry(feature.layer.clone()).or_default();

        let mut tags = Vec::with_capacity(feature.properties.len() * 2);
        for (key, value) in &feature.properties {
            let key_index = *dictionary.keys.entry(key.clone()).or_insert_with(|| {
                layer.keys.push(key.clone());
                (layer.keys.len() - 1) as u32
            });
            let value_index = *dictionary.values.entry(value.key()).or_insert_with(|| {
                layer.values.push(vector_tile::Value::from(value));
                (layer.values.len() - 1) as u32
            });
            tags.extend([key_index, value_index]);
        }

        layer.features.push(vector_tile::Feature {
            id: Some(feature.id as u64),
            tags,
            r#type: Some(GeomType::from(feature.kind) as i32),
            geometry,
        });
        feature_count += 1;
    }

    EncodedTile {
        key: set.key,
        data: tile.encode_to_vec(),
        feature_count,
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::BTreeMap, f64::consts::PI, sync::Arc};

    use types::{Feature, PropertyValue};

    use super::*;

    const ZOOM: u8 = 16;
    const ROW: u32 = 22501;
    const COLUMN: u32 = 34309;

    /// Coordinate at a fractional tile position.
    fn at(row: f64, column: f64) -> Coordinate {
        let n = 2f64.powi(ZOOM as i32);
        let longitude = column / n * 360.0 - 180.0;
        let latitude = (PI * (1.0 - 2.0 * row / n)).sinh().atan() * 180.0 / PI;
        Coordinate::new(latitude, longitude)
    }

    fn inside(offset: f64) -> Coordinate {
        at(ROW as f64 + 0.2 + offset, COLUMN as f64 + 0.3 + offset)
    }

    fn outside(offset: f64) -> Coordinate {
        at(ROW as f64 + 0.4, COLUMN as f64 + 2.5 + offset)
    }

    fn tile() -> TileKey {
        TileKey::new(ZOOM, ROW, COLUMN)
    }

    /// Encodes `runs` back to back with one cursor, the way clipping must.
    fn expected(runs: &[&[Coordinate]]) -> Vec<u32> {
        let mut encoder = GeometryEncoder::new(tile(), 4096);
        let mut encoded = Vec::new();
        for run in runs {
            encoded.extend(encoder.command(Command::MoveTo, &run[..1]));
            encoded.extend(encoder.command(Command::LineTo, &run[1..]));
        }
        encoded
    }

    fn clip(way: &[Coordinate]) -> Vec<u32> {
        GeometryEncoder::new(tile(), 4096).clip_line(way)
    }

    #[test]
    fn command_words_and_zigzag() {
        assert_eq!(command_integer(Command::MoveTo, 1), 9);
        assert_eq!(command_integer(Command::LineTo, 3), 26);
        assert_eq!(command_integer(Command::ClosePath, 1), 15);
        assert_eq!(zigzag(0), 0);
        assert_eq!(zigzag(-1), 1);
        assert_eq!(zigzag(1), 2);
        assert_eq!(zigzag(-2), 3);
        assert_eq!(zigzag(2047), 4094);
    }

    #[test]
    fn positions_are_relative_to_the_tile_origin() {
        let mut encoder = GeometryEncoder::new(tile(), 4096);
        let encoded = encoder.command(
            Command::MoveTo,
            &[at(ROW as f64 + 0.5, COLUMN as f64 + 0.25)],
        );
        assert_eq!(encoded[0], 9);
        assert!((encoded[1] as i64 - zigzag(1024) as i64).abs() <= 2);
        assert!((encoded[2] as i64 - zigzag(2048) as i64).abs() <= 2);
    }

    #[test]
    fn line_completely_in_tile_is_one_run() {
        let way: Vec<_> = (0..4).map(|i| inside(i as f64 * 0.1)).collect();
        let encoded = clip(&way);
        assert_eq!(encoded, expected(&[&way]));
        assert_eq!(encoded[0], command_integer(Command::MoveTo, 1));
        assert_eq!(encoded[3], command_integer(Command::LineTo, 3));
    }

    #[test]
    fn line_not_in_tile_is_empty() {
        let way = vec![outside(0.0), outside(0.1), outside(0.2)];
        assert!(clip(&way).is_empty());
    }

    #[test]
    fn leave_and_enter_again() {
        let way = vec![
            inside(0.0),
            inside(0.1),
            inside(0.2),
            inside(0.3),
            outside(0.0),
            outside(0.3),
            inside(0.4),
            inside(0.5),
        ];
        assert_eq!(clip(&way), expected(&[&way[0..5], &way[5..8]]));
    }

    #[test]
    fn briefly_leave_and_enter_again() {
        let way = vec![
            inside(0.0),
            inside(0.1),
            inside(0.2),
            inside(0.3),
            outside(0.0),
            inside(0.4),
            inside(0.5),
        ];
        assert_eq!(clip(&way), expected(&[&way[0..5], &way[4..7]]));
    }

    #[test]
    fn start_outside() {
        let way = vec![outside(0.0), outside(0.2), inside(0.0), inside(0.1)];
        assert_eq!(clip(&way), expected(&[&way[1..4]]));
    }

    #[test]
    fn single_point_runs_are_dropped() {
        assert!(clip(&[inside(0.0)]).is_empty());
    }

    #[test]
    fn polygon_ends_with_close_path() {
        let ring = vec![inside(0.0), inside(0.2), inside(0.4), inside(0.0)];
        let mut encoder = GeometryEncoder::new(tile(), 4096);
        let encoded = encoder.encode_polygon(&ring);
        assert_eq!(encoded.last(), Some(&command_integer(Command::ClosePath, 1)));
        assert_eq!(&encoded[..encoded.len() - 1], expected(&[&ring]).as_slice());
    }

    fn feature(
        id: i64,
        kind: GeometryKind,
        layer: &str,
        coordinates: Vec<Coordinate>,
    ) -> Arc<Feature> {
        Arc::new(Feature {
            id,
            kind,
            layer: layer.to_owned(),
            coordinates,
            properties: BTreeMap::from([
                ("hw".to_owned(), PropertyValue::from("primary")),
                ("nm".to_owned(), PropertyValue::from("Kaiserstraße")),
            ]),
        })
    }

    fn decode(encoded: &EncodedTile) -> Tile {
        Tile::decode(encoded.data.as_slice()).unwrap()
    }

    #[test]
    fn dictionaries_are_shared_within_a_layer() {
        let set = TileFeatureSet {
            key: tile(),
            features: vec![
                feature(1, GeometryKind::Line, "r1", vec![inside(0.0), inside(0.1)]),
                feature(2, GeometryKind::Line, "r1", vec![inside(0.2), inside(0.3)]),
                feature(3, GeometryKind::Point, "pi", vec![inside(0.0)]),
            ],
        };
        let encoded = encode_tile(&set, 4096);
        assert_eq!(encoded.feature_count, 3);

        let tile = decode(&encoded);
        let names: Vec<_> = tile.layers.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["r1", "pi"]);

        let roads = &tile.layers[0];
        assert_eq!(roads.version, 2);
        assert_eq!(roads.extent, Some(4096));
        assert_eq!(roads.keys, vec!["hw", "nm"]);
        assert_eq!(roads.values.len(), 2);
        assert_eq!(roads.features[0].tags, vec![0, 0, 1, 1]);
        assert_eq!(roads.features[1].tags, vec![0, 0, 1, 1]);
        assert_eq!(roads.features[1].id, Some(2));
        assert_eq!(roads.features[1].r#type, Some(GeomType::Linestring as i32));

        let pois = &tile.layers[1];
        assert_eq!(pois.keys, vec!["hw", "nm"]);
        assert_eq!(pois.features[0].tags, vec![0, 0, 1, 1]);
        assert_eq!(pois.features[0].geometry.len(), 3);
    }

    #[test]
    fn features_outside_the_tile_leave_no_trace() {
        let mut outsider = Feature::clone(&feature(
            9,
            GeometryKind::Line,
            "r2",
            vec![outside(0.0), outside(0.1)],
        ));
        outsider
            .properties
            .insert("rf".to_owned(), PropertyValue::from("B10"));

        let set = TileFeatureSet {
            key: tile(),
            features: vec![
                Arc::new(outsider),
                feature(1, GeometryKind::Line, "r1", vec![inside(0.0), inside(0.1)]),
            ],
        };
        let encoded = encode_tile(&set, 4096);
        assert_eq!(encoded.feature_count, 1);

        let tile = decode(&encoded);
        assert_eq!(tile.layers.len(), 1);
        assert_eq!(tile.layers[0].name, "r1");
        assert!(!tile.layers[0].keys.contains(&"rf".to_owned()));
    }

    #[test]
    fn cursor_restarts_at_the_tile_origin_for_each_feature() {
        let first = vec![inside(0.0), inside(0.1), inside(0.2)];
        let second = vec![inside(0.3), inside(0.05)];
        let set = TileFeatureSet {
            key: tile(),
            features: vec![
                feature(1, GeometryKind::Line, "r1", first.clone()),
                feature(2, GeometryKind::Line, "r1", second.clone()),
            ],
        };
        let tile = decode(&encode_tile(&set, 4096));
        let features = &tile.layers[0].features;
        assert_eq!(features.len(), 2);

        for (decoded, line) in features.iter().zip([&first, &second]) {
            let mut encoder = GeometryEncoder::new(set.key, 4096);
            assert_eq!(decoded.geometry, encoder.encode_line(line));
        }
    }

    #[test]
    fn decoded_tile_reproduces_tags_and_geometry() {
        let line = vec![inside(0.0), inside(0.1), outside(0.0)];
        let set = TileFeatureSet {
            key: tile(),
            features: vec![feature(5, GeometryKind::Line, "r1", line.clone())],
        };
        let tile = decode(&encode_tile(&set, 4096));
        let layer = &tile.layers[0];
        let decoded = &layer.features[0];

        let mut encoder = GeometryEncoder::new(set.key, 4096);
        assert_eq!(decoded.geometry, encoder.encode_line(&line));

        let tags: Vec<(String, PropertyValue)> = decoded
            .tags
            .chunks(2)
            .map(|pair| {
                (
                    layer.keys[pair[0] as usize].clone(),
                    layer.values[pair[1] as usize].to_property().unwrap(),
                )
            })
            .collect();
        assert_eq!(
            tags,
            vec![
                ("hw".to_owned(), PropertyValue::from("primary")),
                ("nm".to_owned(), PropertyValue::from("Kaiserstraße")),
            ]
        );
    }
}
