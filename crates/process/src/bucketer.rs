use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::Arc,
};

use geo::{BoundingRect, MultiPoint, Point};
use log::debug;
use types::{Bounds, Feature, GeometryKind, TileKey};
use util::geo_math::{column_from_longitude, row_from_latitude, tile_for};

/// All features assigned to one tile.
#[derive(Debug, Clone)]
pub struct TileFeatureSet {
    pub key: TileKey,
    pub features: Vec<Arc<Feature>>,
}

/// What the bucketer saw, for the database metadata.
#[derive(Debug, Clone)]
pub struct BucketSummary {
    pub features: usize,
    pub dropped: usize,
    pub tiles: usize,
    /// Extent of every accepted coordinate; empty if nothing was accepted.
    pub bounds: Bounds,
    /// Property keys seen per layer.
    pub layers: BTreeMap<String, BTreeSet<String>>,
}

/// Assigns features to the tiles of one zoom level.
///
/// Points go to the single tile containing them. Lines and polygons go to
/// every tile of the bounding rectangle of their coordinates, so a feature
/// crossing tile edges is copied into each tile and clipped per tile later.
pub struct TileBucketer {
    zoom: u8,
    tiles: HashMap<u64, TileFeatureSet>,
    bounds: Bounds,
    layers: BTreeMap<String, BTreeSet<String>>,
    features: usize,
    dropped: usize,
}

impl TileBucketer {
    pub fn new(zoom: u8) -> Self {
        TileBucketer {
            zoom,
            tiles: HashMap::new(),
            bounds: Bounds::empty(),
            layers: BTreeMap::new(),
            features: 0,
            dropped: 0,
        }
    }

    /// Returns the number of tiles the feature was assigned to.
    pub fn add(&mut self, feature: Arc<Feature>) -> usize {
        let Some(keys) = self.footprint(&feature) else {
            debug!("Feature {} in layer {} has no coordinates", feature.id, feature.layer);
            self.dropped += 1;
            return 0;
        };

        self.features += 1;
        for coordinate in &feature.coordinates {
            self.bounds.extend(coordinate);
        }
        self.layers
            .entry(feature.layer.clone())
            .or_default()
            .extend(feature.properties.keys().cloned());

        let count = keys.len();
        for key in keys {
            self.tiles
                .entry(key.index())
                .or_insert_with(|| TileFeatureSet {
                    key,
                    features: Vec::new(),
                })
                .features
                .push(feature.clone());
        }
        count
    }

    fn footprint(&self, feature: &Feature) -> Option<Vec<TileKey>> {
        let first = feature.coordinates.first()?;
        if feature.kind == GeometryKind::Point {
            return Some(vec![tile_for(first, self.zoom)]);
        }

        let points: MultiPoint = feature
            .coordinates
            .iter()
            .map(|c| Point::new(c.longitude, c.latitude))
            .collect::<Vec<_>>()
            .into();
        let rect = points.bounding_rect()?;

        let min_column = column_from_longitude(rect.min().x, self.zoom);
        let max_column = column_from_longitude(rect.max().x, self.zoom);
        // Rows grow southwards.
        let min_row = row_from_latitude(rect.max().y, self.zoom);
        let max_row = row_from_latitude(rect.min().y, self.zoom);

        Some(
            (min_row..=max_row)
                .flat_map(|row| {
                    (min_column..=max_column)
                        .map(move |column| TileKey::new(self.zoom, row, column))
                })
                .collect(),
        )
    }

    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    pub fn summary(&self) -> BucketSummary {
        BucketSummary {
            features: self.features,
            dropped: self.dropped,
            tiles: self.tiles.len(),
            bounds: self.bounds,
            layers: self.layers.clone(),
        }
    }

    /// Seals the accumulated tiles for encoding.
    pub fn into_tiles(self) -> impl Iterator<Item = TileFeatureSet> {
        self.tiles.into_values()
    }
}
