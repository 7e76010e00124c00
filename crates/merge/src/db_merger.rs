use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::{
    collections::{BTreeMap, BTreeSet},
    path::Path,
    str::FromStr,
    time::Instant,
};
use types::{Bounds, Metadata};
use util::{vector_layers_json, StoredTileKey, TileStore};

use crate::{merge_tiles, MergeError};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeReport {
    /// Keys present in both sources.
    pub merged: usize,
    pub only_a: usize,
    pub only_b: usize,
    pub bounds: Option<Bounds>,
}

impl MergeReport {
    pub fn tiles(&self) -> usize {
        self.merged + self.only_a + self.only_b
    }
}

/// Writes the union of two tile databases into `out`.
///
/// Pass one walks A's keys and writes A's tile, merged with B's where B has
/// the same key. Pass two copies the tiles only B has. Each pass is one
/// transaction. Bounds and layer metadata of both sources are validated
/// before anything is written; the merged metadata is written last.
pub fn merge_databases(
    source_a: &Path,
    source_b: &Path,
    out: &Path,
    name: &str,
    description: &str,
) -> Result<MergeReport> {
    info!(
        "Merging {} and {} to {}...",
        source_a.display(),
        source_b.display(),
        out.display()
    );
    let start = Instant::now();

    let a = TileStore::open(source_a)?;
    let b = TileStore::open(source_b)?;

    // Source metadata is checked before the output is touched.
    let bounds = read_bounds(&a)?.merge(&read_bounds(&b)?);
    let mut metadata = Metadata::new(name, description, bounds);
    metadata.min_zoom = min_option(read_zoom(&a, "minzoom")?, read_zoom(&b, "minzoom")?);
    metadata.max_zoom = read_zoom(&a, "maxzoom")?.max(read_zoom(&b, "maxzoom")?);
    metadata.json = merged_layers_json(&a, &b, metadata.max_zoom)?;

    let mut output = TileStore::create_or_open(out)?;
    let mut report = MergeReport {
        bounds: Some(bounds),
        ..MergeReport::default()
    };

    let transaction = output.transaction()?;
    for key in a.tile_keys()? {
        let tile_a = a
            .tile(&key)?
            .ok_or_else(|| missing_tile(&key, source_a))?;
        let data = match b.tile(&key)? {
            Some(tile_b) => {
                report.merged += 1;
                merge_tiles(&tile_a, &tile_b).with_context(|| {
                    format!("Failed to merge tile {}/{}/{}", key.zoom, key.column, key.row)
                })?
            }
            None => {
                report.only_a += 1;
                tile_a
            }
        };
        transaction.put_tile(&key, &data)?;
    }
    transaction.commit()?;
    debug!("Pass one: {} merged, {} copied from A", report.merged, report.only_a);

    let transaction = output.transaction()?;
    for key in b.tile_keys()? {
        if a.contains(&key)? {
            continue;
        }
        let tile_b = b
            .tile(&key)?
            .ok_or_else(|| missing_tile(&key, source_b))?;
        transaction.put_tile(&key, &tile_b)?;
        report.only_b += 1;
    }
    transaction.commit()?;
    debug!("Pass two: {} copied from B", report.only_b);

    output.write_metadata(&metadata)?;

    info!("Merge: {} seconds", start.elapsed().as_secs());
    info!("{:?}", report);
    Ok(report)
}

/// Checks that every tile key of `small` is present in `large`. Returns the
/// number of keys checked.
pub fn verify_merge(small: &Path, large: &Path) -> Result<usize> {
    info!("Verifying {}...", small.display());
    let small_store = TileStore::open(small)?;
    let large_store = TileStore::open(large)?;

    let keys = small_store.tile_keys()?;
    for key in &keys {
        if !large_store.contains(key)? {
            return Err(missing_tile(key, large).into());
        }
    }

    info!(
        "Verified that {} is subset of {}",
        small.display(),
        large.display()
    );
    Ok(keys.len())
}

fn missing_tile(key: &StoredTileKey, path: &Path) -> MergeError {
    MergeError::MissingTile {
        zoom: key.zoom,
        column: key.column,
        row: key.row,
        path: path.display().to_string(),
    }
}

fn read_bounds(store: &TileStore) -> Result<Bounds> {
    let path = store.path().display().to_string();
    let value = store
        .metadata("bounds")?
        .ok_or_else(|| MergeError::MissingBounds(path.clone()))?;
    Ok(Bounds::from_str(&value).map_err(|source| MergeError::InvalidBounds { path, source })?)
}

fn read_zoom(store: &TileStore, name: &str) -> Result<Option<u8>> {
    let zoom = store.metadata(name)?.and_then(|value| {
        let parsed = value.trim().parse().ok();
        if parsed.is_none() {
            warn!("Ignoring {} {:?} of {}", name, value, store.path().display());
        }
        parsed
    });
    Ok(zoom)
}

fn min_option(a: Option<u8>, b: Option<u8>) -> Option<u8> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

/// Union of the `vector_layers` of both sources, fields merged per layer id.
fn merged_layers_json(a: &TileStore, b: &TileStore, zoom: Option<u8>) -> Result<Option<String>> {
    let mut layers: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let mut found = false;

    for store in [a, b] {
        let Some(json) = store.metadata("json")? else {
            continue;
        };
        let document: serde_json::Value = serde_json::from_str(&json).with_context(|| {
            format!("Invalid json metadata in {}", store.path().display())
        })?;
        found = true;

        let vector_layers = document["vector_layers"].as_array().into_iter().flatten();
        for layer in vector_layers {
            let Some(id) = layer["id"].as_str() else {
                continue;
            };
            let fields = layers.entry(id.to_owned()).or_default();
            if let Some(object) = layer["fields"].as_object() {
                fields.extend(object.keys().cloned());
            }
        }
    }

    Ok(found.then(|| vector_layers_json(&layers, zoom.unwrap_or_default())))
}
