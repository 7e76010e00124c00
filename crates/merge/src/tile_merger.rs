use std::collections::{HashMap, HashSet};

use prost::Message;
use types::ValueKey;
use util::vector_tile::{Layer, Tile};

use crate::MergeError;

const DEFAULT_EXTENT: u32 = 4096;

/// Merges two encoded tiles of the same tile key.
///
/// The result is A with B's content added: layers missing from A are
/// appended, B's keys and values are mapped onto A's dictionaries (appending
/// what A lacks) and B's features are appended with remapped tags, unless A
/// already has a feature with the same id.
pub fn merge_tiles(a: &[u8], b: &[u8]) -> Result<Vec<u8>, MergeError> {
    let mut tile_a =
        Tile::decode(a).map_err(|source| MergeError::Decode { side: "A", source })?;
    let tile_b = Tile::decode(b).map_err(|source| MergeError::Decode { side: "B", source })?;

    merge_tile_messages(&mut tile_a, tile_b)?;
    Ok(tile_a.encode_to_vec())
}

pub fn merge_tile_messages(target: &mut Tile, other: Tile) -> Result<(), MergeError> {
    for layer in other.layers {
        let extent = layer.extent.unwrap_or(DEFAULT_EXTENT);
        let index = target.get_or_create_layer(&layer.name, extent);
        merge_layer(&mut target.layers[index], layer)?;
    }
    Ok(())
}

fn merge_layer(target: &mut Layer, other: Layer) -> Result<(), MergeError> {
    let mut key_index: HashMap<String, u32> = target
        .keys
        .iter()
        .enumerate()
        .map(|(i, key)| (key.clone(), i as u32))
        .collect();
    let key_map: Vec<u32> = other
        .keys
        .into_iter()
        .map(|key| {
            *key_index.entry(key).or_insert_with_key(|key| {
                target.keys.push(key.clone());
                (target.keys.len() - 1) as u32
            })
        })
        .collect();

    // Values that decode to nothing comparable are never treated as equal.
    let mut value_index: HashMap<ValueKey, u32> = HashMap::new();
    for (i, value) in target.values.iter().enumerate() {
        if let Some(property) = value.to_property() {
            value_index.entry(property.key()).or_insert(i as u32);
        }
    }
    let value_map: Vec<u32> = other
        .values
        .into_iter()
        .map(|value| {
            let existing = value
                .to_property()
                .and_then(|property| value_index.get(&property.key()).copied());
            existing.unwrap_or_else(|| {
                if let Some(property) = value.to_property() {
                    value_index.insert(property.key(), target.values.len() as u32);
                }
                target.values.push(value);
                (target.values.len() - 1) as u32
            })
        })
        .collect();

    let known_ids: HashSet<u64> = target.features.iter().filter_map(|f| f.id).collect();
    for mut feature in other.features {
        if feature.id.is_some_and(|id| known_ids.contains(&id)) {
            continue;
        }
        if feature.tags.len() % 2 != 0 {
            return Err(MergeError::OddTagCount {
                layer: target.name.clone(),
            });
        }

        for (position, tag) in feature.tags.iter_mut().enumerate() {
            let map = if position % 2 == 0 { &key_map } else { &value_map };
            let index = *tag;
            *tag = *map.get(index as usize).ok_or_else(|| MergeError::DanglingTag {
                layer: target.name.clone(),
                index,
            })?;
        }
        target.features.push(feature);
    }

    Ok(())
}
