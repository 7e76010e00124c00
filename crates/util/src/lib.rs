pub mod geo_math;
pub mod mbtiles;
pub mod vector_tile;

pub use mbtiles::{vector_layers_json, StoredTileKey, TileStore, TileTransaction};
