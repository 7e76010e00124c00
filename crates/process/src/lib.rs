mod bucketer;
mod encoder;
mod pipeline;

pub use bucketer::{BucketSummary, TileBucketer, TileFeatureSet};
pub use encoder::{command_integer, encode_tile, zigzag, Command, EncodedTile, GeometryEncoder};
pub use pipeline::{generate, GenerateReport};
