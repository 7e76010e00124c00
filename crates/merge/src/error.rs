use types::BoundsParseError;

#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("could not decode tile {side}: {source}")]
    Decode {
        side: &'static str,
        source: prost::DecodeError,
    },

    #[error("layer {layer:?}: tag index {index} is out of range")]
    DanglingTag { layer: String, index: u32 },

    #[error("layer {layer:?}: feature has an odd number of tag indices")]
    OddTagCount { layer: String },

    #[error("did not find tile {zoom}/{column}/{row} in {path}")]
    MissingTile {
        zoom: u8,
        column: u32,
        row: u32,
        path: String,
    },

    #[error("could not find bounds in metadata of {0}")]
    MissingBounds(String),

    #[error("invalid bounds in metadata of {path}: {source}")]
    InvalidBounds {
        path: String,
        source: BoundsParseError,
    },
}
