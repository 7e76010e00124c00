use std::io;

use crate::block_reader::{MAX_BLOB_HEADER_SIZE, MAX_BLOB_SIZE};

/// Fatal conditions while framing or decoding an OSM PBF stream.
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("io: {0}")]
    Io(#[from] io::Error),

    #[error("protobuf: {0}")]
    Protobuf(#[from] prost::DecodeError),

    #[error("stream ended inside a frame while reading {0}")]
    Truncated(&'static str),

    #[error("stream contains no OSMHeader block")]
    MissingHeader,

    #[error("BlobHeader size {0} >= {max}", max = MAX_BLOB_HEADER_SIZE)]
    BlobHeaderTooLarge(u32),

    #[error("Blob size {0} >= {max}", max = MAX_BLOB_SIZE)]
    BlobTooLarge(i64),

    #[error("negative size {0} in blob framing")]
    NegativeSize(i32),

    #[error("raw blob data size {got} but expected {expected}")]
    SizeMismatch { got: usize, expected: usize },

    #[error("unsupported compression: {0} (supported: raw and zlib)")]
    UnsupportedCompression(&'static str),

    #[error("blob carries no data")]
    MissingBlobData,

    #[error("BlobHeader.type: got {got:?}, expected {expected:?}")]
    UnexpectedBlockType { got: String, expected: &'static str },

    #[error("parser does not have {0:?} capability")]
    UnsupportedFeatures(Vec<String>),

    #[error("string table index {0} out of range")]
    StringIndex(usize),

    #[error("malformed primitive: {0}")]
    Malformed(&'static str),
}
