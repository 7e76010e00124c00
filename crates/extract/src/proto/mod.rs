//! OSM PBF messages, declared with prost. Info/DenseInfo/ChangeSet fields are
//! left out and skipped while decoding.

pub mod fileformat;
pub mod osmformat;
