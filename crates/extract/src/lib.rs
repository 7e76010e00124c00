mod block_reader;
mod classifier;
mod element_collection_reader;
mod error;
mod node_lookup;
mod primitive;
pub mod proto;
mod read_osm_data;
#[cfg(test)]
mod test_support;

pub use block_reader::{BlockReader, OsmHeader, RawBlock, MAX_BLOB_HEADER_SIZE, MAX_BLOB_SIZE};
pub use classifier::{
    node_feature, way_feature, Classification, Classifier, ResolvedWay, RuleClassifier,
};
pub use element_collection_reader::ElementCollectReader;
pub use error::ReadError;
pub use node_lookup::{NodeLookup, ResolvedRefs};
pub use primitive::decode_block;
pub use read_osm_data::{collect_and_fill, collect_node_refs, fill_coordinates};
