//! Builders for small PBF streams used by the unit tests.

use std::io::Write;

use flate2::{write::ZlibEncoder, Compression};
use prost::Message;

use crate::proto::{
    fileformat::{blob::Data, Blob, BlobHeader},
    osmformat::{
        DenseNodes, HeaderBlock, PrimitiveBlock, PrimitiveGroup, StringTable, Way,
    },
};

pub fn raw_blob(data: &[u8]) -> Blob {
    Blob {
        raw_size: Some(data.len() as i32),
        data: Some(Data::Raw(data.to_vec())),
    }
}

pub fn zlib_blob(data: &[u8]) -> Blob {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    Blob {
        raw_size: Some(data.len() as i32),
        data: Some(Data::ZlibData(encoder.finish().unwrap())),
    }
}

pub fn frame(kind: &str, blob: Blob) -> Vec<u8> {
    let blob = blob.encode_to_vec();
    let header = BlobHeader {
        r#type: kind.to_owned(),
        indexdata: None,
        datasize: blob.len() as i32,
    }
    .encode_to_vec();

    let mut bytes = (header.len() as u32).to_be_bytes().to_vec();
    bytes.extend(header);
    bytes.extend(blob);
    bytes
}

pub fn header_frame(required_features: &[&str]) -> Vec<u8> {
    let header = HeaderBlock {
        required_features: required_features.iter().map(|f| f.to_string()).collect(),
        ..HeaderBlock::default()
    };
    frame("OSMHeader", raw_blob(&header.encode_to_vec()))
}

#[derive(Default)]
struct BlockContent {
    strings: Vec<String>,
    dense: DenseNodes,
    last: (i64, i64, i64),
    ways: Vec<Way>,
}

impl BlockContent {
    fn string(&mut self, value: &str) -> u32 {
        if self.strings.is_empty() {
            self.strings.push(String::new());
        }
        match self.strings.iter().position(|s| s == value) {
            Some(index) => index as u32,
            None => {
                self.strings.push(value.to_owned());
                (self.strings.len() - 1) as u32
            }
        }
    }

    fn into_block(self) -> PrimitiveBlock {
        let mut group = PrimitiveGroup {
            ways: self.ways,
            ..PrimitiveGroup::default()
        };
        if !self.dense.id.is_empty() {
            group.dense = Some(self.dense);
        }
        PrimitiveBlock {
            stringtable: StringTable {
                s: self.strings.into_iter().map(String::into_bytes).collect(),
            },
            primitivegroup: vec![group],
            ..PrimitiveBlock::default()
        }
    }
}

/// Writes nodes (as dense nodes) and ways into zlib compressed data blocks.
#[derive(Default)]
pub struct PbfBuilder {
    blocks: Vec<BlockContent>,
    current: BlockContent,
}

impl PbfBuilder {
    pub fn new() -> Self {
        PbfBuilder::default()
    }

    pub fn node(mut self, id: i64, lat: f64, lon: f64, tags: &[(&str, &str)]) -> Self {
        let raw_lat = (lat * 1e7).round() as i64;
        let raw_lon = (lon * 1e7).round() as i64;
        let block = &mut self.current;
        let (last_id, last_lat, last_lon) = block.last;
        block.dense.id.push(id - last_id);
        block.dense.lat.push(raw_lat - last_lat);
        block.dense.lon.push(raw_lon - last_lon);
        block.last = (id, raw_lat, raw_lon);

        for (key, value) in tags {
            let key = block.string(key) as i32;
            let value = block.string(value) as i32;
            block.dense.keys_vals.extend([key, value]);
        }
        block.dense.keys_vals.push(0);
        self
    }

    pub fn way(mut self, id: i64, refs: &[i64], tags: &[(&str, &str)]) -> Self {
        let block = &mut self.current;
        let mut way = Way {
            id,
            ..Way::default()
        };
        let mut last = 0;
        for node_id in refs {
            way.refs.push(node_id - last);
            last = *node_id;
        }
        for (key, value) in tags {
            way.keys.push(block.string(key));
            way.vals.push(block.string(value));
        }
        block.ways.push(way);
        self
    }

    /// Starts a new data block.
    pub fn split(mut self) -> Self {
        let full = std::mem::take(&mut self.current);
        self.blocks.push(full);
        self
    }

    pub fn finish(mut self) -> Vec<u8> {
        let last = std::mem::take(&mut self.current);
        self.blocks.push(last);

        let mut bytes = header_frame(&["OsmSchema-V0.6", "DenseNodes"]);
        for block in self.blocks {
            let block = block.into_block().encode_to_vec();
            bytes.extend(frame("OSMData", zlib_blob(&block)));
        }
        bytes
    }
}
