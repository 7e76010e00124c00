//! Writes small OSM PBF files for the integration tests.

use std::io::Write;

use extract::proto::{
    fileformat::{blob::Data, Blob, BlobHeader},
    osmformat::{DenseNodes, HeaderBlock, PrimitiveBlock, PrimitiveGroup, StringTable, Way},
};
use flate2::{write::ZlibEncoder, Compression};
use prost::Message;

fn frame(kind: &str, payload: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(payload).unwrap();
    let blob = Blob {
        raw_size: Some(payload.len() as i32),
        data: Some(Data::ZlibData(encoder.finish().unwrap())),
    }
    .encode_to_vec();

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

/// One data block of dense nodes followed by ways.
#[derive(Default)]
pub struct PbfFixture {
    strings: Vec<String>,
    nodes: Vec<(i64, f64, f64, Vec<(u32, u32)>)>,
    ways: Vec<Way>,
}

impl PbfFixture {
    pub fn new() -> Self {
        PbfFixture {
            strings: vec![String::new()],
            ..PbfFixture::default()
        }
    }

    fn string(&mut self, value: &str) -> u32 {
        match self.strings.iter().position(|s| s == value) {
            Some(index) => index as u32,
            None => {
                self.strings.push(value.to_owned());
                (self.strings.len() - 1) as u32
            }
        }
    }

    pub fn node(mut self, id: i64, lat: f64, lon: f64, tags: &[(&str, &str)]) -> Self {
        let tags = tags
            .iter()
            .map(|(key, value)| (self.string(key), self.string(value)))
            .collect();
        self.nodes.push((id, lat, lon, tags));
        self
    }

    pub fn way(mut self, id: i64, refs: &[i64], tags: &[(&str, &str)]) -> Self {
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
            way.keys.push(self.string(key));
            way.vals.push(self.string(value));
        }
        self.ways.push(way);
        self
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut dense = DenseNodes::default();
        let (mut last_id, mut last_lat, mut last_lon) = (0i64, 0i64, 0i64);
        for (id, lat, lon, tags) in &self.nodes {
            let lat = (lat * 1e7).round() as i64;
            let lon = (lon * 1e7).round() as i64;
            dense.id.push(id - last_id);
            dense.lat.push(lat - last_lat);
            dense.lon.push(lon - last_lon);
            (last_id, last_lat, last_lon) = (*id, lat, lon);

            for (key, value) in tags {
                dense.keys_vals.extend([*key as i32, *value as i32]);
            }
            dense.keys_vals.push(0);
        }

        let block = PrimitiveBlock {
            stringtable: StringTable {
                s: self.strings.iter().map(|s| s.as_bytes().to_vec()).collect(),
            },
            primitivegroup: vec![PrimitiveGroup {
                dense: Some(dense),
                ways: self.ways.clone(),
                ..PrimitiveGroup::default()
            }],
            ..PrimitiveBlock::default()
        };
        let header = HeaderBlock {
            required_features: vec!["OsmSchema-V0.6".to_owned(), "DenseNodes".to_owned()],
            writingprogram: Some("fixture".to_owned()),
            ..HeaderBlock::default()
        };

        let mut bytes = frame("OSMHeader", &header.encode_to_vec());
        bytes.extend(frame("OSMData", &block.encode_to_vec()));
        bytes
    }
}
