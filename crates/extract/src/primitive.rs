use prost::Message;
use types::{
    Coordinate, MemberKind, OsmElement, OsmNode, OsmRelation, OsmWay, RelationMember, Tags,
};

use crate::{
    proto::osmformat::{DenseNodes, MemberType, PrimitiveBlock, PrimitiveGroup},
    ReadError,
};

/// Decodes one `OSMData` payload into nodes, ways and relations, in the
/// order they appear in the block.
pub fn decode_block(data: &[u8]) -> Result<Vec<OsmElement>, ReadError> {
    let block = PrimitiveBlock::decode(data)?;
    let decoder = BlockDecoder::new(&block);

    let mut elements = Vec::new();
    for group in &block.primitivegroup {
        decoder.decode_group(group, &mut elements)?;
    }
    Ok(elements)
}

struct BlockDecoder<'a> {
    strings: Vec<String>,
    block: &'a PrimitiveBlock,
}

impl<'a> BlockDecoder<'a> {
    fn new(block: &'a PrimitiveBlock) -> Self {
        let strings = block
            .stringtable
            .s
            .iter()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .collect();
        BlockDecoder { strings, block }
    }

    fn string(&self, index: usize) -> Result<&str, ReadError> {
        self.strings
            .get(index)
            .map(String::as_str)
            .ok_or(ReadError::StringIndex(index))
    }

    fn coordinate(&self, raw_lat: i64, raw_lon: i64) -> Coordinate {
        let granularity = self.block.granularity() as i64;
        Coordinate::new(
            1e-9 * (self.block.lat_offset() + granularity * raw_lat) as f64,
            1e-9 * (self.block.lon_offset() + granularity * raw_lon) as f64,
        )
    }

    fn tags(&self, keys: &[u32], vals: &[u32]) -> Result<Tags, ReadError> {
        if keys.len() != vals.len() {
            return Err(ReadError::Malformed("keys and vals differ in length"));
        }
        keys.iter()
            .zip(vals)
            .map(|(key, val)| {
                Ok((
                    self.string(*key as usize)?.to_owned(),
                    self.string(*val as usize)?.to_owned(),
                ))
            })
            .collect()
    }

    fn decode_group(
        &self,
        group: &PrimitiveGroup,
        elements: &mut Vec<OsmElement>,
    ) -> Result<(), ReadError> {
        for node in &group.nodes {
            elements.push(OsmElement::Node(OsmNode {
                id: node.id,
                coordinate: self.coordinate(node.lat, node.lon),
                tags: self.tags(&node.keys, &node.vals)?,
            }));
        }

        if let Some(dense) = &group.dense {
            self.decode_dense(dense, elements)?;
        }

        for way in &group.ways {
            let mut node_id = 0i64;
            let node_ids = way
                .refs
                .iter()
                .map(|delta| {
                    node_id += delta;
                    node_id
                })
                .collect();
            elements.push(OsmElement::Way(OsmWay {
                id: way.id,
                node_ids,
                tags: self.tags(&way.keys, &way.vals)?,
            }));
        }

        for relation in &group.relations {
            if relation.memids.len() != relation.roles_sid.len()
                || relation.memids.len() != relation.types.len()
            {
                return Err(ReadError::Malformed("relation member arrays differ in length"));
            }

            let mut member_id = 0i64;
            let mut members = Vec::with_capacity(relation.memids.len());
            for ((delta, role), kind) in relation
                .memids
                .iter()
                .zip(&relation.roles_sid)
                .zip(&relation.types)
            {
                member_id += delta;
                let kind = match MemberType::try_from(*kind) {
                    Ok(MemberType::Node) => MemberKind::Node,
                    Ok(MemberType::Way) => MemberKind::Way,
                    Ok(MemberType::Relation) => MemberKind::Relation,
                    Err(_) => return Err(ReadError::Malformed("unknown relation member type")),
                };
                members.push(RelationMember {
                    id: member_id,
                    role: self.string(*role as usize)?.to_owned(),
                    kind,
                });
            }

            elements.push(OsmElement::Relation(OsmRelation {
                id: relation.id,
                members,
                tags: self.tags(&relation.keys, &relation.vals)?,
            }));
        }

        Ok(())
    }

    fn decode_dense(
        &self,
        dense: &DenseNodes,
        elements: &mut Vec<OsmElement>,
    ) -> Result<(), ReadError> {
        if dense.id.len() != dense.lat.len() || dense.id.len() != dense.lon.len() {
            return Err(ReadError::Malformed("dense node arrays differ in length"));
        }

        let mut keys_vals = dense.keys_vals.iter();
        let (mut id, mut lat, mut lon) = (0i64, 0i64, 0i64);

        for ((delta_id, delta_lat), delta_lon) in dense.id.iter().zip(&dense.lat).zip(&dense.lon) {
            id += delta_id;
            lat += delta_lat;
            lon += delta_lon;

            // An empty keys_vals array means no node of the block has tags.
            let mut tags = Tags::new();
            while let Some(&key) = keys_vals.next() {
                if key == 0 {
                    break;
                }
                let value = keys_vals
                    .next()
                    .ok_or(ReadError::Malformed("dense keys_vals ends after a key"))?;
                tags.insert(
                    self.string(key as usize)?.to_owned(),
                    self.string(*value as usize)?.to_owned(),
                );
            }

            elements.push(OsmElement::Node(OsmNode {
                id,
                coordinate: self.coordinate(lat, lon),
                tags,
            }));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::osmformat::{Node, Relation, StringTable, Way};

    fn strings(values: &[&str]) -> StringTable {
        StringTable {
            s: values.iter().map(|s| s.as_bytes().to_vec()).collect(),
        }
    }

    fn block(groups: Vec<PrimitiveGroup>) -> PrimitiveBlock {
        PrimitiveBlock {
            stringtable: strings(&["", "highway", "residential", "name", "Kaiserstraße", "outer"]),
            primitivegroup: groups,
            ..PrimitiveBlock::default()
        }
    }

    fn decode(block: &PrimitiveBlock) -> Vec<OsmElement> {
        decode_block(&block.encode_to_vec()).unwrap()
    }

    #[test]
    fn dense_nodes_are_delta_decoded() {
        let group = PrimitiveGroup {
            dense: Some(DenseNodes {
                id: vec![10, 1, 5],
                lat: vec![490_000_000, 100, -50],
                lon: vec![84_000_000, -10, 20],
                keys_vals: vec![0, 1, 2, 3, 4, 0, 0],
            }),
            ..PrimitiveGroup::default()
        };

        let elements = decode(&block(vec![group]));
        let nodes: Vec<&OsmNode> = elements
            .iter()
            .map(|element| match element {
                OsmElement::Node(node) => node,
                other => panic!("unexpected {other:?}"),
            })
            .collect();

        assert_eq!(nodes.iter().map(|n| n.id).collect::<Vec<_>>(), vec![10, 11, 16]);
        assert!((nodes[1].coordinate.latitude - 49.00001).abs() < 1e-9);
        assert!((nodes[1].coordinate.longitude - 8.399999).abs() < 1e-9);
        assert!(nodes[0].tags.is_empty());
        assert_eq!(nodes[1].tags.get("highway").map(String::as_str), Some("residential"));
        assert_eq!(nodes[1].tags.get("name").map(String::as_str), Some("Kaiserstraße"));
        assert!(nodes[2].tags.is_empty());
    }

    #[test]
    fn granularity_and_offsets_apply() {
        let mut block = block(vec![PrimitiveGroup {
            nodes: vec![Node {
                id: 7,
                keys: vec![],
                vals: vec![],
                lat: 49,
                lon: 8,
            }],
            ..PrimitiveGroup::default()
        }]);
        block.granularity = Some(1_000_000_000);
        block.lat_offset = Some(500_000_000);

        match &decode(&block)[0] {
            OsmElement::Node(node) => {
                assert!((node.coordinate.latitude - 49.5).abs() < 1e-9);
                assert!((node.coordinate.longitude - 8.0).abs() < 1e-9);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn way_refs_and_relation_members_are_delta_decoded() {
        let group = PrimitiveGroup {
            ways: vec![Way {
                id: 100,
                keys: vec![1],
                vals: vec![2],
                refs: vec![5, 1, 1, -2],
            }],
            relations: vec![Relation {
                id: 200,
                keys: vec![],
                vals: vec![],
                roles_sid: vec![5, 0],
                memids: vec![100, -90],
                types: vec![MemberType::Way as i32, MemberType::Node as i32],
            }],
            ..PrimitiveGroup::default()
        };

        let elements = decode(&block(vec![group]));
        match &elements[0] {
            OsmElement::Way(way) => {
                assert_eq!(way.id, 100);
                assert_eq!(way.node_ids, vec![5, 6, 7, 5]);
                assert_eq!(way.tags.get("highway").map(String::as_str), Some("residential"));
            }
            other => panic!("unexpected {other:?}"),
        }
        match &elements[1] {
            OsmElement::Relation(relation) => {
                assert_eq!(relation.members.len(), 2);
                assert_eq!(relation.members[0].id, 100);
                assert_eq!(relation.members[0].role, "outer");
                assert_eq!(relation.members[0].kind, MemberKind::Way);
                assert_eq!(relation.members[1].id, 10);
                assert_eq!(relation.members[1].kind, MemberKind::Node);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let block = PrimitiveBlock {
            stringtable: StringTable {
                s: vec![vec![], b"name".to_vec(), vec![0x66, 0xff, 0x6f]],
            },
            primitivegroup: vec![PrimitiveGroup {
                nodes: vec![Node {
                    id: 1,
                    keys: vec![1],
                    vals: vec![2],
                    lat: 0,
                    lon: 0,
                }],
                ..PrimitiveGroup::default()
            }],
            ..PrimitiveBlock::default()
        };

        match &decode(&block)[0] {
            OsmElement::Node(node) => assert_eq!(node.tags["name"], "f\u{fffd}o"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn string_index_out_of_range_is_an_error() {
        let block = block(vec![PrimitiveGroup {
            ways: vec![Way {
                id: 1,
                keys: vec![42],
                vals: vec![1],
                refs: vec![],
            }],
            ..PrimitiveGroup::default()
        }]);

        assert!(matches!(
            decode_block(&block.encode_to_vec()),
            Err(ReadError::StringIndex(42))
        ));
    }

    #[test]
    fn garbage_is_a_protobuf_error() {
        assert!(matches!(
            decode_block(&[0xff, 0xff, 0xff]),
            Err(ReadError::Protobuf(_))
        ));
    }
}
