use std::{
    io::Read,
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
    time::Instant,
};

use anyhow::{anyhow, Context, Result};
use log::{debug, info, warn};
use types::OsmElement;

use crate::{
    classifier::Classifier, element_collection_reader::ElementCollectReader,
    node_lookup::NodeLookup,
};

const REPORTED_MISSING_IDS: usize = 10;

/// Runs both resolver passes over the file at `path`.
pub fn collect_and_fill<C: Classifier + ?Sized>(
    path: &Path,
    classifier: &C,
) -> Result<NodeLookup> {
    let start = Instant::now();
    let ids = collect_node_refs(ElementCollectReader::from_path(path)?, classifier)
        .with_context(|| format!("Collecting node references from {}", path.display()))?;
    info!("Node reference collection: {} seconds", start.elapsed().as_secs());

    let start = Instant::now();
    let lookup = NodeLookup::from_ids(ids);
    info!(
        "Sorted {} referenced node ids: {} seconds",
        lookup.len(),
        start.elapsed().as_secs()
    );

    let start = Instant::now();
    let lookup = fill_coordinates(ElementCollectReader::from_path(path)?, lookup)
        .with_context(|| format!("Filling node coordinates from {}", path.display()))?;
    info!("Node coordinate fill: {} seconds", start.elapsed().as_secs());

    report_unresolved(&lookup);
    Ok(lookup)
}

/// Pass one: every node id referenced by an included way.
pub fn collect_node_refs<R, C>(reader: ElementCollectReader<R>, classifier: &C) -> Result<Vec<i64>>
where
    R: Read + Send,
    C: Classifier + ?Sized,
{
    let relations = AtomicUsize::new(0);
    let refs = reader.elements(|element| match element {
        OsmElement::Way(way) if classifier.way_included(&way.tags) => Some(way.node_ids),
        OsmElement::Relation(relation) => {
            if classifier.relation_included(&relation.tags) {
                relations.fetch_add(1, Ordering::Relaxed);
            }
            None
        }
        _ => None,
    })?;

    let ways = refs.len();
    let ids: Vec<i64> = refs.into_iter().flatten().collect();
    info!(
        "Included ways: {}, node references: {}, included relations: {}",
        ways,
        ids.len(),
        relations.into_inner()
    );
    Ok(ids)
}

/// Pass two: writes the coordinate of every referenced node. Blocks decode in
/// parallel; a single permit serialises the writes of one block at a time.
pub fn fill_coordinates<R: Read + Send>(
    reader: ElementCollectReader<R>,
    lookup: NodeLookup,
) -> Result<NodeLookup> {
    let permit = Mutex::new(lookup);
    let nodes = AtomicUsize::new(0);

    reader.for_each_block(|block, elements| {
        let found: Vec<_> = elements
            .into_iter()
            .filter_map(|element| match element {
                OsmElement::Node(node) => Some((node.id, node.coordinate)),
                _ => None,
            })
            .collect();
        nodes.fetch_add(found.len(), Ordering::Relaxed);

        match permit.lock() {
            Ok(mut lookup) => {
                let stored = found
                    .into_iter()
                    .filter(|(id, coordinate)| lookup.set(*id, *coordinate))
                    .count();
                debug!("Block {}: stored {} coordinates", block.sequence, stored);
            }
            Err(_) => warn!("Node lookup permit poisoned, block {} skipped", block.sequence),
        }
    })?;

    info!("Decoded nodes: {}", nodes.into_inner());
    permit
        .into_inner()
        .map_err(|_| anyhow!("Node lookup permit poisoned"))
}

fn report_unresolved(lookup: &NodeLookup) {
    let unresolved = lookup.len() - lookup.resolved_count();
    if unresolved == 0 {
        info!("All {} referenced nodes resolved", lookup.len());
        return;
    }

    warn!(
        "{} of {} referenced nodes are missing from the input",
        unresolved,
        lookup.len()
    );
    for id in lookup.unresolved_ids().take(REPORTED_MISSING_IDS) {
        debug!("Unresolved node reference {}", id);
    }
}
