use std::{
    path::Path,
    sync::Arc,
    thread::{self, ScopedJoinHandle},
    time::Instant,
};

use anyhow::{anyhow, ensure, Context, Result};
use crossbeam_channel::{bounded, Receiver, Sender};
use extract::{
    collect_and_fill, node_feature, way_feature, BlockReader, Classifier, NodeLookup, OsmHeader,
    RawBlock,
};
use log::{debug, info, warn};
use types::{Bounds, Feature, Metadata, OsmElement, TileMakerConfig, MAX_ZOOM};
use util::{vector_layers_json, StoredTileKey, TileStore};

use crate::{
    bucketer::{BucketSummary, TileBucketer, TileFeatureSet},
    encoder::{encode_tile, EncodedTile},
};

const WORLD: Bounds = Bounds {
    left: -180.0,
    bottom: -85.0511,
    right: 180.0,
    top: 85.0511,
};

/// Counters of one `generate` run.
#[derive(Debug, Clone, Default)]
pub struct GenerateReport {
    pub nodes: usize,
    pub ways: usize,
    pub relations: usize,
    pub features: usize,
    pub missing_refs: usize,
    pub tiles_written: usize,
    pub empty_tiles: usize,
    pub bounds: Option<Bounds>,
}

#[derive(Debug, Default)]
struct ClassifyStats {
    nodes: usize,
    ways: usize,
    relations: usize,
    missing_refs: usize,
}

#[derive(Debug, Default)]
struct EncodeStats {
    encoded: usize,
    empty: usize,
}

/// Converts the PBF file at `input` into vector tiles stored in `output`.
///
/// Runs the two node resolver passes, then streams the file a third time
/// through reader, classifier, bucketing, encoder and writer stages joined
/// by bounded channels. Tiles are written in one transaction that is only
/// committed when every stage finished without error.
pub fn generate<C: Classifier + ?Sized>(
    config: &TileMakerConfig,
    classifier: &C,
    input: &Path,
    output: &Path,
    threads: usize,
) -> Result<GenerateReport> {
    ensure!(
        config.zoom <= MAX_ZOOM,
        "Zoom {} is above the maximum zoom {}",
        config.zoom,
        MAX_ZOOM
    );
    let threads = threads.max(1);
    let lookup = Arc::new(collect_and_fill(input, classifier)?);

    let mut store = TileStore::create_or_open(output)?;
    let start = Instant::now();
    let (header, classified, summary, encoded, written) =
        run_stages(config, classifier, lookup, input, &mut store, threads)?;
    info!("Tile generation: {} seconds", start.elapsed().as_secs());

    let bounds = match (header.bbox, summary.bounds.is_empty()) {
        (Some(bbox), _) => bbox,
        (None, false) => summary.bounds,
        (None, true) => {
            warn!("No features accepted, writing world bounds");
            WORLD
        }
    };

    let mut metadata = Metadata::new(&config.name, &config.description, bounds);
    metadata.min_zoom = Some(config.zoom);
    metadata.max_zoom = Some(config.zoom);
    metadata.json = Some(vector_layers_json(&summary.layers, config.zoom));
    store.write_metadata(&metadata)?;

    let report = GenerateReport {
        nodes: classified.nodes,
        ways: classified.ways,
        relations: classified.relations,
        features: summary.features,
        missing_refs: classified.missing_refs,
        tiles_written: written,
        empty_tiles: encoded.empty,
        bounds: Some(bounds),
    };
    info!("{:?}", report);
    Ok(report)
}

type StageOutput = (OsmHeader, ClassifyStats, BucketSummary, EncodeStats, usize);

fn run_stages<C: Classifier + ?Sized>(
    config: &TileMakerConfig,
    classifier: &C,
    lookup: Arc<NodeLookup>,
    input: &Path,
    store: &mut TileStore,
    threads: usize,
) -> Result<StageOutput> {
    let mut reader = BlockReader::from_path(input)
        .with_context(|| format!("Could not open {}", input.display()))?;
    let header = reader.read_header()?.clone();

    let (block_tx, block_rx) = bounded::<RawBlock>(config.queue_len);
    let (feature_tx, feature_rx) = bounded::<Arc<Feature>>(config.queue_len);
    let (set_tx, set_rx) = bounded::<TileFeatureSet>(config.queue_len);
    let (tile_tx, tile_rx) = bounded::<EncodedTile>(config.queue_len);
    let (commit_tx, commit_rx) = bounded::<bool>(1);

    thread::scope(|scope| {
        let read = scope.spawn(move || read_blocks(reader, block_tx));

        let classify: Vec<_> = (0..threads)
            .map(|_| {
                let blocks = block_rx.clone();
                let features = feature_tx.clone();
                let lookup = lookup.clone();
                scope.spawn(move || classify_blocks(classifier, &lookup, blocks, features))
            })
            .collect();
        drop((block_rx, feature_tx));

        let zoom = config.zoom;
        let bucket = scope.spawn(move || bucket_features(zoom, feature_rx, set_tx));

        let extent = config.extent;
        let encode: Vec<_> = (0..threads)
            .map(|_| {
                let sets = set_rx.clone();
                let tiles = tile_tx.clone();
                scope.spawn(move || encode_tiles(extent, sets, tiles))
            })
            .collect();
        drop((set_rx, tile_tx));

        let write = scope.spawn(move || write_tiles(store, tile_rx, commit_rx));

        let read = join(read);
        let classified = join_all(classify).map(|stats| {
            stats.into_iter().fold(ClassifyStats::default(), |mut total, s| {
                total.nodes += s.nodes;
                total.ways += s.ways;
                total.relations += s.relations;
                total.missing_refs += s.missing_refs;
                total
            })
        });
        let summary = join(bucket);
        let encoded = join_all(encode).map(|stats| {
            stats.into_iter().fold(EncodeStats::default(), |mut total, s| {
                total.encoded += s.encoded;
                total.empty += s.empty;
                total
            })
        });

        let upstream_ok = read.is_ok() && classified.is_ok() && summary.is_ok() && encoded.is_ok();
        // The writer may already have failed and dropped the receiver.
        let _ = commit_tx.send(upstream_ok);
        let written = join(write);

        read?;
        Ok((header, classified?, summary?, encoded?, written?))
    })
}

fn join<T>(handle: ScopedJoinHandle<'_, Result<T>>) -> Result<T> {
    handle
        .join()
        .map_err(|_| anyhow!("Pipeline stage panicked"))?
}

fn join_all<T>(handles: Vec<ScopedJoinHandle<'_, Result<T>>>) -> Result<Vec<T>> {
    let results: Vec<Result<T>> = handles.into_iter().map(join).collect();
    results.into_iter().collect()
}

fn read_blocks<R: std::io::Read>(reader: BlockReader<R>, blocks: Sender<RawBlock>) -> Result<()> {
    let mut count = 0;
    for block in reader {
        if blocks.send(block?).is_err() {
            debug!("Block channel closed after {} blocks", count);
            break;
        }
        count += 1;
    }
    info!("Read {} data blocks", count);
    Ok(())
}

fn classify_blocks<C: Classifier + ?Sized>(
    classifier: &C,
    lookup: &NodeLookup,
    blocks: Receiver<RawBlock>,
    features: Sender<Arc<Feature>>,
) -> Result<ClassifyStats> {
    let mut stats = ClassifyStats::default();

    for block in blocks {
        let elements = block
            .decode()
            .with_context(|| format!("Decoding data block {}", block.sequence))?;

        for element in elements {
            let feature = match element {
                OsmElement::Node(node) => {
                    stats.nodes += 1;
                    node_feature(classifier, &node)
                }
                OsmElement::Way(way) => {
                    stats.ways += 1;
                    way_feature(classifier, &way, lookup).and_then(|resolved| {
                        if !resolved.missing.is_empty() {
                            debug!(
                                "Way {} misses {} node coordinates",
                                way.id,
                                resolved.missing.len()
                            );
                            stats.missing_refs += resolved.missing.len();
                        }
                        resolved.feature
                    })
                }
                OsmElement::Relation(relation) => {
                    if classifier.relation_included(&relation.tags) {
                        stats.relations += 1;
                    }
                    None
                }
            };

            if let Some(feature) = feature {
                if features.send(Arc::new(feature)).is_err() {
                    return Ok(stats);
                }
            }
        }
    }
    Ok(stats)
}

fn bucket_features(
    zoom: u8,
    features: Receiver<Arc<Feature>>,
    sets: Sender<TileFeatureSet>,
) -> Result<BucketSummary> {
    let mut bucketer = TileBucketer::new(zoom);
    for (count, feature) in features.into_iter().enumerate() {
        bucketer.add(feature);
        if (count + 1) % 100_000 == 0 {
            debug!("Bucketed {} features into {} tiles", count + 1, bucketer.tile_count());
        }
    }

    let summary = bucketer.summary();
    info!(
        "Bucketed {} features into {} tiles ({} without coordinates)",
        summary.features, summary.tiles, summary.dropped
    );

    for set in bucketer.into_tiles() {
        if sets.send(set).is_err() {
            break;
        }
    }
    Ok(summary)
}

fn encode_tiles(
    extent: u32,
    sets: Receiver<TileFeatureSet>,
    tiles: Sender<EncodedTile>,
) -> Result<EncodeStats> {
    let mut stats = EncodeStats::default();
    for set in sets {
        let tile = encode_tile(&set, extent);
        if tile.feature_count == 0 {
            stats.empty += 1;
            continue;
        }
        stats.encoded += 1;
        if tiles.send(tile).is_err() {
            break;
        }
    }
    Ok(stats)
}

fn write_tiles(
    store: &mut TileStore,
    tiles: Receiver<EncodedTile>,
    commit: Receiver<bool>,
) -> Result<usize> {
    let transaction = store.transaction()?;
    let mut written = 0;
    for tile in tiles {
        transaction.put_tile(&StoredTileKey::from(&tile.key), &tile.data)?;
        written += 1;
    }

    if commit.recv().unwrap_or(false) {
        transaction.commit()?;
        info!("Wrote {} tiles", written);
        Ok(written)
    } else {
        warn!("Rolling back {} tiles", written);
        Ok(0)
    }
}
