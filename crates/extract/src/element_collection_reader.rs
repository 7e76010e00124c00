use std::{
    fs::File,
    io::{BufReader, Read},
    path::Path,
};

use rayon::iter::{ParallelBridge, ParallelIterator};
use types::OsmElement;

use crate::{
    block_reader::{BlockReader, OsmHeader, RawBlock},
    ReadError,
};

/// Decodes the data blocks of a PBF stream on the rayon pool.
///
/// Framing stays sequential; decoding and the caller's closures run in
/// parallel. The first framing or decode error aborts the whole read.
pub struct ElementCollectReader<R: Read + Send> {
    block_iter: BlockReader<R>,
}

impl ElementCollectReader<BufReader<File>> {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ReadError> {
        Ok(ElementCollectReader {
            block_iter: BlockReader::from_path(path)?,
        })
    }
}

impl<R: Read + Send> ElementCollectReader<R> {
    pub fn new(reader: R) -> Self {
        ElementCollectReader {
            block_iter: BlockReader::new(reader),
        }
    }

    /// Validates and returns the stream header.
    pub fn header(&mut self) -> Result<OsmHeader, ReadError> {
        self.block_iter.read_header().cloned()
    }

    /// Collects `filter_map_op` over every element of the stream.
    pub fn elements<T, FMO>(self, filter_map_op: FMO) -> Result<Vec<T>, ReadError>
    where
        T: Send,
        FMO: Fn(OsmElement) -> Option<T> + Send + Sync,
    {
        let per_block: Vec<Vec<T>> = self
            .block_iter
            .par_bridge()
            .map(|block| {
                let elements = block?.decode()?;
                Ok(elements.into_iter().filter_map(&filter_map_op).collect())
            })
            .collect::<Result<_, ReadError>>()?;

        Ok(per_block.into_iter().flatten().collect())
    }

    /// Hands every decoded block to `op`, which folds it into shared state.
    pub fn for_each_block<OP>(self, op: OP) -> Result<(), ReadError>
    where
        OP: Fn(&RawBlock, Vec<OsmElement>) + Send + Sync,
    {
        self.block_iter.par_bridge().try_for_each(|block| {
            let block = block?;
            let elements = block.decode()?;
            op(&block, elements);
            Ok(())
        })
    }
}
