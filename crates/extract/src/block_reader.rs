use std::{
    fs::File,
    io::{self, BufReader, Read},
    path::Path,
};

use flate2::read::ZlibDecoder;
use log::debug;
use prost::Message;
use types::{Bounds, OsmElement};

use crate::{
    primitive::decode_block,
    proto::{
        fileformat::{blob::Data, Blob, BlobHeader},
        osmformat::HeaderBlock,
    },
    ReadError,
};

/// Exclusive upper bound of a serialized BlobHeader (64 KiB).
pub const MAX_BLOB_HEADER_SIZE: u32 = 64 * 1024;

/// Exclusive upper bound of a serialized or decompressed Blob (32 MiB).
pub const MAX_BLOB_SIZE: i64 = 32 * 1024 * 1024;

const KNOWN_FEATURES: &[&str] = &["OsmSchema-V0.6", "DenseNodes"];

/// Contents of the leading `OSMHeader` block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OsmHeader {
    pub bbox: Option<Bounds>,
    pub required_features: Vec<String>,
    pub optional_features: Vec<String>,
    pub writing_program: Option<String>,
    pub source: Option<String>,
}

impl From<HeaderBlock> for OsmHeader {
    fn from(block: HeaderBlock) -> Self {
        OsmHeader {
            bbox: block.bbox.map(|bbox| {
                Bounds::new(
                    1e-9 * bbox.left as f64,
                    1e-9 * bbox.bottom as f64,
                    1e-9 * bbox.right as f64,
                    1e-9 * bbox.top as f64,
                )
            }),
            required_features: block.required_features,
            optional_features: block.optional_features,
            writing_program: block.writingprogram,
            source: block.source,
        }
    }
}

/// A decompressed `OSMData` payload.
#[derive(Debug, Clone)]
pub struct RawBlock {
    pub sequence: usize,
    pub data: Vec<u8>,
}

impl RawBlock {
    pub fn decode(&self) -> Result<Vec<OsmElement>, ReadError> {
        decode_block(&self.data)
    }
}

/// Splits an OSM PBF stream into its length-framed blocks.
///
/// Every frame is a 4 byte big-endian BlobHeader length, the BlobHeader, and
/// a Blob of `BlobHeader.datasize` bytes. The first frame must be the
/// `OSMHeader`; it is validated and kept, all later frames must be `OSMData`.
pub struct BlockReader<R: Read> {
    reader: R,
    header: Option<OsmHeader>,
    sequence: usize,
    done: bool,
}

impl BlockReader<BufReader<File>> {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ReadError> {
        let file = File::open(path)?;
        Ok(BlockReader::new(BufReader::new(file)))
    }
}

impl<R: Read> BlockReader<R> {
    pub fn new(reader: R) -> Self {
        BlockReader {
            reader,
            header: None,
            sequence: 0,
            done: false,
        }
    }

    /// The validated header, available once the first block was requested.
    pub fn header(&self) -> Option<&OsmHeader> {
        self.header.as_ref()
    }

    /// Reads and validates the `OSMHeader` block if it was not read yet.
    pub fn read_header(&mut self) -> Result<&OsmHeader, ReadError> {
        if self.header.is_none() {
            let (blob_header, payload) = self.read_frame()?.ok_or(ReadError::MissingHeader)?;
            if blob_header.r#type != "OSMHeader" {
                return Err(ReadError::UnexpectedBlockType {
                    got: blob_header.r#type,
                    expected: "OSMHeader",
                });
            }

            let block = HeaderBlock::decode(payload.as_slice())?;
            let unknown: Vec<String> = block
                .required_features
                .iter()
                .filter(|feature| !KNOWN_FEATURES.contains(&feature.as_str()))
                .cloned()
                .collect();
            if !unknown.is_empty() {
                return Err(ReadError::UnsupportedFeatures(unknown));
            }

            let header = OsmHeader::from(block);
            debug!("OSM header read: {:?}", header);
            self.header = Some(header);
        }

        self.header.as_ref().ok_or(ReadError::MissingHeader)
    }

    /// Returns the next `OSMData` payload, or `Ok(None)` on a clean end of
    /// stream at a frame boundary.
    pub fn next_block(&mut self) -> Result<Option<RawBlock>, ReadError> {
        self.read_header()?;

        let Some((blob_header, data)) = self.read_frame()? else {
            return Ok(None);
        };
        if blob_header.r#type != "OSMData" {
            return Err(ReadError::UnexpectedBlockType {
                got: blob_header.r#type,
                expected: "OSMData",
            });
        }

        self.sequence += 1;
        Ok(Some(RawBlock {
            sequence: self.sequence,
            data,
        }))
    }

    fn read_frame(&mut self) -> Result<Option<(BlobHeader, Vec<u8>)>, ReadError> {
        let Some(header_size) = self.read_blob_header_size()? else {
            return Ok(None);
        };
        let blob_header = self.read_blob_header(header_size)?;
        let data = self.read_blob(blob_header.datasize)?;
        Ok(Some((blob_header, data)))
    }

    /// `Ok(None)` only if the stream ends before the first length byte.
    fn read_blob_header_size(&mut self) -> Result<Option<u32>, ReadError> {
        let mut buf = [0u8; 4];
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) if filled == 0 => return Ok(None),
                Ok(0) => return Err(ReadError::Truncated("BlobHeader length")),
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        let size = u32::from_be_bytes(buf);
        if size >= MAX_BLOB_HEADER_SIZE {
            return Err(ReadError::BlobHeaderTooLarge(size));
        }
        Ok(Some(size))
    }

    fn read_blob_header(&mut self, size: u32) -> Result<BlobHeader, ReadError> {
        let buf = self.read_exactly(size as usize, "BlobHeader")?;
        let blob_header = BlobHeader::decode(buf.as_slice())?;

        if blob_header.datasize < 0 {
            return Err(ReadError::NegativeSize(blob_header.datasize));
        }
        if blob_header.datasize as i64 >= MAX_BLOB_SIZE {
            return Err(ReadError::BlobTooLarge(blob_header.datasize as i64));
        }
        Ok(blob_header)
    }

    fn read_blob(&mut self, size: i32) -> Result<Vec<u8>, ReadError> {
        let buf = self.read_exactly(size as usize, "Blob")?;
        let blob = Blob::decode(buf.as_slice())?;
        blob_data(blob)
    }

    fn read_exactly(&mut self, size: usize, what: &'static str) -> Result<Vec<u8>, ReadError> {
        let mut buf = vec![0u8; size];
        self.reader.read_exact(&mut buf).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                ReadError::Truncated(what)
            } else {
                ReadError::Io(e)
            }
        })?;
        Ok(buf)
    }
}

/// Extracts the payload of a blob, inflating zlib data and checking that the
/// inflated size matches `raw_size` exactly.
fn blob_data(blob: Blob) -> Result<Vec<u8>, ReadError> {
    match blob.data {
        Some(Data::Raw(data)) => Ok(data),
        Some(Data::ZlibData(data)) => {
            let raw_size = blob.raw_size.unwrap_or(0);
            if raw_size < 0 {
                return Err(ReadError::NegativeSize(raw_size));
            }
            if raw_size as i64 >= MAX_BLOB_SIZE {
                return Err(ReadError::BlobTooLarge(raw_size as i64));
            }

            let expected = raw_size as usize;
            let mut decompressed = Vec::with_capacity(expected);
            // One byte of slack detects output longer than declared.
            ZlibDecoder::new(data.as_slice())
                .take(expected as u64 + 1)
                .read_to_end(&mut decompressed)?;

            if decompressed.len() != expected {
                return Err(ReadError::SizeMismatch {
                    got: decompressed.len(),
                    expected,
                });
            }
            Ok(decompressed)
        }
        Some(Data::LzmaData(_)) => Err(ReadError::UnsupportedCompression("lzma")),
        Some(Data::ObsoleteBzip2Data(_)) => Err(ReadError::UnsupportedCompression("bzip2")),
        Some(Data::Lz4Data(_)) => Err(ReadError::UnsupportedCompression("lz4")),
        Some(Data::ZstdData(_)) => Err(ReadError::UnsupportedCompression("zstd")),
        None => Err(ReadError::MissingBlobData),
    }
}

impl<R: Read> Iterator for BlockReader<R> {
    type Item = Result<RawBlock, ReadError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let result = self.next_block().transpose();
        self.done = !matches!(result, Some(Ok(_)));
        result
    }
}
