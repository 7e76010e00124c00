mod config;

pub use config::{ClassifierRules, LayerRule, TileMakerConfig};

use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, str::FromStr};

pub type Tags = BTreeMap<String, String>;

/// Highest zoom level a [`TileKey`] can address.
pub const MAX_ZOOM: u8 = 29;

const ROW_BITS: u32 = 29;
const COLUMN_BITS: u32 = 29;
const AXIS_MASK: u64 = (1 << 29) - 1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Coordinate {
            latitude,
            longitude,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OsmNode {
    pub id: i64,
    pub coordinate: Coordinate,
    pub tags: Tags,
}

#[derive(Debug, Clone)]
pub struct OsmWay {
    pub id: i64,
    pub node_ids: Vec<i64>,
    pub tags: Tags,
}

impl OsmWay {
    pub fn is_closed(&self) -> bool {
        self.node_ids.len() >= 4 && self.node_ids.first() == self.node_ids.last()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    Node,
    Way,
    Relation,
}

#[derive(Debug, Clone)]
pub struct RelationMember {
    pub id: i64,
    pub role: String,
    pub kind: MemberKind,
}

#[derive(Debug, Clone)]
pub struct OsmRelation {
    pub id: i64,
    pub members: Vec<RelationMember>,
    pub tags: Tags,
}

#[derive(Debug, Clone)]
pub enum OsmElement {
    Node(OsmNode),
    Way(OsmWay),
    Relation(OsmRelation),
}

/// Geometry kinds, numbered like the vector tile `GeomType` enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeometryKind {
    Point = 1,
    Line = 2,
    Polygon = 3,
}

/// Scalar property value of a feature. Two values are only ever equal when
/// they hold the same variant.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    String(String),
    Int(i64),
    Double(f64),
    Bool(bool),
}

/// Hashable identity of a [`PropertyValue`], doubles compared bitwise.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueKey {
    String(String),
    Int(i64),
    Double(u64),
    Bool(bool),
}

impl PropertyValue {
    pub fn key(&self) -> ValueKey {
        match self {
            PropertyValue::String(value) => ValueKey::String(value.clone()),
            PropertyValue::Int(value) => ValueKey::Int(*value),
            PropertyValue::Double(value) => ValueKey::Double(value.to_bits()),
            PropertyValue::Bool(value) => ValueKey::Bool(*value),
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::String(value) => write!(f, "{value}"),
            PropertyValue::Int(value) => write!(f, "{value}"),
            PropertyValue::Double(value) => write!(f, "{value}"),
            PropertyValue::Bool(value) => write!(f, "{value}"),
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::String(value.to_owned())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::String(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Int(value)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        PropertyValue::Double(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Bool(value)
    }
}

/// A classified map feature, ready for tiling.
#[derive(Debug, Clone)]
pub struct Feature {
    pub id: i64,
    pub kind: GeometryKind,
    pub layer: String,
    pub coordinates: Vec<Coordinate>,
    pub properties: BTreeMap<String, PropertyValue>,
}

/// Address of one slippy-map tile. `row` counts from the north edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileKey {
    pub zoom: u8,
    pub row: u32,
    pub column: u32,
}

impl TileKey {
    pub fn new(zoom: u8, row: u32, column: u32) -> Self {
        TileKey { zoom, row, column }
    }

    /// Packs the key as `zoom << 58 | row << 29 | column`.
    pub fn index(&self) -> u64 {
        ((self.zoom as u64) << (ROW_BITS + COLUMN_BITS))
            | ((self.row as u64 & AXIS_MASK) << COLUMN_BITS)
            | (self.column as u64 & AXIS_MASK)
    }

    pub fn from_index(index: u64) -> Self {
        TileKey {
            zoom: (index >> (ROW_BITS + COLUMN_BITS)) as u8,
            row: ((index >> COLUMN_BITS) & AXIS_MASK) as u32,
            column: (index & AXIS_MASK) as u32,
        }
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.column, self.row)
    }
}

/// Geographic extent in degrees. Serialised as `left,bottom,right,top`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub left: f64,
    pub bottom: f64,
    pub right: f64,
    pub top: f64,
}

impl Bounds {
    pub fn new(left: f64, bottom: f64, right: f64, top: f64) -> Self {
        Bounds {
            left,
            bottom,
            right,
            top,
        }
    }

    /// An inverted extent that any `extend` call replaces.
    pub fn empty() -> Self {
        Bounds::new(f64::MAX, f64::MAX, f64::MIN, f64::MIN)
    }

    pub fn is_empty(&self) -> bool {
        self.left > self.right || self.bottom > self.top
    }

    pub fn extend(&mut self, coordinate: &Coordinate) {
        self.left = self.left.min(coordinate.longitude);
        self.right = self.right.max(coordinate.longitude);
        self.bottom = self.bottom.min(coordinate.latitude);
        self.top = self.top.max(coordinate.latitude);
    }

    /// Component-wise union: min of left/bottom, max of right/top.
    pub fn merge(&self, other: &Bounds) -> Bounds {
        Bounds {
            left: self.left.min(other.left),
            bottom: self.bottom.min(other.bottom),
            right: self.right.max(other.right),
            top: self.top.max(other.top),
        }
    }
}

impl fmt::Display for Bounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.left, self.bottom, self.right, self.top)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoundsParseError {
    WrongArity(usize),
    InvalidNumber(String),
}

impl fmt::Display for BoundsParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoundsParseError::WrongArity(count) => {
                write!(f, "expected four coordinates as bounds, got {count}")
            }
            BoundsParseError::InvalidNumber(part) => write!(f, "failed to parse bound {part:?}"),
        }
    }
}

impl std::error::Error for BoundsParseError {}

impl FromStr for Bounds {
    type Err = BoundsParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(BoundsParseError::WrongArity(parts.len()));
        }

        let mut values = [0.0; 4];
        for (value, part) in values.iter_mut().zip(parts) {
            *value = part
                .parse()
                .map_err(|_| BoundsParseError::InvalidNumber(part.to_owned()))?;
        }

        Ok(Bounds::new(values[0], values[1], values[2], values[3]))
    }
}

/// Identity and extent of a tile database.
#[derive(Debug, Clone, PartialEq)]
pub struct Metadata {
    pub name: String,
    pub description: String,
    pub bounds: Bounds,
    pub min_zoom: Option<u8>,
    pub max_zoom: Option<u8>,
    /// Serialised `{"vector_layers": [...]}` document.
    pub json: Option<String>,
}

impl Metadata {
    pub fn new(name: &str, description: &str, bounds: Bounds) -> Self {
        Metadata {
            name: name.to_owned(),
            description: description.to_owned(),
            bounds,
            min_zoom: None,
            max_zoom: None,
            json: None,
        }
    }
}
