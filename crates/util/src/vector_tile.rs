//! Mapbox vector tile messages (version 2.1 of the format).

use prost::{Enumeration, Message};
use types::{GeometryKind, PropertyValue};

#[derive(Clone, PartialEq, Message)]
pub struct Tile {
    #[prost(message, repeated, tag = "3")]
    pub layers: Vec<Layer>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Layer {
    #[prost(uint32, required, tag = "15", default = "1")]
    pub version: u32,
    #[prost(string, required, tag = "1")]
    pub name: String,
    #[prost(message, repeated, tag = "2")]
    pub features: Vec<Feature>,
    #[prost(string, repeated, tag = "3")]
    pub keys: Vec<String>,
    #[prost(message, repeated, tag = "4")]
    pub values: Vec<Value>,
    #[prost(uint32, optional, tag = "5", default = "4096")]
    pub extent: Option<u32>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Feature {
    #[prost(uint64, optional, tag = "1", default = "0")]
    pub id: Option<u64>,
    /// Pairs of indices into [`Layer::keys`] and [`Layer::values`].
    #[prost(uint32, repeated, tag = "2")]
    pub tags: Vec<u32>,
    #[prost(enumeration = "GeomType", optional, tag = "3", default = "Unknown")]
    pub r#type: Option<i32>,
    #[prost(uint32, repeated, tag = "4")]
    pub geometry: Vec<u32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
#[repr(i32)]
pub enum GeomType {
    Unknown = 0,
    Point = 1,
    Linestring = 2,
    Polygon = 3,
}

/// Exactly one field is set in a valid message.
#[derive(Clone, PartialEq, Message)]
pub struct Value {
    #[prost(string, optional, tag = "1")]
    pub string_value: Option<String>,
    #[prost(float, optional, tag = "2")]
    pub float_value: Option<f32>,
    #[prost(double, optional, tag = "3")]
    pub double_value: Option<f64>,
    #[prost(int64, optional, tag = "4")]
    pub int_value: Option<i64>,
    #[prost(uint64, optional, tag = "5")]
    pub uint_value: Option<u64>,
    #[prost(sint64, optional, tag = "6")]
    pub sint_value: Option<i64>,
    #[prost(bool, optional, tag = "7")]
    pub bool_value: Option<bool>,
}

impl From<GeometryKind> for GeomType {
    fn from(kind: GeometryKind) -> Self {
        match kind {
            GeometryKind::Point => GeomType::Point,
            GeometryKind::Line => GeomType::Linestring,
            GeometryKind::Polygon => GeomType::Polygon,
        }
    }
}

impl From<&PropertyValue> for Value {
    fn from(value: &PropertyValue) -> Self {
        let mut encoded = Value::default();
        match value {
            PropertyValue::String(value) => encoded.string_value = Some(value.clone()),
            PropertyValue::Int(value) => encoded.int_value = Some(*value),
            PropertyValue::Double(value) => encoded.double_value = Some(*value),
            PropertyValue::Bool(value) => encoded.bool_value = Some(*value),
        }
        encoded
    }
}

impl Value {
    /// Decodes the set field. Floats widen to doubles and all integer
    /// encodings become `Int`; an unsigned value above `i64::MAX` or an empty
    /// message yields `None`.
    pub fn to_property(&self) -> Option<PropertyValue> {
        if let Some(value) = &self.string_value {
            Some(PropertyValue::String(value.clone()))
        } else if let Some(value) = self.double_value {
            Some(PropertyValue::Double(value))
        } else if let Some(value) = self.float_value {
            Some(PropertyValue::Double(value as f64))
        } else if let Some(value) = self.int_value.or(self.sint_value) {
            Some(PropertyValue::Int(value))
        } else if let Some(value) = self.uint_value {
            i64::try_from(value).ok().map(PropertyValue::Int)
        } else {
            self.bool_value.map(PropertyValue::Bool)
        }
    }
}

impl Layer {
    pub fn new(name: &str, extent: u32) -> Self {
        Layer {
            version: 2,
            name: name.to_owned(),
            features: Vec::new(),
            keys: Vec::new(),
            values: Vec::new(),
            extent: Some(extent),
        }
    }
}

impl Tile {
    pub fn layer(&self, name: &str) -> Option<&Layer> {
        self.layers.iter().find(|layer| layer.name == name)
    }

    /// Returns the index of the named layer, appending an empty one if absent.
    pub fn get_or_create_layer(&mut self, name: &str, extent: u32) -> usize {
        match self.layers.iter().position(|layer| layer.name == name) {
            Some(index) => index,
            None => {
                self.layers.push(Layer::new(name, extent));
                self.layers.len() - 1
            }
        }
    }
}
