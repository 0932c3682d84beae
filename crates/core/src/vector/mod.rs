//! Polygon layers: response-unit geometries with an ordered attribute table

use crate::crs::CRS;
use crate::error::{Error, Result};
use geo_types::Geometry;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// 2^63, the first float magnitude outside the `i64` range
const I64_LIMIT: f64 = 9_223_372_036_854_775_808.0;

/// Attribute value types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl AttributeValue {
    pub fn is_null(&self) -> bool {
        matches!(self, AttributeValue::Null)
    }

    /// Numeric view of the value
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Int(v) => Some(*v as f64),
            AttributeValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Value as a pixel count: a non-negative integer.
    ///
    /// Integral floats are accepted since many vector writers store every
    /// numeric column as a double.
    pub fn as_count(&self) -> Option<u64> {
        match self {
            AttributeValue::Int(v) if *v >= 0 => Some(*v as u64),
            AttributeValue::Float(v) if v.is_finite() && *v >= 0.0 && v.fract() == 0.0 => {
                Some(*v as u64)
            }
            _ => None,
        }
    }

    /// Value as a grouping key. Strings are used verbatim, integers and
    /// integral floats in decimal form, so `7`, `7.0` and `"7"` group together.
    /// Floats beyond the `i64` range keep their float form and stay distinct.
    pub fn as_key(&self) -> Option<String> {
        match self {
            AttributeValue::String(s) => Some(s.clone()),
            AttributeValue::Int(v) => Some(v.to_string()),
            AttributeValue::Float(v) if v.fract() == 0.0 && v.abs() < I64_LIMIT => {
                Some(format!("{}", *v as i64))
            }
            AttributeValue::Float(v) => Some(v.to_string()),
            AttributeValue::Bool(_) | AttributeValue::Null => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Null => write!(f, ""),
            AttributeValue::Bool(v) => write!(f, "{}", v),
            AttributeValue::Int(v) => write!(f, "{}", v),
            AttributeValue::Float(v) => write!(f, "{}", v),
            AttributeValue::String(v) => write!(f, "{}", v),
        }
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        AttributeValue::Int(v)
    }
}

impl From<u64> for AttributeValue {
    fn from(v: u64) -> Self {
        i64::try_from(v)
            .map(AttributeValue::Int)
            .unwrap_or(AttributeValue::Float(v as f64))
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        AttributeValue::Float(v)
    }
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        AttributeValue::String(v.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(v: String) -> Self {
        AttributeValue::String(v)
    }
}

impl<T: Into<AttributeValue>> From<Option<T>> for AttributeValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(AttributeValue::Null)
    }
}

/// A polygon record with geometry and attributes
#[derive(Debug, Clone, Default)]
pub struct Feature {
    /// Feature geometry
    pub geometry: Option<Geometry<f64>>,
    /// Feature attributes
    pub properties: HashMap<String, AttributeValue>,
    /// Optional feature ID
    pub id: Option<String>,
}

impl Feature {
    /// Create a new feature with geometry
    pub fn new(geometry: Geometry<f64>) -> Self {
        Self {
            geometry: Some(geometry),
            properties: HashMap::new(),
            id: None,
        }
    }

    /// Builder-style attribute setter
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Set an attribute
    pub fn set_property(&mut self, key: impl Into<String>, value: AttributeValue) {
        self.properties.insert(key.into(), value);
    }

    /// Get an attribute
    pub fn get_property(&self, key: &str) -> Option<&AttributeValue> {
        self.properties.get(key)
    }
}

/// Ordered collection of polygon features sharing one attribute schema.
///
/// `fields` fixes the column order of the attribute table; features hold
/// their values by name, so reordering or dropping columns never depends
/// on position.
#[derive(Debug, Clone, Default)]
pub struct PolygonLayer {
    pub features: Vec<Feature>,
    fields: Vec<String>,
    crs: Option<CRS>,
}

impl PolygonLayer {
    pub fn new(crs: Option<CRS>) -> Self {
        Self {
            features: Vec::new(),
            fields: Vec::new(),
            crs,
        }
    }

    pub fn crs(&self) -> Option<&CRS> {
        self.crs.as_ref()
    }

    pub fn set_crs(&mut self, crs: Option<CRS>) {
        self.crs = crs;
    }

    /// Attribute names in table order
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f == name)
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f == name)
    }

    /// Append a column name to the schema; no-op if it already exists
    pub fn add_field(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.has_field(&name) {
            self.fields.push(name);
        }
    }

    /// Append a feature. Attributes not yet in the schema are appended to it
    /// in name order.
    pub fn push(&mut self, feature: Feature) {
        let mut unseen: Vec<&String> = feature
            .properties
            .keys()
            .filter(|k| !self.has_field(k))
            .collect();
        unseen.sort();
        let unseen: Vec<String> = unseen.into_iter().cloned().collect();
        self.fields.extend(unseen);
        self.features.push(feature);
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Feature> {
        self.features.iter()
    }

    /// Attribute of feature `index`; missing values read as `None`
    pub fn attribute(&self, index: usize, name: &str) -> Option<&AttributeValue> {
        self.features.get(index)?.properties.get(name)
    }

    /// Set an attribute on feature `index`, registering the column if needed
    pub fn set_attribute(
        &mut self,
        index: usize,
        name: &str,
        value: impl Into<AttributeValue>,
    ) -> Result<()> {
        let len = self.features.len();
        let feature = self.features.get_mut(index).ok_or_else(|| Error::InvalidParameter {
            name: "feature index",
            value: index.to_string(),
            reason: format!("layer has {} features", len),
        })?;
        feature.properties.insert(name.to_string(), value.into());
        self.add_field(name);
        Ok(())
    }

    /// Write one value per feature into a column, in feature order
    pub fn set_column<V: Into<AttributeValue>>(
        &mut self,
        name: &str,
        values: impl IntoIterator<Item = V>,
    ) -> Result<()> {
        let values: Vec<AttributeValue> = values.into_iter().map(Into::into).collect();
        if values.len() != self.features.len() {
            return Err(Error::InvalidParameter {
                name: "column length",
                value: values.len().to_string(),
                reason: format!("layer has {} features", self.features.len()),
            });
        }
        for (feature, value) in self.features.iter_mut().zip(values) {
            feature.properties.insert(name.to_string(), value);
        }
        self.add_field(name);
        Ok(())
    }

    /// Values of a column in feature order; missing values read as `Null`
    pub fn column(&self, name: &str) -> Vec<AttributeValue> {
        self.features
            .iter()
            .map(|f| f.properties.get(name).cloned().unwrap_or(AttributeValue::Null))
            .collect()
    }

    /// Remove a column from the schema and from every feature
    pub fn drop_field(&mut self, name: &str) {
        self.fields.retain(|f| f != name);
        for feature in &mut self.features {
            feature.properties.remove(name);
        }
    }

    /// Rename a column in place, keeping its position
    pub fn rename_field(&mut self, old: &str, new: &str) -> Result<()> {
        let idx = self.field_index(old).ok_or_else(|| Error::MissingAttribute {
            field: old.to_string(),
            feature: 0,
        })?;
        self.fields[idx] = new.to_string();
        for feature in &mut self.features {
            if let Some(value) = feature.properties.remove(old) {
                feature.properties.insert(new.to_string(), value);
            }
        }
        Ok(())
    }

    /// Reorder features so that `field` follows the sequence `ids`.
    ///
    /// Used to align per-unit results with an external ordering such as a
    /// drainage database's rank order. Features whose id is not listed are
    /// dropped; an id with no matching feature is an error.
    pub fn reorder_by(&self, field: &str, ids: &[String]) -> Result<PolygonLayer> {
        let mut by_key: HashMap<String, usize> = HashMap::with_capacity(self.features.len());
        for (i, feature) in self.features.iter().enumerate() {
            if let Some(key) = feature.properties.get(field).and_then(AttributeValue::as_key) {
                by_key.entry(key).or_insert(i);
            }
        }

        let mut out = PolygonLayer {
            features: Vec::with_capacity(ids.len()),
            fields: self.fields.clone(),
            crs: self.crs.clone(),
        };
        for (position, id) in ids.iter().enumerate() {
            let idx = by_key.get(id).ok_or_else(|| Error::MissingAttribute {
                field: format!("{}={}", field, id),
                feature: position,
            })?;
            out.features.push(self.features[*idx].clone());
        }
        Ok(out)
    }
}

impl IntoIterator for PolygonLayer {
    type Item = Feature;
    type IntoIter = std::vec::IntoIter<Feature>;

    fn into_iter(self) -> Self::IntoIter {
        self.features.into_iter()
    }
}
