//! GeoJSON polygon layers
//!
//! Layers are FeatureCollections. The CRS travels in the legacy `crs`
//! member (`{"type": "name", "properties": {"name": "urn:ogc:def:crs:EPSG::n"}}`),
//! which is what most GIS packages still write for projected data. A
//! collection without it loads with no CRS rather than an assumed WGS84.

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::vector::{AttributeValue, Feature, PolygonLayer};
use geojson::feature::Id;
use geojson::{FeatureCollection, GeoJson, JsonObject, JsonValue};
use serde_json::json;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Read a GeoJSON FeatureCollection file into a polygon layer
pub fn read_geojson<P: AsRef<Path>>(path: P) -> Result<PolygonLayer> {
    let text = std::fs::read_to_string(path.as_ref())?;
    let layer = read_geojson_str(&text)?;
    tracing::debug!(
        "Read {} features ({} fields) from {}",
        layer.len(),
        layer.fields().len(),
        path.as_ref().display()
    );
    Ok(layer)
}

/// Parse GeoJSON text into a polygon layer
pub fn read_geojson_str(text: &str) -> Result<PolygonLayer> {
    let collection = match text.parse::<GeoJson>()? {
        GeoJson::FeatureCollection(fc) => fc,
        GeoJson::Feature(f) => FeatureCollection {
            bbox: None,
            features: vec![f],
            foreign_members: None,
        },
        GeoJson::Geometry(_) => {
            return Err(Error::UnsupportedDataType(
                "bare GeoJSON geometry; expected a Feature or FeatureCollection".into(),
            ))
        }
    };

    let crs = collection
        .foreign_members
        .as_ref()
        .and_then(|members| members.get("crs"))
        .and_then(crs_from_member);

    let mut layer = PolygonLayer::new(crs);
    for feature in collection.features {
        if let Some(props) = &feature.properties {
            for key in props.keys() {
                layer.add_field(key.as_str());
            }
        }

        let geometry = feature
            .geometry
            .map(geo_types::Geometry::<f64>::try_from)
            .transpose()?;

        let properties = feature
            .properties
            .unwrap_or_default()
            .into_iter()
            .map(|(k, v)| (k, attribute_from_json(v)))
            .collect();

        let id = feature.id.map(|id| match id {
            Id::String(s) => s,
            Id::Number(n) => n.to_string(),
        });

        layer.push(Feature {
            geometry,
            properties,
            id,
        });
    }
    Ok(layer)
}

fn crs_from_member(member: &JsonValue) -> Option<CRS> {
    let name = member.get("properties")?.get("name")?.as_str()?;
    CRS::parse(name)
}

fn attribute_from_json(value: JsonValue) -> AttributeValue {
    match value {
        JsonValue::Null => AttributeValue::Null,
        JsonValue::Bool(b) => AttributeValue::Bool(b),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => AttributeValue::Int(i),
            None => n.as_f64().map(AttributeValue::Float).unwrap_or(AttributeValue::Null),
        },
        JsonValue::String(s) => AttributeValue::String(s),
        other => AttributeValue::String(other.to_string()),
    }
}

fn attribute_to_json(value: &AttributeValue) -> JsonValue {
    match value {
        AttributeValue::Null => JsonValue::Null,
        AttributeValue::Bool(b) => JsonValue::Bool(*b),
        AttributeValue::Int(i) => json!(i),
        // NaN and infinities have no JSON form
        AttributeValue::Float(f) => serde_json::Number::from_f64(*f)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        AttributeValue::String(s) => JsonValue::String(s.clone()),
    }
}

fn to_feature_collection(layer: &PolygonLayer) -> FeatureCollection {
    let features = layer
        .iter()
        .map(|feature| {
            let mut properties = JsonObject::new();
            for field in layer.fields() {
                let value = feature
                    .get_property(field)
                    .map(attribute_to_json)
                    .unwrap_or(JsonValue::Null);
                properties.insert(field.clone(), value);
            }
            geojson::Feature {
                bbox: None,
                geometry: feature
                    .geometry
                    .as_ref()
                    .map(|g| geojson::Geometry::new(geojson::Value::from(g))),
                id: feature.id.clone().map(Id::String),
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();

    let foreign_members = layer.crs().and_then(CRS::urn).map(|urn| {
        let mut members = JsonObject::new();
        members.insert(
            "crs".to_string(),
            json!({"type": "name", "properties": {"name": urn}}),
        );
        members
    });

    FeatureCollection {
        bbox: None,
        features,
        foreign_members,
    }
}

/// Serialize a polygon layer as a GeoJSON FeatureCollection string
pub fn to_geojson_string(layer: &PolygonLayer) -> Result<String> {
    let geojson = GeoJson::FeatureCollection(to_feature_collection(layer));
    Ok(serde_json::to_string(&geojson)?)
}

/// Write a polygon layer to a GeoJSON file
pub fn write_geojson<P: AsRef<Path>>(layer: &PolygonLayer, path: P) -> Result<()> {
    let text = to_geojson_string(layer)?;
    let mut file = BufWriter::new(File::create(path.as_ref())?);
    file.write_all(text.as_bytes())?;
    file.flush()?;
    tracing::debug!("Wrote {} features to {}", layer.len(), path.as_ref().display());
    Ok(())
}
