//! Class-count extraction
//!
//! For every class code of a categorical raster, counts the valid cells that
//! fall inside each polygon of a layer and appends one count column per
//! class (`{prefix}{code}`) to the layer's attribute table.

use std::collections::{HashMap, HashSet};

use hrufrac_core::raster::{Raster, RasterElement};
use hrufrac_core::vector::{AttributeValue, PolygonLayer};
use hrufrac_core::{CoveragePolicy, Error, Result, ZonalConfig, CRS};
use tracing::{debug, info};

use crate::coverage::layer_cells;

/// Parameters for class counting
#[derive(Debug, Clone)]
pub struct ClassCountParams {
    /// Prefix for the generated count columns
    pub prefix: String,
    /// Which cells belong to a polygon
    pub coverage: CoveragePolicy,
    /// Drop count columns that are zero for every polygon
    pub drop_empty: bool,
}

impl Default for ClassCountParams {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            coverage: CoveragePolicy::CenterPoint,
            drop_empty: true,
        }
    }
}

impl From<&ZonalConfig> for ClassCountParams {
    fn from(config: &ZonalConfig) -> Self {
        Self {
            prefix: config.class_prefix.clone(),
            coverage: config.coverage,
            drop_empty: config.drop_empty_classes,
        }
    }
}

/// One class-count attribute of a count table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassColumn {
    /// Class code, when known
    pub code: Option<i64>,
    /// Attribute name
    pub name: String,
}

impl ClassColumn {
    pub fn new(code: i64, prefix: &str) -> Self {
        Self {
            code: Some(code),
            name: format!("{}{}", prefix, code),
        }
    }
}

/// How to find the count columns of a persisted layer
#[derive(Debug, Clone)]
pub enum CountSchema {
    /// Every field named `{prefix}{integer}`, in table order
    Prefix(String),
    /// Exactly these fields, in this order
    Columns(Vec<String>),
}

/// A polygon layer plus the ordered set of its class-count attributes.
///
/// Counts are validated once at construction: every count attribute of
/// every polygon is a non-negative integer.
#[derive(Debug, Clone)]
pub struct ClassCountTable {
    layer: PolygonLayer,
    columns: Vec<ClassColumn>,
    /// Row-major counts, one row per feature, one entry per column
    counts: Vec<Vec<u64>>,
}

impl ClassCountTable {
    /// Wrap a layer whose count columns are described by `schema`
    pub fn from_layer(layer: PolygonLayer, schema: &CountSchema) -> Result<Self> {
        let columns: Vec<ClassColumn> = match schema {
            CountSchema::Prefix(prefix) => layer
                .fields()
                .iter()
                .filter_map(|field| {
                    let code = field.strip_prefix(prefix.as_str())?.parse::<i64>().ok()?;
                    Some(ClassColumn {
                        code: Some(code),
                        name: field.clone(),
                    })
                })
                .collect(),
            CountSchema::Columns(names) => {
                let mut columns = Vec::with_capacity(names.len());
                for name in names {
                    if !layer.has_field(name) {
                        return Err(Error::MissingAttribute {
                            field: name.clone(),
                            feature: 0,
                        });
                    }
                    let code = name
                        .trim_start_matches(|c: char| !c.is_ascii_digit() && c != '-')
                        .parse()
                        .ok();
                    columns.push(ClassColumn {
                        code,
                        name: name.clone(),
                    });
                }
                columns
            }
        };

        if columns.is_empty() {
            return Err(Error::InvalidParameter {
                name: "count schema",
                value: format!("{:?}", schema),
                reason: "no class-count columns found in layer".into(),
            });
        }

        let mut counts = Vec::with_capacity(layer.len());
        for (i, feature) in layer.features.iter().enumerate() {
            let mut row = Vec::with_capacity(columns.len());
            for column in &columns {
                let value = feature.get_property(&column.name).ok_or_else(|| {
                    Error::MissingAttribute {
                        field: column.name.clone(),
                        feature: i,
                    }
                })?;
                let count = value.as_count().ok_or_else(|| Error::InvalidAttribute {
                    field: column.name.clone(),
                    feature: i,
                    reason: format!("'{}' is not a non-negative integer count", value),
                })?;
                row.push(count);
            }
            counts.push(row);
        }

        Ok(Self {
            layer,
            columns,
            counts,
        })
    }

    pub fn layer(&self) -> &PolygonLayer {
        &self.layer
    }

    pub fn into_layer(self) -> PolygonLayer {
        self.layer
    }

    pub fn columns(&self) -> &[ClassColumn] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Number of polygons
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Counts of polygon `row`, one per class column
    pub fn counts(&self, row: usize) -> Option<&[u64]> {
        self.counts.get(row).map(Vec::as_slice)
    }

    /// Count of one class column for polygon `row`
    pub fn count(&self, row: usize, column: &str) -> Option<u64> {
        let idx = self.columns.iter().position(|c| c.name == column)?;
        self.counts.get(row).map(|r| r[idx])
    }

    /// Column totals across all polygons
    pub fn class_totals(&self) -> Vec<u64> {
        let mut totals = vec![0u64; self.columns.len()];
        for row in &self.counts {
            for (t, c) in totals.iter_mut().zip(row) {
                *t += c;
            }
        }
        totals
    }
}

/// Raster and polygons must carry the same coordinate reference system
pub fn check_alignment(raster_crs: Option<&CRS>, layer_crs: Option<&CRS>) -> Result<()> {
    match (raster_crs, layer_crs) {
        (None, _) => Err(Error::InputMismatch(
            "raster has no coordinate reference system".into(),
        )),
        (_, None) => Err(Error::InputMismatch(
            "polygon layer has no coordinate reference system".into(),
        )),
        (Some(a), Some(b)) if !a.is_equivalent(b) => Err(Error::InputMismatch(format!(
            "raster CRS {} differs from polygon CRS {}",
            a, b
        ))),
        _ => Ok(()),
    }
}

/// Count raster cells of each class inside each polygon.
///
/// Equivalent to masking the raster to one class at a time and taking a
/// zonal cell count, but covers each polygon once and tallies every class
/// in a single pass over its cells.
///
/// # Arguments
/// * `raster` - Categorical raster; no-data cells and values that are not
///   integral class codes are never counted
/// * `polygons` - Response units or basins; not modified
/// * `class_codes` - Classes to count, in output column order (duplicates ignored)
/// * `params` - Column prefix, coverage policy, empty-column handling
///
/// # Returns
/// A copy of `polygons` with one `{prefix}{code}` count column appended per
/// class. Classes that are zero for every polygon are dropped when
/// `params.drop_empty` is set, so the output may have fewer columns than
/// `class_codes`.
///
/// # Errors
/// `EmptyClassList` for an empty class list, `EmptyLayer` for a layer without
/// features, `InputMismatch` when either CRS is missing or they differ.
pub fn count_per_class<T: RasterElement>(
    raster: &Raster<T>,
    polygons: &PolygonLayer,
    class_codes: &[i64],
    params: &ClassCountParams,
) -> Result<ClassCountTable> {
    let mut seen = HashSet::new();
    let classes: Vec<i64> = class_codes
        .iter()
        .copied()
        .filter(|c| seen.insert(*c))
        .collect();

    if classes.is_empty() {
        return Err(Error::EmptyClassList);
    }
    if polygons.is_empty() {
        return Err(Error::EmptyLayer);
    }
    check_alignment(raster.crs(), polygons.crs())?;

    let (rows, cols) = raster.shape();
    let cells = layer_cells(raster.transform(), rows, cols, polygons, params.coverage);

    let histograms: Vec<HashMap<i64, u64>> = cells
        .iter()
        .map(|polygon_cells| {
            let mut histogram = HashMap::new();
            for &(row, col) in polygon_cells {
                if let Some(code) = raster.valid_at(row, col).and_then(RasterElement::to_class_code) {
                    *histogram.entry(code).or_insert(0u64) += 1;
                }
            }
            histogram
        })
        .collect();

    let mut layer = polygons.clone();
    let mut columns = Vec::with_capacity(classes.len());
    let mut counts: Vec<Vec<u64>> = vec![Vec::with_capacity(classes.len()); polygons.len()];

    for &code in &classes {
        let column = ClassColumn::new(code, &params.prefix);
        let values: Vec<u64> = histograms
            .iter()
            .map(|h| h.get(&code).copied().unwrap_or(0))
            .collect();

        // An existing attribute of the same name is stale; generated columns
        // are appended in class order
        layer.drop_field(&column.name);
        if params.drop_empty && values.iter().all(|&v| v == 0) {
            debug!("Class {} absent from every polygon, dropping '{}'", code, column.name);
            continue;
        }

        layer.set_column(&column.name, values.iter().map(|&v| AttributeValue::from(v)))?;
        for (row, v) in counts.iter_mut().zip(&values) {
            row.push(*v);
        }
        columns.push(column);
    }

    info!(
        "Counted {} classes over {} polygons ({} columns kept)",
        classes.len(),
        polygons.len(),
        columns.len()
    );

    Ok(ClassCountTable {
        layer,
        columns,
        counts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, Geometry};
    use hrufrac_core::raster::GeoTransform;
    use hrufrac_core::vector::Feature;

    /// 4x5 raster, unit cells, origin (0, 4):
    /// ```text
    /// 1 1 1 1 2
    /// 1 1 1 1 2
    /// 1 1 2 2 2
    /// 9 9 0 0 0   (0 = nodata)
    /// ```
    fn landcover() -> Raster<u8> {
        let mut r = Raster::from_vec(
            vec![
                1, 1, 1, 1, 2, //
                1, 1, 1, 1, 2, //
                1, 1, 2, 2, 2, //
                9, 9, 0, 0, 0,
            ],
            4,
            5,
        )
        .unwrap();
        r.set_transform(GeoTransform::new(0.0, 4.0, 1.0, -1.0));
        r.set_crs(Some(CRS::from_epsg(32611)));
        r.set_nodata(Some(0));
        r
    }

    fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> Geometry<f64> {
        Geometry::Polygon(polygon![
            (x: x0, y: y0), (x: x1, y: y0), (x: x1, y: y1), (x: x0, y: y1),
        ])
    }

    fn hrus() -> PolygonLayer {
        let mut layer = PolygonLayer::new(Some(CRS::from_epsg(32611)));
        layer.add_field("GRU_ID");
        layer.add_field("HRU_ID");
        layer.push(Feature::new(rect(0.0, 1.0, 5.0, 4.0)).with_property("GRU_ID", "A").with_property("HRU_ID", 1i64));
        layer.push(Feature::new(rect(0.0, 0.0, 5.0, 1.0)).with_property("GRU_ID", "A").with_property("HRU_ID", 2i64));
        layer
    }

    fn params(prefix: &str) -> ClassCountParams {
        ClassCountParams {
            prefix: prefix.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_counts_per_polygon() {
        let table = count_per_class(&landcover(), &hrus(), &[1, 2, 9], &params("IGBP_")).unwrap();
        assert_eq!(table.column_names(), vec!["IGBP_1", "IGBP_2", "IGBP_9"]);
        assert_eq!(table.counts(0).unwrap(), &[10, 5, 0]);
        assert_eq!(table.counts(1).unwrap(), &[0, 0, 2]);
        assert_eq!(table.layer().attribute(0, "IGBP_1"), Some(&AttributeValue::Int(10)));
        assert_eq!(table.layer().fields(), &["GRU_ID", "HRU_ID", "IGBP_1", "IGBP_2", "IGBP_9"]);
    }

    #[test]
    fn test_absent_class_dropped() {
        let table = count_per_class(&landcover(), &hrus(), &[3, 1, 2], &params("")).unwrap();
        assert_eq!(table.column_names(), vec!["1", "2"]);
        assert!(!table.layer().has_field("3"));
    }

    #[test]
    fn test_keep_empty_columns() {
        let p = ClassCountParams {
            drop_empty: false,
            ..params("c")
        };
        let table = count_per_class(&landcover(), &hrus(), &[3, 1], &p).unwrap();
        assert_eq!(table.column_names(), vec!["c3", "c1"]);
        assert_eq!(table.class_totals(), vec![0, 10]);
    }

    #[test]
    fn test_duplicate_codes_ignored() {
        let table = count_per_class(&landcover(), &hrus(), &[2, 2, 1, 2], &params("")).unwrap();
        assert_eq!(table.column_names(), vec!["2", "1"]);
    }

    #[test]
    fn test_nodata_never_counted() {
        let table = count_per_class(&landcover(), &hrus(), &[0, 9], &params("")).unwrap();
        assert_eq!(table.column_names(), vec!["9"]);
    }

    #[test]
    fn test_input_not_modified() {
        let layer = hrus();
        let _ = count_per_class(&landcover(), &layer, &[1], &params("")).unwrap();
        assert_eq!(layer.fields(), &["GRU_ID", "HRU_ID"]);
    }

    #[test]
    fn test_errors() {
        assert!(matches!(
            count_per_class(&landcover(), &hrus(), &[], &params("")),
            Err(Error::EmptyClassList)
        ));
        assert!(matches!(
            count_per_class(&landcover(), &PolygonLayer::new(Some(CRS::from_epsg(32611))), &[1], &params("")),
            Err(Error::EmptyLayer)
        ));

        let mut no_crs = hrus();
        no_crs.set_crs(None);
        assert!(matches!(
            count_per_class(&landcover(), &no_crs, &[1], &params("")),
            Err(Error::InputMismatch(_))
        ));

        let mut other = hrus();
        other.set_crs(Some(CRS::wgs84()));
        assert!(matches!(
            count_per_class(&landcover(), &other, &[1], &params("")),
            Err(Error::InputMismatch(_))
        ));
    }

    #[test]
    fn test_recount_follows_class_order() {
        let first = count_per_class(&landcover(), &hrus(), &[1, 2, 9], &params("IGBP_")).unwrap();
        let persisted = first.into_layer();

        let again = count_per_class(&landcover(), &persisted, &[9, 2, 1], &params("IGBP_")).unwrap();
        assert_eq!(again.column_names(), vec!["IGBP_9", "IGBP_2", "IGBP_1"]);
        assert_eq!(again.layer().fields(), &["GRU_ID", "HRU_ID", "IGBP_9", "IGBP_2", "IGBP_1"]);
        assert_eq!(again.counts(0).unwrap(), &[0, 5, 10]);
    }

    #[test]
    fn test_from_layer_by_prefix() {
        let counted = count_per_class(&landcover(), &hrus(), &[1, 2, 9], &params("IGBP_")).unwrap();
        let mut layer = counted.into_layer();
        layer.set_column("IGBP_note", vec!["x", "y"]).unwrap();

        let table = ClassCountTable::from_layer(layer, &CountSchema::Prefix("IGBP_".into())).unwrap();
        assert_eq!(table.column_names(), vec!["IGBP_1", "IGBP_2", "IGBP_9"]);
        assert_eq!(table.columns()[2].code, Some(9));
        assert_eq!(table.count(1, "IGBP_9"), Some(2));
    }

    #[test]
    fn test_from_layer_rejects_bad_counts() {
        let mut layer = hrus();
        layer.set_column("USGS_3", vec![AttributeValue::Float(2.5), AttributeValue::Int(1)]).unwrap();
        let err = ClassCountTable::from_layer(layer.clone(), &CountSchema::Prefix("USGS_".into()));
        assert!(matches!(err, Err(Error::InvalidAttribute { feature: 0, .. })));

        let err = ClassCountTable::from_layer(layer, &CountSchema::Columns(vec!["USGS_4".into()]));
        assert!(matches!(err, Err(Error::MissingAttribute { .. })));
    }
}
