//! Fraction normalizers
//!
//! Turn class counts into area fractions, either per response unit or
//! summed over every unit that shares a parent basin identifier.

use std::collections::HashMap;
use std::path::Path;

use hrufrac_core::io::{write_table, write_table_to};
use hrufrac_core::vector::{AttributeValue, PolygonLayer};
use hrufrac_core::{Algorithm, Error, Result, ZonalConfig};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::count::ClassCountTable;

/// Fractions of one polygon or parent group.
///
/// `fractions` is `None` when the total count is zero: the fractions are
/// undefined and the caller decides what to do with the row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FractionRow {
    /// Response-unit index or parent identifier
    pub key: String,
    /// Number of response units aggregated into this row
    pub members: usize,
    /// Sum of the class counts
    pub total: u64,
    pub fractions: Option<Vec<f64>>,
}

impl FractionRow {
    fn from_counts(key: String, members: usize, counts: &[u64]) -> Self {
        let total: u64 = counts.iter().sum();
        let fractions = if total == 0 {
            None
        } else {
            let t = total as f64;
            Some(counts.iter().map(|&c| c as f64 / t).collect())
        };
        Self {
            key,
            members,
            total,
            fractions,
        }
    }

    pub fn is_defined(&self) -> bool {
        self.fractions.is_some()
    }

    /// Fraction of the class column at `index`
    pub fn get(&self, index: usize) -> Option<f64> {
        self.fractions.as_ref()?.get(index).copied()
    }

    /// Fractions with the NaN sentinel in every column of a zero-total row
    pub fn values_or_nan(&self, columns: usize) -> Vec<f64> {
        match &self.fractions {
            Some(f) => f.clone(),
            None => vec![f64::NAN; columns],
        }
    }

    /// Sum of the fractions, `None` for a zero-total row
    pub fn sum(&self) -> Option<f64> {
        self.fractions.as_ref().map(|f| f.iter().sum())
    }
}

/// Parameters for per-unit fractions
#[derive(Debug, Clone)]
pub struct FractionParams {
    /// Appended to each count column name
    pub suffix: String,
    /// Response-unit identifier used as the row key; units without it are
    /// keyed by their position
    pub id_field: String,
}

impl Default for FractionParams {
    fn default() -> Self {
        Self {
            suffix: "_frac".to_string(),
            id_field: "HRU_ID".to_string(),
        }
    }
}

impl From<&ZonalConfig> for FractionParams {
    fn from(config: &ZonalConfig) -> Self {
        Self {
            suffix: config.fraction_suffix.clone(),
            id_field: config.id_field.clone(),
        }
    }
}

/// Per-unit fractions: the count layer with each count column replaced by
/// its fraction under a suffixed name
#[derive(Debug, Clone)]
pub struct UnitFractionTable {
    layer: PolygonLayer,
    columns: Vec<String>,
    rows: Vec<FractionRow>,
}

impl UnitFractionTable {
    pub fn layer(&self) -> &PolygonLayer {
        &self.layer
    }

    pub fn into_layer(self) -> PolygonLayer {
        self.layer
    }

    /// Fraction column names, in count-column order
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// One row per response unit, in input order
    pub fn rows(&self) -> &[FractionRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Convert the class counts of each polygon to fractions of its total.
///
/// Non-count attributes and row order are untouched. Each count column
/// `name` becomes `{name}{suffix}`; a polygon whose counts sum to zero gets
/// `Null` in every fraction column.
pub fn fractions_from_counts(
    table: &ClassCountTable,
    params: &FractionParams,
) -> Result<UnitFractionTable> {
    let mut layer = table.layer().clone();
    let width = table.columns().len();

    let rows: Vec<FractionRow> = (0..table.len())
        .map(|i| {
            let counts = table.counts(i).unwrap_or(&[]);
            let key = table
                .layer()
                .attribute(i, &params.id_field)
                .and_then(AttributeValue::as_key)
                .unwrap_or_else(|| i.to_string());
            FractionRow::from_counts(key, 1, counts)
        })
        .collect();

    let undefined = rows.iter().filter(|r| !r.is_defined()).count();
    if undefined > 0 {
        warn!("{} of {} polygons have zero class count, fractions undefined", undefined, rows.len());
    }

    let mut columns = Vec::with_capacity(width);
    for (j, column) in table.columns().iter().enumerate() {
        let renamed = format!("{}{}", column.name, params.suffix);
        let values = rows
            .iter()
            .map(|r| r.get(j).map_or(AttributeValue::Null, AttributeValue::Float));
        layer.set_column(&column.name, values)?;
        if renamed != column.name {
            if layer.has_field(&renamed) {
                return Err(Error::InvalidParameter {
                    name: "suffix",
                    value: params.suffix.clone(),
                    reason: format!("column '{}' already exists", renamed),
                });
            }
            layer.rename_field(&column.name, &renamed)?;
        }
        columns.push(renamed);
    }

    debug!("Converted {} count columns to fractions", width);

    Ok(UnitFractionTable {
        layer,
        columns,
        rows,
    })
}

/// Fractions per parent basin
#[derive(Debug, Clone)]
pub struct GroupedFractionTable {
    parent_field: String,
    columns: Vec<String>,
    rows: Vec<FractionRow>,
}

impl GroupedFractionTable {
    pub fn parent_field(&self) -> &str {
        &self.parent_field
    }

    /// Class column names, unchanged from the count table
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// One row per parent identifier, in first-seen order
    pub fn rows(&self) -> &[FractionRow] {
        &self.rows
    }

    pub fn get(&self, key: &str) -> Option<&FractionRow> {
        self.rows.iter().find(|r| r.key == key)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Header and string records, `NaN` for zero-total groups
    pub fn to_records(&self) -> (Vec<String>, Vec<Vec<String>>) {
        let mut header = Vec::with_capacity(self.columns.len() + 1);
        header.push(self.parent_field.clone());
        header.extend(self.columns.iter().cloned());

        let records = self
            .rows
            .iter()
            .map(|row| {
                let mut record = Vec::with_capacity(header.len());
                record.push(row.key.clone());
                record.extend(
                    row.values_or_nan(self.columns.len())
                        .into_iter()
                        .map(|v| v.to_string()),
                );
                record
            })
            .collect();
        (header, records)
    }

    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let (header, records) = self.to_records();
        write_table(path, &header, &records)
    }

    pub fn write_csv_to<W: std::io::Write>(&self, writer: W) -> Result<()> {
        let (header, records) = self.to_records();
        write_table_to(writer, &header, &records)
    }
}

/// Sum the class counts of all units that share a parent identifier and
/// convert the sums to fractions.
///
/// Groups appear in the order their identifier is first seen. Counts are
/// summed, so larger units weigh more. Column names are kept as they are.
///
/// # Errors
/// `MissingAttribute` when a unit lacks the parent field, `InvalidAttribute`
/// when its value cannot serve as an identifier.
pub fn fractions_from_counts_grouped(
    table: &ClassCountTable,
    parent_id_attr: &str,
) -> Result<GroupedFractionTable> {
    let width = table.columns().len();
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, (usize, Vec<u64>)> = HashMap::new();

    for i in 0..table.len() {
        let value = table
            .layer()
            .attribute(i, parent_id_attr)
            .ok_or_else(|| Error::MissingAttribute {
                field: parent_id_attr.to_string(),
                feature: i,
            })?;
        let key = value.as_key().ok_or_else(|| Error::InvalidAttribute {
            field: parent_id_attr.to_string(),
            feature: i,
            reason: format!("'{}' is not a usable identifier", value),
        })?;

        let entry = groups.entry(key.clone()).or_insert_with(|| {
            order.push(key);
            (0, vec![0u64; width])
        });
        entry.0 += 1;
        for (sum, c) in entry.1.iter_mut().zip(table.counts(i).unwrap_or(&[])) {
            *sum += c;
        }
    }

    let rows: Vec<FractionRow> = order
        .into_iter()
        .filter_map(|key| {
            let (members, sums) = groups.remove(&key)?;
            Some(FractionRow::from_counts(key, members, &sums))
        })
        .collect();

    for row in rows.iter().filter(|r| !r.is_defined()) {
        warn!("Parent '{}' has zero class count, fractions undefined", row.key);
    }
    info!("Grouped {} units into {} parents by '{}'", table.len(), rows.len(), parent_id_attr);

    Ok(GroupedFractionTable {
        parent_field: parent_id_attr.to_string(),
        columns: table.column_names().into_iter().map(String::from).collect(),
        rows,
    })
}

/// Per-unit fraction step as an [`Algorithm`]
#[derive(Debug, Clone, Default)]
pub struct UnitFractions;

impl Algorithm for UnitFractions {
    type Input = ClassCountTable;
    type Output = UnitFractionTable;
    type Params = FractionParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "UnitFractions"
    }

    fn description(&self) -> &'static str {
        "Class fractions of each response unit"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        fractions_from_counts(&input, &params)
    }
}

/// Parameters for grouped fractions
#[derive(Debug, Clone)]
pub struct GroupedFractionParams {
    pub parent_field: String,
}

impl Default for GroupedFractionParams {
    fn default() -> Self {
        Self {
            parent_field: "GRU_ID".to_string(),
        }
    }
}

/// Per-parent fraction step as an [`Algorithm`]
#[derive(Debug, Clone, Default)]
pub struct GroupedFractions;

impl Algorithm for GroupedFractions {
    type Input = ClassCountTable;
    type Output = GroupedFractionTable;
    type Params = GroupedFractionParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "GroupedFractions"
    }

    fn description(&self) -> &'static str {
        "Class fractions of each parent basin, summed over its response units"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        fractions_from_counts_grouped(&input, &params.parent_field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classes::CountSchema;
    use approx::assert_relative_eq;
    use geo::{point, Geometry};
    use hrufrac_core::vector::Feature;

    fn unit(gru: &str, a: i64, b: i64) -> Feature {
        Feature::new(Geometry::Point(point!(x: 0.0, y: 0.0)))
            .with_property("GRU_ID", gru)
            .with_property("classA", a)
            .with_property("classB", b)
    }

    fn counts(units: Vec<Feature>) -> ClassCountTable {
        let mut layer = PolygonLayer::new(None);
        for f in units {
            layer.push(f);
        }
        ClassCountTable::from_layer(
            layer,
            &CountSchema::Columns(vec!["classA".into(), "classB".into()]),
        )
        .unwrap()
    }

    #[test]
    fn test_unit_fractions() {
        let table = counts(vec![unit("A", 4, 6), unit("A", 1, 9)]);
        let out = fractions_from_counts(&table, &FractionParams::default()).unwrap();

        assert_eq!(out.columns(), &["classA_frac", "classB_frac"]);
        assert_eq!(out.layer().fields(), &["GRU_ID", "classA_frac", "classB_frac"]);
        assert_relative_eq!(out.rows()[0].get(0).unwrap(), 0.4);
        assert_relative_eq!(out.rows()[1].get(1).unwrap(), 0.9);
        assert_eq!(out.layer().attribute(1, "classA_frac"), Some(&AttributeValue::Float(0.1)));
        assert_eq!(out.layer().attribute(0, "GRU_ID"), Some(&AttributeValue::from("A")));
        for row in out.rows() {
            assert_relative_eq!(row.sum().unwrap(), 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_unit_rows_keyed_by_id_field() {
        let table = counts(vec![
            unit("A", 4, 6).with_property("HRU_ID", 101i64),
            unit("A", 1, 9),
        ]);
        let out = fractions_from_counts(&table, &FractionParams::default()).unwrap();
        assert_eq!(out.rows()[0].key, "101");
        assert_eq!(out.rows()[1].key, "1");

        let config = ZonalConfig {
            id_field: "GRU_ID".to_string(),
            fraction_suffix: "_f".to_string(),
            ..Default::default()
        };
        let out = fractions_from_counts(&table, &FractionParams::from(&config)).unwrap();
        assert_eq!(out.rows()[0].key, "A");
        assert_eq!(out.columns(), &["classA_f", "classB_f"]);
    }

    #[test]
    fn test_unit_zero_total() {
        let table = counts(vec![unit("A", 0, 0), unit("B", 3, 1)]);
        let out = fractions_from_counts(&table, &FractionParams::default()).unwrap();

        let row = &out.rows()[0];
        assert!(!row.is_defined());
        assert_eq!(row.total, 0);
        assert!(row.values_or_nan(2).iter().all(|v| v.is_nan()));
        assert_eq!(out.layer().attribute(0, "classB_frac"), Some(&AttributeValue::Null));
        assert!(out.rows()[1].is_defined());
    }

    #[test]
    fn test_suffix_collision() {
        let mut layer = PolygonLayer::new(None);
        layer.push(unit("A", 1, 1).with_property("classA_frac", 0.5));
        let table = ClassCountTable::from_layer(
            layer,
            &CountSchema::Columns(vec!["classA".into(), "classB".into()]),
        )
        .unwrap();
        assert!(fractions_from_counts(&table, &FractionParams::default()).is_err());
    }

    #[test]
    fn test_grouped_fractions() {
        let table = counts(vec![unit("A", 4, 6), unit("B", 2, 2), unit("A", 1, 9)]);
        let out = fractions_from_counts_grouped(&table, "GRU_ID").unwrap();

        assert_eq!(out.len(), 2);
        assert_eq!(out.columns(), &["classA", "classB"]);
        let a = out.get("A").unwrap();
        assert_eq!(a.members, 2);
        assert_eq!(a.total, 20);
        assert_relative_eq!(a.get(0).unwrap(), 0.25);
        assert_relative_eq!(a.get(1).unwrap(), 0.75);
        assert_eq!(out.rows()[0].key, "A");
        assert_eq!(out.rows()[1].key, "B");
    }

    #[test]
    fn test_grouped_numeric_ids() {
        let mut layer = PolygonLayer::new(None);
        for (id, a) in [(AttributeValue::Int(7), 1), (AttributeValue::Float(7.0), 3)] {
            let mut f = unit("x", a, 0);
            f.set_property("GRU_ID", id);
            layer.push(f);
        }
        let table = ClassCountTable::from_layer(
            layer,
            &CountSchema::Columns(vec!["classA".into(), "classB".into()]),
        )
        .unwrap();

        let out = fractions_from_counts_grouped(&table, "GRU_ID").unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out.rows()[0].key, "7");
        assert_eq!(out.rows()[0].members, 2);
        assert_relative_eq!(out.rows()[0].get(0).unwrap(), 1.0);
    }

    #[test]
    fn test_grouped_errors() {
        let mut layer = PolygonLayer::new(None);
        let mut f = unit("A", 1, 1);
        f.set_property("GRU_ID", AttributeValue::Null);
        layer.push(f);
        let table = ClassCountTable::from_layer(
            layer,
            &CountSchema::Columns(vec!["classA".into(), "classB".into()]),
        )
        .unwrap();

        assert!(matches!(
            fractions_from_counts_grouped(&table, "GRU_ID"),
            Err(Error::InvalidAttribute { .. })
        ));
        assert!(matches!(
            fractions_from_counts_grouped(&table, "BASIN"),
            Err(Error::MissingAttribute { .. })
        ));
    }

    #[test]
    fn test_grouped_csv() {
        let table = counts(vec![unit("A", 4, 6), unit("Z", 0, 0)]);
        let out = GroupedFractions.execute_default(table).unwrap();

        let mut buf = Vec::new();
        out.write_csv_to(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "GRU_ID,classA,classB");
        assert_eq!(lines[1], "A,0.4,0.6");
        assert_eq!(lines[2], "Z,NaN,NaN");
    }
}
