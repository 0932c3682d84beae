//! Zonal statistics over polygons
//!
//! Summarises the valid raster cells covered by each polygon of a layer,
//! e.g. mean elevation of a response unit or majority soil class of a basin.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use hrufrac_core::raster::{Raster, RasterElement};
use hrufrac_core::vector::{AttributeValue, PolygonLayer};
use hrufrac_core::{CoveragePolicy, Error, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::classes::check_alignment;
use crate::coverage::layer_cells;

/// Available polygon statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolygonStatistic {
    /// Number of valid cells
    Count,
    Mean,
    /// Most frequent class code; ties go to the smallest code
    Majority,
    Min,
    Max,
}

impl FromStr for PolygonStatistic {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "count" => Ok(PolygonStatistic::Count),
            "mean" | "average" => Ok(PolygonStatistic::Mean),
            "majority" | "mode" => Ok(PolygonStatistic::Majority),
            "min" | "minimum" => Ok(PolygonStatistic::Min),
            "max" | "maximum" => Ok(PolygonStatistic::Max),
            other => Err(Error::InvalidParameter {
                name: "statistic",
                value: other.to_string(),
                reason: "expected count, mean, majority, min or max".into(),
            }),
        }
    }
}

impl fmt::Display for PolygonStatistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PolygonStatistic::Count => "count",
            PolygonStatistic::Mean => "mean",
            PolygonStatistic::Majority => "majority",
            PolygonStatistic::Min => "min",
            PolygonStatistic::Max => "max",
        };
        write!(f, "{}", name)
    }
}

/// Accumulated cell values of one polygon
#[derive(Debug, Clone, Default)]
struct Accumulator {
    count: usize,
    sum: f64,
    min: f64,
    max: f64,
    classes: BTreeMap<i64, usize>,
}

impl Accumulator {
    fn add(&mut self, value: f64, class: Option<i64>) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.count += 1;
        self.sum += value;
        if let Some(c) = class {
            *self.classes.entry(c).or_insert(0) += 1;
        }
    }

    fn finish(&self, statistic: PolygonStatistic) -> Option<f64> {
        if self.count == 0 && statistic != PolygonStatistic::Count {
            return None;
        }
        match statistic {
            PolygonStatistic::Count => Some(self.count as f64),
            PolygonStatistic::Mean => Some(self.sum / self.count as f64),
            PolygonStatistic::Min => Some(self.min),
            PolygonStatistic::Max => Some(self.max),
            PolygonStatistic::Majority => {
                // BTreeMap iterates ascending, so the first maximum is the smallest code
                let mut best: Option<(i64, usize)> = None;
                for (&code, &n) in &self.classes {
                    if best.map_or(true, |(_, b)| n > b) {
                        best = Some((code, n));
                    }
                }
                best.map(|(code, _)| code as f64)
            }
        }
    }
}

/// Compute one statistic per polygon.
///
/// # Returns
/// One entry per feature, in layer order. `None` marks a polygon that covers
/// no valid cell (`Count` reports 0 instead). `Majority` ignores cells whose
/// value is not an integral class code.
pub fn polygon_statistic<T: RasterElement>(
    raster: &Raster<T>,
    layer: &PolygonLayer,
    statistic: PolygonStatistic,
    coverage: CoveragePolicy,
) -> Result<Vec<Option<f64>>> {
    if layer.is_empty() {
        return Err(Error::EmptyLayer);
    }
    check_alignment(raster.crs(), layer.crs())?;

    let (rows, cols) = raster.shape();
    let cells = layer_cells(raster.transform(), rows, cols, layer, coverage);

    let results: Vec<Option<f64>> = cells
        .iter()
        .map(|polygon_cells| {
            let mut acc = Accumulator::default();
            for &(row, col) in polygon_cells {
                if let Some(value) = raster.valid_at(row, col) {
                    if let Some(v) = RasterElement::to_f64(value) {
                        acc.add(v, value.to_class_code());
                    }
                }
            }
            acc.finish(statistic)
        })
        .collect();

    let missing = results.iter().filter(|r| r.is_none()).count();
    if missing > 0 {
        debug!("{} polygons cover no valid cell", missing);
    }
    Ok(results)
}

/// Compute a statistic and store it in `column` of a copy of the layer.
///
/// Count and majority are written as integers, the others as floats;
/// polygons without a value get `Null`.
pub fn append_statistic<T: RasterElement>(
    raster: &Raster<T>,
    layer: &PolygonLayer,
    column: &str,
    statistic: PolygonStatistic,
    coverage: CoveragePolicy,
) -> Result<PolygonLayer> {
    let values = polygon_statistic(raster, layer, statistic, coverage)?;
    let integral = matches!(statistic, PolygonStatistic::Count | PolygonStatistic::Majority);

    let mut out = layer.clone();
    out.set_column(
        column,
        values.into_iter().map(|v| match v {
            Some(v) if integral => AttributeValue::Int(v as i64),
            Some(v) => AttributeValue::Float(v),
            None => AttributeValue::Null,
        }),
    )?;
    info!("Wrote {} of {} polygons to '{}'", statistic, out.len(), column);
    Ok(out)
}
