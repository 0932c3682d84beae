//! Mode composite of a raster stack
//!
//! Collapses several same-shaped categorical rasters (e.g. one land-cover
//! map per year) into one raster holding the most frequent class per cell.

use ndarray::Array2;
use hrufrac_core::raster::{Raster, RasterElement};
use hrufrac_core::{Error, Result};
use tracing::info;

use crate::maybe_rayon::*;

/// Per-cell most frequent valid value across `layers`.
///
/// Ties resolve to the smallest value. Cells that are nodata in every layer
/// stay nodata in the output. The output takes its georeferencing and nodata
/// value from the first layer.
///
/// # Errors
/// `InvalidParameter` for an empty stack, `SizeMismatch` when shapes differ,
/// `InputMismatch` when coordinate reference systems differ.
pub fn mode_composite<T: RasterElement>(layers: &[Raster<T>]) -> Result<Raster<T>> {
    let first = layers.first().ok_or_else(|| Error::InvalidParameter {
        name: "layers",
        value: "0".into(),
        reason: "mode composite needs at least one raster".into(),
    })?;
    let (rows, cols) = first.shape();

    for layer in &layers[1..] {
        let (r, c) = layer.shape();
        if (r, c) != (rows, cols) {
            return Err(Error::SizeMismatch {
                er: rows,
                ec: cols,
                ar: r,
                ac: c,
            });
        }
        match (first.crs(), layer.crs()) {
            (Some(a), Some(b)) if !a.is_equivalent(b) => {
                return Err(Error::InputMismatch(format!(
                    "composite layers use different CRS: {} and {}",
                    a, b
                )));
            }
            (Some(_), None) | (None, Some(_)) => {
                return Err(Error::InputMismatch(
                    "composite layers mix georeferenced and unreferenced rasters".into(),
                ));
            }
            _ => {}
        }
    }

    let nodata = first.nodata().unwrap_or_else(T::default_nodata);

    let data: Vec<T> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![nodata; cols];
            let mut stack: Vec<T> = Vec::with_capacity(layers.len());

            for (col, out) in row_data.iter_mut().enumerate() {
                stack.clear();
                stack.extend(layers.iter().filter_map(|l| l.valid_at(row, col)));
                if let Some(v) = most_frequent(&mut stack) {
                    *out = v;
                }
            }
            row_data
        })
        .collect();

    let array = Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::Other(e.to_string()))?;
    let mut output = Raster::from_array(array);
    output.set_transform(*first.transform());
    output.set_crs(first.crs().cloned());
    output.set_nodata(Some(nodata));

    info!("Mode composite of {} layers ({}x{})", layers.len(), rows, cols);
    Ok(output)
}

/// Most frequent value of a small sample, smallest on ties
fn most_frequent<T: RasterElement>(values: &mut [T]) -> Option<T> {
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let mut best: Option<(T, usize)> = None;
    let mut i = 0;
    while i < values.len() {
        let mut j = i + 1;
        while j < values.len() && values[j] == values[i] {
            j += 1;
        }
        if best.map_or(true, |(_, n)| j - i > n) {
            best = Some((values[i], j - i));
        }
        i = j;
    }
    best.map(|(v, _)| v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hrufrac_core::raster::GeoTransform;
    use hrufrac_core::CRS;

    fn year(values: Vec<u8>) -> Raster<u8> {
        let mut r = Raster::from_vec(values, 2, 2).unwrap();
        r.set_transform(GeoTransform::new(500.0, 1000.0, 30.0, -30.0));
        r.set_crs(Some(CRS::from_epsg(32611)));
        r.set_nodata(Some(255));
        r
    }

    #[test]
    fn test_mode_per_cell() {
        let stack = vec![
            year(vec![1, 4, 7, 255]),
            year(vec![1, 5, 8, 255]),
            year(vec![2, 5, 7, 255]),
        ];
        let out = mode_composite(&stack).unwrap();
        assert_eq!(out.get(0, 0).unwrap(), 1);
        assert_eq!(out.get(0, 1).unwrap(), 5);
        assert_eq!(out.get(1, 0).unwrap(), 7);
        assert_eq!(out.get(1, 1).unwrap(), 255);
        assert!(out.valid_at(1, 1).is_none());
        assert_eq!(out.transform(), stack[0].transform());
        assert_eq!(out.crs(), stack[0].crs());
    }

    #[test]
    fn test_tie_takes_smallest() {
        let stack = vec![year(vec![9, 3, 3, 1]), year(vec![2, 9, 255, 255])];
        let out = mode_composite(&stack).unwrap();
        assert_eq!(out.get(0, 0).unwrap(), 2);
        assert_eq!(out.get(0, 1).unwrap(), 3);
        assert_eq!(out.get(1, 0).unwrap(), 3);
        assert_eq!(out.get(1, 1).unwrap(), 1);
    }

    #[test]
    fn test_mismatches() {
        let empty: Vec<Raster<u8>> = Vec::new();
        assert!(mode_composite(&empty).is_err());

        let small = Raster::<u8>::new(1, 1);
        assert!(matches!(
            mode_composite(&[year(vec![1, 1, 1, 1]), small]),
            Err(Error::SizeMismatch { .. })
        ));

        let mut other = year(vec![1, 1, 1, 1]);
        other.set_crs(Some(CRS::from_epsg(4326)));
        assert!(matches!(
            mode_composite(&[year(vec![1, 1, 1, 1]), other]),
            Err(Error::InputMismatch(_))
        ));
    }
}
