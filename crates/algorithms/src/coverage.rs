//! Which raster cells fall inside each polygon
//!
//! Two rules, selected by [`CoveragePolicy`]:
//! - **center point**: a cell belongs to a polygon when its center lies
//!   strictly inside it. Adjacent polygons never share a cell.
//! - **all touched**: a cell belongs to every polygon whose area overlaps
//!   it. Cells that only share an edge or corner with a polygon are not
//!   touched.
//!
//! Only the pixel window under a polygon's bounding box is scanned.

use crate::maybe_rayon::*;
use geo::{BoundingRect, Contains, Coord, Geometry, Intersects, MultiPolygon, Point, Polygon, Rect};
use hrufrac_core::raster::GeoTransform;
use hrufrac_core::vector::PolygonLayer;
use hrufrac_core::CoveragePolicy;

/// Fraction of a cell's size trimmed off each side in the all-touched test
const EDGE_TOLERANCE: f64 = 1e-9;

/// Polygonal part of a geometry; points and lines have no area and cover no cells
pub fn polygonal(geometry: &Geometry<f64>) -> MultiPolygon<f64> {
    match geometry {
        Geometry::Polygon(p) => MultiPolygon::new(vec![p.clone()]),
        Geometry::MultiPolygon(mp) => mp.clone(),
        Geometry::Rect(r) => MultiPolygon::new(vec![r.to_polygon()]),
        Geometry::Triangle(t) => MultiPolygon::new(vec![t.to_polygon()]),
        Geometry::GeometryCollection(gc) => {
            let parts: Vec<Polygon<f64>> = gc.iter().flat_map(|g| polygonal(g).0).collect();
            MultiPolygon::new(parts)
        }
        _ => MultiPolygon::new(vec![]),
    }
}

/// Cells `(row, col)` of a `rows x cols` grid covered by a geometry, in
/// row-major order.
pub fn polygon_cells(
    transform: &GeoTransform,
    rows: usize,
    cols: usize,
    geometry: &Geometry<f64>,
    policy: CoveragePolicy,
) -> Vec<(usize, usize)> {
    let shape = polygonal(geometry);
    let Some(bbox) = shape.bounding_rect() else {
        return Vec::new();
    };
    let envelope = (bbox.min().x, bbox.min().y, bbox.max().x, bbox.max().y);
    let Some(window) = transform.window(envelope, cols, rows) else {
        return Vec::new();
    };

    window
        .cells()
        .filter(|&(row, col)| match policy {
            CoveragePolicy::CenterPoint => {
                let (x, y) = transform.pixel_to_geo(col, row);
                shape.contains(&Point::new(x, y))
            }
            CoveragePolicy::AllTouched => cell_touches(transform, row, col, &shape),
        })
        .collect()
}

fn cell_touches(transform: &GeoTransform, row: usize, col: usize, shape: &MultiPolygon<f64>) -> bool {
    let corners = transform.cell_corners(col, row);
    let is_axis_aligned = transform.row_rotation == 0.0 && transform.col_rotation == 0.0;

    if is_axis_aligned {
        let (x0, y0) = corners[0];
        let (x1, y1) = corners[2];
        let dx = (x1 - x0).abs() * EDGE_TOLERANCE;
        let dy = (y1 - y0).abs() * EDGE_TOLERANCE;
        let cell = Rect::new(
            Coord { x: x0.min(x1) + dx, y: y0.min(y1) + dy },
            Coord { x: x0.max(x1) - dx, y: y0.max(y1) - dy },
        );
        return shape.0.iter().any(|p| p.intersects(&cell));
    }

    // Rotated grid: shrink the cell toward its center before testing
    let (cx, cy) = transform.pixel_to_geo(col, row);
    let shrink = 1.0 - 2.0 * EDGE_TOLERANCE;
    let ring: Vec<(f64, f64)> = corners
        .iter()
        .chain(std::iter::once(&corners[0]))
        .map(|&(x, y)| (cx + (x - cx) * shrink, cy + (y - cy) * shrink))
        .collect();
    let cell = Polygon::new(ring.into(), vec![]);
    shape.0.iter().any(|p| p.intersects(&cell))
}

/// Covered cells for every feature of a layer, in feature order.
///
/// Features without geometry cover nothing.
pub fn layer_cells(
    transform: &GeoTransform,
    rows: usize,
    cols: usize,
    layer: &PolygonLayer,
    policy: CoveragePolicy,
) -> Vec<Vec<(usize, usize)>> {
    let features = &layer.features;
    (0..features.len())
        .into_par_iter()
        .map(|i| match &features[i].geometry {
            Some(geometry) => polygon_cells(transform, rows, cols, geometry, policy),
            None => Vec::new(),
        })
        .collect()
}
