//! Affine geotransformation for rasters

use serde::{Deserialize, Serialize};

/// Affine transformation coefficients for georeferencing rasters.
///
/// Converts between pixel coordinates (col, row) and geographic coordinates (x, y):
/// ```text
/// x = origin_x + col * pixel_width + row * row_rotation
/// y = origin_y + col * col_rotation + row * pixel_height
/// ```
///
/// For north-up images, `row_rotation` and `col_rotation` are 0,
/// and `pixel_height` is negative.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    /// X coordinate of the upper-left corner
    pub origin_x: f64,
    /// Y coordinate of the upper-left corner
    pub origin_y: f64,
    /// Pixel width (cell size in X direction)
    pub pixel_width: f64,
    /// Pixel height (cell size in Y direction, usually negative)
    pub pixel_height: f64,
    /// Rotation about X axis (usually 0)
    pub row_rotation: f64,
    /// Rotation about Y axis (usually 0)
    pub col_rotation: f64,
}

/// Inclusive-exclusive range of rows and columns inside a raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelWindow {
    pub row_start: usize,
    pub row_end: usize,
    pub col_start: usize,
    pub col_end: usize,
}

impl PixelWindow {
    pub fn is_empty(&self) -> bool {
        self.row_start >= self.row_end || self.col_start >= self.col_end
    }

    /// Iterate `(row, col)` pairs in row-major order
    pub fn cells(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (self.row_start..self.row_end)
            .flat_map(move |row| (self.col_start..self.col_end).map(move |col| (row, col)))
    }
}

impl GeoTransform {
    /// Create a new GeoTransform with no rotation (north-up image)
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
            row_rotation: 0.0,
            col_rotation: 0.0,
        }
    }

    /// Create from GDAL-style array [origin_x, pixel_width, row_rotation, origin_y, col_rotation, pixel_height]
    pub fn from_gdal(coeffs: [f64; 6]) -> Self {
        Self {
            origin_x: coeffs[0],
            pixel_width: coeffs[1],
            row_rotation: coeffs[2],
            origin_y: coeffs[3],
            col_rotation: coeffs[4],
            pixel_height: coeffs[5],
        }
    }

    /// Convert to GDAL-style array
    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.origin_x,
            self.pixel_width,
            self.row_rotation,
            self.origin_y,
            self.col_rotation,
            self.pixel_height,
        ]
    }

    /// Geographic coordinates of the pixel center
    pub fn pixel_to_geo(&self, col: usize, row: usize) -> (f64, f64) {
        self.apply(col as f64 + 0.5, row as f64 + 0.5)
    }

    /// Geographic coordinates of the pixel's top-left corner
    pub fn pixel_to_geo_corner(&self, col: usize, row: usize) -> (f64, f64) {
        self.apply(col as f64, row as f64)
    }

    fn apply(&self, col: f64, row: f64) -> (f64, f64) {
        let x = self.origin_x + col * self.pixel_width + row * self.row_rotation;
        let y = self.origin_y + col * self.col_rotation + row * self.pixel_height;
        (x, y)
    }

    /// The four corners of a cell, counter-clockwise from the top-left.
    ///
    /// Used to test cell/polygon overlap under the all-touched policy.
    pub fn cell_corners(&self, col: usize, row: usize) -> [(f64, f64); 4] {
        [
            self.pixel_to_geo_corner(col, row),
            self.pixel_to_geo_corner(col, row + 1),
            self.pixel_to_geo_corner(col + 1, row + 1),
            self.pixel_to_geo_corner(col + 1, row),
        ]
    }

    /// Convert geographic coordinates to pixel coordinates
    ///
    /// Returns fractional pixel coordinates; use `.floor()` to get integer indices
    pub fn geo_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        let det = self.pixel_width * self.pixel_height - self.row_rotation * self.col_rotation;

        if det.abs() < 1e-10 {
            return (f64::NAN, f64::NAN);
        }

        let dx = x - self.origin_x;
        let dy = y - self.origin_y;

        let col = (self.pixel_height * dx - self.row_rotation * dy) / det;
        let row = (-self.col_rotation * dx + self.pixel_width * dy) / det;

        (col, row)
    }

    /// Cell size (assumes square pixels and no rotation)
    pub fn cell_size(&self) -> f64 {
        self.pixel_width.abs()
    }

    /// Bounding box `(min_x, min_y, max_x, max_y)` of a raster of given dimensions
    pub fn bounds(&self, width: usize, height: usize) -> (f64, f64, f64, f64) {
        let corners = [
            self.pixel_to_geo_corner(0, 0),
            self.pixel_to_geo_corner(width, 0),
            self.pixel_to_geo_corner(0, height),
            self.pixel_to_geo_corner(width, height),
        ];
        envelope(&corners)
    }

    /// Pixel window covering a geographic envelope, clipped to the raster.
    ///
    /// The window is conservative: every cell that could touch the envelope
    /// is included. Returns `None` when the envelope misses the raster.
    pub fn window(
        &self,
        envelope_geo: (f64, f64, f64, f64),
        width: usize,
        height: usize,
    ) -> Option<PixelWindow> {
        let (min_x, min_y, max_x, max_y) = envelope_geo;
        let corners = [
            self.geo_to_pixel(min_x, min_y),
            self.geo_to_pixel(min_x, max_y),
            self.geo_to_pixel(max_x, min_y),
            self.geo_to_pixel(max_x, max_y),
        ];
        if corners.iter().any(|(c, r)| c.is_nan() || r.is_nan()) {
            return None;
        }
        let (c0, r0, c1, r1) = envelope(&corners);

        let clamp = |v: f64, hi: usize| v.max(0.0).min(hi as f64) as usize;
        let window = PixelWindow {
            row_start: clamp(r0.floor(), height),
            row_end: clamp(r1.floor() + 1.0, height),
            col_start: clamp(c0.floor(), width),
            col_end: clamp(c1.floor() + 1.0, width),
        };

        if window.is_empty() {
            None
        } else {
            Some(window)
        }
    }
}

fn envelope(points: &[(f64, f64)]) -> (f64, f64, f64, f64) {
    points.iter().fold(
        (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
        |(x0, y0, x1, y1), &(x, y)| (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
    )
}

impl Default for GeoTransform {
    fn default() -> Self {
        Self::new(0.0, 0.0, 1.0, -1.0)
    }
}
