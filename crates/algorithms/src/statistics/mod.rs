//! Statistics of raster cells
//!
//! - **zonal**: one statistic per polygon (mean, majority, ...)
//! - **composite**: per-cell mode across a raster stack

pub mod composite;
pub mod zonal;

pub use composite::mode_composite;
pub use zonal::{append_statistic, polygon_statistic, PolygonStatistic};
