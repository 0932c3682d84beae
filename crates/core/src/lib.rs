//! # hrufrac core
//!
//! Core types, configuration and I/O for aggregating categorical rasters
//! onto hydrological response units.
//!
//! This crate provides:
//! - `Raster<T>`: Generic georeferenced raster grid
//! - `GeoTransform`: Affine transformation for georeferencing
//! - `CRS`: Coordinate Reference System handling
//! - `PolygonLayer`: Ordered polygon features with an attribute table
//! - `ControlFile` / `ZonalConfig`: run configuration
//! - I/O for GeoTIFF rasters, GeoJSON layers and CSV tables

pub mod config;
pub mod crs;
pub mod error;
pub mod io;
pub mod raster;
pub mod vector;

pub use geo_types;

pub use config::{ControlFile, CoveragePolicy, ZonalConfig};
pub use crs::CRS;
pub use error::{Error, Result};
pub use raster::{GeoTransform, Raster, RasterElement};
pub use vector::{AttributeValue, Feature, PolygonLayer};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::config::{ControlFile, CoveragePolicy, ZonalConfig};
    pub use crate::crs::CRS;
    pub use crate::error::{Error, Result};
    pub use crate::raster::{GeoTransform, Raster, RasterElement};
    pub use crate::vector::{AttributeValue, Feature, PolygonLayer};
    pub use crate::Algorithm;
}

/// Core trait for the aggregation steps of the pipeline.
///
/// Algorithms are pure functions that derive a new table from their inputs
/// according to parameters; inputs are never mutated.
pub trait Algorithm {
    /// Input type for the algorithm
    type Input;
    /// Output type for the algorithm
    type Output;
    /// Parameters controlling algorithm behavior
    type Params: Default;
    /// Error type for algorithm execution
    type Error: std::error::Error;

    /// Returns the algorithm name
    fn name(&self) -> &'static str;

    /// Returns a description of what the algorithm does
    fn description(&self) -> &'static str;

    /// Execute the algorithm
    fn execute(&self, input: Self::Input, params: Self::Params) -> std::result::Result<Self::Output, Self::Error>;

    /// Execute with default parameters
    fn execute_default(&self, input: Self::Input) -> std::result::Result<Self::Output, Self::Error> {
        self.execute(input, Self::Params::default())
    }
}
