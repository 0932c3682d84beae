//! # hrufrac algorithms
//!
//! Aggregation of categorical rasters onto response-unit polygons.
//!
//! ## Modules
//!
//! - **coverage**: which cells belong to a polygon (center point or all touched)
//! - **classes**: per-class pixel counts and class fractions per unit or parent basin
//! - **statistics**: polygon zonal statistics and mode composites

pub mod classes;
pub mod coverage;
pub mod statistics;

pub(crate) mod maybe_rayon;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::classes::{
        count_per_class, fractions_from_counts, fractions_from_counts_grouped, ClassColumn,
        ClassCountParams, ClassCountTable, CountSchema, FractionParams, FractionRow,
        GroupedFractionTable, GroupedFractions, UnitFractionTable, UnitFractions,
    };
    pub use crate::coverage::{layer_cells, polygon_cells};
    pub use crate::statistics::{append_statistic, mode_composite, polygon_statistic, PolygonStatistic};
    pub use hrufrac_core::prelude::*;
}
