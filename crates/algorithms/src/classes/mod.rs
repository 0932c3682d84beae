//! Class counting and class fractions for response units
//!
//! - **count**: pixel count of each raster class inside each polygon
//! - **fractions**: counts to fractions, per unit or per parent basin

pub mod count;
pub mod fractions;

pub use count::{check_alignment, count_per_class, ClassColumn, ClassCountParams, ClassCountTable, CountSchema};
pub use fractions::{
    fractions_from_counts, fractions_from_counts_grouped, FractionParams, FractionRow,
    GroupedFractionParams, GroupedFractionTable, GroupedFractions, UnitFractionTable,
    UnitFractions,
};
