//! Error types for hrufrac

use thiserror::Error;

/// Main error type for hrufrac operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid raster dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Index out of bounds: ({row}, {col}) in raster of size ({rows}, {cols})")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Raster size mismatch: expected ({er}, {ec}), got ({ar}, {ac})")]
    SizeMismatch { er: usize, ec: usize, ar: usize, ac: usize },

    /// Raster and polygons cannot be aligned: a CRS is missing or the two differ.
    #[error("Input mismatch: {0}")]
    InputMismatch(String),

    #[error("Class code list is empty")]
    EmptyClassList,

    #[error("Polygon layer is empty")]
    EmptyLayer,

    #[error("Missing attribute '{field}' on feature {feature}")]
    MissingAttribute { field: String, feature: usize },

    #[error("Invalid attribute '{field}' on feature {feature}: {reason}")]
    InvalidAttribute {
        field: String,
        feature: usize,
        reason: String,
    },

    #[error("Control file error: {0}")]
    Config(String),

    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(String),

    #[error("GDAL error: {0}")]
    #[cfg(feature = "gdal")]
    Gdal(String),

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0}")]
    Other(String),
}

#[cfg(feature = "gdal")]
impl From<gdal::errors::GdalError> for Error {
    fn from(e: gdal::errors::GdalError) -> Self {
        Error::Gdal(e.to_string())
    }
}

/// Result type alias for hrufrac operations
pub type Result<T> = std::result::Result<T, Error>;
