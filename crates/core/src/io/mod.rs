//! I/O for rasters (GeoTIFF), polygon layers (GeoJSON) and tables (CSV)

#[cfg(feature = "gdal")]
mod gdal_io;
mod geojson_io;
mod native;
mod table;

#[cfg(feature = "gdal")]
pub use gdal_io::{read_geotiff, write_geotiff, GeoTiffOptions};

#[cfg(not(feature = "gdal"))]
pub use native::{read_geotiff, write_geotiff, GeoTiffOptions};

// Buffer-based I/O (always available, no filesystem dependency)
pub use native::{read_geotiff_from_buffer, write_geotiff_to_buffer};

pub use geojson_io::{read_geojson, read_geojson_str, to_geojson_string, write_geojson};
pub use table::{write_table, write_table_to};
