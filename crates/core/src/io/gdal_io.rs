//! GeoTIFF reading and writing through GDAL
//!
//! Same signatures as the native reader, but accepts any raster driver GDAL
//! can open (VRT mosaics of MODIS tiles, compressed GeoTIFF, ...) and keeps
//! full WKT spatial references.

use crate::crs::CRS;
use crate::error::Result;
use crate::raster::{GeoTransform, Raster, RasterElement};
use gdal::raster::GdalType;
use gdal::spatial_ref::SpatialRef;
use gdal::{Dataset, DriverManager};
use std::path::Path;

/// Options for writing GeoTIFF files
#[derive(Debug, Clone)]
pub struct GeoTiffOptions {
    /// Compression type: "DEFLATE", "LZW", "ZSTD", "NONE"
    pub compression: String,
}

impl Default for GeoTiffOptions {
    fn default() -> Self {
        Self {
            compression: "DEFLATE".to_string(),
        }
    }
}

/// Read one band (1-indexed, default 1) of a GDAL-readable raster
pub fn read_geotiff<T, P>(path: P, band: Option<usize>) -> Result<Raster<T>>
where
    T: RasterElement + GdalType,
    P: AsRef<Path>,
{
    let dataset = Dataset::open(path.as_ref())?;
    let rasterband = dataset.rasterband(band.unwrap_or(1))?;
    let (cols, rows) = dataset.raster_size();

    let buffer = rasterband.read_as::<T>((0, 0), (cols, rows), (cols, rows), None)?;
    let mut raster = Raster::from_vec(buffer.data().to_vec(), rows, cols)?;

    if let Ok(gt) = dataset.geo_transform() {
        raster.set_transform(GeoTransform::from_gdal(gt));
    }

    if let Ok(srs) = dataset.spatial_ref() {
        let crs = match (srs.auth_name(), srs.auth_code()) {
            (Ok(name), Ok(code)) if name == "EPSG" => Some(CRS::from_epsg(code as u32)),
            _ => srs.to_wkt().ok().map(CRS::from_wkt),
        };
        raster.set_crs(crs);
    }

    if let Some(nd) = rasterband.no_data_value().and_then(num_traits::cast) {
        raster.set_nodata(Some(nd));
    }

    Ok(raster)
}

/// Write a Raster to a GeoTIFF file
pub fn write_geotiff<T, P>(
    raster: &Raster<T>,
    path: P,
    options: Option<GeoTiffOptions>,
) -> Result<()>
where
    T: RasterElement + GdalType,
    P: AsRef<Path>,
{
    let opts = options.unwrap_or_default();
    let driver = DriverManager::get_driver_by_name("GTiff")?;
    let (rows, cols) = raster.shape();

    let mut create_options = gdal::raster::RasterCreationOptions::new();
    create_options.set_name_value("COMPRESS", &opts.compression)?;

    let mut dataset = driver.create_with_band_type_with_options::<T, _>(
        path.as_ref(),
        cols,
        rows,
        1,
        &create_options,
    )?;

    dataset.set_geo_transform(&raster.transform().to_gdal())?;

    if let Some(crs) = raster.crs() {
        if let Some(epsg) = crs.epsg() {
            dataset.set_spatial_ref(&SpatialRef::from_epsg(epsg)?)?;
        } else if let Some(wkt) = crs.wkt() {
            dataset.set_spatial_ref(&SpatialRef::from_wkt(wkt)?)?;
        }
    }

    let mut band = dataset.rasterband(1)?;
    if let Some(nd) = raster.nodata().and_then(|v| v.to_f64()) {
        band.set_no_data_value(Some(nd))?;
    }

    let mut buffer = gdal::raster::Buffer::new((cols, rows), raster.data().iter().copied().collect());
    band.write((0, 0), (cols, rows), &mut buffer)?;

    Ok(())
}
