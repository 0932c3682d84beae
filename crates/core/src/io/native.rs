//! Native GeoTIFF reading/writing (without GDAL dependency)
//!
//! Uses the `tiff` crate. Georeferencing is read from and written to the
//! standard GeoTIFF tags: ModelPixelScale (33550), ModelTiepoint (33922),
//! GeoKeyDirectory (34735, EPSG codes only) and GDAL_NODATA (42113).
//! For full CRS support (WKT, datum shifts), enable the `gdal` feature.

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster, RasterElement};
use std::fs::File;
use std::io::{BufReader, BufWriter, Cursor};
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::colortype::Gray32Float;
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GDAL_NODATA: u16 = 42113;

const GT_MODEL_TYPE_KEY: u16 = 1024;
const GT_RASTER_TYPE_KEY: u16 = 1025;
const GEOGRAPHIC_TYPE_KEY: u16 = 2048;
const PROJECTED_CS_TYPE_KEY: u16 = 3072;
const USER_DEFINED: u16 = 32767;

fn tag(code: u16) -> Tag {
    Tag::from_u16_exhaustive(code)
}

/// Options for writing GeoTIFF files
#[derive(Debug, Clone)]
pub struct GeoTiffOptions {
    /// Compression (only "NONE" is supported in native mode)
    pub compression: String,
}

impl Default for GeoTiffOptions {
    fn default() -> Self {
        Self {
            compression: "NONE".to_string(),
        }
    }
}

/// Read a single-band GeoTIFF file into a Raster
pub fn read_geotiff<T, P>(path: P, band: Option<usize>) -> Result<Raster<T>>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = File::open(path.as_ref())?;
    decode_geotiff(BufReader::new(file), band)
}

/// Read a GeoTIFF from an in-memory buffer into a Raster
pub fn read_geotiff_from_buffer<T>(data: &[u8], band: Option<usize>) -> Result<Raster<T>>
where
    T: RasterElement,
{
    decode_geotiff(Cursor::new(data), band)
}

fn cast_all<S, T>(buf: Vec<S>) -> Vec<T>
where
    S: num_traits::NumCast + Copy,
    T: RasterElement,
{
    buf.into_iter()
        .map(|v| num_traits::cast(v).unwrap_or(T::default_nodata()))
        .collect()
}

fn decode_geotiff<T, R>(reader: R, band: Option<usize>) -> Result<Raster<T>>
where
    T: RasterElement,
    R: std::io::Read + std::io::Seek,
{
    if let Some(b) = band.filter(|&b| b != 1) {
        return Err(Error::InvalidParameter {
            name: "band",
            value: b.to_string(),
            reason: "native reader supports single-band rasters only".into(),
        });
    }

    let mut decoder = Decoder::new(reader)
        .map_err(|e| Error::Other(format!("TIFF decode error: {}", e)))?;

    let (width, height) = decoder
        .dimensions()
        .map_err(|e| Error::Other(format!("Cannot read dimensions: {}", e)))?;

    let rows = height as usize;
    let cols = width as usize;

    let result = decoder
        .read_image()
        .map_err(|e| Error::Other(format!("Cannot read image data: {}", e)))?;

    let data: Vec<T> = match result {
        DecodingResult::U8(buf) => cast_all(buf),
        DecodingResult::U16(buf) => cast_all(buf),
        DecodingResult::U32(buf) => cast_all(buf),
        DecodingResult::U64(buf) => cast_all(buf),
        DecodingResult::I8(buf) => cast_all(buf),
        DecodingResult::I16(buf) => cast_all(buf),
        DecodingResult::I32(buf) => cast_all(buf),
        DecodingResult::I64(buf) => cast_all(buf),
        DecodingResult::F32(buf) => cast_all(buf),
        DecodingResult::F64(buf) => cast_all(buf),
        #[allow(unreachable_patterns)]
        _ => {
            return Err(Error::UnsupportedDataType(
                "Unsupported TIFF pixel format".to_string(),
            ))
        }
    };

    if data.len() != rows * cols {
        return Err(Error::InvalidDimensions {
            width: cols,
            height: rows,
        });
    }

    let mut raster = Raster::from_vec(data, rows, cols)?;

    if let Some(transform) = read_geotransform(&mut decoder) {
        raster.set_transform(transform);
    }
    raster.set_crs(read_crs(&mut decoder));
    if let Some(nodata) = read_nodata::<T, R>(&mut decoder) {
        raster.set_nodata(Some(nodata));
    }

    Ok(raster)
}

fn read_geotransform<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
) -> Option<GeoTransform> {
    let scale = decoder.get_tag_f64_vec(tag(MODEL_PIXEL_SCALE)).ok()?;
    let tiepoint = decoder.get_tag_f64_vec(tag(MODEL_TIEPOINT)).ok()?;

    if scale.len() >= 2 && tiepoint.len() >= 6 {
        // tiepoint: [I, J, K, X, Y, Z], scale: [ScaleX, ScaleY, ScaleZ]
        let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
        let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
        return Some(GeoTransform::new(origin_x, origin_y, scale[0], -scale[1]));
    }
    None
}

/// EPSG code from the GeoKeyDirectory; projected codes win over geographic
fn read_crs<R: std::io::Read + std::io::Seek>(decoder: &mut Decoder<R>) -> Option<CRS> {
    let keys = decoder.get_tag_u16_vec(tag(GEO_KEY_DIRECTORY)).ok()?;
    epsg_from_geokeys(&keys).map(CRS::from_epsg)
}

fn epsg_from_geokeys(keys: &[u16]) -> Option<u32> {
    if keys.len() < 4 {
        return None;
    }
    let count = keys[3] as usize;
    let mut geographic = None;
    let mut projected = None;
    for entry in keys[4..].chunks_exact(4).take(count) {
        let (key_id, location, value) = (entry[0], entry[1], entry[3]);
        // location 0: value stored inline as SHORT
        if location != 0 || value == 0 || value == USER_DEFINED {
            continue;
        }
        match key_id {
            PROJECTED_CS_TYPE_KEY => projected = Some(value as u32),
            GEOGRAPHIC_TYPE_KEY => geographic = Some(value as u32),
            _ => {}
        }
    }
    projected.or(geographic)
}

fn read_nodata<T, R>(decoder: &mut Decoder<R>) -> Option<T>
where
    T: RasterElement,
    R: std::io::Read + std::io::Seek,
{
    let text = decoder.get_tag_ascii_string(tag(GDAL_NODATA)).ok()?;
    let value: f64 = text.trim_matches(char::from(0)).trim().parse().ok()?;
    num_traits::cast(value)
}

/// Write a Raster to a GeoTIFF file
///
/// Writes as 32-bit float, which holds class codes up to 2^24 exactly.
pub fn write_geotiff<T, P>(
    raster: &Raster<T>,
    path: P,
    options: Option<GeoTiffOptions>,
) -> Result<()>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    check_options(options.as_ref())?;
    let file = File::create(path.as_ref())?;
    encode_geotiff(raster, BufWriter::new(file))
}

/// Write a Raster to an in-memory GeoTIFF buffer
pub fn write_geotiff_to_buffer<T>(
    raster: &Raster<T>,
    options: Option<GeoTiffOptions>,
) -> Result<Vec<u8>>
where
    T: RasterElement,
{
    check_options(options.as_ref())?;
    let mut buf = Vec::new();
    encode_geotiff(raster, Cursor::new(&mut buf))?;
    Ok(buf)
}

/// Native writing is uncompressed only
fn check_options(options: Option<&GeoTiffOptions>) -> Result<()> {
    match options {
        Some(o) if !o.compression.eq_ignore_ascii_case("NONE") => Err(Error::InvalidParameter {
            name: "compression",
            value: o.compression.clone(),
            reason: "native GeoTIFF writer only supports NONE; build with the gdal feature".into(),
        }),
        _ => Ok(()),
    }
}

fn geokeys_for(crs: Option<&CRS>) -> Vec<u16> {
    let epsg = crs
        .and_then(CRS::epsg)
        .and_then(|code| u16::try_from(code).ok());
    let mut keys: Vec<u16> = vec![1, 1, 0, 0];
    let model_type = match (epsg, crs.map(CRS::is_geographic)) {
        (Some(_), Some(true)) => 2, // ModelTypeGeographic
        _ => 1,                     // ModelTypeProjected
    };
    keys.extend_from_slice(&[GT_MODEL_TYPE_KEY, 0, 1, model_type]);
    keys.extend_from_slice(&[GT_RASTER_TYPE_KEY, 0, 1, 1]); // RasterPixelIsArea
    if let Some(code) = epsg {
        let key = if model_type == 2 {
            GEOGRAPHIC_TYPE_KEY
        } else {
            PROJECTED_CS_TYPE_KEY
        };
        keys.extend_from_slice(&[key, 0, 1, code]);
    }
    keys[3] = ((keys.len() - 4) / 4) as u16;
    keys
}

fn encode_geotiff<T, W>(raster: &Raster<T>, writer: W) -> Result<()>
where
    T: RasterElement,
    W: std::io::Write + std::io::Seek,
{
    let mut encoder = TiffEncoder::new(writer)
        .map_err(|e| Error::Other(format!("TIFF encoder error: {}", e)))?;

    let (rows, cols) = raster.shape();

    let data: Vec<f32> = raster
        .data()
        .iter()
        .map(|&v| num_traits::cast(v).unwrap_or(f32::NAN))
        .collect();

    let mut image = encoder
        .new_image::<Gray32Float>(cols as u32, rows as u32)
        .map_err(|e| Error::Other(format!("Cannot create TIFF image: {}", e)))?;

    let gt = raster.transform();
    let scale = [gt.pixel_width, gt.pixel_height.abs(), 0.0];
    let tiepoint = [0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0];
    let geokeys = geokeys_for(raster.crs());

    let tag_err = |e: tiff::TiffError| Error::Other(format!("Cannot write GeoTIFF tag: {}", e));
    image
        .encoder()
        .write_tag(tag(MODEL_PIXEL_SCALE), &scale[..])
        .map_err(tag_err)?;
    image
        .encoder()
        .write_tag(tag(MODEL_TIEPOINT), &tiepoint[..])
        .map_err(tag_err)?;
    image
        .encoder()
        .write_tag(tag(GEO_KEY_DIRECTORY), geokeys.as_slice())
        .map_err(tag_err)?;
    if let Some(nodata) = raster.nodata().and_then(|v| v.to_f64()) {
        let text = format!("{}", nodata);
        image
            .encoder()
            .write_tag(tag(GDAL_NODATA), text.as_str())
            .map_err(tag_err)?;
    }

    image
        .write_data(&data)
        .map_err(|e| Error::Other(format!("Cannot write image data: {}", e)))?;

    Ok(())
}
