//! GeoTIFF read/write for the native engine
//!
//! Two flavours are produced: GCP-referenced rasters, where every control
//! point is stored as a ModelTiepoint with no pixel scale, and affine
//! rasters with a single tiepoint plus ModelPixelScale.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::{colortype, TiffEncoder};
use tiff::tags::Tag;
use tiff::ColorType;

use crate::bounds::GeoTransform;
use crate::error::{Error, Result};
use crate::gcp::ControlPoint;
use crate::types::Dimensions;


/// GeoKey constants
mod geo_keys {
    pub const GT_MODEL_TYPE: u16 = 1024;
    pub const GT_RASTER_TYPE: u16 = 1025;
    pub const GEOGRAPHIC_TYPE: u16 = 2048;
    pub const PROJECTED_CS_TYPE: u16 = 3072;

    pub const MODEL_TYPE_PROJECTED: u16 = 1;
    pub const MODEL_TYPE_GEOGRAPHIC: u16 = 2;
    pub const RASTER_PIXEL_IS_AREA: u16 = 1;
}

/// Represents a GeoTIFF tiepoint
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TiePoint {
    pub pixel_x: f64,
    pub pixel_y: f64,
    pub pixel_z: f64,
    pub geo_x: f64,
    pub geo_y: f64,
    pub geo_z: f64,
}

/// Georeferencing carried by a GeoTIFF
#[derive(Debug, Clone, PartialEq)]
pub struct GeoInfo {
    /// Model pixel scale (ScaleX, ScaleY, ScaleZ)
    pub pixel_scale: Option<(f64, f64, f64)>,
    /// Model tiepoints (pixel coord -> geo coord mapping)
    pub tiepoints: Vec<TiePoint>,
    /// EPSG code if detected
    pub epsg_code: Option<u16>,
}

impl GeoInfo {
    /// GCP georeferencing: one tiepoint per control point, elevation 0
    pub fn from_control_points(points: &[ControlPoint], epsg: u16) -> Self {
        let tiepoints = points
            .iter()
            .map(|p| TiePoint {
                pixel_x: p.px,
                pixel_y: p.py,
                pixel_z: 0.0,
                geo_x: p.lon,
                geo_y: p.lat,
                geo_z: 0.0,
            })
            .collect();

        Self {
            pixel_scale: None,
            tiepoints,
            epsg_code: Some(epsg),
        }
    }

    /// Affine georeferencing for a north-up raster
    pub fn from_transform(transform: &GeoTransform, epsg: u16) -> Self {
        Self {
            pixel_scale: Some((transform.pixel_width, -transform.pixel_height, 0.0)),
            tiepoints: vec![TiePoint {
                pixel_x: 0.0,
                pixel_y: 0.0,
                pixel_z: 0.0,
                geo_x: transform.origin_x,
                geo_y: transform.origin_y,
                geo_z: 0.0,
            }],
            epsg_code: Some(epsg),
        }
    }

    /// True when the raster is referenced only through control points
    pub fn is_gcp_referenced(&self) -> bool {
        self.pixel_scale.is_none() && !self.tiepoints.is_empty()
    }

    /// Control points stored as tiepoints
    pub fn control_points(&self) -> Vec<ControlPoint> {
        self.tiepoints
            .iter()
            .map(|tp| ControlPoint::new(tp.pixel_x, tp.pixel_y, tp.geo_x, tp.geo_y))
            .collect()
    }

    /// Computes the affine transform from pixel scale and the first tiepoint
    pub fn affine_transform(&self) -> Option<GeoTransform> {
        let (scale_x, scale_y, _) = self.pixel_scale?;
        let tp = self.tiepoints.first()?;

        Some(GeoTransform::north_up(
            tp.geo_x - scale_x * tp.pixel_x,
            tp.geo_y + scale_y * tp.pixel_y,
            scale_x,
            -scale_y,
        ))
    }

    fn read<R: std::io::Read + std::io::Seek>(decoder: &mut Decoder<R>) -> Result<Option<Self>> {
        let scale = decoder
            .find_tag(Tag::ModelPixelScaleTag)?
            .map(|v| v.into_f64_vec())
            .transpose()?;
        let tiepoints = decoder
            .find_tag(Tag::ModelTiepointTag)?
            .map(|v| v.into_f64_vec())
            .transpose()?;
        let keys = decoder
            .find_tag(Tag::GeoKeyDirectoryTag)?
            .map(|v| v.into_u16_vec())
            .transpose()?;

        if scale.is_none() && tiepoints.is_none() && keys.is_none() {
            return Ok(None);
        }

        let pixel_scale = scale
            .filter(|values| values.len() >= 3)
            .map(|values| (values[0], values[1], values[2]));

        let tiepoints = tiepoints
            .unwrap_or_default()
            .chunks_exact(6)
            .map(|chunk| TiePoint {
                pixel_x: chunk[0],
                pixel_y: chunk[1],
                pixel_z: chunk[2],
                geo_x: chunk[3],
                geo_y: chunk[4],
                geo_z: chunk[5],
            })
            .collect();

        Ok(Some(Self {
            pixel_scale,
            tiepoints,
            epsg_code: keys.as_deref().and_then(epsg_from_keys),
        }))
    }

    fn key_directory(&self) -> Vec<u16> {
        let epsg = self.epsg_code.unwrap_or(crate::projection::epsg::WGS84);
        let geographic = is_geographic(epsg);

        let mut keys = vec![1, 1, 0, 3];
        keys.extend_from_slice(&[
            geo_keys::GT_MODEL_TYPE,
            0,
            1,
            if geographic {
                geo_keys::MODEL_TYPE_GEOGRAPHIC
            } else {
                geo_keys::MODEL_TYPE_PROJECTED
            },
        ]);
        keys.extend_from_slice(&[geo_keys::GT_RASTER_TYPE, 0, 1, geo_keys::RASTER_PIXEL_IS_AREA]);
        if geographic {
            keys.extend_from_slice(&[geo_keys::GEOGRAPHIC_TYPE, 0, 1, epsg]);
        } else {
            keys.extend_from_slice(&[geo_keys::PROJECTED_CS_TYPE, 0, 1, epsg]);
        }
        keys
    }
}

/// EPSG codes in the geographic 4xxx range are stored as GeographicTypeGeoKey
fn is_geographic(epsg: u16) -> bool {
    (4000..5000).contains(&epsg)
}

fn epsg_from_keys(keys: &[u16]) -> Option<u16> {
    if keys.len() < 4 {
        return None;
    }

    let num_keys = keys[3] as usize;
    (0..num_keys)
        .map(|i| 4 + i * 4)
        .filter(|offset| offset + 3 < keys.len())
        .find_map(|offset| {
            let key_id = keys[offset];
            let location = keys[offset + 1];
            match key_id {
                geo_keys::GEOGRAPHIC_TYPE | geo_keys::PROJECTED_CS_TYPE if location == 0 => {
                    Some(keys[offset + 3])
                }
                _ => None,
            }
        })
}

/// An RGBA8 raster with optional georeferencing
#[derive(Debug, Clone)]
pub struct GeoRaster {
    pub dimensions: Dimensions,
    /// Interleaved RGBA, row-major
    pub pixels: Vec<u8>,
    pub geo: Option<GeoInfo>,
}

/// Reads dimensions and georeferencing without decoding pixels
pub fn read_geo_info<P: AsRef<Path>>(path: P) -> Result<(Dimensions, Option<GeoInfo>)> {
    let mut decoder = Decoder::new(BufReader::new(File::open(path)?))?;
    let (width, height) = decoder.dimensions()?;
    let geo = GeoInfo::read(&mut decoder)?;
    Ok((Dimensions::new(width as u64, height as u64), geo))
}

/// Reads a GeoTIFF and expands its pixels to RGBA8
pub fn read_geotiff<P: AsRef<Path>>(path: P) -> Result<GeoRaster> {
    let mut decoder = Decoder::new(BufReader::new(File::open(path)?))?;
    let (width, height) = decoder.dimensions()?;
    let color = decoder.colortype()?;
    let geo = GeoInfo::read(&mut decoder)?;

    let data = match decoder.read_image()? {
        DecodingResult::U8(data) => data,
        _ => {
            return Err(Error::Transform(format!(
                "Unsupported GeoTIFF sample type for {:?}",
                color
            )))
        }
    };

    let pixels = match color {
        ColorType::RGBA(8) => data,
        ColorType::RGB(8) => data
            .chunks_exact(3)
            .flat_map(|px| [px[0], px[1], px[2], 255])
            .collect(),
        ColorType::GrayA(8) => data
            .chunks_exact(2)
            .flat_map(|px| [px[0], px[0], px[0], px[1]])
            .collect(),
        ColorType::Gray(8) => data.iter().flat_map(|&v| [v, v, v, 255]).collect(),
        other => {
            return Err(Error::Transform(format!(
                "Unsupported GeoTIFF color type {:?}",
                other
            )))
        }
    };

    Ok(GeoRaster {
        dimensions: Dimensions::new(width as u64, height as u64),
        pixels,
        geo,
    })
}

/// Writes an RGBA8 GeoTIFF with the given georeferencing
pub fn write_geotiff<P: AsRef<Path>>(path: P, raster: &GeoRaster) -> Result<()> {
    let dims = raster.dimensions;
    if dims.is_empty() {
        return Err(Error::Transform("Raster has zero dimensions".to_string()));
    }
    if raster.pixels.len() as u64 != dims.pixel_count() * 4 {
        return Err(Error::Transform(format!(
            "Pixel buffer holds {} bytes, expected {}",
            raster.pixels.len(),
            dims.pixel_count() * 4
        )));
    }

    let writer = BufWriter::new(File::create(path)?);
    let mut encoder = TiffEncoder::new(writer)?;
    let mut image = encoder.new_image::<colortype::RGBA8>(dims.width as u32, dims.height as u32)?;

    if let Some(geo) = &raster.geo {
        let dir = image.encoder();

        if let Some((sx, sy, sz)) = geo.pixel_scale {
            let scale = [sx, sy, sz];
            dir.write_tag(Tag::ModelPixelScaleTag, scale.as_slice())?;
        }

        let tiepoints: Vec<f64> = geo
            .tiepoints
            .iter()
            .flat_map(|tp| [tp.pixel_x, tp.pixel_y, tp.pixel_z, tp.geo_x, tp.geo_y, tp.geo_z])
            .collect();
        if !tiepoints.is_empty() {
            dir.write_tag(Tag::ModelTiepointTag, tiepoints.as_slice())?;
        }

        let keys = geo.key_directory();
        dir.write_tag(Tag::GeoKeyDirectoryTag, keys.as_slice())?;

        if let Some(epsg) = geo.epsg_code {
            let citation = format!("EPSG:{}|", epsg);
            dir.write_tag(Tag::GeoAsciiParamsTag, citation.as_str())?;
        }
    }

    image.write_data(&raster.pixels)?;
    Ok(())
}
