//! In-process raster engine

use std::fs;
use std::path::Path;

use glam::DVec2;
use log::debug;

use super::geotiff::{self, GeoInfo, GeoRaster};
use super::warp::{fit_transforms, plan_output, resample};
use super::{RasterEngine, RasterHandle, RasterInfo, WarpOptions};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::gcp::ControlPoint;
use crate::projection::{epsg, Coordinate, Transformer};
use crate::types::{Dimensions, RasterFormat};

/// Raster engine built on `image`, `tiff` and a dedicated rayon pool
pub struct NativeEngine {
    config: EngineConfig,
    pool: rayon::ThreadPool,
}

impl NativeEngine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.threads)
            .thread_name(|i| format!("georef-warp-{}", i))
            .build()
            .map_err(|e| Error::Config(format!("Failed to build warp thread pool: {}", e)))?;

        Ok(Self { config, pool })
    }

    /// Projects control point coordinates from EPSG:4326 into the target CRS
    fn target_coordinates(points: &[ControlPoint], target_epsg: u16) -> Result<Vec<DVec2>> {
        let Some(transformer) = Transformer::from_wgs84(target_epsg)? else {
            return Ok(points.iter().map(|p| DVec2::new(p.lon, p.lat)).collect());
        };

        let coords: Vec<Coordinate> = points
            .iter()
            .map(|p| Coordinate::from_lonlat(p.lon, p.lat))
            .collect();

        Ok(transformer
            .transform_many(&coords)?
            .into_iter()
            .map(|c| DVec2::new(c.x, c.y))
            .collect())
    }
}

impl RasterEngine for NativeEngine {
    fn attach_control_points(
        &self,
        source: &Path,
        points: &[ControlPoint],
        dest: &Path,
    ) -> Result<RasterHandle> {
        let image = image::ImageReader::open(source)?
            .with_guessed_format()?
            .decode()
            .map_err(|e| Error::Transform(format!("Failed to open source image: {}", e)))?
            .to_rgba8();

        let (width, height) = image.dimensions();
        debug!("attaching {} GCPs to {}x{} source", points.len(), width, height);

        let raster = GeoRaster {
            dimensions: Dimensions::new(width as u64, height as u64),
            pixels: image.into_raw(),
            geo: Some(GeoInfo::from_control_points(points, epsg::WGS84)),
        };
        geotiff::write_geotiff(dest, &raster)?;

        Ok(RasterHandle::new(dest, RasterFormat::GeoTiff))
    }

    fn warp(
        &self,
        raster: &RasterHandle,
        options: &WarpOptions,
        dest: &Path,
    ) -> Result<Option<RasterHandle>> {
        let source = geotiff::read_geotiff(&raster.path)?;
        let geo = match source.geo {
            Some(ref geo) if geo.is_gcp_referenced() => geo,
            _ => {
                return Err(Error::Transform(
                    "Raster carries no control points to warp with".to_string(),
                ))
            }
        };

        let points = geo.control_points();
        let gcp_epsg = geo.epsg_code.unwrap_or(epsg::WGS84);
        if gcp_epsg != epsg::WGS84 {
            return Err(Error::Transform(format!(
                "Control points must be in EPSG:4326, found EPSG:{}",
                gcp_epsg
            )));
        }

        let pixels: Vec<DVec2> = points.iter().map(|p| DVec2::new(p.px, p.py)).collect();
        let targets = Self::target_coordinates(&points, options.target_epsg)?;
        let transforms = fit_transforms(&pixels, &targets, options.method)?;

        let plan = plan_output(
            transforms.forward.as_ref(),
            source.dimensions,
            self.config.max_output_pixels,
        )?;
        debug!(
            "warping {}x{} -> {}x{} ({:?}, {:?})",
            source.dimensions.width,
            source.dimensions.height,
            plan.dimensions.width,
            plan.dimensions.height,
            options.method,
            options.resampling
        );

        let output = self.pool.install(|| {
            resample(
                &source.pixels,
                source.dimensions,
                transforms.inverse.as_ref(),
                &plan,
                options.resampling,
            )
        });

        if output.iter().skip(3).step_by(4).all(|&alpha| alpha == 0) {
            debug!("warp produced no opaque pixels");
            return Ok(None);
        }

        let warped = GeoRaster {
            dimensions: plan.dimensions,
            pixels: output,
            geo: Some(GeoInfo::from_transform(&plan.transform, options.target_epsg)),
        };
        geotiff::write_geotiff(dest, &warped)?;

        Ok(Some(RasterHandle::new(dest, RasterFormat::GeoTiff)))
    }

    fn convert_format(
        &self,
        raster: &RasterHandle,
        format: RasterFormat,
        dest: &Path,
    ) -> Result<RasterHandle> {
        match format {
            RasterFormat::GeoTiff => {
                fs::copy(&raster.path, dest)?;
            }
            RasterFormat::Png => {
                let warped = geotiff::read_geotiff(&raster.path)?;
                let image = image::RgbaImage::from_raw(
                    warped.dimensions.width as u32,
                    warped.dimensions.height as u32,
                    warped.pixels,
                )
                .ok_or_else(|| {
                    Error::Transform("Warped pixel buffer has the wrong size".to_string())
                })?;
                image.save_with_format(dest, image::ImageFormat::Png)?;
            }
        }

        Ok(RasterHandle::new(dest, format))
    }

    fn describe(&self, raster: &RasterHandle) -> Result<RasterInfo> {
        match raster.format {
            RasterFormat::GeoTiff => {
                let (dimensions, geo) = geotiff::read_geo_info(&raster.path)?;
                Ok(RasterInfo {
                    dimensions,
                    geo_transform: geo.as_ref().and_then(|g| g.affine_transform()),
                    epsg: geo.and_then(|g| g.epsg_code),
                })
            }
            RasterFormat::Png => {
                let (width, height) = image::image_dimensions(&raster.path)?;
                Ok(RasterInfo {
                    dimensions: Dimensions::new(width as u64, height as u64),
                    geo_transform: None,
                    epsg: None,
                })
            }
        }
    }
}
