//! Raster engine capability interface and the built-in native engine
//!
//! The pipeline only talks to [`RasterEngine`]. [`NativeEngine`] implements it
//! in-process on top of the `image` and `tiff` crates; any other geospatial
//! backend can be substituted behind the same trait.

pub mod geotiff;
pub mod native;
pub mod tps;
pub mod warp;

use std::path::{Path, PathBuf};

use crate::bounds::GeoTransform;
use crate::error::Result;
use crate::gcp::ControlPoint;
use crate::types::{Dimensions, RasterFormat};

pub use native::NativeEngine;

/// A raster file produced by an engine stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterHandle {
    pub path: PathBuf,
    pub format: RasterFormat,
}

impl RasterHandle {
    pub fn new<P: Into<PathBuf>>(path: P, format: RasterFormat) -> Self {
        Self {
            path: path.into(),
            format,
        }
    }
}

/// Spatial metadata exposed for any raster handle
#[derive(Debug, Clone, PartialEq)]
pub struct RasterInfo {
    pub dimensions: Dimensions,
    /// None for rasters referenced only by control points
    pub geo_transform: Option<GeoTransform>,
    pub epsg: Option<u16>,
}

/// Control-point transform used to fit the warp
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarpMethod {
    /// Thin-plate spline through every control point
    ThinPlateSpline,
    /// Least-squares first-order polynomial
    Affine,
}

impl WarpMethod {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "tps" | "thin-plate-spline" | "thinplatespline" => Some(WarpMethod::ThinPlateSpline),
            "affine" | "polynomial" | "order1" => Some(WarpMethod::Affine),
            _ => None,
        }
    }
}

/// Resampling kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resampling {
    Nearest,
    Bilinear,
}

impl Resampling {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "nearest" | "near" => Some(Resampling::Nearest),
            "bilinear" => Some(Resampling::Bilinear),
            _ => None,
        }
    }
}

/// Parameters of a warp into a target CRS
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WarpOptions {
    pub target_epsg: u16,
    pub method: WarpMethod,
    pub resampling: Resampling,
}

/// Operations the pipeline needs from a raster engine.
///
/// All calls block; the pipeline runs them off the async executor.
pub trait RasterEngine: Send + Sync {
    /// Binds control points (EPSG:4326, elevation 0) to the source raster
    /// and writes the intermediate raster to `dest`.
    fn attach_control_points(
        &self,
        source: &Path,
        points: &[ControlPoint],
        dest: &Path,
    ) -> Result<RasterHandle>;

    /// Resamples a control-point raster into the target CRS.
    ///
    /// `Ok(None)` means the engine ran but produced no output.
    fn warp(
        &self,
        raster: &RasterHandle,
        options: &WarpOptions,
        dest: &Path,
    ) -> Result<Option<RasterHandle>>;

    /// Re-encodes a warped raster without touching its geometry
    fn convert_format(
        &self,
        raster: &RasterHandle,
        format: RasterFormat,
        dest: &Path,
    ) -> Result<RasterHandle>;

    /// Reads dimensions and spatial reference of a raster
    fn describe(&self, raster: &RasterHandle) -> Result<RasterInfo>;
}
