//! Output sizing and resampling for control-point warps

use glam::DVec2;
use rayon::prelude::*;

use super::tps::{AffineModel, PointTransform, ThinPlateSpline};
use super::{Resampling, WarpMethod};
use crate::bounds::GeoTransform;
use crate::error::{Error, Result};
use crate::types::Dimensions;

/// Samples taken along each source edge when estimating the output extent
const EDGE_SAMPLES: usize = 20;

/// Forward (pixel to target) and inverse (target to pixel) transforms
pub struct TransformPair {
    pub forward: Box<dyn PointTransform>,
    pub inverse: Box<dyn PointTransform>,
}

/// Fits both directions of the control-point transform
pub fn fit_transforms(
    pixels: &[DVec2],
    targets: &[DVec2],
    method: WarpMethod,
) -> Result<TransformPair> {
    let singular = || {
        Error::Transform(format!(
            "Control points are degenerate (coincident or collinear); cannot fit {:?} transform",
            method
        ))
    };

    match method {
        WarpMethod::ThinPlateSpline => Ok(TransformPair {
            forward: Box::new(ThinPlateSpline::fit(pixels, targets).ok_or_else(singular)?),
            inverse: Box::new(ThinPlateSpline::fit(targets, pixels).ok_or_else(singular)?),
        }),
        WarpMethod::Affine => Ok(TransformPair {
            forward: Box::new(AffineModel::fit(pixels, targets).ok_or_else(singular)?),
            inverse: Box::new(AffineModel::fit(targets, pixels).ok_or_else(singular)?),
        }),
    }
}

/// Size and georeferencing of a warp output
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WarpPlan {
    pub transform: GeoTransform,
    pub dimensions: Dimensions,
}

/// Picks a north-up output grid covering the transformed source.
///
/// The extent comes from forward-transforming points along the source
/// border. Pixels are square and sized so the output diagonal spans as many
/// pixels as the source diagonal.
pub fn plan_output(
    forward: &dyn PointTransform,
    source: Dimensions,
    max_pixels: u64,
) -> Result<WarpPlan> {
    if source.is_empty() {
        return Err(Error::Transform("Source raster is empty".to_string()));
    }

    let w = source.width as f64;
    let h = source.height as f64;

    let mut min = DVec2::splat(f64::INFINITY);
    let mut max = DVec2::splat(f64::NEG_INFINITY);
    for i in 0..=EDGE_SAMPLES {
        let t = i as f64 / EDGE_SAMPLES as f64;
        for p in [
            DVec2::new(t * w, 0.0),
            DVec2::new(t * w, h),
            DVec2::new(0.0, t * h),
            DVec2::new(w, t * h),
        ] {
            let q = forward.transform(p);
            if q.is_finite() {
                min = min.min(q);
                max = max.max(q);
            }
        }
    }

    let extent = max - min;
    let diagonal = extent.length();
    if !diagonal.is_finite() || diagonal <= 0.0 {
        return Err(Error::Transform("Warp output extent is empty".to_string()));
    }

    let resolution = diagonal / (w * w + h * h).sqrt();
    let width = ((extent.x / resolution + 0.5) as u64).max(1);
    let height = ((extent.y / resolution + 0.5) as u64).max(1);
    let dimensions = Dimensions::new(width, height);

    if dimensions.pixel_count() > max_pixels {
        return Err(Error::Transform(format!(
            "Warp output of {}x{} exceeds the {} pixel limit",
            width, height, max_pixels
        )));
    }

    Ok(WarpPlan {
        transform: GeoTransform::north_up(min.x, max.y, resolution, -resolution),
        dimensions,
    })
}

/// Fills the output grid by inverse-mapping each pixel centre into the
/// RGBA8 source. Pixels that land outside the source stay transparent.
pub fn resample(
    source: &[u8],
    source_dims: Dimensions,
    inverse: &dyn PointTransform,
    plan: &WarpPlan,
    resampling: Resampling,
) -> Vec<u8> {
    let out_w = plan.dimensions.width as usize;
    let out_h = plan.dimensions.height as usize;
    let mut output = vec![0u8; out_w * out_h * 4];

    output
        .par_chunks_mut(out_w * 4)
        .enumerate()
        .for_each(|(row, line)| {
            for col in 0..out_w {
                let world = plan.transform.apply(col as f64 + 0.5, row as f64 + 0.5);
                let p = inverse.transform(DVec2::new(world.x, world.y));
                let pixel = match resampling {
                    Resampling::Nearest => sample_nearest(source, source_dims, p),
                    Resampling::Bilinear => sample_bilinear(source, source_dims, p),
                };
                if let Some(rgba) = pixel {
                    line[col * 4..col * 4 + 4].copy_from_slice(&rgba);
                }
            }
        });

    output
}

#[inline]
fn inside(dims: Dimensions, p: DVec2) -> bool {
    p.is_finite() && p.x >= 0.0 && p.y >= 0.0 && p.x < dims.width as f64 && p.y < dims.height as f64
}

#[inline]
fn fetch(source: &[u8], dims: Dimensions, x: usize, y: usize) -> [f64; 4] {
    let i = (y * dims.width as usize + x) * 4;
    [
        source[i] as f64,
        source[i + 1] as f64,
        source[i + 2] as f64,
        source[i + 3] as f64,
    ]
}

fn sample_nearest(source: &[u8], dims: Dimensions, p: DVec2) -> Option<[u8; 4]> {
    if !inside(dims, p) {
        return None;
    }
    let px = fetch(source, dims, p.x as usize, p.y as usize);
    Some(px.map(|v| v as u8))
}

fn sample_bilinear(source: &[u8], dims: Dimensions, p: DVec2) -> Option<[u8; 4]> {
    if !inside(dims, p) {
        return None;
    }

    // shift from corner-based to centre-based pixel coordinates
    let fx = p.x - 0.5;
    let fy = p.y - 0.5;
    let x0 = fx.floor();
    let y0 = fy.floor();
    let tx = fx - x0;
    let ty = fy - y0;

    let max_x = dims.width as i64 - 1;
    let max_y = dims.height as i64 - 1;
    let clamp_x = |v: i64| v.clamp(0, max_x) as usize;
    let clamp_y = |v: i64| v.clamp(0, max_y) as usize;
    let (x0, y0) = (x0 as i64, y0 as i64);

    let p00 = fetch(source, dims, clamp_x(x0), clamp_y(y0));
    let p10 = fetch(source, dims, clamp_x(x0 + 1), clamp_y(y0));
    let p01 = fetch(source, dims, clamp_x(x0), clamp_y(y0 + 1));
    let p11 = fetch(source, dims, clamp_x(x0 + 1), clamp_y(y0 + 1));

    let mut out = [0u8; 4];
    for c in 0..4 {
        let top = p00[c] * (1.0 - tx) + p10[c] * tx;
        let bottom = p01[c] * (1.0 - tx) + p11[c] * tx;
        out[c] = (top * (1.0 - ty) + bottom * ty).round().clamp(0.0, 255.0) as u8;
    }
    Some(out)
}
