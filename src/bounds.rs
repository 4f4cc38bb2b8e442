//! Geotransforms and the geographic corners of a warped raster

use crate::error::{Error, Result};
use crate::projection::Coordinate;
use crate::types::Dimensions;

/// Affine pixel-to-world parameters in GDAL order.
///
/// ```text
/// geo_x = origin_x + px * pixel_width  + py * row_rotation
/// geo_y = origin_y + px * col_rotation + py * pixel_height
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub pixel_width: f64,
    pub row_rotation: f64,
    pub origin_y: f64,
    pub col_rotation: f64,
    /// Negative for north-up rasters
    pub pixel_height: f64,
}

impl GeoTransform {
    /// North-up transform without rotation
    pub fn north_up(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            pixel_width,
            row_rotation: 0.0,
            origin_y,
            col_rotation: 0.0,
            pixel_height,
        }
    }

    pub fn from_array(gt: [f64; 6]) -> Self {
        Self {
            origin_x: gt[0],
            pixel_width: gt[1],
            row_rotation: gt[2],
            origin_y: gt[3],
            col_rotation: gt[4],
            pixel_height: gt[5],
        }
    }

    pub fn to_array(&self) -> [f64; 6] {
        [
            self.origin_x,
            self.pixel_width,
            self.row_rotation,
            self.origin_y,
            self.col_rotation,
            self.pixel_height,
        ]
    }

    /// Maps a (possibly fractional) pixel position to world coordinates
    pub fn apply(&self, px: f64, py: f64) -> Coordinate {
        Coordinate::new(
            self.origin_x + px * self.pixel_width + py * self.row_rotation,
            self.origin_y + px * self.col_rotation + py * self.pixel_height,
        )
    }

    /// Maps world coordinates back to a pixel position
    pub fn invert(&self, coord: Coordinate) -> Option<(f64, f64)> {
        let det = self.pixel_width * self.pixel_height - self.row_rotation * self.col_rotation;
        if det.abs() < 1e-15 {
            return None;
        }

        let dx = coord.x - self.origin_x;
        let dy = coord.y - self.origin_y;

        let px = (self.pixel_height * dx - self.row_rotation * dy) / det;
        let py = (-self.col_rotation * dx + self.pixel_width * dy) / det;

        Some((px, py))
    }
}

/// Four corners of a raster extent as `(lon, lat)`, ordered top-left,
/// top-right, bottom-right, bottom-left.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoBounds {
    pub top_left: Coordinate,
    pub top_right: Coordinate,
    pub bottom_right: Coordinate,
    pub bottom_left: Coordinate,
}

impl GeoBounds {
    /// Computes the corner quadrilateral of a raster.
    ///
    /// Rotation terms are ignored; warped output is axis-aligned. A zero-size
    /// raster or a zero/non-finite pixel size is reported as an error rather
    /// than collapsing to an empty box.
    pub fn from_transform(transform: &GeoTransform, dims: Dimensions) -> Result<Self> {
        if dims.is_empty() {
            return Err(Error::Transform(format!(
                "Warped raster has degenerate size {}x{}",
                dims.width, dims.height
            )));
        }

        let sizes_ok = transform.pixel_width.is_finite()
            && transform.pixel_height.is_finite()
            && transform.pixel_width != 0.0
            && transform.pixel_height != 0.0;
        if !sizes_ok || !transform.origin_x.is_finite() || !transform.origin_y.is_finite() {
            return Err(Error::Transform(format!(
                "Warped raster has an unusable geotransform {:?}",
                transform.to_array()
            )));
        }

        let top_left = Coordinate::new(transform.origin_x, transform.origin_y);
        let top_right = Coordinate::new(
            transform.origin_x + dims.width as f64 * transform.pixel_width,
            transform.origin_y,
        );
        let bottom_right = Coordinate::new(
            top_right.x,
            transform.origin_y + dims.height as f64 * transform.pixel_height,
        );
        let bottom_left = Coordinate::new(transform.origin_x, bottom_right.y);

        Ok(Self {
            top_left,
            top_right,
            bottom_right,
            bottom_left,
        })
    }

    /// Corners as `[lon, lat]` pairs in wire order
    pub fn corners(&self) -> [[f64; 2]; 4] {
        [
            [self.top_left.x, self.top_left.y],
            [self.top_right.x, self.top_right.y],
            [self.bottom_right.x, self.bottom_right.y],
            [self.bottom_left.x, self.bottom_left.y],
        ]
    }
}

impl std::fmt::Display for GeoBounds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let c = self.corners();
        write!(
            f,
            "[{}, {}] [{}, {}] [{}, {}] [{}, {}]",
            c[0][0], c[0][1], c[1][0], c[1][1], c[2][0], c[2][1], c[3][0], c[3][1]
        )
    }
}
