use crate::error::{Error, Result};
use crate::projection::coordinate::Coordinate;
use crate::projection::epsg;
use proj::Proj;

/// Reprojects coordinates between two EPSG-coded CRSs.
///
/// Axis order is normalised to `(x, y)` / `(lon, lat)` regardless of the
/// authority definition.
pub struct Transformer {
    proj: Proj,
    from_epsg: u16,
    to_epsg: u16,
}

impl Transformer {
    pub fn new(from_epsg: u16, to_epsg: u16) -> Result<Self> {
        let from = format!("EPSG:{}", from_epsg);
        let to = format!("EPSG:{}", to_epsg);

        let proj = Proj::new_known_crs(&from, &to, None).map_err(|e| {
            Error::Projection(format!("Failed to create projection {} -> {}: {}", from, to, e))
        })?;

        Ok(Self {
            proj,
            from_epsg,
            to_epsg,
        })
    }

    /// Transformer for control points headed into `target_epsg`.
    ///
    /// Control points are always WGS 84, so `None` means no reprojection.
    pub fn from_wgs84(target_epsg: u16) -> Result<Option<Self>> {
        if target_epsg == epsg::WGS84 {
            return Ok(None);
        }
        Self::new(epsg::WGS84, target_epsg).map(Some)
    }

    pub fn transform(&self, coord: Coordinate) -> Result<Coordinate> {
        let (x, y) = self.proj.convert((coord.x, coord.y)).map_err(|e| {
            Error::Projection(format!(
                "({}, {}) cannot be projected to EPSG:{}: {}",
                coord.x, coord.y, self.to_epsg, e
            ))
        })?;

        if !x.is_finite() || !y.is_finite() {
            return Err(Error::Projection(format!(
                "({}, {}) lies outside the domain of EPSG:{}",
                coord.x, coord.y, self.to_epsg
            )));
        }
        Ok(Coordinate::new(x, y))
    }

    /// Transforms every coordinate, failing on the first that cannot be projected
    pub fn transform_many(&self, coords: &[Coordinate]) -> Result<Vec<Coordinate>> {
        coords.iter().map(|&coord| self.transform(coord)).collect()
    }

    pub fn from_epsg(&self) -> u16 {
        self.from_epsg
    }

    pub fn to_epsg(&self) -> u16 {
        self.to_epsg
    }
}
