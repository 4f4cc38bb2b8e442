/// Represents a coordinate in any coordinate reference system
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinate {
    pub x: f64,
    pub y: f64,
}

impl Coordinate {
    /// Creates a new 2D coordinate
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Creates a coordinate from longitude/latitude in degrees (WGS84)
    pub fn from_lonlat(lon: f64, lat: f64) -> Self {
        Self::new(lon, lat)
    }
}
