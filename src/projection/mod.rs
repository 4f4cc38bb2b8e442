//! Coordinate reference system support

pub mod coordinate;
pub mod transformer;

pub use coordinate::Coordinate;
pub use transformer::Transformer;

/// Well-known EPSG codes
pub mod epsg {
    /// WGS 84 geographic (lon/lat degrees); the CRS control points are given in
    pub const WGS84: u16 = 4326;
    /// Web Mercator
    pub const WEB_MERCATOR: u16 = 3857;
}
