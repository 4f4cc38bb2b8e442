//! Core data types shared across the pipeline

/// Represents raster dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    /// Width in pixels
    pub width: u64,
    /// Height in pixels
    pub height: u64,
}

impl Dimensions {
    /// Creates new dimensions
    pub fn new(width: u64, height: u64) -> Self {
        Self { width, height }
    }

    /// Returns the total number of pixels
    pub fn pixel_count(&self) -> u64 {
        self.width * self.height
    }

    /// Returns true if either side is zero
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Raster encodings the engine can produce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RasterFormat {
    /// GeoTIFF carrying georeferencing tags
    GeoTiff,
    /// 8-bit RGBA PNG for browser display
    Png,
}

impl RasterFormat {
    /// File extension used for objects of this format
    pub fn extension(&self) -> &'static str {
        match self {
            RasterFormat::GeoTiff => "tif",
            RasterFormat::Png => "png",
        }
    }

    /// MIME type used when uploading
    pub fn mime(&self) -> mime::Mime {
        match self {
            RasterFormat::GeoTiff => "image/tiff"
                .parse()
                .unwrap_or(mime::APPLICATION_OCTET_STREAM),
            RasterFormat::Png => mime::IMAGE_PNG,
        }
    }

    /// Parses a format name (`png`, `tif`, `tiff`, `gtiff`)
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "png" => Some(RasterFormat::Png),
            "tif" | "tiff" | "gtiff" | "geotiff" => Some(RasterFormat::GeoTiff),
            _ => None,
        }
    }
}
