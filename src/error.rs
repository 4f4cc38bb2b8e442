//! Error types for the georeferencing service

use std::io;

/// Result type for georef-service operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while georeferencing and publishing a raster
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Request rejected before any work began
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Source raster could not be retrieved
    #[error("Acquisition failed: {0}")]
    Acquisition(String),

    /// Raster engine could not open, attach or warp
    #[error("Transform failed: {0}")]
    Transform(String),

    /// Warp output exists but failed the minimum-integrity check
    #[error("Integrity check failed: {0}")]
    Integrity(String),

    /// Upload or signed-URL creation failed
    #[error("Publication failed: {0}")]
    Publication(String),

    /// Projection error
    #[error("Projection error: {0}")]
    Projection(String),

    /// Invalid or missing configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Image decoding or encoding error
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// TIFF decoding or encoding error
    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),
}

/// Failure category reported to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    Acquisition,
    Transform,
    Integrity,
    Publication,
    Internal,
}

impl ErrorCategory {
    /// Returns the wire name of this category
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Validation => "validation",
            ErrorCategory::Acquisition => "acquisition",
            ErrorCategory::Transform => "transform",
            ErrorCategory::Integrity => "integrity",
            ErrorCategory::Publication => "publication",
            ErrorCategory::Internal => "internal",
        }
    }
}

impl Error {
    /// Returns the category this error is reported under
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Validation(_) => ErrorCategory::Validation,
            Error::Acquisition(_) => ErrorCategory::Acquisition,
            Error::Transform(_)
            | Error::Projection(_)
            | Error::Image(_)
            | Error::Tiff(_) => ErrorCategory::Transform,
            Error::Integrity(_) => ErrorCategory::Integrity,
            Error::Publication(_) => ErrorCategory::Publication,
            Error::Config(_) | Error::Io(_) => ErrorCategory::Internal,
        }
    }

    /// Human-readable detail without the category prefix
    pub fn detail(&self) -> String {
        match self {
            Error::Validation(msg)
            | Error::Acquisition(msg)
            | Error::Transform(msg)
            | Error::Integrity(msg)
            | Error::Publication(msg)
            | Error::Projection(msg)
            | Error::Config(msg) => msg.clone(),
            Error::Io(e) => e.to_string(),
            Error::Image(e) => e.to_string(),
            Error::Tiff(e) => e.to_string(),
        }
    }
}
