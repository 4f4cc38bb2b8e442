//! georef-service - control-point georeferencing for scanned maps and images
//!
//! A request carries a source image reference, at least four ground control
//! points and a project id. The [`Pipeline`] fetches the image, attaches the
//! points, warps it into the target CRS with a thin-plate spline, checks the
//! output, converts it to a browser-friendly format and publishes it to blob
//! storage, returning a signed URL and the geographic corners.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use georef_service::{
//!     ControlPoint, EngineConfig, GeorefRequest, LocalSource, LocalStore, NativeEngine,
//!     Pipeline, PipelineConfig,
//! };
//!
//! # async fn run() -> georef_service::Result<()> {
//! let pipeline = Pipeline::new(
//!     Arc::new(NativeEngine::new(EngineConfig::default())?),
//!     Arc::new(LocalSource),
//!     Arc::new(LocalStore::new("published")),
//!     PipelineConfig::default(),
//! );
//!
//! let points = vec![
//!     ControlPoint::new(0.0, 0.0, 0.0, 50.0),
//!     ControlPoint::new(100.0, 0.0, 1.0, 50.0),
//!     ControlPoint::new(100.0, 100.0, 1.0, 49.0),
//!     ControlPoint::new(0.0, 100.0, 0.0, 49.0),
//! ];
//! let artifact = pipeline
//!     .run(GeorefRequest::new("scan.png", points, "scan-1"))
//!     .await?;
//! println!("{} {}", artifact.signed_url, artifact.bounds);
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod bounds;
pub mod config;
pub mod error;
pub mod gcp;
pub mod pipeline;
pub mod projection;
pub mod raster;
pub mod source;
pub mod storage;
pub mod types;

pub use bounds::{GeoBounds, GeoTransform};
pub use config::{EngineConfig, PipelineConfig, ServerConfig, StorageConfig};
pub use error::{Error, ErrorCategory, Result};
pub use gcp::{order_clockwise, ControlPoint};
pub use pipeline::{GeorefRequest, Pipeline, PublishedArtifact};
pub use projection::{Coordinate, Transformer};
pub use raster::{NativeEngine, RasterEngine, Resampling, WarpMethod};
pub use source::{HttpSource, LocalSource, RasterSource};
pub use storage::{BlobStore, LocalStore, SupabaseStore};
pub use types::{Dimensions, RasterFormat};
