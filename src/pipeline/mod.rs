//! Request pipeline: acquire, attach, warp, validate, convert, publish
//!
//! Every stage runs in order inside a private [`WorkArea`]. The first
//! failure stops the run, nothing is uploaded unless the warp output has
//! passed [`integrity::check_output`], and the work area is removed when
//! the run ends either way.

pub mod integrity;
pub mod publish;
pub mod work_area;

use std::io;
use std::sync::Arc;
use std::time::Instant;

use log::{debug, info, warn};

use crate::bounds::GeoBounds;
use crate::config::PipelineConfig;
use crate::error::{Error, ErrorCategory, Result};
use crate::gcp::{order_clockwise, validate_control_points, ControlPoint};
use crate::raster::{RasterEngine, WarpOptions};
use crate::source::RasterSource;
use crate::storage::{object_path, BlobStore};

pub use publish::{publish, PublishedArtifact};
pub use work_area::WorkArea;

/// One georeferencing job
#[derive(Debug, Clone, PartialEq)]
pub struct GeorefRequest {
    /// Where to fetch the source raster from (URL or path, per source)
    pub source_ref: String,
    pub control_points: Vec<ControlPoint>,
    /// Names the published object; one live artifact per project
    pub project_id: String,
}

impl GeorefRequest {
    pub fn new(
        source_ref: impl Into<String>,
        control_points: Vec<ControlPoint>,
        project_id: impl Into<String>,
    ) -> Self {
        Self {
            source_ref: source_ref.into(),
            control_points,
            project_id: project_id.into(),
        }
    }

    /// Rejects requests that must not start any work
    pub fn validate(&self) -> Result<()> {
        if self.source_ref.trim().is_empty() {
            return Err(Error::Validation("Missing source image reference".to_string()));
        }
        validate_project_id(&self.project_id)?;
        validate_control_points(&self.control_points)
    }
}

/// Project ids become object keys, so only `[A-Za-z0-9_-]` is accepted
pub fn validate_project_id(project_id: &str) -> Result<()> {
    if project_id.is_empty() {
        return Err(Error::Validation("Missing project id".to_string()));
    }
    let valid = project_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        return Err(Error::Validation(format!(
            "Project id '{}' may only contain letters, digits, '-' and '_'",
            project_id
        )));
    }
    Ok(())
}

/// Georeferencing pipeline wired to its collaborators
pub struct Pipeline {
    engine: Arc<dyn RasterEngine>,
    source: Arc<dyn RasterSource>,
    store: Arc<dyn BlobStore>,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        engine: Arc<dyn RasterEngine>,
        source: Arc<dyn RasterSource>,
        store: Arc<dyn BlobStore>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            engine,
            source,
            store,
            config,
        }
    }

    /// Runs a request end to end and returns the published artifact
    pub async fn run(&self, request: GeorefRequest) -> Result<PublishedArtifact> {
        let started = Instant::now();
        let project_id = request.project_id.clone();

        let result = match request.validate() {
            Ok(()) => self.execute(request).await,
            Err(e) => Err(e),
        };

        match &result {
            Ok(artifact) => info!(
                "georeferenced project {} in {:.2?}: {} bounds {}",
                project_id,
                started.elapsed(),
                artifact.object_path,
                artifact.bounds
            ),
            Err(e) => warn!(
                "georeferencing project {} failed ({}): {}",
                project_id,
                e.category().as_str(),
                e.detail()
            ),
        }
        result
    }

    async fn execute(&self, request: GeorefRequest) -> Result<PublishedArtifact> {
        let GeorefRequest {
            source_ref,
            control_points,
            project_id,
        } = request;

        let points = order_clockwise(control_points);
        let area = WorkArea::create(self.config.work_dir.as_deref())?;
        debug!("work area for {} at {}", project_id, area.path().display());

        debug!("acquire: fetching source");
        let fetched = self.source.fetch(&source_ref, &area.source_path()).await?;
        debug!("acquire: {} bytes", fetched);

        debug!("attach: {} control points", points.len());
        let (source_path, gcp_path) = (area.source_path(), area.gcp_path());
        let attached = self
            .blocking("attach", move |engine| {
                engine.attach_control_points(&source_path, &points, &gcp_path)
            })
            .await?;

        let options = WarpOptions {
            target_epsg: self.config.target_epsg,
            method: self.config.method,
            resampling: self.config.resampling,
        };
        debug!("warp: {:?} into EPSG:{}", options.method, options.target_epsg);
        let warped_path = area.warped_path();
        let warped = self
            .blocking("warp", move |engine| engine.warp(&attached, &options, &warped_path))
            .await?
            .ok_or_else(|| Error::Transform("Warp produced no output".to_string()))?;

        let size = integrity::check_output(&warped.path, self.config.min_output_bytes)?;
        debug!("integrity: warp output is {} bytes", size);

        let format = self.config.publish_format;
        let display_path = area.display_path(format);
        let (info, display) = self
            .blocking("convert", move |engine| {
                let info = engine.describe(&warped)?;
                let display = engine.convert_format(&warped, format, &display_path)?;
                Ok((info, display))
            })
            .await?;

        let transform = info
            .geo_transform
            .ok_or_else(|| Error::Transform("Warped raster has no geotransform".to_string()))?;
        let bounds = GeoBounds::from_transform(&transform, info.dimensions)?;
        debug!("bounds: {}", bounds);

        let path = object_path(&self.config.object_prefix, &project_id, format);
        let content_type = format.mime();
        publish(
            self.store.as_ref(),
            &path,
            &display.path,
            content_type.as_ref(),
            self.config.signed_url_ttl,
            bounds,
        )
        .await
    }

    /// Runs an engine call on the blocking pool, reporting any failure
    /// that is not already a transform failure as one.
    async fn blocking<T, F>(&self, stage: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn RasterEngine) -> Result<T> + Send + 'static,
    {
        let engine = Arc::clone(&self.engine);
        let outcome = tokio::task::spawn_blocking(move || f(engine.as_ref()))
            .await
            .map_err(|e| Error::Io(io::Error::other(format!("{} task failed: {}", stage, e))))?;

        outcome.map_err(|e| match e.category() {
            ErrorCategory::Transform => e,
            _ => Error::Transform(format!("{} failed: {}", stage, e.detail())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounds::GeoTransform;
    use crate::config::EngineConfig;
    use crate::gcp::polar_angle;
    use crate::raster::{NativeEngine, RasterHandle, RasterInfo};
    use crate::source::{HttpSource, LocalSource};
    use crate::storage::{LocalStore, StorageError};
    use crate::types::{Dimensions, RasterFormat};
    use approx::assert_relative_eq;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Engine that writes fixed-size placeholder files
    struct StubEngine {
        warp_bytes: Option<usize>,
        calls: AtomicUsize,
        attached: Mutex<Vec<ControlPoint>>,
    }

    impl StubEngine {
        fn new(warp_bytes: Option<usize>) -> Self {
            Self {
                warp_bytes,
                calls: AtomicUsize::new(0),
                attached: Mutex::new(Vec::new()),
            }
        }
    }

    impl RasterEngine for StubEngine {
        fn attach_control_points(
            &self,
            source: &Path,
            points: &[ControlPoint],
            dest: &Path,
        ) -> Result<RasterHandle> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.attached.lock().unwrap() = points.to_vec();
            std::fs::copy(source, dest)?;
            Ok(RasterHandle::new(dest, RasterFormat::GeoTiff))
        }

        fn warp(
            &self,
            _: &RasterHandle,
            _: &WarpOptions,
            dest: &Path,
        ) -> Result<Option<RasterHandle>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.warp_bytes {
                Some(n) => {
                    std::fs::write(dest, vec![7u8; n])?;
                    Ok(Some(RasterHandle::new(dest, RasterFormat::GeoTiff)))
                }
                None => Ok(None),
            }
        }

        fn convert_format(
            &self,
            raster: &RasterHandle,
            format: RasterFormat,
            dest: &Path,
        ) -> Result<RasterHandle> {
            std::fs::copy(&raster.path, dest)?;
            Ok(RasterHandle::new(dest, format))
        }

        fn describe(&self, _: &RasterHandle) -> Result<RasterInfo> {
            Ok(RasterInfo {
                dimensions: Dimensions::new(100, 100),
                geo_transform: Some(GeoTransform::north_up(10.0, 50.0, 0.01, -0.01)),
                epsg: Some(4326),
            })
        }
    }

    /// Source that writes a fixed payload and counts fetches
    struct StubSource {
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl RasterSource for StubSource {
        async fn fetch(&self, _: &str, dest: &Path) -> Result<u64> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            tokio::fs::write(dest, b"source raster").await?;
            Ok(13)
        }
    }

    /// Store that records uploads
    #[derive(Default)]
    struct RecordingStore {
        fail_upload: bool,
        uploads: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl BlobStore for RecordingStore {
        async fn remove(&self, path: &str) -> std::result::Result<(), StorageError> {
            Err(StorageError::NotFound(path.to_string()))
        }

        async fn upload(
            &self,
            path: &str,
            _: Vec<u8>,
            content_type: &str,
        ) -> std::result::Result<(), StorageError> {
            if self.fail_upload {
                return Err(StorageError::Status { status: 503, body: "unavailable".into() });
            }
            self.uploads
                .lock()
                .unwrap()
                .push((path.to_string(), content_type.to_string()));
            Ok(())
        }

        async fn create_signed_url(
            &self,
            path: &str,
            _: Duration,
        ) -> std::result::Result<String, StorageError> {
            Ok(format!("https://storage.test/{}?token=t", path))
        }
    }

    fn corner_points() -> Vec<ControlPoint> {
        vec![
            ControlPoint::new(0.0, 0.0, 0.0, 50.0),
            ControlPoint::new(100.0, 0.0, 1.0, 50.0),
            ControlPoint::new(100.0, 100.0, 1.0, 49.0),
            ControlPoint::new(0.0, 100.0, 0.0, 49.0),
        ]
    }

    fn config_in(dir: &Path) -> PipelineConfig {
        PipelineConfig {
            work_dir: Some(dir.to_path_buf()),
            ..PipelineConfig::default()
        }
    }

    fn pipeline(
        engine: Arc<StubEngine>,
        source: Arc<dyn RasterSource>,
        store: Arc<RecordingStore>,
        config: PipelineConfig,
    ) -> Pipeline {
        Pipeline::new(engine, source, store, config)
    }

    fn stub_source() -> Arc<StubSource> {
        Arc::new(StubSource {
            fetches: AtomicUsize::new(0),
        })
    }

    fn is_empty_dir(path: &Path) -> bool {
        std::fs::read_dir(path).unwrap().next().is_none()
    }

    #[tokio::test]
    async fn test_too_few_points_rejected_before_work() {
        let work = tempfile::tempdir().unwrap();
        let engine = Arc::new(StubEngine::new(Some(4096)));
        let source = stub_source();
        let store = Arc::new(RecordingStore::default());
        let p = pipeline(engine.clone(), source.clone(), store.clone(), config_in(work.path()));

        let mut points = corner_points();
        points.pop();
        let err = p
            .run(GeorefRequest::new("https://x.test/a.png", points, "p1"))
            .await
            .unwrap_err();

        assert_eq!(err.category(), ErrorCategory::Validation);
        assert_eq!(source.fetches.load(Ordering::SeqCst), 0);
        assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
        assert!(is_empty_dir(work.path()));
    }

    #[tokio::test]
    async fn test_invalid_request_fields() {
        let work = tempfile::tempdir().unwrap();
        let p = pipeline(
            Arc::new(StubEngine::new(Some(4096))),
            stub_source(),
            Arc::new(RecordingStore::default()),
            config_in(work.path()),
        );

        let cases = [
            ("", "p1"),
            ("https://x.test/a.png", ""),
            ("https://x.test/a.png", "../p1"),
        ];
        for (source_ref, project) in cases {
            let err = p
                .run(GeorefRequest::new(source_ref, corner_points(), project))
                .await
                .unwrap_err();
            assert_eq!(err.category(), ErrorCategory::Validation);
        }
    }

    #[tokio::test]
    async fn test_points_reach_engine_ordered() {
        let work = tempfile::tempdir().unwrap();
        let engine = Arc::new(StubEngine::new(Some(4096)));
        let p = pipeline(
            engine.clone(),
            stub_source(),
            Arc::new(RecordingStore::default()),
            config_in(work.path()),
        );

        let mut points = corner_points();
        points.swap(0, 2);
        p.run(GeorefRequest::new("https://x.test/a.png", points, "p1"))
            .await
            .unwrap();

        let attached = engine.attached.lock().unwrap().clone();
        assert_eq!(attached.len(), 4);
        let angles: Vec<f64> = attached.iter().map(|pt| polar_angle(pt, 50.0, 50.0)).collect();
        assert!(angles.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn test_tiny_warp_output_is_not_published() {
        let work = tempfile::tempdir().unwrap();
        let store = Arc::new(RecordingStore::default());
        let p = pipeline(
            Arc::new(StubEngine::new(Some(200))),
            stub_source(),
            store.clone(),
            config_in(work.path()),
        );

        let err = p
            .run(GeorefRequest::new("https://x.test/a.png", corner_points(), "p1"))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Integrity(_)));
        assert!(store.uploads.lock().unwrap().is_empty());
        assert!(is_empty_dir(work.path()));
    }

    #[tokio::test]
    async fn test_missing_warp_output_is_transform_error() {
        let work = tempfile::tempdir().unwrap();
        let store = Arc::new(RecordingStore::default());
        let p = pipeline(
            Arc::new(StubEngine::new(None)),
            stub_source(),
            store.clone(),
            config_in(work.path()),
        );

        let err = p
            .run(GeorefRequest::new("https://x.test/a.png", corner_points(), "p1"))
            .await
            .unwrap_err();

        assert_eq!(err.category(), ErrorCategory::Transform);
        assert!(store.uploads.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_source_is_acquisition_error() {
        let work = tempfile::tempdir().unwrap();
        let engine = Arc::new(StubEngine::new(Some(4096)));
        let store = Arc::new(RecordingStore::default());
        let source = Arc::new(HttpSource::new(Duration::from_secs(5)).unwrap());
        let p = pipeline(engine.clone(), source, store.clone(), config_in(work.path()));

        let err = p
            .run(GeorefRequest::new("http://127.0.0.1:1/a.png", corner_points(), "p1"))
            .await
            .unwrap_err();

        assert_eq!(err.category(), ErrorCategory::Acquisition);
        assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
        assert!(store.uploads.lock().unwrap().is_empty());
        assert!(is_empty_dir(work.path()));
    }

    #[tokio::test]
    async fn test_upload_failure_is_publication_error() {
        let work = tempfile::tempdir().unwrap();
        let store = Arc::new(RecordingStore {
            fail_upload: true,
            ..RecordingStore::default()
        });
        let p = pipeline(
            Arc::new(StubEngine::new(Some(4096))),
            stub_source(),
            store,
            config_in(work.path()),
        );

        let err = p
            .run(GeorefRequest::new("https://x.test/a.png", corner_points(), "p1"))
            .await
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Publication);
    }

    #[tokio::test]
    async fn test_success_with_stub_engine() {
        let work = tempfile::tempdir().unwrap();
        let store = Arc::new(RecordingStore::default());
        let p = pipeline(
            Arc::new(StubEngine::new(Some(4096))),
            stub_source(),
            store.clone(),
            config_in(work.path()),
        );

        let artifact = p
            .run(GeorefRequest::new("https://x.test/a.png", corner_points(), "p1"))
            .await
            .unwrap();

        assert_eq!(artifact.object_path, "georef/p1.png");
        assert_eq!(artifact.signed_url, "https://storage.test/georef/p1.png?token=t");
        assert_eq!(
            artifact.bounds.corners(),
            [[10.0, 50.0], [11.0, 50.0], [11.0, 49.0], [10.0, 49.0]]
        );
        assert_eq!(
            *store.uploads.lock().unwrap(),
            vec![("georef/p1.png".to_string(), "image/png".to_string())]
        );
        assert!(is_empty_dir(work.path()));
    }

    fn write_source_png(path: &Path) {
        let image = image::RgbaImage::from_fn(100, 100, |x, y| {
            image::Rgba([(x * 2) as u8, (y * 2) as u8, 128, 255])
        });
        image.save_with_format(path, image::ImageFormat::Png).unwrap();
    }

    #[tokio::test]
    async fn test_end_to_end_native_engine() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("scan.png");
        write_source_png(&input);
        let work = dir.path().join("work");
        let store_root = dir.path().join("store");

        let p = Pipeline::new(
            Arc::new(NativeEngine::new(EngineConfig::default()).unwrap()),
            Arc::new(LocalSource),
            Arc::new(LocalStore::new(&store_root)),
            config_in(&work),
        );

        let request = GeorefRequest::new(input.to_str().unwrap(), corner_points(), "scan-1");
        let first = p.run(request.clone()).await.unwrap();

        let expected = [[0.0, 50.0], [1.0, 50.0], [1.0, 49.0], [0.0, 49.0]];
        for (corner, want) in first.bounds.corners().iter().zip(expected.iter()) {
            assert_relative_eq!(corner[0], want[0], epsilon = 0.02);
            assert_relative_eq!(corner[1], want[1], epsilon = 0.02);
        }
        assert!(first.signed_url.starts_with("file://"));

        // a second run overwrites the same object
        let second = p.run(request).await.unwrap();
        assert_eq!(first.object_path, second.object_path);
        let published: Vec<_> = std::fs::read_dir(store_root.join("georef"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(published, vec![std::ffi::OsString::from("scan-1.png")]);

        let (w, h) = image::image_dimensions(store_root.join(&first.object_path)).unwrap();
        assert!(w > 0 && h > 0);
        assert!(is_empty_dir(&work));
    }
}
