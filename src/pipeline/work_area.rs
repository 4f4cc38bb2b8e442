//! Per-request scratch directory

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::error::Result;
use crate::types::RasterFormat;

/// Exclusively owned scratch space, removed with all contents on drop
#[derive(Debug)]
pub struct WorkArea {
    dir: TempDir,
}

impl WorkArea {
    /// Creates a fresh directory under `parent`, or the system temp dir
    pub fn create(parent: Option<&Path>) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("georef-");
        let dir = match parent {
            Some(parent) => {
                std::fs::create_dir_all(parent)?;
                builder.tempdir_in(parent)?
            }
            None => builder.tempdir()?,
        };
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Downloaded source raster, format unknown until decoded
    pub fn source_path(&self) -> PathBuf {
        self.dir.path().join("source")
    }

    /// Source raster with control points attached
    pub fn gcp_path(&self) -> PathBuf {
        self.dir.path().join("gcps.tif")
    }

    pub fn warped_path(&self) -> PathBuf {
        self.dir.path().join("warped.tif")
    }

    pub fn display_path(&self, format: RasterFormat) -> PathBuf {
        self.dir.path().join(format!("display.{}", format.extension()))
    }
}
