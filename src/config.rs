//! Process-wide configuration, built once at startup and passed down explicitly

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::projection::epsg;
use crate::raster::{Resampling, WarpMethod};
use crate::types::RasterFormat;

/// Tuning for the native raster engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Worker threads for resampling (0 lets rayon decide)
    pub threads: usize,
    /// Largest warp output the engine will allocate
    pub max_output_pixels: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            threads: 0,
            max_output_pixels: 100_000_000,
        }
    }
}

/// Per-request pipeline behaviour
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// CRS the raster is warped into
    pub target_epsg: u16,
    pub method: WarpMethod,
    pub resampling: Resampling,
    /// Warp outputs at or below this size are treated as corrupt
    pub min_output_bytes: u64,
    pub signed_url_ttl: Duration,
    pub download_timeout: Duration,
    /// Object key prefix, e.g. `georef` gives `georef/<project>.png`
    pub object_prefix: String,
    pub publish_format: RasterFormat,
    /// Parent directory for work areas (system temp dir when unset)
    pub work_dir: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_epsg: epsg::WGS84,
            method: WarpMethod::ThinPlateSpline,
            resampling: Resampling::Bilinear,
            min_output_bytes: 1024,
            signed_url_ttl: Duration::from_secs(300),
            download_timeout: Duration::from_secs(30),
            object_prefix: "georef".to_string(),
            publish_format: RasterFormat::Png,
            work_dir: None,
        }
    }
}

impl PipelineConfig {
    /// Applies `GEOREF_*` environment overrides on top of the defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(epsg) = env_parse::<u16>("GEOREF_TARGET_EPSG")? {
            config.target_epsg = epsg;
        }
        if let Some(bytes) = env_parse::<u64>("GEOREF_MIN_OUTPUT_BYTES")? {
            config.min_output_bytes = bytes;
        }
        if let Some(secs) = env_parse::<u64>("GEOREF_SIGNED_URL_TTL")? {
            config.signed_url_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse::<u64>("GEOREF_DOWNLOAD_TIMEOUT")? {
            config.download_timeout = Duration::from_secs(secs);
        }
        if let Some(prefix) = env_string("GEOREF_OBJECT_PREFIX") {
            config.object_prefix = prefix;
        }
        if let Some(name) = env_string("GEOREF_PUBLISH_FORMAT") {
            config.publish_format = RasterFormat::from_name(&name)
                .ok_or_else(|| Error::Config(format!("Unknown publish format '{}'", name)))?;
        }
        if let Some(name) = env_string("GEOREF_WARP_METHOD") {
            config.method = WarpMethod::from_name(&name)
                .ok_or_else(|| Error::Config(format!("Unknown warp method '{}'", name)))?;
        }
        if let Some(name) = env_string("GEOREF_RESAMPLING") {
            config.resampling = Resampling::from_name(&name)
                .ok_or_else(|| Error::Config(format!("Unknown resampling '{}'", name)))?;
        }
        if let Some(dir) = env_string("GEOREF_WORK_DIR") {
            config.work_dir = Some(PathBuf::from(dir));
        }

        Ok(config)
    }
}

/// Credentials and bucket for Supabase Storage
#[derive(Clone)]
pub struct StorageConfig {
    pub url: String,
    pub service_key: String,
    pub bucket: String,
}

impl StorageConfig {
    /// Reads `SUPABASE_URL`, `SUPABASE_SERVICE_ROLE_KEY` and `SUPABASE_BUCKET`
    pub fn from_env() -> Result<Self> {
        let url = env_string("SUPABASE_URL");
        let service_key = env_string("SUPABASE_SERVICE_ROLE_KEY");

        match (url, service_key) {
            (Some(url), Some(service_key)) => Ok(Self {
                url: url.trim_end_matches('/').to_string(),
                service_key,
                bucket: env_string("SUPABASE_BUCKET").unwrap_or_else(|| "rasters".to_string()),
            }),
            _ => Err(Error::Config(
                "Missing SUPABASE_URL or SUPABASE_SERVICE_ROLE_KEY".to_string(),
            )),
        }
    }
}

impl std::fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageConfig")
            .field("url", &self.url)
            .field("service_key", &"<redacted>")
            .field("bucket", &self.bucket)
            .finish()
    }
}

/// HTTP listener settings
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    /// Allowed CORS origins; empty means permissive
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 5000)),
            cors_origins: vec!["http://localhost:3000".to_string()],
        }
    }
}

impl ServerConfig {
    /// Reads `CORS_ORIGINS` (comma separated) over the defaults
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(origins) = env::var("CORS_ORIGINS") {
            config.cors_origins = parse_origins(&origins);
        }
        config
    }
}

/// Splits a comma separated origin list, dropping blanks
pub fn parse_origins(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn env_string(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match env_string(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::Config(format!("Invalid value for {}: '{}'", key, raw))),
        None => Ok(None),
    }
}
