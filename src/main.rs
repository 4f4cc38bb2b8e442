use std::fs::File;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use argh::FromArgs;
use log::error;

use georef_service::gcp::read_control_points_csv;
use georef_service::{
    EngineConfig, GeorefRequest, LocalSource, LocalStore, NativeEngine, Pipeline, PipelineConfig,
    RasterFormat, Result,
};

#[derive(FromArgs)]
/// Georeference a local image with control points from a CSV file
struct Args {
    /// source image (PNG, JPEG or TIFF)
    #[argh(option, short = 'i')]
    image: PathBuf,

    /// CSV of control points with header px,py,lon,lat
    #[argh(option, short = 'g')]
    gcps: PathBuf,

    /// project id naming the output
    #[argh(option, short = 'p')]
    project: String,

    /// output directory (default: ./georef-out)
    #[argh(option, short = 'o', default = "PathBuf::from(\"georef-out\")")]
    out: PathBuf,

    /// target EPSG code (default: 4326)
    #[argh(option)]
    target_epsg: Option<u16>,

    /// output format: png or tif (default: png)
    #[argh(option)]
    format: Option<String>,

    /// resampling threads, 0 for all cores
    #[argh(option, default = "0")]
    threads: usize,
}

async fn run(args: Args) -> Result<()> {
    let points = read_control_points_csv(File::open(&args.gcps)?)?;

    let mut config = PipelineConfig::from_env()?;
    if let Some(epsg) = args.target_epsg {
        config.target_epsg = epsg;
    }
    if let Some(name) = &args.format {
        config.publish_format = RasterFormat::from_name(name).ok_or_else(|| {
            georef_service::Error::Config(format!("Unknown output format '{}'", name))
        })?;
    }

    let engine = NativeEngine::new(EngineConfig {
        threads: args.threads,
        ..EngineConfig::default()
    })?;
    let pipeline = Pipeline::new(
        Arc::new(engine),
        Arc::new(LocalSource),
        Arc::new(LocalStore::new(&args.out)),
        config,
    );

    let source = args.image.to_string_lossy().into_owned();
    let artifact = pipeline
        .run(GeorefRequest::new(source, points, args.project))
        .await?;

    println!("{}", artifact.signed_url);
    println!("bounds: {}", artifact.bounds);
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Args = argh::from_env();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{} error: {}", e.category().as_str(), e.detail());
            ExitCode::FAILURE
        }
    }
}
