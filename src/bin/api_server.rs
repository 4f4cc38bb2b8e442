use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use argh::FromArgs;
use log::{error, info};

use georef_service::api::create_router;
use georef_service::{
    BlobStore, EngineConfig, HttpSource, LocalStore, NativeEngine, Pipeline, PipelineConfig,
    Result, ServerConfig, StorageConfig, SupabaseStore,
};

#[derive(FromArgs)]
/// Georeferencing HTTP service
struct Args {
    /// listen address (default: 0.0.0.0:5000)
    #[argh(option)]
    bind: Option<SocketAddr>,

    /// listen port, overriding the port of --bind
    #[argh(option)]
    port: Option<u16>,

    /// publish into this directory instead of Supabase Storage
    #[argh(option)]
    local_store: Option<PathBuf>,

    /// resampling threads, 0 for all cores
    #[argh(option, default = "0")]
    threads: usize,
}

async fn serve(args: Args) -> Result<()> {
    let mut server = ServerConfig::from_env();
    if let Some(bind) = args.bind {
        server.bind = bind;
    }
    if let Some(port) = args.port {
        server.bind.set_port(port);
    }

    let pipeline_config = PipelineConfig::from_env()?;

    let store: Arc<dyn BlobStore> = match &args.local_store {
        Some(dir) => {
            info!("publishing to local directory {}", dir.display());
            Arc::new(LocalStore::new(dir))
        }
        None => {
            let storage = StorageConfig::from_env()?;
            info!("publishing to {} bucket '{}'", storage.url, storage.bucket);
            Arc::new(SupabaseStore::new(&storage)?)
        }
    };

    let pipeline = Pipeline::new(
        Arc::new(NativeEngine::new(EngineConfig {
            threads: args.threads,
            ..EngineConfig::default()
        })?),
        Arc::new(HttpSource::new(pipeline_config.download_timeout)?),
        store,
        pipeline_config,
    );

    let app = create_router(Arc::new(pipeline), &server);
    let listener = tokio::net::TcpListener::bind(server.bind).await?;

    info!("listening on http://{}", server.bind);
    info!("allowed origins: {:?}", server.cors_origins);
    info!("endpoints: POST /georef, GET /health");

    axum::serve(listener, app).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Args = argh::from_env();
    match serve(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
