use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method};
use axum::{
    routing::{get, post},
    Router,
};
use log::warn;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};

use super::handlers::*;
use crate::config::ServerConfig;
use crate::pipeline::Pipeline;

const BODY_LIMIT: usize = 10 * 1024 * 1024;

pub fn create_router(pipeline: Arc<Pipeline>, config: &ServerConfig) -> Router {
    Router::new()
        .route("/georef", post(georeference))
        .route("/health", get(health))
        .layer(
            ServiceBuilder::new()
                .layer(DefaultBodyLimit::max(BODY_LIMIT))
                .layer(cors_layer(&config.cors_origins)),
        )
        .with_state(pipeline)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
}
