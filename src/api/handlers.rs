use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};

use super::models::*;
use crate::error::{Error, ErrorCategory};
use crate::pipeline::Pipeline;

type ApiError = (StatusCode, Json<ErrorResponse>);

fn status_for(category: ErrorCategory) -> StatusCode {
    match category {
        ErrorCategory::Validation => StatusCode::BAD_REQUEST,
        ErrorCategory::Acquisition | ErrorCategory::Publication => StatusCode::BAD_GATEWAY,
        ErrorCategory::Transform | ErrorCategory::Integrity | ErrorCategory::Internal => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn error_response(err: &Error) -> ApiError {
    let category = err.category();
    (
        status_for(category),
        Json(ErrorResponse {
            error: category.as_str().to_string(),
            detail: err.detail(),
        }),
    )
}

pub async fn georeference(
    State(pipeline): State<Arc<Pipeline>>,
    payload: Result<Json<GeorefPayload>, JsonRejection>,
) -> Result<Json<GeorefResponse>, ApiError> {
    let Json(payload) = payload.map_err(|rejection| {
        error_response(&Error::Validation(format!(
            "Malformed request body: {}",
            rejection.body_text()
        )))
    })?;

    let missing = payload.missing_fields();
    let request = payload.into_request().ok_or_else(|| {
        error_response(&Error::Validation(format!(
            "Missing fields: {}",
            missing.join(", ")
        )))
    })?;

    match pipeline.run(request).await {
        Ok(artifact) => Ok(Json(artifact.into())),
        Err(e) => Err(error_response(&e)),
    }
}

pub async fn health() -> &'static str {
    "ok"
}
