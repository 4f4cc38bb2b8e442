use serde::{Deserialize, Serialize};

use crate::gcp::ControlPoint;
use crate::pipeline::{GeorefRequest, PublishedArtifact};

/// Body of `POST /georef`; fields are optional so missing ones can be
/// reported as validation failures instead of extractor rejections
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeorefPayload {
    pub signed_url: Option<String>,
    pub gcps: Option<Vec<ControlPoint>>,
    pub project_id: Option<String>,
}

impl GeorefPayload {
    /// Names of required fields that are absent
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.signed_url.is_none() {
            missing.push("signedUrl");
        }
        if self.gcps.is_none() {
            missing.push("gcps");
        }
        if self.project_id.is_none() {
            missing.push("projectId");
        }
        missing
    }

    pub fn into_request(self) -> Option<GeorefRequest> {
        Some(GeorefRequest::new(
            self.signed_url?,
            self.gcps?,
            self.project_id?,
        ))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeorefResponse {
    pub signed_url: String,
    /// `[lon, lat]` corners: top-left, top-right, bottom-right, bottom-left
    pub bounds: [[f64; 2]; 4],
    pub path: String,
}

impl From<PublishedArtifact> for GeorefResponse {
    fn from(artifact: PublishedArtifact) -> Self {
        Self {
            signed_url: artifact.signed_url,
            bounds: artifact.bounds.corners(),
            path: artifact.object_path,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub detail: String,
}
