//! Video generation handler.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use vgen_models::{GeneratedArtifact, GenerationRequest, GenerationResult};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Successful generation response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateVideoResponse {
    /// Path under the public mount, e.g. `/videos/video_640x360_...mp4`
    pub video_url: String,
    pub file_name: String,
    pub expires_at: DateTime<Utc>,
    pub size_bytes: u64,
}

impl From<GeneratedArtifact> for GenerateVideoResponse {
    fn from(artifact: GeneratedArtifact) -> Self {
        Self {
            video_url: artifact.public_url,
            file_name: artifact.file_name,
            expires_at: artifact.expires_at,
            size_bytes: artifact.size_bytes,
        }
    }
}

/// Render one placeholder video and return its URL.
pub async fn generate_video(
    State(state): State<AppState>,
    payload: Result<Json<GenerationRequest>, JsonRejection>,
) -> ApiResult<Json<GenerateVideoResponse>> {
    let Json(request) = payload?;
    let request = request.validate_with(&state.limits)?;

    debug!(
        width = request.width(),
        height = request.height(),
        duration_secs = request.duration_secs(),
        format = %request.format(),
        audio = request.audio_enabled(),
        "Generating video"
    );

    match state.renderer.generate(&request).await {
        GenerationResult::Success(artifact) => Ok(Json(artifact.into())),
        GenerationResult::Failure(failure) => Err(ApiError::Generation(failure)),
    }
}
