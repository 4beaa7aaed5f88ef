//! Automation trigger

use axum::{body::Bytes, extract::State, Json};
use cadence_core::{RunReport, RunRequest};
use std::sync::Arc;
use tracing::info;

use super::ApiError;
use crate::auth::AppState;

/// Run one automation pass. The body is optional; an empty body runs every
/// active campaign.
pub async fn run_automation(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<RunReport>, ApiError> {
    let mut request = if body.iter().all(u8::is_ascii_whitespace) {
        RunRequest::default()
    } else {
        serde_json::from_slice::<RunRequest>(&body)
            .map_err(|e| ApiError::bad_request(format!("Invalid run request: {}", e)))?
    };
    request.test_mode |= state.config.automation.test_mode;

    info!(
        "Automation run requested (campaign: {:?}, test mode: {})",
        request.campaign_id, request.test_mode
    );

    let report = state.runner.run(request).await?;
    Ok(Json(report))
}
