//! Contact timing handlers

use axum::{
    extract::{Path, State},
    Json,
};
use cadence_common::types::{CampaignId, ContactId};
use cadence_core::{DueContact, NextSend, SyncReport};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

use super::ApiError;
use crate::auth::AppState;

/// Due contacts response
#[derive(Debug, Serialize)]
pub struct DueContactsResponse {
    pub campaign_id: CampaignId,
    pub total: usize,
    pub data: Vec<DueContact>,
}

/// Next send response; `next_send` is null once the sequence is over
#[derive(Debug, Serialize)]
pub struct NextSendResponse {
    pub contact_id: ContactId,
    pub next_send: Option<NextSend>,
}

/// List contacts whose next step is due now
pub async fn due_contacts(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<CampaignId>,
) -> Result<Json<DueContactsResponse>, ApiError> {
    let data = state.timings.due_contacts(campaign_id, Utc::now()).await?;
    Ok(Json(DueContactsResponse {
        campaign_id,
        total: data.len(),
        data,
    }))
}

/// Next send for one contact
pub async fn next_send(
    State(state): State<Arc<AppState>>,
    Path((campaign_id, contact_id)): Path<(CampaignId, ContactId)>,
) -> Result<Json<NextSendResponse>, ApiError> {
    let next_send = state
        .timings
        .next_send_for(campaign_id, contact_id, Utc::now())
        .await?;
    Ok(Json(NextSendResponse {
        contact_id,
        next_send,
    }))
}

/// Recompute stored `next_email_due` values
pub async fn sync_timings(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<CampaignId>,
) -> Result<Json<SyncReport>, ApiError> {
    let report = state.timings.sync_timings(campaign_id, Utc::now()).await?;
    Ok(Json(report))
}
