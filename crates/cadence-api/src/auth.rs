//! Authentication module

use argon2::{Argon2, PasswordHash, PasswordVerifier};
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use cadence_common::Config;
use cadence_core::{AutomationRunner, EmailSender, InboxProcessor, TimingService};
use cadence_storage::{DatabasePool, Repositories};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, warn};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Present when backed by Postgres; used by readiness checks
    pub db_pool: Option<DatabasePool>,
    pub runner: Arc<AutomationRunner>,
    pub timings: Arc<TimingService>,
    pub inbox: Arc<InboxProcessor>,
}

impl AppState {
    pub fn new(
        config: Config,
        repos: Repositories,
        email_sender: Arc<dyn EmailSender>,
        db_pool: Option<DatabasePool>,
    ) -> Self {
        let runner = AutomationRunner::new(repos.clone(), email_sender, &config);
        let timings = TimingService::new(repos.clone(), config.scheduling.clone());
        let inbox = InboxProcessor::new(repos);

        Self {
            config: Arc::new(config),
            db_pool,
            runner: Arc::new(runner),
            timings: Arc::new(timings),
            inbox: Arc::new(inbox),
        }
    }
}

/// Extract API key from request
pub fn extract_api_key(req: &Request) -> Option<&str> {
    // Check Authorization header
    if let Some(auth) = req.headers().get("authorization") {
        if let Ok(auth_str) = auth.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                return Some(token.trim());
            }
        }
    }

    // Check X-API-Key header
    if let Some(key) = req.headers().get("x-api-key") {
        if let Ok(key_str) = key.to_str() {
            return Some(key_str.trim());
        }
    }

    None
}

/// Hash an API key for comparison
pub fn hash_api_key(api_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(api_key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Verify an API key against a configured hash, either Argon2 (`$argon2...`)
/// or SHA-256 hex.
fn verify_api_key(api_key: &str, stored_hash: &str) -> bool {
    if stored_hash.starts_with("$argon2") {
        return PasswordHash::new(stored_hash)
            .ok()
            .and_then(|parsed_hash| {
                Argon2::default()
                    .verify_password(api_key.as_bytes(), &parsed_hash)
                    .ok()
            })
            .is_some();
    }

    hash_api_key(api_key).eq_ignore_ascii_case(stored_hash.trim())
}

/// Authentication middleware for `/api/v1`
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let api_key = extract_api_key(&request).ok_or_else(|| {
        warn!("Missing API key in request to {}", request.uri().path());
        StatusCode::UNAUTHORIZED
    })?;

    let hashes = &state.config.api.api_key_hashes;
    if hashes.is_empty() {
        warn!("No API keys configured, rejecting request");
        return Err(StatusCode::UNAUTHORIZED);
    }

    if !hashes.iter().any(|hash| verify_api_key(api_key, hash)) {
        warn!("API key rejected for {}", request.uri().path());
        return Err(StatusCode::UNAUTHORIZED);
    }

    debug!("API key accepted for {}", request.uri().path());
    Ok(next.run(request).await)
}
