//! Cadence API - REST API and inbound webhooks
//!
//! This crate exposes health checks, the automation trigger, contact
//! timing queries, and the provider webhooks that feed the unified inbox.

pub mod auth;
pub mod handlers;
pub mod routes;

pub use auth::AppState;
pub use routes::create_router;
