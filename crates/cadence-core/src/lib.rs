//! Cadence Core - scheduling, automation and inbox processing
//!
//! This crate holds the sending engine for Cadence: timezone-aware timing,
//! business-hours gating, sender rotation, outbound providers, the
//! automation runner, and inbound webhook normalization and threading.

pub mod automation;
pub mod inbound;
pub mod outbound;
pub mod scheduling;
pub mod template;

pub use automation::{
    AutomationRunner, AutomationWorker, CampaignPlan, DueContact, RunReport, RunRequest, RunStats,
    SkipReason, SyncReport, TimingService,
};
pub use inbound::{InboundEmail, InboundOutcome, InboxProcessor, WebhookError};
pub use outbound::{build_sender, EmailSender, OutboundEmail, ProviderError};
pub use scheduling::{
    business_hours_status, is_business_hours, next_send, pick_sender, BusinessHoursStatus,
    NextSend, SchedulingError, SendingPolicy,
};
