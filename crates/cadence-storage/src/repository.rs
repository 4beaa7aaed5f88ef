//! Repository layer for data access

pub mod activity;
pub mod campaigns;
pub mod contacts;
pub mod inbox;
pub mod senders;

use crate::db::DatabasePool;
use crate::memory::MemoryStore;
use std::sync::Arc;

pub use activity::{ActivityRepository, DbActivityRepository};
pub use campaigns::{CampaignRepository, DbCampaignRepository};
pub use contacts::{ContactRepository, DbContactRepository};
pub use inbox::{DbInboxRepository, InboxRepository};
pub use senders::{DbSenderRepository, SenderRepository};

/// All repositories behind trait objects, shared by the runner and the API
#[derive(Clone)]
pub struct Repositories {
    pub campaigns: Arc<dyn CampaignRepository>,
    pub contacts: Arc<dyn ContactRepository>,
    pub senders: Arc<dyn SenderRepository>,
    pub activity: Arc<dyn ActivityRepository>,
    pub inbox: Arc<dyn InboxRepository>,
}

impl Repositories {
    /// Postgres-backed repositories
    pub fn postgres(pool: DatabasePool) -> Self {
        Self {
            campaigns: Arc::new(DbCampaignRepository::new(pool.clone())),
            contacts: Arc::new(DbContactRepository::new(pool.clone())),
            senders: Arc::new(DbSenderRepository::new(pool.clone())),
            activity: Arc::new(DbActivityRepository::new(pool.clone())),
            inbox: Arc::new(DbInboxRepository::new(pool)),
        }
    }

    /// Repositories over a single in-memory store
    pub fn in_memory(store: Arc<MemoryStore>) -> Self {
        Self {
            campaigns: store.clone(),
            contacts: store.clone(),
            senders: store.clone(),
            activity: store.clone(),
            inbox: store,
        }
    }
}
