//! Cadence Storage - Database access for campaigns, contacts and the inbox
//!
//! Repositories are async traits with a PostgreSQL implementation and an
//! in-memory implementation used for dry runs and tests.

pub mod db;
pub mod memory;
pub mod models;
pub mod repository;

pub use db::DatabasePool;
pub use memory::MemoryStore;
pub use models::*;
pub use repository::*;
