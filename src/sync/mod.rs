//! Remote synchronization.
//!
//! - **Gateway**: the [`RemoteGateway`] trait and its HTTP implementation
//! - **Engine**: one push-then-pull cycle ([`SyncEngine::sync_all`])
//! - **Scheduler**: when cycles run ([`SyncScheduler`])
//! - **Hashing**: SHA256 content hashing for change detection on pull
//!
//! # Example
//!
//! ```ignore
//! use tack::storage::RecordStore;
//! use tack::sync::{HttpGateway, SchedulerConfig, SyncEngine, SyncScheduler};
//!
//! let store = RecordStore::open(&db_path)?.into_shared();
//! let gateway = HttpGateway::new("https://sync.example.com", Some(token))?;
//! let engine = Arc::new(SyncEngine::new(store, gateway));
//!
//! // One-off cycle
//! let result = engine.sync_all("user_1").await;
//!
//! // Or keep syncing in the background
//! let scheduler = SyncScheduler::start(engine, "user_1", SchedulerConfig::default())?;
//! ```

mod engine;
mod gateway;
pub mod hash;
mod http;
mod scheduler;
#[cfg(test)]
pub(crate) mod testing;
mod types;

pub use engine::SyncEngine;
pub use gateway::{RemoteError, RemoteGateway, RemoteRecord};
pub use hash::{content_hash, has_changed};
pub use http::HttpGateway;
pub use scheduler::{SchedulerConfig, SchedulerStatus, SyncScheduler};
pub use types::SyncResult;
