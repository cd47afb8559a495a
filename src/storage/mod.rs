//! SQLite storage layer for tack.
//!
//! This module provides the persistence layer using SQLite with:
//! - WAL mode for concurrent reads
//! - Transaction discipline for atomic writes
//! - Change notifications published after commit
//! - Additive, idempotent migrations
//!
//! # Submodules
//!
//! - [`events`] - Change bus and notifications
//! - [`migrations`] - Column migrations for older databases
//! - [`schema`] - Database schema definitions
//! - [`store`] - Record store implementation

pub mod events;
pub mod migrations;
pub mod schema;
pub mod store;

pub use events::{ChangeBus, ChangeEvent, ChangeKind, ChangeOrigin, Subscription};
pub use store::{lock_store, MutationContext, RecordStore, SharedStore, StoreGuard};
