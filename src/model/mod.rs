//! Data models for tack.
//!
//! This module contains the record domain model:
//! - Record (envelope + sync bookkeeping)
//! - RecordFields (the synchronized content)
//! - RecordPayload (kind-indexed: note, reminder, task)

pub mod record;

pub use record::{
    AlarmConfig, DismissMethod, ExecutionPolicy, ListFilter, Record, RecordFields, RecordKind,
    RecordPatch, RecordPayload, RecordStatus, SnoozeState, SyncStatus, TaskSpec, TimeTrigger,
};
