//! SQLite record store.
//!
//! Durable CRUD over records for one owner at a time. Every mutating call
//! goes through [`RecordStore::mutate`], which runs the write in an
//! IMMEDIATE transaction, commits, and only then fans the collected change
//! events out on the store's [`ChangeBus`]. Observers therefore never hear
//! about a write that did not persist.
//!
//! A store behind a [`SharedStore`] holds its events until the
//! [`StoreGuard`] is dropped, so listeners run with the store unlocked and
//! may query it again.
//!
//! The store never retries: storage failures surface as
//! [`Error::Database`] and retry policy belongs to callers.

use std::ops::{Deref, DerefMut};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Transaction};
use tracing::debug;

use crate::error::{Error, Result};
use crate::model::{
    AlarmConfig, ListFilter, Record, RecordFields, RecordPatch, RecordPayload, RecordStatus,
    SnoozeState, SyncStatus, TaskSpec, TimeTrigger,
};
use crate::storage::events::{ChangeBus, ChangeEvent, ChangeKind, ChangeOrigin};
use crate::storage::schema::apply_schema;
use crate::sync::hash::{content_hash, has_changed};
use crate::sync::RemoteRecord;

/// A store shared between the UI-facing API and the sync engine.
///
/// Locks are held for a single store call and never across an `.await`.
pub type SharedStore = Arc<Mutex<RecordStore>>;

/// Lock a shared store.
///
/// # Errors
///
/// Returns `Error::Other` if a previous holder panicked mid-write.
pub fn lock_store(store: &SharedStore) -> Result<StoreGuard<'_>> {
    let guard = store
        .lock()
        .map_err(|_| Error::Other("record store lock poisoned".to_string()))?;
    Ok(StoreGuard { guard: Some(guard) })
}

/// Exclusive access to a shared store.
///
/// Change events committed while the guard is held are published when it
/// is dropped, after the lock has been released.
pub struct StoreGuard<'a> {
    guard: Option<MutexGuard<'a, RecordStore>>,
}

impl Deref for StoreGuard<'_> {
    type Target = RecordStore;

    fn deref(&self) -> &RecordStore {
        match &self.guard {
            Some(guard) => guard,
            None => unreachable!("store guard used after release"),
        }
    }
}

impl DerefMut for StoreGuard<'_> {
    fn deref_mut(&mut self) -> &mut RecordStore {
        match &mut self.guard {
            Some(guard) => guard,
            None => unreachable!("store guard used after release"),
        }
    }
}

impl Drop for StoreGuard<'_> {
    fn drop(&mut self) {
        let Some(mut guard) = self.guard.take() else {
            return;
        };
        let events = std::mem::take(&mut guard.outbox);
        let bus = guard.bus.clone();
        drop(guard);

        for event in &events {
            bus.notify(event);
        }
    }
}

const RECORD_COLUMNS: &str = "id, remote_id, owner_id, kind, title, body, status, pinned, \
     highlighted, trigger_at, trigger_end_at, timezone, repeat_rule, snooze, alarm, task_spec, \
     calendar_event_id, sync_status, created_at, updated_at, synced_at, deleted_at";

/// SQLite-based record store.
#[derive(Debug)]
pub struct RecordStore {
    conn: Connection,
    bus: ChangeBus,
    /// Committed events awaiting release of the shared lock
    outbox: Vec<ChangeEvent>,
    /// Publish through `outbox` instead of immediately
    deferred: bool,
}

/// Context for a mutation, collecting the change events to publish once the
/// transaction commits.
pub struct MutationContext {
    /// Name of the operation being performed.
    pub op_name: String,
    /// Events to publish after commit.
    pub events: Vec<ChangeEvent>,
}

impl MutationContext {
    #[must_use]
    pub fn new(op_name: &str) -> Self {
        Self {
            op_name: op_name.to_string(),
            events: Vec::new(),
        }
    }

    /// Queue a change notification for this operation.
    pub fn record_change(&mut self, record: &Record, change: ChangeKind, origin: ChangeOrigin) {
        self.events
            .push(ChangeEvent::new(&record.id, &record.owner_id, change, origin));
    }
}

impl RecordStore {
    /// Open a database at the given path with a fresh change bus.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_bus(path, ChangeBus::new())
    }

    /// Open a database at the given path, publishing on `bus`.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open_with_bus(path: &Path, bus: ChangeBus) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        apply_schema(&conn)?;
        Ok(Self {
            conn,
            bus,
            outbox: Vec::new(),
            deferred: false,
        })
    }

    /// Open an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self {
            conn,
            bus: ChangeBus::new(),
            outbox: Vec::new(),
            deferred: false,
        })
    }

    /// Wrap the store for sharing with the sync engine.
    ///
    /// From here on events are published by [`StoreGuard`] on release.
    #[must_use]
    pub fn into_shared(mut self) -> SharedStore {
        self.deferred = true;
        Arc::new(Mutex::new(self))
    }

    /// The bus this store publishes committed changes on.
    #[must_use]
    pub fn changes(&self) -> &ChangeBus {
        &self.bus
    }

    /// Get a reference to the underlying connection (for read operations).
    #[must_use]
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Execute a mutation with the transaction protocol.
    ///
    /// 1. Begins an IMMEDIATE transaction (write lock)
    /// 2. Executes the mutation closure
    /// 3. Commits (or rolls back when the closure fails)
    /// 4. Publishes the collected change events, or queues them for the
    ///    [`StoreGuard`] when the store is shared
    ///
    /// # Errors
    ///
    /// Returns an error if any step fails. The transaction is rolled back on error
    /// and no event is published.
    pub fn mutate<F, R>(&mut self, op: &str, f: F) -> Result<R>
    where
        F: FnOnce(&Transaction, &mut MutationContext) -> Result<R>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

        let mut ctx = MutationContext::new(op);
        let result = f(&tx, &mut ctx)?;
        tx.commit()?;

        if !ctx.events.is_empty() {
            debug!(op = %ctx.op_name, changes = ctx.events.len(), "Mutation committed");
        }
        if self.deferred {
            self.outbox.append(&mut ctx.events);
        } else {
            for event in &ctx.events {
                self.bus.notify(event);
            }
        }

        Ok(result)
    }

    // ==================
    // Create
    // ==================

    /// Create a new record for `owner_id`, marked pending.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` for a blank owner or invalid fields, and
    /// `Error::Database` if the insert fails.
    pub fn create(&mut self, owner_id: &str, fields: RecordFields) -> Result<Record> {
        if owner_id.trim().is_empty() {
            return Err(Error::Validation("owner id is required".to_string()));
        }
        let mut fields = fields;
        fields.title = fields.title.trim().to_string();
        fields.validate()?;

        let now = chrono::Utc::now().timestamp_millis();
        let record = Record {
            id: format!("rec_{}", uuid::Uuid::new_v4().simple()),
            remote_id: None,
            owner_id: owner_id.to_string(),
            fields,
            sync_status: SyncStatus::Pending,
            created_at: now,
            updated_at: now,
            synced_at: None,
            deleted_at: None,
        };

        self.mutate("create", |tx, ctx| {
            insert_record(tx, &record)?;
            ctx.record_change(&record, ChangeKind::Created, ChangeOrigin::Local);
            Ok(())
        })?;

        Ok(record)
    }

    // ==================
    // Reads
    // ==================

    /// Get a live (not soft-deleted) record by local id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_by_id(&self, id: &str) -> Result<Option<Record>> {
        find_record(&self.conn, "id", id, false)
    }

    /// Get a live (not soft-deleted) record by remote id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_by_remote_id(&self, remote_id: &str) -> Result<Option<Record>> {
        find_record(&self.conn, "remote_id", remote_id, false)
    }

    /// List live records for an owner, newest-created first.
    ///
    /// Archived records are hidden unless a status filter is given or
    /// `include_archived` is set.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_by_owner(&self, owner_id: &str, filter: &ListFilter) -> Result<Vec<Record>> {
        let mut conditions = vec!["owner_id = ?1".to_string(), "deleted_at IS NULL".to_string()];
        let mut params: Vec<&str> = vec![owner_id];

        if let Some(kind) = filter.kind {
            params.push(kind.as_str());
            conditions.push(format!("kind = ?{}", params.len()));
        }
        if let Some(status) = filter.status {
            params.push(status.as_str());
            conditions.push(format!("status = ?{}", params.len()));
        } else if !filter.include_archived {
            conditions.push("status != 'archived'".to_string());
        }
        if let Some(sync_status) = filter.sync_status {
            params.push(sync_status.as_str());
            conditions.push(format!("sync_status = ?{}", params.len()));
        }

        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM records WHERE {} ORDER BY created_at DESC, rowid DESC",
            conditions.join(" AND ")
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(params), map_record_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
    }

    /// The changeset: every pending record for the owner, tombstones included,
    /// least recently updated first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_pending(&self, owner_id: &str) -> Result<Vec<Record>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM records
             WHERE owner_id = ?1 AND sync_status = 'pending'
             ORDER BY updated_at ASC, rowid ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([owner_id], map_record_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Error::from)
    }

    /// Number of pending records for the owner.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn count_pending(&self, owner_id: &str) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM records WHERE owner_id = ?1 AND sync_status = 'pending'",
            [owner_id],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    // ==================
    // Local mutations
    // ==================

    /// Apply a partial update. Unspecified fields are left alone; the record
    /// is re-marked pending and `updated_at` is bumped.
    ///
    /// Returns `None` if no live record has that id.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` if the patched fields are invalid.
    pub fn update(&mut self, id: &str, patch: &RecordPatch) -> Result<Option<Record>> {
        self.modify(id, "update", |fields| patch.apply(fields))
    }

    /// Set the lifecycle status.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn set_status(&mut self, id: &str, status: RecordStatus) -> Result<Option<Record>> {
        self.update(id, &RecordPatch::default().status(status))
    }

    /// Flip the pin flag.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn toggle_pin(&mut self, id: &str) -> Result<Option<Record>> {
        self.modify(id, "toggle_pin", |fields| {
            RecordPatch::default().pinned(!fields.pinned).apply(fields)
        })
    }

    /// Flip the highlight flag.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn toggle_highlight(&mut self, id: &str) -> Result<Option<Record>> {
        self.modify(id, "toggle_highlight", |fields| {
            RecordPatch::default()
                .highlighted(!fields.highlighted)
                .apply(fields)
        })
    }

    /// Snooze a reminder until `until`, bumping its snooze count.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` if the record is not a reminder.
    pub fn snooze(&mut self, id: &str, until: i64) -> Result<Option<Record>> {
        self.modify(id, "snooze", |fields| {
            let RecordPayload::Reminder { trigger, alarm } = &fields.payload else {
                return Err(Error::Validation(format!(
                    "only reminders can be snoozed, this is a {}",
                    fields.kind()
                )));
            };
            let count = trigger.snooze.map_or(0, |s| s.count);
            let mut trigger = trigger.clone();
            trigger.snooze = Some(SnoozeState {
                until,
                count: count + 1,
            });
            RecordPatch::default()
                .payload(RecordPayload::Reminder {
                    trigger,
                    alarm: alarm.clone(),
                })
                .apply(fields)
        })
    }

    /// Read-modify-write of a live record's fields inside one transaction.
    fn modify<F>(&mut self, id: &str, op: &str, f: F) -> Result<Option<Record>>
    where
        F: FnOnce(&RecordFields) -> Result<RecordFields>,
    {
        let now = chrono::Utc::now().timestamp_millis();

        self.mutate(op, |tx, ctx| {
            let Some(current) = find_record(tx, "id", id, false)? else {
                return Ok(None);
            };
            let next = f(&current.fields)?;
            let cols = PayloadColumns::encode(&next.payload)?;

            tx.execute(
                "UPDATE records SET
                    title = ?1, body = ?2, status = ?3, pinned = ?4, highlighted = ?5,
                    calendar_event_id = ?6, trigger_at = ?7, trigger_end_at = ?8,
                    timezone = ?9, repeat_rule = ?10, snooze = ?11, alarm = ?12,
                    task_spec = ?13, sync_status = 'pending',
                    updated_at = MAX(?14, updated_at + 1)
                 WHERE id = ?15",
                rusqlite::params![
                    next.title,
                    next.body,
                    next.status.as_str(),
                    next.pinned,
                    next.highlighted,
                    next.calendar_event_id,
                    cols.trigger_at,
                    cols.trigger_end_at,
                    cols.timezone,
                    cols.repeat_rule,
                    cols.snooze,
                    cols.alarm,
                    cols.task_spec,
                    now,
                    id,
                ],
            )?;

            let updated = find_record(tx, "id", id, false)?
                .ok_or_else(|| Error::RecordNotFound { id: id.to_string() })?;
            ctx.record_change(&updated, ChangeKind::Updated, ChangeOrigin::Local);
            Ok(Some(updated))
        })
    }

    /// Soft delete: write a pending tombstone. The row is removed by the sync
    /// engine once the remote confirms the deletion.
    ///
    /// Returns `false` if no live record has that id.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn soft_delete(&mut self, id: &str) -> Result<bool> {
        let now = chrono::Utc::now().timestamp_millis();

        self.mutate("soft_delete", |tx, ctx| {
            let Some(record) = find_record(tx, "id", id, false)? else {
                return Ok(false);
            };
            tx.execute(
                "UPDATE records
                 SET deleted_at = ?1, updated_at = MAX(?1, updated_at + 1), sync_status = 'pending'
                 WHERE id = ?2",
                rusqlite::params![now, id],
            )?;
            ctx.record_change(&record, ChangeKind::Deleted, ChangeOrigin::Local);
            Ok(true)
        })
    }

    // ==================
    // Sync bookkeeping
    // ==================

    /// Physically remove a row (live or tombstone).
    ///
    /// Only for confirmed remote deletions or externally signaled remote
    /// tombstones.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn hard_delete(&mut self, id: &str) -> Result<bool> {
        self.purge("id", id)
    }

    /// Physically remove the row linked to `remote_id`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn hard_delete_by_remote_id(&mut self, remote_id: &str) -> Result<bool> {
        self.purge("remote_id", remote_id)
    }

    fn purge(&mut self, column: &'static str, value: &str) -> Result<bool> {
        self.mutate("hard_delete", |tx, ctx| {
            let Some(record) = find_record(tx, column, value, true)? else {
                return Ok(false);
            };
            tx.execute("DELETE FROM records WHERE id = ?1", [&record.id])?;
            ctx.record_change(&record, ChangeKind::Purged, ChangeOrigin::Sync);
            Ok(true)
        })
    }

    /// Record that the remote accepted this record under `remote_id`.
    ///
    /// # Errors
    ///
    /// Returns `Error::RecordNotFound` for an unknown id and
    /// `Error::Validation` if a different remote id is already assigned.
    pub fn mark_synced(&mut self, id: &str, remote_id: &str) -> Result<()> {
        self.mark_pushed(id, remote_id, None).map(|_| ())
    }

    /// Version-guarded [`mark_synced`](Self::mark_synced).
    ///
    /// When `pushed_version` is given and the row's `updated_at` has moved on
    /// since the push was read, the row only receives its remote id and stays
    /// pending so the newer edit is pushed next cycle. Returns whether the row
    /// is now synced.
    ///
    /// # Errors
    ///
    /// Same as [`mark_synced`](Self::mark_synced).
    pub fn mark_pushed(
        &mut self,
        id: &str,
        remote_id: &str,
        pushed_version: Option<i64>,
    ) -> Result<bool> {
        let now = chrono::Utc::now().timestamp_millis();

        self.mutate("mark_synced", |tx, ctx| {
            let record = find_record(tx, "id", id, true)?
                .ok_or_else(|| Error::RecordNotFound { id: id.to_string() })?;

            if let Some(existing) = record.remote_id.as_deref() {
                if existing != remote_id {
                    return Err(Error::Validation(format!(
                        "record {id} already has remote id {existing}, refusing {remote_id}"
                    )));
                }
            }

            let current = pushed_version.is_none_or(|v| v == record.updated_at);
            if current {
                tx.execute(
                    "UPDATE records SET remote_id = ?1, sync_status = 'synced', synced_at = ?2
                     WHERE id = ?3",
                    rusqlite::params![remote_id, now, id],
                )?;
            } else {
                debug!(record = id, "Edited during push, staying pending");
                tx.execute(
                    "UPDATE records SET remote_id = ?1 WHERE id = ?2",
                    rusqlite::params![remote_id, id],
                )?;
            }

            ctx.record_change(&record, ChangeKind::SyncState, ChangeOrigin::Sync);
            Ok(current)
        })
    }

    /// Flag a record whose push the remote rejected. Never auto-resolved.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn mark_conflict(&mut self, id: &str) -> Result<bool> {
        self.mutate("mark_conflict", |tx, ctx| {
            let Some(record) = find_record(tx, "id", id, true)? else {
                return Ok(false);
            };
            tx.execute(
                "UPDATE records SET sync_status = 'conflict' WHERE id = ?1",
                [id],
            )?;
            ctx.record_change(&record, ChangeKind::SyncState, ChangeOrigin::Sync);
            Ok(true)
        })
    }

    /// Merge one pulled remote record into local state.
    ///
    /// Conflict policy is whole-record last-local-writer-wins:
    /// - no local row with this remote id: insert it as synced;
    /// - local row is clean (synced): overwrite its fields, refresh `synced_at`;
    /// - local row is dirty (pending, conflict, or a tombstone): keep local and
    ///   discard the remote version entirely.
    ///
    /// There is no field-level merge, so independent edits to different
    /// fields on two devices lose one side's change.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` if the remote fields are invalid or the
    /// remote id belongs to another owner.
    pub fn upsert_from_remote(&mut self, owner_id: &str, remote: &RemoteRecord) -> Result<Record> {
        remote.fields.validate()?;
        let now = chrono::Utc::now().timestamp_millis();

        self.mutate("upsert_from_remote", |tx, ctx| {
            let Some(local) = find_record(tx, "remote_id", &remote.remote_id, true)? else {
                let record = Record {
                    id: format!("rec_{}", uuid::Uuid::new_v4().simple()),
                    remote_id: Some(remote.remote_id.clone()),
                    owner_id: owner_id.to_string(),
                    fields: remote.fields.clone(),
                    sync_status: SyncStatus::Synced,
                    created_at: remote.created_at.unwrap_or(now),
                    updated_at: remote.updated_at.unwrap_or(now),
                    synced_at: Some(now),
                    deleted_at: None,
                };
                insert_record(tx, &record)?;
                ctx.record_change(&record, ChangeKind::Pulled, ChangeOrigin::Sync);
                return Ok(record);
            };

            if local.owner_id != owner_id {
                return Err(Error::Validation(format!(
                    "remote record {} belongs to another owner",
                    remote.remote_id
                )));
            }

            if local.is_dirty() {
                debug!(record = %local.id, remote = %remote.remote_id, "Local changes win over pull");
                return Ok(local);
            }

            if !has_changed(&content_hash(&remote.fields)?, Some(&content_hash(&local.fields)?)) {
                tx.execute(
                    "UPDATE records SET synced_at = ?1 WHERE id = ?2",
                    rusqlite::params![now, local.id],
                )?;
            } else {
                let cols = PayloadColumns::encode(&remote.fields.payload)?;
                let fields = &remote.fields;
                tx.execute(
                    "UPDATE records SET
                        kind = ?1, title = ?2, body = ?3, status = ?4, pinned = ?5,
                        highlighted = ?6, calendar_event_id = ?7, trigger_at = ?8,
                        trigger_end_at = ?9, timezone = ?10, repeat_rule = ?11, snooze = ?12,
                        alarm = ?13, task_spec = ?14, sync_status = 'synced', synced_at = ?15,
                        updated_at = MAX(updated_at, ?16)
                     WHERE id = ?17",
                    rusqlite::params![
                        fields.kind().as_str(),
                        fields.title,
                        fields.body,
                        fields.status.as_str(),
                        fields.pinned,
                        fields.highlighted,
                        fields.calendar_event_id,
                        cols.trigger_at,
                        cols.trigger_end_at,
                        cols.timezone,
                        cols.repeat_rule,
                        cols.snooze,
                        cols.alarm,
                        cols.task_spec,
                        now,
                        remote.updated_at.unwrap_or(now),
                        local.id,
                    ],
                )?;
            }

            let merged = find_record(tx, "id", &local.id, true)?
                .ok_or_else(|| Error::RecordNotFound { id: local.id.clone() })?;
            ctx.record_change(&merged, ChangeKind::Pulled, ChangeOrigin::Sync);
            Ok(merged)
        })
    }
}

// ==================
// Row mapping
// ==================

/// Column values for the kind-specific payload.
///
/// This and [`decode_payload`] are the only places the JSON blob columns are
/// written or parsed.
#[derive(Default)]
struct PayloadColumns {
    trigger_at: Option<i64>,
    trigger_end_at: Option<i64>,
    timezone: Option<String>,
    repeat_rule: Option<String>,
    snooze: Option<String>,
    alarm: Option<String>,
    task_spec: Option<String>,
}

impl PayloadColumns {
    fn encode(payload: &RecordPayload) -> Result<Self> {
        Ok(match payload {
            RecordPayload::Note => Self::default(),
            RecordPayload::Reminder { trigger, alarm } => Self {
                trigger_at: Some(trigger.at),
                trigger_end_at: trigger.end_at,
                timezone: trigger.timezone.clone(),
                repeat_rule: trigger.repeat_rule.clone(),
                snooze: trigger.snooze.as_ref().map(serde_json::to_string).transpose()?,
                alarm: alarm.as_ref().map(serde_json::to_string).transpose()?,
                task_spec: None,
            },
            RecordPayload::Task(spec) => Self {
                task_spec: Some(serde_json::to_string(spec)?),
                ..Self::default()
            },
        })
    }
}

fn insert_record(tx: &Transaction, record: &Record) -> Result<()> {
    let cols = PayloadColumns::encode(&record.fields.payload)?;
    let fields = &record.fields;
    tx.execute(
        "INSERT INTO records (id, remote_id, owner_id, kind, title, body, status, pinned,
            highlighted, trigger_at, trigger_end_at, timezone, repeat_rule, snooze, alarm,
            task_spec, calendar_event_id, sync_status, created_at, updated_at, synced_at, deleted_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17,
            ?18, ?19, ?20, ?21, ?22)",
        rusqlite::params![
            record.id,
            record.remote_id,
            record.owner_id,
            record.kind().as_str(),
            fields.title,
            fields.body,
            fields.status.as_str(),
            fields.pinned,
            fields.highlighted,
            cols.trigger_at,
            cols.trigger_end_at,
            cols.timezone,
            cols.repeat_rule,
            cols.snooze,
            cols.alarm,
            cols.task_spec,
            fields.calendar_event_id,
            record.sync_status.as_str(),
            record.created_at,
            record.updated_at,
            record.synced_at,
            record.deleted_at,
        ],
    )?;
    Ok(())
}

/// Look a record up by `id` or `remote_id`.
fn find_record(
    conn: &Connection,
    column: &'static str,
    value: &str,
    include_deleted: bool,
) -> Result<Option<Record>> {
    let live = if include_deleted { "" } else { " AND deleted_at IS NULL" };
    let sql = format!("SELECT {RECORD_COLUMNS} FROM records WHERE {column} = ?1{live}");
    conn.query_row(&sql, [value], map_record_row)
        .optional()
        .map_err(Error::from)
}

fn conversion_error(idx: usize, err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err.into())
}

fn parse_column<T>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = Error>,
{
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| conversion_error(idx, e))
}

fn parse_json<T: serde::de::DeserializeOwned>(
    row: &rusqlite::Row,
    idx: usize,
) -> rusqlite::Result<Option<T>> {
    row.get::<_, Option<String>>(idx)?
        .map(|raw| serde_json::from_str(&raw).map_err(|e| conversion_error(idx, e)))
        .transpose()
}

fn decode_payload(row: &rusqlite::Row) -> rusqlite::Result<RecordPayload> {
    let kind: crate::model::RecordKind = parse_column(row, 3)?;
    match kind {
        crate::model::RecordKind::Note => Ok(RecordPayload::Note),
        crate::model::RecordKind::Reminder => {
            let at: Option<i64> = row.get(9)?;
            let at = at.ok_or_else(|| conversion_error(9, "reminder without trigger_at"))?;
            let trigger = TimeTrigger {
                at,
                end_at: row.get(10)?,
                timezone: row.get(11)?,
                repeat_rule: row.get(12)?,
                snooze: parse_json::<SnoozeState>(row, 13)?,
            };
            Ok(RecordPayload::Reminder {
                trigger,
                alarm: parse_json::<AlarmConfig>(row, 14)?,
            })
        }
        crate::model::RecordKind::Task => {
            let spec = parse_json::<TaskSpec>(row, 15)?
                .ok_or_else(|| conversion_error(15, "task without task_spec"))?;
            Ok(RecordPayload::Task(spec))
        }
    }
}

fn map_record_row(row: &rusqlite::Row) -> rusqlite::Result<Record> {
    Ok(Record {
        id: row.get(0)?,
        remote_id: row.get(1)?,
        owner_id: row.get(2)?,
        fields: RecordFields {
            title: row.get(4)?,
            body: row.get(5)?,
            status: parse_column(row, 6)?,
            pinned: row.get(7)?,
            highlighted: row.get(8)?,
            calendar_event_id: row.get(16)?,
            payload: decode_payload(row)?,
        },
        sync_status: parse_column(row, 17)?,
        created_at: row.get(18)?,
        updated_at: row.get(19)?,
        synced_at: row.get(20)?,
        deleted_at: row.get(21)?,
    })
}
