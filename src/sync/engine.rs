//! Push-then-pull sync engine.
//!
//! One cycle of [`SyncEngine::sync_all`]:
//!
//! 1. **Push** every pending record (tombstones included), sequentially and
//!    in `updated_at` order. A failing record is reported and skipped; the
//!    rest are still attempted.
//! 2. **Pull** the owner's full remote snapshot and merge each record through
//!    [`RecordStore::upsert_from_remote`].
//!
//! Push always completes before pull starts so the pull cannot clobber
//! local edits that have not reached the remote yet.
//!
//! The store lock is taken per store call and never held across a remote
//! request.

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::model::Record;
use crate::storage::{lock_store, RecordStore, SharedStore};

use super::gateway::{RemoteError, RemoteGateway};
use super::types::SyncResult;

/// Reconciles one owner's local store with a remote store.
pub struct SyncEngine<G> {
    store: SharedStore,
    gateway: G,
}

/// What a successful push did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pushed {
    /// The remote confirmed the change.
    Confirmed,
    /// A never-synced tombstone was dropped locally without a remote call.
    Discarded,
}

impl<G: RemoteGateway> SyncEngine<G> {
    pub fn new(store: SharedStore, gateway: G) -> Self {
        Self { store, gateway }
    }

    #[must_use]
    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    #[must_use]
    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Run one full sync cycle for `owner_id`.
    ///
    /// Never fails as a whole: every problem ends up in
    /// [`SyncResult::errors`], push errors before pull errors.
    pub async fn sync_all(&self, owner_id: &str) -> SyncResult {
        let mut result = SyncResult::default();

        self.push(owner_id, &mut result).await;
        self.pull(owner_id, &mut result).await;

        info!(
            owner = owner_id,
            pushed = result.pushed,
            pulled = result.pulled,
            errors = result.errors.len(),
            "Sync cycle finished"
        );
        result
    }

    async fn push(&self, owner_id: &str, result: &mut SyncResult) {
        let pending = match self.with_store(|s| s.list_pending(owner_id)) {
            Ok(pending) => pending,
            Err(e) => {
                warn!(owner = owner_id, error = %e, "Could not read pending changes");
                result.errors.push(format!("push: {e}"));
                return;
            }
        };

        debug!(owner = owner_id, count = pending.len(), "Pushing pending records");

        for record in &pending {
            match self.push_one(record).await {
                Ok(Pushed::Confirmed) => {
                    debug!(record = %record.id, "Pushed");
                    result.pushed += 1;
                }
                Ok(Pushed::Discarded) => {
                    debug!(record = %record.id, "Dropped unsynced tombstone");
                }
                Err(e) => {
                    warn!(record = %record.id, error = %e, "Push failed");
                    result.push_error(&record.id, e);
                }
            }
        }
    }

    async fn push_one(&self, record: &Record) -> Result<Pushed> {
        if record.is_tombstone() {
            let Some(remote_id) = record.remote_id.as_deref() else {
                self.with_store(|s| s.hard_delete(&record.id))?;
                return Ok(Pushed::Discarded);
            };
            match self.gateway.delete_record(remote_id).await {
                Ok(()) | Err(RemoteError::NotFound) => {}
                Err(e) => return Err(e.into()),
            }
            self.with_store(|s| s.hard_delete(&record.id))?;
            return Ok(Pushed::Confirmed);
        }

        let remote_id = match record.remote_id.as_deref() {
            None => match self.gateway.create_record(&record.fields).await {
                Ok(remote_id) => remote_id,
                Err(e) => return Err(self.fail(record, e, false)),
            },
            Some(remote_id) => {
                if let Err(e) = self.gateway.update_record(remote_id, &record.fields).await {
                    return Err(self.fail(record, e, true));
                }
                let follow_up = async {
                    self.gateway
                        .set_status(remote_id, record.fields.status)
                        .await?;
                    self.gateway.set_pin(remote_id, record.fields.pinned).await?;
                    self.gateway
                        .set_highlight(remote_id, record.fields.highlighted)
                        .await
                };
                if let Err(e) = follow_up.await {
                    return Err(self.fail(record, e, true));
                }
                remote_id.to_string()
            }
        };

        // An edit made while the request was in flight keeps the row pending.
        self.with_store(|s| s.mark_pushed(&record.id, &remote_id, Some(record.updated_at)))?;
        Ok(Pushed::Confirmed)
    }

    /// Convert a failed create/update (or one of the status, pin and
    /// highlight calls after an update) into an error, flagging the record as
    /// conflicted when the remote refused it outright.
    fn fail(&self, record: &Record, err: RemoteError, is_update: bool) -> crate::Error {
        let conflicted = match &err {
            RemoteError::Rejected(_) => true,
            RemoteError::NotFound => is_update,
            RemoteError::Unauthorized(_) | RemoteError::Transport(_) => false,
        };
        if conflicted {
            if let Err(e) = self.with_store(|s| s.mark_conflict(&record.id)) {
                warn!(record = %record.id, error = %e, "Could not flag conflict");
            }
        }
        err.into()
    }

    async fn pull(&self, owner_id: &str, result: &mut SyncResult) {
        let remote = match self.gateway.fetch_all(owner_id).await {
            Ok(remote) => remote,
            Err(e) => {
                warn!(owner = owner_id, error = %e, "Pull failed");
                result.pull_error(None, e);
                return;
            }
        };

        debug!(owner = owner_id, count = remote.len(), "Merging remote records");

        for record in &remote {
            match self.with_store(|s| s.upsert_from_remote(owner_id, record)) {
                Ok(_) => result.pulled += 1,
                Err(e) => {
                    warn!(remote = %record.remote_id, error = %e, "Merge failed");
                    result.pull_error(Some(&record.remote_id), e);
                }
            }
        }
    }

    fn with_store<R>(&self, f: impl FnOnce(&mut RecordStore) -> Result<R>) -> Result<R> {
        let mut store = lock_store(&self.store)?;
        f(&mut store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ListFilter, RecordFields, RecordPatch, RecordStatus, SyncStatus};
    use crate::sync::testing::{Call, Op, StubGateway};

    fn engine() -> SyncEngine<StubGateway> {
        let store = RecordStore::open_memory().unwrap().into_shared();
        SyncEngine::new(store, StubGateway::new())
    }

    fn create(engine: &SyncEngine<StubGateway>, title: &str) -> Record {
        lock_store(engine.store())
            .unwrap()
            .create("u1", RecordFields::note(title))
            .unwrap()
    }

    fn get(engine: &SyncEngine<StubGateway>, id: &str) -> Option<Record> {
        lock_store(engine.store()).unwrap().get_by_id(id).unwrap()
    }

    fn pending(engine: &SyncEngine<StubGateway>) -> Vec<Record> {
        lock_store(engine.store()).unwrap().list_pending("u1").unwrap()
    }

    #[tokio::test]
    async fn test_offline_create_then_sync() {
        let engine = engine();
        let record = create(&engine, "Buy milk");
        assert_eq!(pending(&engine).len(), 1);

        let result = engine.sync_all("u1").await;
        assert_eq!(result.pushed, 1);
        assert_eq!(result.pulled, 1);
        assert!(result.is_clean());
        assert!(pending(&engine).is_empty());

        let synced = get(&engine, &record.id).unwrap();
        assert_eq!(synced.sync_status, SyncStatus::Synced);
        assert_eq!(synced.remote_id.as_deref(), Some("r1"));
        let remote_id = synced.remote_id.clone().unwrap();
        assert_eq!(
            engine.gateway().remote(&remote_id).unwrap().fields.title,
            "Buy milk"
        );

        // A second cycle has nothing to push
        let again = engine.sync_all("u1").await;
        assert_eq!(again.pushed, 0);
        assert_eq!(again.pulled, 1);
    }

    #[tokio::test]
    async fn test_push_happens_before_pull() {
        let engine = engine();
        create(&engine, "a");
        engine.sync_all("u1").await;

        let calls = engine.gateway().calls();
        let create_at = calls
            .iter()
            .position(|c| matches!(c, Call::Create(_)))
            .unwrap();
        let fetch_at = calls
            .iter()
            .position(|c| matches!(c, Call::FetchAll(_)))
            .unwrap();
        assert!(create_at < fetch_at);
    }

    #[tokio::test]
    async fn test_update_pushes_all_flags() {
        let engine = engine();
        let record = create(&engine, "Plan trip");
        engine.sync_all("u1").await;
        let remote_id = get(&engine, &record.id).unwrap().remote_id.unwrap();

        {
            let mut store = lock_store(engine.store()).unwrap();
            store.toggle_pin(&record.id).unwrap();
            store.set_status(&record.id, RecordStatus::Done).unwrap();
        }
        engine.gateway().clear_calls();

        let result = engine.sync_all("u1").await;
        assert_eq!(result.pushed, 1);
        assert_eq!(
            engine.gateway().calls(),
            vec![
                Call::Update(remote_id.clone()),
                Call::SetStatus(remote_id.clone(), RecordStatus::Done),
                Call::SetPin(remote_id.clone(), true),
                Call::SetHighlight(remote_id.clone(), false),
                Call::FetchAll("u1".to_string()),
            ]
        );
        let remote = engine.gateway().remote(&remote_id).unwrap();
        assert!(remote.fields.pinned);
        assert_eq!(remote.fields.status, RecordStatus::Done);
    }

    #[tokio::test]
    async fn test_unsynced_tombstone_never_reaches_remote() {
        let engine = engine();
        let record = create(&engine, "oops");
        lock_store(engine.store())
            .unwrap()
            .soft_delete(&record.id)
            .unwrap();

        let result = engine.sync_all("u1").await;
        assert_eq!(result.pushed, 0);
        assert!(result.is_clean());
        assert!(engine
            .gateway()
            .calls()
            .iter()
            .all(|c| matches!(c, Call::FetchAll(_))));
        assert!(lock_store(engine.store())
            .unwrap()
            .list_pending("u1")
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_synced_tombstone_deletes_remotely() {
        let engine = engine();
        let record = create(&engine, "bye");
        engine.sync_all("u1").await;
        let remote_id = get(&engine, &record.id).unwrap().remote_id.unwrap();

        lock_store(engine.store())
            .unwrap()
            .soft_delete(&record.id)
            .unwrap();
        let result = engine.sync_all("u1").await;

        assert_eq!(result.pushed, 1);
        assert_eq!(result.pulled, 0);
        assert!(engine.gateway().remote(&remote_id).is_none());
        let deletes: Vec<_> = engine
            .gateway()
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Delete(_)))
            .collect();
        assert_eq!(deletes, vec![Call::Delete(remote_id)]);
        assert!(pending(&engine).is_empty());
    }

    #[tokio::test]
    async fn test_delete_of_missing_remote_counts_as_success() {
        let engine = engine();
        let record = create(&engine, "bye");
        engine.sync_all("u1").await;
        let remote_id = get(&engine, &record.id).unwrap().remote_id.unwrap();

        // Deleted on another device in the meantime
        engine.gateway().remove(&remote_id);
        lock_store(engine.store())
            .unwrap()
            .soft_delete(&record.id)
            .unwrap();

        let result = engine.sync_all("u1").await;
        assert_eq!(result.pushed, 1);
        assert!(result.is_clean());
    }

    #[tokio::test]
    async fn test_error_isolation() {
        let engine = engine();
        let one = create(&engine, "one");
        let two = create(&engine, "two");
        let three = create(&engine, "three");
        engine.gateway().fail_when(
            Op::Create,
            Some("two"),
            RemoteError::Transport("connection reset".into()),
        );

        let result = engine.sync_all("u1").await;

        assert_eq!(result.pushed, 2);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(
            result.errors[0],
            format!("push {}: Remote error: transport: connection reset", two.id)
        );
        let creates = engine
            .gateway()
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Create(_)))
            .count();
        assert_eq!(creates, 3);

        assert_eq!(get(&engine, &one.id).unwrap().sync_status, SyncStatus::Synced);
        assert_eq!(get(&engine, &two.id).unwrap().sync_status, SyncStatus::Pending);
        assert_eq!(get(&engine, &three.id).unwrap().sync_status, SyncStatus::Synced);
    }

    #[tokio::test]
    async fn test_rejected_create_marks_conflict() {
        let engine = engine();
        let record = create(&engine, "bad");
        engine
            .gateway()
            .fail_when(Op::Create, None, RemoteError::Rejected("schema".into()));

        let result = engine.sync_all("u1").await;
        assert_eq!(result.errors.len(), 1);

        let conflicted = get(&engine, &record.id).unwrap();
        assert_eq!(conflicted.sync_status, SyncStatus::Conflict);

        // Conflicts are not retried automatically
        engine.gateway().clear_failures();
        let again = engine.sync_all("u1").await;
        assert_eq!(again.pushed, 0);
    }

    #[tokio::test]
    async fn test_update_of_vanished_remote_marks_conflict() {
        let engine = engine();
        let record = create(&engine, "shared");
        engine.sync_all("u1").await;
        let remote_id = get(&engine, &record.id).unwrap().remote_id.unwrap();

        engine.gateway().remove(&remote_id);
        lock_store(engine.store())
            .unwrap()
            .update(&record.id, &RecordPatch::default().title("shared (edited)"))
            .unwrap();

        let result = engine.sync_all("u1").await;
        assert_eq!(result.pushed, 0);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(
            get(&engine, &record.id).unwrap().sync_status,
            SyncStatus::Conflict
        );
    }

    #[tokio::test]
    async fn test_rejected_status_after_update_marks_conflict() {
        let engine = engine();
        let record = create(&engine, "shared");
        engine.sync_all("u1").await;
        let remote_id = get(&engine, &record.id).unwrap().remote_id.unwrap();

        lock_store(engine.store())
            .unwrap()
            .set_status(&record.id, RecordStatus::Done)
            .unwrap();
        engine
            .gateway()
            .fail_when(Op::SetStatus, None, RemoteError::Rejected("locked".into()));
        engine.gateway().clear_calls();

        let result = engine.sync_all("u1").await;
        assert_eq!(result.pushed, 0);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(
            get(&engine, &record.id).unwrap().sync_status,
            SyncStatus::Conflict
        );
        // Pin and highlight are not attempted once status fails
        assert!(!engine
            .gateway()
            .calls()
            .contains(&Call::SetPin(remote_id, false)));
        assert!(pending(&engine).is_empty());
    }

    #[tokio::test]
    async fn test_transport_failure_stays_pending() {
        let engine = engine();
        let record = create(&engine, "later");
        engine
            .gateway()
            .fail_when(Op::Create, None, RemoteError::Transport("offline".into()));

        engine.sync_all("u1").await;
        assert_eq!(
            get(&engine, &record.id).unwrap().sync_status,
            SyncStatus::Pending
        );

        engine.gateway().clear_failures();
        let result = engine.sync_all("u1").await;
        assert_eq!(result.pushed, 1);
        assert_eq!(
            get(&engine, &record.id).unwrap().sync_status,
            SyncStatus::Synced
        );
    }

    #[tokio::test]
    async fn test_local_edit_survives_pull() {
        let engine = engine();
        let record = create(&engine, "A");
        engine.sync_all("u1").await;
        let remote_id = get(&engine, &record.id).unwrap().remote_id.unwrap();

        // Edit locally and make the next push fail so the pull sees a dirty row
        lock_store(engine.store())
            .unwrap()
            .update(&record.id, &RecordPatch::default().title("A (edited)"))
            .unwrap();
        engine
            .gateway()
            .fail_when(Op::Update, None, RemoteError::Transport("offline".into()));

        let result = engine.sync_all("u1").await;
        assert_eq!(result.pushed, 0);
        assert_eq!(result.pulled, 1);

        let local = get(&engine, &record.id).unwrap();
        assert_eq!(local.fields.title, "A (edited)");
        assert_eq!(local.sync_status, SyncStatus::Pending);
        assert_eq!(engine.gateway().remote(&remote_id).unwrap().fields.title, "A");
    }

    #[tokio::test]
    async fn test_remote_edit_wins_when_local_clean() {
        let engine = engine();
        let record = create(&engine, "A (edited)");
        engine.sync_all("u1").await;
        let remote_id = get(&engine, &record.id).unwrap().remote_id.unwrap();

        engine.gateway().edit(&remote_id, |f| f.title = "A".to_string());

        let result = engine.sync_all("u1").await;
        assert_eq!(result.pushed, 0);
        assert_eq!(get(&engine, &record.id).unwrap().fields.title, "A");
    }

    #[tokio::test]
    async fn test_pull_inserts_new_remote_records() {
        let engine = engine();
        let remote_id = engine.gateway().seed(RecordFields::note("From the web"));

        let result = engine.sync_all("u1").await;
        assert_eq!(result.pulled, 1);

        let store = lock_store(engine.store()).unwrap();
        let local = store.get_by_remote_id(&remote_id).unwrap().unwrap();
        assert_eq!(local.fields.title, "From the web");
        assert_eq!(local.sync_status, SyncStatus::Synced);
    }

    #[tokio::test]
    async fn test_pull_does_not_delete_absent_records() {
        let engine = engine();
        let record = create(&engine, "keep me");
        engine.sync_all("u1").await;
        let remote_id = get(&engine, &record.id).unwrap().remote_id.unwrap();

        engine.gateway().remove(&remote_id);
        let result = engine.sync_all("u1").await;

        assert_eq!(result.pulled, 0);
        assert!(get(&engine, &record.id).is_some());
    }

    #[tokio::test]
    async fn test_fetch_failure_reports_single_pull_error() {
        let engine = engine();
        create(&engine, "x");
        engine.gateway().fail_when(
            Op::FetchAll,
            None,
            RemoteError::Unauthorized("token expired".into()),
        );

        let result = engine.sync_all("u1").await;
        assert_eq!(result.pushed, 1);
        assert_eq!(result.pulled, 0);
        assert_eq!(result.errors, vec!["pull: unauthorized: token expired"]);
    }

    #[tokio::test]
    async fn test_invalid_remote_record_reported_per_record() {
        let engine = engine();
        let good = engine.gateway().seed(RecordFields::note("fine"));
        let bad = engine.gateway().seed(RecordFields::note("   "));

        let result = engine.sync_all("u1").await;
        assert_eq!(result.pulled, 1);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].starts_with(&format!("pull {bad}: ")));

        let store = lock_store(engine.store()).unwrap();
        assert!(store.get_by_remote_id(&good).unwrap().is_some());
        let all = store.list_by_owner("u1", &ListFilter::default()).unwrap();
        assert_eq!(all.len(), 1);
    }
}
