//! In-memory remote gateway for tests.
//!
//! Keeps remote records in a map, records every call in order, and can be
//! told to fail specific operations or to take a while per request.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::model::{RecordFields, RecordStatus};

use super::gateway::{RemoteError, RemoteGateway, RemoteRecord};

/// A request the stub received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    /// Create, by title
    Create(String),
    Update(String),
    SetStatus(String, RecordStatus),
    SetPin(String, bool),
    SetHighlight(String, bool),
    Delete(String),
    FetchAll(String),
}

/// Operation selector for failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Create,
    Update,
    SetStatus,
    Delete,
    FetchAll,
}

struct FailureRule {
    op: Op,
    /// Only fail requests carrying this title (create/update)
    title: Option<String>,
    error: RemoteError,
}

#[derive(Default)]
struct StubState {
    records: BTreeMap<String, RemoteRecord>,
    next_id: u64,
    calls: Vec<Call>,
    failures: Vec<FailureRule>,
}

pub struct StubGateway {
    state: Mutex<StubState>,
    delay: Option<Duration>,
    reachable: std::sync::atomic::AtomicBool,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl StubGateway {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(StubState::default()),
            delay: None,
            reachable: std::sync::atomic::AtomicBool::new(true),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Make every request take `delay` (use with paused tokio time).
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn state(&self) -> MutexGuard<'_, StubState> {
        self.state.lock().unwrap()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// Number of `fetch_all` requests, i.e. completed or running sync cycles.
    pub fn fetch_count(&self) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|c| matches!(c, Call::FetchAll(_)))
            .count()
    }

    /// Highest number of requests that were ever in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn fail_when(&self, op: Op, title: Option<&str>, error: RemoteError) {
        self.state().failures.push(FailureRule {
            op,
            title: title.map(str::to_string),
            error,
        });
    }

    pub fn clear_failures(&self) {
        self.state().failures.clear();
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Add a record as if another device had created it.
    pub fn seed(&self, fields: RecordFields) -> String {
        let mut state = self.state();
        let remote_id = Self::allocate_id(&mut state);
        state.records.insert(
            remote_id.clone(),
            RemoteRecord {
                remote_id: remote_id.clone(),
                fields,
                created_at: None,
                updated_at: None,
            },
        );
        remote_id
    }

    /// Change a remote record as if another device had edited it.
    pub fn edit(&self, remote_id: &str, f: impl FnOnce(&mut RecordFields)) {
        if let Some(record) = self.state().records.get_mut(remote_id) {
            f(&mut record.fields);
        }
    }

    pub fn remove(&self, remote_id: &str) {
        self.state().records.remove(remote_id);
    }

    pub fn remote(&self, remote_id: &str) -> Option<RemoteRecord> {
        self.state().records.get(remote_id).cloned()
    }

    fn allocate_id(state: &mut StubState) -> String {
        state.next_id += 1;
        format!("r{}", state.next_id)
    }

    /// Record the call, wait out the delay, then apply any failure rule.
    async fn enter(&self, call: Call, op: Option<Op>, title: Option<&str>) -> Result<(), RemoteError> {
        self.state().calls.push(call);

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let Some(op) = op else {
            return Ok(());
        };
        let state = self.state();
        let rule = state.failures.iter().find(|rule| {
            rule.op == op
                && rule
                    .title
                    .as_deref()
                    .is_none_or(|t| title.is_some_and(|actual| actual == t))
        });
        match rule {
            Some(rule) => Err(rule.error.clone()),
            None => Ok(()),
        }
    }

    fn modify(
        &self,
        remote_id: &str,
        f: impl FnOnce(&mut RecordFields),
    ) -> Result<(), RemoteError> {
        let mut state = self.state();
        let record = state
            .records
            .get_mut(remote_id)
            .ok_or(RemoteError::NotFound)?;
        f(&mut record.fields);
        Ok(())
    }
}

impl RemoteGateway for StubGateway {
    async fn create_record(&self, fields: &RecordFields) -> Result<String, RemoteError> {
        self.enter(Call::Create(fields.title.clone()), Some(Op::Create), Some(&fields.title))
            .await?;
        let mut state = self.state();
        let remote_id = Self::allocate_id(&mut state);
        state.records.insert(
            remote_id.clone(),
            RemoteRecord {
                remote_id: remote_id.clone(),
                fields: fields.clone(),
                created_at: None,
                updated_at: None,
            },
        );
        Ok(remote_id)
    }

    async fn update_record(&self, remote_id: &str, fields: &RecordFields) -> Result<(), RemoteError> {
        self.enter(Call::Update(remote_id.to_string()), Some(Op::Update), Some(&fields.title))
            .await?;
        self.modify(remote_id, |f| *f = fields.clone())
    }

    async fn set_status(&self, remote_id: &str, status: RecordStatus) -> Result<(), RemoteError> {
        self.enter(Call::SetStatus(remote_id.to_string(), status), Some(Op::SetStatus), None)
            .await?;
        self.modify(remote_id, |f| f.status = status)
    }

    async fn set_pin(&self, remote_id: &str, pinned: bool) -> Result<(), RemoteError> {
        self.enter(Call::SetPin(remote_id.to_string(), pinned), None, None)
            .await?;
        self.modify(remote_id, |f| f.pinned = pinned)
    }

    async fn set_highlight(&self, remote_id: &str, highlighted: bool) -> Result<(), RemoteError> {
        self.enter(Call::SetHighlight(remote_id.to_string(), highlighted), None, None)
            .await?;
        self.modify(remote_id, |f| f.highlighted = highlighted)
    }

    async fn delete_record(&self, remote_id: &str) -> Result<(), RemoteError> {
        self.enter(Call::Delete(remote_id.to_string()), Some(Op::Delete), None)
            .await?;
        match self.state().records.remove(remote_id) {
            Some(_) => Ok(()),
            None => Err(RemoteError::NotFound),
        }
    }

    async fn fetch_all(&self, owner_id: &str) -> Result<Vec<RemoteRecord>, RemoteError> {
        self.enter(Call::FetchAll(owner_id.to_string()), Some(Op::FetchAll), None)
            .await?;
        Ok(self.state().records.values().cloned().collect())
    }

    async fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }
}
