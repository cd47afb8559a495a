//! Record model for tack.
//!
//! A record is a user-owned note, reminder or agent task. The shared
//! envelope (identity, ownership, content, flags, sync bookkeeping) lives on
//! [`Record`]; everything that only makes sense for one kind lives in the
//! kind-indexed [`RecordPayload`], so a task spec on a note cannot be
//! expressed.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Record classification, derived from the payload variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Note,
    Reminder,
    Task,
}

impl RecordKind {
    /// Get the string representation for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Note => "note",
            Self::Reminder => "reminder",
            Self::Task => "task",
        }
    }
}

impl FromStr for RecordKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "note" => Ok(Self::Note),
            "reminder" => Ok(Self::Reminder),
            "task" => Ok(Self::Task),
            other => Err(Error::Validation(format!("unknown record kind: {other}"))),
        }
    }
}

/// Lifecycle status. `Done` and `Archived` are terminal for scheduling but
/// the record persists until deleted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    #[default]
    Open,
    Done,
    Archived,
}

impl RecordStatus {
    /// Get the string representation for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Done => "done",
            Self::Archived => "archived",
        }
    }
}

impl FromStr for RecordStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "open" => Ok(Self::Open),
            "done" => Ok(Self::Done),
            "archived" => Ok(Self::Archived),
            other => Err(Error::Validation(format!("unknown record status: {other}"))),
        }
    }
}

/// Sync bookkeeping state.
///
/// `Pending` means local changes have not been confirmed remotely.
/// `Conflict` means the remote rejected a push; it is never resolved
/// automatically.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    #[default]
    Pending,
    Synced,
    Conflict,
}

impl SyncStatus {
    /// Get the string representation for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Synced => "synced",
            Self::Conflict => "conflict",
        }
    }
}

impl FromStr for SyncStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "synced" => Ok(Self::Synced),
            "conflict" => Ok(Self::Conflict),
            other => Err(Error::Validation(format!("unknown sync status: {other}"))),
        }
    }
}

macro_rules! display_as_str {
    ($($ty:ty),* $(,)?) => {
        $(
            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(self.as_str())
                }
            }
        )*
    };
}

display_as_str!(RecordKind, RecordStatus, SyncStatus, DismissMethod, ExecutionPolicy);

/// How an alarm is dismissed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DismissMethod {
    TagScan,
    Code,
    #[default]
    Either,
}

impl DismissMethod {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::TagScan => "tag_scan",
            Self::Code => "code",
            Self::Either => "either",
        }
    }
}

impl FromStr for DismissMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "tag_scan" | "tag" | "nfc" => Ok(Self::TagScan),
            "code" => Ok(Self::Code),
            "either" => Ok(Self::Either),
            other => Err(Error::Validation(format!("unknown dismiss method: {other}"))),
        }
    }
}

/// Whether an agent task runs on its own or waits for a human.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionPolicy {
    #[default]
    Manual,
    Auto,
}

impl ExecutionPolicy {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Auto => "auto",
        }
    }
}

impl FromStr for ExecutionPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "manual" => Ok(Self::Manual),
            "auto" => Ok(Self::Auto),
            other => Err(Error::Validation(format!("unknown execution policy: {other}"))),
        }
    }
}

/// Snooze bookkeeping for a reminder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnoozeState {
    /// Snoozed until (Unix milliseconds)
    pub until: i64,
    /// How many times the reminder has been snoozed
    pub count: u32,
}

/// When a reminder fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeTrigger {
    /// Trigger timestamp (Unix milliseconds)
    pub at: i64,
    /// Optional end timestamp (Unix milliseconds), for ranged events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_at: Option<i64>,
    /// IANA timezone name the trigger was authored in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    /// Repeat rule (RRULE-style string, opaque to the store)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat_rule: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snooze: Option<SnoozeState>,
}

impl TimeTrigger {
    #[must_use]
    pub fn at(at: i64) -> Self {
        Self {
            at,
            end_at: None,
            timezone: None,
            repeat_rule: None,
            snooze: None,
        }
    }
}

/// Alarm attached to a reminder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmConfig {
    pub enabled: bool,
    pub dismiss: DismissMethod,
    /// Registered tag reference, required for tag-scan dismissal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_id: Option<String>,
    /// Dismiss code, required for code dismissal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sound: Option<String>,
}

/// Specification for an agent-executed task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub goal: String,
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default)]
    pub allowed_tools: Vec<String>,
    #[serde(default)]
    pub workspace_refs: Vec<String>,
    #[serde(default)]
    pub policy: ExecutionPolicy,
    /// External run identifiers associated with this task
    #[serde(default)]
    pub run_ids: Vec<String>,
}

/// Kind-specific payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RecordPayload {
    #[default]
    Note,
    Reminder {
        trigger: TimeTrigger,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        alarm: Option<AlarmConfig>,
    },
    Task(TaskSpec),
}

impl RecordPayload {
    #[must_use]
    pub const fn kind(&self) -> RecordKind {
        match self {
            Self::Note => RecordKind::Note,
            Self::Reminder { .. } => RecordKind::Reminder,
            Self::Task(_) => RecordKind::Task,
        }
    }

    fn validate(&self) -> Result<()> {
        match self {
            Self::Note => Ok(()),
            Self::Reminder { trigger, alarm } => {
                if let Some(end) = trigger.end_at {
                    if end < trigger.at {
                        return Err(Error::Validation(
                            "trigger end must not be before trigger start".to_string(),
                        ));
                    }
                }
                if let Some(alarm) = alarm {
                    let has_tag = alarm.tag_id.as_deref().is_some_and(|t| !t.trim().is_empty());
                    let has_code = alarm.code.as_deref().is_some_and(|c| !c.trim().is_empty());
                    let ok = match alarm.dismiss {
                        DismissMethod::TagScan => has_tag,
                        DismissMethod::Code => has_code,
                        DismissMethod::Either => has_tag || has_code,
                    };
                    if !ok {
                        return Err(Error::Validation(format!(
                            "alarm dismiss method '{}' is missing its tag or code",
                            alarm.dismiss
                        )));
                    }
                }
                Ok(())
            }
            Self::Task(spec) => {
                if spec.goal.trim().is_empty() {
                    return Err(Error::Validation("task goal is required".to_string()));
                }
                Ok(())
            }
        }
    }
}

/// The synchronized content of a record.
///
/// This is exactly what is pushed to and pulled from the remote store;
/// identity and sync bookkeeping stay on [`Record`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFields {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default)]
    pub status: RecordStatus,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub highlighted: bool,
    /// Linked external calendar event
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calendar_event_id: Option<String>,
    #[serde(flatten)]
    pub payload: RecordPayload,
}

impl RecordFields {
    /// Fields for a new note.
    pub fn note(title: impl Into<String>) -> Self {
        Self::with_payload(title, RecordPayload::Note)
    }

    /// Fields for a new reminder.
    pub fn reminder(title: impl Into<String>, trigger: TimeTrigger) -> Self {
        Self::with_payload(title, RecordPayload::Reminder { trigger, alarm: None })
    }

    /// Fields for a new agent task.
    pub fn task(title: impl Into<String>, spec: TaskSpec) -> Self {
        Self::with_payload(title, RecordPayload::Task(spec))
    }

    pub fn with_payload(title: impl Into<String>, payload: RecordPayload) -> Self {
        Self {
            title: title.into(),
            body: None,
            status: RecordStatus::Open,
            pinned: false,
            highlighted: false,
            calendar_event_id: None,
            payload,
        }
    }

    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    #[must_use]
    pub const fn kind(&self) -> RecordKind {
        self.payload.kind()
    }

    /// Check field-level constraints.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` describing the first violated rule.
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(Error::Validation("title is required".to_string()));
        }
        self.payload.validate()
    }
}

/// A record row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Local identifier, stable for the record's local lifetime
    pub id: String,
    /// Identifier assigned by the remote store on first accepted create
    pub remote_id: Option<String>,
    pub owner_id: String,
    #[serde(flatten)]
    pub fields: RecordFields,
    pub sync_status: SyncStatus,
    /// Creation timestamp (Unix milliseconds)
    pub created_at: i64,
    /// Last local mutation (Unix milliseconds)
    pub updated_at: i64,
    /// Last confirmed push or pull (Unix milliseconds)
    pub synced_at: Option<i64>,
    /// Soft-delete marker; set means this is a pending tombstone
    pub deleted_at: Option<i64>,
}

impl Record {
    #[must_use]
    pub const fn kind(&self) -> RecordKind {
        self.fields.kind()
    }

    #[must_use]
    pub const fn is_tombstone(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// True when the record carries local state the remote has not accepted.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.sync_status != SyncStatus::Synced
    }
}

/// A partial update. `None` leaves the field untouched.
///
/// Nullable columns use `Option<Option<_>>`: `Some(None)` clears the value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordPatch {
    pub title: Option<String>,
    pub body: Option<Option<String>>,
    pub status: Option<RecordStatus>,
    pub pinned: Option<bool>,
    pub highlighted: Option<bool>,
    pub calendar_event_id: Option<Option<String>>,
    /// Replacement payload; must be of the record's existing kind
    pub payload: Option<RecordPayload>,
}

impl RecordPatch {
    #[must_use]
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    #[must_use]
    pub fn body(mut self, body: Option<String>) -> Self {
        self.body = Some(body);
        self
    }

    #[must_use]
    pub const fn status(mut self, status: RecordStatus) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub const fn pinned(mut self, pinned: bool) -> Self {
        self.pinned = Some(pinned);
        self
    }

    #[must_use]
    pub const fn highlighted(mut self, highlighted: bool) -> Self {
        self.highlighted = Some(highlighted);
        self
    }

    #[must_use]
    pub fn payload(mut self, payload: RecordPayload) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Apply this patch onto a copy of `fields`.
    pub(crate) fn apply(&self, fields: &RecordFields) -> Result<RecordFields> {
        let mut next = fields.clone();
        if let Some(title) = &self.title {
            next.title = title.trim().to_string();
        }
        if let Some(body) = &self.body {
            next.body.clone_from(body);
        }
        if let Some(status) = self.status {
            next.status = status;
        }
        if let Some(pinned) = self.pinned {
            next.pinned = pinned;
        }
        if let Some(highlighted) = self.highlighted {
            next.highlighted = highlighted;
        }
        if let Some(event) = &self.calendar_event_id {
            next.calendar_event_id.clone_from(event);
        }
        if let Some(payload) = &self.payload {
            if payload.kind() != fields.kind() {
                return Err(Error::Validation(format!(
                    "cannot change a {} into a {}",
                    fields.kind(),
                    payload.kind()
                )));
            }
            next.payload = payload.clone();
        }
        next.validate()?;
        Ok(next)
    }
}

/// Filter for [`crate::storage::RecordStore::list_by_owner`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListFilter {
    pub kind: Option<RecordKind>,
    pub status: Option<RecordStatus>,
    pub sync_status: Option<SyncStatus>,
    /// Include archived records when no explicit status is requested
    pub include_archived: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parse_rejects_unknown() {
        assert_eq!("Reminder".parse::<RecordKind>().unwrap(), RecordKind::Reminder);
        let err = "calendar".parse::<RecordKind>().unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_payload_json_shape() {
        let fields = RecordFields::task(
            "Triage inbox",
            TaskSpec {
                goal: "Label every unread thread".to_string(),
                allowed_tools: vec!["mail".to_string()],
                ..TaskSpec::default()
            },
        );
        let json = serde_json::to_value(&fields).unwrap();
        assert_eq!(json["kind"], "task");
        assert_eq!(json["goal"], "Label every unread thread");
        assert_eq!(json["policy"], "manual");

        let back: RecordFields = serde_json::from_value(json).unwrap();
        assert_eq!(back, fields);
    }

    #[test]
    fn test_alarm_requires_dismiss_secret() {
        let mut fields = RecordFields::reminder("Wake up", TimeTrigger::at(1_000));
        fields.payload = RecordPayload::Reminder {
            trigger: TimeTrigger::at(1_000),
            alarm: Some(AlarmConfig {
                enabled: true,
                dismiss: DismissMethod::Code,
                tag_id: None,
                code: None,
                sound: None,
            }),
        };
        assert!(matches!(fields.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_trigger_end_before_start_rejected() {
        let mut trigger = TimeTrigger::at(5_000);
        trigger.end_at = Some(4_000);
        let fields = RecordFields::reminder("Standup", trigger);
        assert!(fields.validate().is_err());
    }

    #[test]
    fn test_patch_cannot_change_kind() {
        let fields = RecordFields::note("Groceries");
        let patch = RecordPatch::default().payload(RecordPayload::Task(TaskSpec {
            goal: "buy".to_string(),
            ..TaskSpec::default()
        }));
        assert!(matches!(patch.apply(&fields), Err(Error::Validation(_))));
    }

    #[test]
    fn test_patch_leaves_unspecified_fields() {
        let fields = RecordFields::note("Groceries").body("milk, eggs");
        let next = RecordPatch::default().pinned(true).apply(&fields).unwrap();
        assert_eq!(next.title, "Groceries");
        assert_eq!(next.body.as_deref(), Some("milk, eggs"));
        assert!(next.pinned);
    }
}
