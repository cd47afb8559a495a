//! Record command implementations.

use crate::cli::{CreateArgs, EditArgs, ListArgs, SnoozeArgs};
use crate::config::{load_config, resolve_db_path, resolve_owner};
use crate::error::{Error, Result};
use crate::model::{
    AlarmConfig, DismissMethod, ExecutionPolicy, ListFilter, Record, RecordFields, RecordKind,
    RecordPatch, RecordPayload, RecordStatus, SyncStatus, TaskSpec, TimeTrigger,
};
use crate::storage::RecordStore;
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;

/// Output for list-style commands.
#[derive(Serialize)]
struct RecordListOutput {
    records: Vec<Record>,
    count: usize,
}

/// Output for delete.
#[derive(Serialize)]
struct DeleteOutput {
    deleted: Vec<String>,
    count: usize,
}

/// Open the store at the resolved database path.
///
/// # Errors
///
/// Returns `Error::NotInitialized` if the database does not exist yet.
pub fn open_store(db_path: Option<&PathBuf>) -> Result<RecordStore> {
    let db_path = resolve_db_path(db_path.map(PathBuf::as_path)).ok_or(Error::NotInitialized)?;

    if !db_path.exists() {
        return Err(Error::NotInitialized);
    }

    RecordStore::open(&db_path)
}

/// Parse a timestamp given as Unix milliseconds or RFC 3339.
///
/// # Errors
///
/// Returns `Error::Validation` for anything else.
pub fn parse_timestamp(value: &str) -> Result<i64> {
    let value = value.trim();
    if let Ok(ms) = value.parse::<i64>() {
        return Ok(ms);
    }
    chrono::DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.timestamp_millis())
        .map_err(|_| {
            Error::Validation(format!(
                "invalid time '{value}': use RFC 3339 (2025-01-31T09:00:00Z) or Unix milliseconds"
            ))
        })
}

fn require(record: Option<Record>, id: &str) -> Result<Record> {
    record.ok_or_else(|| Error::RecordNotFound { id: id.to_string() })
}

fn print_record(record: &Record, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(record)?);
    } else {
        print_record_detail(record);
    }
    Ok(())
}

fn build_payload(args: &CreateArgs, kind: RecordKind) -> Result<RecordPayload> {
    match kind {
        RecordKind::Note => Ok(RecordPayload::Note),
        RecordKind::Reminder => {
            let r = &args.reminder;
            let at = r
                .at
                .as_deref()
                .ok_or_else(|| Error::Validation("reminders need --at".to_string()))?;
            let trigger = TimeTrigger {
                at: parse_timestamp(at)?,
                end_at: r.end.as_deref().map(parse_timestamp).transpose()?,
                timezone: r.timezone.clone(),
                repeat_rule: r.repeat.clone(),
                snooze: None,
            };
            let alarm = r
                .alarm
                .as_deref()
                .map(|method| -> Result<AlarmConfig> {
                    Ok(AlarmConfig {
                        enabled: true,
                        dismiss: method.parse::<DismissMethod>()?,
                        tag_id: r.tag.clone(),
                        code: r.code.clone(),
                        sound: r.sound.clone(),
                    })
                })
                .transpose()?;
            Ok(RecordPayload::Reminder { trigger, alarm })
        }
        RecordKind::Task => {
            let t = &args.task;
            Ok(RecordPayload::Task(TaskSpec {
                goal: t.goal.clone().unwrap_or_else(|| args.title.clone()),
                inputs: t.inputs.clone(),
                constraints: t.constraints.clone(),
                allowed_tools: t.tools.clone(),
                workspace_refs: t.workspaces.clone(),
                policy: t
                    .policy
                    .as_deref()
                    .map(str::parse::<ExecutionPolicy>)
                    .transpose()?
                    .unwrap_or_default(),
                run_ids: Vec::new(),
            }))
        }
    }
}

/// Execute the create command.
///
/// # Errors
///
/// Returns an error on invalid input or storage failure.
pub fn create(
    args: &CreateArgs,
    db_path: Option<&PathBuf>,
    owner: Option<&str>,
    json: bool,
) -> Result<()> {
    let mut store = open_store(db_path)?;
    let owner = resolve_owner(owner, &load_config()?)?;

    let kind: RecordKind = args.kind.parse()?;
    let mut fields = RecordFields::with_payload(args.title.clone(), build_payload(args, kind)?);
    fields.body.clone_from(&args.body);
    fields.pinned = args.pin;
    fields.highlighted = args.highlight;
    fields.calendar_event_id.clone_from(&args.calendar_event);

    let record = store.create(&owner, fields)?;

    if json {
        println!("{}", serde_json::to_string(&record)?);
    } else {
        println!(
            "{} {} {}",
            "Created".green(),
            record.kind(),
            record.id.bold()
        );
        println!("  {}", record.fields.title);
    }
    Ok(())
}

/// Execute the list command.
///
/// # Errors
///
/// Returns an error on invalid filters or storage failure.
pub fn list(
    args: &ListArgs,
    db_path: Option<&PathBuf>,
    owner: Option<&str>,
    json: bool,
) -> Result<()> {
    let store = open_store(db_path)?;
    let owner = resolve_owner(owner, &load_config()?)?;

    let filter = ListFilter {
        kind: args.kind.as_deref().map(str::parse::<RecordKind>).transpose()?,
        status: args
            .status
            .as_deref()
            .map(str::parse::<RecordStatus>)
            .transpose()?,
        sync_status: None,
        include_archived: args.all,
    };
    let records = store.list_by_owner(&owner, &filter)?;

    if json {
        let output = RecordListOutput {
            count: records.len(),
            records,
        };
        println!("{}", serde_json::to_string(&output)?);
    } else if records.is_empty() {
        println!("No records.");
    } else {
        print_record_list(&records);
    }
    Ok(())
}

/// Execute the show command.
///
/// # Errors
///
/// Returns `Error::RecordNotFound` for an unknown id.
pub fn show(id: &str, db_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let store = open_store(db_path)?;
    let record = require(store.get_by_id(id)?, id)?;
    print_record(&record, json)
}

/// Execute the edit command.
///
/// # Errors
///
/// Returns an error on invalid input, unknown id or storage failure.
pub fn edit(args: &EditArgs, db_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let mut store = open_store(db_path)?;
    let current = require(store.get_by_id(&args.id)?, &args.id)?;

    let mut patch = RecordPatch::default();
    if let Some(title) = &args.title {
        patch = patch.title(title.clone());
    }
    if args.clear_body {
        patch = patch.body(None);
    } else if let Some(body) = &args.body {
        patch = patch.body(Some(body.clone()));
    }
    if args.unlink_calendar {
        patch.calendar_event_id = Some(None);
    } else if let Some(event) = &args.calendar_event {
        patch.calendar_event_id = Some(Some(event.clone()));
    }

    match (&current.fields.payload, &args.at, &args.goal) {
        (_, None, None) => {}
        (RecordPayload::Reminder { trigger, alarm }, Some(at), None) => {
            let mut trigger = trigger.clone();
            trigger.at = parse_timestamp(at)?;
            trigger.snooze = None;
            patch = patch.payload(RecordPayload::Reminder {
                trigger,
                alarm: alarm.clone(),
            });
        }
        (RecordPayload::Task(spec), None, Some(goal)) => {
            patch = patch.payload(RecordPayload::Task(TaskSpec {
                goal: goal.clone(),
                ..spec.clone()
            }));
        }
        (payload, _, _) => {
            return Err(Error::Validation(format!(
                "--at applies to reminders and --goal to tasks, this is a {}",
                payload.kind()
            )));
        }
    }

    let record = require(store.update(&args.id, &patch)?, &args.id)?;
    print_record(&record, json)
}

/// Execute the status command.
///
/// # Errors
///
/// Returns an error on an unknown status or id.
pub fn set_status(id: &str, status: &str, db_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let status: RecordStatus = status.parse()?;
    let mut store = open_store(db_path)?;
    let record = require(store.set_status(id, status)?, id)?;
    print_record(&record, json)
}

/// Execute the pin command.
///
/// # Errors
///
/// Returns `Error::RecordNotFound` for an unknown id.
pub fn pin(id: &str, db_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let mut store = open_store(db_path)?;
    let record = require(store.toggle_pin(id)?, id)?;
    print_record(&record, json)
}

/// Execute the highlight command.
///
/// # Errors
///
/// Returns `Error::RecordNotFound` for an unknown id.
pub fn highlight(id: &str, db_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let mut store = open_store(db_path)?;
    let record = require(store.toggle_highlight(id)?, id)?;
    print_record(&record, json)
}

/// Execute the snooze command.
///
/// # Errors
///
/// Returns `Error::Validation` if the record is not a reminder.
pub fn snooze(args: &SnoozeArgs, db_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let until = match &args.until {
        Some(until) => parse_timestamp(until)?,
        None => snooze_until(chrono::Utc::now().timestamp_millis(), args.minutes)?,
    };

    let mut store = open_store(db_path)?;
    let record = require(store.snooze(&args.id, until)?, &args.id)?;
    print_record(&record, json)
}

/// Wake-up time `minutes` after `now`, in epoch millis.
fn snooze_until(now: i64, minutes: i64) -> Result<i64> {
    if minutes <= 0 {
        return Err(Error::Validation("--minutes must be positive".to_string()));
    }
    minutes
        .checked_mul(60_000)
        .and_then(|delay| now.checked_add(delay))
        .ok_or_else(|| Error::Validation(format!("--minutes {minutes} is out of range")))
}

/// Execute the delete command.
///
/// # Errors
///
/// Returns `Error::RecordNotFound` if any id is unknown; earlier ids in the
/// list stay deleted.
pub fn delete(ids: &[String], db_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let mut store = open_store(db_path)?;

    let mut deleted = Vec::with_capacity(ids.len());
    for id in ids {
        if !store.soft_delete(id)? {
            return Err(Error::RecordNotFound { id: id.clone() });
        }
        deleted.push(id.clone());
    }

    if json {
        let output = DeleteOutput {
            count: deleted.len(),
            deleted,
        };
        println!("{}", serde_json::to_string(&output)?);
    } else {
        for id in &deleted {
            println!("{} {}", "Deleted".red(), id);
        }
    }
    Ok(())
}

/// Execute the pending command.
///
/// # Errors
///
/// Returns an error on storage failure.
pub fn pending(
    conflicts: bool,
    db_path: Option<&PathBuf>,
    owner: Option<&str>,
    json: bool,
) -> Result<()> {
    let store = open_store(db_path)?;
    let owner = resolve_owner(owner, &load_config()?)?;

    let records = if conflicts {
        store.list_by_owner(
            &owner,
            &ListFilter {
                sync_status: Some(SyncStatus::Conflict),
                include_archived: true,
                ..ListFilter::default()
            },
        )?
    } else {
        store.list_pending(&owner)?
    };

    if json {
        let output = RecordListOutput {
            count: records.len(),
            records,
        };
        println!("{}", serde_json::to_string(&output)?);
    } else if records.is_empty() {
        if conflicts {
            println!("No conflicts.");
        } else {
            println!("Everything is synced.");
        }
    } else {
        print_record_list(&records);
    }
    Ok(())
}

fn sync_marker(record: &Record) -> colored::ColoredString {
    if record.is_tombstone() {
        return "deleted".red();
    }
    match record.sync_status {
        SyncStatus::Synced => "synced".dimmed(),
        SyncStatus::Pending => "pending".yellow(),
        SyncStatus::Conflict => "conflict".red().bold(),
    }
}

fn print_record_list(records: &[Record]) {
    for record in records {
        let flags = format!(
            "{}{}",
            if record.fields.pinned { "📌" } else { "" },
            if record.fields.highlighted { "★" } else { "" }
        );
        println!(
            "{} {} {} {} {}",
            record.id.dimmed(),
            format!("[{}]", record.kind()).cyan(),
            record.fields.title.bold(),
            flags,
            sync_marker(record)
        );
    }
}

fn format_time(ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ms)
        .map_or_else(|| ms.to_string(), |dt| dt.format("%Y-%m-%d %H:%M UTC").to_string())
}

fn print_record_detail(record: &Record) {
    let fields = &record.fields;
    println!("{} {}", record.id.bold(), sync_marker(record));
    println!("  {}  {}", "Title:".dimmed(), fields.title);
    println!("  {}   {}", "Kind:".dimmed(), record.kind());
    println!("  {} {}", "Status:".dimmed(), fields.status);
    if fields.pinned || fields.highlighted {
        println!(
            "  {}  {}{}",
            "Flags:".dimmed(),
            if fields.pinned { "pinned " } else { "" },
            if fields.highlighted { "highlighted" } else { "" }
        );
    }
    if let Some(body) = &fields.body {
        println!();
        for line in body.lines() {
            println!("  {line}");
        }
        println!();
    }

    match &fields.payload {
        RecordPayload::Note => {}
        RecordPayload::Reminder { trigger, alarm } => {
            println!("  {}     {}", "At:".dimmed(), format_time(trigger.at));
            if let Some(end) = trigger.end_at {
                println!("  {}    {}", "End:".dimmed(), format_time(end));
            }
            if let Some(rule) = &trigger.repeat_rule {
                println!("  {} {}", "Repeat:".dimmed(), rule);
            }
            if let Some(snooze) = &trigger.snooze {
                println!(
                    "  {} until {} ({}x)",
                    "Snooze:".dimmed(),
                    format_time(snooze.until),
                    snooze.count
                );
            }
            if let Some(alarm) = alarm {
                println!(
                    "  {}  {} ({})",
                    "Alarm:".dimmed(),
                    if alarm.enabled { "on" } else { "off" },
                    alarm.dismiss
                );
            }
        }
        RecordPayload::Task(spec) => {
            println!("  {}   {}", "Goal:".dimmed(), spec.goal);
            println!("  {} {}", "Policy:".dimmed(), spec.policy);
            if !spec.allowed_tools.is_empty() {
                println!("  {}  {}", "Tools:".dimmed(), spec.allowed_tools.join(", "));
            }
        }
    }

    if let Some(remote_id) = &record.remote_id {
        println!("  {} {}", "Remote:".dimmed(), remote_id);
    }
    println!("  {} {}", "Updated:".dimmed(), format_time(record.updated_at));
}
