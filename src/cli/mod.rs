//! CLI definitions using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;

/// tack - offline-first notes, reminders and agent tasks
#[derive(Parser, Debug)]
#[command(name = "tack", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Database path (default: ~/.tack/data/tack.db)
    #[arg(long, global = true, env = "TACK_DB")]
    pub db: Option<PathBuf>,

    /// Owner whose records to work on
    #[arg(long, global = true, env = "TACK_OWNER")]
    pub owner: Option<String>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the local database
    Init {
        /// Overwrite existing database
        #[arg(long)]
        force: bool,
    },

    /// Print version information
    Version,

    /// Create a note, reminder or task
    Create(CreateArgs),

    /// List records
    List(ListArgs),

    /// Show one record
    Show {
        /// Record ID
        id: String,
    },

    /// Edit a record
    Edit(EditArgs),

    /// Set the lifecycle status (open, done, archived)
    Status {
        /// Record ID
        id: String,

        /// New status
        status: String,
    },

    /// Toggle the pin flag
    Pin {
        /// Record ID
        id: String,
    },

    /// Toggle the highlight flag
    Highlight {
        /// Record ID
        id: String,
    },

    /// Snooze a reminder
    Snooze(SnoozeArgs),

    /// Delete records (synced deletions reach the remote on next sync)
    Delete {
        /// Record IDs
        #[arg(required = true, num_args = 1..)]
        ids: Vec<String>,
    },

    /// Show local changes not yet confirmed by the remote
    Pending {
        /// Show records the remote rejected instead
        #[arg(long)]
        conflicts: bool,
    },

    /// Push local changes and pull remote ones
    Sync,

    /// Keep syncing in the background until interrupted
    Watch,

    /// Sync configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Supported shells for completions.
#[derive(clap::ValueEnum, Clone, Debug)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

#[derive(Args, Debug, Default)]
pub struct CreateArgs {
    /// Title
    pub title: String,

    /// Kind (note, reminder, task)
    #[arg(short, long, default_value = "note")]
    pub kind: String,

    /// Body text
    #[arg(short, long)]
    pub body: Option<String>,

    /// Pin immediately
    #[arg(long)]
    pub pin: bool,

    /// Highlight immediately
    #[arg(long)]
    pub highlight: bool,

    /// Linked calendar event ID
    #[arg(long)]
    pub calendar_event: Option<String>,

    #[command(flatten)]
    pub reminder: ReminderArgs,

    #[command(flatten)]
    pub task: TaskArgs,
}

/// Reminder options.
#[derive(Args, Debug, Default)]
pub struct ReminderArgs {
    /// Trigger time (RFC 3339 or Unix milliseconds)
    #[arg(long)]
    pub at: Option<String>,

    /// End time (RFC 3339 or Unix milliseconds)
    #[arg(long)]
    pub end: Option<String>,

    /// IANA timezone name
    #[arg(long)]
    pub timezone: Option<String>,

    /// Repeat rule (e.g. FREQ=DAILY)
    #[arg(long)]
    pub repeat: Option<String>,

    /// Attach an alarm dismissed by: tag_scan, code, either
    #[arg(long)]
    pub alarm: Option<String>,

    /// Tag ID for tag-scan dismissal
    #[arg(long)]
    pub tag: Option<String>,

    /// Code for code dismissal
    #[arg(long)]
    pub code: Option<String>,

    /// Alarm sound
    #[arg(long)]
    pub sound: Option<String>,
}

/// Task options.
#[derive(Args, Debug, Default)]
pub struct TaskArgs {
    /// What the agent should achieve
    #[arg(long)]
    pub goal: Option<String>,

    /// Input (repeatable)
    #[arg(long = "input")]
    pub inputs: Vec<String>,

    /// Constraint (repeatable)
    #[arg(long = "constraint")]
    pub constraints: Vec<String>,

    /// Allowed tool (repeatable)
    #[arg(long = "tool")]
    pub tools: Vec<String>,

    /// Workspace reference (repeatable)
    #[arg(long = "workspace")]
    pub workspaces: Vec<String>,

    /// Execution policy (manual, auto)
    #[arg(long)]
    pub policy: Option<String>,
}

#[derive(Args, Debug, Default)]
pub struct ListArgs {
    /// Filter by kind (note, reminder, task)
    #[arg(short, long)]
    pub kind: Option<String>,

    /// Filter by status (open, done, archived)
    #[arg(short, long)]
    pub status: Option<String>,

    /// Include archived records
    #[arg(short, long)]
    pub all: bool,
}

#[derive(Args, Debug, Default)]
pub struct EditArgs {
    /// Record ID
    pub id: String,

    /// New title
    #[arg(long)]
    pub title: Option<String>,

    /// New body
    #[arg(short, long, conflicts_with = "clear_body")]
    pub body: Option<String>,

    /// Remove the body
    #[arg(long)]
    pub clear_body: bool,

    /// New trigger time for a reminder (RFC 3339 or Unix milliseconds)
    #[arg(long)]
    pub at: Option<String>,

    /// New goal for a task
    #[arg(long)]
    pub goal: Option<String>,

    /// Link a calendar event
    #[arg(long, conflicts_with = "unlink_calendar")]
    pub calendar_event: Option<String>,

    /// Remove the calendar link
    #[arg(long)]
    pub unlink_calendar: bool,
}

#[derive(Args, Debug)]
pub struct SnoozeArgs {
    /// Reminder ID
    pub id: String,

    /// Snooze until (RFC 3339 or Unix milliseconds)
    #[arg(long, conflicts_with = "minutes")]
    pub until: Option<String>,

    /// Snooze for this many minutes
    #[arg(long, default_value_t = 10)]
    pub minutes: i64,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show the effective sync configuration
    Show,

    /// Set a sync setting (enabled, endpoint, token, owner, debounce_ms,
    /// interval_secs, reconnect_delay_ms)
    Set {
        /// Setting name
        key: String,

        /// New value
        value: String,
    },
}
