//! Sync command implementations.
//!
//! `tack sync` runs one push-then-pull cycle and exits. `tack watch` keeps a
//! [`SyncScheduler`] running until interrupted, probing the remote so the
//! scheduler knows when connectivity comes and goes.
//!
//! Change notifications are in-process only. Edits made by other `tack`
//! invocations while `watch` runs are picked up by the interval tick.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;
use serde::Serialize;
use tokio::runtime::Runtime;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use super::record::open_store;
use crate::config::{
    REACHABILITY_INTERVAL, TackConfig, load_config, resolve_endpoint, resolve_owner, resolve_token,
    scheduler_config,
};
use crate::error::Result;
use crate::storage::{RecordStore, lock_store};
use crate::sync::{
    HttpGateway, RemoteGateway, SchedulerConfig, SchedulerStatus, SyncEngine, SyncResult,
    SyncScheduler,
};

/// How often `watch` checks the scheduler for something new to report.
const STATUS_POLL: Duration = Duration::from_secs(1);

#[derive(Serialize)]
struct SyncOutput<'a> {
    owner: &'a str,
    endpoint: &'a str,
    #[serde(flatten)]
    result: &'a SyncResult,
    pending: usize,
}

fn build_engine(store: RecordStore, config: &TackConfig) -> Result<SyncEngine<HttpGateway>> {
    let endpoint = resolve_endpoint(config)?;
    let gateway = HttpGateway::new(&endpoint, resolve_token(config))?;
    Ok(SyncEngine::new(store.into_shared(), gateway))
}

/// Execute the sync command.
///
/// Per-record failures are reported in the output and do not fail the
/// command; they stay pending (or in conflict) for the next sync.
///
/// # Errors
///
/// Returns an error if the database, owner or endpoint is missing.
pub fn sync(db_path: Option<&PathBuf>, owner: Option<&str>, json: bool) -> Result<()> {
    let store = open_store(db_path)?;
    let config = load_config()?;
    let owner = resolve_owner(owner, &config)?;
    let engine = build_engine(store, &config)?;

    let runtime = Runtime::new()?;
    let result = runtime.block_on(engine.sync_all(&owner));
    let pending = lock_store(engine.store())?.count_pending(&owner)?;

    if json {
        let output = SyncOutput {
            owner: &owner,
            endpoint: engine.gateway().endpoint(),
            result: &result,
            pending,
        };
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    println!(
        "{} {} pushed, {} pulled",
        "Synced:".bold(),
        result.pushed,
        result.pulled
    );
    if pending > 0 {
        println!("  {} still pending", pending.to_string().yellow());
    }
    if !result.errors.is_empty() {
        println!();
        println!("{} {}", "Errors:".red().bold(), result.errors.len());
        for error in &result.errors {
            println!("  {error}");
        }
    }
    Ok(())
}

/// Execute the watch command. Runs until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the database, owner or endpoint is missing, or the
/// scheduler cannot start.
pub fn watch(db_path: Option<&PathBuf>, owner: Option<&str>, json: bool) -> Result<()> {
    let store = open_store(db_path)?;
    let config = load_config()?;
    let owner = resolve_owner(owner, &config)?;
    let engine = Arc::new(build_engine(store, &config)?);

    if !json {
        println!(
            "Watching {} for {} (Ctrl-C to stop)",
            engine.gateway().endpoint(),
            owner.bold()
        );
    }

    let runtime = Runtime::new()?;
    runtime.block_on(run_watch(engine, &owner, scheduler_config(&config), json))
}

async fn run_watch<G>(
    engine: Arc<SyncEngine<G>>,
    owner: &str,
    config: SchedulerConfig,
    json: bool,
) -> Result<()>
where
    G: RemoteGateway + 'static,
{
    let scheduler = SyncScheduler::start(Arc::clone(&engine), owner, config)?;

    let mut health = tokio::time::interval(REACHABILITY_INTERVAL);
    health.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut poll = tokio::time::interval(STATUS_POLL);
    poll.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut last = scheduler.status();
    report(&last, json)?;

    loop {
        tokio::select! {
            result = &mut shutdown => {
                if let Err(e) = result {
                    warn!(error = %e, "Failed to listen for Ctrl-C");
                }
                break;
            }
            _ = health.tick() => {
                let online = engine.gateway().is_reachable().await;
                debug!(online, "Remote health check");
                scheduler.set_online(online);
            }
            _ = poll.tick() => {}
        }

        let status = scheduler.status();
        if status != last {
            report(&status, json)?;
            last = status;
        }
    }

    scheduler.shutdown().await;
    if !json {
        println!("Stopped.");
    }
    Ok(())
}

fn report(status: &SchedulerStatus, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(status)?);
        return Ok(());
    }

    let now = chrono::Local::now().format("%H:%M:%S");
    let state = if !status.is_enabled {
        "disabled".dimmed()
    } else if !status.is_online {
        "offline".yellow()
    } else if status.is_syncing {
        "syncing".cyan()
    } else {
        "idle".green()
    };

    let mut line = format!("[{now}] {state} pending={}", status.pending_count);
    if let Some(at) = status
        .last_sync_at
        .and_then(chrono::DateTime::from_timestamp_millis)
    {
        line.push_str(&format!(
            " last_sync={}",
            at.with_timezone(&chrono::Local).format("%H:%M:%S")
        ));
    }
    println!("{line}");
    if let Some(error) = &status.last_error {
        println!("  {} {error}", "error:".red());
    }
    Ok(())
}
