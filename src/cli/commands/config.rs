//! Config command implementations.

use crate::cli::ConfigCommands;
use crate::config::{
    config_path, load_config, resolve_endpoint, resolve_owner, resolve_token, save_config,
    scheduler_config,
};
use crate::error::Result;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

/// Effective sync settings after env, file and default resolution.
#[derive(Serialize)]
struct ConfigOutput {
    config_path: PathBuf,
    enabled: bool,
    endpoint: Option<String>,
    token: Option<String>,
    owner: Option<String>,
    debounce_ms: u64,
    interval_secs: u64,
    reconnect_delay_ms: u64,
}

/// Execute config commands.
///
/// # Errors
///
/// Returns an error if the config file cannot be read or written, or the
/// key or value is invalid.
pub fn execute(command: &ConfigCommands, json: bool) -> Result<()> {
    match command {
        ConfigCommands::Show => show(json),
        ConfigCommands::Set { key, value } => set(key, value, json),
    }
}

fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("****{tail}")
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn show(json: bool) -> Result<()> {
    let config = load_config()?;
    let timing = scheduler_config(&config);

    let output = ConfigOutput {
        config_path: config_path()?,
        enabled: timing.enabled,
        endpoint: resolve_endpoint(&config).ok(),
        token: resolve_token(&config).as_deref().map(mask_token),
        owner: resolve_owner(None, &config).ok(),
        debounce_ms: millis(timing.debounce),
        interval_secs: timing.interval.as_secs(),
        reconnect_delay_ms: millis(timing.reconnect_delay),
    };

    if json {
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    let unset = || "(not set)".to_string();
    println!("Config: {}", output.config_path.display());
    println!();
    println!("  enabled:            {}", output.enabled);
    println!("  endpoint:           {}", output.endpoint.unwrap_or_else(unset));
    println!("  token:              {}", output.token.unwrap_or_else(unset));
    println!("  owner:              {}", output.owner.unwrap_or_else(unset));
    println!("  debounce_ms:        {}", output.debounce_ms);
    println!("  interval_secs:      {}", output.interval_secs);
    println!("  reconnect_delay_ms: {}", output.reconnect_delay_ms);
    Ok(())
}

fn set(key: &str, value: &str, json: bool) -> Result<()> {
    let mut config = load_config()?;
    config.set(key, value)?;
    save_config(&config)?;

    if json {
        let output = serde_json::json!({
            "key": key,
            "saved": true,
            "config_path": config_path()?,
        });
        println!("{output}");
    } else {
        println!("Set {key}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_token() {
        assert_eq!(mask_token("short"), "****");
        assert_eq!(mask_token("sk_live_abcdef1234"), "****1234");
    }
}
