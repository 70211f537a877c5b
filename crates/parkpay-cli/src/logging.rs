// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow};
use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "PARKPAY_LOG";

/// HTTP plumbing is chatty at debug level.
const QUIET_TARGETS: &[(&str, &str)] = &[
    ("hyper", "warn"),
    ("hyper_util", "warn"),
    ("reqwest", "warn"),
    ("rustls", "warn"),
];

fn build_env_filter(level: &str, env_override: Option<&str>) -> Result<EnvFilter> {
    if let Some(directives) = env_override.map(str::trim).filter(|value| !value.is_empty()) {
        return EnvFilter::try_new(directives)
            .map_err(|error| anyhow!("invalid {LOG_ENV} filter {directives:?}: {error}"));
    }

    let mut directives = vec![level.trim().to_owned()];
    directives.extend(
        QUIET_TARGETS
            .iter()
            .map(|(target, level)| format!("{target}={level}")),
    );
    let filter = directives.join(",");
    EnvFilter::try_new(&filter).map_err(|error| {
        anyhow!("invalid [logging].level {level:?}: {error}; use for example \"info\" or \"debug\"")
    })
}

/// Sends `tracing` output to `file`. The terminal belongs to the TUI, so
/// nothing is written to stdout or stderr.
pub fn init(level: &str, file: &Path) -> Result<()> {
    let env_override = std::env::var(LOG_ENV).ok();
    let filter = build_env_filter(level, env_override.as_deref())?;

    if let Some(parent) = file.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create log directory {}", parent.display()))?;
    }
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(file)
        .with_context(|| {
            format!(
                "open log file {} -- set [logging].file to a writable path",
                file.display()
            )
        })?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(log_file))
        .with_ansi(false)
        .with_target(true)
        .try_init()
        .map_err(|error| anyhow!("install log subscriber: {error}"))?;

    tracing::debug!(file = %file.display(), "logging initialized");
    Ok(())
}
