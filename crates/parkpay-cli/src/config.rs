// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use parkpay_app::HistoryPolicy;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_VERSION: i64 = 1;
const DEFAULT_API_BASE_URL: &str = "http://localhost:8080";
const DEFAULT_API_TIMEOUT: &str = "10s";
const DEFAULT_LOG_LEVEL: &str = "info";
const LOG_FILE_NAME: &str = "parkpay.log";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub version: i64,
    #[serde(default)]
    pub api: Api,
    #[serde(default)]
    pub storage: Storage,
    #[serde(default)]
    pub vehicles: Vehicles,
    #[serde(default)]
    pub logging: Logging,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            api: Api::default(),
            storage: Storage::default(),
            vehicles: Vehicles::default(),
            logging: Logging::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Api {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub timeout: Option<String>,
}

impl Default for Api {
    fn default() -> Self {
        Self {
            base_url: Some(DEFAULT_API_BASE_URL.to_owned()),
            api_key: None,
            timeout: Some(DEFAULT_API_TIMEOUT.to_owned()),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Storage {
    pub db_path: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Vehicles {
    pub history_policy: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Logging {
    pub level: Option<String>,
    pub file: Option<String>,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: Some(DEFAULT_LOG_LEVEL.to_owned()),
            file: None,
        }
    }
}

impl Config {
    pub fn default_path() -> Result<PathBuf> {
        if let Some(path) = env::var_os("PARKPAY_CONFIG_PATH") {
            return Ok(PathBuf::from(path));
        }

        let config_root = dirs::config_dir().ok_or_else(|| {
            anyhow!("cannot resolve config directory; set PARKPAY_CONFIG_PATH to the config file")
        })?;

        let app_dir = config_root.join(parkpay_db::APP_NAME);
        fs::create_dir_all(&app_dir)
            .with_context(|| format!("create config directory {}", app_dir.display()))?;
        Ok(app_dir.join("config.toml"))
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("read config file {}", path.display()))?;
        let value: toml::Value = toml::from_str(&raw)
            .with_context(|| format!("parse TOML config {}", path.display()))?;

        let version = value
            .get("version")
            .and_then(toml::Value::as_integer)
            .ok_or_else(|| {
                anyhow!(
                    "config file {} is not versioned. Add `version = 1` and put values under [api], [storage], [vehicles], and [logging]",
                    path.display()
                )
            })?;

        if version != CONFIG_VERSION {
            bail!(
                "unsupported config version {} in {}; expected version = 1. Regenerate it with `parkpay --print-example-config`",
                version,
                path.display()
            );
        }

        let config: Config = value
            .try_into()
            .with_context(|| format!("decode config {}", path.display()))?;
        config.validate(path)?;
        Ok(config)
    }

    fn validate(&self, path: &Path) -> Result<()> {
        if let Some(base_url) = &self.api.base_url
            && base_url.trim().is_empty()
        {
            bail!("api.base_url in {} must not be empty", path.display());
        }

        if let Some(timeout) = &self.api.timeout {
            let parsed = parse_duration(timeout)?;
            if parsed <= Duration::ZERO {
                bail!(
                    "api.timeout in {} must be positive, got {}",
                    path.display(),
                    timeout
                );
            }
        }

        if let Some(db_path) = &self.storage.db_path {
            parkpay_db::validate_db_path(db_path)?;
        }

        if let Some(policy) = &self.vehicles.history_policy
            && HistoryPolicy::parse(policy).is_none()
        {
            let known = HistoryPolicy::ALL
                .iter()
                .map(|policy| policy.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            bail!(
                "vehicles.history_policy in {} is {policy:?}; use one of: {known}",
                path.display()
            );
        }

        if let Some(level) = &self.logging.level
            && level.trim().is_empty()
        {
            bail!(
                "logging.level in {} must not be empty; use for example \"info\" or \"debug\"",
                path.display()
            );
        }

        Ok(())
    }

    pub fn api_base_url(&self) -> &str {
        self.api
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_API_BASE_URL)
            .trim_end_matches('/')
    }

    /// The configured key, or `PARKPAY_API_KEY` when the config leaves it
    /// empty.
    pub fn api_key(&self) -> String {
        match self.api.api_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => key.to_owned(),
            _ => env::var("PARKPAY_API_KEY").unwrap_or_default(),
        }
    }

    pub fn api_timeout(&self) -> Result<Duration> {
        parse_duration(self.api.timeout.as_deref().unwrap_or(DEFAULT_API_TIMEOUT))
    }

    pub fn db_path(&self) -> Result<PathBuf> {
        match &self.storage.db_path {
            Some(path) => Ok(PathBuf::from(path)),
            None => parkpay_db::default_db_path(),
        }
    }

    pub fn history_policy(&self) -> HistoryPolicy {
        self.vehicles
            .history_policy
            .as_deref()
            .and_then(HistoryPolicy::parse)
            .unwrap_or_default()
    }

    pub fn log_level(&self) -> &str {
        self.logging.level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL)
    }

    pub fn log_file(&self) -> Result<PathBuf> {
        if let Some(file) = &self.logging.file {
            return Ok(PathBuf::from(file));
        }
        let data_root = dirs::data_local_dir().ok_or_else(|| {
            anyhow!("cannot resolve data directory; set [logging].file to a writable path")
        })?;
        Ok(data_root.join(parkpay_db::APP_NAME).join(LOG_FILE_NAME))
    }

    pub fn example_config(path: &Path) -> String {
        format!(
            "# parkpay config\n# Place this file at: {}\n\nversion = 1\n\n[api]\nbase_url = \"{}\"\n# Optional. PARKPAY_API_KEY is used when this is empty.\napi_key = \"\"\ntimeout = \"{}\"\n\n[storage]\n# Optional. Default is platform data dir (for example ~/.local/share/parkpay/session.db)\n# db_path = \"/absolute/path/to/session.db\"\n\n[vehicles]\n# One of: omit-latest, omit-latest-when-inactive, keep-all\nhistory_policy = \"{}\"\n\n[logging]\nlevel = \"{}\"\n# file = \"/absolute/path/to/parkpay.log\"\n",
            path.display(),
            DEFAULT_API_BASE_URL,
            DEFAULT_API_TIMEOUT,
            HistoryPolicy::default().as_str(),
            DEFAULT_LOG_LEVEL,
        )
    }
}

fn parse_duration(raw: &str) -> Result<Duration> {
    let raw = raw.trim();
    let (count, unit): (&str, fn(u64) -> Duration) = if let Some(count) = raw.strip_suffix("ms")
    {
        (count, Duration::from_millis)
    } else if let Some(count) = raw.strip_suffix('s') {
        (count, Duration::from_secs)
    } else if let Some(count) = raw.strip_suffix('m') {
        (count, |minutes| Duration::from_secs(minutes.saturating_mul(60)))
    } else {
        bail!("invalid duration {raw:?}; use one of: <N>ms, <N>s, <N>m (for example 500ms or 10s)")
    };
    let count: u64 = count
        .parse()
        .with_context(|| format!("invalid timeout duration {raw:?} in [api].timeout"))?;
    Ok(unit(count))
}

#[cfg(test)]
mod tests {
    use super::{Config, parse_duration};
    use anyhow::Result;
    use parkpay_app::HistoryPolicy;
    use std::path::PathBuf;
    use std::sync::{Mutex, OnceLock};
    use std::time::Duration;

    fn write_config(content: &str) -> Result<(tempfile::TempDir, PathBuf)> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("config.toml");
        std::fs::write(&path, content)?;
        Ok((temp, path))
    }

    fn env_lock() -> std::sync::MutexGuard<'static, ()> {
        static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        match ENV_LOCK.get_or_init(|| Mutex::new(())).lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    #[test]
    fn missing_config_uses_defaults() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let config = Config::load(&temp.path().join("missing.toml"))?;
        assert_eq!(config.version, 1);
        assert_eq!(config.api_base_url(), "http://localhost:8080");
        assert_eq!(config.api_timeout()?, Duration::from_secs(10));
        assert_eq!(config.history_policy(), HistoryPolicy::default());
        assert_eq!(config.log_level(), "info");
        Ok(())
    }

    #[test]
    fn unversioned_config_is_rejected_with_actionable_message() -> Result<()> {
        let (_temp, path) = write_config("[api]\nbase_url=\"http://parking.local\"\n")?;
        let error = Config::load(&path).expect_err("unversioned config should fail");
        let message = error.to_string();
        assert!(message.contains("version = 1"));
        assert!(message.contains("[api], [storage], [vehicles], and [logging]"));
        Ok(())
    }

    #[test]
    fn v1_config_parses() -> Result<()> {
        let (_temp, path) = write_config(
            "version = 1\n[api]\nbase_url = \"http://parking.local:3000\"\napi_key = \"k-123\"\ntimeout = \"2s\"\n[vehicles]\nhistory_policy = \"keep-all\"\n[logging]\nlevel = \"debug\"\nfile = \"/tmp/parkpay-test.log\"\n",
        )?;

        let config = Config::load(&path)?;
        assert_eq!(config.api_base_url(), "http://parking.local:3000");
        assert_eq!(config.api_key(), "k-123");
        assert_eq!(config.api_timeout()?, Duration::from_secs(2));
        assert_eq!(config.history_policy(), HistoryPolicy::KeepAll);
        assert_eq!(config.log_level(), "debug");
        assert_eq!(config.log_file()?, PathBuf::from("/tmp/parkpay-test.log"));
        Ok(())
    }

    #[test]
    fn malformed_config_returns_parse_error() -> Result<()> {
        let (_temp, path) = write_config("{{not toml")?;
        let error = Config::load(&path).expect_err("malformed config should fail");
        assert!(error.to_string().contains("parse TOML config"));
        Ok(())
    }

    #[test]
    fn unsupported_config_version_is_rejected() -> Result<()> {
        let (_temp, path) = write_config("version = 3\n")?;
        let error = Config::load(&path).expect_err("v3 config should fail");
        assert!(error.to_string().contains("unsupported config version 3"));
        Ok(())
    }

    #[test]
    fn unknown_history_policy_lists_the_choices() -> Result<()> {
        let (_temp, path) = write_config("version = 1\n[vehicles]\nhistory_policy = \"newest\"\n")?;
        let error = Config::load(&path).expect_err("unknown policy should fail");
        let message = error.to_string();
        assert!(message.contains("vehicles.history_policy"));
        assert!(message.contains("omit-latest-when-inactive"));
        Ok(())
    }

    /// Runs `check` with `key` set, restoring an unset variable afterwards.
    fn with_env_var<T>(
        key: &str,
        value: impl AsRef<std::ffi::OsStr>,
        check: impl FnOnce() -> T,
    ) -> T {
        let _guard = env_lock();
        // SAFETY: env mutation is serialized by ENV_LOCK and undone below.
        unsafe {
            std::env::set_var(key, value);
        }
        let result = check();
        // SAFETY: same lock as above.
        unsafe {
            std::env::remove_var(key);
        }
        result
    }

    #[test]
    fn default_path_honors_env_override() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let override_path = temp.path().join("custom-config.toml");
        let resolved = with_env_var("PARKPAY_CONFIG_PATH", &override_path, Config::default_path)?;
        assert_eq!(resolved, override_path);
        Ok(())
    }

    #[test]
    fn api_key_source_prefers_config_then_env() -> Result<()> {
        let (_empty_dir, empty) = write_config("version = 1\n[api]\napi_key = \"\"\n")?;
        let (_set_dir, set) = write_config("version = 1\n[api]\napi_key = \"from-config\"\n")?;

        let (fallback, configured) = with_env_var("PARKPAY_API_KEY", "from-env", || {
            let fallback = Config::load(&empty)?.api_key();
            let configured = Config::load(&set)?.api_key();
            Ok::<_, anyhow::Error>((fallback, configured))
        })?;
        assert_eq!(fallback, "from-env");
        assert_eq!(configured, "from-config");
        Ok(())
    }

    #[test]
    fn db_path_uses_env_override_when_storage_db_path_missing() -> Result<()> {
        let (_temp, path) = write_config("version = 1\n")?;
        let resolved = with_env_var("PARKPAY_DB_PATH", "/from/env-only.db", || {
            Config::load(&path)?.db_path()
        })?;
        assert_eq!(resolved, PathBuf::from("/from/env-only.db"));
        Ok(())
    }

    #[test]
    fn db_path_rejects_uri_style_storage_value() -> Result<()> {
        let (_temp, path) =
            write_config("version = 1\n[storage]\ndb_path = \"https://evil.example/session.db\"\n")?;
        let error = Config::load(&path).expect_err("URI db_path should fail validation");
        let message = error.to_string();
        assert!(
            message.contains("looks like a URI") || message.contains("filesystem path"),
            "unexpected message: {message}"
        );
        Ok(())
    }

    #[test]
    fn api_base_url_trims_trailing_slashes() -> Result<()> {
        let (_temp, path) =
            write_config("version = 1\n[api]\nbase_url = \"http://parking.local///\"\n")?;
        let config = Config::load(&path)?;
        assert_eq!(config.api_base_url(), "http://parking.local");
        Ok(())
    }

    #[test]
    fn timeout_parses_ms_seconds_and_minutes() -> Result<()> {
        assert_eq!(parse_duration("500ms")?, Duration::from_millis(500));
        assert_eq!(parse_duration("5s")?, Duration::from_secs(5));
        assert_eq!(parse_duration("2m")?, Duration::from_secs(120));
        Ok(())
    }

    #[test]
    fn timeout_rejects_invalid_duration() {
        let error = parse_duration("soon").expect_err("invalid duration should fail");
        let message = error.to_string();
        assert!(
            message.contains("invalid duration") || message.contains("invalid timeout duration"),
            "unexpected message: {message}"
        );
    }

    #[test]
    fn zero_timeout_is_rejected() -> Result<()> {
        let (_temp, path) = write_config("version = 1\n[api]\ntimeout = \"0s\"\n")?;
        let error = Config::load(&path).expect_err("zero timeout should fail");
        assert!(error.to_string().contains("must be positive"));
        Ok(())
    }

    #[test]
    fn example_config_round_trips_through_load() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("config.toml");
        let example = Config::example_config(&path);
        assert!(example.contains("[api]"));
        assert!(example.contains("[vehicles]"));
        std::fs::write(&path, example)?;
        let config = Config::load(&path)?;
        assert_eq!(config.history_policy(), HistoryPolicy::default());
        Ok(())
    }
}
