// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use roster_app::{DEFAULT_HISTORY_DEPTH, Identity};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_VERSION: i64 = 1;
const DEFAULT_POLL_INTERVAL: &str = "2s";
const DEFAULT_LOG_LEVEL: &str = "warn";
const MAX_HISTORY_DEPTH: i64 = 1000;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub version: i64,
    #[serde(default)]
    pub storage: Storage,
    #[serde(default)]
    pub sheet: Sheet,
    #[serde(default)]
    pub sync: Polling,
    #[serde(default)]
    pub auth: Auth,
    #[serde(default)]
    pub log: Log,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            storage: Storage::default(),
            sheet: Sheet::default(),
            sync: Polling::default(),
            auth: Auth::default(),
            log: Log::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Storage {
    pub db_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Sheet {
    pub history_depth: Option<i64>,
}

impl Default for Sheet {
    fn default() -> Self {
        Self {
            history_depth: Some(DEFAULT_HISTORY_DEPTH as i64),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Polling {
    pub poll_interval: Option<String>,
}

impl Default for Polling {
    fn default() -> Self {
        Self {
            poll_interval: Some(DEFAULT_POLL_INTERVAL.to_owned()),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Auth {
    pub user_id: Option<String>,
    pub display_name: Option<String>,
    pub admin: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Log {
    pub level: Option<String>,
    pub file: Option<String>,
}

impl Config {
    pub fn default_path() -> Result<PathBuf> {
        if let Some(path) = env::var_os("ROSTER_CONFIG_PATH") {
            return Ok(PathBuf::from(path));
        }

        let config_root = dirs::config_dir().ok_or_else(|| {
            anyhow!("cannot resolve config directory; set ROSTER_CONFIG_PATH to the config file")
        })?;

        let app_dir = config_root.join(roster_db::APP_NAME);
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
                    "config file {} has no version; add `version = 1` at the top and keep values under [storage], [sheet], [sync], [auth] and [log]",
                    path.display()
                )
            })?;

        if version != CONFIG_VERSION {
            bail!(
                "unsupported config version {} in {}; expected version = 1 -- regenerate with `roster --print-example-config` and retry",
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
        if let Some(db_path) = &self.storage.db_path {
            roster_db::validate_db_path(db_path)?;
        }

        if let Some(depth) = self.sheet.history_depth
            && !(1..=MAX_HISTORY_DEPTH).contains(&depth)
        {
            bail!(
                "sheet.history_depth in {} must be between 1 and {MAX_HISTORY_DEPTH}, got {depth}",
                path.display()
            );
        }

        if let Some(interval) = &self.sync.poll_interval {
            let parsed = parse_duration(interval)?;
            if parsed <= Duration::ZERO {
                bail!(
                    "sync.poll_interval in {} must be positive, got {}",
                    path.display(),
                    interval
                );
            }
        }

        if let Some(level) = &self.log.level
            && !matches!(
                level.as_str(),
                "error" | "warn" | "info" | "debug" | "trace" | "off"
            )
        {
            bail!(
                "log.level in {} must be one of error, warn, info, debug, trace, off; got {level:?}",
                path.display()
            );
        }

        if let Some(user_id) = &self.auth.user_id
            && user_id.trim().is_empty()
        {
            bail!(
                "auth.user_id in {} is blank -- remove it or set a non-empty id",
                path.display()
            );
        }

        Ok(())
    }

    pub fn db_path(&self) -> Result<PathBuf> {
        match &self.storage.db_path {
            Some(path) => Ok(PathBuf::from(path)),
            None => roster_db::default_db_path(),
        }
    }

    pub fn history_depth(&self) -> usize {
        self.sheet
            .history_depth
            .and_then(|depth| usize::try_from(depth).ok())
            .unwrap_or(DEFAULT_HISTORY_DEPTH)
    }

    pub fn poll_interval(&self) -> Result<Duration> {
        parse_duration(
            self.sync
                .poll_interval
                .as_deref()
                .unwrap_or(DEFAULT_POLL_INTERVAL),
        )
    }

    pub fn identity(&self) -> Identity {
        let fallback = Identity::default();
        Identity {
            user_id: self
                .auth
                .user_id
                .as_deref()
                .map(str::trim)
                .map(str::to_owned)
                .unwrap_or(fallback.user_id),
            display_name: self
                .auth
                .display_name
                .clone()
                .unwrap_or(fallback.display_name),
            is_admin: self.auth.admin.unwrap_or(fallback.is_admin),
        }
    }

    pub fn log_level(&self) -> &str {
        self.log.level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL)
    }

    pub fn log_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.log.file {
            return Ok(PathBuf::from(path));
        }
        let data_root = dirs::data_local_dir().ok_or_else(|| {
            anyhow!("cannot resolve data directory; set [log].file in the config")
        })?;
        Ok(data_root.join(roster_db::APP_NAME).join("roster.log"))
    }

    pub fn example_config(path: &Path) -> String {
        format!(
            "# roster config\n# Place this file at: {}\n\nversion = 1\n\n[storage]\n# Optional. Default is the platform data dir (for example ~/.local/share/roster/roster.db)\n# db_path = \"/absolute/path/to/roster.db\"\n\n[sheet]\n# Undo steps kept per open roster\nhistory_depth = {}\n\n[sync]\n# How often to look for changes made by other admins: <N>ms, <N>s or <N>m\npoll_interval = \"{}\"\n\n[auth]\n# user_id = \"local\"\n# display_name = \"admin\"\nadmin = true\n\n[log]\n# RUST_LOG overrides this\nlevel = \"{}\"\n# file = \"/absolute/path/to/roster.log\"\n",
            path.display(),
            DEFAULT_HISTORY_DEPTH,
            DEFAULT_POLL_INTERVAL,
            DEFAULT_LOG_LEVEL,
        )
    }
}

fn parse_duration(raw: &str) -> Result<Duration> {
    if let Some(value) = raw.strip_suffix("ms") {
        let millis: u64 = value
            .parse()
            .with_context(|| format!("invalid duration {raw:?}"))?;
        return Ok(Duration::from_millis(millis));
    }
    if let Some(value) = raw.strip_suffix('s') {
        let secs: u64 = value
            .parse()
            .with_context(|| format!("invalid duration {raw:?}"))?;
        return Ok(Duration::from_secs(secs));
    }
    if let Some(value) = raw.strip_suffix('m') {
        let mins: u64 = value
            .parse()
            .with_context(|| format!("invalid duration {raw:?}"))?;
        return Ok(Duration::from_secs(mins * 60));
    }

    bail!("invalid duration {raw:?}; use one of: <N>ms, <N>s, <N>m (for example 500ms or 2s)")
}

#[cfg(test)]
mod tests {
    use super::{Config, parse_duration};
    use anyhow::Result;
    use roster_app::DEFAULT_HISTORY_DEPTH;
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
        assert_eq!(config.history_depth(), DEFAULT_HISTORY_DEPTH);
        assert_eq!(config.poll_interval()?, Duration::from_secs(2));
        assert_eq!(config.log_level(), "warn");
        assert!(config.identity().is_admin);
        Ok(())
    }

    #[test]
    fn unversioned_config_is_rejected_with_actionable_message() -> Result<()> {
        let (_temp, path) = write_config("[sheet]\nhistory_depth = 5\n")?;
        let error = Config::load(&path).expect_err("unversioned config should fail");
        let message = error.to_string();
        assert!(message.contains("version = 1"));
        assert!(message.contains("[storage], [sheet], [sync], [auth] and [log]"));
        Ok(())
    }

    #[test]
    fn full_config_parses() -> Result<()> {
        let (_temp, path) = write_config(
            "version = 1\n[sheet]\nhistory_depth = 25\n[sync]\npoll_interval = \"500ms\"\n[auth]\nuser_id = \"u-42\"\ndisplay_name = \"Sam\"\nadmin = false\n[log]\nlevel = \"debug\"\nfile = \"/tmp/roster-test.log\"\n",
        )?;

        let config = Config::load(&path)?;
        assert_eq!(config.history_depth(), 25);
        assert_eq!(config.poll_interval()?, Duration::from_millis(500));
        let identity = config.identity();
        assert_eq!(identity.user_id, "u-42");
        assert_eq!(identity.display_name, "Sam");
        assert!(!identity.is_admin);
        assert_eq!(config.log_level(), "debug");
        assert_eq!(config.log_path()?, PathBuf::from("/tmp/roster-test.log"));
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
        let (_temp, path) = write_config("version = 2\n")?;
        let error = Config::load(&path).expect_err("v2 config should fail");
        assert!(error.to_string().contains("unsupported config version 2"));
        Ok(())
    }

    #[test]
    fn history_depth_bounds_are_validated() -> Result<()> {
        let (_temp, path) = write_config("version = 1\n[sheet]\nhistory_depth = 0\n")?;
        let error = Config::load(&path).expect_err("zero depth should fail");
        assert!(error.to_string().contains("must be between 1 and"));
        Ok(())
    }

    #[test]
    fn poll_interval_must_be_positive() -> Result<()> {
        let (_temp, path) = write_config("version = 1\n[sync]\npoll_interval = \"0s\"\n")?;
        let error = Config::load(&path).expect_err("zero interval should fail");
        assert!(error.to_string().contains("must be positive"));
        Ok(())
    }

    #[test]
    fn unknown_log_level_is_rejected() -> Result<()> {
        let (_temp, path) = write_config("version = 1\n[log]\nlevel = \"loud\"\n")?;
        let error = Config::load(&path).expect_err("bad level should fail");
        assert!(error.to_string().contains("log.level"));
        Ok(())
    }

    #[test]
    fn blank_user_id_is_rejected() -> Result<()> {
        let (_temp, path) = write_config("version = 1\n[auth]\nuser_id = \"  \"\n")?;
        let error = Config::load(&path).expect_err("blank user id should fail");
        assert!(error.to_string().contains("auth.user_id"));
        Ok(())
    }

    #[test]
    fn durations_parse_ms_seconds_and_minutes() -> Result<()> {
        assert_eq!(parse_duration("500ms")?, Duration::from_millis(500));
        assert_eq!(parse_duration("5s")?, Duration::from_secs(5));
        assert_eq!(parse_duration("2m")?, Duration::from_secs(120));
        let error = parse_duration("soon").expect_err("invalid duration should fail");
        assert!(error.to_string().contains("invalid duration"));
        Ok(())
    }

    #[test]
    fn default_path_honors_env_override() -> Result<()> {
        let _guard = env_lock();
        let temp = tempfile::tempdir()?;
        let override_path = temp.path().join("custom-config.toml");
        // SAFETY: test-only process-local env mutation.
        unsafe {
            std::env::set_var("ROSTER_CONFIG_PATH", &override_path);
        }
        let resolved = Config::default_path()?;
        // SAFETY: test cleanup for process-local env mutation.
        unsafe {
            std::env::remove_var("ROSTER_CONFIG_PATH");
        }
        assert_eq!(resolved, override_path);
        Ok(())
    }

    #[test]
    fn db_path_prefers_storage_config_over_env_override() -> Result<()> {
        let _guard = env_lock();
        let (_temp, path) =
            write_config("version = 1\n[storage]\ndb_path = \"/explicit/from-config.db\"\n")?;
        // SAFETY: test-only process-local env mutation.
        unsafe {
            std::env::set_var("ROSTER_DB_PATH", "/from/env.db");
        }
        let config = Config::load(&path)?;
        // SAFETY: test cleanup for process-local env mutation.
        unsafe {
            std::env::remove_var("ROSTER_DB_PATH");
        }
        assert_eq!(config.db_path()?, PathBuf::from("/explicit/from-config.db"));
        Ok(())
    }

    #[test]
    fn db_path_uses_env_override_when_storage_db_path_missing() -> Result<()> {
        let _guard = env_lock();
        let (_temp, path) = write_config("version = 1\n")?;
        // SAFETY: test-only process-local env mutation.
        unsafe {
            std::env::set_var("ROSTER_DB_PATH", "/from/env-only.db");
        }
        let config = Config::load(&path)?;
        let resolved = config.db_path()?;
        // SAFETY: test cleanup for process-local env mutation.
        unsafe {
            std::env::remove_var("ROSTER_DB_PATH");
        }
        assert_eq!(resolved, PathBuf::from("/from/env-only.db"));
        Ok(())
    }

    #[test]
    fn db_path_rejects_uri_style_storage_value() -> Result<()> {
        let (_temp, path) =
            write_config("version = 1\n[storage]\ndb_path = \"https://evil.example/roster.db\"\n")?;
        let error = Config::load(&path).expect_err("URI db_path should fail validation");
        let message = error.to_string();
        assert!(
            message.contains("looks like a URI") || message.contains("filesystem path"),
            "unexpected message: {message}"
        );
        Ok(())
    }

    #[test]
    fn example_config_round_trips_through_load() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("config.toml");
        std::fs::write(&path, Config::example_config(&path))?;
        let config = Config::load(&path)?;
        assert_eq!(config.history_depth(), DEFAULT_HISTORY_DEPTH);
        for section in ["[storage]", "[sheet]", "[sync]", "[auth]", "[log]"] {
            assert!(Config::example_config(&path).contains(section), "{section}");
        }
        Ok(())
    }
}
