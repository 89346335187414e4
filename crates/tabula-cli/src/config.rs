// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tabula_app::{
    DEFAULT_DEBOUNCE, DEFAULT_PAGE_SIZE, DEFAULT_PREFETCH_PAGES, DEFAULT_ROW_HEIGHT, WindowConfig,
};

const CONFIG_VERSION: i64 = 1;
const DEFAULT_DEBOUNCE_TEXT: &str = "150ms";
const MAX_DEBOUNCE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub version: i64,
    #[serde(default)]
    pub storage: Storage,
    #[serde(default)]
    pub view: ViewSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            storage: Storage::default(),
            view: ViewSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Storage {
    pub db_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ViewSettings {
    pub page_size: Option<usize>,
    pub prefetch_pages: Option<usize>,
    pub debounce: Option<String>,
    pub row_height: Option<u32>,
}

impl Default for ViewSettings {
    fn default() -> Self {
        Self {
            page_size: Some(DEFAULT_PAGE_SIZE),
            prefetch_pages: Some(DEFAULT_PREFETCH_PAGES),
            debounce: Some(DEFAULT_DEBOUNCE_TEXT.to_owned()),
            row_height: Some(DEFAULT_ROW_HEIGHT),
        }
    }
}

impl Config {
    pub fn default_path() -> Result<PathBuf> {
        if let Some(path) = env::var_os("TABULA_CONFIG_PATH") {
            return Ok(PathBuf::from(path));
        }

        let config_root = dirs::config_dir().ok_or_else(|| {
            anyhow!("cannot resolve config directory; set TABULA_CONFIG_PATH to the config file")
        })?;

        let app_dir = config_root.join(tabula_db::APP_NAME);
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
                    "config file {} is not versioned. Add `version = 1` and put values under [storage] and [view]",
                    path.display()
                )
            })?;

        if version != CONFIG_VERSION {
            bail!(
                "unsupported config version {} in {}; expected version = 1",
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
            tabula_db::validate_db_path(db_path)?;
        }

        if self.view.page_size == Some(0) {
            bail!("view.page_size in {} must be positive, got 0", path.display());
        }

        if self.view.row_height == Some(0) {
            bail!("view.row_height in {} must be positive, got 0", path.display());
        }

        if let Some(debounce) = &self.view.debounce {
            let parsed = parse_duration(debounce)?;
            if parsed.is_zero() || parsed > MAX_DEBOUNCE {
                bail!(
                    "view.debounce in {} must be between 1ms and 1s, got {}",
                    path.display(),
                    debounce
                );
            }
        }

        Ok(())
    }

    pub fn db_path(&self) -> Result<PathBuf> {
        match &self.storage.db_path {
            Some(path) => Ok(PathBuf::from(path)),
            None => tabula_db::default_db_path(),
        }
    }

    pub fn window_config(&self) -> Result<WindowConfig> {
        let debounce = match &self.view.debounce {
            Some(raw) => parse_duration(raw)?,
            None => DEFAULT_DEBOUNCE,
        };
        Ok(WindowConfig {
            page_size: self.view.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
            prefetch_pages: self.view.prefetch_pages.unwrap_or(DEFAULT_PREFETCH_PAGES),
            debounce,
        })
    }

    pub fn row_height(&self) -> u32 {
        self.view.row_height.unwrap_or(DEFAULT_ROW_HEIGHT)
    }

    pub fn example_config(path: &Path) -> String {
        format!(
            "# tabula config\n# Place this file at: {}\n\nversion = 1\n\n[storage]\n# Optional. Default is platform data dir (for example ~/.local/share/tabula/tabula.db)\n# db_path = \"/absolute/path/to/tabula.db\"\n\n[view]\npage_size = {}\nprefetch_pages = {}\ndebounce = \"{}\"\nrow_height = {}\n",
            path.display(),
            DEFAULT_PAGE_SIZE,
            DEFAULT_PREFETCH_PAGES,
            DEFAULT_DEBOUNCE_TEXT,
            DEFAULT_ROW_HEIGHT,
        )
    }
}

fn parse_duration(raw: &str) -> Result<Duration> {
    if let Some(value) = raw.strip_suffix("ms") {
        let millis: u64 = value
            .parse()
            .with_context(|| format!("invalid debounce duration {raw:?}"))?;
        return Ok(Duration::from_millis(millis));
    }
    if let Some(value) = raw.strip_suffix('s') {
        let secs: u64 = value
            .parse()
            .with_context(|| format!("invalid debounce duration {raw:?}"))?;
        return Ok(Duration::from_secs(secs));
    }
    if let Some(value) = raw.strip_suffix('m') {
        let mins: u64 = value
            .parse()
            .with_context(|| format!("invalid debounce duration {raw:?}"))?;
        return Ok(Duration::from_secs(mins * 60));
    }

    bail!("invalid duration {raw:?}; use one of: <N>ms, <N>s, <N>m (for example 150ms)")
}

#[cfg(test)]
mod tests {
    use super::{Config, parse_duration};
    use anyhow::Result;
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
        let window = config.window_config()?;
        assert_eq!(window.page_size, 100);
        assert_eq!(window.prefetch_pages, 1);
        assert_eq!(window.debounce, Duration::from_millis(150));
        assert_eq!(config.row_height(), 32);
        Ok(())
    }

    #[test]
    fn unversioned_config_is_rejected_with_actionable_message() -> Result<()> {
        let (_temp, path) = write_config("[view]\npage_size = 50\n")?;
        let error = Config::load(&path).expect_err("unversioned config should fail");
        let message = error.to_string();
        assert!(message.contains("version = 1"));
        assert!(message.contains("[storage] and [view]"));
        Ok(())
    }

    #[test]
    fn view_section_parses() -> Result<()> {
        let (_temp, path) = write_config(
            "version = 1\n[view]\npage_size = 40\nprefetch_pages = 2\ndebounce = \"80ms\"\nrow_height = 24\n",
        )?;
        let config = Config::load(&path)?;
        let window = config.window_config()?;
        assert_eq!(window.page_size, 40);
        assert_eq!(window.prefetch_pages, 2);
        assert_eq!(window.debounce, Duration::from_millis(80));
        assert_eq!(config.row_height(), 24);
        Ok(())
    }

    #[test]
    fn partial_view_section_falls_back_per_key() -> Result<()> {
        let (_temp, path) = write_config("version = 1\n[view]\npage_size = 25\n")?;
        let config = Config::load(&path)?;
        let window = config.window_config()?;
        assert_eq!(window.page_size, 25);
        assert_eq!(window.prefetch_pages, 1);
        assert_eq!(window.debounce, Duration::from_millis(150));
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
    fn out_of_range_view_values_name_the_key() -> Result<()> {
        let (_temp, path) = write_config("version = 1\n[view]\npage_size = 0\n")?;
        let error = Config::load(&path).expect_err("zero page size should fail");
        assert!(error.to_string().contains("view.page_size"));

        let (_temp, path) = write_config("version = 1\n[view]\nrow_height = 0\n")?;
        let error = Config::load(&path).expect_err("zero row height should fail");
        assert!(error.to_string().contains("view.row_height"));

        let (_temp, path) = write_config("version = 1\n[view]\ndebounce = \"2s\"\n")?;
        let error = Config::load(&path).expect_err("long debounce should fail");
        assert!(error.to_string().contains("view.debounce"));

        let (_temp, path) = write_config("version = 1\n[view]\ndebounce = \"0ms\"\n")?;
        let error = Config::load(&path).expect_err("zero debounce should fail");
        assert!(error.to_string().contains("between 1ms and 1s"));
        Ok(())
    }

    #[test]
    fn default_path_honors_env_override() -> Result<()> {
        let _guard = env_lock();
        let temp = tempfile::tempdir()?;
        let override_path = temp.path().join("custom-config.toml");
        // SAFETY: test-only process-local env mutation.
        unsafe {
            std::env::set_var("TABULA_CONFIG_PATH", &override_path);
        }
        let resolved = Config::default_path()?;
        // SAFETY: test cleanup for process-local env mutation.
        unsafe {
            std::env::remove_var("TABULA_CONFIG_PATH");
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
            std::env::set_var("TABULA_DB_PATH", "/from/env.db");
        }
        let config = Config::load(&path)?;
        // SAFETY: test cleanup for process-local env mutation.
        unsafe {
            std::env::remove_var("TABULA_DB_PATH");
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
            std::env::set_var("TABULA_DB_PATH", "/from/env-only.db");
        }
        let config = Config::load(&path)?;
        let resolved = config.db_path()?;
        // SAFETY: test cleanup for process-local env mutation.
        unsafe {
            std::env::remove_var("TABULA_DB_PATH");
        }
        assert_eq!(resolved, PathBuf::from("/from/env-only.db"));
        Ok(())
    }

    #[test]
    fn db_path_rejects_uri_style_storage_value() -> Result<()> {
        let (_temp, path) =
            write_config("version = 1\n[storage]\ndb_path = \"https://evil.example/tabula.db\"\n")?;
        let error = Config::load(&path).expect_err("URI db_path should fail validation");
        assert!(error.to_string().contains("looks like a URI"));
        Ok(())
    }

    #[test]
    fn durations_parse_ms_seconds_and_minutes() -> Result<()> {
        assert_eq!(parse_duration("150ms")?, Duration::from_millis(150));
        assert_eq!(parse_duration("1s")?, Duration::from_secs(1));
        assert_eq!(parse_duration("2m")?, Duration::from_secs(120));
        assert!(parse_duration("soon").is_err());
        Ok(())
    }

    #[test]
    fn example_config_round_trips() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("config.toml");
        std::fs::write(&path, Config::example_config(&path))?;
        let config = Config::load(&path)?;
        assert_eq!(config.window_config()?, Config::default().window_config()?);
        Ok(())
    }
}
