use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::Deserialize;

use crate::storage::StoreOptions;

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Config {
    pub database: Option<PathBuf>,
    /// Default tracing filter when `RUST_LOG` is unset.
    pub log_filter: Option<String>,
    #[serde(default)]
    pub access: AccessSection,
    #[serde(default)]
    pub calendar: CalendarSection,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AccessSection {
    #[serde(default = "default_auto_grant")]
    pub auto_grant: bool,
    /// Humantime duration such as "30s" or "2m".
    pub timeout: Option<String>,
}

impl Default for AccessSection {
    fn default() -> Self {
        Self {
            auto_grant: default_auto_grant(),
            timeout: None,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct CalendarSection {
    pub default_name: Option<String>,
}

fn default_auto_grant() -> bool {
    true
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("dev", "calendar-bridge", "calendar-bridge")
}

/// Loads `explicit` (which must exist) or the optional platform config file.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => match project_dirs() {
            Some(dirs) => {
                let path = dirs.config_dir().join("config.toml");
                if !path.exists() {
                    return Ok(Config::default());
                }
                path
            }
            None => return Ok(Config::default()),
        },
    };

    let contents = fs::read_to_string(&path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let cfg: Config = toml::from_str(&contents)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(cfg)
}

pub fn resolve_database_path(input: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = input {
        return Ok(path);
    }

    if let Some(project_dirs) = project_dirs() {
        let mut path = project_dirs.data_dir().to_path_buf();
        path.push("calendar.db");
        Ok(path)
    } else {
        Ok(PathBuf::from("calendar.db"))
    }
}

impl Config {
    pub fn access_timeout(&self) -> Result<Option<Duration>> {
        self.access
            .timeout
            .as_deref()
            .map(|value| {
                humantime::parse_duration(value)
                    .map_err(|err| anyhow!("invalid access timeout '{value}': {err}"))
            })
            .transpose()
    }

    pub fn store_options(&self) -> StoreOptions {
        let defaults = StoreOptions::default();
        StoreOptions {
            auto_grant: self.access.auto_grant,
            default_calendar_name: self
                .calendar
                .default_name
                .clone()
                .unwrap_or(defaults.default_calendar_name),
        }
    }
}
