//! Application-level configuration loading: default groups, paging and the
//! synchronization scope.

use std::{env, fs, io::ErrorKind, path::PathBuf};

use serde::Deserialize;
use tracing::{info, warn};

use crate::{
    dao::models::{Category, GroupEntity, group_id_from_name},
    state::{registry::default_groups, standings::GroupUniverse},
};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "SCOREBOARD_BACK_CONFIG_PATH";
const DEFAULT_PAGE_SIZE: usize = 10;
const DEFAULT_CACHE_DIR: &str = "data/cache";

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Groups written to an empty group collection, in display order.
    pub default_groups: Vec<GroupEntity>,
    pub page_size: usize,
    pub group_universe: GroupUniverse,
    /// Restrict the score subscription to one category.
    pub category_filter: Option<Category>,
    /// Directory of the local fallback cache; `None` keeps it in memory.
    pub cache_dir: Option<PathBuf>,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        groups = app_config.default_groups.len(),
                        page_size = app_config.page_size,
                        "loaded configuration"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_groups: default_groups(),
            page_size: DEFAULT_PAGE_SIZE,
            group_universe: GroupUniverse::default(),
            category_filter: None,
            cache_dir: Some(PathBuf::from(DEFAULT_CACHE_DIR)),
        }
    }
}

#[derive(Debug, Deserialize)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    #[serde(default)]
    default_groups: Option<Vec<RawGroup>>,
    #[serde(default)]
    page_size: Option<usize>,
    #[serde(default)]
    group_universe: Option<GroupUniverse>,
    #[serde(default)]
    category_filter: Option<Category>,
    #[serde(default = "default_cache_dir")]
    cache_dir: Option<PathBuf>,
}

fn default_cache_dir() -> Option<PathBuf> {
    Some(PathBuf::from(DEFAULT_CACHE_DIR))
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let default_groups = match value.default_groups {
            Some(groups) if !groups.is_empty() => groups.into_iter().map(Into::into).collect(),
            _ => default_groups(),
        };
        Self {
            default_groups,
            page_size: value
                .page_size
                .filter(|size| *size > 0)
                .unwrap_or(DEFAULT_PAGE_SIZE),
            group_universe: value.group_universe.unwrap_or_default(),
            category_filter: value.category_filter,
            cache_dir: value.cache_dir,
        }
    }
}

#[derive(Debug, Deserialize)]
/// JSON representation of a default group entry.
struct RawGroup {
    name: String,
    color: String,
}

impl From<RawGroup> for GroupEntity {
    fn from(value: RawGroup) -> Self {
        let name = value.name.trim().to_owned();
        Self {
            id: group_id_from_name(&name),
            name,
            color: value.color,
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let raw: RawConfig = serde_json::from_str(
            r##"{
                "default_groups": [{"name": "Red Wolves", "color": "#ff0000"}],
                "group_universe": "defaults",
                "category_filter": "Sports"
            }"##,
        )
        .unwrap();
        let config = AppConfig::from(raw);

        assert_eq!(config.default_groups.len(), 1);
        assert_eq!(config.default_groups[0].id, "RedWolves");
        assert_eq!(config.group_universe, GroupUniverse::Defaults);
        assert_eq!(config.category_filter, Some(Category::Sports));
        assert_eq!(config.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(config.cache_dir, Some(PathBuf::from(DEFAULT_CACHE_DIR)));
    }

    #[test]
    fn null_cache_dir_selects_memory_cache_and_zero_page_size_is_ignored() {
        let raw: RawConfig =
            serde_json::from_str(r#"{"cache_dir": null, "page_size": 0}"#).unwrap();
        let config = AppConfig::from(raw);

        assert_eq!(config.cache_dir, None);
        assert_eq!(config.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(config.default_groups, default_groups());
    }
}
