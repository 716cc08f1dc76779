use std::{env, time::Duration};

use super::error::{CouchDaoError, CouchResult};

const DEFAULT_DATABASE: &str = "scoreboard";
const DEFAULT_CHANGES_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection settings of the CouchDB document store.
#[derive(Debug, Clone)]
pub struct CouchConfig {
    pub base_url: String,
    pub database: String,
    /// Basic-auth pair; both halves must be set for it to apply.
    pub credentials: Option<(String, String)>,
    /// How long a longpoll `_changes` request may stay open.
    pub changes_timeout: Duration,
}

impl CouchConfig {
    pub fn new(base_url: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            database: database.into(),
            credentials: None,
            changes_timeout: DEFAULT_CHANGES_TIMEOUT,
        }
    }

    /// Read `COUCH_BASE_URL` (required), `COUCH_DB`, the
    /// `COUCH_USERNAME`/`COUCH_PASSWORD` pair and `COUCH_CHANGES_TIMEOUT_MS`.
    pub fn from_env() -> CouchResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> CouchResult<Self> {
        let base_url = lookup("COUCH_BASE_URL")
            .filter(|url| !url.trim().is_empty())
            .ok_or(CouchDaoError::MissingEnvVar {
                var: "COUCH_BASE_URL",
            })?;
        let database = lookup("COUCH_DB").unwrap_or_else(|| DEFAULT_DATABASE.to_owned());

        let mut config = Self::new(base_url, database);
        config.credentials = lookup("COUCH_USERNAME").zip(lookup("COUCH_PASSWORD"));
        if let Some(timeout) = lookup("COUCH_CHANGES_TIMEOUT_MS")
            .and_then(|value| value.parse::<u64>().ok())
            .filter(|millis| *millis > 0)
        {
            config.changes_timeout = Duration::from_millis(timeout);
        }
        Ok(config)
    }
}
