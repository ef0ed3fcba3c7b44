//! Configuration types.
//!
//! Everything is read once from the environment at startup and passed down
//! explicitly. Nothing in the pipeline reads ambient flags.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Default number of sentences the thread summary is asked to fit in.
pub const DEFAULT_SUMMARY_MAX_SENTENCES: usize = 4;

/// Default number of unread messages pulled per batch.
pub const DEFAULT_BATCH_SIZE: usize = 5;

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct TriageConfig {
    /// Transmit generated replies instead of only drafting them.
    pub auto_send: bool,
    /// Upper bound on thread summary length, passed to the model as an instruction.
    pub summary_max_sentences: usize,
    /// How many unread messages one batch fetches.
    pub batch_size: usize,
    /// How many distinct threads may be processed at once (1 = sequential).
    pub max_concurrent_threads: usize,
    /// Poll interval for the background loop. `None` runs a single batch.
    pub poll_interval: Option<Duration>,
    /// Location of the libSQL database file.
    pub db_path: PathBuf,
    /// Port for the HTTP API. `None` disables it.
    pub api_port: Option<u16>,
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            auto_send: false,
            summary_max_sentences: DEFAULT_SUMMARY_MAX_SENTENCES,
            batch_size: DEFAULT_BATCH_SIZE,
            max_concurrent_threads: 1,
            poll_interval: None,
            db_path: PathBuf::from("./data/inbox-triage.db"),
            api_port: None,
        }
    }
}

impl TriageConfig {
    /// Build config from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup (tests pass a map).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let auto_send = match lookup("TRIAGE_AUTO_SEND") {
            Some(raw) => parse_bool("TRIAGE_AUTO_SEND", &raw)?,
            None => defaults.auto_send,
        };

        let summary_max_sentences: usize = parse_or("TRIAGE_SUMMARY_MAX_SENTENCES", &lookup)?
            .unwrap_or(defaults.summary_max_sentences);
        if summary_max_sentences == 0 {
            return Err(ConfigError::InvalidValue {
                key: "TRIAGE_SUMMARY_MAX_SENTENCES".into(),
                message: "must be at least 1".into(),
            });
        }

        let batch_size: usize =
            parse_or("TRIAGE_BATCH_SIZE", &lookup)?.unwrap_or(defaults.batch_size);

        let max_concurrent_threads: usize = parse_or("TRIAGE_MAX_CONCURRENT_THREADS", &lookup)?
            .unwrap_or(defaults.max_concurrent_threads)
            .max(1);

        let poll_interval = parse_or::<u64>("TRIAGE_POLL_INTERVAL_SECS", &lookup)?
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        let db_path = lookup("TRIAGE_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.db_path);

        let api_port: Option<u16> = parse_or("TRIAGE_API_PORT", &lookup)?;

        Ok(Self {
            auto_send,
            summary_max_sentences,
            batch_size,
            max_concurrent_threads,
            poll_interval,
            db_path,
            api_port,
        })
    }
}

/// Read a required secret from the lookup.
pub(crate) fn require_secret(
    key: &str,
    lookup: &impl Fn(&str) -> Option<String>,
) -> Result<SecretString, ConfigError> {
    lookup(key)
        .filter(|v| !v.trim().is_empty())
        .map(SecretString::from)
        .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}

fn parse_or<T>(
    key: &str,
    lookup: &impl Fn(&str) -> Option<String>,
) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("'{raw}': {e}"),
            }),
        None => Ok(None),
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected a boolean, got '{other}'"),
        }),
    }
}
