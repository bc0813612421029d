use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::FeedError;

/// Adaptive backoff bounds for the polling fallback, in milliseconds.
///
/// `current` starts at `min_ms`, grows by `step_ms` on every unchanged poll
/// result, is capped at `max_ms`, and resets to `min_ms` on any change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollConfig {
    /// Default: 2000
    #[serde(default = "default_poll_min_ms")]
    pub min_ms: u64,

    /// Default: 10000
    #[serde(default = "default_poll_max_ms")]
    pub max_ms: u64,

    /// Default: 2000
    #[serde(default = "default_poll_step_ms")]
    pub step_ms: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            min_ms: default_poll_min_ms(),
            max_ms: default_poll_max_ms(),
            step_ms: default_poll_step_ms(),
        }
    }
}

/// Endpoint and behavior configuration for the delivery subsystem.
///
/// Read from the `[feed]` section of a TOML config file. All URLs are
/// passed through to the caller-supplied fetcher untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Long-lived push stream endpoint.
    /// Default: `/user/events`
    #[serde(default = "default_push_url")]
    pub push_url: String,

    /// Notification count poll endpoint, returns `{"new": <count>}`.
    /// Default: `/notifications/new`
    #[serde(default = "default_count_url")]
    pub count_url: String,

    /// Notification table fragment endpoint; the fragment echoes the
    /// request's sequence number in a `data-sequence-number` attribute.
    /// Default: `/notifications/table`
    #[serde(default = "default_table_url")]
    pub table_url: String,

    /// Active-stopwatch poll endpoint, returns a JSON array of records.
    /// Default: `/user/stopwatches`
    #[serde(default = "default_stopwatch_url")]
    pub stopwatch_url: String,

    /// Where to navigate after a remote logout tears the session down.
    /// Default: `/`
    #[serde(default = "default_landing_url")]
    pub landing_url: String,

    #[serde(default)]
    pub poll: PollConfig,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            push_url: default_push_url(),
            count_url: default_count_url(),
            table_url: default_table_url(),
            stopwatch_url: default_stopwatch_url(),
            landing_url: default_landing_url(),
            poll: PollConfig::default(),
        }
    }
}

impl FeedConfig {
    /// Validate configuration values.
    ///
    /// Called after loading to catch misconfiguration early.
    pub fn validate(&self) -> Result<(), FeedError> {
        if self.poll.min_ms == 0 {
            return Err(FeedError::ConfigInvalid(
                "poll.min_ms must be > 0".to_string(),
            ));
        }
        if self.poll.step_ms == 0 {
            return Err(FeedError::ConfigInvalid(
                "poll.step_ms must be > 0".to_string(),
            ));
        }
        if self.poll.max_ms < self.poll.min_ms {
            return Err(FeedError::ConfigInvalid(
                "poll.max_ms must be >= poll.min_ms".to_string(),
            ));
        }
        for (name, url) in [
            ("push_url", &self.push_url),
            ("count_url", &self.count_url),
            ("table_url", &self.table_url),
            ("stopwatch_url", &self.stopwatch_url),
            ("landing_url", &self.landing_url),
        ] {
            if url.is_empty() {
                return Err(FeedError::ConfigInvalid(format!("{} must not be empty", name)));
            }
        }
        Ok(())
    }
}

/// Top-level config file shape. Only the `[feed]` section is ours.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    feed: Option<FeedConfig>,
}

/// Load feed configuration from a TOML file.
///
/// A missing file, missing `[feed]` section, or unparseable file all fall
/// back to defaults (with a warning for the latter) — a broken config must
/// not take live updates down with it. Invalid values are still rejected.
pub fn load_feed_config(path: &Path) -> Result<FeedConfig, FeedError> {
    let config = match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str::<ConfigFile>(&contents) {
            Ok(file) => file.feed.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(
                    event = "feed.config.parse_failed",
                    path = %path.display(),
                    error = %e,
                );
                FeedConfig::default()
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => FeedConfig::default(),
        Err(e) => {
            tracing::warn!(
                event = "feed.config.read_failed",
                path = %path.display(),
                error = %e,
            );
            FeedConfig::default()
        }
    };
    config.validate()?;
    Ok(config)
}

fn default_push_url() -> String {
    "/user/events".to_string()
}

fn default_count_url() -> String {
    "/notifications/new".to_string()
}

fn default_table_url() -> String {
    "/notifications/table".to_string()
}

fn default_stopwatch_url() -> String {
    "/user/stopwatches".to_string()
}

fn default_landing_url() -> String {
    "/".to_string()
}

fn default_poll_min_ms() -> u64 {
    2000
}

fn default_poll_max_ms() -> u64 {
    10_000
}

fn default_poll_step_ms() -> u64 {
    2000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = FeedConfig::default();
        assert_eq!(config.poll.min_ms, 2000);
        assert_eq!(config.poll.max_ms, 10_000);
        assert_eq!(config.poll.step_ms, 2000);
        assert_eq!(config.push_url, "/user/events");
        config.validate().unwrap();
    }

    #[test]
    fn test_load_from_toml() {
        let toml = r#"
[feed]
push_url = "/hub/events"

[feed.poll]
min_ms = 1000
max_ms = 5000
"#;
        let file: ConfigFile = toml::from_str(toml).unwrap();
        let config = file.feed.unwrap();
        assert_eq!(config.push_url, "/hub/events");
        assert_eq!(config.poll.min_ms, 1000);
        assert_eq!(config.poll.max_ms, 5000);
        // Defaults for unset fields
        assert_eq!(config.poll.step_ms, 2000);
        assert_eq!(config.count_url, "/notifications/new");
    }

    #[test]
    fn test_load_missing_section_falls_back() {
        let toml = r#"
[ui]
theme = "dark"
"#;
        let file: ConfigFile = toml::from_str(toml).unwrap();
        assert!(file.feed.is_none());
    }

    #[test]
    fn test_validate_rejects_zero_min() {
        let mut config = FeedConfig::default();
        config.poll.min_ms = 0;
        let err = config.validate().unwrap_err();
        assert_eq!(err.error_code(), "config_invalid");
    }

    #[test]
    fn test_validate_rejects_max_below_min() {
        let mut config = FeedConfig::default();
        config.poll.max_ms = 1000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_url() {
        let mut config = FeedConfig::default();
        config.landing_url = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_feed_config_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_feed_config(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config.poll.min_ms, 2000);
    }

    #[test]
    fn test_load_feed_config_garbage_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "not [valid toml").unwrap();
        let config = load_feed_config(&path).unwrap();
        assert_eq!(config.push_url, "/user/events");
    }
}
