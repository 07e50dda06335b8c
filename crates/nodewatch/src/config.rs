use std::{env, fmt, fs, path, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::probe::TransportPolicy;
use crate::reporting::RetryPolicy;
use crate::scheduler::OverlapPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}")]
    ReadFailed(String),
    #[error("failed to write config file {0}")]
    WriteFailed(String),
    #[error("failed to parse config: {0}")]
    ParseFailed(String),
    #[error("no config directory available (set XDG_CONFIG_HOME or HOME)")]
    ConfigPathUnavailable,
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub coordinator: Coordinator,
    pub probe: Probe,
    pub schedule: Schedule,
    pub storage: Storage,
    pub retry: Retry,
    pub location: Location,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Coordinator {
    pub base_url: String,
    pub request_timeout_secs: u64,
    pub token_path: path::PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Probe {
    pub timeout_ms: u64,
    pub max_concurrency: usize,
    pub transport: TransportPolicy,
    pub proxies: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Schedule {
    pub probe_interval_secs: u64,
    pub heartbeat_interval_secs: u64,
    pub points_interval_secs: u64,
    pub overlap: OverlapPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Storage {
    pub ledger_path: path::PathBuf,
    pub history_path: Option<path::PathBuf>,
    pub history_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Retry {
    pub heartbeat_attempts: u32,
    pub heartbeat_backoff_secs: u64,
    pub report_attempts: u32,
    pub report_backoff_secs: u64,
    pub node_list_attempts: u32,
    pub node_list_backoff_secs: u64,
    pub points_attempts: u32,
    pub points_backoff_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Location {
    pub enabled: bool,
    pub lookup_url: String,
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// $XDG_CONFIG_HOME/nodewatch or $HOME/.config/nodewatch
fn config_dir() -> Option<path::PathBuf> {
    if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        Some(path::PathBuf::from(config_home).join("nodewatch"))
    } else {
        env::var("HOME").ok().map(|home| path::PathBuf::from(home).join(".config/nodewatch"))
    }
}

fn default_config_path() -> Result<path::PathBuf, ConfigError> {
    config_dir().map(|dir| dir.join("config.toml")).ok_or(ConfigError::ConfigPathUnavailable)
}

fn data_file(name: &str) -> path::PathBuf {
    config_dir().map(|dir| dir.join(name)).unwrap_or_else(|| path::PathBuf::from(name))
}

impl Default for Coordinator {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".into(),
            request_timeout_secs: 10,
            token_path: data_file("token"),
        }
    }
}

impl Default for Probe {
    fn default() -> Self {
        Self {
            timeout_ms: crate::DEFAULT_PROBE_TIMEOUT_MS,
            max_concurrency: 32,
            transport: TransportPolicy::Direct,
            proxies: Vec::new(),
        }
    }
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            probe_interval_secs: 30 * 60,
            heartbeat_interval_secs: 5 * 60,
            points_interval_secs: 60,
            overlap: OverlapPolicy::Skip,
        }
    }
}

impl Default for Storage {
    fn default() -> Self {
        Self {
            ledger_path: data_file("uptime.json"),
            history_path: None,
            history_limit: crate::history::DEFAULT_HISTORY_LIMIT,
        }
    }
}

impl Default for Retry {
    fn default() -> Self {
        Self {
            heartbeat_attempts: 3,
            heartbeat_backoff_secs: 5,
            report_attempts: 1,
            report_backoff_secs: 0,
            node_list_attempts: 1,
            node_list_backoff_secs: 0,
            points_attempts: 1,
            points_backoff_secs: 0,
        }
    }
}

impl Default for Location {
    fn default() -> Self {
        Self { enabled: true, lookup_url: crate::location::DEFAULT_LOOKUP_URL.into() }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            coordinator: Coordinator::default(),
            probe: Probe::default(),
            schedule: Schedule::default(),
            storage: Storage::default(),
            retry: Retry::default(),
            location: Location::default(),
        }
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };

        let write_title_1 = write_title_indented(1);
        let write_1 = write_indented(1);

        writeln!(f, "Current Agent Configuration:")?;
        write_title_1(f, "Coordinator")?;
        write_1(f, "Base URL", &self.coordinator.base_url)?;
        write_1(f, "Request Timeout (s)", &self.coordinator.request_timeout_secs)?;
        write_1(f, "Token Path", &self.coordinator.token_path.display())?;
        write_title_1(f, "Probe")?;
        write_1(f, "Timeout (ms)", &self.probe.timeout_ms)?;
        write_1(f, "Max Concurrency", &self.probe.max_concurrency)?;
        write_1(f, "Transport", &self.probe.transport)?;
        write_1(f, "Proxies", &self.probe.proxies.len())?;
        write_title_1(f, "Schedule")?;
        write_1(f, "Probe Interval (s)", &self.schedule.probe_interval_secs)?;
        write_1(f, "Heartbeat Interval (s)", &self.schedule.heartbeat_interval_secs)?;
        write_1(f, "Points Interval (s)", &self.schedule.points_interval_secs)?;
        write_1(f, "Overlap", &self.schedule.overlap)?;
        write_title_1(f, "Storage")?;
        write_1(f, "Ledger", &self.storage.ledger_path.display())?;
        match &self.storage.history_path {
            Some(history) => write_1(f, "History", &history.display())?,
            None => write_1(f, "History", &"disabled")?,
        }
        write_title_1(f, "Retry")?;
        write_1(
            f,
            "Heartbeat",
            &format!("{} x {}s", self.retry.heartbeat_attempts, self.retry.heartbeat_backoff_secs),
        )?;
        write_1(
            f,
            "Report",
            &format!("{} x {}s", self.retry.report_attempts, self.retry.report_backoff_secs),
        )?;
        write_1(
            f,
            "Node list",
            &format!("{} x {}s", self.retry.node_list_attempts, self.retry.node_list_backoff_secs),
        )?;
        write_1(
            f,
            "Points",
            &format!("{} x {}s", self.retry.points_attempts, self.retry.points_backoff_secs),
        )?;
        write_title_1(f, "Location")?;
        write_1(f, "Enabled", &self.location.enabled)?;

        Ok(())
    }
}

impl Config {
    /// Generate Config structure from file
    ///
    /// Creates a default config in ~/.config/nodewatch/config.toml
    /// or the specified path if one does not exist, then applies
    /// environment overrides and validates the result.
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, ConfigError> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        let mut config = if config_path.exists() {
            let raw_string = fs::read_to_string(&config_path)
                .map_err(|_err| ConfigError::ReadFailed(config_path.display().to_string()))?;
            toml::from_str(raw_string.as_str())
                .map_err(|err| ConfigError::ParseFailed(err.to_string()))?
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            tracing::info!("Wrote default config to {}", config_path.display());
            config
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &path::Path) -> Result<(), ConfigError> {
        let config_str: String = toml::to_string_pretty(self)
            .map_err(|err| ConfigError::ParseFailed(err.to_string()))?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|_err| ConfigError::WriteFailed(path.display().to_string()))?;
        }

        fs::write(path, config_str).map_err(|_err| ConfigError::WriteFailed(path.display().to_string()))
    }

    /// NODEWATCH_COORDINATOR_URL, NODEWATCH_TOKEN_PATH and
    /// NODEWATCH_LEDGER_PATH win over the file.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = env::var("NODEWATCH_COORDINATOR_URL") {
            self.coordinator.base_url = url;
        }
        if let Ok(token_path) = env::var("NODEWATCH_TOKEN_PATH") {
            self.coordinator.token_path = token_path.into();
        }
        if let Ok(ledger_path) = env::var("NODEWATCH_LEDGER_PATH") {
            self.storage.ledger_path = ledger_path.into();
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        url::Url::parse(&self.coordinator.base_url)
            .map_err(|err| ConfigError::Invalid(format!("coordinator.base_url: {err}")))?;

        let non_zero = [
            ("coordinator.request_timeout_secs", self.coordinator.request_timeout_secs),
            ("probe.timeout_ms", self.probe.timeout_ms),
            ("probe.max_concurrency", self.probe.max_concurrency as u64),
            ("schedule.probe_interval_secs", self.schedule.probe_interval_secs),
            ("schedule.heartbeat_interval_secs", self.schedule.heartbeat_interval_secs),
            ("schedule.points_interval_secs", self.schedule.points_interval_secs),
        ];
        if let Some((name, _)) = non_zero.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::Invalid(format!("{name} must be greater than zero")));
        }

        if self.probe.transport.needs_proxies() && self.probe.proxies.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "probe.transport = {} requires at least one proxy",
                self.probe.transport
            )));
        }

        Ok(())
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe.timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.coordinator.request_timeout_secs)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.schedule.probe_interval_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.schedule.heartbeat_interval_secs)
    }

    pub fn points_interval(&self) -> Duration {
        Duration::from_secs(self.schedule.points_interval_secs)
    }

    pub fn heartbeat_retry(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry.heartbeat_attempts,
            Duration::from_secs(self.retry.heartbeat_backoff_secs),
        )
    }

    pub fn report_retry(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry.report_attempts, Duration::from_secs(self.retry.report_backoff_secs))
    }

    pub fn node_list_retry(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry.node_list_attempts,
            Duration::from_secs(self.retry.node_list_backoff_secs),
        )
    }

    pub fn points_retry(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry.points_attempts, Duration::from_secs(self.retry.points_backoff_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_match_cadences() {
        let config = Config::default();
        assert_eq!(config.probe_interval(), Duration::from_secs(1800));
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(300));
        assert_eq!(config.points_interval(), Duration::from_secs(60));
        assert_eq!(config.probe_timeout(), Duration::from_millis(5000));
        assert_eq!(config.schedule.overlap, OverlapPolicy::Skip);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_writes_default() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("agent.toml");

        let config = Config::from_config(Some(&path)).unwrap();
        assert!(path.exists());
        assert_eq!(config.storage.history_limit, 100);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("agent.toml");
        fs::write(
            &path,
            "[coordinator]\nbase_url = \"https://coord.example\"\n\n[probe]\ntimeout_ms = 2500\n",
        )
        .unwrap();

        let config = Config::from_config(Some(&path)).unwrap();
        assert_eq!(config.probe.timeout_ms, 2500);
        assert_eq!(config.probe.max_concurrency, 32);
        assert_eq!(config.coordinator.request_timeout_secs, 10);
    }

    #[test]
    fn test_fetch_retries_are_configurable() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("agent.toml");
        fs::write(&path, "[retry]\nnode_list_attempts = 4\npoints_backoff_secs = 2\n").unwrap();

        let config = Config::from_config(Some(&path)).unwrap();
        assert_eq!(config.node_list_retry(), RetryPolicy::new(4, Duration::ZERO));
        assert_eq!(config.points_retry(), RetryPolicy::new(1, Duration::from_secs(2)));
        assert_eq!(config.heartbeat_retry(), RetryPolicy::new(3, Duration::from_secs(5)));
    }

    #[test]
    fn test_extension_is_normalized() {
        let normalized = normalize_toml_path(path::Path::new("/tmp/agent"));
        assert_eq!(normalized, path::PathBuf::from("/tmp/agent.toml"));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut config = Config::default();
        config.schedule.heartbeat_interval_secs = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_proxy_policy_without_proxies_rejected() {
        let mut config = Config::default();
        config.probe.transport = TransportPolicy::Random;
        assert!(config.validate().is_err());

        config.probe.proxies = vec!["http://proxy.example:8080".into()];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_display_lists_sections() {
        let rendered = Config::default().to_string();
        assert!(rendered.contains("Coordinator"));
        assert!(rendered.contains("Probe Interval (s): 1800"));
    }
}
