//! ---
//! rhome_section: "01-core-functionality"
//! rhome_subsection: "module"
//! rhome_type: "source"
//! rhome_scope: "code"
//! rhome_description: "Shared configuration and logging for rhome services."
//! rhome_version: "v0.1.0"
//! rhome_owner: "tbd"
//! ---
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::{NaiveTime, Weekday};
use indexmap::IndexMap;
use rhome_msg::{Endpoint, MessageTypes, RefNumGenerator};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr, DurationMilliSeconds, DurationSeconds};
use tracing::debug;
use tracing::level_filters::LevelFilter;

use crate::logging::LogFormat;

fn default_heartbeat_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_busy_poll() -> Duration {
    Duration::from_millis(10)
}

fn default_idle_poll() -> Duration {
    Duration::from_millis(200)
}

fn default_ref_start() -> u64 {
    RefNumGenerator::DEFAULT_START
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::Pretty
}

fn default_console_level() -> LevelFilter {
    LevelFilter::INFO
}

fn default_retain_files() -> usize {
    4
}

/// Primary configuration object for a schedule service node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub service: ServiceConfig,
    #[serde(default)]
    pub peers: IndexMap<String, Endpoint>,
    pub message_types: MessageTypes,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    pub source: PathBuf,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &str = "RHOME_CONFIG";

    /// Load configuration from disk, respecting the `RHOME_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(path.clone())?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(path.clone())?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    fn from_path(path: PathBuf) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<AppConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Heartbeat destinations in declaration order.
    pub fn peer_endpoints(&self) -> Vec<Endpoint> {
        self.peers.values().cloned().collect()
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        validate_endpoint("service", &self.service.endpoint())?;
        for (name, peer) in &self.peers {
            validate_endpoint(&format!("peer '{}'", name), peer)?;
        }
        self.message_types
            .validate()
            .context("invalid [message_types] table")?;
        self.dispatch.validate()?;
        self.schedule.validate()?;
        Ok(())
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

fn validate_endpoint(label: &str, endpoint: &Endpoint) -> Result<()> {
    for (part, value) in [("addr", &endpoint.addr), ("port", &endpoint.port)] {
        if value.trim().is_empty() {
            return Err(anyhow!("{} {} must not be empty", label, part));
        }
    }
    endpoint
        .validate()
        .with_context(|| format!("{} cannot be written into a message line", label))
}

/// This node's own endpoint, stamped as the source of outgoing heartbeats.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub addr: String,
    pub port: String,
    /// Socket the TCP transport listens on. No transport starts when unset.
    #[serde(default)]
    pub listen: Option<SocketAddr>,
}

impl ServiceConfig {
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.addr.clone(), self.port.clone())
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    #[serde(default = "default_heartbeat_interval")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub heartbeat_interval: Duration,
    #[serde(default = "default_busy_poll")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub busy_poll_ms: Duration,
    #[serde(default = "default_idle_poll")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub idle_poll_ms: Duration,
    #[serde(default = "default_ref_start")]
    pub ref_start: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: default_heartbeat_interval(),
            busy_poll_ms: default_busy_poll(),
            idle_poll_ms: default_idle_poll(),
            ref_start: default_ref_start(),
        }
    }
}

impl DispatchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.heartbeat_interval.is_zero() {
            return Err(anyhow!("dispatch heartbeat_interval must be greater than zero"));
        }
        if self.busy_poll_ms.is_zero() || self.idle_poll_ms.is_zero() {
            return Err(anyhow!("dispatch poll intervals must be greater than zero"));
        }
        Ok(())
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
    #[serde(default = "default_console_level")]
    #[serde_as(as = "DisplayFromStr")]
    pub console_level: LevelFilter,
    #[serde(default = "default_retain_files")]
    pub retain_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
            console_level: default_console_level(),
            retain_files: default_retain_files(),
        }
    }
}

/// Per-device power windows consulted by the static schedule.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default)]
    pub devices: IndexMap<String, Vec<ScheduleWindow>>,
}

impl ScheduleConfig {
    pub fn validate(&self) -> Result<()> {
        for (device, windows) in &self.devices {
            if device.is_empty() || device.contains(',') {
                return Err(anyhow!("schedule device name '{}' is not usable on the wire", device));
            }
            for (index, window) in windows.iter().enumerate() {
                if window.on == window.off {
                    return Err(anyhow!(
                        "schedule window {} for device '{}' has identical on/off times",
                        index,
                        device
                    ));
                }
            }
        }
        Ok(())
    }
}

/// One `[on, off)` interval of local time. An `off` earlier than `on` runs
/// past midnight into the following day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleWindow {
    /// Days the window starts on; empty means every day.
    #[serde(default)]
    pub days: Vec<Weekday>,
    #[serde(with = "clock_time")]
    pub on: NaiveTime,
    #[serde(with = "clock_time")]
    pub off: NaiveTime,
}

mod clock_time {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%H:%M";

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveTime::parse_from_str(&raw, FORMAT).map_err(serde::de::Error::custom)
    }
}
