use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use data_model::{ClampStatus, Status, FULL_BATTERY};
use log::info;
#[cfg(feature = "config-file")]
use log::warn;
use serde_derive::{Deserialize, Serialize};
use url::Url;

use crate::error::Result;
use crate::link::{RetryPolicy, WifiCredentials};

pub const CONFIG_FILE_NAME: &str = "clampmon.toml";

/// Config compiled into the binary, used when no config file is found at run time
const BUNDLED_CONFIG: &str = include_str!("../../clampmon.toml");

const DEFAULT_PORT: u16 = 80;
const DEFAULT_PATH: &str = "/api/clamp_status_update";
const DEFAULT_PERIOD_SECONDS: u64 = 5;
const DEFAULT_SETTLE_SECONDS: u64 = 2;
const DEFAULT_TIMEOUT_SECONDS: u64 = 10;
const DEFAULT_POLL_MILLIS: u64 = 500;
const DEFAULT_MAX_BACKOFF_MILLIS: u64 = 30_000;
const DEFAULT_LINK_TIMEOUT_SECONDS: u64 = 120;

fn full_battery() -> u8 {
    FULL_BATTERY
}

/// The clamp this device simulates
#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct DeviceSpec {
    pub clamp_id: String,
    pub city: String,
    #[serde(default = "full_battery")]
    pub battery_level: u8,
    #[serde(default)]
    pub status: Status,
}

/// The wifi network to join
#[derive(Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct SsidSpec {
    pub ssid_name: String,
    pub ssid_pass: String,
}

/// Where and how often to send reports
#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct ReportSpec {
    pub host: String,
    pub port: Option<u16>,
    pub path: Option<String>,
    pub period_seconds: Option<u64>,
    /// Delay between the link coming up and the first report
    pub settle_seconds: Option<u64>,
    /// Transport timeout for one report
    pub timeout_seconds: Option<u64>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Default)]
pub enum RetrySpec {
    /// Poll the link at a fixed interval until it is up, with no time limit
    #[default]
    Forever,
    /// Back off exponentially between polls and give up after a timeout
    Bounded {
        initial_millis: Option<u64>,
        max_millis: Option<u64>,
        timeout_seconds: Option<u64>,
    },
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct LinkSpec {
    pub poll_millis: Option<u64>,
    pub retry: Option<RetrySpec>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct Config {
    pub device: DeviceSpec,
    pub wifi: SsidSpec,
    pub report: ReportSpec,
    #[serde(default)]
    pub link: LinkSpec,
}

impl Config {
    /// Full url reports are POSTed to: `http://{host}:{port}{path}`
    pub fn report_url(&self) -> Result<Url> {
        let path = self.report.path.as_deref().unwrap_or(DEFAULT_PATH);
        let separator = if path.starts_with('/') { "" } else { "/" };
        let url_string = format!(
            "http://{}:{}{separator}{path}",
            self.report.host,
            self.report.port.unwrap_or(DEFAULT_PORT),
        );
        Ok(Url::parse(&url_string)?)
    }

    pub fn period_duration(&self) -> Duration {
        Duration::from_secs(self.report.period_seconds.unwrap_or(DEFAULT_PERIOD_SECONDS))
    }

    pub fn settle_duration(&self) -> Duration {
        Duration::from_secs(self.report.settle_seconds.unwrap_or(DEFAULT_SETTLE_SECONDS))
    }

    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs(self.report.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECONDS))
    }

    pub fn credentials(&self) -> WifiCredentials {
        WifiCredentials {
            ssid: self.wifi.ssid_name.clone(),
            password: self.wifi.ssid_pass.clone(),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let poll = Duration::from_millis(self.link.poll_millis.unwrap_or(DEFAULT_POLL_MILLIS));
        match self.link.retry.as_ref().unwrap_or(&RetrySpec::Forever) {
            RetrySpec::Forever => RetryPolicy::Forever { poll },
            RetrySpec::Bounded {
                initial_millis,
                max_millis,
                timeout_seconds,
            } => RetryPolicy::Bounded {
                initial: initial_millis.map(Duration::from_millis).unwrap_or(poll),
                max: Duration::from_millis(max_millis.unwrap_or(DEFAULT_MAX_BACKOFF_MILLIS)),
                timeout: Duration::from_secs(
                    timeout_seconds.unwrap_or(DEFAULT_LINK_TIMEOUT_SECONDS),
                ),
            },
        }
    }

    /// The initial state of the simulated clamp
    pub fn initial_status(&self) -> Result<ClampStatus> {
        Ok(ClampStatus::new(
            self.device.clamp_id.as_str(),
            self.device.city.as_str(),
            self.device.battery_level,
            self.device.status,
        )?)
    }

    /// Check that everything derived from the raw config is usable
    fn validate(self) -> Result<Self> {
        self.report_url()?;
        self.initial_status()?;
        Ok(self)
    }
}

pub fn find_config_file(file_name: &str) -> Option<PathBuf> {
    let mut dir = env::current_dir().ok();

    // Loop until no parent directory exists. (i.e. stop at "/")
    while let Some(directory) = dir {
        let config_path = directory.join(file_name);

        if config_path.exists() {
            return Some(config_path);
        }

        dir = directory.parent().map(|p| p.to_path_buf());
    }

    None
}

pub fn parse_config(config_string: &str) -> Result<Config> {
    let config: Config = toml::from_str(config_string)?;
    config.validate()
}

pub fn read_config(config_file_path: &Path) -> Result<Config> {
    let config_string = std::fs::read_to_string(config_file_path)?;
    parse_config(&config_string)
}

pub fn bundled_config() -> Result<Config> {
    parse_config(BUNDLED_CONFIG)
}

/// The config compiled into the binary, unless the "config-file" feature is enabled and a
/// config file is found at run time
pub fn load_config() -> Result<Config> {
    #[cfg(feature = "config-file")]
    {
        if let Some(path) = find_config_file(CONFIG_FILE_NAME) {
            warn!(
                "Overriding bundled config (device, wifi credentials, server) with: \"{}\"",
                path.display()
            );
            return read_config(&path);
        }
    }

    info!("Using bundled config");
    bundled_config()
}
