use std::io;
use std::time::Duration;

use data_model::RecordError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Could not parse toml config file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Invalid report url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Invalid device record: {0}")]
    Record(#[from] RecordError),

    #[error("Could not associate with '{ssid}': {reason}")]
    Association { ssid: String, reason: String },

    #[error("Link to '{ssid}' not up after {elapsed:?}")]
    LinkTimeout { ssid: String, elapsed: Duration },

    #[error("Could not serialize report: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Transport error: {0}")]
    Transport(#[from] curl::Error),

    #[error("Could not install signal handler: {0}")]
    Signal(#[from] ctrlc::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
