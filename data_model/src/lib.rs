use std::fmt::{Display, Formatter};

use serde_derive::{Deserialize, Serialize};
use thiserror::Error;

/// Highest value a battery level can take, as a percentage
pub const FULL_BATTERY: u8 = 100;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("Battery level {0} is out of range (max: {FULL_BATTERY})")]
    BatteryOutOfRange(u8),
    #[error("Status '{status}' does not match battery level {battery_level}")]
    StatusMismatch { status: Status, battery_level: u8 },
}

/// The status a clamp reports to the server
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Clamp is charged and free to be applied to a vehicle
    #[default]
    Available,
    /// Clamp is currently applied to a vehicle
    Applied,
    /// Clamp has been released after payment
    Unlocked,
    /// Clamp has detected tampering
    Tampered,
    /// Battery is exhausted
    LowBattery,
}

impl Status {
    /// The status to hold for a given battery level, starting from `self`
    fn for_battery(self, battery_level: u8) -> Status {
        match (self, battery_level) {
            (_, 0) => Status::LowBattery,
            (Status::LowBattery, _) => Status::Available,
            (status, _) => status,
        }
    }
}

impl Display for Status {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Available => write!(f, "available"),
            Status::Applied => write!(f, "applied"),
            Status::Unlocked => write!(f, "unlocked"),
            Status::Tampered => write!(f, "tampered"),
            Status::LowBattery => write!(f, "low_battery"),
        }
    }
}

/// A [ClampStatus] as read off the wire, before it is checked
#[derive(Deserialize)]
struct RawClampStatus {
    clamp_id: String,
    status: Status,
    city: String,
    battery_level: u8,
}

/// State of one clamp, as sent in each status report.
///
/// Field order is the order of keys in the serialized JSON object.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(try_from = "RawClampStatus")]
pub struct ClampStatus {
    clamp_id: String,
    status: Status,
    city: String,
    battery_level: u8,
}

impl ClampStatus {
    /// Create a new record. A battery level of zero always starts out as [Status::LowBattery]
    pub fn new(
        clamp_id: impl Into<String>,
        city: impl Into<String>,
        battery_level: u8,
        status: Status,
    ) -> Result<Self, RecordError> {
        if battery_level > FULL_BATTERY {
            return Err(RecordError::BatteryOutOfRange(battery_level));
        }

        Ok(ClampStatus {
            clamp_id: clamp_id.into(),
            status: status.for_battery(battery_level),
            city: city.into(),
            battery_level,
        })
    }

    pub fn clamp_id(&self) -> &str {
        &self.clamp_id
    }

    pub fn city(&self) -> &str {
        &self.city
    }

    pub fn battery_level(&self) -> u8 {
        self.battery_level
    }

    pub fn status(&self) -> Status {
        self.status
    }

    /// Drain the simulated battery by one percent, stopping at zero
    pub fn tick(&mut self) {
        self.battery_level = self.battery_level.saturating_sub(1);
        self.status = self.status.for_battery(self.battery_level);
    }
}

impl TryFrom<RawClampStatus> for ClampStatus {
    type Error = RecordError;

    /// Unlike [ClampStatus::new], a status that disagrees with the battery level is rejected
    fn try_from(raw: RawClampStatus) -> Result<Self, Self::Error> {
        let record = ClampStatus::new(raw.clamp_id, raw.city, raw.battery_level, raw.status)?;
        if record.status != raw.status {
            return Err(RecordError::StatusMismatch {
                status: raw.status,
                battery_level: raw.battery_level,
            });
        }
        Ok(record)
    }
}

impl Display for ClampStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({}): {}, battery {}%",
            self.clamp_id, self.city, self.status, self.battery_level
        )
    }
}
