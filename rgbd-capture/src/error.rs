//! Error types for driver backends and the capture pipeline.

use rgbd_data::ProfileUid;
use thiserror::Error;

/// Failures reported by a driver backend.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("Failed to open sensor: {0}")]
    OpenFailed(String),

    #[error("Failed to start sensor: {0}")]
    StartFailed(String),

    #[error("Failed to stop sensor: {0}")]
    StopFailed(String),

    #[error("Failed to close sensor: {0}")]
    CloseFailed(String),

    #[error("Option not supported: {0}")]
    OptionUnsupported(&'static str),

    #[error("Invalid sensor state: {0}")]
    InvalidState(String),
}

/// Errors surfaced by discovery, registration, and the capture loop.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Device {serial}, sensor '{sensor}': {source}")]
    Driver {
        serial: String,
        sensor: String,
        #[source]
        source: DriverError,
    },

    #[error("Device enumeration failed: {0}")]
    Enumeration(#[source] DriverError),

    #[error("Frame arrived on unregistered profile {0}")]
    UnregisteredProfile(ProfileUid),

    #[error("Profile {uid} already registered to {existing}, cannot assign to {serial}")]
    ConflictingProfile {
        uid: ProfileUid,
        existing: String,
        serial: String,
    },

    #[error("Session is {actual}, expected {expected}")]
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },
}

impl CaptureError {
    /// Attach the device and sensor a driver failure came from.
    pub fn driver(serial: &str, sensor: &str, source: DriverError) -> Self {
        CaptureError::Driver {
            serial: serial.to_string(),
            sensor: sensor.to_string(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, CaptureError>;
