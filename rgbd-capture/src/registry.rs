//! Profile UID to device serial number lookup used to attribute frames.

use crate::driver::Sensor;
use crate::error::{CaptureError, Result};
use crate::matcher::DeviceRecord;
use rgbd_data::ProfileUid;
use std::collections::HashMap;
use tracing::debug;

/// Maps every selected profile back to the device that owns it.
///
/// Built once after matching and only read while capturing.
#[derive(Debug, Clone, Default)]
pub struct DeviceRegistry {
    entries: HashMap<ProfileUid, String>,
}

impl DeviceRegistry {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity),
        }
    }

    /// Two entries per record: its color profile and its depth profile.
    pub fn from_records<S: Sensor>(records: &[DeviceRecord<S>]) -> Result<Self> {
        let mut registry = Self::with_capacity(records.len() * 2);
        for record in records {
            registry.register(record.color.uid(), &record.serial_number)?;
            registry.register(record.depth.uid(), &record.serial_number)?;
        }
        debug!("Registry built with {} profile(s)", registry.len());
        Ok(registry)
    }

    /// Associate `uid` with `serial`.
    ///
    /// Registering the same pair twice is a no-op; claiming a UID already
    /// owned by another device is rejected.
    pub fn register(&mut self, uid: ProfileUid, serial: &str) -> Result<()> {
        match self.entries.get(&uid) {
            Some(existing) if existing == serial => Ok(()),
            Some(existing) => Err(CaptureError::ConflictingProfile {
                uid,
                existing: existing.clone(),
                serial: serial.to_string(),
            }),
            None => {
                self.entries.insert(uid, serial.to_string());
                Ok(())
            }
        }
    }

    /// Serial number owning `uid`.
    ///
    /// A miss means a frame arrived on a stream this session never opened.
    pub fn resolve(&self, uid: ProfileUid) -> Result<&str> {
        self.entries
            .get(&uid)
            .map(String::as_str)
            .ok_or(CaptureError::UnregisteredProfile(uid))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Profile UIDs owned by `serial`, sorted.
    pub fn profiles_of(&self, serial: &str) -> Vec<ProfileUid> {
        let mut uids: Vec<ProfileUid> = self
            .entries
            .iter()
            .filter(|(_, owner)| owner.as_str() == serial)
            .map(|(uid, _)| *uid)
            .collect();
        uids.sort();
        uids
    }
}
