//! Per-device color/depth profile selection.

use crate::driver::{Context, Device, Sensor, SensorOf, StreamProfile};
use crate::error::{CaptureError, Result};
use rgbd_data::{ProfileUid, StreamKind, VideoMode};
use tracing::{info, warn};

/// A selected profile together with the sensor that offers it.
#[derive(Clone)]
pub struct StreamBinding<S: Sensor> {
    /// Position of the sensor in its device's enumeration order.
    pub sensor_index: usize,
    pub sensor: S,
    pub profile: S::Profile,
}

impl<S: Sensor> StreamBinding<S> {
    pub fn uid(&self) -> ProfileUid {
        self.profile.descriptor().uid
    }
}

/// A device with both a matching color and a matching depth profile.
#[derive(Clone)]
pub struct DeviceRecord<S: Sensor> {
    pub serial_number: String,
    pub color: StreamBinding<S>,
    pub depth: StreamBinding<S>,
}

impl<S: Sensor> DeviceRecord<S> {
    /// True when one sensor offers both selected profiles.
    pub fn shares_sensor(&self) -> bool {
        self.color.sensor_index == self.depth.sensor_index
    }
}

/// Select the first matching color and depth profile on every device.
///
/// Devices are returned in discovery order. A device missing either kind
/// is excluded with a warning; finding nothing is not an error.
#[tracing::instrument(skip_all, fields(target = %target))]
pub fn match_devices<C: Context>(
    context: &C,
    target: VideoMode,
) -> Result<Vec<DeviceRecord<SensorOf<C>>>> {
    let devices = context
        .query_devices()
        .map_err(CaptureError::Enumeration)?;

    let mut records = Vec::with_capacity(devices.len());
    for (index, device) in devices.iter().enumerate() {
        if let Some(record) = match_device(index, device, target)? {
            records.push(record);
        }
    }

    info!(
        "{} of {} device(s) offer color and depth at {}",
        records.len(),
        devices.len(),
        target
    );
    Ok(records)
}

fn match_device<D: Device>(
    index: usize,
    device: &D,
    target: VideoMode,
) -> Result<Option<DeviceRecord<D::Sensor>>> {
    let serial = device
        .serial_number()
        .map_err(CaptureError::Enumeration)?;
    info!("Device {}: serial {}", index, serial);

    let sensors = device
        .query_sensors()
        .map_err(|e| CaptureError::driver(&serial, "*", e))?;

    let mut color: Option<StreamBinding<D::Sensor>> = None;
    let mut depth: Option<StreamBinding<D::Sensor>> = None;

    for (sensor_index, sensor) in sensors.iter().enumerate() {
        let name = sensor.name();
        let profiles = sensor
            .stream_profiles()
            .map_err(|e| CaptureError::driver(&serial, &name, e))?;

        for profile in profiles {
            let desc = profile.descriptor();
            if !target.matches(desc.width, desc.height, desc.fps) {
                continue;
            }
            let slot = match desc.kind {
                StreamKind::Color => &mut color,
                StreamKind::Depth => &mut depth,
                _ => continue,
            };
            if slot.is_none() {
                info!("  Found {} profile on sensor '{}'", desc.kind, name);
                *slot = Some(StreamBinding {
                    sensor_index,
                    sensor: sensor.clone(),
                    profile,
                });
            }
        }

        if color.is_some() && depth.is_some() {
            break;
        }
    }

    match (color, depth) {
        (Some(color), Some(depth)) => Ok(Some(DeviceRecord {
            serial_number: serial,
            color,
            depth,
        })),
        (color, depth) => {
            warn!(
                "Device {} ({}) is missing a {} profile at {}, excluding it",
                index,
                serial,
                match (color.is_some(), depth.is_some()) {
                    (true, false) => "depth",
                    (false, true) => "color",
                    _ => "color and depth",
                },
                target
            );
            Ok(None)
        }
    }
}
