//! Traits a sensor driver backend implements.
//!
//! The pipeline never talks to hardware directly. A backend exposes an
//! enumeration [`Context`], its [`Device`]s, their [`Sensor`]s and the
//! [`StreamProfile`]s each sensor offers. Frames flow back through the
//! shared [`FrameQueue`] a sensor is started against.

use crate::error::DriverError;
use crate::queue::{FrameQueue, ProfileDescriptor};
use rgbd_data::{Extrinsics, Intrinsics};

/// Entry point for device enumeration.
///
/// Constructed once by the caller and passed by reference, so tests can
/// substitute a fake backend.
pub trait Context {
    type Device: Device;

    /// Devices connected right now, in discovery order.
    fn query_devices(&self) -> Result<Vec<Self::Device>, DriverError>;
}

/// One physical unit.
pub trait Device {
    type Sensor: Sensor;

    /// Stable serial number, unique per physical unit.
    fn serial_number(&self) -> Result<String, DriverError>;

    /// Sensors in a deterministic order.
    fn query_sensors(&self) -> Result<Vec<Self::Sensor>, DriverError>;
}

/// A capability on a device that streams one or more profiles.
///
/// Handles are cheap to clone; clones refer to the same underlying sensor.
pub trait Sensor: Clone {
    type Profile: StreamProfile;

    /// Human-readable sensor name.
    fn name(&self) -> String;

    fn stream_profiles(&self) -> Result<Vec<Self::Profile>, DriverError>;

    /// Meters per raw depth unit. Only depth-capable sensors support this.
    fn depth_units(&self) -> Result<f32, DriverError>;

    /// Reserve the sensor for the given profiles.
    fn open(&self, profiles: &[Self::Profile]) -> Result<(), DriverError>;

    /// Begin pushing frames into `queue`. Must follow [`Sensor::open`].
    fn start(&self, queue: &FrameQueue) -> Result<(), DriverError>;

    fn stop(&self) -> Result<(), DriverError>;

    fn close(&self) -> Result<(), DriverError>;
}

/// One candidate video stream.
pub trait StreamProfile: Clone {
    fn descriptor(&self) -> ProfileDescriptor;

    fn intrinsics(&self) -> Intrinsics;

    /// Transform taking points from this profile's sensor frame to `other`'s.
    fn extrinsics_to(&self, other: &Self) -> Extrinsics;
}

/// Sensor type produced by a context's devices.
pub type SensorOf<C> = <<C as Context>::Device as Device>::Sensor;
