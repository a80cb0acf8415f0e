//! RGB-D Data Crate
//!
//! Driver-agnostic types shared by the capture pipeline and its consumers:
//! stream kinds and modes, pinhole intrinsics, sensor-to-sensor extrinsics,
//! and the per-device calibration handed to a viewer at registration time.

pub mod calibration;
pub mod types;

pub use calibration::{CalibrationRecord, extrinsics_to_mat4, intrinsics_to_mat3};
pub use types::{Extrinsics, Intrinsics, ProfileUid, StreamKind, VideoMode};
