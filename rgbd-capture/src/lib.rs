//! RGB-D Capture - discovery and demultiplexing for multiple depth cameras
//!
//! This crate drives any number of RGB-D devices exposed through the
//! [`driver`] traits:
//!
//! - [`matcher`] picks one color and one depth profile per device
//! - [`calibration`] turns a matched pair into a [`CalibrationRecord`]
//! - [`registry`] maps profile UIDs back to device serial numbers
//! - [`session`] opens every sensor against one shared [`FrameQueue`] and
//!   routes frames to a [`FrameSink`] until it asks to stop
//!
//! [`sim`] provides an in-process driver for tests and demos.
//!
//! ## Example
//!
//! ```ignore
//! use rgbd_capture::{SessionConfig, pipeline, sim::{RigDescription, SimContext}};
//!
//! let context = SimContext::new(RigDescription::demo());
//! let stats = pipeline::run(&context, &SessionConfig::default(), &mut my_sink)?;
//! ```

pub mod calibration;
pub mod driver;
mod error;
pub mod matcher;
pub mod pipeline;
pub mod queue;
pub mod registry;
pub mod session;
pub mod sim;
pub mod sink;

pub use driver::{Context, Device, Sensor, SensorOf, StreamProfile};
pub use error::{CaptureError, DriverError, Result};
pub use matcher::{DeviceRecord, StreamBinding, match_devices};
pub use queue::{Frame, FrameQueue, ProfileDescriptor};
pub use registry::DeviceRegistry;
pub use session::{CaptureStats, Session, SessionConfig, SessionState};
pub use sink::FrameSink;

// Re-export the data model for convenience
pub use rgbd_data::{CalibrationRecord, Extrinsics, Intrinsics, ProfileUid, StreamKind, VideoMode};
