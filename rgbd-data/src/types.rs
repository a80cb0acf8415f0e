//! Core data types for stream profiles and sensor geometry.
//!
//! These are plain-data representations; the driver-facing handles that
//! produce them live in rgbd-capture.

use glam::{Mat3, Vec3};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of video stream a profile produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Color,
    Depth,
    Infrared,
    /// Any stream the pipeline does not route (fisheye, motion, ...).
    Other,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StreamKind::Color => "color",
            StreamKind::Depth => "depth",
            StreamKind::Infrared => "infrared",
            StreamKind::Other => "other",
        };
        f.write_str(name)
    }
}

/// Runtime identifier of one stream profile instance.
///
/// Assigned by the driver and unique for the process lifetime. Used only to
/// route frames back to the device that owns the profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProfileUid(pub i32);

impl fmt::Display for ProfileUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Resolution and frame rate a stream profile must offer to be selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VideoMode {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl VideoMode {
    pub fn new(width: u32, height: u32, fps: u32) -> Self {
        Self { width, height, fps }
    }

    /// Exact match on all three fields.
    pub fn matches(&self, width: u32, height: u32, fps: u32) -> bool {
        self.width == width && self.height == height && self.fps == fps
    }
}

impl Default for VideoMode {
    fn default() -> Self {
        Self::new(640, 480, 30)
    }
}

impl fmt::Display for VideoMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}@{}", self.width, self.height, self.fps)
    }
}

/// Pinhole intrinsics of a video stream, without distortion terms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Intrinsics {
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
    /// Focal length x (pixels).
    pub fx: f32,
    /// Focal length y (pixels).
    pub fy: f32,
    /// Principal point x (pixels).
    pub ppx: f32,
    /// Principal point y (pixels).
    pub ppy: f32,
}

impl Intrinsics {
    /// Centered principal point with a focal length equal to the image width.
    pub fn centered(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            fx: width as f32,
            fy: width as f32,
            ppx: width as f32 / 2.0,
            ppy: height as f32 / 2.0,
        }
    }
}

/// Rigid transform from one sensor's coordinate frame to another's.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extrinsics {
    /// 3x3 rotation, row-major.
    pub rotation: [f32; 9],
    /// Translation in meters.
    pub translation: [f32; 3],
}

impl Extrinsics {
    pub const IDENTITY: Self = Self {
        rotation: [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
        translation: [0.0, 0.0, 0.0],
    };

    /// Build from a glam rotation and translation.
    pub fn from_parts(rotation: Mat3, translation: Vec3) -> Self {
        Self {
            rotation: rotation.transpose().to_cols_array(),
            translation: translation.to_array(),
        }
    }

    /// Rotation as a glam matrix.
    pub fn rotation_mat3(&self) -> Mat3 {
        Mat3::from_cols_array(&self.rotation).transpose()
    }

    pub fn translation_vec3(&self) -> Vec3 {
        Vec3::from_array(self.translation)
    }
}

impl Default for Extrinsics {
    fn default() -> Self {
        Self::IDENTITY
    }
}
