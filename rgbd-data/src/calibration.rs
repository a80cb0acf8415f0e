//! Per-device calibration in the shape a viewer registers cameras with.

use crate::types::{Extrinsics, Intrinsics};
use glam::{Mat3, Mat4, Vec3};

/// Convert pinhole intrinsics to a 3x3 camera matrix.
///
/// Identity with `(0,0)=fx`, `(1,1)=fy`, `(0,2)=ppx`, `(1,2)=ppy`.
/// Indices are (row, column); glam stores columns.
pub fn intrinsics_to_mat3(intrinsics: &Intrinsics) -> Mat3 {
    Mat3::from_cols(
        Vec3::new(intrinsics.fx, 0.0, 0.0),
        Vec3::new(0.0, intrinsics.fy, 0.0),
        Vec3::new(intrinsics.ppx, intrinsics.ppy, 1.0),
    )
}

/// Embed a rotation + translation in a 4x4 homogeneous transform.
pub fn extrinsics_to_mat4(extrinsics: &Extrinsics) -> Mat4 {
    let r = &extrinsics.rotation;
    let t = &extrinsics.translation;
    #[rustfmt::skip]
    let rows = [
        r[0], r[1], r[2], t[0],
        r[3], r[4], r[5], t[1],
        r[6], r[7], r[8], t[2],
        0.0,  0.0,  0.0,  1.0,
    ];
    Mat4::from_cols_array(&rows).transpose()
}

/// Everything a consumer needs to interpret one device's color and depth frames.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationRecord {
    /// Device serial number.
    pub device_id: String,
    pub rgb_width: u32,
    pub rgb_height: u32,
    pub depth_width: u32,
    pub depth_height: u32,
    /// Color camera matrix (color image from color camera frame).
    pub hm_rgbimage_rgb: Mat3,
    /// Depth camera matrix (depth image from depth camera frame).
    pub hm_depthimage_depth: Mat3,
    /// Maps points in the depth sensor frame into the color sensor frame.
    pub tx_rgb_depth: Mat4,
    /// Meters represented by one raw depth unit.
    pub depth_scale: f32,
}

impl CalibrationRecord {
    /// Assemble a record from raw intrinsics and depth-to-color extrinsics.
    pub fn new(
        device_id: impl Into<String>,
        color: &Intrinsics,
        depth: &Intrinsics,
        depth_to_color: &Extrinsics,
        depth_scale: f32,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            rgb_width: color.width,
            rgb_height: color.height,
            depth_width: depth.width,
            depth_height: depth.height,
            hm_rgbimage_rgb: intrinsics_to_mat3(color),
            hm_depthimage_depth: intrinsics_to_mat3(depth),
            tx_rgb_depth: extrinsics_to_mat4(depth_to_color),
            depth_scale,
        }
    }
}
