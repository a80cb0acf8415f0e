//! Calibration for a matched device, read from its driver handles.

use crate::driver::{Sensor, StreamProfile};
use crate::error::{CaptureError, Result};
use crate::matcher::DeviceRecord;
use rgbd_data::CalibrationRecord;
use tracing::debug;

/// Derive intrinsics, depth scale, and the depth-to-color transform.
///
/// Only the depth-units query can fail; a matched profile always has
/// intrinsics and extrinsics.
pub fn build<S: Sensor>(record: &DeviceRecord<S>) -> Result<CalibrationRecord> {
    let color = &record.color.profile;
    let depth = &record.depth.profile;
    let depth_sensor = &record.depth.sensor;

    let depth_scale = depth_sensor
        .depth_units()
        .map_err(|e| CaptureError::driver(&record.serial_number, &depth_sensor.name(), e))?;

    let calibration = CalibrationRecord::new(
        record.serial_number.clone(),
        &color.intrinsics(),
        &depth.intrinsics(),
        &depth.extrinsics_to(color),
        depth_scale,
    );

    debug!(
        "Calibrated {}: rgb {}x{}, depth {}x{}, depth scale {}",
        calibration.device_id,
        calibration.rgb_width,
        calibration.rgb_height,
        calibration.depth_width,
        calibration.depth_height,
        calibration.depth_scale
    );
    Ok(calibration)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::match_devices;
    use crate::sim::{
        DeviceDescription, ProfileDescription, RigDescription, SensorDescription, SimContext,
    };
    use glam::{Mat4, Vec3};
    use rgbd_data::{Extrinsics, Intrinsics, VideoMode};

    fn rig_with_baseline(baseline: f32) -> RigDescription {
        let color = ProfileDescription::color(640, 480, 30).with_intrinsics(Intrinsics {
            width: 640,
            height: 480,
            fx: 610.0,
            fy: 611.0,
            ppx: 318.0,
            ppy: 242.0,
        });
        let mut rgb = SensorDescription::rgb("RGB Camera", vec![color]);
        rgb.pose = Extrinsics {
            translation: [baseline, 0.0, 0.0],
            ..Extrinsics::IDENTITY
        };
        let depth = ProfileDescription::depth(640, 480, 30);
        let mut stereo = SensorDescription::stereo("Stereo Module", vec![depth]);
        stereo.depth_units = Some(0.0001);
        RigDescription::new(vec![DeviceDescription::new("111", vec![stereo, rgb])])
    }

    #[test]
    fn test_build_reads_all_fields() {
        let context = SimContext::new(rig_with_baseline(0.015));
        let records = match_devices(&context, VideoMode::default()).unwrap();
        let calibration = build(&records[0]).unwrap();

        assert_eq!(calibration.device_id, "111");
        assert_eq!(calibration.rgb_width, 640);
        assert_eq!(calibration.depth_height, 480);
        assert_eq!(calibration.depth_scale, 0.0001);
        assert_eq!(calibration.hm_rgbimage_rgb.col(0).x, 610.0);
        assert_eq!(calibration.hm_rgbimage_rgb.col(2).y, 242.0);
        // Depth sensor sits at the origin, color sensor 15 mm to its right:
        // a depth-frame point lands 15 mm to the left in the color frame.
        let p = calibration.tx_rgb_depth.transform_point3(Vec3::new(0.0, 0.0, 1.0));
        assert!((p - Vec3::new(-0.015, 0.0, 1.0)).length() < 1e-6);
    }

    #[test]
    fn test_build_is_repeatable() {
        let context = SimContext::new(rig_with_baseline(0.05));
        let records = match_devices(&context, VideoMode::default()).unwrap();
        let a = build(&records[0]).unwrap();
        let b = build(&records[0]).unwrap();
        assert_eq!(a, b);
        assert_ne!(a.tx_rgb_depth, Mat4::IDENTITY);
    }

    #[test]
    fn test_missing_depth_units_is_driver_error() {
        let mut rig = rig_with_baseline(0.0);
        rig.devices[0].sensors[0].depth_units = None;
        let context = SimContext::new(rig);
        let records = match_devices(&context, VideoMode::default()).unwrap();
        match build(&records[0]) {
            Err(CaptureError::Driver { serial, sensor, .. }) => {
                assert_eq!(serial, "111");
                assert_eq!(sensor, "Stereo Module");
            }
            other => panic!("expected driver error, got {:?}", other.map(|c| c.device_id)),
        }
    }
}
