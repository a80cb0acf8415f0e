//! Consumer side of the pipeline: a viewer or processor receiving frames.

use rgbd_data::CalibrationRecord;

/// Receives calibration once per device and then raw frames keyed by serial.
///
/// Ingestion is called from the capture thread and should not block; a
/// sink that does heavy work buffers internally.
pub trait FrameSink {
    /// Take ownership of one device's calibration.
    fn register_camera(&mut self, calibration: CalibrationRecord);

    /// Called once after every sensor is streaming.
    fn start(&mut self) {}

    /// Polled once per capture loop iteration.
    fn should_stop(&self) -> bool;

    /// Raw RGB8 payload from device `device_id`.
    fn ingest_color(&mut self, device_id: &str, data: &[u8]);

    /// Raw Z16 payload from device `device_id`.
    fn ingest_depth(&mut self, device_id: &str, data: &[u8]);
}

