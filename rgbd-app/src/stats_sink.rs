//! Frame sink that tracks per-camera throughput and logs it periodically.

use rgbd_capture::FrameSink;
use rgbd_data::CalibrationRecord;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StreamCounter {
    pub frames: u64,
    pub bytes: u64,
    /// Frames whose size did not match the registered resolution.
    pub malformed: u64,
}

impl StreamCounter {
    fn add(&mut self, len: usize, expected: usize) {
        self.frames += 1;
        self.bytes += len as u64;
        if len != expected {
            self.malformed += 1;
        }
    }
}

/// A registered camera and what it has delivered so far.
#[derive(Debug, Clone)]
pub struct CameraEntry {
    pub calibration: CalibrationRecord,
    pub color: StreamCounter,
    pub depth: StreamCounter,
}

impl CameraEntry {
    fn expected_color_len(&self) -> usize {
        self.calibration.rgb_width as usize * self.calibration.rgb_height as usize * 3
    }

    fn expected_depth_len(&self) -> usize {
        self.calibration.depth_width as usize * self.calibration.depth_height as usize * 2
    }
}

/// Counts frames per camera; stops on the shared flag or after `duration`.
pub struct StatsSink {
    cameras: BTreeMap<String, CameraEntry>,
    stop: Arc<AtomicBool>,
    duration: Option<Duration>,
    deadline: Option<Instant>,
    report_interval: Duration,
    started: Instant,
    last_report: Instant,
    unknown_frames: u64,
}

impl StatsSink {
    pub fn new(
        stop: Arc<AtomicBool>,
        duration: Option<Duration>,
        report_interval: Duration,
    ) -> Self {
        Self {
            cameras: BTreeMap::new(),
            stop,
            duration,
            deadline: None,
            report_interval,
            started: Instant::now(),
            last_report: Instant::now(),
            unknown_frames: 0,
        }
    }

    pub fn cameras(&self) -> &BTreeMap<String, CameraEntry> {
        &self.cameras
    }

    /// Frames for device ids that were never registered.
    pub fn unknown_frames(&self) -> u64 {
        self.unknown_frames
    }

    fn camera(&mut self, device_id: &str) -> Option<&mut CameraEntry> {
        let entry = self.cameras.get_mut(device_id);
        if entry.is_none() {
            self.unknown_frames += 1;
            warn!("Frame for unregistered camera {}", device_id);
        }
        entry
    }

    fn maybe_report(&mut self) {
        if self.last_report.elapsed() < self.report_interval {
            return;
        }
        self.report();
        self.last_report = Instant::now();
    }

    fn report(&self) {
        let secs = self.started.elapsed().as_secs_f64().max(f64::EPSILON);
        for (id, camera) in &self.cameras {
            info!(
                "{}: color {} frames ({:.1} fps avg), depth {} frames ({:.1} fps avg)",
                id,
                camera.color.frames,
                camera.color.frames as f64 / secs,
                camera.depth.frames,
                camera.depth.frames as f64 / secs
            );
        }
    }

    /// Log final totals for every camera.
    pub fn log_summary(&self) {
        for (id, camera) in &self.cameras {
            info!(
                "{}: {} color frame(s) ({} bytes), {} depth frame(s) ({} bytes)",
                id, camera.color.frames, camera.color.bytes, camera.depth.frames, camera.depth.bytes
            );
            if camera.color.malformed + camera.depth.malformed > 0 {
                warn!(
                    "{}: {} color and {} depth frame(s) had an unexpected size",
                    id, camera.color.malformed, camera.depth.malformed
                );
            }
        }
    }
}

impl FrameSink for StatsSink {
    fn register_camera(&mut self, calibration: CalibrationRecord) {
        info!(
            "Camera {}: rgb {}x{}, depth {}x{}, depth scale {} m",
            calibration.device_id,
            calibration.rgb_width,
            calibration.rgb_height,
            calibration.depth_width,
            calibration.depth_height,
            calibration.depth_scale
        );
        debug!("  tx_rgb_depth = {:?}", calibration.tx_rgb_depth);
        self.cameras.insert(
            calibration.device_id.clone(),
            CameraEntry {
                calibration,
                color: StreamCounter::default(),
                depth: StreamCounter::default(),
            },
        );
    }

    fn start(&mut self) {
        let now = Instant::now();
        // A deadline past what `Instant` can hold never arrives.
        self.deadline = self.duration.and_then(|d| now.checked_add(d));
        self.started = now;
        self.last_report = now;
        match self.duration {
            Some(d) => info!("Streaming {} camera(s) for {:?}", self.cameras.len(), d),
            None => info!("Streaming {} camera(s), press Ctrl+C to stop", self.cameras.len()),
        }
    }

    fn should_stop(&self) -> bool {
        self.stop.load(Ordering::SeqCst) || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    fn ingest_color(&mut self, device_id: &str, data: &[u8]) {
        if let Some(camera) = self.camera(device_id) {
            let expected = camera.expected_color_len();
            camera.color.add(data.len(), expected);
        }
        self.maybe_report();
    }

    fn ingest_depth(&mut self, device_id: &str, data: &[u8]) {
        if let Some(camera) = self.camera(device_id) {
            let expected = camera.expected_depth_len();
            camera.depth.add(data.len(), expected);
        }
        self.maybe_report();
    }
}
