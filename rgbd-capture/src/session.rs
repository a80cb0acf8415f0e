//! Capture loop: sensor lifecycle across devices and frame demultiplexing.
//!
//! A [`Session`] moves through `Idle -> Configuring -> Running -> Draining
//! -> Stopped`. Configuring opens and starts every selected sensor against
//! one shared [`FrameQueue`]. Running polls that queue until the sink asks
//! to stop, routing each frame to the sink by stream kind and owning
//! device. Draining stops and closes every sensor that was brought up.

use crate::driver::Sensor;
use crate::error::{CaptureError, Result};
use crate::matcher::DeviceRecord;
use crate::queue::{Frame, FrameQueue};
use crate::registry::DeviceRegistry;
use crate::sink::FrameSink;
use rgbd_data::{StreamKind, VideoMode};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Tunables for one capture session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Resolution and frame rate every selected profile must offer.
    pub target: VideoMode,
    /// Frames buffered in the shared queue before the oldest is dropped.
    pub queue_capacity: usize,
    /// Sleep after an empty poll. Zero yields instead of sleeping.
    pub idle_backoff: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            target: VideoMode::default(),
            queue_capacity: 10,
            idle_backoff: Duration::from_millis(1),
        }
    }
}

/// Lifecycle state of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Configuring,
    Running,
    Draining,
    Stopped,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Configuring => "configuring",
            SessionState::Running => "running",
            SessionState::Draining => "draining",
            SessionState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Frame counts accumulated by [`Session::run`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureStats {
    /// Color frames forwarded, per serial number.
    pub color_frames: BTreeMap<String, u64>,
    /// Depth frames forwarded, per serial number.
    pub depth_frames: BTreeMap<String, u64>,
    /// Frames of a stream kind the pipeline does not route.
    pub ignored_frames: u64,
}

impl CaptureStats {
    pub fn forwarded(&self) -> u64 {
        self.color_frames.values().sum::<u64>() + self.depth_frames.values().sum::<u64>()
    }
}

/// One sensor to bring up, with every profile selected on it.
struct SensorSlot<S: Sensor> {
    serial: String,
    name: String,
    sensor: S,
    profiles: Vec<S::Profile>,
    opened: bool,
    started: bool,
}

enum Route {
    Color,
    Depth,
}

/// Drives every matched device against one shared frame queue.
pub struct Session<S: Sensor> {
    slots: Vec<SensorSlot<S>>,
    registry: DeviceRegistry,
    queue: FrameQueue,
    idle_backoff: Duration,
    state: SessionState,
}

impl<S: Sensor> Session<S> {
    /// Plan the sensors to open for `records`.
    ///
    /// A sensor offering both the color and the depth profile of a device
    /// is opened once with both.
    pub fn new(
        records: &[DeviceRecord<S>],
        registry: DeviceRegistry,
        config: &SessionConfig,
    ) -> Self {
        let mut slots = Vec::with_capacity(records.len() * 2);
        for record in records {
            let mut color = SensorSlot {
                serial: record.serial_number.clone(),
                name: record.color.sensor.name(),
                sensor: record.color.sensor.clone(),
                profiles: vec![record.color.profile.clone()],
                opened: false,
                started: false,
            };
            if record.shares_sensor() {
                color.profiles.push(record.depth.profile.clone());
                slots.push(color);
            } else {
                slots.push(color);
                slots.push(SensorSlot {
                    serial: record.serial_number.clone(),
                    name: record.depth.sensor.name(),
                    sensor: record.depth.sensor.clone(),
                    profiles: vec![record.depth.profile.clone()],
                    opened: false,
                    started: false,
                });
            }
        }

        Self {
            slots,
            registry,
            queue: FrameQueue::new(config.queue_capacity),
            idle_backoff: config.idle_backoff,
            state: SessionState::Idle,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The queue every sensor pushes into.
    pub fn queue(&self) -> &FrameQueue {
        &self.queue
    }

    /// Number of distinct sensors this session drives.
    pub fn sensor_count(&self) -> usize {
        self.slots.len()
    }

    fn expect_state(&self, expected: SessionState) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(CaptureError::InvalidState {
                expected: expected.as_str(),
                actual: self.state.as_str(),
            })
        }
    }

    /// Open then start every sensor.
    ///
    /// On the first failure, everything already brought up is stopped and
    /// closed, the session ends in `Stopped`, and the error is returned.
    pub fn configure(&mut self) -> Result<()> {
        self.expect_state(SessionState::Idle)?;
        self.state = SessionState::Configuring;
        info!("Configuring {} sensor(s)", self.slots.len());

        for index in 0..self.slots.len() {
            if let Err(e) = self.bring_up(index) {
                warn!("Startup failed, shutting down opened sensors: {}", e);
                if let Err(rollback) = self.shutdown() {
                    warn!("Rollback incomplete: {}", rollback);
                }
                return Err(e);
            }
        }
        Ok(())
    }

    fn bring_up(&mut self, index: usize) -> Result<()> {
        let slot = &mut self.slots[index];

        debug!("Opening '{}' on {} ({} profile(s))", slot.name, slot.serial, slot.profiles.len());
        slot.sensor
            .open(&slot.profiles)
            .map_err(|e| CaptureError::driver(&slot.serial, &slot.name, e))?;
        slot.opened = true;

        debug!("Starting '{}' on {}", slot.name, slot.serial);
        slot.sensor
            .start(&self.queue)
            .map_err(|e| CaptureError::driver(&slot.serial, &slot.name, e))?;
        slot.started = true;
        Ok(())
    }

    /// Route frames to `sink` until it asks to stop, then drain.
    ///
    /// Sensors are always stopped and closed before returning. A frame on
    /// an unregistered profile aborts the loop with
    /// [`CaptureError::UnregisteredProfile`].
    pub fn run<K: FrameSink>(&mut self, sink: &mut K) -> Result<CaptureStats> {
        self.expect_state(SessionState::Configuring)?;
        self.state = SessionState::Running;
        info!("Capture running");

        let mut stats = CaptureStats::default();
        let outcome = loop {
            if sink.should_stop() {
                break Ok(());
            }
            match self.queue.poll() {
                Some(frame) => {
                    if let Err(e) = self.route(frame, sink, &mut stats) {
                        break Err(e);
                    }
                }
                None => self.idle(),
            }
        };

        let dropped = self.queue.dropped();
        if dropped > 0 {
            warn!("{} frame(s) dropped by a full queue", dropped);
        }

        let shutdown = self.shutdown();
        outcome?;
        shutdown?;
        info!("Capture finished: {} frame(s) forwarded", stats.forwarded());
        Ok(stats)
    }

    fn idle(&self) {
        if self.idle_backoff.is_zero() {
            std::thread::yield_now();
        } else {
            std::thread::sleep(self.idle_backoff);
        }
    }

    fn route<K: FrameSink>(
        &self,
        frame: Frame,
        sink: &mut K,
        stats: &mut CaptureStats,
    ) -> Result<()> {
        // Resolve before classifying: a frame on a profile this session never
        // opened is fatal whatever its kind.
        let serial = self.registry.resolve(frame.profile.uid)?;

        let route = match frame.profile.kind {
            StreamKind::Color => Route::Color,
            StreamKind::Depth => Route::Depth,
            other => {
                trace!("Ignoring {} frame from {} ({})", other, serial, frame.profile.uid);
                stats.ignored_frames += 1;
                return Ok(());
            }
        };

        trace!(
            "Frame {} from profile {} -> {}",
            frame.frame_number, frame.profile.uid, serial
        );

        match route {
            Route::Color => {
                sink.ingest_color(serial, &frame.data);
                *stats.color_frames.entry(serial.to_string()).or_default() += 1;
            }
            Route::Depth => {
                sink.ingest_depth(serial, &frame.data);
                *stats.depth_frames.entry(serial.to_string()).or_default() += 1;
            }
        }
        Ok(())
    }

    /// Stop then close every sensor that was brought up.
    ///
    /// Continues past failures and returns the first one. Idempotent once
    /// the session is `Stopped`.
    pub fn shutdown(&mut self) -> Result<()> {
        if self.state == SessionState::Stopped {
            return Ok(());
        }
        self.state = SessionState::Draining;
        info!("Draining {} sensor(s)", self.slots.iter().filter(|s| s.opened).count());

        let mut first_error = None;
        for slot in &mut self.slots {
            if slot.started {
                debug!("Stopping '{}' on {}", slot.name, slot.serial);
                slot.started = false;
                if let Err(e) = slot.sensor.stop() {
                    warn!("Failed to stop '{}' on {}: {}", slot.name, slot.serial, e);
                    if first_error.is_none() {
                        first_error = Some(CaptureError::driver(&slot.serial, &slot.name, e));
                    }
                }
            }
            if slot.opened {
                debug!("Closing '{}' on {}", slot.name, slot.serial);
                slot.opened = false;
                if let Err(e) = slot.sensor.close() {
                    warn!("Failed to close '{}' on {}: {}", slot.name, slot.serial, e);
                    if first_error.is_none() {
                        first_error = Some(CaptureError::driver(&slot.serial, &slot.name, e));
                    }
                }
            }
        }

        self.state = SessionState::Stopped;
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl<S: Sensor> Drop for Session<S> {
    fn drop(&mut self) {
        if self.state != SessionState::Idle && self.state != SessionState::Stopped {
            if let Err(e) = self.shutdown() {
                warn!("Shutdown on drop failed: {}", e);
            }
        }
    }
}
