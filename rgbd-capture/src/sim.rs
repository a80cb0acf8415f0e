//! In-process driver backend with scripted devices.
//!
//! A [`RigDescription`] lists devices, their sensors and the profiles each
//! sensor offers; [`SimContext`] turns it into live handles implementing
//! the [`driver`](crate::driver) traits. Every lifecycle call is checked
//! against the sensor's state and appended to a shared event log so tests
//! can assert on ordering. With generation enabled, a started sensor pushes
//! synthetic frames at each profile's frame rate.

use crate::driver::{Context, Device, Sensor, StreamProfile};
use crate::error::DriverError;
use crate::queue::{Frame, FrameQueue, ProfileDescriptor};
use glam::Vec3;
use rgbd_data::{Extrinsics, Intrinsics, ProfileUid, StreamKind};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info};

static NEXT_UID: AtomicI32 = AtomicI32::new(1);

fn next_uid() -> ProfileUid {
    ProfileUid(NEXT_UID.fetch_add(1, Ordering::Relaxed))
}

/// Sensor lifecycle calls, in the order a well-behaved caller makes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleStep {
    Open,
    Start,
    Stop,
    Close,
}

/// One successful lifecycle call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorEvent {
    pub serial: String,
    pub sensor: String,
    pub step: LifecycleStep,
}

/// A profile a simulated sensor offers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileDescription {
    pub kind: StreamKind,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Defaults to [`Intrinsics::centered`].
    #[serde(default)]
    pub intrinsics: Option<Intrinsics>,
}

impl ProfileDescription {
    pub fn new(kind: StreamKind, width: u32, height: u32, fps: u32) -> Self {
        Self {
            kind,
            width,
            height,
            fps,
            intrinsics: None,
        }
    }

    pub fn color(width: u32, height: u32, fps: u32) -> Self {
        Self::new(StreamKind::Color, width, height, fps)
    }

    pub fn depth(width: u32, height: u32, fps: u32) -> Self {
        Self::new(StreamKind::Depth, width, height, fps)
    }

    pub fn with_intrinsics(mut self, intrinsics: Intrinsics) -> Self {
        self.intrinsics = Some(intrinsics);
        self
    }
}

/// A simulated sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorDescription {
    pub name: String,
    /// Meters per depth unit; `None` means the option is unsupported.
    #[serde(default)]
    pub depth_units: Option<f32>,
    /// Sensor frame relative to the device origin.
    #[serde(default)]
    pub pose: Extrinsics,
    pub profiles: Vec<ProfileDescription>,
    /// Make this lifecycle step fail.
    #[serde(default)]
    pub fail_on: Option<LifecycleStep>,
}

impl SensorDescription {
    /// Depth-capable sensor at the device origin, 1 mm depth units.
    pub fn stereo(name: &str, profiles: Vec<ProfileDescription>) -> Self {
        Self {
            name: name.to_string(),
            depth_units: Some(0.001),
            pose: Extrinsics::IDENTITY,
            profiles,
            fail_on: None,
        }
    }

    /// Color sensor at the device origin.
    pub fn rgb(name: &str, profiles: Vec<ProfileDescription>) -> Self {
        Self {
            name: name.to_string(),
            depth_units: None,
            pose: Extrinsics::IDENTITY,
            profiles,
            fail_on: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceDescription {
    pub serial: String,
    pub sensors: Vec<SensorDescription>,
}

impl DeviceDescription {
    pub fn new(serial: &str, sensors: Vec<SensorDescription>) -> Self {
        Self {
            serial: serial.to_string(),
            sensors,
        }
    }
}

/// Every device a [`SimContext`] reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RigDescription {
    pub devices: Vec<DeviceDescription>,
    /// Whether started sensors push synthetic frames.
    #[serde(default)]
    pub generate: bool,
}

impl RigDescription {
    pub fn new(devices: Vec<DeviceDescription>) -> Self {
        Self {
            devices,
            generate: false,
        }
    }

    pub fn with_generation(mut self, generate: bool) -> Self {
        self.generate = generate;
        self
    }

    /// Two D400-style units, serials "111" and "222".
    ///
    /// Each has a stereo module (depth and infrared) and an RGB camera
    /// mounted 15 mm to its right.
    pub fn demo() -> Self {
        let unit = |serial: &str| {
            let stereo = SensorDescription::stereo(
                "Stereo Module",
                vec![
                    ProfileDescription::depth(848, 480, 30),
                    ProfileDescription::depth(640, 480, 30),
                    ProfileDescription::new(StreamKind::Infrared, 640, 480, 30),
                ],
            );
            let mut rgb = SensorDescription::rgb(
                "RGB Camera",
                vec![
                    ProfileDescription::color(1280, 720, 30),
                    ProfileDescription::color(640, 480, 30),
                ],
            );
            rgb.pose.translation = [0.015, 0.0, 0.0];
            DeviceDescription::new(serial, vec![stereo, rgb])
        };
        Self::new(vec![unit("111"), unit("222")])
    }
}

type EventLog = Arc<Mutex<Vec<SensorEvent>>>;

/// Driver context over a [`RigDescription`].
///
/// Profiles are instantiated, and get their UIDs, when the context is built.
pub struct SimContext {
    devices: Vec<SimDevice>,
    events: EventLog,
}

impl SimContext {
    pub fn new(rig: RigDescription) -> Self {
        let events: EventLog = Arc::new(Mutex::new(Vec::new()));
        let devices = rig
            .devices
            .into_iter()
            .map(|device| SimDevice {
                sensors: device
                    .sensors
                    .into_iter()
                    .map(|sensor| {
                        SimSensor::new(&device.serial, sensor, rig.generate, events.clone())
                    })
                    .collect(),
                serial: device.serial,
            })
            .collect::<Vec<_>>();

        info!("Simulated rig with {} device(s)", devices.len());
        Self { devices, events }
    }

    /// Lifecycle calls made so far, in order.
    pub fn events(&self) -> Vec<SensorEvent> {
        lock(&self.events).clone()
    }

    pub fn clear_events(&self) {
        lock(&self.events).clear();
    }
}

impl Context for SimContext {
    type Device = SimDevice;

    fn query_devices(&self) -> Result<Vec<SimDevice>, DriverError> {
        Ok(self.devices.clone())
    }
}

#[derive(Clone)]
pub struct SimDevice {
    serial: String,
    sensors: Vec<SimSensor>,
}

impl Device for SimDevice {
    type Sensor = SimSensor;

    fn serial_number(&self) -> Result<String, DriverError> {
        Ok(self.serial.clone())
    }

    fn query_sensors(&self) -> Result<Vec<SimSensor>, DriverError> {
        Ok(self.sensors.clone())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimProfile {
    descriptor: ProfileDescriptor,
    intrinsics: Intrinsics,
    pose: Extrinsics,
}

impl StreamProfile for SimProfile {
    fn descriptor(&self) -> ProfileDescriptor {
        self.descriptor
    }

    fn intrinsics(&self) -> Intrinsics {
        self.intrinsics
    }

    fn extrinsics_to(&self, other: &Self) -> Extrinsics {
        // Both poses map sensor -> device; compose ours with the inverse of theirs.
        let other_inv = other.pose.rotation_mat3().transpose();
        let rotation = other_inv * self.pose.rotation_mat3();
        let offset = self.pose.translation_vec3() - other.pose.translation_vec3();
        let translation = other_inv * offset;
        Extrinsics::from_parts(rotation, translation)
    }
}

struct Streaming {
    stop: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
}

impl Streaming {
    fn halt(self) {
        self.stop.store(true, Ordering::SeqCst);
        for worker in self.workers {
            let _ = worker.join();
        }
    }
}

#[derive(Default)]
struct SensorState {
    opened: Vec<SimProfile>,
    streaming: Option<Streaming>,
}

struct SensorInner {
    serial: String,
    name: String,
    depth_units: Option<f32>,
    fail_on: Option<LifecycleStep>,
    generate: bool,
    profiles: Vec<SimProfile>,
    state: Mutex<SensorState>,
    events: EventLog,
}

impl Drop for SensorInner {
    fn drop(&mut self) {
        let state = self
            .state
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(streaming) = state.streaming.take() {
            streaming.halt();
        }
    }
}

/// Handle to one simulated sensor. Clones share state.
#[derive(Clone)]
pub struct SimSensor {
    inner: Arc<SensorInner>,
}

impl SimSensor {
    fn new(serial: &str, description: SensorDescription, generate: bool, events: EventLog) -> Self {
        let pose = description.pose;
        let profiles = description
            .profiles
            .iter()
            .map(|p| SimProfile {
                descriptor: ProfileDescriptor {
                    uid: next_uid(),
                    kind: p.kind,
                    width: p.width,
                    height: p.height,
                    fps: p.fps,
                },
                intrinsics: p
                    .intrinsics
                    .unwrap_or_else(|| Intrinsics::centered(p.width, p.height)),
                pose,
            })
            .collect();

        Self {
            inner: Arc::new(SensorInner {
                serial: serial.to_string(),
                name: description.name,
                depth_units: description.depth_units,
                fail_on: description.fail_on,
                generate,
                profiles,
                state: Mutex::new(SensorState::default()),
                events,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, SensorState> {
        lock(&self.inner.state)
    }

    fn injected(&self, step: LifecycleStep) -> bool {
        self.inner.fail_on == Some(step)
    }

    fn record(&self, step: LifecycleStep) {
        debug!("sim {} '{}': {:?}", self.inner.serial, self.inner.name, step);
        lock(&self.inner.events).push(SensorEvent {
            serial: self.inner.serial.clone(),
            sensor: self.inner.name.clone(),
            step,
        });
    }

    fn invalid(&self, what: &str) -> DriverError {
        DriverError::InvalidState(format!("'{}' {}", self.inner.name, what))
    }
}

impl Sensor for SimSensor {
    type Profile = SimProfile;

    fn name(&self) -> String {
        self.inner.name.clone()
    }

    fn stream_profiles(&self) -> Result<Vec<SimProfile>, DriverError> {
        Ok(self.inner.profiles.clone())
    }

    fn depth_units(&self) -> Result<f32, DriverError> {
        self.inner
            .depth_units
            .ok_or(DriverError::OptionUnsupported("depth_units"))
    }

    fn open(&self, profiles: &[SimProfile]) -> Result<(), DriverError> {
        if self.injected(LifecycleStep::Open) {
            return Err(DriverError::OpenFailed("injected failure".to_string()));
        }
        if profiles.is_empty() {
            return Err(DriverError::OpenFailed("no profiles requested".to_string()));
        }
        if let Some(foreign) = profiles.iter().find(|p| !self.inner.profiles.contains(*p)) {
            return Err(DriverError::OpenFailed(format!(
                "profile {} is not offered by '{}'",
                foreign.descriptor.uid, self.inner.name
            )));
        }

        let mut state = self.state();
        if !state.opened.is_empty() {
            return Err(self.invalid("is already open"));
        }
        state.opened = profiles.to_vec();
        drop(state);

        self.record(LifecycleStep::Open);
        Ok(())
    }

    fn start(&self, queue: &FrameQueue) -> Result<(), DriverError> {
        if self.injected(LifecycleStep::Start) {
            return Err(DriverError::StartFailed("injected failure".to_string()));
        }

        let mut state = self.state();
        if state.opened.is_empty() {
            return Err(self.invalid("started before open"));
        }
        if state.streaming.is_some() {
            return Err(self.invalid("is already streaming"));
        }

        let mut streaming = Streaming {
            stop: Arc::new(AtomicBool::new(false)),
            workers: Vec::new(),
        };
        if self.inner.generate {
            for profile in &state.opened {
                match spawn_generator(profile.descriptor, queue.clone(), streaming.stop.clone()) {
                    Ok(worker) => streaming.workers.push(worker),
                    Err(e) => {
                        streaming.halt();
                        return Err(DriverError::StartFailed(e.to_string()));
                    }
                }
            }
        }
        state.streaming = Some(streaming);
        drop(state);

        self.record(LifecycleStep::Start);
        Ok(())
    }

    fn stop(&self) -> Result<(), DriverError> {
        if self.injected(LifecycleStep::Stop) {
            return Err(DriverError::StopFailed("injected failure".to_string()));
        }

        let streaming = self
            .state()
            .streaming
            .take()
            .ok_or_else(|| self.invalid("is not streaming"))?;
        streaming.halt();

        self.record(LifecycleStep::Stop);
        Ok(())
    }

    fn close(&self) -> Result<(), DriverError> {
        if self.injected(LifecycleStep::Close) {
            return Err(DriverError::CloseFailed("injected failure".to_string()));
        }

        let mut state = self.state();
        if state.streaming.is_some() {
            return Err(self.invalid("closed while streaming"));
        }
        if state.opened.is_empty() {
            return Err(self.invalid("is not open"));
        }
        state.opened.clear();
        drop(state);

        self.record(LifecycleStep::Close);
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn spawn_generator(
    descriptor: ProfileDescriptor,
    queue: FrameQueue,
    stop: Arc<AtomicBool>,
) -> std::io::Result<JoinHandle<()>> {
    let period = Duration::from_secs_f64(1.0 / f64::from(descriptor.fps.max(1)));
    thread::Builder::new()
        .name(format!("sim-{}-{}", descriptor.kind, descriptor.uid.0))
        .spawn(move || {
            let started = Instant::now();
            let mut frame_number = 0;
            while !stop.load(Ordering::SeqCst) {
                let timestamp = started.elapsed().as_secs_f64();
                queue.push(synthetic_frame(descriptor, frame_number, timestamp));
                frame_number += 1;
                thread::sleep(period);
            }
        })
}

/// Deterministic test-pattern frame for `descriptor`.
///
/// Color is RGB8, depth is native-endian Z16 in millimetres (a tilted
/// plane around one meter), anything else is one byte per pixel.
pub fn synthetic_frame(descriptor: ProfileDescriptor, frame_number: u64, timestamp: f64) -> Frame {
    let (w, h) = (descriptor.width as usize, descriptor.height as usize);
    let shift = frame_number as usize;

    let data = match descriptor.kind {
        StreamKind::Color => {
            let mut rgb = Vec::with_capacity(w * h * 3);
            for y in 0..h {
                for x in 0..w {
                    rgb.push(((x + shift) % 256) as u8);
                    rgb.push((y % 256) as u8);
                    rgb.push(((x + y) % 256) as u8);
                }
            }
            rgb
        }
        StreamKind::Depth => {
            let plane = Vec3::new(0.2, 0.1, 1000.0);
            let depth: Vec<u16> = (0..h)
                .flat_map(|y| (0..w).map(move |x| (x, y)))
                .map(|(x, y)| plane.dot(Vec3::new(x as f32, y as f32, 1.0)) as u16)
                .collect();
            bytemuck::cast_slice(&depth).to_vec()
        }
        _ => vec![(shift % 256) as u8; w * h],
    };

    Frame::new(descriptor, data, frame_number, timestamp)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_sensor(generate: bool) -> (SimContext, SimSensor) {
        let rig = RigDescription::new(vec![DeviceDescription::new(
            "111",
            vec![SensorDescription::stereo(
                "Stereo Module",
                vec![ProfileDescription::depth(8, 4, 200)],
            )],
        )])
        .with_generation(generate);
        let context = SimContext::new(rig);
        let devices = context.query_devices().unwrap();
        let sensor = devices[0].query_sensors().unwrap().remove(0);
        (context, sensor)
    }

    #[test]
    fn test_profile_uids_unique() {
        let context = SimContext::new(RigDescription::demo());
        let mut uids = Vec::new();
        for device in context.query_devices().unwrap() {
            for sensor in device.query_sensors().unwrap() {
                for profile in sensor.stream_profiles().unwrap() {
                    uids.push(profile.descriptor().uid);
                }
            }
        }
        let count = uids.len();
        uids.sort();
        uids.dedup();
        assert_eq!(uids.len(), count);
    }

    #[test]
    fn test_lifecycle_order_enforced() {
        let (_context, sensor) = single_sensor(false);
        let profiles = sensor.stream_profiles().unwrap();
        let queue = FrameQueue::new(4);

        assert!(matches!(sensor.start(&queue), Err(DriverError::InvalidState(_))));
        assert!(matches!(sensor.close(), Err(DriverError::InvalidState(_))));

        sensor.open(&profiles).unwrap();
        assert!(matches!(sensor.open(&profiles), Err(DriverError::InvalidState(_))));
        sensor.start(&queue).unwrap();
        assert!(matches!(sensor.close(), Err(DriverError::InvalidState(_))));
        sensor.stop().unwrap();
        assert!(matches!(sensor.stop(), Err(DriverError::InvalidState(_))));
        sensor.close().unwrap();
    }

    #[test]
    fn test_open_rejects_foreign_profile() {
        let context = SimContext::new(RigDescription::demo());
        let devices = context.query_devices().unwrap();
        let sensors = devices[0].query_sensors().unwrap();
        let foreign = sensors[1].stream_profiles().unwrap();
        assert!(matches!(sensors[0].open(&foreign), Err(DriverError::OpenFailed(_))));
        assert!(context.events().is_empty());
    }

    #[test]
    fn test_events_recorded_in_order() {
        let (context, sensor) = single_sensor(false);
        let profiles = sensor.stream_profiles().unwrap();
        let queue = FrameQueue::new(4);
        sensor.open(&profiles).unwrap();
        sensor.start(&queue).unwrap();
        sensor.stop().unwrap();
        sensor.close().unwrap();

        let steps: Vec<LifecycleStep> = context.events().into_iter().map(|e| e.step).collect();
        assert_eq!(
            steps,
            vec![
                LifecycleStep::Open,
                LifecycleStep::Start,
                LifecycleStep::Stop,
                LifecycleStep::Close
            ]
        );
    }

    #[test]
    fn test_generation_pushes_frames() {
        let (_context, sensor) = single_sensor(true);
        let profiles = sensor.stream_profiles().unwrap();
        let queue = FrameQueue::new(64);
        sensor.open(&profiles).unwrap();
        sensor.start(&queue).unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while queue.is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        sensor.stop().unwrap();
        sensor.close().unwrap();

        let frame = queue.poll().expect("generator produced no frame");
        assert_eq!(frame.profile.uid, profiles[0].descriptor().uid);
        assert_eq!(frame.data.len(), 8 * 4 * 2);
    }

    #[test]
    fn test_without_generation_queue_stays_empty() {
        let (_context, sensor) = single_sensor(false);
        let profiles = sensor.stream_profiles().unwrap();
        let queue = FrameQueue::new(4);
        sensor.open(&profiles).unwrap();
        sensor.start(&queue).unwrap();
        thread::sleep(Duration::from_millis(20));
        assert!(queue.is_empty());
        sensor.stop().unwrap();
    }

    #[test]
    fn test_synthetic_payload_sizes() {
        let descriptor = |kind| ProfileDescriptor {
            uid: ProfileUid(1),
            kind,
            width: 4,
            height: 3,
            fps: 30,
        };
        assert_eq!(synthetic_frame(descriptor(StreamKind::Color), 0, 0.0).data.len(), 36);
        assert_eq!(synthetic_frame(descriptor(StreamKind::Depth), 0, 0.0).data.len(), 24);
        assert_eq!(synthetic_frame(descriptor(StreamKind::Infrared), 0, 0.0).data.len(), 12);
    }

    #[test]
    fn test_extrinsics_between_offset_sensors() {
        let context = SimContext::new(RigDescription::demo());
        let devices = context.query_devices().unwrap();
        let sensors = devices[0].query_sensors().unwrap();
        let depth = sensors[0].stream_profiles().unwrap().remove(0);
        let color = sensors[1].stream_profiles().unwrap().remove(0);

        let depth_to_color = depth.extrinsics_to(&color);
        assert_eq!(depth_to_color.rotation, Extrinsics::IDENTITY.rotation);
        assert!((depth_to_color.translation[0] + 0.015).abs() < 1e-6);

        let color_to_depth = color.extrinsics_to(&depth);
        assert!((color_to_depth.translation[0] - 0.015).abs() < 1e-6);
    }

    #[test]
    fn test_rig_from_json() {
        let json = r#"{
            "generate": true,
            "devices": [{
                "serial": "abc",
                "sensors": [{
                    "name": "Stereo Module",
                    "depth_units": 0.001,
                    "profiles": [{ "kind": "depth", "width": 640, "height": 480, "fps": 30 }]
                }]
            }]
        }"#;
        let rig: RigDescription = serde_json::from_str(json).unwrap();
        assert!(rig.generate);
        assert_eq!(rig.devices[0].serial, "abc");
        assert_eq!(rig.devices[0].sensors[0].pose, Extrinsics::IDENTITY);
        assert_eq!(rig.devices[0].sensors[0].fail_on, None);
    }
}
