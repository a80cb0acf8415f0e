//! Full pipeline scenarios against the simulated driver.

use rgbd_capture::sim::{
    DeviceDescription, LifecycleStep, ProfileDescription, RigDescription, SensorDescription,
    SimContext,
};
use rgbd_capture::{
    CalibrationRecord, DeviceRegistry, Frame, FrameSink, Session, SessionConfig, SessionState,
    StreamKind, StreamProfile, VideoMode, match_devices, pipeline,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Color(String, Vec<u8>),
    Depth(String, Vec<u8>),
}

/// Stops once it has seen `limit` ingestion calls or the flag is raised.
struct ScriptedSink {
    calls: Vec<Call>,
    registered: Vec<CalibrationRecord>,
    limit: usize,
    stop: Arc<AtomicBool>,
}

impl ScriptedSink {
    fn new(limit: usize) -> Self {
        Self {
            calls: Vec::new(),
            registered: Vec::new(),
            limit,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl FrameSink for ScriptedSink {
    fn register_camera(&mut self, calibration: CalibrationRecord) {
        self.registered.push(calibration);
    }

    fn should_stop(&self) -> bool {
        self.stop.load(Ordering::SeqCst) || self.calls.len() >= self.limit
    }

    fn ingest_color(&mut self, device_id: &str, data: &[u8]) {
        self.calls.push(Call::Color(device_id.to_string(), data.to_vec()));
    }

    fn ingest_depth(&mut self, device_id: &str, data: &[u8]) {
        self.calls.push(Call::Depth(device_id.to_string(), data.to_vec()));
    }
}

fn simple_unit(serial: &str) -> DeviceDescription {
    DeviceDescription::new(
        serial,
        vec![
            SensorDescription::stereo(
                "Stereo Module",
                vec![ProfileDescription::depth(640, 480, 30)],
            ),
            SensorDescription::rgb("RGB Camera", vec![ProfileDescription::color(640, 480, 30)]),
        ],
    )
}

#[test]
fn test_two_devices_single_color_frame() {
    let rig = RigDescription::new(vec![simple_unit("111"), simple_unit("222")]);
    let context = SimContext::new(rig);
    let config = SessionConfig {
        idle_backoff: Duration::ZERO,
        ..SessionConfig::default()
    };

    let records = match_devices(&context, VideoMode::new(640, 480, 30)).unwrap();
    assert_eq!(records.len(), 2);

    let registry = DeviceRegistry::from_records(&records).unwrap();
    assert_eq!(registry.len(), 4);
    assert_eq!(registry.resolve(records[0].color.uid()).unwrap(), "111");
    assert_eq!(registry.resolve(records[0].depth.uid()).unwrap(), "111");
    assert_eq!(registry.resolve(records[1].color.uid()).unwrap(), "222");
    assert_eq!(registry.resolve(records[1].depth.uid()).unwrap(), "222");

    let mut session = Session::new(&records, registry, &config);
    session.configure().unwrap();

    let descriptor = records[0].color.profile.descriptor();
    session
        .queue()
        .push(Frame::new(descriptor, vec![10, 20, 30], 0, 0.0));

    let mut sink = ScriptedSink::new(1);
    session.run(&mut sink).unwrap();

    assert_eq!(sink.calls, vec![Call::Color("111".to_string(), vec![10, 20, 30])]);
    assert_eq!(session.state(), SessionState::Stopped);
}

#[test]
fn test_depth_only_device_contributes_nothing() {
    let depth_only = DeviceDescription::new(
        "333",
        vec![SensorDescription::stereo(
            "Stereo Module",
            vec![ProfileDescription::depth(640, 480, 30)],
        )],
    );
    let context = SimContext::new(RigDescription::new(vec![simple_unit("111"), depth_only]));

    let records = match_devices(&context, VideoMode::default()).unwrap();
    assert_eq!(records.len(), 1);
    let registry = DeviceRegistry::from_records(&records).unwrap();
    assert!(registry.profiles_of("333").is_empty());
    assert_eq!(registry.profiles_of("111").len(), 2);

    let mut sink = ScriptedSink::new(0);
    pipeline::run(&context, &SessionConfig::default(), &mut sink).unwrap();
    assert_eq!(sink.registered.len(), 1);
    assert!(!context.events().iter().any(|e| e.serial == "333"));
}

#[test]
fn test_generated_frames_reach_the_right_device() {
    let context = SimContext::new(RigDescription::demo().with_generation(true));
    let mut sink = ScriptedSink::new(40);

    // Safety net in case generation stalls.
    let stop = sink.stop.clone();
    let watchdog = std::thread::spawn(move || {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !stop.load(Ordering::SeqCst) && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        stop.store(true, Ordering::SeqCst);
    });

    let stats = pipeline::run(&context, &SessionConfig::default(), &mut sink).unwrap();
    assert!(!sink.calls.is_empty());
    assert_eq!(stats.forwarded() as usize, sink.calls.len());

    let expected_len = |kind: StreamKind| match kind {
        StreamKind::Color => 640 * 480 * 3,
        _ => 640 * 480 * 2,
    };
    for call in &sink.calls {
        match call {
            Call::Color(serial, data) => {
                assert!(serial == "111" || serial == "222");
                assert_eq!(data.len(), expected_len(StreamKind::Color));
            }
            Call::Depth(serial, data) => {
                assert!(serial == "111" || serial == "222");
                assert_eq!(data.len(), expected_len(StreamKind::Depth));
            }
        }
    }

    let events = context.events();
    let count = |step: LifecycleStep| events.iter().filter(|e| e.step == step).count();
    assert_eq!(count(LifecycleStep::Start), 4);
    assert_eq!(count(LifecycleStep::Stop), 4);
    assert_eq!(count(LifecycleStep::Close), 4);

    sink.stop.store(true, Ordering::SeqCst);
    watchdog.join().unwrap();
}
