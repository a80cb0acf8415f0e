//! Top-level orchestration: discover, calibrate, register, capture.

use crate::calibration;
use crate::driver::Context;
use crate::error::Result;
use crate::matcher::match_devices;
use crate::registry::DeviceRegistry;
use crate::session::{CaptureStats, Session, SessionConfig};
use crate::sink::FrameSink;
use tracing::{info, warn};

/// Run one capture session from discovery to shutdown.
///
/// Finding no usable device is not an error: the sink is never started and
/// empty stats are returned.
pub fn run<C: Context, K: FrameSink>(
    context: &C,
    config: &SessionConfig,
    sink: &mut K,
) -> Result<CaptureStats> {
    let records = match_devices(context, config.target)?;
    if records.is_empty() {
        warn!("No device offers color and depth at {}, nothing to run", config.target);
        return Ok(CaptureStats::default());
    }

    let registry = DeviceRegistry::from_records(&records)?;

    // Calibrate everything before touching sensor state, so a missing
    // option aborts with nothing opened.
    let calibrations = records
        .iter()
        .map(calibration::build)
        .collect::<Result<Vec<_>>>()?;
    for calibration in calibrations {
        info!("Registering camera {}", calibration.device_id);
        sink.register_camera(calibration);
    }

    let mut session = Session::new(&records, registry, config);
    session.configure()?;

    sink.start();
    session.run(sink)
}
