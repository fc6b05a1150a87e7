//! Fast path for live exposure and gain control.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::capture::Driver;
use crate::params::{verify, ParameterRegistry};

/// Registry name the exposure time register is looked up under
pub const EXPOSURE_TIME: &str = "exposure_time";
/// Registry name the gain register is looked up under
pub const GAIN: &str = "gain";

/// Live control request
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraControl {
    /// Exposure time in microseconds, 0 leaves it unchanged
    pub exposure_time: u32,
    /// Gain in dB, [`CameraControl::NO_GAIN`] leaves it unchanged
    pub gain: f32,
}

impl CameraControl {
    /// Gain value meaning "no gain update requested"
    pub const NO_GAIN: f32 = f32::MIN;

    pub fn exposure(exposure_time: u32) -> Self {
        Self {
            exposure_time,
            gain: Self::NO_GAIN,
        }
    }

    pub fn gain(gain: f32) -> Self {
        Self {
            exposure_time: 0,
            gain,
        }
    }
}

/// Last values sent to the camera, used to drop repeated requests
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlState {
    pub exposure_time: u32,
    pub gain: f32,
}

impl Default for ControlState {
    fn default() -> Self {
        Self {
            exposure_time: 0,
            gain: CameraControl::NO_GAIN,
        }
    }
}

/// Which of the two registers a control request actually wrote
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControlOutcome {
    pub exposure_changed: bool,
    pub gain_changed: bool,
}

#[derive(Debug, Default)]
pub struct ControlChannel {
    state: ControlState,
}

impl ControlChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ControlState {
        self.state
    }

    /// Apply a control request. Exposure and gain are handled separately:
    /// a failure on one does not stop the other.
    pub fn apply_control(
        &mut self,
        registry: &ParameterRegistry,
        driver: &dyn Driver,
        control: CameraControl,
    ) -> ControlOutcome {
        let mut outcome = ControlOutcome::default();
        let et = control.exposure_time;
        let gain = control.gain;

        if et > 0 && et != self.state.exposure_time
            && write(registry, driver, EXPOSURE_TIME, f64::from(et))
        {
            self.state.exposure_time = et;
            outcome.exposure_changed = true;
        }

        if gain > CameraControl::NO_GAIN && gain != self.state.gain
            && write(registry, driver, GAIN, f64::from(gain))
        {
            self.state.gain = gain;
            outcome.gain_changed = true;
        }

        if outcome.exposure_changed {
            info!("changed exposure time to {}us", et);
        }
        if outcome.gain_changed {
            info!("changed gain to {}db", gain);
        }
        outcome
    }
}

/// Write `value` to the node registered as `name`. Returns false if the
/// name is not registered or the driver raised; a write the camera did not
/// honour exactly still counts as sent.
fn write(registry: &ParameterRegistry, driver: &dyn Driver, name: &str, value: f64) -> bool {
    let Some(desc) = registry.get(name) else {
        warn!("no node name defined for {}, check .cfg file!", name);
        return false;
    };
    match verify::set_double(driver, &desc.node, value) {
        Ok(_) => true,
        Err(e) => {
            warn!("failed to control {}: {}", name, e);
            false
        }
    }
}
