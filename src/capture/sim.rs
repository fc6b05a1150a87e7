//! Simulated camera for tests, demos and bench work without hardware.
//!
//! Keeps a small GenICam-like register table, generates frames on its own
//! thread (or on demand through [`SimDriver::trigger`]) and records every
//! register write so callers can check exactly what reached the "camera".

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::capture::driver::{Driver, FrameCallback, WriteReply, WriteResult};
use crate::capture::frame::{Frame, FrameMetadata, FramePtr, PixelFormat};
use crate::error::DriverError;
use crate::params::ParamValue;
use crate::utils::lock;

/// A write as seen by the simulated camera, successful or not
#[derive(Debug, Clone, PartialEq)]
pub struct WriteRecord {
    pub node: String,
    pub value: ParamValue,
}

/// Scripted misbehaviour for writes to one node
#[derive(Debug, Clone)]
pub enum SimFailure {
    /// Reply with this status and leave the register untouched
    Status(String),
    /// Raise this error
    Error(DriverError),
    /// Accept the write but report this value as applied
    Applied(ParamValue),
}

#[derive(Debug, Clone)]
struct SimRegister {
    value: ParamValue,
    min: Option<f64>,
    max: Option<f64>,
    entries: Vec<String>,
    writable: bool,
}

impl SimRegister {
    fn new(value: ParamValue) -> Self {
        Self {
            value,
            min: None,
            max: None,
            entries: Vec::new(),
            writable: true,
        }
    }

    fn clamp(&self, v: f64) -> f64 {
        let v = self.min.map_or(v, |min| v.max(min));
        self.max.map_or(v, |max| v.min(max))
    }
}

/// State shared with the acquisition thread
struct SimState {
    registers: Mutex<HashMap<String, SimRegister>>,
    compute_brightness: AtomicBool,
    received: AtomicU64,
    width: u32,
    height: u32,
}

struct Acquisition {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    callback: Arc<FrameCallback>,
    started: Instant,
}

/// In-process stand-in for the camera SDK
pub struct SimDriver {
    cameras: Vec<String>,
    hidden_refreshes: AtomicU32,
    visible: AtomicBool,
    frame_rate: f64,
    state: Arc<SimState>,
    initialized: Mutex<Option<String>>,
    acquisition: Mutex<Option<Acquisition>>,
    failures: Mutex<HashMap<String, SimFailure>>,
    init_failure: Mutex<Option<DriverError>>,
    writes: Mutex<Vec<WriteRecord>>,
    debug: AtomicBool,
    acquisition_timeout: Mutex<f64>,
}

impl SimDriver {
    /// A camera with the given serial, 64x48 BayerRG8 at 30 fps
    pub fn new(serial: impl Into<String>) -> Self {
        let mut registers = HashMap::new();
        let mut add = |name: &str, reg: SimRegister| {
            registers.insert(name.to_string(), reg);
        };
        add(
            "ExposureTime",
            SimRegister {
                min: Some(10.0),
                max: Some(1_000_000.0),
                ..SimRegister::new(ParamValue::Float(10_000.0))
            },
        );
        add(
            "Gain",
            SimRegister {
                min: Some(0.0),
                max: Some(18.0),
                ..SimRegister::new(ParamValue::Float(0.0))
            },
        );
        add(
            "AcquisitionFrameRate",
            SimRegister {
                min: Some(1.0),
                max: Some(200.0),
                ..SimRegister::new(ParamValue::Float(30.0))
            },
        );
        add(
            "AcquisitionFrameRateEnable",
            SimRegister::new(ParamValue::Bool(false)),
        );
        add(
            "BinningHorizontal",
            SimRegister {
                min: Some(1.0),
                max: Some(4.0),
                ..SimRegister::new(ParamValue::Int(1))
            },
        );
        for auto in ["ExposureAuto", "GainAuto"] {
            add(
                auto,
                SimRegister {
                    entries: vec!["Off".into(), "Once".into(), "Continuous".into()],
                    ..SimRegister::new(ParamValue::Enum("Continuous".into()))
                },
            );
        }
        add(
            "TriggerMode",
            SimRegister {
                entries: vec!["Off".into(), "On".into()],
                ..SimRegister::new(ParamValue::Enum("Off".into()))
            },
        );
        add(
            "PixelFormat",
            SimRegister {
                entries: ["BayerRG8", "BayerGB8", "RGB8", "Mono8", "Mono16"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                ..SimRegister::new(ParamValue::Enum("BayerRG8".into()))
            },
        );
        add(
            "DeviceSerialNumber",
            SimRegister {
                writable: false,
                ..SimRegister::new(ParamValue::Enum("sim".into()))
            },
        );

        Self {
            cameras: vec![serial.into()],
            hidden_refreshes: AtomicU32::new(0),
            visible: AtomicBool::new(true),
            frame_rate: 30.0,
            state: Arc::new(SimState {
                registers: Mutex::new(registers),
                compute_brightness: AtomicBool::new(false),
                received: AtomicU64::new(0),
                width: 64,
                height: 48,
            }),
            initialized: Mutex::new(None),
            acquisition: Mutex::new(None),
            failures: Mutex::new(HashMap::new()),
            init_failure: Mutex::new(None),
            writes: Mutex::new(Vec::new()),
            debug: AtomicBool::new(false),
            acquisition_timeout: Mutex::new(3.0),
        }
    }

    /// Frames per second generated after `start_camera`. Zero disables the
    /// acquisition thread; frames then only come from [`trigger`](Self::trigger).
    pub fn with_frame_rate(mut self, fps: f64) -> Self {
        self.frame_rate = fps.max(0.0);
        self
    }

    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        if let Some(state) = Arc::get_mut(&mut self.state) {
            state.width = width;
            state.height = height;
        }
        self
    }

    /// Camera stays invisible for the first `refreshes` list refreshes
    pub fn hidden_for(self, refreshes: u32) -> Self {
        self.hidden_refreshes.store(refreshes, Ordering::Relaxed);
        self.visible.store(refreshes == 0, Ordering::Relaxed);
        self
    }

    /// Add or replace a register, clamped to `range` when numeric
    pub fn with_register(
        self,
        node: &str,
        value: ParamValue,
        range: Option<(f64, f64)>,
    ) -> Self {
        let reg = SimRegister {
            min: range.map(|r| r.0),
            max: range.map(|r| r.1),
            ..SimRegister::new(value)
        };
        lock(&self.state.registers).insert(node.to_string(), reg);
        self
    }

    pub fn fail_writes(&self, node: &str, failure: SimFailure) {
        lock(&self.failures).insert(node.to_string(), failure);
    }

    pub fn clear_failures(&self) {
        lock(&self.failures).clear();
        *lock(&self.init_failure) = None;
    }

    /// Make the next `init_camera` calls fail with `error`
    pub fn fail_init(&self, error: DriverError) {
        *lock(&self.init_failure) = Some(error);
    }

    pub fn writes(&self) -> Vec<WriteRecord> {
        lock(&self.writes).clone()
    }

    pub fn clear_writes(&self) {
        lock(&self.writes).clear();
    }

    pub fn register(&self, node: &str) -> Option<ParamValue> {
        lock(&self.state.registers)
            .get(node)
            .map(|r| r.value.clone())
    }

    pub fn initialized_serial(&self) -> Option<String> {
        lock(&self.initialized).clone()
    }

    pub fn is_running(&self) -> bool {
        lock(&self.acquisition).is_some()
    }

    pub fn debug(&self) -> bool {
        self.debug.load(Ordering::Relaxed)
    }

    pub fn compute_brightness(&self) -> bool {
        self.state.compute_brightness.load(Ordering::Relaxed)
    }

    pub fn acquisition_timeout(&self) -> f64 {
        *lock(&self.acquisition_timeout)
    }

    /// Capture one frame right now and hand it to the registered callback.
    /// Returns false when acquisition is not running.
    pub fn trigger(&self) -> bool {
        let callback = match lock(&self.acquisition).as_ref() {
            Some(acq) => Arc::clone(&acq.callback),
            None => return false,
        };
        self.state.emit(&callback);
        true
    }

    fn write(&self, node: &str, requested: ParamValue) -> Result<(String, ParamValue), DriverError> {
        lock(&self.writes).push(WriteRecord {
            node: node.to_string(),
            value: requested.clone(),
        });

        let failure = lock(&self.failures).get(node).cloned();
        match failure {
            Some(SimFailure::Error(e)) => return Err(e),
            Some(SimFailure::Status(status)) => {
                let current = self
                    .register(node)
                    .ok_or_else(|| DriverError::NodeNotFound(node.to_string()))?;
                return Ok((status, current));
            }
            Some(SimFailure::Applied(applied)) => {
                return Ok((super::driver::STATUS_OK.to_string(), applied));
            }
            None => {}
        }

        let mut registers = lock(&self.state.registers);
        let reg = registers
            .get_mut(node)
            .ok_or_else(|| DriverError::NodeNotFound(node.to_string()))?;
        if !reg.writable {
            return Err(DriverError::NotWritable(node.to_string()));
        }

        let applied = match (&reg.value, requested) {
            (ParamValue::Float(_), ParamValue::Float(v)) => ParamValue::Float(reg.clamp(v)),
            (ParamValue::Int(_), ParamValue::Int(v)) => {
                ParamValue::Int(reg.clamp(v as f64).round() as i64)
            }
            (ParamValue::Bool(_), ParamValue::Bool(v)) => ParamValue::Bool(v),
            (ParamValue::Enum(_), ParamValue::Enum(v)) => {
                if !reg.entries.is_empty() && !reg.entries.contains(&v) {
                    return Ok((format!("entry {v} not available"), reg.value.clone()));
                }
                ParamValue::Enum(v)
            }
            (actual, requested) => {
                return Err(DriverError::WrongNodeType {
                    node: node.to_string(),
                    actual: actual.type_name(),
                    requested: requested.type_name(),
                })
            }
        };
        reg.value = applied.clone();
        debug!(node, value = %applied, "sim register written");
        Ok((super::driver::STATUS_OK.to_string(), applied))
    }
}

impl SimState {
    fn float_register(&self, node: &str) -> Option<(f64, Option<f64>)> {
        match lock(&self.registers).get(node) {
            Some(SimRegister {
                value: ParamValue::Float(v),
                max,
                ..
            }) => Some((*v, *max)),
            _ => None,
        }
    }

    fn pixel_format(&self) -> PixelFormat {
        match lock(&self.registers).get("PixelFormat") {
            Some(SimRegister {
                value: ParamValue::Enum(name),
                ..
            }) => name.parse().unwrap_or(PixelFormat::Invalid),
            _ => PixelFormat::Invalid,
        }
    }

    fn capture(&self) -> Frame {
        let sequence = self.received.fetch_add(1, Ordering::Relaxed);
        let format = self.pixel_format();
        let stride = self.width * format.bytes_per_pixel().max(1);
        let len = (stride * self.height) as usize;
        let data: Vec<u8> = (0..len)
            .map(|i| ((i as u64 + sequence) % 256) as u8)
            .collect();

        let brightness = if self.compute_brightness.load(Ordering::Relaxed) && len > 0 {
            (data.iter().map(|&b| b as u64).sum::<u64>() / len as u64) as u32
        } else {
            0
        };
        let (exposure, max_exposure) = self
            .float_register("ExposureTime")
            .unwrap_or((0.0, None));
        let gain = self.float_register("Gain").map_or(0.0, |(g, _)| g);
        let image_time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_nanos() as u64);

        Frame {
            data: Bytes::from(data),
            meta: FrameMetadata {
                width: self.width,
                height: self.height,
                stride,
                format,
                brightness,
                exposure_time: exposure as u32,
                max_exposure_time: max_exposure.unwrap_or(exposure) as u32,
                gain: gain as f32,
            },
            image_time,
        }
    }

    fn emit(&self, callback: &FrameCallback) {
        let frame: FramePtr = Arc::new(self.capture());
        callback(frame);
    }
}

impl Driver for SimDriver {
    fn library_version(&self) -> String {
        format!("sim {}", env!("CARGO_PKG_VERSION"))
    }

    fn refresh_camera_list(&self) {
        let hidden = self.hidden_refreshes.load(Ordering::Relaxed);
        if hidden > 0 {
            self.hidden_refreshes.store(hidden - 1, Ordering::Relaxed);
            self.visible.store(false, Ordering::Relaxed);
        } else {
            self.visible.store(true, Ordering::Relaxed);
        }
    }

    fn serial_numbers(&self) -> Vec<String> {
        if self.visible.load(Ordering::Relaxed) {
            self.cameras.clone()
        } else {
            Vec::new()
        }
    }

    fn init_camera(&self, serial: &str) -> Result<(), DriverError> {
        if let Some(e) = lock(&self.init_failure).clone() {
            return Err(e);
        }
        if !self.visible.load(Ordering::Relaxed) || !self.cameras.iter().any(|c| c == serial) {
            return Err(DriverError::Sdk(format!("no camera with serial {serial}")));
        }
        info!(serial, "sim camera initialized");
        *lock(&self.initialized) = Some(serial.to_string());
        Ok(())
    }

    fn deinit_camera(&self) {
        if let Err(e) = self.stop_camera() {
            debug!("stop during deinit: {}", e);
        }
        *lock(&self.initialized) = None;
    }

    fn start_camera(&self, callback: FrameCallback) -> Result<(), DriverError> {
        if lock(&self.initialized).is_none() {
            return Err(DriverError::NotInitialized);
        }
        let mut acquisition = lock(&self.acquisition);
        if acquisition.is_some() {
            return Err(DriverError::Sdk("acquisition already running".into()));
        }

        self.state.received.store(0, Ordering::Relaxed);
        let callback = Arc::new(callback);
        let stop = Arc::new(AtomicBool::new(false));
        let thread = if self.frame_rate > 0.0 {
            let period = Duration::from_secs_f64(1.0 / self.frame_rate);
            let state = Arc::clone(&self.state);
            let stop = Arc::clone(&stop);
            let callback = Arc::clone(&callback);
            let handle = thread::Builder::new()
                .name("sim-acquisition".into())
                .spawn(move || {
                    let mut next = Instant::now();
                    while !stop.load(Ordering::Acquire) {
                        state.emit(&callback);
                        next += period;
                        let now = Instant::now();
                        if next > now {
                            thread::sleep(next - now);
                        } else {
                            next = now;
                        }
                    }
                })
                .map_err(|e| DriverError::Sdk(format!("cannot spawn acquisition thread: {e}")))?;
            Some(handle)
        } else {
            None
        };

        *acquisition = Some(Acquisition {
            stop,
            thread,
            callback,
            started: Instant::now(),
        });
        Ok(())
    }

    fn stop_camera(&self) -> Result<(), DriverError> {
        let acquisition = lock(&self.acquisition).take();
        let Some(mut acq) = acquisition else {
            return Err(DriverError::Sdk("acquisition not running".into()));
        };
        acq.stop.store(true, Ordering::Release);
        if let Some(handle) = acq.thread.take() {
            if handle.join().is_err() {
                warn!("sim acquisition thread panicked");
            }
        }
        Ok(())
    }

    fn set_double(&self, node: &str, value: f64) -> WriteResult<f64> {
        match self.write(node, ParamValue::Float(value))? {
            (status, ParamValue::Float(v)) => Ok(WriteReply { status, applied: v }),
            (status, _) => Ok(WriteReply { status, applied: value }),
        }
    }

    fn set_int(&self, node: &str, value: i64) -> WriteResult<i64> {
        match self.write(node, ParamValue::Int(value))? {
            (status, ParamValue::Int(v)) => Ok(WriteReply { status, applied: v }),
            (status, _) => Ok(WriteReply { status, applied: value }),
        }
    }

    fn set_bool(&self, node: &str, value: bool) -> WriteResult<bool> {
        match self.write(node, ParamValue::Bool(value))? {
            (status, ParamValue::Bool(v)) => Ok(WriteReply { status, applied: v }),
            (status, _) => Ok(WriteReply { status, applied: value }),
        }
    }

    fn set_enum(&self, node: &str, value: &str) -> WriteResult<String> {
        let (status, applied) = self.write(node, ParamValue::Enum(value.to_string()))?;
        Ok(WriteReply {
            status,
            applied: applied.to_string(),
        })
    }

    fn receive_frame_rate(&self) -> f64 {
        match lock(&self.acquisition).as_ref() {
            Some(acq) => {
                let secs = acq.started.elapsed().as_secs_f64();
                if secs > 0.0 {
                    self.state.received.load(Ordering::Relaxed) as f64 / secs
                } else {
                    0.0
                }
            }
            None => 0.0,
        }
    }

    fn pixel_format(&self) -> PixelFormat {
        self.state.pixel_format()
    }

    fn node_map_as_string(&self) -> String {
        let registers = lock(&self.state.registers);
        let mut names: Vec<_> = registers.keys().collect();
        names.sort();
        names
            .into_iter()
            .map(|name| format!("{name}: {}\n", registers[name].value))
            .collect()
    }

    fn set_debug(&self, on: bool) {
        self.debug.store(on, Ordering::Relaxed);
    }

    fn set_compute_brightness(&self, on: bool) {
        self.state.compute_brightness.store(on, Ordering::Relaxed);
    }

    fn set_acquisition_timeout(&self, seconds: f64) {
        *lock(&self.acquisition_timeout) = seconds;
    }
}

impl Drop for SimDriver {
    fn drop(&mut self) {
        if self.is_running() {
            let _ = self.stop_camera();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn doubles_are_clamped_to_range() {
        let sim = SimDriver::new("1");
        let reply = sim.set_double("Gain", 30.0).unwrap();
        assert!(reply.is_ok());
        assert_eq!(reply.applied, 18.0);
        assert_eq!(sim.register("Gain"), Some(ParamValue::Float(18.0)));
    }

    #[test]
    fn unknown_enum_entry_is_refused() {
        let sim = SimDriver::new("1");
        let reply = sim.set_enum("TriggerMode", "Sometimes").unwrap();
        assert!(!reply.is_ok());
        assert_eq!(reply.applied, "Off");
    }

    #[test]
    fn wrong_node_type_raises() {
        let sim = SimDriver::new("1");
        assert!(matches!(
            sim.set_bool("Gain", true),
            Err(DriverError::WrongNodeType { .. })
        ));
        assert!(matches!(
            sim.set_double("NoSuchNode", 1.0),
            Err(DriverError::NodeNotFound(_))
        ));
        assert_eq!(sim.writes().len(), 2);
    }

    #[test]
    fn manual_trigger_reaches_callback() {
        let sim = SimDriver::new("1").with_frame_rate(0.0);
        sim.init_camera("1").unwrap();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        sim.start_camera(Box::new(move |frame| {
            assert_eq!(frame.meta.format, PixelFormat::BayerRg8);
            counter.fetch_add(1, Ordering::Relaxed);
        }))
        .unwrap();
        assert!(sim.trigger());
        assert!(sim.trigger());
        sim.stop_camera().unwrap();
        assert!(!sim.trigger());
        assert_eq!(seen.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn hidden_camera_appears_after_refreshes() {
        let sim = SimDriver::new("42").hidden_for(2);
        sim.refresh_camera_list();
        assert!(sim.serial_numbers().is_empty());
        sim.refresh_camera_list();
        assert!(sim.serial_numbers().is_empty());
        sim.refresh_camera_list();
        assert_eq!(sim.serial_numbers(), vec!["42".to_string()]);
    }
}
