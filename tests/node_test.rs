//! End-to-end tests of a bridge node running against the simulated camera.

use std::io::Write;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use camera_bridge::messages::CameraInfo;
use camera_bridge::{
    BridgeConfig, BridgeError, CameraControl, CameraNode, DriverError, ParamValue, SimDriver,
};
use tempfile::NamedTempFile;

const SERIAL: &str = "16387017";

const PARAMETERS: &str = r#"
# name            kind   node
exposure_auto     enum   ExposureAuto
exposure_time     float  ExposureTime
gain              float  Gain
frame_rate        float  AcquisitionFrameRate
binning           int    BinningHorizontal
trigger_mode      enum   TriggerMode
"#;

fn parameter_file() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(PARAMETERS.as_bytes()).unwrap();
    file
}

fn config(parameters: &NamedTempFile) -> BridgeConfig {
    let mut cfg = BridgeConfig {
        node_name: "cam_test".into(),
        serial_number: SERIAL.into(),
        parameter_file: parameters.path().to_path_buf(),
        ..BridgeConfig::default()
    };
    cfg.discovery.attempts = 3;
    cfg.discovery.retry_interval_ms = 1;
    cfg
}

/// Simulated camera that only produces frames when triggered
fn manual_sim() -> Arc<SimDriver> {
    Arc::new(SimDriver::new(SERIAL).with_frame_rate(0.0))
}

fn wait_until(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    done()
}

#[test]
fn startup_configures_and_starts_camera() {
    let params = parameter_file();
    let sim = manual_sim();
    let mut cfg = config(&params);
    cfg.compute_brightness = true;
    cfg.acquisition_timeout = 1.5;

    let node = CameraNode::start(cfg, sim.clone()).unwrap();
    assert_eq!(sim.initialized_serial().as_deref(), Some(SERIAL));
    assert!(sim.is_running());
    assert!(node.is_camera_running());
    assert!(sim.compute_brightness());
    assert_eq!(sim.acquisition_timeout(), 1.5);
    assert_eq!(node.registry().len(), 6);
    // nothing to send without overrides
    assert!(sim.writes().is_empty());
}

#[test]
fn overrides_are_written_before_acquisition() {
    let params = parameter_file();
    let sim = manual_sim();
    let mut cfg = config(&params);
    cfg.camera_params.insert("exposure_time".into(), ParamValue::Float(5000.0));
    cfg.camera_params.insert("binning".into(), ParamValue::Int(2));
    cfg.camera_params.insert("trigger_mode".into(), ParamValue::Enum("On".into()));
    cfg.camera_params.insert("not_in_file".into(), ParamValue::Int(1));

    let node = CameraNode::start(cfg, sim.clone()).unwrap();
    assert_eq!(sim.register("ExposureTime"), Some(ParamValue::Float(5000.0)));
    assert_eq!(sim.register("BinningHorizontal"), Some(ParamValue::Int(2)));
    assert_eq!(sim.register("TriggerMode"), Some(ParamValue::Enum("On".into())));
    assert_eq!(sim.writes().len(), 3);
    assert_eq!(node.parameter("binning"), Some(ParamValue::Int(2)));
    assert_eq!(node.parameter("gain"), None);
}

#[test]
fn mistyped_override_falls_back_to_default() {
    let params = parameter_file();
    let sim = manual_sim();
    let mut cfg = config(&params);
    cfg.camera_params.insert("gain".into(), ParamValue::Enum("loud".into()));

    let node = CameraNode::start(cfg, sim.clone()).unwrap();
    assert!(sim.writes().iter().all(|w| w.node != "Gain"));
    assert_eq!(node.parameter("gain"), None);
}

#[test]
fn triggered_frame_reaches_both_sinks() {
    let params = parameter_file();
    let sim = manual_sim();
    let mut cfg = config(&params);
    cfg.frame_id = Some("chameleon".into());
    let node = CameraNode::start(cfg, sim.clone()).unwrap();

    node.set_camera_info(CameraInfo {
        width: 64,
        height: 48,
        distortion_model: "plumb_bob".into(),
        ..CameraInfo::default()
    });
    let images = node.subscribe_images();
    let meta = node.subscribe_meta();
    assert!(sim.trigger());

    let msg = images.recv_timeout(Duration::from_secs(3)).unwrap();
    assert_eq!(msg.image.encoding, "bayer_rggb8");
    assert_eq!((msg.image.width, msg.image.height), (64, 48));
    assert_eq!(msg.image.step, 64);
    assert_eq!(msg.image.data.len(), 64 * 48);
    assert_eq!(msg.image.header.frame_id, "chameleon");
    assert_eq!(msg.camera_info.header, msg.image.header);
    assert_eq!(msg.camera_info.distortion_model, "plumb_bob");

    let m = meta.recv_timeout(Duration::from_secs(3)).unwrap();
    assert_eq!(m.header, msg.image.header);
    assert_eq!(m.exposure_time, 10_000);
    assert_eq!(m.camera_time, msg.image.header.stamp);
    assert_eq!(node.counters().published(), 1);
}

#[test]
fn frames_without_image_subscribers_are_not_counted() {
    let params = parameter_file();
    let sim = manual_sim();
    let node = CameraNode::start(config(&params), sim.clone()).unwrap();
    let meta = node.subscribe_meta();

    assert!(sim.trigger());
    meta.recv_timeout(Duration::from_secs(3)).unwrap();
    assert_eq!(node.counters().published(), 0);
}

#[test]
fn parameter_updates_reach_the_camera() {
    let params = parameter_file();
    let sim = manual_sim();
    let node = CameraNode::start(config(&params), sim.clone()).unwrap();

    let result = node.on_set_parameters(&[
        ("gain".into(), ParamValue::Float(6.0)),
        ("binning".into(), ParamValue::Float(3.0)),
        ("undeclared".into(), ParamValue::Int(1)),
        ("exposure_time".into(), ParamValue::Bool(true)),
    ]);
    assert!(result.successful);
    assert_eq!(result.reason, "all good!");
    assert_eq!(sim.register("Gain"), Some(ParamValue::Float(6.0)));
    assert_eq!(sim.register("BinningHorizontal"), Some(ParamValue::Int(3)));
    assert_eq!(sim.register("ExposureTime"), Some(ParamValue::Float(10_000.0)));
    assert_eq!(sim.writes().len(), 2);
    assert_eq!(node.parameter("gain"), Some(ParamValue::Float(6.0)));
}

#[test]
fn rejected_parameter_update_still_reports_success() {
    let params = parameter_file();
    let sim = manual_sim();
    let node = CameraNode::start(config(&params), sim.clone()).unwrap();

    let result = node.on_set_parameters(&[(
        "trigger_mode".into(),
        ParamValue::Enum("Sometimes".into()),
    )]);
    assert!(result.successful);
    assert_eq!(sim.register("TriggerMode"), Some(ParamValue::Enum("Off".into())));
}

#[test]
fn control_messages_update_exposure_and_gain() {
    let params = parameter_file();
    let sim = manual_sim();
    let node = CameraNode::start(config(&params), sim.clone()).unwrap();

    let outcome = node.on_control(CameraControl {
        exposure_time: 2500,
        gain: 1.5,
    });
    assert!(outcome.exposure_changed && outcome.gain_changed);
    assert_eq!(sim.register("ExposureTime"), Some(ParamValue::Float(2500.0)));
    assert_eq!(sim.register("Gain"), Some(ParamValue::Float(1.5)));

    // same request again is not sent
    sim.clear_writes();
    let again = node.on_control(CameraControl {
        exposure_time: 2500,
        gain: 1.5,
    });
    assert!(!again.exposure_changed && !again.gain_changed);
    assert!(sim.writes().is_empty());

    let tx = node.control_sender().unwrap();
    tx.send(CameraControl::exposure(4000)).unwrap();
    assert!(wait_until(Duration::from_secs(3), || {
        sim.register("ExposureTime") == Some(ParamValue::Float(4000.0))
    }));
    assert_eq!(sim.register("Gain"), Some(ParamValue::Float(1.5)));
}

#[test]
fn missing_parameter_file_is_fatal() {
    let params = parameter_file();
    let mut cfg = config(&params);
    cfg.parameter_file = params.path().with_extension("missing");
    let sim = manual_sim();

    let result = CameraNode::start(cfg, sim.clone());
    assert!(matches!(result, Err(BridgeError::ParameterFile(_))));
    assert_eq!(sim.initialized_serial(), None);
}

#[test]
fn absent_camera_gives_up_after_configured_attempts() {
    let params = parameter_file();
    let sim = Arc::new(SimDriver::new("99999999"));

    let result = CameraNode::start(config(&params), sim.clone());
    match result {
        Err(BridgeError::CameraNotFound { serial, attempts }) => {
            assert_eq!(serial, SERIAL);
            assert_eq!(attempts, 3);
        }
        Err(e) => panic!("unexpected error: {e}"),
        Ok(_) => panic!("node started without a camera"),
    }
    assert!(!sim.is_running());
}

#[test]
fn late_camera_is_found_on_retry() {
    let params = parameter_file();
    let sim = Arc::new(SimDriver::new(SERIAL).with_frame_rate(0.0).hidden_for(2));
    let node = CameraNode::start(config(&params), sim.clone()).unwrap();
    assert!(node.is_camera_running());
}

#[test]
fn init_failure_is_fatal() {
    let params = parameter_file();
    let sim = manual_sim();
    sim.fail_init(DriverError::Sdk("device busy".into()));

    let result = CameraNode::start(config(&params), sim.clone());
    match result {
        Err(BridgeError::InitFailed { serial, source }) => {
            assert_eq!(serial, SERIAL);
            assert_eq!(source, DriverError::Sdk("device busy".into()));
        }
        Err(e) => panic!("unexpected error: {e}"),
        Ok(_) => panic!("node started with a broken camera"),
    }
    assert!(!sim.is_running());
}

#[test]
fn shutdown_stops_everything_promptly() {
    let params = parameter_file();
    let sim = Arc::new(SimDriver::new(SERIAL).with_frame_rate(200.0));
    let mut node = CameraNode::start(config(&params), sim.clone()).unwrap();
    let images = node.subscribe_images();
    images.recv_timeout(Duration::from_secs(3)).unwrap();

    let started = Instant::now();
    node.shutdown();
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(!sim.is_running());
    assert_eq!(sim.initialized_serial(), None);
    assert!(!node.is_camera_running());
    assert!(node.report_status().is_none());

    // second call is a no-op
    node.shutdown();

    drop(node);
    while images.try_recv().is_ok() {}
    assert!(images.recv_timeout(Duration::from_millis(100)).is_err());
    assert!(images.is_disconnected());
}

#[test]
fn stop_and_restart_camera() {
    let params = parameter_file();
    let sim = manual_sim();
    let node = CameraNode::start(config(&params), sim.clone()).unwrap();

    assert!(node.stop_camera());
    assert!(!sim.is_running());
    assert!(!sim.trigger());
    assert!(!node.stop_camera());

    node.start_camera();
    assert!(sim.is_running());
    let images = node.subscribe_images();
    assert!(sim.trigger());
    images.recv_timeout(Duration::from_secs(3)).unwrap();
}

#[test]
fn shutdown_does_not_wait_for_control_senders() {
    let params = parameter_file();
    let sim = manual_sim();
    let mut node = CameraNode::start(config(&params), sim.clone()).unwrap();
    let tx = node.control_sender().unwrap();

    let started = Instant::now();
    node.shutdown();
    assert!(started.elapsed() < Duration::from_secs(3));
    assert!(node.control_sender().is_none());
    // the control thread is gone, nothing receives this
    assert!(tx.send(CameraControl::gain(3.0)).is_err());
}
