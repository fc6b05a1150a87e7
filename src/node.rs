//! A running camera bridge: driver, acquisition pipeline, parameters and
//! status reporting wired together.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use arc_swap::ArcSwap;
use flume::{Receiver, Sender};
use tracing::{error, info, instrument, warn};

use crate::capture::Driver;
use crate::error::{BridgeError, Result};
use crate::messages::{CameraImage, CameraInfo, Header, ImageMetaData};
use crate::params::{
    CameraControl, ControlChannel, ControlOutcome, ParamValue, ParameterRegistry, ParameterStore,
    SetParametersResult,
};
use crate::pipeline::{
    spawn_consumer, spawn_status_timer, AcquisitionQueue, FrameCounters, Publisher, StatusReport,
    StatusReporter, Topic, POLL_INTERVAL, STATUS_PERIOD,
};
use crate::utils::{lock, wait_for_camera};
use crate::BridgeConfig;

/// Depth of the live control input
const CONTROL_QUEUE_DEPTH: usize = 10;

pub struct CameraNode {
    config: BridgeConfig,
    registry: Arc<ParameterRegistry>,
    store: ParameterStore,
    driver: Option<Arc<dyn Driver>>,
    camera_running: AtomicBool,

    counters: Arc<FrameCounters>,
    queue: Arc<AcquisitionQueue>,
    consumer: Option<JoinHandle<()>>,

    images: Arc<Topic<CameraImage>>,
    meta: Arc<Topic<ImageMetaData>>,
    camera_info: Arc<ArcSwap<CameraInfo>>,

    /// Held for the whole of a parameter or control update
    control: Arc<Mutex<ControlChannel>>,
    control_input: Option<ControlInput>,

    status: Arc<Mutex<StatusReporter>>,
    status_timer: Option<(Sender<()>, JoinHandle<()>)>,
}

impl CameraNode {
    /// Bring the bridge up against `driver`.
    ///
    /// Fails if the parameter file cannot be read, the camera does not show
    /// up, or it cannot be initialized. Once this returns the camera is
    /// streaming (unless the driver refused to start, which is only logged).
    #[instrument(skip_all, fields(serial = %config.serial_number))]
    pub fn start(config: BridgeConfig, driver: Arc<dyn Driver>) -> Result<Self> {
        info!("debug: {}", config.debug);
        let registry = Arc::new(ParameterRegistry::load(&config.parameter_file).map_err(|e| {
            error!("{}", e);
            e
        })?);

        let counters = Arc::new(FrameCounters::new());
        let queue = Arc::new(AcquisitionQueue::new(Arc::clone(&counters)));
        let images = Arc::new(Topic::new(
            format!("{}/image_raw", config.node_name),
            config.image_queue_size,
        ));
        let meta = Arc::new(Topic::new(format!("{}/meta", config.node_name), 1));
        let frame_id = config.frame_id().to_string();
        if !config.camerainfo_url.is_empty() {
            info!(
                "camera info at {} is left to the host, publishing an empty calibration until set",
                config.camerainfo_url
            );
        }
        let camera_info = Arc::new(ArcSwap::from_pointee(CameraInfo {
            header: Header {
                stamp: 0,
                frame_id: frame_id.clone(),
            },
            ..CameraInfo::default()
        }));

        driver.set_debug(config.debug);
        driver.set_compute_brightness(config.compute_brightness);
        driver.set_acquisition_timeout(config.acquisition_timeout);
        info!("using camera library version: {}", driver.library_version());

        wait_for_camera(
            driver.as_ref(),
            &config.serial_number,
            config.discovery.attempts,
            config.discovery.retry_interval(),
        )
        .map_err(|e| {
            error!("giving up, camera {} not found!", config.serial_number);
            e
        })?;

        let publisher = Publisher::new(
            frame_id,
            Arc::clone(&images),
            Arc::clone(&meta),
            Arc::clone(&camera_info),
            Arc::clone(&counters),
        );
        let consumer = spawn_consumer(Arc::clone(&queue), publisher)
            .map_err(|source| BridgeError::Thread { name: "publish", source })?;

        let status = Arc::new(Mutex::new(StatusReporter::new(
            Arc::clone(&counters),
            config.serial_number.clone(),
        )));
        lock(&status).attach(Arc::clone(&driver));

        // From here on Drop tears down whatever has been started
        let mut node = Self {
            store: ParameterStore::with_overrides(config.camera_params.clone()),
            config,
            registry,
            driver: Some(Arc::clone(&driver)),
            camera_running: AtomicBool::new(false),
            counters,
            queue,
            consumer: Some(consumer),
            images,
            meta,
            camera_info,
            control: Arc::new(Mutex::new(ControlChannel::new())),
            control_input: None,
            status,
            status_timer: None,
        };

        let serial = node.config.serial_number.clone();
        driver.init_camera(&serial).map_err(|source| {
            error!("init camera failed for cam: {}", serial);
            BridgeError::InitFailed { serial, source }
        })?;
        if node.config.dump_node_map {
            info!("dumping node map!\n{}", driver.node_map_as_string());
        }

        // Some settings cannot be changed once acquisition runs
        node.create_camera_parameters();
        node.start_camera();
        node.start_status_timer()?;
        node.start_control_input()?;
        Ok(node)
    }

    /// Declare the camera parameters and send startup overrides to the camera
    fn create_camera_parameters(&self) {
        let initial = self.registry.create(&self.store);
        if let Some(driver) = self.driver.as_deref() {
            let _updates = lock(&self.control);
            for (name, value) in &initial {
                self.registry.apply(driver, name, value);
            }
        }
    }

    /// Start acquisition if it is not running. Frames go to the queue.
    pub fn start_camera(&self) {
        let Some(driver) = self.driver.as_deref() else {
            return;
        };
        if self.camera_running.load(Ordering::Acquire) {
            return;
        }
        let queue = Arc::clone(&self.queue);
        match driver.start_camera(Box::new(move |frame| {
            queue.offer(frame);
        })) {
            Ok(()) => {
                self.camera_running.store(true, Ordering::Release);
                info!("camera has pixel format: {}", driver.pixel_format());
            }
            Err(e) => error!("failed to start camera: {}", e),
        }
    }

    /// Stop acquisition. Returns whether the driver stopped a running camera.
    pub fn stop_camera(&self) -> bool {
        let Some(driver) = self.driver.as_deref() else {
            return false;
        };
        if !self.camera_running.swap(false, Ordering::AcqRel) {
            return false;
        }
        match driver.stop_camera() {
            Ok(()) => true,
            Err(e) => {
                warn!("failed to stop camera: {}", e);
                false
            }
        }
    }

    fn start_status_timer(&mut self) -> Result<()> {
        let (tx, rx) = flume::bounded(1);
        let handle = spawn_status_timer(Arc::clone(&self.status), STATUS_PERIOD, rx)
            .map_err(|source| BridgeError::Thread { name: "status", source })?;
        self.status_timer = Some((tx, handle));
        Ok(())
    }

    fn start_control_input(&mut self) -> Result<()> {
        let Some(driver) = self.driver.clone() else {
            return Ok(());
        };
        let (tx, rx) = flume::bounded(CONTROL_QUEUE_DEPTH);
        let stop = Arc::new(AtomicBool::new(false));
        let registry = Arc::clone(&self.registry);
        let control = Arc::clone(&self.control);
        let thread_stop = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("control".into())
            .spawn(move || {
                run_control_input(rx, &thread_stop, &registry, driver.as_ref(), &control)
            })
            .map_err(|source| BridgeError::Thread { name: "control", source })?;
        self.control_input = Some(ControlInput { tx, stop, handle });
        Ok(())
    }

    /// Host entry point for parameter changes
    pub fn on_set_parameters(&self, updates: &[(String, ParamValue)]) -> SetParametersResult {
        let _updates = lock(&self.control);
        let accepted = self.store.set(updates);
        self.registry
            .on_parameters_changed(self.driver.as_deref(), &accepted)
    }

    /// Host entry point for live exposure/gain control
    pub fn on_control(&self, control: CameraControl) -> ControlOutcome {
        let Some(driver) = self.driver.as_deref() else {
            warn!("got control message while driver is not ready!");
            return ControlOutcome::default();
        };
        lock(&self.control).apply_control(&self.registry, driver, control)
    }

    /// Message based alternative to [`on_control`](Self::on_control)
    pub fn control_sender(&self) -> Option<Sender<CameraControl>> {
        self.control_input.as_ref().map(|input| input.tx.clone())
    }

    pub fn subscribe_images(&self) -> Receiver<CameraImage> {
        self.images.subscribe()
    }

    pub fn subscribe_meta(&self) -> Receiver<ImageMetaData> {
        self.meta.subscribe()
    }

    /// Replace the calibration published with every image
    pub fn set_camera_info(&self, mut info: CameraInfo) {
        info.header.frame_id = self.config.frame_id().to_string();
        self.camera_info.store(Arc::new(info));
    }

    /// Report now instead of waiting for the timer
    pub fn report_status(&self) -> Option<StatusReport> {
        lock(&self.status).tick()
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn registry(&self) -> &ParameterRegistry {
        &self.registry
    }

    pub fn parameter(&self, name: &str) -> Option<ParamValue> {
        self.store.get(name)
    }

    pub fn counters(&self) -> &FrameCounters {
        &self.counters
    }

    pub fn is_camera_running(&self) -> bool {
        self.camera_running.load(Ordering::Acquire)
    }

    /// Stop everything, in order: acquisition, timers, publish thread,
    /// then the camera itself. Safe to call more than once.
    pub fn shutdown(&mut self) {
        self.stop_camera();

        if let Some((cancel, handle)) = self.status_timer.take() {
            let _ = cancel.send(());
            if handle.join().is_err() {
                warn!("status thread panicked");
            }
        }
        if let Some(input) = self.control_input.take() {
            input.stop.store(true, Ordering::Release);
            drop(input.tx);
            if input.handle.join().is_err() {
                warn!("control thread panicked");
            }
        }

        self.queue.shutdown();
        if let Some(handle) = self.consumer.take() {
            if handle.join().is_err() {
                warn!("publish thread panicked");
            }
        }

        lock(&self.status).detach();
        if let Some(driver) = self.driver.take() {
            driver.deinit_camera();
            info!("camera {} released", self.config.serial_number);
        }
    }
}

impl Drop for CameraNode {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Control thread plumbing. Callers may hold clones of `tx`, so the thread
/// also watches `stop`.
struct ControlInput {
    tx: Sender<CameraControl>,
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

fn run_control_input(
    rx: Receiver<CameraControl>,
    stop: &AtomicBool,
    registry: &ParameterRegistry,
    driver: &dyn Driver,
    control: &Mutex<ControlChannel>,
) {
    while !stop.load(Ordering::Acquire) {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(msg) => {
                lock(control).apply_control(registry, driver, msg);
            }
            Err(flume::RecvTimeoutError::Timeout) => {}
            Err(flume::RecvTimeoutError::Disconnected) => break,
        }
    }
}
