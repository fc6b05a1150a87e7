pub mod capture;
pub mod error;
pub mod messages;
pub mod node;
pub mod params;
pub mod pipeline;
pub mod utils;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use capture::{Driver, Frame, FramePtr, PixelFormat, SimDriver};
pub use error::{BridgeError, DriverError, ParamError, PublishError, Result};
pub use node::CameraNode;
pub use params::{CameraControl, ParamKind, ParamValue, ParameterRegistry};

/// Environment variables prefixed with this override config file values
pub const ENV_PREFIX: &str = "CAMERA_BRIDGE";

/// Startup parameters of a bridge node
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Name of this node, prefix of its sink names
    pub node_name: String,
    pub serial_number: String,
    /// Turn on driver debug output
    pub debug: bool,
    /// Where the calibration lives; loading it is up to the host
    pub camerainfo_url: String,
    /// Frame id stamped on every message, defaults to `node_name`
    pub frame_id: Option<String>,
    /// Log the camera's node map after init
    pub dump_node_map: bool,
    /// Messages each image subscriber may have queued
    pub image_queue_size: usize,
    pub compute_brightness: bool,
    /// Seconds the driver waits for a frame
    pub acquisition_timeout: f64,
    /// Parameter definition file
    pub parameter_file: PathBuf,
    pub discovery: DiscoveryConfig,
    /// Initial values for parameters from the definition file
    pub camera_params: HashMap<String, ParamValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub attempts: u32,
    pub retry_interval_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            node_name: "camera_bridge".into(),
            serial_number: "missing_serial_number".into(),
            debug: false,
            camerainfo_url: String::new(),
            frame_id: None,
            dump_node_map: false,
            image_queue_size: 4,
            compute_brightness: false,
            acquisition_timeout: 3.0,
            parameter_file: PathBuf::from("parameters.cfg"),
            discovery: DiscoveryConfig::default(),
            camera_params: HashMap::new(),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            attempts: 5,
            retry_interval_ms: 1000,
        }
    }
}

impl DiscoveryConfig {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

impl BridgeConfig {
    /// Defaults, then `path` if given, then `CAMERA_BRIDGE_*` variables
    /// (nested keys separated by `__`).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    pub fn frame_id(&self) -> &str {
        match &self.frame_id {
            Some(id) if !id.is_empty() => id,
            _ => &self.node_name,
        }
    }
}
