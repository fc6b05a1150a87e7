//! Narrow capability interface to the camera SDK.
//!
//! Everything the bridge needs from the vendor library goes through
//! [`Driver`]. The SDK owns the acquisition thread; the bridge only hands it
//! a [`FrameCallback`] and gets frames posted back.

use crate::capture::frame::{FramePtr, PixelFormat};
use crate::error::DriverError;

/// Invoked by the driver, on its own thread, once per captured frame
pub type FrameCallback = Box<dyn Fn(FramePtr) + Send + Sync + 'static>;

/// Status string a driver returns when a write went through
pub const STATUS_OK: &str = "OK";

/// Outcome of a register write as reported by the driver
#[derive(Debug, Clone, PartialEq)]
pub struct WriteReply<T> {
    /// `"OK"` on success, otherwise a driver specific message
    pub status: String,
    /// Value the camera actually holds after the write
    pub applied: T,
}

impl<T> WriteReply<T> {
    pub fn ok(applied: T) -> Self {
        Self {
            status: STATUS_OK.to_string(),
            applied,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == STATUS_OK
    }
}

pub type WriteResult<T> = Result<WriteReply<T>, DriverError>;

/// Camera SDK capability
///
/// Writer calls may interleave with the capture callback; the bridge never
/// interleaves writer calls with each other.
pub trait Driver: Send + Sync {
    fn library_version(&self) -> String;

    fn refresh_camera_list(&self);
    fn serial_numbers(&self) -> Vec<String>;

    fn init_camera(&self, serial: &str) -> Result<(), DriverError>;
    fn deinit_camera(&self);

    /// Start acquisition. `callback` runs on the driver's thread.
    fn start_camera(&self, callback: FrameCallback) -> Result<(), DriverError>;
    fn stop_camera(&self) -> Result<(), DriverError>;

    fn set_double(&self, node: &str, value: f64) -> WriteResult<f64>;
    fn set_int(&self, node: &str, value: i64) -> WriteResult<i64>;
    fn set_bool(&self, node: &str, value: bool) -> WriteResult<bool>;
    fn set_enum(&self, node: &str, value: &str) -> WriteResult<String>;

    /// Frames per second arriving from the camera
    fn receive_frame_rate(&self) -> f64;
    fn pixel_format(&self) -> PixelFormat;
    fn node_map_as_string(&self) -> String;

    fn set_debug(&self, on: bool);
    fn set_compute_brightness(&self, on: bool);
    fn set_acquisition_timeout(&self, seconds: f64);
}
