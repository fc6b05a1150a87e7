use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use tracing::{info, instrument, warn};

use crate::capture::Driver;
use crate::error::{BridgeError, Result};

/// Lock a mutex, taking over the data if a previous holder panicked
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Wait for the camera with `serial` to show up on the bus.
///
/// Refreshes the driver's camera list up to `attempts` times, sleeping
/// `spacing` between misses and listing whatever cameras were found.
#[instrument(skip(driver))]
pub fn wait_for_camera(
    driver: &dyn Driver,
    serial: &str,
    attempts: u32,
    spacing: Duration,
) -> Result<()> {
    info!("Looking for camera...");

    for attempt in 1..=attempts {
        driver.refresh_camera_list();
        let cameras = driver.serial_numbers();
        if cameras.iter().any(|c| c == serial) {
            info!("found camera with serial number: {}", serial);
            return Ok(());
        }

        warn!("no camera found with serial: {} on try # {}", serial, attempt);
        for cam in &cameras {
            warn!("found cameras: {}", cam);
        }
        if attempt < attempts {
            thread::sleep(spacing);
        }
    }

    Err(BridgeError::CameraNotFound {
        serial: serial.to_string(),
        attempts,
    })
}
