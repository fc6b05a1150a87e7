//! Messages published by the bridge.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Header {
    /// Nanoseconds, taken from the frame's capture time
    pub stamp: u64,
    pub frame_id: String,
}

/// Raw image in a named wire encoding
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    pub header: Header,
    pub height: u32,
    pub width: u32,
    pub encoding: String,
    pub is_bigendian: bool,
    /// Row length in bytes
    pub step: u32,
    pub data: Bytes,
}

/// Calibration of the camera that produced an image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraInfo {
    pub header: Header,
    pub height: u32,
    pub width: u32,
    pub distortion_model: String,
    pub d: Vec<f64>,
    pub k: [f64; 9],
    pub r: [f64; 9],
    pub p: [f64; 12],
}

impl Default for CameraInfo {
    fn default() -> Self {
        Self {
            header: Header::default(),
            height: 0,
            width: 0,
            distortion_model: String::new(),
            d: Vec::new(),
            k: [0.0; 9],
            r: [0.0; 9],
            p: [0.0; 12],
        }
    }
}

/// Image plus the calibration snapshot it was published with
#[derive(Debug, Clone, PartialEq)]
pub struct CameraImage {
    pub image: Image,
    pub camera_info: CameraInfo,
}

/// Per-frame capture settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageMetaData {
    pub header: Header,
    pub brightness: u32,
    pub exposure_time: u32,
    pub max_exposure_time: u32,
    pub gain: f32,
    /// Device clock time of the capture, nanoseconds
    pub camera_time: u64,
}
