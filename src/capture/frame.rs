use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Shared handle to a captured frame. The producer callback, the acquisition
/// queue and the in-flight publish all hold clones of the same allocation.
pub type FramePtr = Arc<Frame>;

/// One captured image with its per-capture metadata
#[derive(Clone)]
pub struct Frame {
    /// Immutable pixel data - can be shared across threads without copying
    pub data: Bytes,

    /// Frame metadata
    pub meta: FrameMetadata,

    /// Capture time on the device clock, nanoseconds
    pub image_time: u64,
}

/// Frame metadata
#[derive(Debug, Clone, PartialEq)]
pub struct FrameMetadata {
    pub width: u32,
    pub height: u32,
    /// Bytes per row, may exceed `width * bytes_per_pixel`
    pub stride: u32,
    pub format: PixelFormat,
    pub brightness: u32,
    /// Exposure time in microseconds
    pub exposure_time: u32,
    pub max_exposure_time: u32,
    /// Gain in dB
    pub gain: f32,
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("bytes", &self.data.len())
            .field("meta", &self.meta)
            .field("image_time", &self.image_time)
            .finish()
    }
}

/// Wire encodings understood by image consumers
pub mod encodings {
    pub const BAYER_RGGB8: &str = "bayer_rggb8";
    pub const RGB8: &str = "rgb8";
    pub const MONO8: &str = "mono8";
}

/// Pixel formats a camera may report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    BayerRg8,
    BayerGb8,
    Rgb8,
    Mono8,
    Mono16,
    Invalid,
}

impl PixelFormat {
    /// Wire encoding for this format, `None` if it cannot be published
    pub fn encoding(self) -> Option<&'static str> {
        match self {
            PixelFormat::BayerRg8 => Some(encodings::BAYER_RGGB8),
            PixelFormat::Rgb8 => Some(encodings::RGB8),
            PixelFormat::Mono8 => Some(encodings::MONO8),
            _ => None,
        }
    }

    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            PixelFormat::Rgb8 => 3,
            PixelFormat::Mono16 => 2,
            PixelFormat::Invalid => 0,
            _ => 1,
        }
    }

    /// GenICam style name, as used in camera enum registers
    pub fn as_str(self) -> &'static str {
        match self {
            PixelFormat::BayerRg8 => "BayerRG8",
            PixelFormat::BayerGb8 => "BayerGB8",
            PixelFormat::Rgb8 => "RGB8",
            PixelFormat::Mono8 => "Mono8",
            PixelFormat::Mono16 => "Mono16",
            PixelFormat::Invalid => "INVALID",
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PixelFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BayerRG8" => Ok(PixelFormat::BayerRg8),
            "BayerGB8" => Ok(PixelFormat::BayerGb8),
            "RGB8" => Ok(PixelFormat::Rgb8),
            "Mono8" => Ok(PixelFormat::Mono8),
            "Mono16" => Ok(PixelFormat::Mono16),
            other => Err(format!("unknown pixel format: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_three_formats_have_an_encoding() {
        assert_eq!(PixelFormat::BayerRg8.encoding(), Some("bayer_rggb8"));
        assert_eq!(PixelFormat::Rgb8.encoding(), Some("rgb8"));
        assert_eq!(PixelFormat::Mono8.encoding(), Some("mono8"));
        assert_eq!(PixelFormat::BayerGb8.encoding(), None);
        assert_eq!(PixelFormat::Mono16.encoding(), None);
        assert_eq!(PixelFormat::Invalid.encoding(), None);
    }

    #[test]
    fn names_parse_back() {
        for fmt in [PixelFormat::BayerRg8, PixelFormat::Rgb8, PixelFormat::Mono16] {
            assert_eq!(fmt.as_str().parse::<PixelFormat>(), Ok(fmt));
        }
        assert!("YUYV".parse::<PixelFormat>().is_err());
    }
}
