//! Consumer side of the pipeline: frame to image and metadata messages.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use arc_swap::ArcSwap;
use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::capture::{Frame, FrameMetadata};
use crate::error::PublishError;
use crate::messages::{CameraImage, CameraInfo, Header, Image, ImageMetaData};
use crate::pipeline::queue::{AcquisitionQueue, POLL_INTERVAL};
use crate::pipeline::status::FrameCounters;
use crate::pipeline::topic::Topic;

/// What happened to one frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishOutcome {
    pub image: bool,
    pub meta: bool,
}

/// Build an image message over `data` without copying it
pub fn fill_image(
    header: Header,
    encoding: &str,
    meta: &FrameMetadata,
    data: &Bytes,
) -> Result<Image, PublishError> {
    // Widened so a bogus width cannot overflow
    let row = u64::from(meta.width) * u64::from(meta.format.bytes_per_pixel());
    if u64::from(meta.stride) < row {
        return Err(PublishError::BadStride {
            stride: meta.stride,
            row,
        });
    }
    let needed = (meta.stride as usize)
        .checked_mul(meta.height as usize)
        .unwrap_or(usize::MAX);
    if data.len() < needed {
        return Err(PublishError::ShortBuffer {
            needed,
            actual: data.len(),
        });
    }
    Ok(Image {
        header,
        height: meta.height,
        width: meta.width,
        encoding: encoding.to_string(),
        is_bigendian: false,
        step: meta.stride,
        data: data.slice(..needed),
    })
}

/// Publishes frames to the image and metadata sinks
pub struct Publisher {
    frame_id: String,
    images: Arc<Topic<CameraImage>>,
    meta: Arc<Topic<ImageMetaData>>,
    camera_info: Arc<ArcSwap<CameraInfo>>,
    counters: Arc<FrameCounters>,
}

impl Publisher {
    pub fn new(
        frame_id: impl Into<String>,
        images: Arc<Topic<CameraImage>>,
        meta: Arc<Topic<ImageMetaData>>,
        camera_info: Arc<ArcSwap<CameraInfo>>,
        counters: Arc<FrameCounters>,
    ) -> Self {
        Self {
            frame_id: frame_id.into(),
            images,
            meta,
            camera_info,
            counters,
        }
    }

    /// Publish one frame. The image and metadata sinks are handled
    /// independently; each only when it has a subscriber.
    pub fn publish(&self, frame: &Frame) -> PublishOutcome {
        let header = Header {
            stamp: frame.image_time,
            frame_id: self.frame_id.clone(),
        };
        let mut outcome = PublishOutcome::default();

        if self.images.subscriber_count() > 0 {
            match self.publish_image(header.clone(), frame) {
                Ok(()) => {
                    self.counters.record_publish();
                    outcome.image = true;
                }
                Err(e @ PublishError::SinkFull(_)) => debug!("image dropped: {}", e),
                Err(e) => warn!("fill image failed: {}", e),
            }
        }

        if self.meta.subscriber_count() > 0 {
            let msg = ImageMetaData {
                header,
                brightness: frame.meta.brightness,
                exposure_time: frame.meta.exposure_time,
                max_exposure_time: frame.meta.max_exposure_time,
                gain: frame.meta.gain,
                camera_time: frame.image_time,
            };
            match self.meta.publish(msg) {
                Ok(_) => outcome.meta = true,
                Err(e) => debug!("metadata dropped: {}", e),
            }
        }
        outcome
    }

    fn publish_image(&self, header: Header, frame: &Frame) -> Result<(), PublishError> {
        let encoding = frame
            .meta
            .format
            .encoding()
            .ok_or_else(|| PublishError::InvalidEncoding(frame.meta.format.to_string()))?;
        let image = fill_image(header.clone(), encoding, &frame.meta, &frame.data)?;
        let mut camera_info = CameraInfo::clone(&self.camera_info.load());
        camera_info.header = header;
        self.images.publish(CameraImage { image, camera_info })?;
        Ok(())
    }
}

/// Start the consumer thread: take frames off `queue` and publish them
/// until the queue is shut down.
pub fn spawn_consumer(
    queue: Arc<AcquisitionQueue>,
    publisher: Publisher,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("publish".into())
        .spawn(move || {
            info!("publish thread started");
            while queue.is_running() {
                if let Some(frame) = queue.take(POLL_INTERVAL) {
                    publisher.publish(&frame);
                }
            }
            info!("publish thread stopped");
        })
}
