pub mod publish;
pub mod queue;
pub mod status;
pub mod topic;

pub use publish::{fill_image, spawn_consumer, PublishOutcome, Publisher};
pub use queue::{AcquisitionQueue, POLL_INTERVAL, QUEUE_CAPACITY};
pub use status::{spawn_status_timer, FrameCounters, StatusReport, StatusReporter, STATUS_PERIOD};
pub use topic::Topic;
