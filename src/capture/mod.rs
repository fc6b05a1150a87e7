pub mod driver;
pub mod frame;
pub mod sim;

pub use driver::{Driver, FrameCallback, WriteReply, WriteResult};
pub use frame::{Frame, FrameMetadata, FramePtr, PixelFormat};
pub use sim::SimDriver;
