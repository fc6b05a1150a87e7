pub mod control;
pub mod registry;
pub mod store;
pub mod value;
pub mod verify;

pub use control::{CameraControl, ControlChannel, ControlOutcome, ControlState};
pub use registry::{ParameterDescriptor, ParameterRegistry, SetParametersResult};
pub use store::ParameterStore;
pub use value::{ParamKind, ParamValue};
