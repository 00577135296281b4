mod backend;
mod backends;
mod registry;
mod result;

pub use backend::{DetectionCapability, DetectorBackend};
pub use backends::ReplayBackend;
pub use registry::BackendRegistry;
pub use result::{BoundingBox, Detection, DetectionFault, DetectionFrame, VehicleClass};
