use anyhow::Result;

use crate::detect::result::{Detection, DetectionFrame};

/// Detection capabilities a backend can provide.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetectionCapability {
    /// Ordinary vehicles (cars, motorcycles, buses, trucks).
    Vehicles,
    /// Emergency vehicles tagged `VehicleClass::Emergency`.
    EmergencyVehicles,
    /// Stable track ids across frames.
    Tracking,
}

/// Detector/tracker backend trait.
///
/// This is the seam to the external detection collaborator. Implementations
/// return already-tracked detections for a frame; the kernel never looks at pixels.
/// A backend is only invoked on processed frames, never on frames served from the
/// frame-skip cache.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Returns true when the backend supports a capability.
    fn supports(&self, capability: DetectionCapability) -> bool;

    /// Run detection on a frame.
    ///
    /// `confidence_threshold` is the currently configured general threshold.
    /// Backends should not apply it to emergency detections.
    fn detect(&mut self, frame: &DetectionFrame, confidence_threshold: f32)
        -> Result<Vec<Detection>>;

    /// Optional warm-up hook, called once before the first frame of a run.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
