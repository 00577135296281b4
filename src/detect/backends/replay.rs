use anyhow::Result;

use crate::detect::backend::{DetectionCapability, DetectorBackend};
use crate::detect::result::{Detection, DetectionFrame, VehicleClass};

/// Replays tracker output recorded alongside the frame.
///
/// A replay backend can be restricted to one class so that a host can wire a
/// normal-vehicle channel and an emergency channel as two separate backends,
/// the same way two underlying models would be wired.
pub struct ReplayBackend {
    name: &'static str,
    classes: &'static [VehicleClass],
    warmed_up: bool,
}

const ALL_CLASSES: &[VehicleClass] = &[VehicleClass::Normal, VehicleClass::Emergency];
const NORMAL_ONLY: &[VehicleClass] = &[VehicleClass::Normal];
const EMERGENCY_ONLY: &[VehicleClass] = &[VehicleClass::Emergency];

impl ReplayBackend {
    /// Replays every recorded detection.
    pub fn all() -> Self {
        Self {
            name: "replay",
            classes: ALL_CLASSES,
            warmed_up: false,
        }
    }

    /// Replays only normal-vehicle detections.
    pub fn vehicles() -> Self {
        Self {
            name: "replay-vehicles",
            classes: NORMAL_ONLY,
            warmed_up: false,
        }
    }

    /// Replays only emergency-vehicle detections.
    pub fn emergency() -> Self {
        Self {
            name: "replay-emergency",
            classes: EMERGENCY_ONLY,
            warmed_up: false,
        }
    }

    pub fn is_warmed_up(&self) -> bool {
        self.warmed_up
    }
}

impl Default for ReplayBackend {
    fn default() -> Self {
        Self::all()
    }
}

impl DetectorBackend for ReplayBackend {
    fn name(&self) -> &'static str {
        self.name
    }

    fn supports(&self, capability: DetectionCapability) -> bool {
        match capability {
            DetectionCapability::Tracking => true,
            DetectionCapability::Vehicles => self.classes.contains(&VehicleClass::Normal),
            DetectionCapability::EmergencyVehicles => {
                self.classes.contains(&VehicleClass::Emergency)
            }
        }
    }

    fn detect(
        &mut self,
        frame: &DetectionFrame,
        confidence_threshold: f32,
    ) -> Result<Vec<Detection>> {
        Ok(frame
            .detections
            .iter()
            .filter(|det| self.classes.contains(&det.class))
            .filter(|det| det.is_emergency() || det.confidence >= confidence_threshold)
            .cloned()
            .collect())
    }

    fn warm_up(&mut self) -> Result<()> {
        self.warmed_up = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::result::BoundingBox;

    fn frame() -> DetectionFrame {
        DetectionFrame {
            index: 1,
            detections: vec![
                Detection::new(BoundingBox::new(0.0, 0.0, 10.0, 10.0), 0.9).with_track_id(1),
                Detection::new(BoundingBox::new(0.0, 0.0, 10.0, 10.0), 0.2).with_track_id(2),
                Detection::new(BoundingBox::new(0.0, 0.0, 10.0, 10.0), 0.3)
                    .with_class(VehicleClass::Emergency),
            ],
        }
    }

    #[test]
    fn replay_applies_threshold_to_normal_detections_only() {
        let mut backend = ReplayBackend::all();
        let out = backend.detect(&frame(), 0.5).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].track_id, Some(1));
        assert!(out[1].is_emergency());
    }

    #[test]
    fn class_restricted_replay() {
        let mut vehicles = ReplayBackend::vehicles();
        let mut emergency = ReplayBackend::emergency();
        assert_eq!(vehicles.detect(&frame(), 0.1).unwrap().len(), 2);
        assert_eq!(emergency.detect(&frame(), 0.1).unwrap().len(), 1);
        assert!(emergency.supports(DetectionCapability::EmergencyVehicles));
        assert!(!emergency.supports(DetectionCapability::Vehicles));
    }

    #[test]
    fn warm_up_marks_backend_ready() {
        let mut backend = ReplayBackend::default();
        assert!(!backend.is_warmed_up());
        backend.warm_up().unwrap();
        assert!(backend.is_warmed_up());
    }
}
