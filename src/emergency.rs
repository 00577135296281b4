//! Emergency priority monitor.

use crate::detect::Detection;

/// True when at least one emergency-tagged detection meets `confidence_floor`.
pub fn frame_has_emergency(detections: &[Detection], confidence_floor: f32) -> bool {
    detections
        .iter()
        .any(|det| det.is_emergency() && det.confidence >= confidence_floor)
}

/// Maintains the emergency override flag across processed frames.
///
/// With `release_frames == 0` the flag is recomputed from each frame alone.
/// Otherwise it asserts immediately and releases only after `release_frames`
/// consecutive processed frames without a qualifying detection.
#[derive(Clone, Debug)]
pub struct EmergencyMonitor {
    confidence_floor: f32,
    release_frames: u32,
    active: bool,
    quiet_frames: u32,
}

impl EmergencyMonitor {
    pub fn new(confidence_floor: f32, release_frames: u32) -> Self {
        Self {
            confidence_floor,
            release_frames,
            active: false,
            quiet_frames: 0,
        }
    }

    pub fn update(&mut self, detections: &[Detection]) -> bool {
        if frame_has_emergency(detections, self.confidence_floor) {
            if !self.active {
                log::info!("emergency vehicle detected: priority override engaged");
            }
            self.active = true;
            self.quiet_frames = 0;
        } else if self.active {
            self.quiet_frames += 1;
            if self.quiet_frames > self.release_frames {
                log::info!("emergency override released");
                self.active = false;
                self.quiet_frames = 0;
            }
        }
        self.active
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn confidence_floor(&self) -> f32 {
        self.confidence_floor
    }

    pub fn reset(&mut self) {
        self.active = false;
        self.quiet_frames = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{BoundingBox, VehicleClass};

    fn emergency(conf: f32) -> Detection {
        Detection::new(BoundingBox::new(0.0, 0.0, 50.0, 40.0), conf)
            .with_class(VehicleClass::Emergency)
            .with_track_id(-1)
    }

    fn normal(conf: f32) -> Detection {
        Detection::new(BoundingBox::new(0.0, 0.0, 50.0, 40.0), conf)
    }

    #[test]
    fn floor_is_applied_to_emergency_detections() {
        assert!(frame_has_emergency(&[emergency(0.6)], 0.6));
        assert!(!frame_has_emergency(&[emergency(0.59)], 0.6));
        assert!(!frame_has_emergency(&[normal(0.99)], 0.6));
        assert!(!frame_has_emergency(&[], 0.6));
    }

    #[test]
    fn without_release_window_flag_follows_each_frame() {
        let mut monitor = EmergencyMonitor::new(0.6, 0);
        assert!(monitor.update(&[emergency(0.9)]));
        assert!(!monitor.update(&[normal(0.9)]));
        assert!(monitor.update(&[normal(0.9), emergency(0.7)]));
    }

    #[test]
    fn release_window_holds_flag() {
        let mut monitor = EmergencyMonitor::new(0.6, 2);
        assert!(monitor.update(&[emergency(0.9)]));
        assert!(monitor.update(&[]));
        assert!(monitor.update(&[]));
        assert!(!monitor.update(&[]));

        assert!(monitor.update(&[emergency(0.9)]));
        assert!(monitor.update(&[]));
        assert!(monitor.update(&[emergency(0.9)]));
        assert!(monitor.update(&[]));
        assert!(monitor.update(&[]));
        assert!(!monitor.update(&[]));
    }

    #[test]
    fn reset_clears_flag() {
        let mut monitor = EmergencyMonitor::new(0.6, 5);
        monitor.update(&[emergency(0.9)]);
        monitor.reset();
        assert!(!monitor.is_active());
    }
}
