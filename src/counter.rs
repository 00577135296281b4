//! Line-crossing counter.

use serde::{Deserialize, Serialize};

use crate::detect::{Detection, VehicleClass};
use crate::ledger::{TrackId, TrackLedger};

/// A vehicle counted for crossing the reference line downward.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossingEvent {
    pub track_id: TrackId,
    pub previous_y: i32,
    pub current_y: i32,
    pub line_y: i32,
    pub class: VehicleClass,
    /// Cumulative count after this crossing.
    pub ordinal: u64,
}

/// Counts distinct track ids crossing a horizontal reference line.
///
/// Owns the ledger so that the count and the ledger can only be reset together.
#[derive(Debug, Default)]
pub struct LineCrossingCounter {
    ledger: TrackLedger,
    cumulative: u64,
}

impl LineCrossingCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one processed frame of detections.
    ///
    /// A crossing fires iff `previous_y < line_y <= current_y` and the id has not been
    /// counted this run. Untracked detections are ignored.
    pub fn update(&mut self, detections: &[Detection], line_y: i32) -> (Vec<CrossingEvent>, u64) {
        self.ledger.tick();
        let mut events = Vec::new();

        for det in detections {
            let Some(id) = det.tracked_id() else {
                continue;
            };
            let (_, current_y) = det.centroid();
            let previous_y = self.ledger.observe(id, current_y);

            if previous_y < line_y && line_y <= current_y && !self.ledger.has_crossed(id) {
                self.ledger.mark_crossed(id);
                self.cumulative += 1;
                log::debug!(
                    "track {} crossed line {} ({} -> {}), total {}",
                    id,
                    line_y,
                    previous_y,
                    current_y,
                    self.cumulative
                );
                events.push(CrossingEvent {
                    track_id: id,
                    previous_y,
                    current_y,
                    line_y,
                    class: det.class,
                    ordinal: self.cumulative,
                });
            }
        }

        (events, self.cumulative)
    }

    pub fn cumulative(&self) -> u64 {
        self.cumulative
    }

    pub fn ledger(&self) -> &TrackLedger {
        &self.ledger
    }

    /// Drop idle position records; counted ids are retained.
    pub fn evict_idle(&mut self, max_idle_frames: u64) -> usize {
        self.ledger.evict_idle(max_idle_frames)
    }

    pub fn reset(&mut self) {
        self.ledger.reset();
        self.cumulative = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;

    fn at(id: i64, cy: f32) -> Detection {
        Detection::new(BoundingBox::from_center(100.0, cy, 40.0, 30.0), 0.9).with_track_id(id)
    }

    #[test]
    fn counts_a_downward_crossing_once() {
        let mut counter = LineCrossingCounter::new();
        let (events, total) = counter.update(&[at(1, 440.0)], 450);
        assert!(events.is_empty());
        assert_eq!(total, 0);

        let (events, total) = counter.update(&[at(1, 460.0)], 450);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].previous_y, 440);
        assert_eq!(events[0].current_y, 460);
        assert_eq!(total, 1);

        let (events, total) = counter.update(&[at(1, 470.0)], 450);
        assert!(events.is_empty());
        assert_eq!(total, 1);
    }

    #[test]
    fn landing_exactly_on_the_line_counts() {
        let mut counter = LineCrossingCounter::new();
        counter.update(&[at(1, 449.0)], 450);
        let (events, _) = counter.update(&[at(1, 450.0)], 450);
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn upward_motion_never_counts() {
        let mut counter = LineCrossingCounter::new();
        counter.update(&[at(1, 470.0)], 450);
        let (events, total) = counter.update(&[at(1, 430.0)], 450);
        assert!(events.is_empty());
        assert_eq!(total, 0);
    }

    #[test]
    fn oscillating_track_counts_once() {
        let mut counter = LineCrossingCounter::new();
        for y in [440.0, 460.0, 440.0, 460.0, 440.0, 460.0] {
            counter.update(&[at(9, y)], 450);
        }
        assert_eq!(counter.cumulative(), 1);
    }

    #[test]
    fn first_sighting_past_the_line_is_not_counted() {
        let mut counter = LineCrossingCounter::new();
        let (events, _) = counter.update(&[at(5, 500.0)], 450);
        assert!(events.is_empty());
        let (events, _) = counter.update(&[at(5, 520.0)], 450);
        assert!(events.is_empty());
        assert_eq!(counter.cumulative(), 0);
    }

    #[test]
    fn untracked_detections_are_ignored() {
        let mut counter = LineCrossingCounter::new();
        let untracked = |cy| {
            Detection::new(BoundingBox::from_center(10.0, cy, 10.0, 10.0), 0.9).with_track_id(-1)
        };
        counter.update(&[untracked(440.0)], 450);
        let (events, total) = counter.update(&[untracked(460.0)], 450);
        assert!(events.is_empty());
        assert_eq!(total, 0);
        assert!(counter.ledger().is_empty());
    }

    #[test]
    fn reset_clears_count_and_ledger_together() {
        let mut counter = LineCrossingCounter::new();
        counter.update(&[at(1, 440.0)], 450);
        counter.update(&[at(1, 460.0)], 450);
        counter.reset();
        assert_eq!(counter.cumulative(), 0);
        assert!(counter.ledger().is_empty());

        counter.update(&[at(1, 440.0)], 450);
        let (_, total) = counter.update(&[at(1, 460.0)], 450);
        assert_eq!(total, 1);
    }

    #[test]
    fn line_moves_between_frames() {
        let mut counter = LineCrossingCounter::new();
        counter.update(&[at(2, 300.0)], 450);
        let (events, _) = counter.update(&[at(2, 320.0)], 310);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].line_y, 310);
    }
}
