//! Adaptive green-time recommendation.

use anyhow::{anyhow, Result};

/// Saturating linear mapping from instantaneous count to green seconds:
/// `clamp(min_green + count * unit_time, min_green, max_green)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimingController {
    min_green: u32,
    max_green: u32,
    unit_time: u32,
}

impl TimingController {
    pub fn new(min_green: u32, max_green: u32, unit_time: u32) -> Result<Self> {
        if min_green > max_green {
            return Err(anyhow!(
                "config: min_green ({}) must not exceed max_green ({})",
                min_green,
                max_green
            ));
        }
        if unit_time == 0 {
            return Err(anyhow!("config: vehicle_unit_time must be at least 1 second"));
        }
        Ok(Self {
            min_green,
            max_green,
            unit_time,
        })
    }

    /// Green seconds for the current backlog. Total: `recommend(0) == min_green`.
    pub fn recommend(&self, active_count: usize) -> u32 {
        let count = u32::try_from(active_count).unwrap_or(u32::MAX);
        self.min_green
            .saturating_add(count.saturating_mul(self.unit_time))
            .clamp(self.min_green, self.max_green)
    }

    /// Recommendation honoring the emergency override, which always grants `max_green`.
    pub fn recommend_with_priority(&self, active_count: usize, is_emergency: bool) -> u32 {
        if is_emergency {
            self.max_green
        } else {
            self.recommend(active_count)
        }
    }

    pub fn min_green(&self) -> u32 {
        self.min_green
    }

    pub fn max_green(&self) -> u32 {
        self.max_green
    }
}

/// Seconds needed to clear `total_vehicles` at `seconds_per_vehicle`, rounded.
pub fn estimate_clearance_seconds(total_vehicles: u64, seconds_per_vehicle: f32) -> u64 {
    let seconds = (total_vehicles as f64 * f64::from(seconds_per_vehicle)).round();
    if seconds.is_finite() && seconds > 0.0 {
        seconds as u64
    } else {
        0
    }
}
