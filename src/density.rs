//! Density classification of the instantaneous detection count.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// Discrete density tier. Ordered `Low < Medium < High`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DensityTier {
    #[default]
    Low,
    Medium,
    High,
}

impl std::fmt::Display for DensityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            DensityTier::Low => "LOW",
            DensityTier::Medium => "MEDIUM",
            DensityTier::High => "HIGH",
        };
        f.write_str(label)
    }
}

/// Maps a count to a tier: `count < low_upper` is LOW, `count < medium_upper` is
/// MEDIUM, anything else HIGH.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DensityClassifier {
    low_upper: usize,
    medium_upper: usize,
}

impl DensityClassifier {
    pub fn new(low_upper: usize, medium_upper: usize) -> Result<Self> {
        if low_upper >= medium_upper {
            return Err(anyhow!(
                "config: density thresholds must be strictly increasing (low={}, medium={})",
                low_upper,
                medium_upper
            ));
        }
        Ok(Self {
            low_upper,
            medium_upper,
        })
    }

    pub fn classify(&self, count: usize) -> DensityTier {
        if count < self.low_upper {
            DensityTier::Low
        } else if count < self.medium_upper {
            DensityTier::Medium
        } else {
            DensityTier::High
        }
    }

    pub fn thresholds(&self) -> (usize, usize) {
        (self.low_upper, self.medium_upper)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundaries_are_inclusive_low_exclusive_high() {
        let classifier = DensityClassifier::new(5, 15).unwrap();
        assert_eq!(classifier.classify(0), DensityTier::Low);
        assert_eq!(classifier.classify(4), DensityTier::Low);
        assert_eq!(classifier.classify(5), DensityTier::Medium);
        assert_eq!(classifier.classify(14), DensityTier::Medium);
        assert_eq!(classifier.classify(15), DensityTier::High);
        assert_eq!(classifier.classify(usize::MAX), DensityTier::High);
    }

    #[test]
    fn classification_is_monotone() {
        let classifier = DensityClassifier::new(3, 8).unwrap();
        let tiers: Vec<_> = (0..50).map(|c| classifier.classify(c)).collect();
        assert!(tiers.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn rejects_non_increasing_thresholds() {
        assert!(DensityClassifier::new(5, 5).is_err());
        assert!(DensityClassifier::new(15, 5).is_err());
    }

    #[test]
    fn tier_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&DensityTier::Medium).unwrap(), "\"MEDIUM\"");
        assert_eq!(DensityTier::High.to_string(), "HIGH");
    }
}
