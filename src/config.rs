use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;

use crate::density::DensityClassifier;
use crate::emergency::EmergencyMonitor;
use crate::timing::TimingController;

const DEFAULT_APPROACH_ID: &str = "approach:main";
const DEFAULT_SOURCE: &str = "stub://intersection";
const DEFAULT_DB_PATH: &str = "signal.db";
const DEFAULT_LINE_Y: i32 = 450;
const DEFAULT_CONFIDENCE: f32 = 0.4;
const DEFAULT_FRAME_SKIP: u32 = 2;
const DEFAULT_MIN_GREEN_S: u32 = 10;
const DEFAULT_MAX_GREEN_S: u32 = 60;
const DEFAULT_VEHICLE_UNIT_S: u32 = 2;
const DEFAULT_DENSITY_LOW_UPPER: usize = 5;
const DEFAULT_DENSITY_MEDIUM_UPPER: usize = 15;
const DEFAULT_EMERGENCY_FLOOR: f32 = 0.6;
const DEFAULT_EMERGENCY_RELEASE_FRAMES: u32 = 0;
const DEFAULT_SECONDS_PER_VEHICLE: f32 = 2.0;
// COCO: car, motorcycle, bus, truck.
const DEFAULT_VEHICLE_CLASS_IDS: &[i64] = &[2, 3, 5, 7];

#[derive(Debug, Deserialize, Default)]
struct EngineConfigFile {
    approach_id: Option<String>,
    source: Option<String>,
    db_path: Option<String>,
    line_y: Option<i32>,
    confidence_threshold: Option<f32>,
    frame_skip: Option<u32>,
    seconds_per_vehicle: Option<f32>,
    vehicle_class_ids: Option<Vec<i64>>,
    timing: Option<TimingConfigFile>,
    density: Option<DensityConfigFile>,
    emergency: Option<EmergencyConfigFile>,
    ledger: Option<LedgerConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct TimingConfigFile {
    min_green_s: Option<u32>,
    max_green_s: Option<u32>,
    vehicle_unit_s: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct DensityConfigFile {
    low_upper: Option<usize>,
    medium_upper: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct EmergencyConfigFile {
    confidence_floor: Option<f32>,
    release_frames: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct LedgerConfigFile {
    max_idle_frames: Option<u64>,
}

/// Fully-populated engine configuration.
///
/// Every tunable the engine uses lives here; the logic modules carry no defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub approach_id: String,
    pub source: String,
    pub db_path: String,
    /// Reference line y-coordinate in frame pixels.
    pub line_y: i32,
    /// General detection confidence threshold.
    pub confidence_threshold: f32,
    /// Process every Nth frame; the rest are served from the cache.
    pub frame_skip: u32,
    pub seconds_per_vehicle: f32,
    /// Detector class ids that count as vehicles. Empty accepts every class.
    pub vehicle_class_ids: Vec<i64>,
    pub timing: TimingSettings,
    pub density: DensitySettings,
    pub emergency: EmergencySettings,
    pub ledger: LedgerSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingSettings {
    pub min_green_s: u32,
    pub max_green_s: u32,
    pub vehicle_unit_s: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DensitySettings {
    pub low_upper: usize,
    pub medium_upper: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmergencySettings {
    /// Fixed floor for emergency detections, independent of `confidence_threshold`.
    pub confidence_floor: f32,
    /// Consecutive quiet processed frames before the override releases.
    pub release_frames: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LedgerSettings {
    /// Evict position records unseen for this many processed frames. `None` never evicts.
    pub max_idle_frames: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            approach_id: DEFAULT_APPROACH_ID.to_string(),
            source: DEFAULT_SOURCE.to_string(),
            db_path: DEFAULT_DB_PATH.to_string(),
            line_y: DEFAULT_LINE_Y,
            confidence_threshold: DEFAULT_CONFIDENCE,
            frame_skip: DEFAULT_FRAME_SKIP,
            seconds_per_vehicle: DEFAULT_SECONDS_PER_VEHICLE,
            vehicle_class_ids: DEFAULT_VEHICLE_CLASS_IDS.to_vec(),
            timing: TimingSettings {
                min_green_s: DEFAULT_MIN_GREEN_S,
                max_green_s: DEFAULT_MAX_GREEN_S,
                vehicle_unit_s: DEFAULT_VEHICLE_UNIT_S,
            },
            density: DensitySettings {
                low_upper: DEFAULT_DENSITY_LOW_UPPER,
                medium_upper: DEFAULT_DENSITY_MEDIUM_UPPER,
            },
            emergency: EmergencySettings {
                confidence_floor: DEFAULT_EMERGENCY_FLOOR,
                release_frames: DEFAULT_EMERGENCY_RELEASE_FRAMES,
            },
            ledger: LedgerSettings::default(),
        }
    }
}

impl EngineConfig {
    /// Load from the file named by `SIGNAL_CONFIG` (if set), then apply env overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("SIGNAL_CONFIG").ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    /// Load from an explicit file path (if any), then apply env overrides.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: EngineConfigFile) -> Self {
        let defaults = Self::default();
        let timing = file.timing.unwrap_or_default();
        let density = file.density.unwrap_or_default();
        let emergency = file.emergency.unwrap_or_default();
        let ledger = file.ledger.unwrap_or_default();
        Self {
            approach_id: file.approach_id.unwrap_or(defaults.approach_id),
            source: file.source.unwrap_or(defaults.source),
            db_path: file.db_path.unwrap_or(defaults.db_path),
            line_y: file.line_y.unwrap_or(defaults.line_y),
            confidence_threshold: file
                .confidence_threshold
                .unwrap_or(defaults.confidence_threshold),
            frame_skip: file.frame_skip.unwrap_or(defaults.frame_skip),
            seconds_per_vehicle: file
                .seconds_per_vehicle
                .unwrap_or(defaults.seconds_per_vehicle),
            vehicle_class_ids: file
                .vehicle_class_ids
                .unwrap_or(defaults.vehicle_class_ids),
            timing: TimingSettings {
                min_green_s: timing.min_green_s.unwrap_or(defaults.timing.min_green_s),
                max_green_s: timing.max_green_s.unwrap_or(defaults.timing.max_green_s),
                vehicle_unit_s: timing
                    .vehicle_unit_s
                    .unwrap_or(defaults.timing.vehicle_unit_s),
            },
            density: DensitySettings {
                low_upper: density.low_upper.unwrap_or(defaults.density.low_upper),
                medium_upper: density
                    .medium_upper
                    .unwrap_or(defaults.density.medium_upper),
            },
            emergency: EmergencySettings {
                confidence_floor: emergency
                    .confidence_floor
                    .unwrap_or(defaults.emergency.confidence_floor),
                release_frames: emergency
                    .release_frames
                    .unwrap_or(defaults.emergency.release_frames),
            },
            ledger: LedgerSettings {
                max_idle_frames: ledger.max_idle_frames.or(defaults.ledger.max_idle_frames),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(source) = std::env::var("SIGNAL_SOURCE") {
            if !source.trim().is_empty() {
                self.source = source.trim().to_string();
            }
        }
        if let Ok(db_path) = std::env::var("SIGNAL_DB_PATH") {
            if !db_path.trim().is_empty() {
                self.db_path = db_path.trim().to_string();
            }
        }
        if let Ok(approach_id) = std::env::var("SIGNAL_APPROACH_ID") {
            if !approach_id.trim().is_empty() {
                self.approach_id = approach_id.trim().to_string();
            }
        }
        if let Ok(line_y) = std::env::var("SIGNAL_LINE_Y") {
            self.line_y = line_y
                .trim()
                .parse()
                .map_err(|_| anyhow!("SIGNAL_LINE_Y must be an integer pixel row"))?;
        }
        if let Ok(confidence) = std::env::var("SIGNAL_CONFIDENCE") {
            self.confidence_threshold = confidence
                .trim()
                .parse()
                .map_err(|_| anyhow!("SIGNAL_CONFIDENCE must be a number between 0 and 1"))?;
        }
        if let Ok(frame_skip) = std::env::var("SIGNAL_FRAME_SKIP") {
            self.frame_skip = frame_skip
                .trim()
                .parse()
                .map_err(|_| anyhow!("SIGNAL_FRAME_SKIP must be a positive integer"))?;
        }
        Ok(())
    }

    /// Reject nonsensical orderings and ranges. Never clamps.
    pub fn validate(&mut self) -> Result<()> {
        crate::validate_approach_id(&self.approach_id)?;
        self.approach_id = self.approach_id.to_lowercase();

        if self.source.trim().is_empty() {
            return Err(anyhow!("config: source must not be empty"));
        }
        if self.line_y < 0 {
            return Err(anyhow!("config: line_y must be >= 0 (got {})", self.line_y));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(anyhow!(
                "config: confidence_threshold must be within 0..=1 (got {})",
                self.confidence_threshold
            ));
        }
        if !(0.0..=1.0).contains(&self.emergency.confidence_floor) {
            return Err(anyhow!(
                "config: emergency.confidence_floor must be within 0..=1 (got {})",
                self.emergency.confidence_floor
            ));
        }
        if self.frame_skip == 0 {
            return Err(anyhow!("config: frame_skip must be >= 1"));
        }
        if !self.seconds_per_vehicle.is_finite() || self.seconds_per_vehicle < 0.0 {
            return Err(anyhow!(
                "config: seconds_per_vehicle must be a non-negative number"
            ));
        }
        if self.ledger.max_idle_frames == Some(0) {
            return Err(anyhow!("config: ledger.max_idle_frames must be >= 1 when set"));
        }
        self.timing_controller()?;
        self.density_classifier()?;
        Ok(())
    }

    pub fn timing_controller(&self) -> Result<TimingController> {
        TimingController::new(
            self.timing.min_green_s,
            self.timing.max_green_s,
            self.timing.vehicle_unit_s,
        )
    }

    pub fn density_classifier(&self) -> Result<DensityClassifier> {
        DensityClassifier::new(self.density.low_upper, self.density.medium_upper)
    }

    pub fn emergency_monitor(&self) -> EmergencyMonitor {
        EmergencyMonitor::new(
            self.emergency.confidence_floor,
            self.emergency.release_frames,
        )
    }

    /// True when a detector class id counts as a vehicle.
    pub fn accepts_class_id(&self, class_id: i64) -> bool {
        self.vehicle_class_ids.is_empty() || self.vehicle_class_ids.contains(&class_id)
    }
}

fn read_config_file(path: &Path) -> Result<EngineConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}
