use serde::{Deserialize, Serialize};

/// Axis-aligned box in frame pixel space. `x1 < x2` and `y1 < y2` for a usable box.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Builds a box from its center point and size.
    pub fn from_center(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        Self {
            x1: cx - w / 2.0,
            y1: cy - h / 2.0,
            x2: cx + w / 2.0,
            y2: cy + h / 2.0,
        }
    }

    /// Integer centroid, truncated toward zero.
    pub fn centroid(&self) -> (i32, i32) {
        (
            ((self.x1 + self.x2) / 2.0) as i32,
            ((self.y1 + self.y2) / 2.0) as i32,
        )
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    fn is_finite(&self) -> bool {
        [self.x1, self.y1, self.x2, self.y2]
            .iter()
            .all(|v| v.is_finite())
    }
}

/// Coarse class tag supplied by the detector.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleClass {
    #[default]
    Normal,
    Emergency,
}

/// One detected object in one frame.
///
/// `track_id` is the tracker-assigned identity. A negative or missing id marks an
/// untracked box: it is reported and contributes to density, but is never counted
/// as a line crossing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(default)]
    pub track_id: Option<i64>,
    pub bbox: BoundingBox,
    #[serde(default)]
    pub class: VehicleClass,
    /// Raw detector class index (e.g. COCO id), when the detector reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_id: Option<i64>,
    pub confidence: f32,
}

impl Detection {
    pub fn new(bbox: BoundingBox, confidence: f32) -> Self {
        Self {
            track_id: None,
            bbox,
            class: VehicleClass::Normal,
            class_id: None,
            confidence,
        }
    }

    pub fn with_track_id(mut self, track_id: i64) -> Self {
        self.track_id = Some(track_id);
        self
    }

    pub fn with_class(mut self, class: VehicleClass) -> Self {
        self.class = class;
        self
    }

    pub fn with_class_id(mut self, class_id: i64) -> Self {
        self.class_id = Some(class_id);
        self
    }

    /// The usable track identity, if any.
    pub fn tracked_id(&self) -> Option<u64> {
        self.track_id.and_then(|id| u64::try_from(id).ok())
    }

    pub fn centroid(&self) -> (i32, i32) {
        self.bbox.centroid()
    }

    pub fn is_emergency(&self) -> bool {
        self.class == VehicleClass::Emergency
    }

    /// Checks box geometry and confidence range.
    pub fn validate(&self) -> Result<(), DetectionFault> {
        if !self.bbox.is_finite() {
            return Err(DetectionFault::NonFiniteBox {
                track_id: self.track_id,
            });
        }
        if self.bbox.x1 >= self.bbox.x2 || self.bbox.y1 >= self.bbox.y2 {
            return Err(DetectionFault::DegenerateBox {
                track_id: self.track_id,
                bbox: self.bbox,
            });
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(DetectionFault::ConfidenceOutOfRange {
                track_id: self.track_id,
                confidence: self.confidence,
            });
        }
        Ok(())
    }
}

/// A detection dropped from a frame. Never aborts the frame.
#[derive(Clone, Debug, PartialEq)]
pub enum DetectionFault {
    DegenerateBox {
        track_id: Option<i64>,
        bbox: BoundingBox,
    },
    NonFiniteBox {
        track_id: Option<i64>,
    },
    ConfidenceOutOfRange {
        track_id: Option<i64>,
        confidence: f32,
    },
}

impl DetectionFault {
    pub fn code(&self) -> &'static str {
        match self {
            DetectionFault::DegenerateBox { .. } => "MALFORMED_DETECTION_BOX",
            DetectionFault::NonFiniteBox { .. } => "MALFORMED_DETECTION_NAN",
            DetectionFault::ConfidenceOutOfRange { .. } => "MALFORMED_DETECTION_CONFIDENCE",
        }
    }
}

impl std::fmt::Display for DetectionFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DetectionFault::DegenerateBox { track_id, bbox } => write!(
                f,
                "{}: track {:?} has degenerate box ({}, {}, {}, {})",
                self.code(),
                track_id,
                bbox.x1,
                bbox.y1,
                bbox.x2,
                bbox.y2
            ),
            DetectionFault::NonFiniteBox { track_id } => {
                write!(f, "{}: track {:?} has non-finite box", self.code(), track_id)
            }
            DetectionFault::ConfidenceOutOfRange {
                track_id,
                confidence,
            } => write!(
                f,
                "{}: track {:?} confidence {} outside 0..=1",
                self.code(),
                track_id,
                confidence
            ),
        }
    }
}

impl std::error::Error for DetectionFault {}

/// The materialized detector input for one video frame.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionFrame {
    pub index: u64,
    #[serde(default)]
    pub detections: Vec<Detection>,
}
