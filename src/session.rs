//! Run session: owns all per-run state and drives one frame at a time.
//!
//! ```text
//!   IDLE --start--> RUNNING --stop--> STOPPED --reset_statistics--> IDLE
//!                     ^  |                |
//!                     |  +--start/load----+--start--> RUNNING
//! ```
//!
//! One frame's update is the unit of atomicity: everything that can fail happens
//! before the ledger or count is touched.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::cache::TemporalCache;
use crate::config::EngineConfig;
use crate::counter::{CrossingEvent, LineCrossingCounter};
use crate::density::DensityClassifier;
use crate::detect::{Detection, DetectionFault};
use crate::emergency::EmergencyMonitor;
use crate::timing::{estimate_clearance_seconds, TimingController};
use crate::{OutputRecord, RunSummary};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Idle,
    Running,
    Stopped,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameOutcome {
    /// Detection ran and the cache was refreshed.
    Processed,
    /// Frame-skip policy served the cache.
    Skipped,
    /// The detector failed; the cache was served and no state changed.
    DetectorFailed,
}

/// Values a detector call needs for the frame being processed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameParams {
    pub frame_index: u64,
    pub line_y: i32,
    pub confidence_threshold: f32,
}

/// Result of feeding one frame to the session.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameUpdate {
    pub frame_index: u64,
    pub outcome: FrameOutcome,
    /// Crossings detected on this frame. Always empty unless processed.
    pub crossings: Vec<CrossingEvent>,
    /// Malformed detections dropped from this frame.
    pub dropped: Vec<DetectionFault>,
    pub output: OutputRecord,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    pub frames_seen: u64,
    pub frames_processed: u64,
    pub frames_cached: u64,
    pub detector_failures: u64,
    pub detections_dropped: u64,
    pub detections_filtered: u64,
    pub ledger_evictions: u64,
}

pub struct RunSession {
    config: EngineConfig,
    state: RunState,
    source_id: Option<String>,
    counter: LineCrossingCounter,
    classifier: DensityClassifier,
    monitor: EmergencyMonitor,
    timing: TimingController,
    cache: TemporalCache,
    line_y: i32,
    confidence_threshold: f32,
    pending_line_y: Option<i32>,
    pending_confidence: Option<f32>,
    frame_counter: u64,
    stats: SessionStats,
    last_summary: Option<RunSummary>,
}

impl RunSession {
    /// Build an idle session. Fails on any configuration error.
    pub fn new(mut config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let classifier = config.density_classifier()?;
        let timing = config.timing_controller()?;
        let monitor = config.emergency_monitor();
        Ok(Self {
            state: RunState::Idle,
            source_id: None,
            counter: LineCrossingCounter::new(),
            classifier,
            monitor,
            timing,
            cache: TemporalCache::new(timing.min_green()),
            line_y: config.line_y,
            confidence_threshold: config.confidence_threshold,
            pending_line_y: None,
            pending_confidence: None,
            frame_counter: 0,
            stats: SessionStats::default(),
            last_summary: None,
            config,
        })
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn source_id(&self) -> Option<&str> {
        self.source_id.as_deref()
    }

    pub fn cumulative_count(&self) -> u64 {
        self.counter.cumulative()
    }

    pub fn frame_counter(&self) -> u64 {
        self.frame_counter
    }

    pub fn line_y(&self) -> i32 {
        self.line_y
    }

    pub fn confidence_threshold(&self) -> f32 {
        self.confidence_threshold
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Output currently held by the frame-skip cache.
    pub fn output(&self) -> &OutputRecord {
        self.cache.current()
    }

    pub fn counter(&self) -> &LineCrossingCounter {
        &self.counter
    }

    pub fn last_summary(&self) -> Option<&RunSummary> {
        self.last_summary.as_ref()
    }

    /// Begin a run on `source_id`. A run already in progress is stopped first and
    /// its summary returned.
    pub fn start(&mut self, source_id: impl Into<String>) -> Option<RunSummary> {
        let previous = if self.state == RunState::Running {
            Some(self.finish_run())
        } else {
            None
        };
        self.clear_run_state();
        self.source_id = Some(source_id.into());
        self.state = RunState::Running;
        log::info!(
            "run started: approach={} source={} line_y={} frame_skip={}",
            self.config.approach_id,
            self.source_id.as_deref().unwrap_or("-"),
            self.line_y,
            self.config.frame_skip
        );
        previous
    }

    /// Select the input source. A different source resets all run statistics; while
    /// running this is an implicit stop followed by start.
    pub fn load_source(&mut self, source_id: impl Into<String>) -> Option<RunSummary> {
        let source_id = source_id.into();
        if self.source_id.as_deref() == Some(source_id.as_str()) {
            return None;
        }
        if self.state == RunState::Running {
            return self.start(source_id);
        }
        self.clear_run_state();
        log::info!("source loaded: {} (statistics reset)", source_id);
        self.source_id = Some(source_id);
        None
    }

    /// End the run and capture its summary.
    pub fn stop(&mut self) -> Result<RunSummary> {
        if self.state != RunState::Running {
            return Err(anyhow!("session: stop requires a running session (state {:?})", self.state));
        }
        Ok(self.finish_run())
    }

    /// Clear ledger, count and cache without starting a run.
    pub fn reset_statistics(&mut self) -> Result<()> {
        if self.state == RunState::Running {
            return Err(anyhow!("session: cannot reset statistics while running"));
        }
        self.clear_run_state();
        self.state = RunState::Idle;
        log::info!("run statistics reset");
        Ok(())
    }

    /// Replace the configuration between runs.
    pub fn reconfigure(&mut self, mut config: EngineConfig) -> Result<()> {
        if self.state == RunState::Running {
            return Err(anyhow!("session: cannot reconfigure while running"));
        }
        config.validate()?;
        self.classifier = config.density_classifier()?;
        self.timing = config.timing_controller()?;
        self.monitor = config.emergency_monitor();
        self.line_y = config.line_y;
        self.confidence_threshold = config.confidence_threshold;
        self.pending_line_y = None;
        self.pending_confidence = None;
        self.config = config;
        self.clear_run_state();
        Ok(())
    }

    /// Stage a new reference line; applied at the next processed frame.
    pub fn set_line_y(&mut self, line_y: i32) -> Result<()> {
        if line_y < 0 {
            return Err(anyhow!("config: line_y must be >= 0 (got {})", line_y));
        }
        self.pending_line_y = Some(line_y);
        Ok(())
    }

    /// Stage a new confidence threshold; applied at the next processed frame.
    pub fn set_confidence_threshold(&mut self, threshold: f32) -> Result<()> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(anyhow!(
                "config: confidence_threshold must be within 0..=1 (got {})",
                threshold
            ));
        }
        self.pending_confidence = Some(threshold);
        Ok(())
    }

    /// Feed one frame whose detections are already materialized.
    pub fn push_frame(&mut self, detections: Vec<Detection>) -> Result<FrameUpdate> {
        self.advance(|_| Ok(detections))
    }

    /// Feed one frame. `detect` runs only if the frame-skip policy selects this frame.
    ///
    /// Errors only when the session is not running; detector failures are absorbed.
    pub fn advance<F>(&mut self, detect: F) -> Result<FrameUpdate>
    where
        F: FnOnce(&FrameParams) -> Result<Vec<Detection>>,
    {
        if self.state != RunState::Running {
            return Err(anyhow!(
                "session: frames can only be fed to a running session (state {:?})",
                self.state
            ));
        }

        self.frame_counter += 1;
        self.stats.frames_seen += 1;
        let frame_index = self.frame_counter;

        if frame_index % u64::from(self.config.frame_skip) != 0 {
            self.stats.frames_cached += 1;
            return Ok(self.cached_update(frame_index, FrameOutcome::Skipped));
        }

        self.apply_pending();
        let params = FrameParams {
            frame_index,
            line_y: self.line_y,
            confidence_threshold: self.confidence_threshold,
        };
        let raw = match detect(&params) {
            Ok(raw) => raw,
            Err(e) => {
                log::warn!("frame {}: detector failed, serving cache: {}", frame_index, e);
                self.stats.detector_failures += 1;
                self.stats.frames_cached += 1;
                return Ok(self.cached_update(frame_index, FrameOutcome::DetectorFailed));
            }
        };

        Ok(self.process(frame_index, raw))
    }

    fn process(&mut self, frame_index: u64, raw: Vec<Detection>) -> FrameUpdate {
        self.stats.frames_processed += 1;
        let (admitted, dropped) = self.admit(frame_index, raw);

        let (crossings, cumulative_count) = self.counter.update(&admitted, self.line_y);
        if let Some(max_idle) = self.config.ledger.max_idle_frames {
            let evicted = self.counter.evict_idle(max_idle);
            if evicted > 0 {
                log::debug!("frame {}: evicted {} idle track records", frame_index, evicted);
                self.stats.ledger_evictions += evicted as u64;
            }
        }

        let is_emergency = self.monitor.update(&admitted);
        let instantaneous_count = admitted.len();
        let density_tier = self.classifier.classify(instantaneous_count);
        let recommended_green_seconds = self
            .timing
            .recommend_with_priority(instantaneous_count, is_emergency);

        for event in &crossings {
            log::info!(
                "vehicle #{} crossed: track={} class={:?} y {} -> {}",
                event.ordinal,
                event.track_id,
                event.class,
                event.previous_y,
                event.current_y
            );
        }
        log::debug!(
            "frame {}: active={} tier={} emergency={} green={}s total={}",
            frame_index,
            instantaneous_count,
            density_tier,
            is_emergency,
            recommended_green_seconds,
            cumulative_count
        );

        let output = OutputRecord {
            cumulative_count,
            instantaneous_count,
            density_tier,
            is_emergency,
            recommended_green_seconds,
            detections: admitted,
        };
        self.cache.store(frame_index, output.clone());

        FrameUpdate {
            frame_index,
            outcome: FrameOutcome::Processed,
            crossings,
            dropped,
            output,
        }
    }

    /// Validate and filter raw detections.
    ///
    /// Normal detections must pass the class allowlist and the general threshold.
    /// Emergency detections pass if they meet either the threshold or the emergency floor.
    fn admit(&mut self, frame_index: u64, raw: Vec<Detection>) -> (Vec<Detection>, Vec<DetectionFault>) {
        let floor = self.monitor.confidence_floor();
        let mut admitted = Vec::with_capacity(raw.len());
        let mut dropped = Vec::new();

        for det in raw {
            if let Err(fault) = det.validate() {
                log::warn!("frame {}: dropping detection: {}", frame_index, fault);
                dropped.push(fault);
                continue;
            }
            let keep = if det.is_emergency() {
                det.confidence >= self.confidence_threshold || det.confidence >= floor
            } else {
                det.class_id.map_or(true, |id| self.config.accepts_class_id(id))
                    && det.confidence >= self.confidence_threshold
            };
            if keep {
                admitted.push(det);
            } else {
                self.stats.detections_filtered += 1;
            }
        }

        self.stats.detections_dropped += dropped.len() as u64;
        (admitted, dropped)
    }

    fn cached_update(&self, frame_index: u64, outcome: FrameOutcome) -> FrameUpdate {
        FrameUpdate {
            frame_index,
            outcome,
            crossings: Vec::new(),
            dropped: Vec::new(),
            output: self.cache.current().clone(),
        }
    }

    fn apply_pending(&mut self) {
        if let Some(line_y) = self.pending_line_y.take() {
            if line_y != self.line_y {
                log::info!("reference line moved: {} -> {}", self.line_y, line_y);
            }
            self.line_y = line_y;
        }
        if let Some(threshold) = self.pending_confidence.take() {
            self.confidence_threshold = threshold;
        }
    }

    fn finish_run(&mut self) -> RunSummary {
        let total = self.counter.cumulative();
        let summary = RunSummary {
            approach_id: self.config.approach_id.clone(),
            source_id: self.source_id.clone(),
            frames_seen: self.stats.frames_seen,
            frames_processed: self.stats.frames_processed,
            total_unique_vehicles: total,
            estimated_clearance_seconds: estimate_clearance_seconds(
                total,
                self.config.seconds_per_vehicle,
            ),
        };
        self.state = RunState::Stopped;
        log::info!(
            "run stopped: vehicles={} clearance={}s frames={} processed={} cached={} dropped={} filtered={} detector_failures={}",
            summary.total_unique_vehicles,
            summary.estimated_clearance_seconds,
            self.stats.frames_seen,
            self.stats.frames_processed,
            self.stats.frames_cached,
            self.stats.detections_dropped,
            self.stats.detections_filtered,
            self.stats.detector_failures
        );
        self.last_summary = Some(summary.clone());
        summary
    }

    fn clear_run_state(&mut self) {
        self.counter.reset();
        self.monitor.reset();
        self.cache.reset(self.timing.min_green());
        self.frame_counter = 0;
        self.stats = SessionStats::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{BoundingBox, VehicleClass};
    use crate::DensityTier;

    fn every_frame() -> EngineConfig {
        EngineConfig {
            frame_skip: 1,
            ..EngineConfig::default()
        }
    }

    fn car(id: i64, cy: f32) -> Detection {
        Detection::new(BoundingBox::from_center(200.0, cy, 40.0, 30.0), 0.9)
            .with_track_id(id)
            .with_class_id(2)
    }

    #[test]
    fn frames_rejected_unless_running() {
        let mut session = RunSession::new(every_frame()).unwrap();
        assert!(session.push_frame(vec![]).is_err());
        assert!(session.stop().is_err());
    }

    #[test]
    fn invalid_config_refuses_session() {
        let mut cfg = every_frame();
        cfg.timing.min_green_s = 100;
        assert!(RunSession::new(cfg).is_err());
    }

    #[test]
    fn empty_frame_produces_valid_record() {
        let mut session = RunSession::new(every_frame()).unwrap();
        session.start("clip.jsonl");
        let update = session.push_frame(vec![]).unwrap();
        assert_eq!(update.outcome, FrameOutcome::Processed);
        assert_eq!(update.output.instantaneous_count, 0);
        assert_eq!(update.output.recommended_green_seconds, 10);
        assert_eq!(update.output.density_tier, DensityTier::Low);
    }

    #[test]
    fn malformed_detection_is_dropped_not_fatal() {
        let mut session = RunSession::new(every_frame()).unwrap();
        session.start("clip.jsonl");
        let bad = Detection::new(BoundingBox::new(10.0, 10.0, 5.0, 20.0), 0.9).with_track_id(4);
        let update = session.push_frame(vec![bad, car(1, 300.0)]).unwrap();
        assert_eq!(update.dropped.len(), 1);
        assert_eq!(update.output.instantaneous_count, 1);
        assert_eq!(session.stats().detections_dropped, 1);
    }

    #[test]
    fn non_vehicle_classes_and_low_confidence_are_filtered() {
        let mut session = RunSession::new(every_frame()).unwrap();
        session.start("clip.jsonl");
        let person = car(1, 300.0).with_class_id(0);
        let mut faint = car(2, 300.0);
        faint.confidence = 0.1;
        let update = session.push_frame(vec![person, faint, car(3, 300.0)]).unwrap();
        assert_eq!(update.output.instantaneous_count, 1);
        assert_eq!(session.stats().detections_filtered, 2);
    }

    #[test]
    fn emergency_below_threshold_but_above_floor_is_admitted() {
        let mut cfg = every_frame();
        cfg.confidence_threshold = 0.9;
        let mut session = RunSession::new(cfg).unwrap();
        session.start("clip.jsonl");
        let ambulance = Detection::new(BoundingBox::new(0.0, 0.0, 60.0, 40.0), 0.7)
            .with_class(VehicleClass::Emergency);
        let update = session.push_frame(vec![ambulance]).unwrap();
        assert!(update.output.is_emergency);
        assert_eq!(update.output.recommended_green_seconds, 60);
    }

    #[test]
    fn detector_failure_serves_cache_and_keeps_state() {
        let mut session = RunSession::new(every_frame()).unwrap();
        session.start("clip.jsonl");
        session.push_frame(vec![car(1, 440.0)]).unwrap();
        let before = session.output().clone();
        let update = session
            .advance(|_| Err(anyhow!("inference device lost")))
            .unwrap();
        assert_eq!(update.outcome, FrameOutcome::DetectorFailed);
        assert_eq!(update.output, before);
        assert_eq!(session.stats().detector_failures, 1);

        let update = session.push_frame(vec![car(1, 460.0)]).unwrap();
        assert_eq!(update.crossings.len(), 1);
    }

    #[test]
    fn staged_line_applies_on_next_processed_frame() {
        let mut session = RunSession::new(EngineConfig::default()).unwrap();
        session.start("clip.jsonl");
        session.set_line_y(300).unwrap();
        assert_eq!(session.line_y(), 450);

        // Frame 1 is skipped: staged value waits.
        let update = session.advance(|_| panic!("skipped frame must not detect")).unwrap();
        assert_eq!(update.outcome, FrameOutcome::Skipped);
        assert_eq!(session.line_y(), 450);

        let update = session
            .advance(|params| {
                assert_eq!(params.line_y, 300);
                Ok(vec![])
            })
            .unwrap();
        assert_eq!(update.outcome, FrameOutcome::Processed);
        assert_eq!(session.line_y(), 300);
        assert!(session.set_line_y(-1).is_err());
        assert!(session.set_confidence_threshold(2.0).is_err());
    }

    #[test]
    fn lifecycle_transitions() {
        let mut session = RunSession::new(every_frame()).unwrap();
        assert_eq!(session.state(), RunState::Idle);
        assert!(session.start("a.jsonl").is_none());
        assert!(session.reset_statistics().is_err());
        assert!(session.reconfigure(every_frame()).is_err());

        session.push_frame(vec![car(1, 440.0)]).unwrap();
        session.push_frame(vec![car(1, 460.0)]).unwrap();
        let summary = session.stop().unwrap();
        assert_eq!(session.state(), RunState::Stopped);
        assert_eq!(summary.total_unique_vehicles, 1);
        assert_eq!(summary.estimated_clearance_seconds, 2);
        assert_eq!(summary.source_id.as_deref(), Some("a.jsonl"));
        assert_eq!(session.last_summary(), Some(&summary));

        // Summary survives until the next reset; count is still visible.
        assert_eq!(session.cumulative_count(), 1);
        session.reset_statistics().unwrap();
        assert_eq!(session.state(), RunState::Idle);
        assert_eq!(session.cumulative_count(), 0);
        assert!(session.counter().ledger().is_empty());
    }

    #[test]
    fn loading_new_source_while_running_restarts() {
        let mut session = RunSession::new(every_frame()).unwrap();
        session.start("a.jsonl");
        session.push_frame(vec![car(1, 440.0)]).unwrap();
        session.push_frame(vec![car(1, 460.0)]).unwrap();

        assert!(session.load_source("a.jsonl").is_none());
        let summary = session.load_source("b.jsonl").expect("implicit stop");
        assert_eq!(summary.total_unique_vehicles, 1);
        assert_eq!(session.state(), RunState::Running);
        assert_eq!(session.cumulative_count(), 0);
        assert_eq!(session.frame_counter(), 0);
        assert_eq!(session.source_id(), Some("b.jsonl"));
    }

    #[test]
    fn loading_new_source_while_idle_resets() {
        let mut session = RunSession::new(every_frame()).unwrap();
        session.start("a.jsonl");
        session.push_frame(vec![car(1, 440.0)]).unwrap();
        session.push_frame(vec![car(1, 460.0)]).unwrap();
        session.stop().unwrap();

        assert!(session.load_source("b.jsonl").is_none());
        assert_eq!(session.state(), RunState::Stopped);
        assert_eq!(session.cumulative_count(), 0);
        assert_eq!(session.output(), &OutputRecord::empty(10));
    }

    #[test]
    fn ledger_eviction_never_recounts() {
        let mut cfg = every_frame();
        cfg.ledger.max_idle_frames = Some(2);
        let mut session = RunSession::new(cfg).unwrap();
        session.start("a.jsonl");
        session.push_frame(vec![car(1, 440.0)]).unwrap();
        session.push_frame(vec![car(1, 460.0)]).unwrap();
        for _ in 0..5 {
            session.push_frame(vec![]).unwrap();
        }
        assert!(session.stats().ledger_evictions >= 1);
        session.push_frame(vec![car(1, 440.0)]).unwrap();
        let update = session.push_frame(vec![car(1, 460.0)]).unwrap();
        assert!(update.crossings.is_empty());
        assert_eq!(session.cumulative_count(), 1);
    }
}
