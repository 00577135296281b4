//! Traffic Signal Kernel
//!
//! This crate turns a frame-by-frame stream of tracked detections from one
//! intersection approach into a running vehicle count, a density tier, an
//! emergency override and a bounded green-time recommendation.
//!
//! # Architecture
//!
//! The kernel holds these properties by construction:
//!
//! 1. **Count Once**: a track id contributes at most one increment per run.
//! 2. **Forward Only**: only downward crossings of the reference line count.
//! 3. **Atomic Reset**: ledger, count and cache are cleared together or not at all.
//! 4. **Bounded Output**: green time always lies in `[min_green, max_green]`.
//! 5. **No Flicker**: skipped frames repeat the last processed output verbatim.
//! 6. **Owned State**: every mutable value lives in a `RunSession` owned by the host.
//!
//! # Module Structure
//!
//! - `detect`: Detection model, validation, detector backends and registry
//! - `ledger`, `counter`: Track positions and line-crossing count
//! - `density`, `emergency`, `timing`: Per-frame classification and recommendation
//! - `cache`, `session`: Frame-skip buffer and run orchestration
//! - `config`, `ingest`: Host-side configuration and frame sources
//! - `chain`, `storage`: Hash-chained run log

use anyhow::{anyhow, Result};
use rand::RngCore;
use rusqlite::{Connection, OpenFlags};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

pub mod cache;
pub mod chain;
pub mod config;
pub mod counter;
pub mod density;
pub mod detect;
pub mod emergency;
pub mod ingest;
pub mod ledger;
pub mod session;
pub mod storage;
pub mod timing;

pub use cache::TemporalCache;
pub use chain::{hash_entry, verify_chain, GENESIS_HASH};
pub use config::EngineConfig;
pub use counter::{CrossingEvent, LineCrossingCounter};
pub use density::{DensityClassifier, DensityTier};
pub use detect::{
    BackendRegistry, BoundingBox, Detection, DetectionCapability, DetectionFault, DetectionFrame,
    DetectorBackend, ReplayBackend, VehicleClass,
};
pub use emergency::{frame_has_emergency, EmergencyMonitor};
pub use ingest::{file::FileConfig, FileSource};
pub use ledger::{TrackId, TrackLedger};
pub use session::{FrameOutcome, FrameParams, FrameUpdate, RunSession, RunState, SessionStats};
pub use storage::{InMemoryRunLogStore, RunLogEntry, RunLogRow, RunLogStore, SqliteRunLogStore};
pub use timing::{estimate_clearance_seconds, TimingController};

pub fn shared_memory_uri() -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!(
        "file:signal_kernel_{:x}?mode=memory&cache=shared",
        u64::from_le_bytes(bytes)
    )
}

pub(crate) fn open_db_connection(db_path: &str) -> Result<Connection> {
    if db_path.starts_with("file:") {
        return Ok(Connection::open_with_flags(
            db_path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI,
        )?);
    }
    Ok(Connection::open(db_path)?)
}

// -------------------- Output Records --------------------

/// Per-frame output handed to presentation and logging collaborators.
///
/// On skipped frames this is the previous processed frame's record, unchanged.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutputRecord {
    pub cumulative_count: u64,
    pub instantaneous_count: usize,
    pub density_tier: DensityTier,
    /// When true, presentation overrides `density_tier` and the signal grants priority.
    pub is_emergency: bool,
    pub recommended_green_seconds: u32,
    /// Admitted detections, for drawing.
    pub detections: Vec<Detection>,
}

impl OutputRecord {
    /// Output before any frame has been processed.
    pub fn empty(min_green: u32) -> Self {
        Self {
            cumulative_count: 0,
            instantaneous_count: 0,
            density_tier: DensityTier::Low,
            is_emergency: false,
            recommended_green_seconds: min_green,
            detections: Vec::new(),
        }
    }
}

/// Emitted once when a run stops.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub approach_id: String,
    pub source_id: Option<String>,
    pub frames_seen: u64,
    pub frames_processed: u64,
    pub total_unique_vehicles: u64,
    pub estimated_clearance_seconds: u64,
}

// -------------------- Approach ID Discipline --------------------

/// An approach id names one monitored intersection approach.
///
/// Allowed: "approach:main", "approach:north_1", "approach:5th-ave"
/// Disallowed: whitespace, slashes, or punctuation outside [_-].
pub fn validate_approach_id(approach_id: &str) -> Result<()> {
    static APPROACH_ID_RE: OnceLock<regex::Regex> = OnceLock::new();
    let re = APPROACH_ID_RE
        .get_or_init(|| regex::Regex::new(r"^approach:[a-z0-9_-]{1,64}$").unwrap());

    let id = approach_id.to_lowercase();
    if !re.is_match(&id) {
        return Err(anyhow!(
            "config: approach_id must match ^approach:[a-z0-9_-]{{1,64}}$"
        ));
    }
    Ok(())
}
