//! signald - adaptive signal timing daemon for one intersection approach
//!
//! This daemon:
//! 1. Loads and validates the engine configuration
//! 2. Opens the configured frame source (JSONL replay or stub://)
//! 3. Warms up the detector backends and starts a run
//! 4. Drives the run session frame by frame, logging crossings and outputs
//! 5. Stops on end of source or Ctrl-C and appends the run summary to the run log

use anyhow::{anyhow, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use signal_kernel::{
    BackendRegistry, DetectionCapability, EngineConfig, FileConfig, FileSource, FrameOutcome,
    ReplayBackend, RunLogRow, RunLogStore, RunSession, SqliteRunLogStore,
};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(
    name = "signald",
    about = "Count vehicles crossing a reference line and recommend green time"
)]
struct Args {
    /// Config file (.toml or JSON)
    #[arg(long, env = "SIGNAL_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Frame source, overriding config (JSONL file path or stub://<name>)
    #[arg(long, value_name = "SOURCE")]
    source: Option<String>,

    /// Stop after this many frames
    #[arg(long, value_name = "N")]
    max_frames: Option<u64>,

    /// Sleep between frames, in milliseconds
    #[arg(long, default_value_t = 0, value_name = "MS")]
    pace_ms: u64,

    /// Do not append the run summary to the run log
    #[arg(long)]
    no_log: bool,

    /// Print each processed output record as a JSON line on stdout
    #[arg(long)]
    json: bool,

    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let is_tty = std::io::stderr().is_terminal();
    let ui = ui::Ui::from_args(Some(&args.ui), is_tty, args.json);

    let config = {
        let _stage = ui.stage("Load configuration");
        let mut config = EngineConfig::load_from(args.config.as_deref())?;
        if let Some(source) = &args.source {
            config.source = source.clone();
            config.validate()?;
        }
        config
    };

    let mut source = {
        let _stage = ui.stage("Open source");
        let mut source = FileSource::new(FileConfig {
            path: config.source.clone(),
            max_frames: args.max_frames,
        })?;
        source.connect()?;
        source
    };

    let registry = {
        let _stage = ui.stage("Warm up detectors");
        let mut registry = BackendRegistry::new();
        registry.register(ReplayBackend::vehicles());
        registry.register(ReplayBackend::emergency());
        if !registry.supports(DetectionCapability::EmergencyVehicles)? {
            log::warn!("no emergency-capable backend registered; priority override disabled");
        }
        registry.warm_up_all()?;
        registry
    };

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        ctrlc::set_handler(move || stop.store(true, Ordering::SeqCst))
            .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;
    }

    let db_path = config.db_path.clone();
    let mut session = RunSession::new(config)?;
    session.start(source.source_id());
    log::info!(
        "signald running: approach={} backends={:?}",
        session.config().approach_id,
        registry.list()
    );

    let progress = ui.frames();
    let pace = Duration::from_millis(args.pace_ms);
    let mut last_health_log = Instant::now();
    let mut source_error = None;

    while !stop.load(Ordering::SeqCst) {
        let frame = match source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(e) => {
                log::error!("source failed: {}", e);
                source_error = Some(e);
                break;
            }
        };

        let update = session
            .advance(|params| registry.detect_all(&frame, params.confidence_threshold))?;

        if update.outcome == FrameOutcome::Processed {
            let out = &update.output;
            if args.json {
                println!("{}", serde_json::to_string(out)?);
            }
            progress.update(
                update.frame_index,
                format!(
                    "total={} active={} tier={} green={}s{}",
                    out.cumulative_count,
                    out.instantaneous_count,
                    out.density_tier,
                    out.recommended_green_seconds,
                    if out.is_emergency { " EMERGENCY" } else { "" }
                ),
            );
        }

        if last_health_log.elapsed() >= Duration::from_secs(5) {
            let stats = source.stats();
            log::info!(
                "source health={} frames={} path={} total={}",
                source.is_healthy(),
                stats.frames_read,
                stats.path,
                session.cumulative_count()
            );
            last_health_log = Instant::now();
        }

        if !pace.is_zero() {
            std::thread::sleep(pace);
        }
    }
    progress.finish();

    if stop.load(Ordering::SeqCst) {
        log::info!("shutdown signal received, stopping run...");
    }
    let summary = session.stop()?;
    println!(
        "approach={} total_vehicles={} signal_time_s={}",
        summary.approach_id, summary.total_unique_vehicles, summary.estimated_clearance_seconds
    );

    if !args.no_log {
        let _stage = ui.stage("Append run log");
        let mut store = SqliteRunLogStore::open(&db_path)?;
        let entry_hash = store.append(&RunLogRow::now(&summary))?;
        log::info!("run log entry {} written to {}", hex::encode(entry_hash), db_path);
    }

    match source_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
