//! Frame ingestion sources.
//!
//! Sources yield `DetectionFrame`s: tracker output already materialized per frame.
//! - Local JSONL replay files (one frame per line)
//! - Synthetic intersection traffic (`stub://...`, testing and demos)
//!
//! Sources are local-only. A path with a URL scheme other than `stub://` is rejected.

pub mod file;
mod synthetic;

pub use file::{FileConfig, FileSource, FileStats};
