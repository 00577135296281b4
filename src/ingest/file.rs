//! Local file frame source.
//!
//! A replay file is JSON Lines, one frame per line:
//!
//! ```text
//! {"index": 1, "detections": [{"track_id": 4, "bbox": {"x1": 180, "y1": 425, "x2": 220, "y2": 455}, "confidence": 0.91, "class_id": 2}]}
//! ```
//!
//! `index` may be omitted, in which case frames are numbered sequentially.
//! Blank lines and lines starting with `#` are ignored.

use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};

use super::synthetic::SyntheticSource;
use crate::detect::{Detection, DetectionFrame};

/// Configuration for a local file source.
#[derive(Clone, Debug, Default)]
pub struct FileConfig {
    /// Local file path (e.g., "/var/lib/signal/approach_main.jsonl") or `stub://<name>`.
    pub path: String,
    /// Stop after this many frames. Synthetic sources never end without it.
    pub max_frames: Option<u64>,
}

impl FileConfig {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            max_frames: None,
        }
    }
}

/// Local file frame source.
pub struct FileSource {
    config: FileConfig,
    backend: FileBackend,
    frames_read: u64,
}

enum FileBackend {
    Synthetic(SyntheticSource),
    Jsonl(JsonlReader),
}

impl FileSource {
    pub fn new(config: FileConfig) -> Result<Self> {
        if !is_local_file_path(&config.path) {
            return Err(anyhow!(
                "file ingestion only supports local paths or stub:// (got {:?})",
                config.path
            ));
        }
        let backend = if config.path.starts_with("stub://") {
            FileBackend::Synthetic(SyntheticSource::new())
        } else {
            FileBackend::Jsonl(JsonlReader::default())
        };
        Ok(Self {
            config,
            backend,
            frames_read: 0,
        })
    }

    /// Stable identifier of this source, used to detect source changes.
    pub fn source_id(&self) -> &str {
        &self.config.path
    }

    /// Open the underlying file. Synthetic sources need no connection.
    pub fn connect(&mut self) -> Result<()> {
        match &mut self.backend {
            FileBackend::Synthetic(_) => {
                log::info!("FileSource: connected to {} (synthetic)", self.config.path);
            }
            FileBackend::Jsonl(reader) => {
                reader.open(&self.config.path)?;
                log::info!("FileSource: opened {}", self.config.path);
            }
        }
        Ok(())
    }

    /// Next frame, or `None` once the source is exhausted.
    pub fn next_frame(&mut self) -> Result<Option<DetectionFrame>> {
        if self
            .config
            .max_frames
            .is_some_and(|max| self.frames_read >= max)
        {
            return Ok(None);
        }
        let next_index = self.frames_read + 1;
        let frame = match &mut self.backend {
            FileBackend::Synthetic(source) => Some(source.next_frame(next_index)),
            FileBackend::Jsonl(reader) => reader.next_frame(next_index, &self.config.path)?,
        };
        if frame.is_some() {
            self.frames_read += 1;
        }
        Ok(frame)
    }

    pub fn is_healthy(&self) -> bool {
        match &self.backend {
            FileBackend::Synthetic(_) => true,
            FileBackend::Jsonl(reader) => reader.lines.is_some(),
        }
    }

    pub fn stats(&self) -> FileStats {
        FileStats {
            frames_read: self.frames_read,
            path: self.config.path.clone(),
        }
    }
}

/// Statistics for a file source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileStats {
    pub frames_read: u64,
    pub path: String,
}

#[derive(Deserialize)]
struct FrameLine {
    #[serde(default)]
    index: Option<u64>,
    #[serde(default)]
    detections: Vec<Detection>,
}

#[derive(Default)]
struct JsonlReader {
    lines: Option<Lines<BufReader<File>>>,
    line_no: u64,
}

impl JsonlReader {
    fn open(&mut self, path: &str) -> Result<()> {
        let file = File::open(path).map_err(|e| anyhow!("failed to open {}: {}", path, e))?;
        self.lines = Some(BufReader::new(file).lines());
        self.line_no = 0;
        Ok(())
    }

    fn next_frame(&mut self, next_index: u64, path: &str) -> Result<Option<DetectionFrame>> {
        let lines = self
            .lines
            .as_mut()
            .ok_or_else(|| anyhow!("file source {} is not connected", path))?;
        for line in lines.by_ref() {
            self.line_no += 1;
            let line = line.map_err(|e| anyhow!("{}:{}: read failed: {}", path, self.line_no, e))?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let parsed: FrameLine = serde_json::from_str(trimmed)
                .map_err(|e| anyhow!("{}:{}: invalid frame: {}", path, self.line_no, e))?;
            return Ok(Some(DetectionFrame {
                index: parsed.index.unwrap_or(next_index),
                detections: parsed.detections,
            }));
        }
        Ok(None)
    }
}

fn is_local_file_path(path: &str) -> bool {
    if path.trim().is_empty() {
        return false;
    }
    if path.starts_with("stub://") {
        return true;
    }
    !path.contains("://")
}
