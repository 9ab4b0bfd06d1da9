//! Checkpoint files for long-running explorations
//!
//! A checkpoint captures everything needed to resume an exhaustive search:
//! the seen fingerprints, the states still queued, the trace entries used to
//! rebuild counterexamples, and the liveness behavior graph when the model
//! has temporal properties. It is written as one JSON document,
//! first to a temporary file which is then renamed over the previous
//! checkpoint, so a crash mid-write never leaves a truncated file behind.

use crate::error::CheckpointError;
use crate::fingerprint::Fingerprint;
use crate::liveness::GraphSnapshot;
use chrono::{DateTime, Utc};
use humansize::{format_size, BINARY};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Current checkpoint format version
pub const CHECKPOINT_VERSION: u32 = 2;

/// File name of the checkpoint inside the metadata directory
pub const CHECKPOINT_FILE: &str = "checkpoint.json";

/// A state waiting in the queue when the checkpoint was taken
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedState<S> {
    pub state: S,
    pub fp: Fingerprint,
    pub depth: u32,
}

/// One entry of the trace store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRecord<S> {
    pub fp: Fingerprint,
    pub parent: Option<Fingerprint>,
    pub action: Option<usize>,
    pub state: S,
}

/// Everything saved by a checkpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(deserialize = "S: Deserialize<'de>"))]
pub struct Checkpoint<S> {
    /// Format version
    pub version: u32,

    /// When the checkpoint was written
    pub written_at: DateTime<Utc>,

    /// Model the checkpoint belongs to
    pub model: String,

    /// States generated so far
    pub generated: u64,

    /// Distinct states found so far
    pub distinct: u64,

    /// Longest behavior explored so far
    pub diameter: u64,

    /// Every seen fingerprint
    pub seen: Vec<u64>,

    /// States still to be explored
    pub queue: Vec<QueuedState<S>>,

    /// Parent pointers for trace reconstruction
    pub trace: Vec<TraceRecord<S>>,

    /// Behavior graph of the liveness checker, if one was recording
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liveness: Option<GraphSnapshot<S>>,
}

/// Writes checkpoints on a fixed cadence
pub struct Checkpointer {
    /// Directory holding the checkpoint file
    dir: PathBuf,

    /// Time between checkpoints
    interval: Duration,

    /// When the last checkpoint was written (or the run started)
    last: Mutex<Instant>,
}

impl Checkpointer {
    pub fn new(dir: impl Into<PathBuf>, interval: Duration) -> Self {
        Self {
            dir: dir.into(),
            interval,
            last: Mutex::new(Instant::now()),
        }
    }

    /// Path of the checkpoint file
    pub fn path(&self) -> PathBuf {
        self.dir.join(CHECKPOINT_FILE)
    }

    /// Whether a checkpoint is due
    pub fn is_due(&self) -> bool {
        self.last.lock().elapsed() >= self.interval
    }

    /// Write `checkpoint`, returning the number of bytes written
    pub fn write<S: Serialize>(&self, checkpoint: &Checkpoint<S>) -> Result<u64, CheckpointError> {
        fs::create_dir_all(&self.dir).map_err(io_err(&self.dir))?;

        let path = self.path();
        let tmp = self.dir.join(format!("{}.tmp", CHECKPOINT_FILE));
        {
            let file = fs::File::create(&tmp).map_err(io_err(&tmp))?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer(&mut writer, checkpoint)?;
            writer.flush().map_err(io_err(&tmp))?;
        }
        fs::rename(&tmp, &path).map_err(io_err(&path))?;

        let bytes = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        *self.last.lock() = Instant::now();

        info!(
            path = %path.display(),
            distinct = checkpoint.distinct,
            queued = checkpoint.queue.len(),
            size = %format_size(bytes, BINARY),
            "Checkpoint written"
        );
        Ok(bytes)
    }
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> CheckpointError {
    let path = path.to_path_buf();
    move |source| CheckpointError::Io { path, source }
}

/// Resolve a recovery source: a checkpoint file or a directory holding one
pub fn resolve_path(source: &Path) -> PathBuf {
    if source.is_dir() {
        source.join(CHECKPOINT_FILE)
    } else {
        source.to_path_buf()
    }
}

/// Read a checkpoint written for `expected_model`
pub fn read<S: DeserializeOwned>(
    source: &Path,
    expected_model: &str,
) -> Result<Checkpoint<S>, CheckpointError> {
    let path = resolve_path(source);
    let file = fs::File::open(&path).map_err(io_err(&path))?;
    let checkpoint: Checkpoint<S> = serde_json::from_reader(BufReader::new(file))?;

    if checkpoint.version != CHECKPOINT_VERSION {
        return Err(CheckpointError::VersionMismatch {
            path,
            found: checkpoint.version,
            expected: CHECKPOINT_VERSION,
        });
    }
    if checkpoint.model != expected_model {
        return Err(CheckpointError::ModelMismatch {
            path,
            found: checkpoint.model,
            expected: expected_model.to_string(),
        });
    }

    debug!(
        path = %path.display(),
        written_at = %checkpoint.written_at,
        distinct = checkpoint.distinct,
        "Checkpoint read"
    );
    Ok(checkpoint)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::liveness::SavedNode;
    use tempfile::TempDir;

    fn sample() -> Checkpoint<(u8, u8)> {
        Checkpoint {
            version: CHECKPOINT_VERSION,
            written_at: Utc::now(),
            model: "DieHard".into(),
            generated: 10,
            distinct: 3,
            diameter: 2,
            seen: vec![1, 2, 3],
            queue: vec![QueuedState {
                state: (3, 0),
                fp: Fingerprint(3),
                depth: 2,
            }],
            trace: vec![TraceRecord {
                fp: Fingerprint(1),
                parent: None,
                action: None,
                state: (0, 0),
            }],
            liveness: None,
        }
    }

    #[test]
    fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let checkpointer = Checkpointer::new(dir.path(), Duration::from_secs(60));
        assert!(checkpointer.write(&sample()).unwrap() > 0);
        assert!(!dir.path().join("checkpoint.json.tmp").exists());

        let restored: Checkpoint<(u8, u8)> = read(dir.path(), "DieHard").unwrap();
        assert_eq!(restored.distinct, 3);
        assert_eq!(restored.queue[0].state, (3, 0));
        assert_eq!(restored.trace[0].parent, None);
        assert!(restored.liveness.is_none());
    }

    #[test]
    fn test_behavior_graph_saved() {
        let dir = TempDir::new().unwrap();
        let mut checkpoint = sample();
        checkpoint.liveness = Some(GraphSnapshot {
            nodes: vec![SavedNode {
                fp: Fingerprint(1),
                state: (0, 0),
                pending: true,
            }],
            edges: vec![(Fingerprint(1), Fingerprint(1))],
        });
        Checkpointer::new(dir.path(), Duration::ZERO).write(&checkpoint).unwrap();

        let restored: Checkpoint<(u8, u8)> = read(dir.path(), "DieHard").unwrap();
        assert_eq!(restored.liveness, checkpoint.liveness);
    }

    #[test]
    fn test_model_mismatch() {
        let dir = TempDir::new().unwrap();
        Checkpointer::new(dir.path(), Duration::ZERO).write(&sample()).unwrap();
        let err = read::<(u8, u8)>(dir.path(), "TokenRing").unwrap_err();
        assert!(matches!(err, CheckpointError::ModelMismatch { .. }));
    }

    #[test]
    fn test_version_mismatch() {
        let dir = TempDir::new().unwrap();
        let mut checkpoint = sample();
        checkpoint.version = CHECKPOINT_VERSION + 1;
        Checkpointer::new(dir.path(), Duration::ZERO).write(&checkpoint).unwrap();
        let err = read::<(u8, u8)>(dir.path(), "DieHard").unwrap_err();
        assert!(matches!(err, CheckpointError::VersionMismatch { .. }));
    }

    #[test]
    fn test_write_into_file_path_fails() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, b"x").unwrap();
        let checkpointer = Checkpointer::new(&blocker, Duration::ZERO);
        assert!(matches!(
            checkpointer.write(&sample()),
            Err(CheckpointError::Io { .. })
        ));
    }

    #[test]
    fn test_is_due() {
        let dir = TempDir::new().unwrap();
        assert!(Checkpointer::new(dir.path(), Duration::ZERO).is_due());
        assert!(!Checkpointer::new(dir.path(), Duration::from_secs(3600)).is_due());
    }
}
