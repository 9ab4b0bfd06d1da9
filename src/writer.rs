//! State graph dump sinks
//!
//! Workers report every initial state and every transition to a
//! `StateWriter`. The default sink drops them; `DotStateWriter` streams them
//! to a GraphViz file from a dedicated writer thread, fed through a bounded
//! channel so workers never touch the file themselves.

use crate::fingerprint::Fingerprint;
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

/// Channel capacity between workers and the writer thread
const CHANNEL_SIZE: usize = 4096;

/// Sink for explored states and transitions
pub trait StateWriter: Send + Sync {
    /// An initial state
    fn write_init(&self, fp: Fingerprint, label: &str);

    /// A transition; `is_new` tells whether `to` was seen for the first time
    fn write_edge(&self, from: Fingerprint, to: Fingerprint, action: &str, is_new: bool);

    /// Flush and close the sink
    fn close(&self) -> io::Result<()>;

    fn is_noop(&self) -> bool {
        false
    }
}

/// Sink that discards everything
#[derive(Debug, Default)]
pub struct NoopStateWriter;

impl StateWriter for NoopStateWriter {
    fn write_init(&self, _fp: Fingerprint, _label: &str) {}

    fn write_edge(&self, _from: Fingerprint, _to: Fingerprint, _action: &str, _is_new: bool) {}

    fn close(&self) -> io::Result<()> {
        Ok(())
    }

    fn is_noop(&self) -> bool {
        true
    }
}

/// Message types sent to the writer thread
#[derive(Debug)]
enum WriterMessage {
    /// An initial state
    Init { fp: Fingerprint, label: String },

    /// A transition
    Edge {
        from: Fingerprint,
        to: Fingerprint,
        action: String,
        is_new: bool,
    },

    /// Finish the file and exit
    Shutdown,
}

/// GraphViz writer running in its own thread
pub struct DotStateWriter {
    sender: Sender<WriterMessage>,
    handle: Mutex<Option<JoinHandle<io::Result<()>>>>,
    written: Arc<AtomicU64>,
    path: PathBuf,
}

impl DotStateWriter {
    /// Create `path` and spawn the writer thread
    pub fn create(path: &Path) -> io::Result<Self> {
        let file = BufWriter::new(File::create(path)?);
        let (sender, receiver) = bounded(CHANNEL_SIZE);
        let written = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&written);

        let handle = thread::Builder::new()
            .name("dot-writer".into())
            .spawn(move || writer_thread(file, receiver, counter))?;

        Ok(Self {
            sender,
            handle: Mutex::new(Some(handle)),
            written,
            path: path.to_path_buf(),
        })
    }

    /// Number of records written so far
    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn send(&self, msg: WriterMessage) {
        if self.sender.send(msg).is_err() {
            warn!(path = %self.path.display(), "State writer closed, dropping record");
        }
    }
}

impl StateWriter for DotStateWriter {
    fn write_init(&self, fp: Fingerprint, label: &str) {
        self.send(WriterMessage::Init {
            fp,
            label: label.to_string(),
        });
    }

    fn write_edge(&self, from: Fingerprint, to: Fingerprint, action: &str, is_new: bool) {
        self.send(WriterMessage::Edge {
            from,
            to,
            action: action.to_string(),
            is_new,
        });
    }

    fn close(&self) -> io::Result<()> {
        let Some(handle) = self.handle.lock().take() else {
            return Ok(());
        };
        let _ = self.sender.send(WriterMessage::Shutdown);
        match handle.join() {
            Ok(result) => result,
            Err(_) => Err(io::Error::other("State writer thread panicked")),
        }
    }
}

fn writer_thread(
    mut out: BufWriter<File>,
    receiver: Receiver<WriterMessage>,
    written: Arc<AtomicU64>,
) -> io::Result<()> {
    writeln!(out, "strict digraph DiskGraph {{")?;
    while let Ok(msg) = receiver.recv() {
        match msg {
            WriterMessage::Init { fp, label } => {
                writeln!(out, "  \"{fp}\" [label={label:?},style = filled];")?;
            }
            WriterMessage::Edge {
                from,
                to,
                action,
                is_new,
            } => {
                if is_new {
                    writeln!(out, "  \"{to}\";")?;
                }
                writeln!(out, "  \"{from}\" -> \"{to}\" [label={action:?}];")?;
            }
            WriterMessage::Shutdown => break,
        }
        written.fetch_add(1, Ordering::Relaxed);
    }
    writeln!(out, "}}")?;
    out.flush()?;
    debug!(records = written.load(Ordering::Relaxed), "State writer finished");
    Ok(())
}
