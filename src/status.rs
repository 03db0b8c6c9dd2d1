//! Typed progress events for long-running operations.
//!
//! The manifest engine and the shredder report per-file progress through a
//! channel rather than a callback, so a host can drain events from any
//! thread it likes. A receiver that has hung up never errors the engine:
//! dropped events are acceptable, aborted encryptions are not.

use std::path::PathBuf;

/// One progress event from a manifest build/restore or a shred run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusEvent {
    /// Work on a file has begun.
    Started {
        /// Path relative to the operation root.
        path: PathBuf,
        /// 1-based position in the run.
        index: usize,
        /// Total number of files in the run.
        total: usize,
    },

    /// A file was encrypted into the vault and its manifest entry written.
    Stored {
        /// Path relative to the archive root.
        original: PathBuf,
        /// Vault-local ciphertext name.
        stored: String,
    },

    /// A file was decrypted back to its original relative path.
    Restored {
        /// Path relative to the restoration root.
        original: PathBuf,
    },

    /// A per-file failure that did not abort the run.
    Warn {
        /// The file the failure concerns.
        path: PathBuf,
        /// Human-readable description.
        message: String,
    },

    /// A manifest entry tried to escape the restoration root. The entry
    /// was skipped and nothing was created.
    SecurityAlert {
        /// The offending relative path as recorded in the manifest.
        path: PathBuf,
    },

    /// The whole run is aborting.
    Fatal {
        /// Human-readable description.
        message: String,
    },

    /// One shredder overwrite pass finished for a file.
    WipePass {
        /// The file being overwritten.
        path: PathBuf,
        /// 1-based pass number.
        pass: u32,
        /// Total passes requested.
        total: u32,
    },
}

/// Sending half of a status channel.
///
/// Cloneable and cheap; a disconnected receiver is silently ignored.
#[derive(Clone)]
pub struct StatusSender {
    tx: Option<flume::Sender<StatusEvent>>,
}

impl StatusSender {
    /// A sender that discards every event, for callers that do not care
    /// about progress.
    #[must_use]
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Emits one event. Never fails.
    pub fn send(&self, event: StatusEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}

/// Creates a status channel: the sender goes into the engine, the receiver
/// stays with the host.
#[must_use]
pub fn channel() -> (StatusSender, flume::Receiver<StatusEvent>) {
    let (tx, rx) = flume::unbounded();
    (StatusSender { tx: Some(tx) }, rx)
}
