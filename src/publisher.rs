//! Snapshot publication.
//!
//! The poll loop hands snapshots to a [`Publisher`] and moves on; a separate
//! writer task persists them.  The handoff is a single slot: submitting while
//! a snapshot is still pending replaces it, so a slow SD card coalesces
//! updates instead of queueing them.
//!
//! Every write goes to a fresh temp file in the destination directory, is
//! fsynced, and is then renamed over the destination.  Readers therefore only
//! ever see a complete old file or a complete new one.

use std::fs::{self, File, Permissions};
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, error, info, warn};
use tempfile::NamedTempFile;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::snapshot::Snapshot;

/// Sending half of the single-slot handoff.  Dropping it lets the writer
/// finish the pending snapshot and exit.
pub struct Publisher {
    slot: watch::Sender<Option<Arc<Snapshot>>>,
}

impl Publisher {
    /// Offer `snapshot` for writing, replacing any snapshot not yet picked up.
    pub fn submit(&self, snapshot: Snapshot) {
        let nodes = snapshot.nodes.len();
        self.slot.send_replace(Some(Arc::new(snapshot)));
        debug!("snapshot queued ({nodes} nodes)");
    }
}

/// Create the handoff and spawn the writer task for `path`.
pub fn spawn(path: PathBuf) -> (Publisher, JoinHandle<()>) {
    let (tx, rx) = watch::channel(None);
    let writer = tokio::spawn(writer_loop(path, rx));
    (Publisher { slot: tx }, writer)
}

async fn writer_loop(path: PathBuf, mut rx: watch::Receiver<Option<Arc<Snapshot>>>) {
    // `changed` still reports a pending value after the sender is gone.
    while rx.changed().await.is_ok() {
        let pending = rx.borrow_and_update().clone();
        let Some(snapshot) = pending else { continue };

        let target = path.clone();
        match tokio::task::spawn_blocking(move || write_atomic(&target, &snapshot)).await {
            Ok(Ok(nodes)) => info!("wrote {} ({nodes} nodes)", path.display()),
            Ok(Err(e)) => warn!("write error for {}: {e}", path.display()),
            Err(e) => error!("writer task failed: {e}"),
        }
    }
    debug!("writer stopped");
}

/// Serialise `snapshot` and atomically replace `path` with it.
/// Returns the number of nodes written.
///
/// On any failure the destination is left untouched and the temp file is
/// removed.
pub fn write_atomic(path: &Path, snapshot: &Snapshot) -> Result<usize> {
    let body = serde_json::to_vec_pretty(snapshot)?;
    let staged = stage(path, &body)?;
    staged.persist(path)?;

    if let Some(dir) = path.parent() {
        if let Ok(d) = File::open(dir) {
            let _ = d.sync_all();
        }
    }
    Ok(snapshot.nodes.len())
}

/// Write `body` to a synced temp file next to `path` without touching `path`.
fn stage(path: &Path, body: &[u8]) -> Result<NamedTempFile> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("node_status.json");
    let prefix = format!(".{name}.");

    let mut tmp = tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(".tmp")
        .tempfile_in(dir)?;
    // Readers run as other users; mkstemp's 0600 would lock them out.
    tmp.as_file().set_permissions(Permissions::from_mode(0o644))?;
    tmp.write_all(body)?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;
    Ok(tmp)
}
