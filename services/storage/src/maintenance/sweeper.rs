//! services/storage/src/maintenance/sweeper.rs
//!
//! The background expiry sweep.
//!
//! The sweeper alternates between idle and scanning on a fixed interval and
//! deletes workspaces idle for longer than the TTL. It must outlive transient
//! filesystem errors, so failures on one entry are logged and skipped. It is
//! stopped through a `CancellationToken`, which is checked between entries
//! and while sleeping.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use mdpdf_core::domain::{now_epoch, META_FILENAME};
use mdpdf_core::{confine, normalize_token, WorkspaceMeta};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::adapters::fs_workspace::{remove_tree, write_atomic};
use crate::config::{Config, MetaFallback, MIN_CLEANUP_INTERVAL};

/// Counts from one pass over the workspaces root.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    /// Workspace directories whose age was evaluated.
    pub scanned: usize,
    pub deleted: usize,
    /// Entries skipped because of a filesystem error.
    pub failed: usize,
}

enum EntryOutcome {
    NotAWorkspace,
    Alive,
    Expired,
}

#[derive(Debug, Clone)]
pub struct ExpirySweeper {
    root: PathBuf,
    ttl_seconds: Option<f64>,
    interval: Duration,
    fallback: MetaFallback,
}

impl ExpirySweeper {
    /// `root` must be canonical. A `ttl_seconds` of `None` (or `<= 0`) disables expiry.
    pub fn new(
        root: PathBuf,
        ttl_seconds: Option<f64>,
        interval: Duration,
        fallback: MetaFallback,
    ) -> Self {
        Self {
            root,
            ttl_seconds: ttl_seconds.filter(|ttl| *ttl > 0.0),
            interval: interval.max(MIN_CLEANUP_INTERVAL),
            fallback,
        }
    }

    pub fn from_config(root: PathBuf, config: &Config) -> Self {
        Self::new(
            root,
            config.ttl_seconds(),
            config.cleanup_interval,
            config.meta_fallback,
        )
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Starts the sweep loop on the runtime.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }

    /// Scans, sleeps for the interval, and repeats until cancelled.
    ///
    /// Scans run on the blocking pool. A scan in flight when cancellation
    /// arrives stops at the next entry boundary.
    pub async fn run(self, cancel: CancellationToken) {
        info!(interval = ?self.interval, "Expiry sweeper started.");
        loop {
            if cancel.is_cancelled() {
                break;
            }

            let sweeper = self.clone();
            let scan_cancel = cancel.clone();
            match tokio::task::spawn_blocking(move || sweeper.sweep_once(&scan_cancel)).await {
                Ok(report) if report.deleted > 0 || report.failed > 0 => info!(
                    deleted = report.deleted,
                    failed = report.failed,
                    scanned = report.scanned,
                    "Expiry sweep finished."
                ),
                Ok(report) => debug!(scanned = report.scanned, "Expiry sweep finished."),
                Err(e) => error!("Expiry sweep task failed: {}", e),
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
        info!("Expiry sweeper stopped.");
    }

    /// One pass over the immediate children of the root.
    pub fn sweep_once(&self, cancel: &CancellationToken) -> SweepReport {
        let mut report = SweepReport::default();
        let Some(ttl) = self.ttl_seconds else {
            return report;
        };
        let now = now_epoch();

        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return report,
            Err(e) => {
                warn!(error = %e, "Cannot list workspaces root; skipping sweep.");
                report.failed += 1;
                return report;
            }
        };

        for entry in entries {
            if cancel.is_cancelled() {
                info!("Expiry sweep interrupted by shutdown.");
                break;
            }
            let path = match entry {
                Ok(entry) => entry.path(),
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable directory entry.");
                    report.failed += 1;
                    continue;
                }
            };
            match self.sweep_entry(&path, now, ttl) {
                Ok(EntryOutcome::NotAWorkspace) => {}
                Ok(EntryOutcome::Alive) => report.scanned += 1,
                Ok(EntryOutcome::Expired) => {
                    report.scanned += 1;
                    report.deleted += 1;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to sweep workspace; continuing.");
                    report.failed += 1;
                }
            }
        }
        report
    }

    fn sweep_entry(&self, path: &Path, now: f64, ttl: f64) -> io::Result<EntryOutcome> {
        match fs::symlink_metadata(path) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Ok(EntryOutcome::NotAWorkspace),
            // Removed by someone else since the listing.
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(EntryOutcome::NotAWorkspace),
            Err(e) => return Err(e),
        }
        let Some(token) = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| normalize_token(n).ok())
        else {
            return Ok(EntryOutcome::NotAWorkspace);
        };

        let last_access = self.last_access(path, now);
        if now - last_access > ttl {
            remove_tree(path)?;
            debug!(token = %token, "Expired workspace removed.");
            Ok(EntryOutcome::Expired)
        } else {
            Ok(EntryOutcome::Alive)
        }
    }

    /// Reads `last_access`, applying the configured fallback when the
    /// metadata is missing or corrupt.
    fn last_access(&self, workspace: &Path, now: f64) -> f64 {
        let meta_path = match confine(workspace, [META_FILENAME]) {
            Ok(path) => path,
            Err(_) => return WorkspaceMeta::never_accessed().effective_last_access(),
        };
        let parsed = fs::read(&meta_path)
            .map_err(mdpdf_core::StorageError::from)
            .and_then(|bytes| WorkspaceMeta::from_json(&bytes));
        match (parsed, self.fallback) {
            (Ok(meta), _) => meta.effective_last_access(),
            (Err(_), MetaFallback::Expire) => WorkspaceMeta::never_accessed().effective_last_access(),
            (Err(_), MetaFallback::Keep) => {
                // Give the workspace a full TTL from now instead of keeping it forever.
                if let Ok(json) = WorkspaceMeta::fresh().to_json() {
                    if let Err(e) = write_atomic(&meta_path, &json) {
                        warn!(error = %e, "Could not repair workspace metadata.");
                    }
                }
                now
            }
        }
    }
}
