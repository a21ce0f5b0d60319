//! Expiry sweeping of generated artifacts.
//!
//! One sweep run lists the output directory, recovers each artifact's
//! embedded expiry and deletes the ones whose expiry is strictly in the past.
//! Artifacts whose expiry cannot be read are kept, unless the absolute-age
//! fallback is configured and both the name's creation time and the file's
//! modification time are older than that age.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use vgen_models::ArtifactState;

use crate::error::{MediaError, MediaResult};
use crate::metrics::record_sweep;
use crate::output_dir::{ArtifactEntry, ArtifactReader, OutputDir, RemoveOutcome};
use crate::probe::Ffprobe;

/// Default time between sweep runs.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(300);
/// Default absolute age after which unreadable artifacts are reclaimed.
pub const DEFAULT_ORPHAN_MAX_AGE: Duration = Duration::from_secs(24 * 3600);

/// Source of embedded expiry timestamps.
#[async_trait]
pub trait ExpiryProbe: Send + Sync {
    /// `Ok(None)` when the file is readable but carries no expiry tag.
    async fn read_expiry(&self, path: &Path) -> MediaResult<Option<DateTime<Utc>>>;
}

#[async_trait]
impl ExpiryProbe for Ffprobe {
    async fn read_expiry(&self, path: &Path) -> MediaResult<Option<DateTime<Utc>>> {
        Ok(self.probe_format(path).await?.expires_at())
    }
}

/// Sweeper configuration.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    pub interval: Duration,
    /// Absolute-age fallback for unreadable artifacts; `None` never reclaims them
    pub orphan_max_age: Option<Duration>,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_SWEEP_INTERVAL,
            orphan_max_age: Some(DEFAULT_ORPHAN_MAX_AGE),
        }
    }
}

/// What to do with one artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepDecision {
    Keep(ArtifactState),
    DeleteExpired,
    DeleteOrphan,
}

/// Decide the fate of one artifact.
///
/// With a readable expiry only `(now, expires_at)` matters. Without one the
/// artifact is kept unless `orphan_max_age` is set and every known age of the
/// file (name timestamp, modification time) exceeds it.
pub fn decide(
    now: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    modified_at: Option<DateTime<Utc>>,
    orphan_max_age: Option<Duration>,
) -> SweepDecision {
    match ArtifactState::classify(now, expires_at) {
        ArtifactState::Expired => SweepDecision::DeleteExpired,
        ArtifactState::Fresh => SweepDecision::Keep(ArtifactState::Fresh),
        ArtifactState::Unknown => {
            let Some(max_age) = orphan_max_age.and_then(|d| chrono::Duration::from_std(d).ok()) else {
                return SweepDecision::Keep(ArtifactState::Unknown);
            };
            let older = |t: DateTime<Utc>| now - t > max_age;
            if older(created_at) && modified_at.map_or(true, older) {
                SweepDecision::DeleteOrphan
            } else {
                SweepDecision::Keep(ArtifactState::Unknown)
            }
        }
    }
}

/// Counters for one sweep run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Directory entries seen
    pub scanned: usize,
    /// Entries following the artifact naming convention
    pub matched: usize,
    pub deleted_expired: usize,
    pub deleted_orphans: usize,
    pub fresh: usize,
    /// Kept because the expiry could not be recovered
    pub unknown: usize,
    /// Already removed by someone else
    pub vanished: usize,
    /// Probe or delete failures
    pub errors: usize,
}

impl SweepReport {
    pub fn deleted(&self) -> usize {
        self.deleted_expired + self.deleted_orphans
    }
}

/// Deletes expired artifacts from the output directory.
pub struct ExpirySweeper {
    reader: ArtifactReader,
    probe: Arc<dyn ExpiryProbe>,
    config: SweepConfig,
}

impl ExpirySweeper {
    pub fn new(output: &OutputDir, probe: Arc<dyn ExpiryProbe>, config: SweepConfig) -> Self {
        Self {
            reader: output.reader(),
            probe,
            config,
        }
    }

    pub fn config(&self) -> &SweepConfig {
        &self.config
    }

    /// Run one sweep now, logging and recording the outcome. Never fails.
    pub async fn run_once(&self) -> Option<SweepReport> {
        match self.sweep_at(Utc::now()).await {
            Ok(report) => {
                if report.deleted() > 0 || report.errors > 0 {
                    info!(
                        scanned = report.scanned,
                        matched = report.matched,
                        deleted_expired = report.deleted_expired,
                        deleted_orphans = report.deleted_orphans,
                        fresh = report.fresh,
                        unknown = report.unknown,
                        errors = report.errors,
                        "Sweep run complete"
                    );
                } else {
                    debug!(scanned = report.scanned, matched = report.matched, "Sweep run complete, nothing to delete");
                }
                record_sweep(true, report.deleted() as u64, report.errors as u64);
                Some(report)
            }
            Err(e) => {
                warn!(dir = %self.reader.root().display(), "Skipping sweep run, cannot list output directory: {}", e);
                record_sweep(false, 0, 1);
                None
            }
        }
    }

    /// Run one sweep as of `now`. Fails only when the directory cannot be listed.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> MediaResult<SweepReport> {
        let listing = self.reader.list().await?;
        let mut report = SweepReport {
            scanned: listing.scanned,
            matched: listing.artifacts.len(),
            ..SweepReport::default()
        };

        for entry in &listing.artifacts {
            self.sweep_entry(entry, now, &mut report).await;
        }

        Ok(report)
    }

    async fn sweep_entry(&self, entry: &ArtifactEntry, now: DateTime<Utc>, report: &mut SweepReport) {
        let file = entry.name.file_name();

        let expires_at = match self.probe.read_expiry(&entry.path).await {
            Ok(expires_at) => {
                if expires_at.is_none() {
                    debug!(file = %file, "No expiry tag");
                }
                expires_at
            }
            Err(MediaError::FileNotFound(_)) => {
                report.vanished += 1;
                debug!(file = %file, "File already gone");
                return;
            }
            Err(e) => {
                warn!(file = %file, "Failed to read expiry, keeping file: {}", e);
                report.errors += 1;
                None
            }
        };

        let modified_at = entry.modified.map(DateTime::<Utc>::from);
        let decision = decide(
            now,
            expires_at,
            entry.name.created_at,
            modified_at,
            self.config.orphan_max_age,
        );

        match decision {
            SweepDecision::Keep(ArtifactState::Unknown) => report.unknown += 1,
            SweepDecision::Keep(_) => report.fresh += 1,
            SweepDecision::DeleteExpired | SweepDecision::DeleteOrphan => {
                match self.reader.remove(entry).await {
                    Ok(RemoveOutcome::Removed) => {
                        if decision == SweepDecision::DeleteExpired {
                            report.deleted_expired += 1;
                            info!(file = %file, expires_at = ?expires_at, "Deleted expired video");
                        } else {
                            report.deleted_orphans += 1;
                            info!(file = %file, created_at = %entry.name.created_at, "Deleted video with unreadable expiry past maximum age");
                        }
                    }
                    Ok(RemoveOutcome::AlreadyGone) => {
                        report.vanished += 1;
                        debug!(file = %file, "File already gone");
                    }
                    Err(e) => {
                        report.errors += 1;
                        warn!(file = %file, "Failed to delete expired video: {}", e);
                    }
                }
            }
        }
    }
}
