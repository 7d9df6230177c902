//! Age-based housekeeping
//!
//! Deletes stored images whose timestamp-derived filename is older than
//! a cutoff. Independent of all live state; safe to run while the
//! collector is serving.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::collect::storage::TIME_FORMAT;
use crate::error::{Error, Result};

/// Outcome of one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    /// Directory entries with a parseable timestamp name
    pub examined: usize,
    /// Files deleted
    pub removed: usize,
}

/// Delete images older than `older_than`
///
/// Files whose names do not parse as a stored-image timestamp are
/// skipped. Per-file removal errors are logged and do not abort the
/// sweep.
pub async fn sweep(dir: &Path, older_than: Duration) -> Result<SweepStats> {
    let older_than = chrono::Duration::from_std(older_than)
        .map_err(|e| Error::Storage(format!("cutoff out of range: {}", e)))?;
    let cutoff = Utc::now() - older_than;

    sweep_before(dir, cutoff).await
}

/// Delete images captured before `cutoff`
pub async fn sweep_before(dir: &Path, cutoff: DateTime<Utc>) -> Result<SweepStats> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut stats = SweepStats::default();

    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let name = match name.to_str() {
            Some(name) => name,
            None => continue,
        };
        let stem = match name.rsplit_once('.') {
            Some((stem, _ext)) => stem,
            None => continue,
        };

        let timestamp = match NaiveDateTime::parse_from_str(stem, TIME_FORMAT) {
            Ok(ts) => ts.and_utc(),
            Err(_) => {
                tracing::debug!(file = %name, "file name is not a stored-image timestamp");
                continue;
            }
        };
        stats.examined += 1;

        if timestamp < cutoff {
            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => {
                    stats.removed += 1;
                    tracing::info!(file = %name, "file removed");
                }
                Err(e) => {
                    tracing::error!(file = %name, error = %e, "failed to remove file");
                }
            }
        }
    }

    tracing::info!(
        dir = %dir.display(),
        examined = stats.examined,
        removed = stats.removed,
        "sweep complete"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(millis: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(millis).unwrap()
    }

    fn image_name(timestamp: DateTime<Utc>) -> String {
        format!("{}.jpg", timestamp.format(TIME_FORMAT))
    }

    #[tokio::test]
    async fn test_sweep_removes_only_old_images() {
        let dir = tempfile::tempdir().unwrap();
        let old = image_name(ts(1_000_000));
        let new = image_name(ts(2_000_000));
        std::fs::write(dir.path().join(&old), b"old").unwrap();
        std::fs::write(dir.path().join(&new), b"new").unwrap();
        // Not a stored image; must survive no matter how old.
        std::fs::write(dir.path().join("notes.txt"), b"keep").unwrap();

        let stats = sweep_before(dir.path(), ts(1_500_000)).await.unwrap();

        assert_eq!(stats, SweepStats { examined: 2, removed: 1 });
        assert!(!dir.path().join(&old).exists());
        assert!(dir.path().join(&new).exists());
        assert!(dir.path().join("notes.txt").exists());
    }

    #[tokio::test]
    async fn test_sweep_of_empty_directory() {
        let dir = tempfile::tempdir().unwrap();

        let stats = sweep_before(dir.path(), Utc::now()).await.unwrap();

        assert_eq!(stats, SweepStats::default());
    }
}
