//! Per-request work areas.
//!
//! Each request gets an isolated scratch directory keyed by requester
//! identity and run id, so concurrent requests never collide on files.
//! Cleanup removes every intermediate file but can keep the final output
//! artifact until it is explicitly discarded.

use std::path::{Path, PathBuf};

use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{StageError, StageResult};

/// Handle to one request's scratch directory.
#[derive(Debug, Clone)]
pub struct WorkArea {
    dir: PathBuf,
}

impl WorkArea {
    /// Allocate the directory `<root>/<requester>/<run_id>`.
    pub async fn allocate(root: &Path, requester: &str, run_id: Uuid) -> StageResult<Self> {
        let dir = root.join(requester).join(run_id.to_string());
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StageError::assembly("workdir", e.to_string()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path for a named file inside the work area.
    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Remove every regular file in the work area except `keep`.
    ///
    /// Runs on every exit path, success or failure; errors are logged and
    /// swallowed because cleanup must never mask the run's outcome.
    pub async fn cleanup(&self, keep: Option<&Path>) {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %self.dir.display(), error = %e, "Cleanup: cannot read work area");
                return;
            }
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if let Some(keep_path) = keep {
                if path == keep_path {
                    continue;
                }
            }
            if path.is_file() {
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    warn!(path = %path.display(), error = %e, "Cleanup: failed to remove file");
                }
            }
        }

        info!(dir = %self.dir.display(), "Work area cleaned");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_allocate_is_keyed_by_requester_and_run() {
        let root = TempDir::new().unwrap();
        let run_id = Uuid::new_v4();
        let area = WorkArea::allocate(root.path(), "user-7", run_id)
            .await
            .unwrap();

        assert!(area.dir().exists());
        assert!(area.dir().ends_with(format!("user-7/{}", run_id)));
    }

    #[tokio::test]
    async fn test_cleanup_keeps_only_the_output() {
        let root = TempDir::new().unwrap();
        let area = WorkArea::allocate(root.path(), "user-7", Uuid::new_v4())
            .await
            .unwrap();

        let clip = area.file("raw_00.mp4");
        let trim = area.file("trim_00.mp4");
        let output = area.file("final.mp4");
        for p in [&clip, &trim, &output] {
            tokio::fs::write(p, b"x").await.unwrap();
        }

        area.cleanup(Some(&output)).await;

        assert!(!clip.exists());
        assert!(!trim.exists());
        assert!(output.exists());
    }

    #[tokio::test]
    async fn test_cleanup_without_keep_removes_everything() {
        let root = TempDir::new().unwrap();
        let area = WorkArea::allocate(root.path(), "user-8", Uuid::new_v4())
            .await
            .unwrap();

        tokio::fs::write(area.file("a.mp4"), b"x").await.unwrap();
        tokio::fs::write(area.file("b.mp3"), b"x").await.unwrap();

        area.cleanup(None).await;

        assert!(!area.file("a.mp4").exists());
        assert!(!area.file("b.mp3").exists());
    }
}
