//! Delivery of finished videos back to the requester.
//!
//! Transports cap inline uploads, so a finished file is classified against
//! the configured ceiling before it is handed to a sink: at or under the
//! ceiling it travels inline, above it the sink receives a path reference
//! and the file stays in the work area.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::info;

use crate::error::{StageError, StageResult};

/// How a finished video reaches the requester.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryPayload {
    /// Small enough for the transport; the sink sends the file itself.
    Inline { path: PathBuf, size: u64 },
    /// Over the ceiling; the sink reports where the file can be fetched.
    Reference { path: PathBuf, size: u64 },
}

impl DeliveryPayload {
    /// Classify a finished file against the inline ceiling in bytes.
    pub fn classify(path: &Path, ceiling: u64) -> StageResult<Self> {
        let size = std::fs::metadata(path)
            .map_err(|e| {
                StageError::delivery(format!("cannot stat {}: {}", path.display(), e))
            })?
            .len();

        if size <= ceiling {
            Ok(Self::Inline {
                path: path.to_path_buf(),
                size,
            })
        } else {
            Ok(Self::Reference {
                path: path.to_path_buf(),
                size,
            })
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            Self::Inline { path, .. } | Self::Reference { path, .. } => path,
        }
    }

    pub fn size(&self) -> u64 {
        match self {
            Self::Inline { size, .. } | Self::Reference { size, .. } => *size,
        }
    }
}

/// Terminal delivery transport.
#[async_trait]
pub trait DeliverySink: Send + Sync {
    /// Hand a finished video to the requester. Returns the location the
    /// requester will find it at.
    async fn deliver(&self, requester: &str, payload: &DeliveryPayload) -> StageResult<PathBuf>;
}

/// Filesystem sink: inline payloads are copied into an output directory,
/// references stay where they are and only the path is reported.
pub struct FileDelivery {
    out_dir: PathBuf,
}

impl FileDelivery {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
        }
    }
}

#[async_trait]
impl DeliverySink for FileDelivery {
    async fn deliver(&self, requester: &str, payload: &DeliveryPayload) -> StageResult<PathBuf> {
        match payload {
            DeliveryPayload::Inline { path, size } => {
                tokio::fs::create_dir_all(&self.out_dir)
                    .await
                    .map_err(|e| StageError::delivery(e.to_string()))?;

                let file_name = path
                    .file_name()
                    .ok_or_else(|| StageError::delivery("output has no file name"))?;
                let dest = self.out_dir.join(file_name);

                tokio::fs::copy(path, &dest)
                    .await
                    .map_err(|e| StageError::delivery(e.to_string()))?;

                info!(requester, bytes = size, dest = %dest.display(), "Delivered video");
                Ok(dest)
            }
            DeliveryPayload::Reference { path, size } => {
                info!(
                    requester,
                    bytes = size,
                    path = %path.display(),
                    "Video over inline ceiling, delivered as reference"
                );
                Ok(path.clone())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_file(dir: &Path, name: &str, len: usize) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, vec![0u8; len]).unwrap();
        path
    }

    #[test]
    fn test_classify_against_ceiling() {
        let temp = TempDir::new().unwrap();
        let small = write_file(temp.path(), "small.mp4", 100);
        let large = write_file(temp.path(), "large.mp4", 1000);

        assert!(matches!(
            DeliveryPayload::classify(&small, 500).unwrap(),
            DeliveryPayload::Inline { size: 100, .. }
        ));
        assert!(matches!(
            DeliveryPayload::classify(&large, 500).unwrap(),
            DeliveryPayload::Reference { size: 1000, .. }
        ));
        // Exactly at the ceiling still goes inline
        assert!(matches!(
            DeliveryPayload::classify(&large, 1000).unwrap(),
            DeliveryPayload::Inline { .. }
        ));
    }

    #[test]
    fn test_classify_missing_file() {
        let err = DeliveryPayload::classify(Path::new("/nonexistent/final.mp4"), 500).unwrap_err();
        assert!(matches!(err, StageError::Delivery { .. }));
    }

    #[tokio::test]
    async fn test_inline_is_copied_to_out_dir() {
        let temp = TempDir::new().unwrap();
        let src = write_file(temp.path(), "final.mp4", 64);
        let out_dir = temp.path().join("out");

        let sink = FileDelivery::new(&out_dir);
        let payload = DeliveryPayload::classify(&src, 1024).unwrap();
        let dest = sink.deliver("alice", &payload).await.unwrap();

        assert_eq!(dest, out_dir.join("final.mp4"));
        assert_eq!(std::fs::metadata(&dest).unwrap().len(), 64);
    }

    #[tokio::test]
    async fn test_reference_stays_in_place() {
        let temp = TempDir::new().unwrap();
        let src = write_file(temp.path(), "final.mp4", 2048);
        let out_dir = temp.path().join("out");

        let sink = FileDelivery::new(&out_dir);
        let payload = DeliveryPayload::classify(&src, 1024).unwrap();
        let dest = sink.deliver("alice", &payload).await.unwrap();

        assert_eq!(dest, src);
        assert!(!out_dir.exists());
    }
}
