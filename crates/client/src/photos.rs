//! Photo capture pipeline.
//!
//! Converts user-selected images into two representations: a durable base64
//! payload (queued and eventually transmitted) and an ephemeral preview
//! handle (display only, never persisted). Preview handles are scoped
//! resources: each one is registered on creation and must be revoked on every
//! exit path (removal, reset, or any terminal submission outcome).

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use thiserror::Error;
use uuid::Uuid;

/// Maximum number of photos attached to one trip.
pub const MAX_PHOTOS: usize = 6;

#[derive(Debug, Error)]
pub enum CaptureError {
    /// A selected file could not be read; the whole batch is rejected before
    /// any queue or network interaction.
    #[error("failed to read photo '{name}': {source}")]
    Unreadable {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// Registry of outstanding preview handles.
///
/// Counts creations and revocations so a leak is observable: after a removal
/// or a form reset, `outstanding()` must be zero for that batch.
#[derive(Debug, Default)]
pub struct PreviewRegistry {
    created: AtomicUsize,
    revoked: AtomicUsize,
}

impl PreviewRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn acquire(self: &Arc<Self>) -> PreviewHandle {
        self.created.fetch_add(1, Ordering::Relaxed);
        PreviewHandle {
            id: Uuid::now_v7(),
            registry: Arc::clone(self),
            revoked: false,
        }
    }

    fn on_revoke(&self) {
        self.revoked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }

    pub fn revoked(&self) -> usize {
        self.revoked.load(Ordering::Relaxed)
    }

    pub fn outstanding(&self) -> usize {
        self.created() - self.revoked()
    }
}

/// Revocable handle to a client-only preview resource.
///
/// Revoked explicitly via [`PreviewHandle::release`], or on drop as a
/// backstop so no exit path can leak it.
#[derive(Debug)]
pub struct PreviewHandle {
    id: Uuid,
    registry: Arc<PreviewRegistry>,
    revoked: bool,
}

impl PreviewHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Revoke the preview resource.
    pub fn release(mut self) {
        self.revoke();
    }

    fn revoke(&mut self) {
        if !self.revoked {
            self.revoked = true;
            self.registry.on_revoke();
            tracing::trace!(preview_id = %self.id, "preview handle revoked");
        }
    }
}

impl Drop for PreviewHandle {
    fn drop(&mut self) {
        self.revoke();
    }
}

/// A user-selected file, not yet read.
#[derive(Debug, Clone)]
pub struct PhotoCandidate {
    pub name: String,
    pub mime_type: String,
    pub path: PathBuf,
}

/// A converted photo: durable payload plus its ephemeral preview.
#[derive(Debug)]
pub struct CapturedPhoto {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub size: u64,
    pub base64: String,
    pub preview: PreviewHandle,
}

/// Result of capturing a batch.
#[derive(Debug)]
pub struct CapturedBatch {
    pub photos: Vec<CapturedPhoto>,
    /// Candidates silently dropped because the batch exceeded the remaining
    /// capacity. Non-zero means the caller should warn the user.
    pub dropped: usize,
}

impl CapturedBatch {
    /// Revoke every preview in the batch. Called on every terminal
    /// submission outcome and on form reset.
    pub fn release_previews(self) {
        for photo in self.photos {
            photo.preview.release();
        }
    }
}

/// Converts selected images into durable and ephemeral representations.
#[derive(Debug, Clone)]
pub struct PhotoPipeline {
    max_photos: usize,
    registry: Arc<PreviewRegistry>,
}

impl PhotoPipeline {
    pub fn new() -> Self {
        Self::with_limit(MAX_PHOTOS)
    }

    pub fn with_limit(max_photos: usize) -> Self {
        Self {
            max_photos,
            registry: PreviewRegistry::new(),
        }
    }

    pub fn registry(&self) -> &Arc<PreviewRegistry> {
        &self.registry
    }

    /// Capture a batch of selected files.
    ///
    /// Only the remaining capacity (`max_photos - already_attached`) is
    /// accepted; the excess is dropped and reported, never queued for later.
    /// A single unreadable file rejects the whole batch; previews created
    /// for earlier files in the batch are revoked on that path.
    pub async fn capture(
        &self,
        already_attached: usize,
        candidates: Vec<PhotoCandidate>,
    ) -> Result<CapturedBatch, CaptureError> {
        let remaining = self.max_photos.saturating_sub(already_attached);
        let dropped = candidates.len().saturating_sub(remaining);
        if dropped > 0 {
            tracing::warn!(
                dropped,
                limit = self.max_photos,
                "photo batch exceeds remaining capacity"
            );
        }

        let mut photos = Vec::with_capacity(remaining.min(candidates.len()));
        for candidate in candidates.into_iter().take(remaining) {
            // Dropping `photos` on the error path revokes every preview
            // already acquired for this batch.
            let bytes = tokio::fs::read(&candidate.path).await.map_err(|source| {
                CaptureError::Unreadable {
                    name: candidate.name.clone(),
                    source,
                }
            })?;

            photos.push(CapturedPhoto {
                id: Uuid::now_v7().to_string(),
                name: candidate.name,
                mime_type: candidate.mime_type,
                size: bytes.len() as u64,
                base64: BASE64.encode(&bytes),
                preview: self.registry.acquire(),
            });
        }

        Ok(CapturedBatch { photos, dropped })
    }
}

impl Default for PhotoPipeline {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn write_photo(dir: &tempfile::TempDir, name: &str, bytes: &[u8]) -> PhotoCandidate {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(bytes).unwrap();
        PhotoCandidate {
            name: name.to_string(),
            mime_type: "image/jpeg".to_string(),
            path,
        }
    }

    #[tokio::test]
    async fn capture_converts_to_base64_and_acquires_previews() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = PhotoPipeline::new();
        let batch = pipeline
            .capture(0, vec![write_photo(&dir, "a.jpg", b"front view")])
            .await
            .unwrap();

        assert_eq!(batch.photos.len(), 1);
        assert_eq!(batch.dropped, 0);
        assert_eq!(batch.photos[0].size, 10);
        assert_eq!(batch.photos[0].base64, BASE64.encode(b"front view"));
        assert_eq!(pipeline.registry().outstanding(), 1);
    }

    #[tokio::test]
    async fn capacity_is_never_exceeded() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = PhotoPipeline::with_limit(3);
        let candidates = (0..5)
            .map(|i| write_photo(&dir, &format!("p{i}.jpg"), b"x"))
            .collect();

        let batch = pipeline.capture(1, candidates).await.unwrap();
        assert_eq!(batch.photos.len(), 2);
        assert_eq!(batch.dropped, 3);
    }

    #[tokio::test]
    async fn full_batch_is_dropped_at_capacity() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = PhotoPipeline::with_limit(2);
        let batch = pipeline
            .capture(2, vec![write_photo(&dir, "late.jpg", b"x")])
            .await
            .unwrap();
        assert!(batch.photos.is_empty());
        assert_eq!(batch.dropped, 1);
        assert_eq!(pipeline.registry().outstanding(), 0);
    }

    #[tokio::test]
    async fn unreadable_file_rejects_whole_batch_and_revokes_previews() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = PhotoPipeline::new();
        let good = write_photo(&dir, "ok.jpg", b"fine");
        let missing = PhotoCandidate {
            name: "gone.jpg".to_string(),
            mime_type: "image/jpeg".to_string(),
            path: dir.path().join("does-not-exist.jpg"),
        };

        let err = pipeline.capture(0, vec![good, missing]).await.unwrap_err();
        assert!(matches!(err, CaptureError::Unreadable { ref name, .. } if name == "gone.jpg"));
        assert_eq!(pipeline.registry().outstanding(), 0);
    }

    #[tokio::test]
    async fn release_previews_revokes_every_handle() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = PhotoPipeline::new();
        let candidates = (0..3)
            .map(|i| write_photo(&dir, &format!("p{i}.jpg"), b"x"))
            .collect();
        let batch = pipeline.capture(0, candidates).await.unwrap();
        assert_eq!(pipeline.registry().outstanding(), 3);

        batch.release_previews();
        assert_eq!(pipeline.registry().created(), 3);
        assert_eq!(pipeline.registry().revoked(), 3);
        assert_eq!(pipeline.registry().outstanding(), 0);
    }

    #[tokio::test]
    async fn dropping_a_photo_revokes_its_preview() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = PhotoPipeline::new();
        let mut batch = pipeline
            .capture(0, vec![write_photo(&dir, "a.jpg", b"x"), write_photo(&dir, "b.jpg", b"y")])
            .await
            .unwrap();

        // user removes one photo from the form
        batch.photos.remove(0);
        assert_eq!(pipeline.registry().revoked(), 1);
        assert_eq!(pipeline.registry().outstanding(), 1);
    }
}
