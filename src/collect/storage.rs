//! Image persistence
//!
//! The storage collaborator turns a decoded image into a retrievable
//! reference. The filesystem implementation derives the filename from
//! the capture timestamp and the reference from a configured public
//! base URL.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::protocol::FeedEvent;

use super::codec::DecodedImage;

/// Timestamp layout used for stored filenames
pub const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

/// Announcement describing one newly stored image
///
/// This is the payload the collector publishes to its broker: small,
/// immutable, cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    /// Externally fetchable reference to the stored file
    pub url: String,
    /// Capture time
    pub timestamp: DateTime<Utc>,
    /// Caller-supplied identifier
    pub id: String,
}

impl From<StoredImage> for FeedEvent {
    fn from(image: StoredImage) -> Self {
        FeedEvent {
            image_url: image.url,
            timestamp: image.timestamp,
            id: image.id,
        }
    }
}

/// Persists decoded images and hands back a retrievable reference
#[async_trait]
pub trait ImageStore: Send + Sync {
    async fn persist(&self, image: &DecodedImage, timestamp: DateTime<Utc>) -> Result<String>;
}

/// Filesystem store
///
/// Writes `<dir>/<timestamp>.<ext>` and returns
/// `<public_base>/<timestamp>.<ext>`.
#[derive(Debug, Clone)]
pub struct FsImageStore {
    dir: PathBuf,
    public_base: String,
}

impl FsImageStore {
    pub fn new(dir: impl Into<PathBuf>, public_base: impl Into<String>) -> Self {
        let public_base = public_base.into();
        Self {
            dir: dir.into(),
            public_base: public_base.trim_end_matches('/').to_string(),
        }
    }

    /// Filename for an image captured at `timestamp`
    pub fn filename(timestamp: DateTime<Utc>, extension: &str) -> String {
        format!("{}.{}", timestamp.format(TIME_FORMAT), extension)
    }
}

#[async_trait]
impl ImageStore for FsImageStore {
    async fn persist(&self, image: &DecodedImage, timestamp: DateTime<Utc>) -> Result<String> {
        let filename = Self::filename(timestamp, image.extension);
        let path = self.dir.join(&filename);

        tokio::fs::write(&path, &image.data)
            .await
            .map_err(|e| Error::Storage(format!("write {}: {}", path.display(), e)))?;

        tracing::debug!(path = %path.display(), bytes = image.data.len(), "image written");
        Ok(format!("{}/{}", self.public_base, filename))
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    fn ts() -> DateTime<Utc> {
        DateTime::from_timestamp_millis(1_700_000_000_123).unwrap()
    }

    #[test]
    fn test_filename_format() {
        assert_eq!(
            FsImageStore::filename(ts(), "jpg"),
            "2023-11-14T22:13:20.123.jpg"
        );
    }

    #[tokio::test]
    async fn test_persist_writes_file_and_derives_url() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsImageStore::new(dir.path(), "http://localhost:8000/image/");

        let image = DecodedImage {
            data: Bytes::from_static(b"payload"),
            extension: "jpg",
        };
        let url = store.persist(&image, ts()).await.unwrap();

        assert_eq!(
            url,
            "http://localhost:8000/image/2023-11-14T22:13:20.123.jpg"
        );
        let on_disk = std::fs::read(dir.path().join("2023-11-14T22:13:20.123.jpg")).unwrap();
        assert_eq!(on_disk, b"payload");
    }

    #[tokio::test]
    async fn test_persist_into_missing_directory_is_storage_error() {
        let store = FsImageStore::new("/nonexistent/lookout-test", "http://x/image");

        let image = DecodedImage {
            data: Bytes::from_static(b"payload"),
            extension: "jpg",
        };
        let err = store.persist(&image, ts()).await.unwrap_err();

        assert!(matches!(err, Error::Storage(_)));
    }
}
