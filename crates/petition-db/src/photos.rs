use anyhow::{Result, bail};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::fs;
use tracing::{info, warn};
use uuid::Uuid;

use petition_types::models::ImageType;

use crate::Database;

/// Minimum age before an unreferenced blob may be swept.
pub const SWEEP_GRACE: Duration = Duration::from_secs(10 * 60);

/// On-disk photo blobs.
///
/// Each photo is a flat file at `{dir}/{uuid}.{ext}`; the extension records
/// the MIME type, so no metadata is kept alongside the bytes.
pub struct PhotoStore {
    dir: PathBuf,
}

impl PhotoStore {
    pub async fn new(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir).await?;
        info!("Photo storage directory: {}", dir.display());
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes a new blob and returns its generated filename.
    pub async fn store(&self, image: &[u8], image_type: ImageType) -> Result<String> {
        let filename = format!("{}.{}", Uuid::new_v4(), image_type.extension());
        fs::write(self.dir.join(&filename), image).await?;
        Ok(filename)
    }

    /// Reads a blob; `None` if it does not exist.
    pub async fn retrieve(&self, filename: &str) -> Result<Option<(Vec<u8>, ImageType)>> {
        let image_type = image_type_of(filename)?;
        match fs::read(self.dir.join(filename)).await {
            Ok(bytes) => Ok(Some((bytes, image_type))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Photo {} is referenced but missing from storage", filename);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Removes a blob; an already-missing file is not an error.
    pub async fn delete(&self, filename: &str) -> Result<()> {
        image_type_of(filename)?;
        match fs::remove_file(self.dir.join(filename)).await {
            Ok(()) => {
                info!("Deleted photo {}", filename);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Photo {} already gone", filename);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Filenames of blobs last modified more than `grace` ago.
    async fn list_older_than(&self, grace: Duration) -> Result<Vec<String>> {
        let cutoff = SystemTime::now() - grace;
        let mut entries = fs::read_dir(&self.dir).await?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let modified = entry.metadata().await?.modified()?;
            if modified > cutoff {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }
}

/// Rejects anything that is not a bare `{name}.{jpg|png|gif}` so a stored
/// filename can never address a path outside the photo directory.
fn image_type_of(filename: &str) -> Result<ImageType> {
    let bare = Path::new(filename).file_name().and_then(|n| n.to_str()) == Some(filename);
    let image_type = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(ImageType::from_extension);

    match image_type {
        Some(image_type) if bare => Ok(image_type),
        _ => bail!("Invalid photo filename: {}", filename),
    }
}

/// Deletes blobs that no user or petition references any more.
///
/// Blobs younger than `grace` are left alone: an upload writes the blob
/// before the row points at it.
pub async fn sweep_orphans(
    db: &Arc<Database>,
    store: &PhotoStore,
    grace: Duration,
) -> Result<usize> {
    let candidates = store.list_older_than(grace).await?;
    if candidates.is_empty() {
        return Ok(0);
    }

    let db = db.clone();
    let referenced =
        tokio::task::spawn_blocking(move || db.referenced_photo_filenames()).await??;
    let mut removed = 0;
    for name in candidates.iter().filter(|name| !referenced.contains(*name)) {
        match store.delete(name).await {
            Ok(()) => removed += 1,
            Err(e) => warn!("Sweep could not delete {}: {}", name, e),
        }
    }
    Ok(removed)
}

/// Background task that reclaims orphaned photo blobs on an interval.
pub async fn run_sweep_loop(
    db: Arc<Database>,
    store: Arc<PhotoStore>,
    interval_secs: u64,
    grace: Duration,
) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;

        match sweep_orphans(&db, &store, grace).await {
            Ok(count) => {
                if count > 0 {
                    info!("Sweep: removed {} orphaned photos", count);
                }
            }
            Err(e) => {
                warn!("Sweep error: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{add_user, open_temp};

    async fn temp_store() -> (tempfile::TempDir, PhotoStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = PhotoStore::new(dir.path().join("photos")).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn store_retrieve_delete() {
        let (_dir, store) = temp_store().await;

        let name = store.store(b"\x89PNG fake", ImageType::Png).await.unwrap();
        assert!(name.ends_with(".png"));

        let (bytes, ty) = store.retrieve(&name).await.unwrap().unwrap();
        assert_eq!(bytes, b"\x89PNG fake");
        assert_eq!(ty, ImageType::Png);

        store.delete(&name).await.unwrap();
        assert!(store.retrieve(&name).await.unwrap().is_none());
        // deleting twice is fine
        store.delete(&name).await.unwrap();
    }

    #[tokio::test]
    async fn rejects_path_like_filenames() {
        let (_dir, store) = temp_store().await;
        assert!(store.retrieve("../secret.png").await.is_err());
        assert!(store.retrieve("notes.txt").await.is_err());
        assert!(store.delete("/etc/passwd").await.is_err());
    }

    #[tokio::test]
    async fn sweep_removes_only_unreferenced_blobs() {
        let (_tmp, db) = open_temp();
        let db = Arc::new(db);
        let (_dir, store) = temp_store().await;
        let user = add_user(&db, "Alice");

        let kept = store.store(b"kept", ImageType::Jpeg).await.unwrap();
        let orphan = store.store(b"orphan", ImageType::Gif).await.unwrap();
        db.set_user_photo_filename(user, Some(&kept)).unwrap();

        let removed = sweep_orphans(&db, &store, Duration::ZERO).await.unwrap();
        assert_eq!(removed, 1);
        assert!(store.retrieve(&kept).await.unwrap().is_some());
        assert!(store.retrieve(&orphan).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn sweep_respects_grace_period() {
        let (_tmp, db) = open_temp();
        let db = Arc::new(db);
        let (_dir, store) = temp_store().await;
        let fresh = store.store(b"fresh", ImageType::Png).await.unwrap();

        let removed = sweep_orphans(&db, &store, Duration::from_secs(600)).await.unwrap();
        assert_eq!(removed, 0);
        assert!(store.retrieve(&fresh).await.unwrap().is_some());
    }
}
