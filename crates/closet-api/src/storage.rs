use std::path::{Path, PathBuf};

use anyhow::Context;
use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::ApiError;

const MAX_EXTENSION_LEN: usize = 10;

/// Flat blob directory for uploaded images.
///
/// Every file lives at `{dir}/{32 hex chars}[.{ext}]`. Names are generated
/// here and never taken from the client, so a name that does not match
/// that shape is rejected before touching the filesystem.
pub struct FileStore {
    dir: PathBuf,
    public_url: String,
    max_size: usize,
}

impl FileStore {
    pub async fn new(dir: PathBuf, public_url: &str, max_size: usize) -> anyhow::Result<Self> {
        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("creating upload directory {}", dir.display()))?;
        info!("File storage directory: {}", dir.display());

        Ok(Self {
            dir,
            public_url: public_url.trim_end_matches('/').to_string(),
            max_size,
        })
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Write `data` under a fresh name and return that name.
    pub async fn store(&self, data: &[u8], original_name: Option<&str>) -> Result<String, ApiError> {
        if data.len() > self.max_size {
            return Err(ApiError::PayloadTooLarge(format!(
                "file exceeds {} bytes",
                self.max_size
            )));
        }

        let name = match original_name.and_then(sanitize_extension) {
            Some(ext) => format!("{}.{}", Uuid::new_v4().simple(), ext),
            None => Uuid::new_v4().simple().to_string(),
        };

        let path = self.dir.join(&name);
        fs::write(&path, data)
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        debug!("Stored {} ({} bytes)", name, data.len());

        Ok(name)
    }

    pub fn url_for(&self, name: &str) -> String {
        format!("{}/files/{}", self.public_url, name)
    }

    pub async fn retrieve(&self, name: &str) -> Result<Vec<u8>, ApiError> {
        let path = self.path_for(name)?;
        match fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ApiError::not_found("File not found"))
            }
            Err(e) => Err(anyhow::Error::new(e)
                .context(format!("reading {}", path.display()))
                .into()),
        }
    }

    /// Delete a stored file. A file that is already gone is not an error.
    pub async fn remove(&self, name: &str) -> Result<(), ApiError> {
        let path = self.path_for(name)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Removed {}", name);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("File {} already gone", name);
                Ok(())
            }
            Err(e) => Err(anyhow::Error::new(e)
                .context(format!("removing {}", path.display()))
                .into()),
        }
    }

    fn path_for(&self, name: &str) -> Result<PathBuf, ApiError> {
        if !is_valid_name(name) {
            return Err(ApiError::validation("invalid file name"));
        }
        let path = self.dir.join(name);
        if path.parent() != Some(self.dir.as_path()) {
            return Err(ApiError::validation("invalid file name"));
        }
        Ok(path)
    }
}

/// Lower-cased extension of `original_name`, if it is short and plain
/// ASCII alphanumeric.
fn sanitize_extension(original_name: &str) -> Option<String> {
    let ext = Path::new(original_name).extension()?.to_str()?;
    if ext.is_empty()
        || ext.len() > MAX_EXTENSION_LEN
        || !ext.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Matches only names produced by [`FileStore::store`].
pub fn is_valid_name(name: &str) -> bool {
    let (stem, ext) = match name.split_once('.') {
        Some((stem, ext)) => (stem, Some(ext)),
        None => (name, None),
    };

    let stem_ok = stem.len() == 32
        && stem
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c));
    let ext_ok = ext.is_none_or(|ext| {
        !ext.is_empty()
            && ext.len() <= MAX_EXTENSION_LEN
            && ext
                .chars()
                .all(|c| c.is_ascii_digit() || c.is_ascii_lowercase())
    });

    stem_ok && ext_ok
}

pub fn content_type_for(name: &str) -> &'static str {
    let ext = name.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("");
    match ext {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "svg" => "image/svg+xml",
        "heic" => "image/heic",
        "avif" => "image/avif",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store_in(dir: &tempfile::TempDir, max_size: usize) -> FileStore {
        FileStore::new(dir.path().join("uploads"), "http://localhost:8080/", max_size)
            .await
            .unwrap()
    }

    #[test]
    fn extension_sanitizing() {
        assert_eq!(sanitize_extension("cat.PNG").as_deref(), Some("png"));
        assert_eq!(sanitize_extension("archive.tar.gz").as_deref(), Some("gz"));
        assert_eq!(sanitize_extension("noext"), None);
        assert_eq!(sanitize_extension("weird.p/g"), None);
        assert_eq!(sanitize_extension("long.abcdefghijk"), None);
        assert_eq!(sanitize_extension("dots.ph-p"), None);
    }

    #[test]
    fn name_validation() {
        let good = Uuid::new_v4().simple().to_string();
        assert!(is_valid_name(&good));
        assert!(is_valid_name(&format!("{}.jpg", good)));
        assert!(!is_valid_name(&format!("{}.JPG", good)));
        assert!(!is_valid_name(&format!("{}.", good)));
        assert!(!is_valid_name(&format!("{}.tar.gz", good)));
        assert!(!is_valid_name("../etc/passwd"));
        assert!(!is_valid_name(".."));
        assert!(!is_valid_name(&format!("..%2f{}", good)));
        assert!(!is_valid_name(""));
    }

    #[test]
    fn content_types() {
        assert_eq!(content_type_for("abc.png"), "image/png");
        assert_eq!(content_type_for("abc.jpeg"), "image/jpeg");
        assert_eq!(content_type_for("abc"), "application/octet-stream");
    }

    #[tokio::test]
    async fn store_and_retrieve() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir, 1024).await;

        let name = store.store(b"\x89PNG", Some("photo.Png")).await.unwrap();
        assert!(is_valid_name(&name));
        assert!(name.ends_with(".png"));
        assert_eq!(
            store.url_for(&name),
            format!("http://localhost:8080/files/{}", name)
        );
        assert_eq!(store.retrieve(&name).await.unwrap(), b"\x89PNG");
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir, 1024).await;

        let name = store.store(b"gone soon", Some("a.jpg")).await.unwrap();
        store.remove(&name).await.unwrap();
        assert!(matches!(
            store.retrieve(&name).await,
            Err(ApiError::NotFound(_))
        ));
        store.remove(&name).await.unwrap();
        assert!(matches!(
            store.remove("../closet.db").await,
            Err(ApiError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn oversize_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir, 4).await;

        assert!(matches!(
            store.store(b"12345", None).await,
            Err(ApiError::PayloadTooLarge(_))
        ));

        let missing = Uuid::new_v4().simple().to_string();
        assert!(matches!(
            store.retrieve(&missing).await,
            Err(ApiError::NotFound(_))
        ));
        assert!(matches!(
            store.retrieve("../secret").await,
            Err(ApiError::Validation(_))
        ));
    }
}
