use anyhow::{Result, bail};
use std::path::PathBuf;
use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// URL prefix under which stored images are served.
pub const URL_PREFIX: &str = "/uploads/";

/// Listing images on local disk, one flat file per upload at
/// `{dir}/{uuid}.{ext}`.
pub struct ImageStore {
    dir: PathBuf,
}

impl ImageStore {
    pub async fn new(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir).await?;
        info!("Image storage directory: {}", dir.display());
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    /// Writes the image and returns the URL it will be served from.
    pub async fn save(&self, data: &[u8], content_type: &str) -> Result<String> {
        let Some(ext) = extension_for(content_type) else {
            bail!("Unsupported image type: {}", content_type);
        };
        let name = format!("{}.{}", Uuid::new_v4(), ext);
        fs::write(self.dir.join(&name), data).await?;
        debug!("Stored image {} ({} bytes)", name, data.len());
        Ok(format!("{}{}", URL_PREFIX, name))
    }

    /// Best-effort removal. URLs that were not issued by this store are ignored.
    pub async fn delete(&self, url: &str) {
        let Some(name) = file_name(url) else {
            return;
        };
        if let Err(e) = fs::remove_file(self.dir.join(name)).await {
            warn!("Failed to delete image {}: {}", name, e);
        }
    }
}

fn file_name(url: &str) -> Option<&str> {
    let name = url.strip_prefix(URL_PREFIX)?;
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
        && !name.starts_with('.');
    valid.then_some(name)
}

fn extension_for(content_type: &str) -> Option<&'static str> {
    let mime = content_type.split(';').next()?.trim().to_ascii_lowercase();
    let ext = match mime.as_str() {
        "image/jpeg" | "image/jpg" | "image/pjpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/avif" => "avif",
        "image/heic" => "heic",
        "image/bmp" => "bmp",
        "image/svg+xml" => "svg",
        other if other.starts_with("image/") => "img",
        _ => return None,
    };
    Some(ext)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("rewear-images-{}", Uuid::new_v4()))
    }

    #[test]
    fn only_images_map_to_extensions() {
        assert_eq!(extension_for("image/jpeg"), Some("jpg"));
        assert_eq!(extension_for("image/PNG"), Some("png"));
        assert_eq!(extension_for("image/x-icon"), Some("img"));
        assert_eq!(extension_for("text/plain"), None);
        assert_eq!(extension_for("application/octet-stream"), None);
    }

    #[test]
    fn foreign_urls_are_ignored() {
        assert_eq!(file_name("/uploads/abc.png"), Some("abc.png"));
        assert_eq!(file_name("/uploads/../rewear.db"), None);
        assert_eq!(file_name("/uploads/.env"), None);
        assert_eq!(file_name("https://cdn.example.com/abc.png"), None);
        assert_eq!(file_name("/uploads/"), None);
    }

    #[tokio::test]
    async fn save_then_delete() {
        let dir = temp_dir();
        let store = ImageStore::new(dir.clone()).await.unwrap();

        let url = store.save(b"\x89PNG fake", "image/png").await.unwrap();
        assert!(url.starts_with(URL_PREFIX) && url.ends_with(".png"));
        let path = dir.join(file_name(&url).unwrap());
        assert!(path.exists());

        store.delete(&url).await;
        assert!(!path.exists());

        assert!(store.save(b"hello", "text/plain").await.is_err());
        let _ = std::fs::remove_dir_all(dir);
    }
}
