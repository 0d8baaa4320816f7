use anyhow::{Result, bail};
use chrono::Utc;
use rand::{Rng, distr::Alphanumeric};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, warn};

/// Prefix every generated object key lives under.
const KEY_PREFIX: &str = "uploads/";

/// Flat object store for uploaded images.
///
/// Objects are stored at `{dir}/{key}` and published at
/// `{public_base}/{key}`; the `/media` route serves `dir` directly.
pub struct Storage {
    dir: PathBuf,
    public_base: String,
}

impl Storage {
    pub async fn new(dir: PathBuf, public_base: impl Into<String>) -> Result<Self> {
        fs::create_dir_all(dir.join(KEY_PREFIX)).await?;
        info!("Media storage directory: {}", dir.display());
        Ok(Self {
            dir,
            public_base: public_base.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base, key)
    }

    /// Key for a URL this store handed out. URLs pointing anywhere else
    /// (or at something that is not a valid key) yield `None`.
    pub fn key_from_url(&self, url: &str) -> Option<String> {
        let key = url.strip_prefix(&self.public_base)?.strip_prefix('/')?;
        is_valid_key(key).then(|| key.to_string())
    }

    pub async fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.object_path(key)?;
        fs::write(&path, bytes).await?;
        info!("Stored {} ({} bytes)", key, bytes.len());
        Ok(())
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        let path = self.object_path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                info!("Deleted {}", key);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Object {} already gone", key);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn object_path(&self, key: &str) -> Result<PathBuf> {
        if !is_valid_key(key) {
            bail!("invalid object key: {:?}", key);
        }
        Ok(self.dir.join(key))
    }
}

/// `uploads/{millis}-{random}.{ext}`. The extension comes from the client's
/// file name when it is sane, otherwise from the content type.
pub fn generate_key(file_name: Option<&str>, content_type: &str) -> String {
    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(13)
        .map(|c| char::from(c).to_ascii_lowercase())
        .collect();

    let ext = file_name
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| extension_for(content_type).to_string());

    format!("{}{}-{}.{}", KEY_PREFIX, Utc::now().timestamp_millis(), suffix, ext)
}

fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/avif" => "avif",
        _ => "bin",
    }
}

fn is_valid_key(key: &str) -> bool {
    let Some(name) = key.strip_prefix(KEY_PREFIX) else {
        return false;
    };
    !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}
