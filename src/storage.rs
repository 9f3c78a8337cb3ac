use std::{io, path::PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::{fs::OpenOptions, io::AsyncWriteExt};
use tracing::debug;

/// URL prefix under which stored objects are served.
pub const PUBLIC_PREFIX: &str = "/uploads/";

#[derive(Debug, Error)]
pub enum StorageError {
    /// Keys are write-once; callers pick another key.
    #[error("object {0:?} already exists")]
    Exists(String),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Stores `body` under a fresh `key` and returns the public URL path for it.
    /// Never replaces an existing object.
    async fn put_object(&self, key: &str, body: Bytes, content_type: &str)
        -> Result<String, StorageError>;
    async fn delete_object(&self, key: &str) -> anyhow::Result<()>;
}

/// Flat directory on local disk, served statically at [`PUBLIC_PREFIX`].
#[derive(Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    /// Does no I/O; the directory must exist before the first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Creates the directory if needed.
    pub async fn init(root: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let storage = Self::new(root);
        tokio::fs::create_dir_all(&storage.root)
            .await
            .with_context(|| format!("create upload dir {}", storage.root.display()))?;
        Ok(storage)
    }

    fn path_for(&self, key: &str) -> anyhow::Result<PathBuf> {
        anyhow::ensure!(
            !key.is_empty() && key == sanitize_filename(key),
            "refusing unsafe storage key {key:?}"
        );
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl StorageClient for LocalStorage {
    async fn put_object(
        &self,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<String, StorageError> {
        let path = self.path_for(key)?;
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path).await {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(StorageError::Exists(key.to_string()))
            }
            Err(e) => {
                return Err(anyhow::Error::new(e)
                    .context(format!("create {}", path.display()))
                    .into())
            }
        };

        let written = async {
            file.write_all(&body).await?;
            file.flush().await
        }
        .await;
        if let Err(e) = written {
            drop(file);
            let _ = tokio::fs::remove_file(&path).await;
            return Err(anyhow::Error::new(e)
                .context(format!("write {}", path.display()))
                .into());
        }

        debug!(key, content_type, bytes = body.len(), "stored object");
        Ok(format!("{PUBLIC_PREFIX}{key}"))
    }

    async fn delete_object(&self, key: &str) -> anyhow::Result<()> {
        let path = self.path_for(key)?;
        tokio::fs::remove_file(&path)
            .await
            .with_context(|| format!("remove {}", path.display()))?;
        debug!(key, "deleted object");
        Ok(())
    }
}

/// Keeps only the final path component and replaces anything outside `[A-Za-z0-9._-]`.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        "resume.pdf".into()
    } else {
        cleaned
    }
}
