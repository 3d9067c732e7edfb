//! Local-disk binary store.
//!
//! Blobs live beneath `base_path/{account}/{shard}/{shard}/{identifier}`,
//! where the shards are the first two byte pairs of the identifier's hex.
//! Writes go through a temp file with fsync and an atomic rename.

use crate::store::{BinaryStore, StoreError, StoreResult, WriteOutcome};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct DiskBinaryStore {
    base_path: PathBuf,
}

impl DiskBinaryStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn account_root(&self, account: &str) -> PathBuf {
        self.base_path.join(account)
    }

    /// Physical path for a blob. The identifier is its own hash, so its
    /// leading hex supplies the shard directories directly.
    fn content_path(&self, account: &str, identifier: &str) -> PathBuf {
        let mut path = self.account_root(account);
        if identifier.len() >= 4 {
            path.push(&identifier[0..2]);
            path.push(&identifier[2..4]);
        }
        path.push(identifier);
        path
    }

    async fn write_atomic(&self, path: &Path, data: &Bytes) -> StoreResult<()> {
        let parent = path
            .parent()
            .ok_or_else(|| StoreError::backend("blob path missing parent directory"))?;
        fs::create_dir_all(parent).await?;

        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;

        if let Err(err) = file.write_all(data).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(err.into());
        }
        if let Err(err) = file.flush().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(err.into());
        }
        if let Err(err) = file.sync_all().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(err.into());
        }

        if let Err(err) = fs::rename(&tmp_path, path).await {
            if err.kind() == ErrorKind::AlreadyExists {
                fs::remove_file(path).await?;
                fs::rename(&tmp_path, path).await?;
            } else {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(err.into());
            }
        }

        Ok(())
    }

    /// Remove empty shard directories upward, stopping at the base path,
    /// at a non-empty directory, or on any unexpected error.
    async fn prune_empty_dirs(&self, start: &Path) {
        let stop = &self.base_path;
        let mut current = start.to_path_buf();
        while current.starts_with(stop) && current != *stop {
            match fs::remove_dir(&current).await {
                Ok(_) => {
                    if let Some(parent) = current.parent() {
                        current = parent.to_path_buf();
                    } else {
                        break;
                    }
                }
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl BinaryStore for DiskBinaryStore {
    async fn store(
        &self,
        account: &str,
        identifier: &str,
        data: &Bytes,
    ) -> StoreResult<WriteOutcome> {
        let path = self.content_path(account, identifier);
        let existed = fs::try_exists(&path).await.unwrap_or(false);

        self.write_atomic(&path, data).await?;

        if existed {
            debug!(account, identifier, "touched existing blob");
            Ok(WriteOutcome::Touched)
        } else {
            debug!(account, identifier, "stored new blob");
            Ok(WriteOutcome::Created)
        }
    }

    async fn delete(&self, account: &str, identifier: &str) -> StoreResult<()> {
        let path = self.content_path(account, identifier);
        fs::remove_file(&path).await?;

        if let Some(parent) = path.parent() {
            self.prune_empty_dirs(parent).await;
        }

        Ok(())
    }

    async fn read(&self, account: &str, identifier: &str) -> StoreResult<Bytes> {
        let path = self.content_path(account, identifier);
        let data = fs::read(&path).await?;

        Ok(Bytes::from(data))
    }

    async fn last_modified(&self, account: &str, identifier: &str) -> StoreResult<DateTime<Utc>> {
        let path = self.content_path(account, identifier);
        let modified = fs::metadata(&path).await?.modified()?;

        Ok(DateTime::<Utc>::from(modified))
    }

    async fn exists(&self, account: &str, identifier: &str) -> bool {
        fs::try_exists(self.content_path(account, identifier))
            .await
            .unwrap_or(false)
    }

    async fn health_check(&self) -> bool {
        let probe = self.base_path.join(format!(".health-{}", Uuid::new_v4()));

        if fs::create_dir_all(&self.base_path).await.is_err() {
            return false;
        }
        if fs::write(&probe, b"health").await.is_err() {
            return false;
        }

        let ok = matches!(fs::read(&probe).await, Ok(bytes) if bytes == b"health");
        let _ = fs::remove_file(&probe).await;
        ok
    }
}
