//! Filesystem-backed object store.
//!
//! # Design
//! - Keys map to files under a root directory; `..` and empty segments are rejected.
//! - Leases live in memory with an expiry; an expired lease no longer guards
//!   deletes and is pruned on the next acquire.
//! - Copies run on spawned tasks and report through a status map. A terminal
//!   status is reported once, then forgotten.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::fs;
use tokio::io::BufReader;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{FsOpsError, FsOpsResult};
use crate::store::{CopyId, CopyStatus, LeaseId, ObjectReader, ObjectStore};

#[derive(Debug, Clone, Copy)]
struct ActiveLease {
    id: LeaseId,
    expires_at: Instant,
}

impl ActiveLease {
    fn is_live(&self) -> bool {
        self.expires_at > Instant::now()
    }
}

/// Object store rooted at a local directory.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
    leases: Arc<Mutex<HashMap<String, ActiveLease>>>,
    copies: Arc<Mutex<HashMap<CopyId, CopyStatus>>>,
}

impl LocalObjectStore {
    /// Construct a store rooted at `root`. The directory is created lazily.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            leases: Arc::new(Mutex::new(HashMap::new())),
            copies: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Root directory backing the store.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write an object, creating intermediate folders.
    ///
    /// # Errors
    ///
    /// Returns an error when the key is invalid or the write fails.
    pub async fn put(&self, path: &str, contents: impl AsRef<[u8]> + Send) -> FsOpsResult<()> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| FsOpsError::io("put.create_parent", path, parent, source))?;
        }
        fs::write(&target, contents)
            .await
            .map_err(|source| FsOpsError::io("put.write", path, &target, source))
    }

    fn resolve(&self, key: &str) -> FsOpsResult<PathBuf> {
        let key = key.trim_start_matches('/');
        if key.is_empty() {
            return Err(FsOpsError::InvalidKey {
                path: key.to_string(),
                reason: "empty_key",
            });
        }
        let mut resolved = self.root.clone();
        for segment in key.split('/') {
            if segment.is_empty() || segment == "." || segment == ".." || segment.contains('\\') {
                return Err(FsOpsError::InvalidKey {
                    path: key.to_string(),
                    reason: "invalid_segment",
                });
            }
            resolved.push(segment);
        }
        Ok(resolved)
    }

    async fn ensure_exists(&self, key: &str, path: &Path) -> FsOpsResult<()> {
        let metadata = fs::metadata(path)
            .await
            .map_err(|source| FsOpsError::io("metadata", key, path, source))?;
        if metadata.is_file() {
            Ok(())
        } else {
            Err(FsOpsError::NotFound {
                path: key.to_string(),
            })
        }
    }
}

async fn copy_file(source: &Path, destination: &Path) -> io::Result<()> {
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::copy(source, destination).await.map(|_| ())
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn list(&self, prefix: &str) -> FsOpsResult<Vec<String>> {
        let prefix = prefix.trim_start_matches('/');
        let dir_key = prefix.rsplit_once('/').map_or("", |(dir, _)| dir);
        let start = if dir_key.is_empty() {
            self.root.clone()
        } else {
            self.resolve(dir_key)?
        };

        let mut keys = Vec::new();
        let mut pending = vec![(start, dir_key.to_string())];
        while let Some((dir, dir_key)) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
                Err(source) => {
                    return Err(FsOpsError::io("list.read_dir", prefix, &dir, source));
                }
            };
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|source| FsOpsError::io("list.next_entry", prefix, &dir, source))?
            {
                let name = entry.file_name().to_string_lossy().into_owned();
                let key = if dir_key.is_empty() {
                    name
                } else {
                    format!("{dir_key}/{name}")
                };
                let file_type = entry.file_type().await.map_err(|source| {
                    FsOpsError::io("list.file_type", prefix, entry.path(), source)
                })?;
                if file_type.is_dir() {
                    if key.starts_with(prefix) || prefix.starts_with(&format!("{key}/")) {
                        pending.push((entry.path(), key));
                    }
                } else if key.starts_with(prefix) {
                    keys.push(key);
                }
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn open(&self, path: &str) -> FsOpsResult<ObjectReader> {
        let target = self.resolve(path)?;
        let file = fs::File::open(&target)
            .await
            .map_err(|source| FsOpsError::io("open", path, &target, source))?;
        Ok(Box::new(BufReader::new(file)))
    }

    async fn acquire_lease(&self, path: &str, duration: Duration) -> FsOpsResult<LeaseId> {
        let target = self.resolve(path)?;
        self.ensure_exists(path, &target).await?;
        let mut leases = self.leases.lock().await;
        leases.retain(|_, active| active.is_live());
        if leases.contains_key(path) {
            return Err(FsOpsError::LeaseHeld {
                path: path.to_string(),
            });
        }
        let id = LeaseId::new();
        leases.insert(
            path.to_string(),
            ActiveLease {
                id,
                expires_at: Instant::now() + duration,
            },
        );
        debug!(path, lease = %id, "lease acquired");
        Ok(id)
    }

    async fn release_lease(&self, path: &str, lease: &LeaseId) -> FsOpsResult<()> {
        let mut leases = self.leases.lock().await;
        match leases.get(path) {
            Some(active) if active.id == *lease => {
                leases.remove(path);
                Ok(())
            }
            _ => Err(FsOpsError::LeaseMismatch {
                path: path.to_string(),
            }),
        }
    }

    async fn start_copy(&self, source: &str, destination: &str) -> FsOpsResult<CopyId> {
        let from = self.resolve(source)?;
        let to = self.resolve(destination)?;
        self.ensure_exists(source, &from).await?;

        let id = CopyId::new();
        self.copies.lock().await.insert(id, CopyStatus::Pending);
        let copies = Arc::clone(&self.copies);
        let source_key = source.to_string();
        tokio::spawn(async move {
            let status = match copy_file(&from, &to).await {
                Ok(()) => CopyStatus::Success,
                Err(err) => {
                    warn!(source = %source_key, error = %err, "object copy failed");
                    CopyStatus::Failed
                }
            };
            copies.lock().await.insert(id, status);
        });
        Ok(id)
    }

    async fn copy_status(&self, copy: &CopyId) -> FsOpsResult<CopyStatus> {
        let mut copies = self.copies.lock().await;
        let status = copies
            .get(copy)
            .copied()
            .ok_or(FsOpsError::CopyUnknown { copy_id: copy.0 })?;
        if status != CopyStatus::Pending {
            copies.remove(copy);
        }
        Ok(status)
    }

    async fn delete(&self, path: &str, lease: Option<&LeaseId>) -> FsOpsResult<()> {
        let target = self.resolve(path)?;
        let mut leases = self.leases.lock().await;
        if let Some(active) = leases.get(path).filter(|active| active.is_live()) {
            match lease {
                Some(presented) if *presented == active.id => {}
                Some(_) => {
                    return Err(FsOpsError::LeaseMismatch {
                        path: path.to_string(),
                    });
                }
                None => {
                    return Err(FsOpsError::LeaseHeld {
                        path: path.to_string(),
                    });
                }
            }
        }
        fs::remove_file(&target)
            .await
            .map_err(|source| FsOpsError::io("delete", path, &target, source))?;
        leases.remove(path);
        Ok(())
    }
}
