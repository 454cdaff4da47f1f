//! Per-service mutual exclusion

use dashmap::DashMap;
use fs2::FileExt;
use multiserver_common::{Error, Result, ServiceId};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

/// One async mutex per service id, shared by every clone.
///
/// Held across the whole read-check-act-write sequence of an operation so
/// two requests against the same service cannot both pass a guard. With a
/// lock directory each acquisition also takes an advisory `flock` on
/// `<dir>/<id>.lock`, which excludes the CLI and the web server from each
/// other when they share a store.
#[derive(Clone, Default)]
pub struct ServiceLocks {
    locks: Arc<DashMap<ServiceId, Arc<Mutex<()>>>>,
    lock_dir: Option<PathBuf>,
}

/// Exclusive hold on one service. Released on drop.
pub struct ServiceGuard {
    // Unlocked when the file handle closes
    _file: Option<File>,
    _local: OwnedMutexGuard<()>,
}

impl ServiceLocks {
    /// Locks that only exclude tasks of this process
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks that also exclude other processes using `lock_dir`
    pub fn with_lock_dir(lock_dir: impl Into<PathBuf>) -> Self {
        Self {
            locks: Arc::default(),
            lock_dir: Some(lock_dir.into()),
        }
    }

    pub async fn acquire(&self, id: ServiceId) -> Result<ServiceGuard> {
        let lock = self
            .locks
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let local = lock.lock_owned().await;

        let file = match &self.lock_dir {
            Some(dir) => {
                let path = lock_path(dir, id);
                let file = tokio::task::spawn_blocking(move || lock_file(&path))
                    .await
                    .map_err(|e| Error::Internal(format!("lock task failed: {}", e)))??;
                Some(file)
            }
            None => None,
        };

        Ok(ServiceGuard {
            _file: file,
            _local: local,
        })
    }

    /// Drop the lock of a deleted service
    pub fn forget(&self, id: ServiceId) {
        self.locks.remove(&id);
        if let Some(dir) = &self.lock_dir {
            // Ids are never reused, so a waiter holding the old file only
            // finds the record gone
            if let Err(e) = std::fs::remove_file(lock_path(dir, id)) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to remove lock file of service {}: {}", id, e);
                }
            }
        }
    }
}

fn lock_path(dir: &Path, id: ServiceId) -> PathBuf {
    dir.join(format!("{}.lock", id))
}

/// Open the lock file and block until it is exclusively locked
fn lock_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?;
    file.lock_exclusive()?;
    debug!("Acquired advisory lock on {:?}", path);
    Ok(file)
}
