//! Eviction and cleanup.

use tokio::fs;
use tracing::debug;

use crate::error::{OpenMlError, OpenMlResult};

use super::keys::{self, EntityKind, STAGING_PREFIX};
use super::CacheStore;

pub(crate) async fn evict_impl(cache: &CacheStore, kind: EntityKind, id: u64) -> OpenMlResult<()> {
    let dir = keys::entity_dir(&cache.root, kind, id);

    if dir.exists() {
        fs::remove_dir_all(&dir)
            .await
            .map_err(|e| OpenMlError::CacheWrite {
                message: format!("failed to evict cache entry: {}", e),
            })?;
        debug!(%kind, id, "evicted from cache");
    }

    Ok(())
}

pub(crate) async fn clear_impl(cache: &CacheStore) -> OpenMlResult<()> {
    for kind in [EntityKind::Dataset, EntityKind::Task] {
        let dir = keys::kind_dir(&cache.root, kind);
        if dir.exists() {
            fs::remove_dir_all(&dir)
                .await
                .map_err(|e| OpenMlError::CacheWrite {
                    message: format!("failed to clear cache: {}", e),
                })?;
        }
    }
    debug!(root = %cache.root.display(), "cleared cache");
    Ok(())
}

pub(crate) async fn remove_stale_staging_impl(cache: &CacheStore) -> OpenMlResult<usize> {
    let mut removed = 0;

    for kind in [EntityKind::Dataset, EntityKind::Task] {
        let dir = keys::kind_dir(&cache.root, kind);
        if !dir.exists() {
            continue;
        }

        let mut entries = fs::read_dir(&dir).await.map_err(|e| OpenMlError::Cache {
            message: format!("failed to read cache directory: {}", e),
        })?;
        while let Some(entry) = entries.next_entry().await.map_err(|e| OpenMlError::Cache {
            message: format!("failed to read directory entry: {}", e),
        })? {
            if !entry.file_name().to_string_lossy().starts_with(STAGING_PREFIX) {
                continue;
            }
            fs::remove_dir_all(entry.path())
                .await
                .map_err(|e| OpenMlError::CacheWrite {
                    message: format!("failed to remove staging directory: {}", e),
                })?;
            removed += 1;
        }
    }

    if removed > 0 {
        debug!(removed, "removed stale staging directories");
    }
    Ok(removed)
}
