//! Read path: validity checks, file reads, enumeration.

use tokio::fs;
use tracing::debug;

use crate::error::{OpenMlError, OpenMlResult};

use super::keys::{self, CacheFile, EntityKind};
use super::{io, CacheStore};

pub(crate) async fn is_valid_impl(cache: &CacheStore, kind: EntityKind, id: u64) -> bool {
    for file in kind.required_files() {
        if !io::is_non_empty_file(&cache.path_for(kind, id, *file)).await {
            debug!(%kind, id, file = file.file_name(), "cache miss");
            return false;
        }
    }
    true
}

pub(crate) async fn read_impl(
    cache: &CacheStore,
    kind: EntityKind,
    id: u64,
    file: CacheFile,
) -> OpenMlResult<Vec<u8>> {
    let path = cache.path_for(kind, id, file);
    if !io::is_non_empty_file(&path).await {
        return Err(OpenMlError::not_found(file.resource(), id));
    }
    fs::read(&path).await.map_err(|e| OpenMlError::Cache {
        message: format!("failed to read {}: {}", path.display(), e),
    })
}

pub(crate) async fn cached_ids_impl(cache: &CacheStore, kind: EntityKind) -> OpenMlResult<Vec<u64>> {
    let dir = keys::kind_dir(&cache.root, kind);
    let mut ids = Vec::new();

    if !dir.exists() {
        return Ok(ids);
    }

    let mut entries = fs::read_dir(&dir).await.map_err(|e| OpenMlError::Cache {
        message: format!("failed to read cache directory: {}", e),
    })?;

    while let Some(entry) = entries.next_entry().await.map_err(|e| OpenMlError::Cache {
        message: format!("failed to read directory entry: {}", e),
    })? {
        // Staging directories and stray files never parse as ids.
        let Some(id) = entry.file_name().to_str().and_then(|n| n.parse::<u64>().ok()) else {
            continue;
        };
        if is_valid_impl(cache, kind, id).await {
            ids.push(id);
        }
    }

    ids.sort_unstable();
    Ok(ids)
}
