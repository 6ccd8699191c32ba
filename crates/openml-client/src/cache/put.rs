//! Commit path: stage every file, then promote.

use std::collections::BTreeSet;

use tokio::fs;
use tracing::{debug, warn};

use crate::error::{OpenMlError, OpenMlResult};

use super::keys::{self, CacheFile, EntityKind};
use super::{io, CacheStore};

pub(crate) async fn commit_impl(
    cache: &CacheStore,
    kind: EntityKind,
    id: u64,
    files: &[(CacheFile, Vec<u8>)],
) -> OpenMlResult<()> {
    validate(kind, id, files)?;

    let kind_dir = keys::kind_dir(&cache.root, kind);
    fs::create_dir_all(&kind_dir)
        .await
        .map_err(|e| OpenMlError::CacheWrite {
            message: format!("failed to create {}: {}", kind_dir.display(), e),
        })?;

    let staging = keys::staging_dir(&cache.root, kind, id);
    let target = keys::entity_dir(&cache.root, kind, id);

    let result = stage_and_promote(&staging, &target, files).await;
    if let Err(e) = &result {
        warn!(%kind, id, error = %e, "cache commit failed; discarding staged files");
        // Already gone when the directory rename succeeded.
        let _ = fs::remove_dir_all(&staging).await;
    } else {
        debug!(%kind, id, files = files.len(), "committed to cache");
    }
    result
}

async fn stage_and_promote(
    staging: &std::path::Path,
    target: &std::path::Path,
    files: &[(CacheFile, Vec<u8>)],
) -> OpenMlResult<()> {
    fs::create_dir(staging)
        .await
        .map_err(|e| OpenMlError::CacheWrite {
            message: format!("failed to create staging directory: {}", e),
        })?;

    for (file, content) in files {
        io::write_file(&staging.join(file.file_name()), content).await?;
    }

    io::promote(staging, target).await
}

fn validate(kind: EntityKind, id: u64, files: &[(CacheFile, Vec<u8>)]) -> OpenMlResult<()> {
    if files.is_empty() {
        return Err(OpenMlError::CacheWrite {
            message: format!("nothing to commit for {} {}", kind, id),
        });
    }

    let mut seen = BTreeSet::new();
    for (file, content) in files {
        if file.kind() != kind {
            return Err(OpenMlError::CacheWrite {
                message: format!("{} does not belong to a {} entry", file.file_name(), kind),
            });
        }
        if content.is_empty() {
            return Err(OpenMlError::CacheWrite {
                message: format!("refusing to cache empty {} for {} {}", file.file_name(), kind, id),
            });
        }
        if !seen.insert(*file) {
            return Err(OpenMlError::CacheWrite {
                message: format!("{} given twice", file.file_name()),
            });
        }
    }
    Ok(())
}
