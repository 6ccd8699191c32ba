//! Filesystem helpers: durable writes and staging promotion.

use std::path::Path;

use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::{OpenMlError, OpenMlResult};

fn write_error(action: &str, path: &Path, e: std::io::Error) -> OpenMlError {
    OpenMlError::CacheWrite {
        message: format!("failed to {} {}: {}", action, path.display(), e),
    }
}

/// Write and fsync a file.
pub(crate) async fn write_file(path: &Path, content: &[u8]) -> OpenMlResult<()> {
    let mut file = fs::File::create(path)
        .await
        .map_err(|e| write_error("create", path, e))?;
    file.write_all(content)
        .await
        .map_err(|e| write_error("write", path, e))?;
    file.sync_all()
        .await
        .map_err(|e| write_error("sync", path, e))?;
    Ok(())
}

/// Whether `path` is a regular, non-empty file.
pub(crate) async fn is_non_empty_file(path: &Path) -> bool {
    match fs::metadata(path).await {
        Ok(meta) => meta.is_file() && meta.len() > 0,
        Err(_) => false,
    }
}

async fn is_dir(path: &Path) -> bool {
    fs::metadata(path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
}

/// Move a fully written staging directory into place.
///
/// A missing target is replaced by one directory rename. An existing target
/// (optional files added later, or a concurrent commit that won the rename)
/// receives each staged file by its own rename.
pub(crate) async fn promote(staging: &Path, target: &Path) -> OpenMlResult<()> {
    if !is_dir(target).await {
        match fs::rename(staging, target).await {
            Ok(()) => return Ok(()),
            Err(_) if is_dir(target).await => {}
            Err(e) => return Err(write_error("rename staging directory to", target, e)),
        }
    }

    let mut entries = fs::read_dir(staging)
        .await
        .map_err(|e| write_error("read", staging, e))?;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| write_error("read", staging, e))?
    {
        let destination = target.join(entry.file_name());
        fs::rename(entry.path(), &destination)
            .await
            .map_err(|e| write_error("rename staged file to", &destination, e))?;
    }

    fs::remove_dir(staging)
        .await
        .map_err(|e| write_error("remove", staging, e))?;
    Ok(())
}
