//! Local on-disk cache.
//!
//! # Cache Structure
//!
//! ```text
//! <cache_root>/datasets/{id}/
//!   description.xml   # required
//!   dataset.arff      # required
//!   features.xml      # optional
//!   qualities.xml     # optional
//! <cache_root>/tasks/{id}/
//!   task.xml          # required
//!   datasplits.arff   # split of this task
//! ```
//!
//! An entry is valid when every required file exists and is non-empty.
//! Commits are staged in a hidden sibling directory and renamed into place,
//! so readers never see a partially written entry.

use std::path::{Path, PathBuf};

use crate::config::ClientConfig;
use crate::error::OpenMlResult;

mod evict;
mod io;
mod keys;
mod put;
mod read;

pub use keys::{CacheFile, EntityKind};

/// Cache of entity subtrees under one root directory.
#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
}

impl CacheStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Cache rooted at the configured (or default) directory.
    pub fn from_config(config: &ClientConfig) -> OpenMlResult<Self> {
        Ok(Self::new(config.resolved_cache_dir()?))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Subtree of one entity.
    pub fn entity_dir(&self, kind: EntityKind, id: u64) -> PathBuf {
        keys::entity_dir(&self.root, kind, id)
    }

    /// Final path of one cached file.
    pub fn path_for(&self, kind: EntityKind, id: u64, file: CacheFile) -> PathBuf {
        self.entity_dir(kind, id).join(file.file_name())
    }

    /// Whether every required file of the entity exists and is non-empty.
    pub async fn is_valid(&self, kind: EntityKind, id: u64) -> bool {
        read::is_valid_impl(self, kind, id).await
    }

    /// Whether a single (possibly optional) file is cached.
    pub async fn has_file(&self, kind: EntityKind, id: u64, file: CacheFile) -> bool {
        io::is_non_empty_file(&self.path_for(kind, id, file)).await
    }

    /// Read a cached file. Missing or empty files are `NotFound`.
    pub async fn read(&self, kind: EntityKind, id: u64, file: CacheFile) -> OpenMlResult<Vec<u8>> {
        read::read_impl(self, kind, id, file).await
    }

    /// Atomically write files into the entity's subtree.
    ///
    /// On error nothing becomes visible and the cache is unchanged.
    pub async fn commit(
        &self,
        kind: EntityKind,
        id: u64,
        files: &[(CacheFile, Vec<u8>)],
    ) -> OpenMlResult<()> {
        put::commit_impl(self, kind, id, files).await
    }

    /// Ids of all valid entries of a kind, ascending.
    pub async fn cached_ids(&self, kind: EntityKind) -> OpenMlResult<Vec<u64>> {
        read::cached_ids_impl(self, kind).await
    }

    /// Remove one entity subtree.
    pub async fn evict(&self, kind: EntityKind, id: u64) -> OpenMlResult<()> {
        evict::evict_impl(self, kind, id).await
    }

    /// Remove every cached entity.
    pub async fn clear(&self) -> OpenMlResult<()> {
        evict::clear_impl(self).await
    }

    /// Remove staging directories left behind by an interrupted process.
    pub async fn remove_stale_staging(&self) -> OpenMlResult<usize> {
        evict::remove_stale_staging_impl(self).await
    }
}
