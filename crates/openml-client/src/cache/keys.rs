//! Entity kinds, cache file names and path derivation.

use std::fmt;
use std::path::{Path, PathBuf};

use uuid::Uuid;

/// Prefix of in-progress commit directories. Never a valid entity id.
pub(crate) const STAGING_PREFIX: &str = ".staging-";

/// Kind of cached entity; each kind has its own subtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    Dataset,
    Task,
}

impl EntityKind {
    /// Directory under the cache root.
    pub fn dir_name(&self) -> &'static str {
        match self {
            Self::Dataset => "datasets",
            Self::Task => "tasks",
        }
    }

    /// Files that must all exist (non-empty) for the entity to be cached.
    pub fn required_files(&self) -> &'static [CacheFile] {
        match self {
            Self::Dataset => &[CacheFile::DatasetDescription, CacheFile::DatasetData],
            Self::Task => &[CacheFile::TaskDescription],
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Dataset => "dataset",
            Self::Task => "task",
        })
    }
}

/// A file inside an entity subtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CacheFile {
    DatasetDescription,
    DatasetData,
    DatasetFeatures,
    DatasetQualities,
    TaskDescription,
    Split,
}

impl CacheFile {
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::DatasetDescription => "description.xml",
            Self::DatasetData => "dataset.arff",
            Self::DatasetFeatures => "features.xml",
            Self::DatasetQualities => "qualities.xml",
            Self::TaskDescription => "task.xml",
            Self::Split => "datasplits.arff",
        }
    }

    /// Kind whose subtree holds this file.
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::DatasetDescription
            | Self::DatasetData
            | Self::DatasetFeatures
            | Self::DatasetQualities => EntityKind::Dataset,
            Self::TaskDescription | Self::Split => EntityKind::Task,
        }
    }

    /// Name used in `NotFound` errors.
    pub fn resource(&self) -> &'static str {
        match self {
            Self::DatasetDescription => "dataset description",
            Self::DatasetData => "dataset file",
            Self::DatasetFeatures => "dataset features",
            Self::DatasetQualities => "dataset qualities",
            Self::TaskDescription => "task",
            Self::Split => "split",
        }
    }
}

pub(crate) fn kind_dir(root: &Path, kind: EntityKind) -> PathBuf {
    root.join(kind.dir_name())
}

pub(crate) fn entity_dir(root: &Path, kind: EntityKind, id: u64) -> PathBuf {
    kind_dir(root, kind).join(id.to_string())
}

/// Fresh staging directory next to the final subtree (same filesystem).
pub(crate) fn staging_dir(root: &Path, kind: EntityKind, id: u64) -> PathBuf {
    kind_dir(root, kind).join(format!("{}{}-{}", STAGING_PREFIX, id, Uuid::new_v4()))
}
