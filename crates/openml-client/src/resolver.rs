//! Entity resolution.
//!
//! Resolves datasets, tasks and splits in this order:
//! 1. Cache (if every required file is present and non-empty)
//! 2. Remote fetch, committed to the cache only after it fully succeeds
//!
//! Each fetch walks `requested -> cache_check`, then either
//! `cache_hit -> done` or
//! `cache_miss -> authenticating -> fetching -> fetch_ok -> committing -> done`
//! (`fetch_fail -> failed` on error). Transitions are logged at debug level.
//! Nothing is retried.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::auth::SessionManager;
use crate::cache::{CacheFile, CacheStore, EntityKind};
use crate::client::{ListFilters, MetadataKind, RemoteFetcher, UploadKind, UploadReceipt};
use crate::config::ClientConfig;
use crate::error::{OpenMlError, OpenMlResult};
use crate::payload::{
    DatasetDescriptor, DatasetFeatures, DatasetQualities, EntityListEntry, TaskDescriptor,
};

/// Where a resolved entity came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveSource {
    Cache,
    Remote,
}

impl std::fmt::Display for ResolveSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cache => write!(f, "cache"),
            Self::Remote => write!(f, "remote"),
        }
    }
}

/// A dataset whose description and data file are cached.
#[derive(Debug, Clone)]
pub struct DatasetArtifact {
    pub descriptor: DatasetDescriptor,

    /// Cached data file (`dataset.arff`).
    pub data_path: PathBuf,

    /// Present when `features.xml` is cached.
    pub features: Option<DatasetFeatures>,

    /// Present when `qualities.xml` is cached.
    pub qualities: Option<DatasetQualities>,

    pub source: ResolveSource,
}

impl DatasetArtifact {
    pub fn id(&self) -> u64 {
        self.descriptor.id
    }
}

/// The train/test split file of one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub task_id: u64,
    pub path: PathBuf,
}

/// A cached task.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: u64,
    pub descriptor: TaskDescriptor,
    pub dataset_id: u64,
    /// `None` when the task defines no split file.
    pub split: Option<Split>,
    pub source: ResolveSource,
}

impl Task {
    fn new(descriptor: TaskDescriptor, split: Option<Split>, source: ResolveSource) -> Self {
        Self {
            id: descriptor.id,
            dataset_id: descriptor.dataset_id,
            descriptor,
            split,
            source,
        }
    }
}

/// Outcome of a batch download. Every requested id lands in exactly one map.
#[derive(Debug)]
pub struct BatchResult<T> {
    pub succeeded: BTreeMap<u64, T>,
    pub failed: BTreeMap<u64, OpenMlError>,
}

impl<T> Default for BatchResult<T> {
    fn default() -> Self {
        Self {
            succeeded: BTreeMap::new(),
            failed: BTreeMap::new(),
        }
    }
}

impl<T> BatchResult<T> {
    /// Whether every id succeeded.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
enum FetchState {
    Requested,
    CacheCheck,
    CacheHit,
    CacheMiss,
    Authenticating,
    Fetching,
    FetchOk,
    FetchFail,
    Committing,
    Done,
    Failed,
}

impl FetchState {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::CacheCheck => "cache_check",
            Self::CacheHit => "cache_hit",
            Self::CacheMiss => "cache_miss",
            Self::Authenticating => "authenticating",
            Self::Fetching => "fetching",
            Self::FetchOk => "fetch_ok",
            Self::FetchFail => "fetch_fail",
            Self::Committing => "committing",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

fn transition(kind: EntityKind, id: u64, state: FetchState) {
    debug!(%kind, id, state = state.as_str(), "fetch state");
}

/// Cache-first resolver for OpenML entities.
#[derive(Debug, Clone)]
pub struct EntityResolver {
    fetcher: RemoteFetcher,
    cache: CacheStore,
    verify_checksums: bool,
    max_concurrent_downloads: usize,
}

impl EntityResolver {
    /// Resolver with a `reqwest` transport and the configured cache root.
    pub fn from_config(config: &ClientConfig) -> OpenMlResult<Self> {
        config.validate()?;
        let fetcher = RemoteFetcher::from_config(config)?;
        let cache = CacheStore::from_config(config)?;
        Ok(Self::with_components(fetcher, cache, config))
    }

    /// Resolver from explicit components (tests, custom transports).
    pub fn with_components(fetcher: RemoteFetcher, cache: CacheStore, config: &ClientConfig) -> Self {
        Self {
            fetcher,
            cache,
            verify_checksums: config.verify_checksums,
            max_concurrent_downloads: config.max_concurrent_downloads.max(1),
        }
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn fetcher(&self) -> &RemoteFetcher {
        &self.fetcher
    }

    pub fn sessions(&self) -> &SessionManager {
        self.fetcher.sessions()
    }

    // ----- datasets -----

    /// Dataset description and data file, from cache or remote.
    ///
    /// With checksum verification on, a cached data file that does not match
    /// its description is treated as a miss and fetched again.
    pub async fn get_dataset(&self, id: u64) -> OpenMlResult<DatasetArtifact> {
        let kind = EntityKind::Dataset;
        transition(kind, id, FetchState::Requested);
        transition(kind, id, FetchState::CacheCheck);

        if self.cache.is_valid(kind, id).await {
            let descriptor = self.cached_dataset_descriptor(id).await?;
            match self.verify_cached_data(&descriptor).await {
                Ok(()) => {
                    transition(kind, id, FetchState::CacheHit);
                    let artifact = self.dataset_artifact(descriptor, ResolveSource::Cache).await?;
                    transition(kind, id, FetchState::Done);
                    return Ok(artifact);
                }
                Err(e @ OpenMlError::ChecksumMismatch { .. }) => {
                    warn!(id, error = %e, "cached dataset failed integrity check; re-fetching");
                }
                Err(e) => return Err(e),
            }
        }

        let descriptor = self
            .fetch_and_commit(kind, id, self.fetch_dataset(id))
            .await?;
        self.dataset_artifact(descriptor, ResolveSource::Remote).await
    }

    /// Dataset description only.
    pub async fn get_dataset_description(&self, id: u64) -> OpenMlResult<DatasetDescriptor> {
        self.get_metadata(MetadataKind::Dataset, id, |bytes| {
            let descriptor = DatasetDescriptor::from_xml(bytes)?;
            ensure_id("dataset", id, descriptor.id)?;
            Ok(descriptor)
        })
        .await
    }

    pub async fn get_dataset_features(&self, id: u64) -> OpenMlResult<DatasetFeatures> {
        self.get_metadata(MetadataKind::DatasetFeatures, id, |bytes| {
            let features = DatasetFeatures::from_xml(bytes)?;
            if let Some(did) = features.dataset_id {
                ensure_id("dataset features", id, did)?;
            }
            Ok(features)
        })
        .await
    }

    pub async fn get_dataset_qualities(&self, id: u64) -> OpenMlResult<DatasetQualities> {
        self.get_metadata(MetadataKind::DatasetQualities, id, |bytes| {
            let qualities = DatasetQualities::from_xml(bytes)?;
            if let Some(did) = qualities.dataset_id {
                ensure_id("dataset qualities", id, did)?;
            }
            Ok(qualities)
        })
        .await
    }

    /// Fetch many datasets concurrently; failures do not stop the batch.
    pub async fn download_datasets(&self, ids: &[u64]) -> BatchResult<DatasetArtifact> {
        self.run_batch(EntityKind::Dataset, ids, |resolver, id| async move {
            resolver.get_dataset(id).await
        })
        .await
    }

    // ----- tasks -----

    /// Task description, its dataset and its split.
    pub async fn get_task(&self, id: u64) -> OpenMlResult<Task> {
        let kind = EntityKind::Task;
        transition(kind, id, FetchState::Requested);
        transition(kind, id, FetchState::CacheCheck);

        if self.cache.is_valid(kind, id).await {
            let descriptor = self.cached_task_descriptor(id).await?;
            transition(kind, id, FetchState::CacheHit);
            self.get_dataset(descriptor.dataset_id).await?;
            let split = self.ensure_split(&descriptor).await?;
            transition(kind, id, FetchState::Done);
            return Ok(Task::new(descriptor, split, ResolveSource::Cache));
        }

        let fetch = async {
            let description = self.fetcher.describe(MetadataKind::Task, id).await?;
            let descriptor = TaskDescriptor::from_xml(&description)?;
            ensure_id("task", id, descriptor.id)?;

            self.get_dataset(descriptor.dataset_id).await?;

            let mut files = vec![(CacheFile::TaskDescription, description)];
            if let Some(url) = descriptor.data_splits_url() {
                let split = self.download_non_empty(url, "split", id).await?;
                files.push((CacheFile::Split, split));
            }
            Ok::<_, OpenMlError>((files, descriptor))
        };
        let descriptor = self.fetch_and_commit(kind, id, fetch).await?;

        let split = descriptor.data_splits_url().map(|_| self.split_ref(id));
        Ok(Task::new(descriptor, split, ResolveSource::Remote))
    }

    /// The task's split file, from cache or remote.
    pub async fn get_split(&self, task: &Task) -> OpenMlResult<Split> {
        self.split_for(&task.descriptor).await
    }

    /// Fetch many tasks concurrently; failures do not stop the batch.
    pub async fn download_tasks(&self, ids: &[u64]) -> BatchResult<Task> {
        self.run_batch(EntityKind::Task, ids, |resolver, id| async move {
            resolver.get_task(id).await
        })
        .await
    }

    // ----- lists and uploads (never cached) -----

    pub async fn list_datasets(&self, filters: &ListFilters) -> OpenMlResult<Vec<EntityListEntry>> {
        self.fetcher.list_datasets(filters).await
    }

    pub async fn list_tasks(
        &self,
        task_type_id: Option<u32>,
        filters: &ListFilters,
    ) -> OpenMlResult<Vec<EntityListEntry>> {
        self.fetcher.list_tasks(task_type_id, filters).await
    }

    /// Upload a new dataset. The cache is not touched.
    pub async fn upload_dataset(&self, description: &str, data: &[u8]) -> OpenMlResult<UploadReceipt> {
        self.fetcher
            .upload(UploadKind::Dataset, Some(data), description)
            .await
    }

    pub async fn upload_dataset_features(&self, description: &str) -> OpenMlResult<UploadReceipt> {
        self.fetcher
            .upload(UploadKind::DatasetFeatures, None, description)
            .await
    }

    pub async fn upload_dataset_qualities(&self, description: &str) -> OpenMlResult<UploadReceipt> {
        self.fetcher
            .upload(UploadKind::DatasetQualities, None, description)
            .await
    }

    // ----- cache-only reads -----

    /// Cached dataset, without contacting the server.
    pub async fn get_cached_dataset(&self, id: u64) -> OpenMlResult<DatasetArtifact> {
        if !self.cache.is_valid(EntityKind::Dataset, id).await {
            return Err(OpenMlError::not_found("dataset", id));
        }
        let descriptor = self.cached_dataset_descriptor(id).await?;
        self.verify_cached_data(&descriptor).await?;
        self.dataset_artifact(descriptor, ResolveSource::Cache).await
    }

    pub async fn get_cached_datasets(&self) -> OpenMlResult<BTreeMap<u64, DatasetArtifact>> {
        let mut datasets = BTreeMap::new();
        for id in self.cache.cached_ids(EntityKind::Dataset).await? {
            datasets.insert(id, self.get_cached_dataset(id).await?);
        }
        Ok(datasets)
    }

    /// Cached task, without contacting the server.
    pub async fn get_cached_task(&self, id: u64) -> OpenMlResult<Task> {
        if !self.cache.is_valid(EntityKind::Task, id).await {
            return Err(OpenMlError::not_found("task", id));
        }
        let descriptor = self.cached_task_descriptor(id).await?;
        let split = if self.cache.has_file(EntityKind::Task, id, CacheFile::Split).await {
            Some(self.split_ref(id))
        } else {
            None
        };
        Ok(Task::new(descriptor, split, ResolveSource::Cache))
    }

    pub async fn get_cached_tasks(&self) -> OpenMlResult<BTreeMap<u64, Task>> {
        let mut tasks = BTreeMap::new();
        for id in self.cache.cached_ids(EntityKind::Task).await? {
            tasks.insert(id, self.get_cached_task(id).await?);
        }
        Ok(tasks)
    }

    // ----- internals -----

    /// Authenticate, run `fetch`, commit its files. Nothing is committed on error.
    async fn fetch_and_commit<T>(
        &self,
        kind: EntityKind,
        id: u64,
        fetch: impl Future<Output = OpenMlResult<(Vec<(CacheFile, Vec<u8>)>, T)>>,
    ) -> OpenMlResult<T> {
        transition(kind, id, FetchState::CacheMiss);

        transition(kind, id, FetchState::Authenticating);
        if let Err(e) = self.fetcher.sessions().ensure_session().await {
            transition(kind, id, FetchState::Failed);
            return Err(e);
        }

        transition(kind, id, FetchState::Fetching);
        let (files, value) = match fetch.await {
            Ok(fetched) => fetched,
            Err(e) => {
                transition(kind, id, FetchState::FetchFail);
                transition(kind, id, FetchState::Failed);
                return Err(e);
            }
        };
        transition(kind, id, FetchState::FetchOk);

        transition(kind, id, FetchState::Committing);
        if let Err(e) = self.cache.commit(kind, id, &files).await {
            transition(kind, id, FetchState::Failed);
            return Err(e);
        }

        transition(kind, id, FetchState::Done);
        info!(%kind, id, files = files.len(), "fetched and cached");
        Ok(value)
    }

    /// Single metadata document, cached as its own file.
    async fn get_metadata<T>(
        &self,
        kind: MetadataKind,
        id: u64,
        parse: impl Fn(&[u8]) -> OpenMlResult<T>,
    ) -> OpenMlResult<T> {
        let file = kind.cache_file();
        let entity = file.kind();
        transition(entity, id, FetchState::Requested);
        transition(entity, id, FetchState::CacheCheck);

        if self.cache.has_file(entity, id, file).await {
            let bytes = self.cache.read(entity, id, file).await?;
            transition(entity, id, FetchState::CacheHit);
            let value = parse(&bytes)?;
            transition(entity, id, FetchState::Done);
            return Ok(value);
        }

        let fetch = async {
            let bytes = self.fetcher.describe(kind, id).await?;
            let value = parse(&bytes)?;
            Ok::<_, OpenMlError>((vec![(file, bytes)], value))
        };
        self.fetch_and_commit(entity, id, fetch).await
    }

    async fn fetch_dataset(
        &self,
        id: u64,
    ) -> OpenMlResult<(Vec<(CacheFile, Vec<u8>)>, DatasetDescriptor)> {
        let description = self.fetcher.describe(MetadataKind::Dataset, id).await?;
        let descriptor = DatasetDescriptor::from_xml(&description)?;
        ensure_id("dataset", id, descriptor.id)?;

        let url = descriptor.url.as_deref().ok_or_else(|| {
            OpenMlError::invalid_response(format!("dataset {} has no file url", id))
        })?;
        let data = self.download_non_empty(url, "dataset file", id).await?;

        if self.verify_checksums {
            verify_checksum(&descriptor, &data)?;
        }

        Ok((
            vec![
                (CacheFile::DatasetDescription, description),
                (CacheFile::DatasetData, data),
            ],
            descriptor,
        ))
    }

    async fn download_non_empty(
        &self,
        url: &str,
        resource: &'static str,
        id: u64,
    ) -> OpenMlResult<Vec<u8>> {
        let body = self.fetcher.download_file(url, resource, id).await?;
        if body.is_empty() {
            return Err(OpenMlError::invalid_response(format!(
                "empty {} for {}",
                resource, id
            )));
        }
        Ok(body)
    }

    async fn split_for(&self, descriptor: &TaskDescriptor) -> OpenMlResult<Split> {
        let kind = EntityKind::Task;
        let id = descriptor.id;
        transition(kind, id, FetchState::Requested);
        transition(kind, id, FetchState::CacheCheck);

        if self.cache.has_file(kind, id, CacheFile::Split).await {
            transition(kind, id, FetchState::CacheHit);
            transition(kind, id, FetchState::Done);
            return Ok(self.split_ref(id));
        }

        let url = descriptor
            .data_splits_url()
            .ok_or_else(|| OpenMlError::not_found("split", id))?;
        let fetch = async {
            let split = self.download_non_empty(url, "split", id).await?;
            Ok::<_, OpenMlError>((vec![(CacheFile::Split, split)], ()))
        };
        self.fetch_and_commit(kind, id, fetch).await?;
        Ok(self.split_ref(id))
    }

    async fn ensure_split(&self, descriptor: &TaskDescriptor) -> OpenMlResult<Option<Split>> {
        if descriptor.data_splits_url().is_none()
            && !self
                .cache
                .has_file(EntityKind::Task, descriptor.id, CacheFile::Split)
                .await
        {
            return Ok(None);
        }
        self.split_for(descriptor).await.map(Some)
    }

    fn split_ref(&self, task_id: u64) -> Split {
        Split {
            task_id,
            path: self.cache.path_for(EntityKind::Task, task_id, CacheFile::Split),
        }
    }

    async fn cached_dataset_descriptor(&self, id: u64) -> OpenMlResult<DatasetDescriptor> {
        let bytes = self
            .cache
            .read(EntityKind::Dataset, id, CacheFile::DatasetDescription)
            .await?;
        DatasetDescriptor::from_xml(&bytes)
    }

    async fn cached_task_descriptor(&self, id: u64) -> OpenMlResult<TaskDescriptor> {
        let bytes = self
            .cache
            .read(EntityKind::Task, id, CacheFile::TaskDescription)
            .await?;
        TaskDescriptor::from_xml(&bytes)
    }

    async fn verify_cached_data(&self, descriptor: &DatasetDescriptor) -> OpenMlResult<()> {
        if !self.verify_checksums {
            return Ok(());
        }
        let data = self
            .cache
            .read(EntityKind::Dataset, descriptor.id, CacheFile::DatasetData)
            .await?;
        verify_checksum(descriptor, &data)
    }

    async fn dataset_artifact(
        &self,
        descriptor: DatasetDescriptor,
        source: ResolveSource,
    ) -> OpenMlResult<DatasetArtifact> {
        let id = descriptor.id;
        let kind = EntityKind::Dataset;

        let features = if self.cache.has_file(kind, id, CacheFile::DatasetFeatures).await {
            let bytes = self.cache.read(kind, id, CacheFile::DatasetFeatures).await?;
            Some(DatasetFeatures::from_xml(&bytes)?)
        } else {
            None
        };
        let qualities = if self.cache.has_file(kind, id, CacheFile::DatasetQualities).await {
            let bytes = self.cache.read(kind, id, CacheFile::DatasetQualities).await?;
            Some(DatasetQualities::from_xml(&bytes)?)
        } else {
            None
        };

        Ok(DatasetArtifact {
            data_path: self.cache.path_for(kind, id, CacheFile::DatasetData),
            descriptor,
            features,
            qualities,
            source,
        })
    }

    async fn run_batch<T, F, Fut>(&self, kind: EntityKind, ids: &[u64], op: F) -> BatchResult<T>
    where
        T: Send + 'static,
        F: Fn(EntityResolver, u64) -> Fut,
        Fut: Future<Output = OpenMlResult<T>> + Send + 'static,
    {
        let ids: BTreeSet<u64> = ids.iter().copied().collect();
        let sem = Arc::new(Semaphore::new(self.max_concurrent_downloads));
        let mut join_set = JoinSet::new();

        for &id in &ids {
            let sem = Arc::clone(&sem);
            let fut = op(self.clone(), id);
            join_set.spawn(async move {
                let _permit = sem.acquire_owned().await;
                (id, fut.await)
            });
        }

        let mut result = BatchResult::default();
        while let Some(res) = join_set.join_next().await {
            match res {
                Ok((id, Ok(value))) => {
                    result.succeeded.insert(id, value);
                }
                Ok((id, Err(e))) => {
                    warn!(%kind, id, error = %e, "batch item failed");
                    result.failed.insert(id, e);
                }
                Err(e) => warn!(%kind, error = %e, "batch task did not complete"),
            }
        }

        for id in ids {
            if !result.succeeded.contains_key(&id) && !result.failed.contains_key(&id) {
                result.failed.insert(
                    id,
                    OpenMlError::Interrupted {
                        message: format!("{} {} was not resolved", kind, id),
                    },
                );
            }
        }

        debug!(
            %kind,
            succeeded = result.succeeded.len(),
            failed = result.failed.len(),
            "batch finished"
        );
        result
    }
}

fn ensure_id(resource: &str, requested: u64, actual: u64) -> OpenMlResult<()> {
    if requested != actual {
        return Err(OpenMlError::invalid_response(format!(
            "requested {} {} but the server described {}",
            resource, requested, actual
        )));
    }
    Ok(())
}

/// Compare `data` with the description's `md5_checksum`; no checksum means no check.
fn verify_checksum(descriptor: &DatasetDescriptor, data: &[u8]) -> OpenMlResult<()> {
    let Some(expected) = descriptor.md5_checksum.as_deref() else {
        debug!(id = descriptor.id, "no checksum in description; skipping verification");
        return Ok(());
    };

    let actual = format!("{:x}", md5::compute(data));
    if !actual.eq_ignore_ascii_case(expected) {
        return Err(OpenMlError::ChecksumMismatch {
            id: descriptor.id,
            expected: expected.to_string(),
            actual,
        });
    }
    Ok(())
}
