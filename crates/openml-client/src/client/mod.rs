//! Remote fetcher for OpenML metadata, data files and uploads.
//!
//! Public API: no status code knowledge. All HTTP/status mapping in http.rs.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::auth::SessionManager;
use crate::cache::CacheFile;
use crate::config::ClientConfig;
use crate::error::{OpenMlError, OpenMlResult};
use crate::payload::tree::Element;
use crate::payload::{parse_dataset_list, parse_task_list, EntityListEntry, EntityStatus};
use crate::transport::{FilePart, RequestParams, ReqwestTransport, Transport};

mod helpers;
mod http;

use helpers::url_with_segments;
use http::{HttpBackend, Target};

/// OpenML code for "list query matched nothing".
const NO_RESULTS_CODE: u32 = 372;

/// Filters for list queries, rendered as `/<key>/<value>` path segments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilters {
    filters: BTreeMap<String, String>,
}

impl ListFilters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an arbitrary filter (`tag`, `data_name`, `number_instances`, ...).
    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.filters.insert(key.into(), value.to_string());
        self
    }

    pub fn tag(self, tag: &str) -> Self {
        self.with("tag", tag)
    }

    pub fn status(self, status: EntityStatus) -> Self {
        self.with("status", status.as_str())
    }

    pub fn limit(self, limit: u64) -> Self {
        self.with("limit", limit)
    }

    pub fn offset(self, offset: u64) -> Self {
        self.with("offset", offset)
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    fn segments(&self) -> impl Iterator<Item = &str> {
        self.filters
            .iter()
            .flat_map(|(k, v)| [k.as_str(), v.as_str()])
    }
}

/// Metadata documents that can be described by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataKind {
    Dataset,
    DatasetFeatures,
    DatasetQualities,
    Task,
}

impl MetadataKind {
    /// Cache file the document is stored as.
    pub fn cache_file(&self) -> CacheFile {
        match self {
            Self::Dataset => CacheFile::DatasetDescription,
            Self::DatasetFeatures => CacheFile::DatasetFeatures,
            Self::DatasetQualities => CacheFile::DatasetQualities,
            Self::Task => CacheFile::TaskDescription,
        }
    }

    fn path_segments(&self) -> &'static [&'static str] {
        match self {
            Self::Dataset => &["data"],
            Self::DatasetFeatures => &["data", "features"],
            Self::DatasetQualities => &["data", "qualities"],
            Self::Task => &["task"],
        }
    }
}

/// Upload endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    Dataset,
    DatasetFeatures,
    DatasetQualities,
}

impl UploadKind {
    fn path_segments(&self) -> &'static [&'static str] {
        match self {
            Self::Dataset => &["data", "upload"],
            Self::DatasetFeatures => &["data", "features"],
            Self::DatasetQualities => &["data", "qualities"],
        }
    }
}

/// Server answer to a successful upload.
#[derive(Debug, Clone)]
pub struct UploadReceipt {
    pub status: u16,
    pub body: String,
}

impl UploadReceipt {
    /// Id assigned by the server, when the body reports one.
    pub fn uploaded_id(&self) -> Option<u64> {
        Element::parse(self.body.as_bytes())
            .ok()?
            .child_text("id")?
            .parse()
            .ok()
    }
}

/// Fetches OpenML entities; every call carries a valid session.
#[derive(Debug, Clone)]
pub struct RemoteFetcher {
    http: HttpBackend,
}

impl RemoteFetcher {
    pub fn new(transport: Arc<dyn Transport>, sessions: SessionManager, base_url: &str) -> Self {
        Self {
            http: HttpBackend {
                transport,
                sessions,
                base_url: base_url.trim_end_matches('/').to_string(),
            },
        }
    }

    /// Fetcher with a `reqwest` transport and a session manager built from `config`.
    pub fn from_config(config: &ClientConfig) -> OpenMlResult<Self> {
        let transport: Arc<dyn Transport> = Arc::new(ReqwestTransport::new(config.timeout_secs)?);
        let sessions = SessionManager::from_config(config, Arc::clone(&transport));
        Ok(Self::new(transport, sessions, config.base_url()))
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.http.sessions
    }

    pub fn base_url(&self) -> &str {
        &self.http.base_url
    }

    /// List datasets. Always remote.
    pub async fn list_datasets(&self, filters: &ListFilters) -> OpenMlResult<Vec<EntityListEntry>> {
        let url = self.url(["data", "list"].into_iter().chain(filters.segments()))?;
        debug!(url = %url, "listing datasets");

        match self.http.get(&url, Target::Listing).await {
            Ok(response) => parse_dataset_list(&response.body),
            Err(e) if is_no_results(&e) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    /// List tasks, optionally of one task type. Always remote.
    pub async fn list_tasks(
        &self,
        task_type_id: Option<u32>,
        filters: &ListFilters,
    ) -> OpenMlResult<Vec<EntityListEntry>> {
        let type_id = task_type_id.map(|t| t.to_string());
        let type_segments = type_id.as_deref().map(|t| ["type", t]);
        let url = self.url(
            ["task", "list"]
                .into_iter()
                .chain(type_segments.into_iter().flatten())
                .chain(filters.segments()),
        )?;
        debug!(url = %url, "listing tasks");

        match self.http.get(&url, Target::Listing).await {
            Ok(response) => parse_task_list(&response.body),
            Err(e) if is_no_results(&e) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    /// Raw metadata document of one entity.
    pub async fn describe(&self, kind: MetadataKind, id: u64) -> OpenMlResult<Vec<u8>> {
        let id_segment = id.to_string();
        let url = self.url(
            kind.path_segments()
                .iter()
                .copied()
                .chain([id_segment.as_str()]),
        )?;
        debug!(url = %url, id, "fetching metadata");

        let target = Target::Entity {
            resource: kind.cache_file().resource(),
            id,
        };
        Ok(self.http.get(&url, target).await?.body)
    }

    /// Download a file referenced by a description (data file, split file).
    ///
    /// `resource`/`id` name the entity the file belongs to, for `NotFound`.
    pub async fn download_file(
        &self,
        url: &str,
        resource: &'static str,
        id: u64,
    ) -> OpenMlResult<Vec<u8>> {
        debug!(url, id, "downloading file");
        let response = self.http.get(url, Target::Entity { resource, id }).await?;
        Ok(response.body)
    }

    /// Upload a description, plus the data file for datasets.
    pub async fn upload(
        &self,
        kind: UploadKind,
        payload: Option<&[u8]>,
        description: &str,
    ) -> OpenMlResult<UploadReceipt> {
        if kind == UploadKind::Dataset && payload.is_none() {
            return Err(OpenMlError::Config {
                message: "dataset upload requires a data file".to_string(),
            });
        }

        let url = self.url(kind.path_segments().iter().copied())?;
        let mut params = RequestParams::new().with_part(FilePart::new(
            "description",
            "description.xml",
            description.as_bytes(),
        ));
        if let Some(payload) = payload {
            params = params.with_part(FilePart::new("dataset", "dataset.arff", payload));
        }

        let response = self.http.post(&url, params, Target::Upload).await?;
        let receipt = UploadReceipt {
            status: response.status,
            body: response.text(),
        };
        info!(url = %url, status = receipt.status, id = ?receipt.uploaded_id(), "upload accepted");
        Ok(receipt)
    }

    fn url<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> OpenMlResult<String> {
        url_with_segments(&self.http.base_url, segments)
    }
}

fn is_no_results(err: &OpenMlError) -> bool {
    matches!(err, OpenMlError::Api { code: Some(NO_RESULTS_CODE), .. })
}
