//! Shared fixtures for integration tests: a mocked OpenML server and a
//! resolver wired to it with a temporary cache.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use openml_client::{
    CacheStore, ClientConfig, EntityResolver, RemoteFetcher, ReqwestTransport, SessionManager,
    Transport,
};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const USERNAME: &str = "alice";
pub const PASSWORD: &str = "secret";

pub fn arff(id: u64) -> String {
    format!(
        "@relation dataset_{id}\n@attribute a numeric\n@attribute class {{x,y}}\n@data\n1,x\n2,y\n"
    )
}

pub fn md5_hex(data: &[u8]) -> String {
    format!("{:x}", md5::compute(data))
}

pub fn dataset_description(server: &str, id: u64, name: &str, checksum: &str) -> String {
    format!(
        r#"<oml:data_set_description xmlns:oml="http://openml.org/openml">
  <oml:id>{id}</oml:id>
  <oml:name>{name}</oml:name>
  <oml:version>1</oml:version>
  <oml:description>Test dataset {id}</oml:description>
  <oml:format>ARFF</oml:format>
  <oml:upload_date>2014-04-06T23:19:24</oml:upload_date>
  <oml:licence>Public</oml:licence>
  <oml:url>{server}/data/v1/download/{id}</oml:url>
  <oml:default_target_attribute>class</oml:default_target_attribute>
  <oml:md5_checksum>{checksum}</oml:md5_checksum>
  <oml:status>active</oml:status>
</oml:data_set_description>"#
    )
}

pub fn task_description(server: &str, task_id: u64, dataset_id: u64) -> String {
    format!(
        r#"<oml:task xmlns:oml="http://openml.org/openml">
  <oml:task_id>{task_id}</oml:task_id>
  <oml:task_type_id>1</oml:task_type_id>
  <oml:task_type>Supervised Classification</oml:task_type>
  <oml:input name="source_data">
    <oml:data_set>
      <oml:data_set_id>{dataset_id}</oml:data_set_id>
      <oml:target_feature>class</oml:target_feature>
    </oml:data_set>
  </oml:input>
  <oml:input name="estimation_procedure">
    <oml:estimation_procedure>
      <oml:type>crossvalidation</oml:type>
      <oml:data_splits_url>{server}/api_splits/get/{task_id}/Task_{task_id}_splits.arff</oml:data_splits_url>
      <oml:parameter name="number_folds">10</oml:parameter>
    </oml:estimation_procedure>
  </oml:input>
</oml:task>"#
    )
}

pub fn split_arff(task_id: u64) -> String {
    format!("@relation task_{task_id}_splits\n@attribute type {{TRAIN,TEST}}\n@data\nTRAIN,0,0,0\n")
}

pub fn auth_body(hash: &str, valid_until: DateTime<Utc>) -> String {
    format!(
        r#"<oml:authenticate xmlns:oml="http://openml.org/openml">
  <oml:session_hash>{}</oml:session_hash>
  <oml:valid_until>{}</oml:valid_until>
  <oml:timezone>UTC</oml:timezone>
</oml:authenticate>"#,
        hash,
        valid_until.format("%Y-%m-%d %H:%M:%S")
    )
}

pub fn server_error(code: u32, message: &str) -> String {
    format!(
        r#"<oml:error xmlns:oml="http://openml.org/openml"><oml:code>{code}</oml:code><oml:message>{message}</oml:message></oml:error>"#
    )
}

/// `openml.authenticate` answering with a session valid for an hour.
pub async fn mount_auth(mock_server: &MockServer, hash: &str) {
    Mock::given(method("POST"))
        .and(path("/openml.authenticate"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(auth_body(hash, Utc::now() + Duration::hours(1))),
        )
        .mount(mock_server)
        .await;
}

/// Description and data file of one dataset.
pub async fn mount_dataset(mock_server: &MockServer, id: u64, name: &str) {
    let data = arff(id);
    Mock::given(method("GET"))
        .and(path(format!("/data/{id}")))
        .respond_with(ResponseTemplate::new(200).set_body_string(dataset_description(
            &mock_server.uri(),
            id,
            name,
            &md5_hex(data.as_bytes()),
        )))
        .mount(mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/data/v1/download/{id}")))
        .respond_with(ResponseTemplate::new(200).set_body_string(data))
        .mount(mock_server)
        .await;
}

/// Task description and split file.
pub async fn mount_task(mock_server: &MockServer, task_id: u64, dataset_id: u64) {
    Mock::given(method("GET"))
        .and(path(format!("/task/{task_id}")))
        .respond_with(ResponseTemplate::new(200).set_body_string(task_description(
            &mock_server.uri(),
            task_id,
            dataset_id,
        )))
        .mount(mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/api_splits/get/{task_id}/Task_{task_id}_splits.arff")))
        .respond_with(ResponseTemplate::new(200).set_body_string(split_arff(task_id)))
        .mount(mock_server)
        .await;
}

pub struct TestEnv {
    pub resolver: EntityResolver,
    pub sessions: SessionManager,
    pub cache: CacheStore,
    pub _temp_dir: TempDir,
}

pub fn test_config(mock_server: &MockServer) -> ClientConfig {
    ClientConfig::default()
        .with_server_url(mock_server.uri())
        .with_credentials(USERNAME, PASSWORD)
        .with_timeout_secs(5)
}

pub fn create_test_env(mock_server: &MockServer) -> TestEnv {
    create_test_env_with(mock_server, test_config(mock_server))
}

pub fn create_test_env_with(mock_server: &MockServer, config: ClientConfig) -> TestEnv {
    let temp_dir = TempDir::new().unwrap();
    let config = config.with_cache_dir(temp_dir.path().join("cache"));

    let transport: Arc<dyn Transport> =
        Arc::new(ReqwestTransport::new(config.timeout_secs).unwrap());
    let sessions = SessionManager::from_config(&config, Arc::clone(&transport));
    let fetcher = RemoteFetcher::new(transport, sessions.clone(), config.base_url());
    let cache = CacheStore::from_config(&config).unwrap();
    let resolver = EntityResolver::with_components(fetcher, cache.clone(), &config);

    TestEnv {
        resolver,
        sessions,
        cache,
        _temp_dir: temp_dir,
    }
}

/// Number of requests the server received for `request_path`.
pub async fn request_count(mock_server: &MockServer, request_path: &str) -> usize {
    mock_server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == request_path)
        .count()
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
