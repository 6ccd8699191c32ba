//! Transport primitive: one request in, status and body out.
//!
//! Nothing above this layer opens sockets. Status codes are returned as-is;
//! interpretation happens in `client/http.rs`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::multipart::{Form, Part};
use reqwest::Method;
use tracing::debug;

use crate::error::{OpenMlError, OpenMlResult};

/// User agent for API requests.
pub const CLIENT_USER_AGENT: &str = concat!("openml-client/", env!("CARGO_PKG_VERSION"));

/// Request parameters.
///
/// `form` and `parts` are only sent for POST; a non-empty `parts` turns the
/// body into `multipart/form-data` carrying the form fields as text parts.
#[derive(Debug, Clone, Default)]
pub struct RequestParams {
    pub query: Vec<(String, String)>,
    pub form: Vec<(String, String)>,
    pub parts: Vec<FilePart>,
}

impl RequestParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn with_form(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.form.push((key.into(), value.into()));
        self
    }

    pub fn with_part(mut self, part: FilePart) -> Self {
        self.parts.push(part);
        self
    }

    /// Value of a form field, if set.
    pub fn form_value(&self, key: &str) -> Option<&str> {
        self.form
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// A file uploaded as one multipart part.
#[derive(Debug, Clone)]
pub struct FilePart {
    /// Form field name.
    pub name: String,
    /// File name reported to the server.
    pub file_name: String,
    pub content: Vec<u8>,
}

impl FilePart {
    pub fn new(
        name: impl Into<String>,
        file_name: impl Into<String>,
        content: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            name: name.into(),
            file_name: file_name.into(),
            content: content.into(),
        }
    }
}

/// Raw response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body as text (lossy).
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// The single network primitive used by the client.
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    async fn perform_request(
        &self,
        method: Method,
        url: &str,
        params: &RequestParams,
    ) -> OpenMlResult<ApiResponse>;
}

/// `reqwest`-backed transport.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout_secs: u64) -> OpenMlResult<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .default_headers(default_headers)
            .build()
            .map_err(|e| OpenMlError::Network {
                message: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn perform_request(
        &self,
        method: Method,
        url: &str,
        params: &RequestParams,
    ) -> OpenMlResult<ApiResponse> {
        let is_post = method == Method::POST;
        let mut request = self.client.request(method, url);

        if !params.query.is_empty() {
            request = request.query(&params.query);
        }

        if is_post && !params.parts.is_empty() {
            let mut form = Form::new();
            for (key, value) in &params.form {
                form = form.text(key.clone(), value.clone());
            }
            for part in &params.parts {
                form = form.part(
                    part.name.clone(),
                    Part::bytes(part.content.clone()).file_name(part.file_name.clone()),
                );
            }
            request = request.multipart(form);
        } else if is_post && !params.form.is_empty() {
            request = request.form(&params.form);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(|e| OpenMlError::Network {
            message: format!("failed to read response body: {}", e),
        })?;

        debug!(url, status, bytes = body.len(), "request completed");
        Ok(ApiResponse {
            status,
            body: body.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_get_passes_query_and_returns_raw_status() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/data/1"))
            .and(query_param("session_hash", "abc"))
            .respond_with(ResponseTemplate::new(412).set_body_string("<oml:error/>"))
            .mount(&mock_server)
            .await;

        let transport = ReqwestTransport::new(5).unwrap();
        let params = RequestParams::new().with_query("session_hash", "abc");
        let response = transport
            .perform_request(
                Method::GET,
                &format!("{}/data/1", mock_server.uri()),
                &params,
            )
            .await
            .unwrap();

        assert_eq!(response.status, 412);
        assert!(!response.is_success());
        assert_eq!(response.text(), "<oml:error/>");
    }

    #[tokio::test]
    async fn test_post_form_body() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/openml.authenticate"))
            .and(body_string_contains("username=alice"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let transport = ReqwestTransport::new(5).unwrap();
        let params = RequestParams::new().with_form("username", "alice");
        let response = transport
            .perform_request(
                Method::POST,
                &format!("{}/openml.authenticate", mock_server.uri()),
                &params,
            )
            .await
            .unwrap();

        assert!(response.is_success());
    }

    #[tokio::test]
    async fn test_post_multipart_carries_parts_and_fields() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/data/upload"))
            .and(body_string_contains("name=\"session_hash\""))
            .and(body_string_contains("@relation test"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&mock_server)
            .await;

        let transport = ReqwestTransport::new(5).unwrap();
        let params = RequestParams::new()
            .with_form("session_hash", "abc")
            .with_part(FilePart::new("dataset", "dataset.arff", "@relation test"));
        let response = transport
            .perform_request(
                Method::POST,
                &format!("{}/data/upload", mock_server.uri()),
                &params,
            )
            .await
            .unwrap();

        assert_eq!(response.status, 200);
    }

    #[tokio::test]
    async fn test_connection_failure_is_network_error() {
        let transport = ReqwestTransport::new(1).unwrap();
        let result = transport
            .perform_request(Method::GET, "http://127.0.0.1:1/data/1", &RequestParams::new())
            .await;
        assert!(matches!(result, Err(OpenMlError::Network { .. })));
    }
}
