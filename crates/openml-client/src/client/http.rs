//! HTTP layer: session attachment and status mapping.
//!
//! This is the ONLY place for status code handling. client/mod.rs never
//! interprets status codes.

use std::sync::Arc;

use reqwest::Method;
use tracing::debug;

use crate::auth::SessionManager;
use crate::error::{OpenMlError, OpenMlResult};
use crate::payload::parse_server_error;
use crate::transport::{ApiResponse, RequestParams, Transport};

use super::helpers::{body_excerpt, same_origin};

/// OpenML error codes meaning "this entity does not exist".
const UNKNOWN_ENTITY_CODES: &[u32] = &[111, 151, 271, 361];

/// What a request is about; decides whether a failure can be `NotFound`.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Target {
    Entity { resource: &'static str, id: u64 },
    Listing,
    Upload,
}

/// HTTP backend (holds transport, session manager, base URL).
#[derive(Debug, Clone)]
pub(crate) struct HttpBackend {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) sessions: SessionManager,
    pub(crate) base_url: String,
}

impl HttpBackend {
    /// GET with a valid session. The `session_hash` query is only attached
    /// when `url` shares the API server's origin.
    pub(crate) async fn get(&self, url: &str, target: Target) -> OpenMlResult<ApiResponse> {
        let session = self.sessions.ensure_session().await?;
        let params = if same_origin(url, &self.base_url) {
            RequestParams::new().with_query("session_hash", session.credential_token)
        } else {
            debug!(url, "foreign host, sending without session_hash");
            RequestParams::new()
        };
        self.send(Method::GET, url, params, target).await
    }

    pub(crate) async fn post(
        &self,
        url: &str,
        params: RequestParams,
        target: Target,
    ) -> OpenMlResult<ApiResponse> {
        let session = self.sessions.ensure_session().await?;
        let params = params.with_form("session_hash", session.credential_token);
        self.send(Method::POST, url, params, target).await
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        params: RequestParams,
        target: Target,
    ) -> OpenMlResult<ApiResponse> {
        debug!(%method, url, "sending request");
        let response = self.transport.perform_request(method, url, &params).await?;
        map_status(response, target)
    }
}

pub(crate) fn map_status(response: ApiResponse, target: Target) -> OpenMlResult<ApiResponse> {
    if response.is_success() {
        return Ok(response);
    }

    let status = response.status;
    let (code, message) = match parse_server_error(&response.body) {
        Some(server) => (server.code, server.message),
        None => (None, body_excerpt(&response.body)),
    };

    let unknown_entity = status == 404
        || (status == 412 && code.is_some_and(|c| UNKNOWN_ENTITY_CODES.contains(&c)));

    match (status, target) {
        (401 | 403, _) => Err(OpenMlError::Authentication {
            status: Some(status),
            message,
        }),
        (_, Target::Entity { resource, id }) if unknown_entity => {
            Err(OpenMlError::not_found(resource, id))
        }
        _ => Err(OpenMlError::Api {
            status,
            code,
            message,
        }),
    }
}
