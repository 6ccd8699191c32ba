//! Session authentication.
//!
//! A session is obtained from `openml.authenticate` and is valid until the
//! server-provided `valid_until`. Validity is judged on the client clock only;
//! the server is never asked whether a session is still alive.
//!
//! `valid_until` is interpreted as UTC. The server also reports its timezone,
//! which is kept for information but not applied.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use reqwest::Method;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::{ClientConfig, MAX_SESSION_REFRESH_BUFFER_SECS};
use crate::error::{OpenMlError, OpenMlResult};
use crate::payload::parse_server_error;
use crate::payload::tree::Element;
use crate::transport::{RequestParams, Transport};

const VALID_UNTIL_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// An authenticated session.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    /// `session_hash` attached to every call.
    pub credential_token: String,
    pub valid_until: DateTime<Utc>,
    /// Server timezone, informational.
    pub timezone: String,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("credential_token", &"[REDACTED]")
            .field("valid_until", &self.valid_until)
            .field("timezone", &self.timezone)
            .finish()
    }
}

impl Session {
    /// Parse an `<oml:authenticate>` response.
    pub fn from_xml(bytes: &[u8]) -> OpenMlResult<Self> {
        let root = Element::parse_root(bytes, "authenticate")?;
        let valid_until: String = root.require("valid_until")?;
        Ok(Self {
            credential_token: root.require("session_hash")?,
            valid_until: parse_valid_until(&valid_until)?,
            timezone: root.optional("timezone").unwrap_or_default(),
        })
    }

    /// `now + buffer < valid_until`. A negative buffer counts as zero and a
    /// buffer past chrono's range counts as expired.
    pub fn is_valid_at(&self, now: DateTime<Utc>, buffer_secs: i64) -> bool {
        Duration::try_seconds(buffer_secs.max(0))
            .and_then(|buffer| now.checked_add_signed(buffer))
            .is_some_and(|deadline| deadline < self.valid_until)
    }

    pub fn is_valid(&self, buffer_secs: i64) -> bool {
        self.is_valid_at(Utc::now(), buffer_secs)
    }
}

fn parse_valid_until(value: &str) -> OpenMlResult<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, VALID_UNTIL_FORMAT)
        .map(|naive| Utc.from_utc_datetime(&naive))
        .map_err(|e| {
            OpenMlError::invalid_response(format!("invalid valid_until {:?}: {}", value, e))
        })
}

/// Account credentials.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Lowercase hex MD5 of the password, as `openml.authenticate` expects.
    pub fn password_hash(&self) -> String {
        format!("{:x}", md5::compute(self.password.as_bytes()))
    }
}

/// Owns the current session and re-authenticates on demand.
///
/// Cloning shares state. Reads go through an `RwLock`; authentication is
/// serialized by a `Mutex` and re-checked after it is acquired, so concurrent
/// callers that find an expired session trigger a single authentication call.
#[derive(Debug, Clone)]
pub struct SessionManager {
    transport: Arc<dyn Transport>,
    auth_url: String,
    credentials: Arc<RwLock<Option<Credentials>>>,
    session: Arc<RwLock<Option<Session>>>,
    refresh_lock: Arc<Mutex<()>>,
    refresh_buffer_secs: i64,
}

impl SessionManager {
    pub fn new(
        transport: Arc<dyn Transport>,
        base_url: &str,
        credentials: Option<Credentials>,
        refresh_buffer_secs: i64,
    ) -> Self {
        Self {
            transport,
            auth_url: format!("{}/openml.authenticate", base_url.trim_end_matches('/')),
            credentials: Arc::new(RwLock::new(credentials)),
            session: Arc::new(RwLock::new(None)),
            refresh_lock: Arc::new(Mutex::new(())),
            refresh_buffer_secs: refresh_buffer_secs.clamp(0, MAX_SESSION_REFRESH_BUFFER_SECS),
        }
    }

    pub fn from_config(config: &ClientConfig, transport: Arc<dyn Transport>) -> Self {
        let credentials = match (&config.username, &config.password) {
            (Some(user), Some(pass)) => Some(Credentials::new(user.clone(), pass.clone())),
            _ => None,
        };
        Self::new(
            transport,
            config.base_url(),
            credentials,
            config.session_refresh_buffer_secs,
        )
    }

    /// Authenticate with explicit credentials.
    ///
    /// Issues exactly one call. On success the credentials are kept for later
    /// re-authentication and the session replaces the current one.
    pub async fn authenticate(
        &self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> OpenMlResult<Session> {
        let credentials = Credentials::new(username, password);
        let _guard = self.refresh_lock.lock().await;

        let session = self.request_session(&credentials).await?;
        *self.credentials.write().await = Some(credentials);
        Ok(session)
    }

    /// Return a session that is valid now, authenticating if needed.
    pub async fn ensure_session(&self) -> OpenMlResult<Session> {
        if let Some(session) = self.valid_session().await {
            return Ok(session);
        }

        let _guard = self.refresh_lock.lock().await;

        // Another caller may have authenticated while we waited.
        if let Some(session) = self.valid_session().await {
            debug!("session already refreshed by a concurrent caller");
            return Ok(session);
        }

        let credentials =
            self.credentials
                .read()
                .await
                .clone()
                .ok_or_else(|| OpenMlError::Authentication {
                    status: None,
                    message: "no credentials configured".to_string(),
                })?;

        if self.session.read().await.is_some() {
            warn!("session expired; re-authenticating");
        } else {
            debug!("no session yet; authenticating");
        }

        self.request_session(&credentials).await
    }

    /// Current session, valid or not.
    pub async fn current(&self) -> Option<Session> {
        self.session.read().await.clone()
    }

    /// Install a known session (e.g. one restored by the caller).
    pub async fn restore(&self, session: Session) {
        *self.session.write().await = Some(session);
    }

    /// Drop the current session; the next `ensure_session` authenticates.
    pub async fn invalidate(&self) {
        *self.session.write().await = None;
    }

    pub async fn has_credentials(&self) -> bool {
        self.credentials.read().await.is_some()
    }

    async fn valid_session(&self) -> Option<Session> {
        self.session
            .read()
            .await
            .as_ref()
            .filter(|s| s.is_valid(self.refresh_buffer_secs))
            .cloned()
    }

    /// One authentication call. Caller holds `refresh_lock`.
    async fn request_session(&self, credentials: &Credentials) -> OpenMlResult<Session> {
        let params = RequestParams::new()
            .with_form("username", credentials.username.clone())
            .with_form("password", credentials.password_hash());

        let response = self
            .transport
            .perform_request(Method::POST, &self.auth_url, &params)
            .await?;

        if !response.is_success() {
            let message = parse_server_error(&response.body)
                .map(|e| e.message)
                .unwrap_or_else(|| response.text().chars().take(200).collect());
            warn!(status = response.status, user = %credentials.username, "authentication rejected");
            return Err(OpenMlError::Authentication {
                status: Some(response.status),
                message,
            });
        }

        let session = Session::from_xml(&response.body)?;
        if !session.is_valid(self.refresh_buffer_secs) {
            return Err(OpenMlError::Authentication {
                status: Some(response.status),
                message: format!("server issued a session that expired at {}", session.valid_until),
            });
        }

        *self.session.write().await = Some(session.clone());
        info!(
            user = %credentials.username,
            valid_until = %session.valid_until,
            timezone = %session.timezone,
            "authenticated"
        );
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ReqwestTransport;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn auth_body(hash: &str, valid_until: DateTime<Utc>) -> String {
        format!(
            r#"<oml:authenticate xmlns:oml="http://openml.org/openml">
                <oml:session_hash>{}</oml:session_hash>
                <oml:valid_until>{}</oml:valid_until>
                <oml:timezone>Europe/Berlin</oml:timezone>
            </oml:authenticate>"#,
            hash,
            valid_until.format(VALID_UNTIL_FORMAT)
        )
    }

    fn manager(mock_server: &MockServer, credentials: Option<Credentials>) -> SessionManager {
        let transport = Arc::new(ReqwestTransport::new(5).unwrap());
        SessionManager::new(transport, &mock_server.uri(), credentials, 0)
    }

    #[test]
    fn test_parse_session() {
        let body = auth_body("G9MPPN114ZCZNWW2VN3JE9VF1FMV8Y5FXHUDUL4P", Utc::now());
        let session = Session::from_xml(body.as_bytes()).unwrap();
        assert_eq!(
            session.credential_token,
            "G9MPPN114ZCZNWW2VN3JE9VF1FMV8Y5FXHUDUL4P"
        );
        assert_eq!(session.timezone, "Europe/Berlin");
    }

    #[test]
    fn test_parse_valid_until_formats() {
        let naive = parse_valid_until("2017-08-13 20:01:29").unwrap();
        let rfc = parse_valid_until("2017-08-13T20:01:29Z").unwrap();
        assert_eq!(naive, rfc);
        assert!(parse_valid_until("tomorrow").is_err());
    }

    #[test]
    fn test_validity_window() {
        let now = Utc::now();
        let session = Session {
            credential_token: "t".into(),
            valid_until: now + Duration::seconds(30),
            timezone: String::new(),
        };
        assert!(session.is_valid_at(now, 0));
        assert!(!session.is_valid_at(now, 60));
        assert!(!session.is_valid_at(now + Duration::seconds(30), 0));
    }

    #[test]
    fn test_validity_with_out_of_range_buffer() {
        let now = Utc::now();
        let expired = Session {
            credential_token: "t".into(),
            valid_until: now - Duration::minutes(30),
            timezone: String::new(),
        };
        assert!(!expired.is_valid_at(now, -3600));
        assert!(!expired.is_valid_at(now, i64::MIN));

        let fresh = Session {
            valid_until: now + Duration::hours(1),
            ..expired
        };
        assert!(!fresh.is_valid_at(now, 10_000_000_000_000_000));
        assert!(!fresh.is_valid_at(now, i64::MAX));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let session = Session {
            credential_token: "G9MPPN114Z".into(),
            valid_until: Utc::now(),
            timezone: String::new(),
        };
        let creds = Credentials::new("alice", "hunter2");
        assert!(!format!("{:?}", session).contains("G9MPPN114Z"));
        assert!(!format!("{:?}", creds).contains("hunter2"));
    }

    #[test]
    fn test_password_hash_is_md5_hex() {
        let creds = Credentials::new("alice", "password");
        assert_eq!(creds.password_hash(), "5f4dcc3b5aa765d61d8327deb882cf99");
    }

    #[tokio::test]
    async fn test_authenticate_stores_session() {
        let mock_server = MockServer::start().await;
        let valid_until = Utc::now() + Duration::hours(1);

        Mock::given(method("POST"))
            .and(path("/openml.authenticate"))
            .and(body_string_contains("username=Bla"))
            .and(body_string_contains(
                Credentials::new("Bla", "Blub").password_hash().as_str(),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_string(auth_body("HASH", valid_until)))
            .expect(1)
            .mount(&mock_server)
            .await;

        let sessions = manager(&mock_server, None);
        let session = sessions.authenticate("Bla", "Blub").await.unwrap();
        assert_eq!(session.credential_token, "HASH");
        assert_eq!(sessions.current().await, Some(session));
        assert!(sessions.has_credentials().await);
    }

    #[tokio::test]
    async fn test_authenticate_rejected() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/openml.authenticate"))
            .respond_with(ResponseTemplate::new(412).set_body_string(
                "<oml:error><oml:code>252</oml:code><oml:message>Authentication failed</oml:message></oml:error>",
            ))
            .expect(1)
            .mount(&mock_server)
            .await;

        let sessions = manager(&mock_server, None);
        let err = sessions.authenticate("alice", "wrong").await.unwrap_err();
        match err {
            OpenMlError::Authentication { status, message } => {
                assert_eq!(status, Some(412));
                assert_eq!(message, "Authentication failed");
            }
            other => panic!("expected Authentication, got {:?}", other),
        }
        assert!(sessions.current().await.is_none());
        assert!(!sessions.has_credentials().await);
    }

    #[tokio::test]
    async fn test_ensure_session_without_credentials() {
        let mock_server = MockServer::start().await;
        let sessions = manager(&mock_server, None);

        let err = sessions.ensure_session().await.unwrap_err();
        assert!(matches!(err, OpenMlError::Authentication { status: None, .. }));
        assert!(mock_server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ensure_session_reuses_valid_session() {
        let mock_server = MockServer::start().await;
        let sessions = manager(&mock_server, Some(Credentials::new("alice", "pw")));
        sessions
            .restore(Session {
                credential_token: "KEEP".into(),
                valid_until: Utc::now() + Duration::hours(1),
                timezone: String::new(),
            })
            .await;

        let session = sessions.ensure_session().await.unwrap();
        assert_eq!(session.credential_token, "KEEP");
        assert!(mock_server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_negative_buffer_still_refreshes_expired_session() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/openml.authenticate"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(auth_body("NEW", Utc::now() + Duration::hours(1))),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let transport = Arc::new(ReqwestTransport::new(5).unwrap());
        let sessions = SessionManager::new(
            transport,
            &mock_server.uri(),
            Some(Credentials::new("alice", "pw")),
            -3600,
        );
        sessions
            .restore(Session {
                credential_token: "OLD".into(),
                valid_until: Utc::now() - Duration::minutes(30),
                timezone: String::new(),
            })
            .await;

        let session = sessions.ensure_session().await.unwrap();
        assert_eq!(session.credential_token, "NEW");
        assert!(session.valid_until > Utc::now());
    }

    #[tokio::test]
    async fn test_huge_buffer_is_clamped() {
        let mock_server = MockServer::start().await;
        let transport = Arc::new(ReqwestTransport::new(5).unwrap());
        let sessions = SessionManager::new(
            transport,
            &mock_server.uri(),
            Some(Credentials::new("alice", "pw")),
            10_000_000_000_000_000,
        );
        sessions
            .restore(Session {
                credential_token: "KEEP".into(),
                valid_until: Utc::now() + Duration::days(2),
                timezone: String::new(),
            })
            .await;

        let session = sessions.ensure_session().await.unwrap();
        assert_eq!(session.credential_token, "KEEP");
        assert!(mock_server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_expired_session_from_server_is_rejected() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/openml.authenticate"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(auth_body("OLD", Utc::now() - Duration::hours(1))),
            )
            .mount(&mock_server)
            .await;

        let sessions = manager(&mock_server, Some(Credentials::new("alice", "pw")));
        let err = sessions.ensure_session().await.unwrap_err();
        assert!(matches!(err, OpenMlError::Authentication { .. }));
        assert!(sessions.current().await.is_none());
    }
}
