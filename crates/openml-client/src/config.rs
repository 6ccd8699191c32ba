//! Client configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{OpenMlError, OpenMlResult};

/// Largest accepted session refresh buffer (one day).
pub const MAX_SESSION_REFRESH_BUFFER_SECS: i64 = 86_400;

/// Client configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the REST API.
    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// Account name used for `openml.authenticate`.
    #[serde(default)]
    pub username: Option<String>,

    /// Clear-text password; hashed before it leaves the process.
    #[serde(default, skip_serializing)]
    pub password: Option<String>,

    /// Cache root. `None` resolves to `~/.openml/cache`.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Treat a session as expired this many seconds before `valid_until`.
    /// Must lie in `0..=MAX_SESSION_REFRESH_BUFFER_SECS`.
    #[serde(default)]
    pub session_refresh_buffer_secs: i64,

    /// Upper bound on concurrent downloads in batch operations.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_downloads: usize,

    /// Compare data files against the description's `md5_checksum`.
    #[serde(default)]
    pub verify_checksums: bool,
}

fn default_server_url() -> String {
    "https://www.openml.org/api/v1".to_string()
}

fn default_timeout() -> u64 {
    60
}

fn default_max_concurrent() -> usize {
    4
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            username: None,
            password: None,
            cache_dir: None,
            timeout_secs: default_timeout(),
            session_refresh_buffer_secs: 0,
            max_concurrent_downloads: default_max_concurrent(),
            verify_checksums: false,
        }
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("server_url", &self.server_url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("cache_dir", &self.cache_dir)
            .field("timeout_secs", &self.timeout_secs)
            .field(
                "session_refresh_buffer_secs",
                &self.session_refresh_buffer_secs,
            )
            .field("max_concurrent_downloads", &self.max_concurrent_downloads)
            .field("verify_checksums", &self.verify_checksums)
            .finish()
    }
}

impl ClientConfig {
    /// Create config from environment variables.
    ///
    /// | Variable | Description |
    /// |----------|-------------|
    /// | `OPENML_SERVER` | API base URL |
    /// | `OPENML_USERNAME` | Account name |
    /// | `OPENML_PASSWORD` | Account password |
    /// | `OPENML_CACHE_DIR` | Cache root |
    /// | `OPENML_TIMEOUT` | Request timeout in seconds |
    /// | `OPENML_SESSION_BUFFER` | Session refresh buffer in seconds |
    /// | `OPENML_MAX_CONCURRENT` | Batch download concurrency |
    /// | `OPENML_VERIFY_CHECKSUMS` | Verify data file MD5 (`1`/`true`) |
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            server_url: std::env::var("OPENML_SERVER").unwrap_or(defaults.server_url),
            username: non_empty_var("OPENML_USERNAME"),
            password: non_empty_var("OPENML_PASSWORD"),
            cache_dir: non_empty_var("OPENML_CACHE_DIR").map(PathBuf::from),
            timeout_secs: parsed_var("OPENML_TIMEOUT").unwrap_or(defaults.timeout_secs),
            session_refresh_buffer_secs: parsed_var("OPENML_SESSION_BUFFER")
                .unwrap_or(defaults.session_refresh_buffer_secs),
            max_concurrent_downloads: parsed_var("OPENML_MAX_CONCURRENT")
                .unwrap_or(defaults.max_concurrent_downloads),
            verify_checksums: std::env::var("OPENML_VERIFY_CHECKSUMS")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        }
    }

    /// Set the API base URL.
    pub fn with_server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = url.into();
        self
    }

    /// Set account credentials.
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Set the cache root.
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_max_concurrent_downloads(mut self, n: usize) -> Self {
        self.max_concurrent_downloads = n;
        self
    }

    pub fn with_verify_checksums(mut self, verify: bool) -> Self {
        self.verify_checksums = verify;
        self
    }

    /// Base URL without trailing slash.
    pub fn base_url(&self) -> &str {
        self.server_url.trim_end_matches('/')
    }

    /// Resolved cache root.
    pub fn resolved_cache_dir(&self) -> OpenMlResult<PathBuf> {
        if let Some(dir) = &self.cache_dir {
            return Ok(dir.clone());
        }
        let home = dirs::home_dir().ok_or_else(|| OpenMlError::Config {
            message: "could not determine home directory for the cache".to_string(),
        })?;
        Ok(home.join(".openml").join("cache"))
    }

    /// Reject settings the client cannot work with.
    pub fn validate(&self) -> OpenMlResult<()> {
        let url = self.base_url();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(OpenMlError::Config {
                message: format!("server url must be http(s): {}", self.server_url),
            });
        }
        if self.username.is_some() != self.password.is_some() {
            return Err(OpenMlError::Config {
                message: "username and password must be set together".to_string(),
            });
        }
        if !(0..=MAX_SESSION_REFRESH_BUFFER_SECS).contains(&self.session_refresh_buffer_secs) {
            return Err(OpenMlError::Config {
                message: format!(
                    "session_refresh_buffer_secs must be between 0 and {}: {}",
                    MAX_SESSION_REFRESH_BUFFER_SECS, self.session_refresh_buffer_secs
                ),
            });
        }
        if self.max_concurrent_downloads == 0 {
            return Err(OpenMlError::Config {
                message: "max_concurrent_downloads must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn parsed_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}
