//! Connection settings for the Satellite server.

use std::fmt;
use std::time::Duration;

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// How to reach and authenticate against the server.
#[derive(Clone)]
pub struct ClientConfig {
    /// Server URL, e.g. `https://satellite.example.com`
    pub base_url: String,
    pub username: String,
    pub password: String,
    /// `None` never times out
    pub timeout: Option<Duration>,
    /// Verify the server's TLS certificate
    pub verify_tls: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            base_url: std::env::var("SATELLITE_URL")
                .unwrap_or_else(|_| "https://localhost".to_string()),
            username: std::env::var("SATELLITE_USER").unwrap_or_else(|_| "admin".to_string()),
            password: std::env::var("SATELLITE_PASSWORD").unwrap_or_default(),
            timeout: Some(DEFAULT_TIMEOUT),
            verify_tls: true,
        }
    }
}

impl ClientConfig {
    /// Config from `SATELLITE_URL`, `SATELLITE_USER` and `SATELLITE_PASSWORD`
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Config for a specific server
    pub fn new(base_url: &str, username: &str, password: &str) -> Self {
        ClientConfig {
            base_url: base_url.to_string(),
            username: username.to_string(),
            password: password.to_string(),
            timeout: Some(DEFAULT_TIMEOUT),
            verify_tls: true,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_verify_tls(mut self, verify_tls: bool) -> Self {
        self.verify_tls = verify_tls;
        self
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("timeout", &self.timeout)
            .field("verify_tls", &self.verify_tls)
            .finish()
    }
}
