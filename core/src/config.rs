//! Client configuration.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// What the dispatcher does when a request gets no response at all.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportFailurePolicy {
    /// Return `ApiError::Transport`.
    #[default]
    Surface,
    /// Answer with a locally built 404 envelope with an empty body.
    Synthesize,
}

/// HTTP basic credentials.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    #[serde(skip_serializing, default)]
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub base_url: String,
    #[serde(default)]
    pub credentials: Option<Credentials>,
    #[serde(default = "default_ssl_verify")]
    pub ssl_verify: bool,
    #[serde(default)]
    pub transport_failure: TransportFailurePolicy,
}

fn default_ssl_verify() -> bool {
    true
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            credentials: None,
            ssl_verify: true,
            transport_failure: TransportFailurePolicy::default(),
        }
    }

    #[must_use]
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some(Credentials {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    #[must_use]
    pub fn with_ssl_verify(mut self, ssl_verify: bool) -> Self {
        self.ssl_verify = ssl_verify;
        self
    }

    #[must_use]
    pub fn with_transport_failure(mut self, policy: TransportFailurePolicy) -> Self {
        self.transport_failure = policy;
        self
    }

    /// Read `JENKINS_URL`, `JENKINS_USER`, `JENKINS_PASSWORD` and
    /// `JENKINS_SSL_VERIFY` from the environment.
    pub fn from_env() -> Result<Self, ApiError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ApiError> {
        let base_url = lookup("JENKINS_URL")
            .ok_or_else(|| ApiError::Config("JENKINS_URL is not set".to_string()))?;
        let mut config = Self::new(base_url);
        if let Some(username) = lookup("JENKINS_USER") {
            let password = lookup("JENKINS_PASSWORD").unwrap_or_default();
            config = config.with_credentials(username, password);
        }
        if let Some(flag) = lookup("JENKINS_SSL_VERIFY") {
            config.ssl_verify = match flag.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                other => {
                    return Err(ApiError::Config(format!(
                        "JENKINS_SSL_VERIFY must be true or false, got: {other}"
                    )))
                }
            };
        }
        config.validated()
    }

    /// Check the URL scheme and strip a trailing `/`.
    pub fn validated(mut self) -> Result<Self, ApiError> {
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ApiError::Config(format!(
                "URL must start with http:// or https://, got: {}",
                self.base_url
            )));
        }
        let trimmed = self.base_url.trim_end_matches('/').len();
        self.base_url.truncate(trimmed);
        Ok(self)
    }
}
