//! Instance configuration.
//!
//! One `SlimsConfig` describes a single remote LIMS instance: where it
//! lives, how to authenticate, and where this process can be called back.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Username substituted when authenticating with an API token. The remote
/// system treats Basic auth with this literal username as token auth.
pub(crate) const TOKEN_USERNAME: &str = "TOKEN";

/// Configuration for one remote LIMS instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlimsConfig {
    /// Instance name; also the first path segment of webhook URLs.
    pub name: String,
    /// Base URL of the remote system (without the `/rest/` suffix).
    pub url: String,
    /// Service account username (paired with `password`).
    #[serde(default)]
    pub username: Option<String>,
    /// Service account password.
    #[serde(default)]
    pub password: Option<String>,
    /// API token, used instead of username/password.
    #[serde(default)]
    pub token: Option<String>,
    /// Local mount point of the remote attachment repository, if any.
    #[serde(default)]
    pub repo_location: Option<PathBuf>,
    /// Host the remote system should call webhooks on.
    #[serde(default = "default_local_host")]
    pub local_host: String,
    /// Port the remote system should call webhooks on.
    #[serde(default = "default_local_port")]
    pub local_port: u16,
}

fn default_local_host() -> String {
    "localhost".to_string()
}

fn default_local_port() -> u16 {
    5000
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("either a username and password or a token must be configured")]
    MissingCredentials,
    #[error("invalid base URL {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

impl SlimsConfig {
    /// Create a config with defaults for everything but name and URL.
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            username: None,
            password: None,
            token: None,
            repo_location: None,
            local_host: default_local_host(),
            local_port: default_local_port(),
        }
    }

    /// Authenticate with a service account.
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Authenticate with an API token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Set the local mount point of the attachment repository.
    pub fn with_repo_location(mut self, path: impl Into<PathBuf>) -> Self {
        self.repo_location = Some(path.into());
        self
    }

    /// Set the callback host/port announced to the remote system.
    pub fn with_local_address(mut self, host: impl Into<String>, port: u16) -> Self {
        self.local_host = host.into();
        self.local_port = port;
        self
    }

    /// Resolve the Basic auth pair: username/password, or the token with
    /// the fixed token username.
    pub(crate) fn basic_auth(&self) -> Result<(String, String), ConfigError> {
        match (&self.username, &self.password, &self.token) {
            (Some(user), Some(pass), _) => Ok((user.clone(), pass.clone())),
            (_, _, Some(token)) => Ok((TOKEN_USERNAME.to_string(), token.clone())),
            _ => Err(ConfigError::MissingCredentials),
        }
    }

    /// Callback URL announced during flow registration.
    pub fn callback_url(&self) -> String {
        format!("http://{}:{}", self.local_host, self.local_port)
    }
}
