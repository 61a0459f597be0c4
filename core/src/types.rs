//! Credentials and token DTOs.

use serde::{Deserialize, Serialize};

/// Application and user credentials held by a `GraphClient`.
///
/// Everything is optional; each operation checks for what it needs and fails
/// with `GraphError::Configuration` otherwise.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub app_id: Option<String>,
    pub secret: Option<String>,
    pub access_token: Option<String>,
    pub redirect_uri: Option<String>,
    /// App namespace used by `GraphClient::publish_action`.
    pub namespace: Option<String>,
}

impl Credentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credentials carrying only an access token.
    pub fn from_access_token(token: impl Into<String>) -> Self {
        Self::new().with_access_token(token)
    }

    pub fn with_app(mut self, app_id: impl Into<String>, secret: impl Into<String>) -> Self {
        self.app_id = Some(app_id.into());
        self.secret = Some(secret.into());
        self
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn with_redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.redirect_uri = Some(redirect_uri.into());
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// The access token, ignoring an empty string.
    pub fn token(&self) -> Option<&str> {
        self.access_token.as_deref().filter(|token| !token.is_empty())
    }
}

/// Access token returned by the token endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResult {
    pub access_token: String,
    /// Lifetime in seconds. App tokens usually have none.
    pub expires: Option<u64>,
    pub token_type: Option<String>,
}
