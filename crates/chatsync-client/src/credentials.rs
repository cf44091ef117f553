//! Credential sources for the push connection.

use async_trait::async_trait;
use thiserror::Error;

/// Credential lookup failed. Treated as "no token": the connection still
/// opens, without the parameter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("credential lookup failed: {0}")]
pub struct CredentialError(pub String);

/// Async token source, resolved before every socket open.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Current token, or `None` when there is none.
    async fn token(&self) -> Result<Option<String>, CredentialError>;
}

/// A fixed token.
#[derive(Debug, Clone, Default)]
pub struct StaticToken(Option<String>);

impl StaticToken {
    /// Provider that always yields `token`.
    pub fn new(token: impl Into<String>) -> Self {
        Self(Some(token.into()))
    }

    /// Provider that always yields no token.
    pub fn none() -> Self {
        Self(None)
    }
}

#[async_trait]
impl CredentialProvider for StaticToken {
    async fn token(&self) -> Result<Option<String>, CredentialError> {
        Ok(self.0.clone())
    }
}
