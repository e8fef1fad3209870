//! # Credential Resolution
//!
//! Opaque secret-resolution seam consumed by the action runner and the
//! health monitor. Implementations wrap whatever secret store the
//! deployment uses; this crate only depends on the trait.

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;

/// Resolved connection credential
#[derive(Clone)]
pub struct Credential {
    pub username: String,
    pub secret: String,
}

// Manual Debug to keep secret material out of logs
impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Errors from credential resolution
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("Credential '{0}' not found")]
    NotFound(String),

    #[error("Credential backend error: {0}")]
    Backend(String),
}

/// Opaque secret-resolution capability
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    /// Resolve a credential reference to usable material
    async fn resolve(&self, reference: &str) -> Result<Credential, CredentialError>;
}

/// In-memory resolver for embedding and tests
#[derive(Default)]
pub struct StaticCredentialResolver {
    credentials: DashMap<String, Credential>,
}

impl StaticCredentialResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &self,
        reference: impl Into<String>,
        username: impl Into<String>,
        secret: impl Into<String>,
    ) {
        self.credentials.insert(
            reference.into(),
            Credential {
                username: username.into(),
                secret: secret.into(),
            },
        );
    }
}

#[async_trait]
impl CredentialResolver for StaticCredentialResolver {
    async fn resolve(&self, reference: &str) -> Result<Credential, CredentialError> {
        self.credentials
            .get(reference)
            .map(|entry| entry.clone())
            .ok_or_else(|| CredentialError::NotFound(reference.to_string()))
    }
}
