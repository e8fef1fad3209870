//! # Managed Targets
//!
//! Target identity, network address, and communication methods as supplied
//! by the target registry. The registry is read-only from the
//! orchestrator's perspective; this crate only consumes it.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::repository::RepositoryResult;

/// Deployment environment class of a target
///
/// Drives per-environment health probe cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetEnvironment {
    Production,
    Staging,
    Development,
    Test,
}

impl fmt::Display for TargetEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Production => write!(f, "production"),
            Self::Staging => write!(f, "staging"),
            Self::Development => write!(f, "development"),
            Self::Test => write!(f, "test"),
        }
    }
}

impl std::str::FromStr for TargetEnvironment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "production" => Ok(Self::Production),
            "staging" => Ok(Self::Staging),
            "development" => Ok(Self::Development),
            "test" => Ok(Self::Test),
            _ => Err(format!("Invalid target environment: {s}")),
        }
    }
}

/// Protocol family of a communication method
///
/// Connection executors register against one of these variants, so
/// protocol dispatch is checked at compile time instead of comparing
/// method-type strings at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolKind {
    /// Remote shell over SSH
    Ssh,
    /// Windows remote management
    WinRm,
    /// Local process execution on the orchestrator host
    Local,
}

impl fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ssh => write!(f, "ssh"),
            Self::WinRm => write!(f, "winrm"),
            Self::Local => write!(f, "local"),
        }
    }
}

/// One way of reaching a target: protocol, port, and credential reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommunicationMethod {
    pub protocol: ProtocolKind,
    pub port: u16,
    /// Opaque reference resolved through the credential resolver
    pub credential_ref: String,
}

impl CommunicationMethod {
    pub fn new(protocol: ProtocolKind, port: u16, credential_ref: impl Into<String>) -> Self {
        Self {
            protocol,
            port,
            credential_ref: credential_ref.into(),
        }
    }
}

/// A managed remote target (server or network device)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    pub target_id: Uuid,
    pub name: String,
    pub address: String,
    pub environment: TargetEnvironment,
    /// Ordered by preference; the first method with a registered executor wins
    pub communication_methods: Vec<CommunicationMethod>,
}

impl Target {
    pub fn new(
        name: impl Into<String>,
        address: impl Into<String>,
        environment: TargetEnvironment,
        communication_methods: Vec<CommunicationMethod>,
    ) -> Self {
        Self {
            target_id: Uuid::new_v4(),
            name: name.into(),
            address: address.into(),
            environment,
            communication_methods,
        }
    }
}

/// Read-only view of the target registry collaborator
#[async_trait]
pub trait TargetRegistry: Send + Sync {
    /// Look up one target by id
    async fn fetch_target(&self, target_id: Uuid) -> RepositoryResult<Option<Target>>;

    /// List every registered target (used by the health monitor)
    async fn list_targets(&self) -> RepositoryResult<Vec<Target>>;
}

/// In-memory target registry for embedding and tests
#[derive(Debug, Default)]
pub struct StaticTargetRegistry {
    targets: DashMap<Uuid, Target>,
}

impl StaticTargetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a target, replacing any previous entry with the same id
    pub fn register(&self, target: Target) {
        self.targets.insert(target.target_id, target);
    }

    pub fn remove(&self, target_id: Uuid) -> bool {
        self.targets.remove(&target_id).is_some()
    }
}

#[async_trait]
impl TargetRegistry for StaticTargetRegistry {
    async fn fetch_target(&self, target_id: Uuid) -> RepositoryResult<Option<Target>> {
        Ok(self.targets.get(&target_id).map(|entry| entry.clone()))
    }

    async fn list_targets(&self) -> RepositoryResult<Vec<Target>> {
        Ok(self
            .targets
            .iter()
            .map(|entry| entry.value().clone())
            .collect())
    }
}
