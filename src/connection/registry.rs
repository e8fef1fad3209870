//! Protocol-keyed executor registry
//!
//! Executors are registered once at startup; method selection walks a
//! target's communication methods in preference order and picks the first
//! protocol with a registered executor.

use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

use super::{ConnectionError, ConnectionExecutor};
use crate::models::{CommunicationMethod, ProtocolKind, Target};

/// Registry of connection executors keyed by protocol
#[derive(Default)]
pub struct ExecutorRegistry {
    executors: DashMap<ProtocolKind, Arc<dyn ConnectionExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an executor for its protocol, replacing any previous one
    pub fn register(&self, executor: Arc<dyn ConnectionExecutor>) {
        let protocol = executor.protocol();
        debug!(protocol = %protocol, "Registering connection executor");
        self.executors.insert(protocol, executor);
    }

    /// Look up the executor for one protocol
    pub fn get(&self, protocol: ProtocolKind) -> Option<Arc<dyn ConnectionExecutor>> {
        self.executors.get(&protocol).map(|entry| entry.clone())
    }

    /// Pick the first communication method of a target with a registered
    /// executor
    pub fn select_method<'a>(
        &self,
        target: &'a Target,
    ) -> Result<(&'a CommunicationMethod, Arc<dyn ConnectionExecutor>), ConnectionError> {
        for method in &target.communication_methods {
            if let Some(executor) = self.get(method.protocol) {
                return Ok((method, executor));
            }
        }
        let wanted = target
            .communication_methods
            .first()
            .map(|method| method.protocol)
            .unwrap_or(ProtocolKind::Ssh);
        Err(ConnectionError::ExecutorNotRegistered(wanted))
    }

    pub fn registered_protocols(&self) -> Vec<ProtocolKind> {
        self.executors.iter().map(|entry| *entry.key()).collect()
    }
}
