//! Process-wide registry of governed dependencies.
//!
//! # Responsibilities
//! - Build one [`Dependency`] per configured class at startup
//! - Hand out shared handles by name
//! - Report snapshots and close every bulkhead on shutdown

use std::sync::Arc;

use dashmap::DashMap;

use crate::config::{DependencyConfig, GovernorConfig};
use crate::governor::dependency::{Dependency, DependencySnapshot};

/// Named dependencies shared by every caller in the process.
#[derive(Debug, Default)]
pub struct DependencyRegistry {
    dependencies: DashMap<String, Arc<Dependency>>,
    /// Used for names requested via [`DependencyRegistry::get_or_create`]
    /// that the configuration does not list.
    fallback: DependencyConfig,
}

impl DependencyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every dependency listed in `config`.
    pub fn from_config(config: &GovernorConfig) -> Self {
        let registry = Self::new();
        for (name, dependency) in &config.dependencies {
            registry.register(name, dependency.clone());
        }
        tracing::info!(count = registry.len(), "Dependency registry built");
        registry
    }

    /// Add or replace a dependency. A replaced dependency keeps serving the
    /// callers that already hold it.
    pub fn register(&self, name: &str, config: DependencyConfig) -> Arc<Dependency> {
        let dependency = Arc::new(Dependency::new(name, config));
        if self
            .dependencies
            .insert(name.to_string(), dependency.clone())
            .is_some()
        {
            tracing::warn!(dependency = %name, "Dependency replaced");
        }
        dependency
    }

    pub fn get(&self, name: &str) -> Option<Arc<Dependency>> {
        self.dependencies.get(name).map(|entry| entry.value().clone())
    }

    /// Look up `name`, creating it with fallback limits if unknown.
    pub fn get_or_create(&self, name: &str) -> Arc<Dependency> {
        if let Some(existing) = self.get(name) {
            return existing;
        }
        self.dependencies
            .entry(name.to_string())
            .or_insert_with(|| {
                tracing::info!(dependency = %name, "Unconfigured dependency, using fallback limits");
                Arc::new(Dependency::new(name, self.fallback.clone()))
            })
            .value()
            .clone()
    }

    pub fn len(&self) -> usize {
        self.dependencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }

    /// Snapshots of every dependency, sorted by name.
    pub fn snapshot(&self) -> Vec<DependencySnapshot> {
        let mut snapshots: Vec<_> = self
            .dependencies
            .iter()
            .map(|entry| entry.value().snapshot())
            .collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }

    /// Close every bulkhead; queued callers fail with `BulkheadClosed`.
    pub fn close_all(&self) {
        for entry in self.dependencies.iter() {
            entry.value().bulkhead().close();
        }
    }
}
