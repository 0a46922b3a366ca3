//! Shutdown coordination for the governor.

use std::sync::Arc;

use crate::governor::DependencyRegistry;
use crate::resilience::Signal;

/// Coordinator for graceful shutdown.
///
/// Owns the process root signal. Long-running work observes it directly or
/// combines it with a per-request signal.
#[derive(Debug, Clone)]
pub struct Shutdown {
    root: Signal,
    registry: Option<Arc<DependencyRegistry>>,
}

impl Shutdown {
    /// Create a coordinator with no registry attached.
    pub fn new() -> Self {
        Self {
            root: Signal::new(),
            registry: None,
        }
    }

    /// Create a coordinator that also closes `registry` on shutdown.
    pub fn with_registry(registry: Arc<DependencyRegistry>) -> Self {
        Self {
            root: Signal::new(),
            registry: Some(registry),
        }
    }

    /// The root signal; fires once shutdown is triggered.
    pub fn subscribe(&self) -> Signal {
        self.root.clone()
    }

    pub fn is_triggered(&self) -> bool {
        self.root.is_cancelled()
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        if self.root.is_cancelled() {
            return;
        }
        tracing::info!("Shutdown triggered");
        self.root.cancel();
        if let Some(registry) = &self.registry {
            registry.close_all();
        }
    }

    /// Wait until shutdown is triggered.
    pub async fn triggered(&self) {
        self.root.cancelled().await;
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GovernorConfig;
    use crate::config::MODEL_DEPENDENCY;

    #[tokio::test]
    async fn test_trigger_cancels_subscribers() {
        let shutdown = Shutdown::new();
        let signal = shutdown.subscribe();
        assert!(!signal.is_cancelled());

        shutdown.trigger();
        shutdown.trigger();

        assert!(signal.is_cancelled());
        assert!(shutdown.is_triggered());
        shutdown.triggered().await;
    }

    #[tokio::test]
    async fn test_trigger_closes_registry() {
        let registry = Arc::new(DependencyRegistry::from_config(&GovernorConfig::default()));
        let shutdown = Shutdown::with_registry(registry.clone());

        shutdown.trigger();

        let model = registry.get(MODEL_DEPENDENCY).unwrap();
        assert!(model.bulkhead().is_closed());
    }
}
