//! Health aggregation, adapted from
//! `resilience::health_check::{HealthStatus, HealthCheckManager}`. Each
//! dependency (model backends, embedding providers, vector index, document
//! store) reports a `HealthStatus`; `/health` rolls them up to the worst one.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: HealthStatus,
    pub message: String,
}

/// Aggregates per-component health into one rolled-up report.
#[derive(Debug, Default)]
pub struct HealthRegistry {
    components: HashMap<String, ComponentHealth>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&mut self, component: &str, status: HealthStatus, message: impl Into<String>) {
        self.components.insert(
            component.to_string(),
            ComponentHealth {
                status,
                message: message.into(),
            },
        );
    }

    /// Worst status across all reported components; `Healthy` if none have
    /// reported yet.
    pub fn overall(&self) -> HealthStatus {
        self.components
            .values()
            .map(|c| c.status)
            .max()
            .unwrap_or(HealthStatus::Healthy)
    }

    pub fn snapshot(&self) -> HashMap<String, ComponentHealth> {
        self.components.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_registry_is_healthy() {
        assert_eq!(HealthRegistry::new().overall(), HealthStatus::Healthy);
    }

    #[test]
    fn overall_is_worst_of_reported_components() {
        let mut registry = HealthRegistry::new();
        registry.report("vector_index", HealthStatus::Healthy, "ok");
        registry.report("gateway", HealthStatus::Degraded, "one backend down");
        assert_eq!(registry.overall(), HealthStatus::Degraded);

        registry.report("document_store", HealthStatus::Unhealthy, "connection refused");
        assert_eq!(registry.overall(), HealthStatus::Unhealthy);
    }
}
