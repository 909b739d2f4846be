//! In-memory registry of monitored services.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use tracing::debug;

use crate::error::{CoreError, CoreResult};
use crate::types::ServiceDescriptor;

/// Keyed store of service descriptors, shared between the daemon and the
/// route layer.
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    services: RwLock<BTreeMap<String, ServiceDescriptor>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service. Fails if the id is already taken.
    pub fn register(&self, service: ServiceDescriptor) -> CoreResult<()> {
        let mut services = self.services.write().unwrap_or_else(PoisonError::into_inner);
        if services.contains_key(&service.id) {
            return Err(CoreError::DuplicateService(service.id));
        }
        debug!(service_id = %service.id, strategy = %service.strategy, "service registered");
        services.insert(service.id.clone(), service);
        Ok(())
    }

    /// Remove a service. Returns whether it was registered.
    pub fn unregister(&self, service_id: &str) -> bool {
        let mut services = self.services.write().unwrap_or_else(PoisonError::into_inner);
        services.remove(service_id).is_some()
    }

    pub fn get(&self, service_id: &str) -> Option<ServiceDescriptor> {
        let services = self.services.read().unwrap_or_else(PoisonError::into_inner);
        services.get(service_id).cloned()
    }

    /// All registered services, ordered by id.
    pub fn list(&self) -> Vec<ServiceDescriptor> {
        let services = self.services.read().unwrap_or_else(PoisonError::into_inner);
        services.values().cloned().collect()
    }

    pub fn contains(&self, service_id: &str) -> bool {
        let services = self.services.read().unwrap_or_else(PoisonError::into_inner);
        services.contains_key(service_id)
    }

    pub fn len(&self) -> usize {
        self.services.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn service(id: &str) -> ServiceDescriptor {
        ServiceDescriptor {
            id: id.to_string(),
            name: id.to_uppercase(),
            url: format!("http://{id}.internal/healthz"),
            strategy: "http".to_string(),
            interval_ms: 30_000,
            timeout_ms: 5_000,
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn register_and_get() {
        let registry = ServiceRegistry::new();
        registry.register(service("api")).unwrap();

        assert!(registry.contains("api"));
        assert_eq!(registry.get("api").unwrap().name, "API");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn duplicate_registration_rejected() {
        let registry = ServiceRegistry::new();
        registry.register(service("api")).unwrap();

        let err = registry.register(service("api")).unwrap_err();
        assert!(matches!(err, CoreError::DuplicateService(id) if id == "api"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn list_is_sorted_by_id() {
        let registry = ServiceRegistry::new();
        registry.register(service("payments")).unwrap();
        registry.register(service("auth")).unwrap();
        registry.register(service("gateway")).unwrap();

        let ids: Vec<_> = registry.list().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["auth", "gateway", "payments"]);
    }

    #[test]
    fn unregister() {
        let registry = ServiceRegistry::new();
        registry.register(service("api")).unwrap();

        assert!(registry.unregister("api"));
        assert!(!registry.unregister("api"));
        assert!(registry.is_empty());
        assert!(registry.get("api").is_none());
    }
}
