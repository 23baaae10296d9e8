//! Application-wide handles shared across every request.

use crate::cache::MemoryCache;
use std::sync::Arc;

#[cfg(feature = "broker")]
use crate::broker::BrokerManager;
#[cfg(feature = "orchestration")]
use crate::orchestration::OrchestrationEngine;

/// Handles to broker manager, orchestration engine, cache and the other
/// process-wide singletons every request's [`super::RequestContext`] is
/// constructed against. Built once at bootstrap and shared by reference.
///
/// `Cache` is not object-safe (its methods are generic over the stored
/// value type), so this holds a concrete [`MemoryCache`] handle rather than
/// a trait object.
pub struct AppContext {
    cache: Arc<MemoryCache>,
    #[cfg(feature = "broker")]
    broker: Option<Arc<BrokerManager>>,
    #[cfg(feature = "orchestration")]
    orchestration: Option<Arc<OrchestrationEngine>>,
}

impl AppContext {
    /// Build an app context with only a cache handle; other managers are
    /// attached via the `with_*` builders.
    pub fn new(cache: Arc<MemoryCache>) -> Self {
        Self {
            cache,
            #[cfg(feature = "broker")]
            broker: None,
            #[cfg(feature = "orchestration")]
            orchestration: None,
        }
    }

    /// Attach a broker manager handle.
    #[cfg(feature = "broker")]
    pub fn with_broker(mut self, broker: Arc<BrokerManager>) -> Self {
        self.broker = Some(broker);
        self
    }

    /// Attach an orchestration engine handle.
    #[cfg(feature = "orchestration")]
    pub fn with_orchestration(mut self, engine: Arc<OrchestrationEngine>) -> Self {
        self.orchestration = Some(engine);
        self
    }

    /// The shared cache handle.
    pub fn cache(&self) -> &Arc<MemoryCache> {
        &self.cache
    }

    /// The broker manager handle, if one was attached.
    #[cfg(feature = "broker")]
    pub fn broker(&self) -> Option<&Arc<BrokerManager>> {
        self.broker.as_ref()
    }

    /// The orchestration engine handle, if one was attached.
    #[cfg(feature = "orchestration")]
    pub fn orchestration(&self) -> Option<&Arc<OrchestrationEngine>> {
        self.orchestration.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;

    #[test]
    fn new_app_context_exposes_cache_handle() {
        let app = AppContext::new(Arc::new(MemoryCache::new()));
        let _ = app.cache();
    }
}
