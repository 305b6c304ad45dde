//! Read-only workflow catalog
//!
//! Workflow definitions are static per service type: fetched from the
//! engine on first use, validated, and cached in an explicit bounded LRU
//! cache owned by the catalog instance. Step metadata lookups serve both
//! the synchronizer and the UI surfaces.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::engine::WorkflowEngine;
use trellis_core::{CoreError, ServiceType, Step, StepId, Workflow};

/// Bounded cache of workflow definitions keyed by service type
pub struct WorkflowCatalog {
    engine: Arc<dyn WorkflowEngine>,
    cache: Mutex<LruCache<ServiceType, Arc<Workflow>>>,
}

impl WorkflowCatalog {
    /// Create a catalog backed by the given engine collaborator
    pub fn new(engine: Arc<dyn WorkflowEngine>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            engine,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Get the workflow for a service type, fetching it on first use
    pub async fn get(&self, service_type: &ServiceType) -> Result<Arc<Workflow>, CoreError> {
        {
            let mut cache = self.cache.lock().await;
            if let Some(workflow) = cache.get(service_type) {
                return Ok(workflow.clone());
            }
        }

        debug!(service_type = %service_type, "Fetching workflow definition");
        let workflow = self.engine.get_workflow(service_type).await?;
        workflow.validate()?;
        let workflow = Arc::new(workflow);

        let mut cache = self.cache.lock().await;
        cache.put(service_type.clone(), workflow.clone());
        Ok(workflow)
    }

    /// Whether a workflow is already cached for a service type
    pub async fn has(&self, service_type: &ServiceType) -> bool {
        self.cache.lock().await.contains(service_type)
    }

    /// Look up one step of a service type's workflow
    pub async fn step(
        &self,
        service_type: &ServiceType,
        step_id: &StepId,
    ) -> Result<Option<Step>, CoreError> {
        let workflow = self.get(service_type).await?;
        Ok(workflow.step(step_id).cloned())
    }
}
