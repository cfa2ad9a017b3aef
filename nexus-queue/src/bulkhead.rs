//! Per-route-class concurrency caps (spec §5): saturation returns
//! `503 SERVICE_BUSY` instead of queueing unbounded work in-process.

use nexus_core::context::RouteClass;
use nexus_core::{NexusError, Result};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

pub struct Bulkhead {
    route_class: RouteClass,
    semaphore: Arc<Semaphore>,
}

impl Bulkhead {
    pub fn new(route_class: RouteClass, max_concurrency: usize) -> Self {
        Self { route_class, semaphore: Arc::new(Semaphore::new(max_concurrency)) }
    }

    /// Acquires a permit without blocking; `Err(ServiceBusy)` when saturated.
    pub fn try_admit(&self) -> Result<BulkheadPermit> {
        self.semaphore
            .clone()
            .try_acquire_owned()
            .map(BulkheadPermit)
            .map_err(|_| NexusError::ServiceBusy { route_class: self.route_class.as_str().to_string() })
    }
}

pub struct BulkheadPermit(OwnedSemaphorePermit);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saturated_bulkhead_rejects_admission() {
        let bulkhead = Bulkhead::new(RouteClass::Run, 1);
        let permit = bulkhead.try_admit().unwrap();
        let err = bulkhead.try_admit().unwrap_err();
        assert_eq!(err.code(), "SERVICE_BUSY");
        drop(permit);
        assert!(bulkhead.try_admit().is_ok());
    }
}
