//! Service endpoint projector
//!
//! Endpoints are derived purely from selector matches over the live resource
//! set; ownership is irrelevant here.

use super::{Action, Reconciler};
use crate::error::ControllerError;
use crate::metrics::{RESULT_FAILED, RESULT_SUCCESS};
use crate::retry::retry_transient;
use crds::{LabelSelector, Resource, Service, ServiceStatus};
use tracing::{debug, error, info};

const SERVICE_KIND: &str = "Service";

/// Names of the resources in `namespace` whose labels match `selector`, sorted.
pub fn compute_endpoints(selector: &LabelSelector, namespace: &str, resources: &[Resource]) -> Vec<String> {
    let mut endpoints: Vec<String> = resources
        .iter()
        .filter(|r| r.namespace == namespace && r.matches(selector))
        .map(|r| r.name.clone())
        .collect();
    endpoints.sort();
    endpoints.dedup();
    endpoints
}

impl Reconciler {
    pub async fn reconcile_service(&self, service: &Service) -> Result<Action, ControllerError> {
        let name = service.name();
        let namespace = service.namespace_or_default();

        debug!("Reconciling Service {}/{}", namespace, name);

        if let Err(e) = service.validate() {
            error!("Service {}/{} is invalid: {}", namespace, name, e);
            self.metrics.record_reconciliation(SERVICE_KIND, RESULT_FAILED);
            // Nothing to do until the spec changes
            return Ok(Action::await_change());
        }

        let resources = self.store.list_resources(Some(&namespace), None).await?;
        let endpoints = compute_endpoints(&service.spec.selector, &namespace, &resources);
        self.metrics
            .set_service_endpoints(&namespace, &name, endpoints.len());

        let status = ServiceStatus {
            endpoints,
            observed_generation: service.metadata.generation,
        };

        if service.status.as_ref() == Some(&status) {
            debug!("Service {}/{} endpoints unchanged", namespace, name);
        } else {
            info!(
                "Service {}/{} endpoints: [{}]",
                namespace,
                name,
                status.endpoints.join(", ")
            );
            let store = self.store();
            let (ns, svc) = (namespace.as_str(), name.as_str());
            let desired = &status;
            retry_transient(&self.retry, "update_service_status", move || {
                let status = desired.clone();
                async move { store.update_service_status(ns, svc, status).await }
            })
            .await?;
        }

        self.metrics.record_reconciliation(SERVICE_KIND, RESULT_SUCCESS);
        Ok(Action::await_change())
    }
}
