//! Prometheus metrics
//!
//! Each controller instance owns its registry, so tests can build as many as
//! they like without clashing on global registration.

use prometheus::{Encoder, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};

use crate::error::ControllerError;

/// Outcome label values for `reconciliations_total`
pub const RESULT_SUCCESS: &str = "success";
pub const RESULT_ERROR: &str = "error";
pub const RESULT_FAILED: &str = "failed";

pub struct Metrics {
    registry: Registry,
    reconciliations: IntCounterVec,
    owned_resources: IntGaugeVec,
    service_endpoints: IntGaugeVec,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let reconciliations = IntCounterVec::new(
            Opts::new("reconciliations_total", "Reconciliation passes by object kind and outcome"),
            &["kind", "result"],
        )?;
        let owned_resources = IntGaugeVec::new(
            Opts::new(
                "workload_owned_resources",
                "Owned resources that still match the workload selector",
            ),
            &["namespace", "workload"],
        )?;
        let service_endpoints = IntGaugeVec::new(
            Opts::new("service_endpoints", "Resources currently selected by a service"),
            &["namespace", "service"],
        )?;

        registry.register(Box::new(reconciliations.clone()))?;
        registry.register(Box::new(owned_resources.clone()))?;
        registry.register(Box::new(service_endpoints.clone()))?;

        Ok(Self {
            registry,
            reconciliations,
            owned_resources,
            service_endpoints,
        })
    }

    pub fn record_reconciliation(&self, kind: &str, result: &str) {
        self.reconciliations.with_label_values(&[kind, result]).inc();
    }

    pub fn reconciliation_count(&self, kind: &str, result: &str) -> u64 {
        self.reconciliations.with_label_values(&[kind, result]).get()
    }

    pub fn set_owned_resources(&self, namespace: &str, workload: &str, count: usize) {
        self.owned_resources
            .with_label_values(&[namespace, workload])
            .set(i64::try_from(count).unwrap_or(i64::MAX));
    }

    pub fn set_service_endpoints(&self, namespace: &str, service: &str, count: usize) {
        self.service_endpoints
            .with_label_values(&[namespace, service])
            .set(i64::try_from(count).unwrap_or(i64::MAX));
    }

    /// Drop per-object series once the object is gone.
    pub fn forget_workload(&self, namespace: &str, workload: &str) {
        // Missing series is fine
        let _ = self.owned_resources.remove_label_values(&[namespace, workload]);
    }

    pub fn forget_service(&self, namespace: &str, service: &str) {
        let _ = self.service_endpoints.remove_label_values(&[namespace, service]);
    }

    /// Render all series in the Prometheus text exposition format.
    pub fn render(&self) -> Result<String, ControllerError> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| ControllerError::Server(e.to_string()))
    }
}
