use prometheus::{IntCounterVec, Opts, Registry};

use covenant_utils::{CovenantError, CovenantResult};

#[derive(Clone)]
pub struct ReconciliationMetrics {
    pub validations: IntCounterVec,
    pub exceptions: IntCounterVec,
}

impl ReconciliationMetrics {
    pub fn register(registry: &Registry) -> CovenantResult<Self> {
        let map = |e: prometheus::Error| CovenantError::internal(format!("metric registration failed: {}", e));

        let validations = IntCounterVec::new(
            Opts::new("validations_run_total", "Invoice validations by overall status"),
            &["status"],
        )
        .map_err(map)?;
        let exceptions = IntCounterVec::new(
            Opts::new("validation_exceptions_total", "Validation exceptions by type"),
            &["exception_type"],
        )
        .map_err(map)?;

        registry.register(Box::new(validations.clone())).map_err(map)?;
        registry.register(Box::new(exceptions.clone())).map_err(map)?;

        Ok(Self { validations, exceptions })
    }
}
