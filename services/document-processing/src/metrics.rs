use prometheus::{IntCounter, IntCounterVec, Opts, Registry};

use covenant_utils::{CovenantError, CovenantResult};

#[derive(Clone)]
pub struct PipelineMetrics {
    pub documents_submitted: IntCounterVec,
    pub stage_failures: IntCounterVec,
    pub documents_completed: IntCounter,
}

impl PipelineMetrics {
    pub fn register(registry: &Registry) -> CovenantResult<Self> {
        let map = |e: prometheus::Error| CovenantError::internal(format!("metric registration failed: {}", e));

        let documents_submitted = IntCounterVec::new(
            Opts::new("documents_submitted_total", "Documents accepted at the upload boundary"),
            &["document_type"],
        )
        .map_err(map)?;
        let stage_failures = IntCounterVec::new(
            Opts::new("pipeline_stage_failures_total", "Pipeline stage failures by stage"),
            &["stage"],
        )
        .map_err(map)?;
        let documents_completed = IntCounter::new(
            "documents_completed_total",
            "Documents that reached the completed stage",
        )
        .map_err(map)?;

        registry.register(Box::new(documents_submitted.clone())).map_err(map)?;
        registry.register(Box::new(stage_failures.clone())).map_err(map)?;
        registry.register(Box::new(documents_completed.clone())).map_err(map)?;

        Ok(Self {
            documents_submitted,
            stage_failures,
            documents_completed,
        })
    }
}
