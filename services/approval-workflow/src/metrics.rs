use prometheus::{IntCounter, IntCounterVec, Opts, Registry};

use covenant_utils::{CovenantError, CovenantResult};

#[derive(Clone)]
pub struct ApprovalMetrics {
    pub requests_created: IntCounter,
    pub escalations: IntCounterVec,
    pub decisions: IntCounterVec,
}

impl ApprovalMetrics {
    pub fn register(registry: &Registry) -> CovenantResult<Self> {
        let map = |e: prometheus::Error| CovenantError::internal(format!("metric registration failed: {}", e));

        let requests_created =
            IntCounter::new("approval_requests_created_total", "Approval requests opened").map_err(map)?;
        let escalations = IntCounterVec::new(
            Opts::new("approvals_escalated_total", "Approval escalations by outcome"),
            &["outcome"],
        )
        .map_err(map)?;
        let decisions = IntCounterVec::new(
            Opts::new("approval_decisions_total", "Human approval decisions"),
            &["decision"],
        )
        .map_err(map)?;

        registry.register(Box::new(requests_created.clone())).map_err(map)?;
        registry.register(Box::new(escalations.clone())).map_err(map)?;
        registry.register(Box::new(decisions.clone())).map_err(map)?;

        Ok(Self {
            requests_created,
            escalations,
            decisions,
        })
    }
}
