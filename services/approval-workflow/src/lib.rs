//! Covenant Approval Workflow
//!
//! Routes validation exceptions that need a human decision through an
//! amount-tiered approval ladder. Requests escalate to the next tier when
//! their deadline passes; a request that outgrows the top tier stays
//! `Escalated` until someone decides it manually.

pub mod levels;
pub mod metrics;
pub mod scheduler;
pub mod service;
pub mod state_machine;

pub use levels::{default_ladder, load_levels_file, next_level, parse_levels, select_level};
pub use metrics::ApprovalMetrics;
pub use scheduler::{EscalationScheduler, SchedulerHandle};
pub use service::ApprovalService;
pub use state_machine::{apply, escalate_if_overdue, ApprovalEvent, EscalationOutcome};

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use covenant_models::{ApprovalDecision, ApprovalHistory, ApprovalLevel, InvoiceApprovalRequest};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct DecisionRequest {
    pub decision: ApprovalDecision,
    #[serde(default)]
    #[validate(length(max = 2000))]
    pub comments: String,
    #[validate(length(min = 1, max = 500))]
    pub rejection_reason: Option<String>,
    pub actor_id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApprovalView {
    pub request: InvoiceApprovalRequest,
    pub level: Option<ApprovalLevel>,
    pub history: Vec<ApprovalHistory>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub examined: usize,
    pub releveled: usize,
    pub exhausted: usize,
    pub failed: usize,
}

impl SweepReport {
    pub fn escalated(&self) -> usize {
        self.releveled + self.exhausted
    }
}
