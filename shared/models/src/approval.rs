//! Approval routing models: configured tiers, per-invoice approval requests
//! and their append-only history.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// An amount-keyed approval authority. `max_amount = None` means unbounded.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
#[validate(schema(function = "validate_level_range"))]
pub struct ApprovalLevel {
    pub id: Uuid,
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(range(min = 0.0))]
    pub min_amount: f64,
    pub max_amount: Option<f64>,
    #[validate(length(min = 1, max = 100))]
    pub required_role: String,
    #[validate(range(min = 0, max = 365))]
    pub escalation_days: i64,
    pub sequence: u32,
}

fn validate_level_range(level: &ApprovalLevel) -> Result<(), ValidationError> {
    match level.max_amount {
        Some(max) if max <= level.min_amount => Err(ValidationError::new("empty_amount_range")),
        _ => Ok(()),
    }
}

impl ApprovalLevel {
    pub fn new(
        name: impl Into<String>,
        min_amount: f64,
        max_amount: Option<f64>,
        required_role: impl Into<String>,
        escalation_days: i64,
        sequence: u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            min_amount,
            max_amount,
            required_role: required_role.into(),
            escalation_days,
            sequence,
        }
    }

    /// Half-open containment: `[min_amount, max_amount)`.
    pub fn contains(&self, amount: f64) -> bool {
        amount >= self.min_amount && self.max_amount.map(|max| amount < max).unwrap_or(true)
    }

    pub fn deadline_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + Duration::days(self.escalation_days)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    Escalated,
}

impl ApprovalStatus {
    pub fn can_transition_to(&self, target: ApprovalStatus) -> bool {
        use ApprovalStatus::*;

        match (self, target) {
            (Pending, Approved) => true,
            (Pending, Rejected) => true,
            (Pending, Escalated) => true,
            // Re-leveled to the next tier
            (Escalated, Pending) => true,
            // Manual decision on a request that ran out of tiers
            (Escalated, Approved) => true,
            (Escalated, Rejected) => true,
            _ => false,
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(self, ApprovalStatus::Approved | ApprovalStatus::Rejected)
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "escalated" => Some(Self::Escalated),
            _ => None,
        }
    }
}

impl std::fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Approved => write!(f, "Approved"),
            Self::Rejected => write!(f, "Rejected"),
            Self::Escalated => write!(f, "Escalated"),
        }
    }
}

/// The only human inputs into the approval state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApprovalDecision {
    Approve,
    Reject,
    Escalate,
}

/// One active approval per invoice/validation pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InvoiceApprovalRequest {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub validation_id: Uuid,
    pub current_level_id: Uuid,
    pub current_sequence: u32,
    pub status: ApprovalStatus,
    pub assigned_role: String,
    pub total_impact: f64,
    pub required_by: DateTime<Utc>,
    pub escalation_count: u32,
    pub requested_by: Option<Uuid>,
    pub decided_by: Option<Uuid>,
    pub decided_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InvoiceApprovalRequest {
    pub fn new(
        invoice_id: Uuid,
        validation_id: Uuid,
        level: &ApprovalLevel,
        total_impact: f64,
        requested_by: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            invoice_id,
            validation_id,
            current_level_id: level.id,
            current_sequence: level.sequence,
            status: ApprovalStatus::Pending,
            assigned_role: level.required_role.clone(),
            total_impact,
            required_by: level.deadline_from(now),
            escalation_count: 0,
            requested_by,
            decided_by: None,
            decided_at: None,
            rejection_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == ApprovalStatus::Pending && self.required_by < now
    }

    /// Move onto `level`, resetting the deadline from `now`.
    pub fn reassign(&mut self, level: &ApprovalLevel, now: DateTime<Utc>) {
        self.current_level_id = level.id;
        self.current_sequence = level.sequence;
        self.assigned_role = level.required_role.clone();
        self.required_by = level.deadline_from(now);
        self.updated_at = now;
    }
}

/// Append-only log entry for an approval request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApprovalHistory {
    pub id: Uuid,
    pub request_id: Uuid,
    pub from_status: Option<ApprovalStatus>,
    pub to_status: ApprovalStatus,
    pub level_sequence: u32,
    /// `None` for system actions (the escalation sweep).
    pub actor_id: Option<Uuid>,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

impl ApprovalHistory {
    pub fn new(
        request: &InvoiceApprovalRequest,
        from_status: Option<ApprovalStatus>,
        to_status: ApprovalStatus,
        actor_id: Option<Uuid>,
        comment: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            request_id: request.id,
            from_status,
            to_status,
            level_sequence: request.current_sequence,
            actor_id,
            comment: comment.into(),
            created_at: at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_contains_is_half_open() {
        let level = ApprovalLevel::new("L2", 1000.0, Some(10000.0), "manager", 3, 2);
        assert!(level.contains(1000.0));
        assert!(level.contains(9999.99));
        assert!(!level.contains(10000.0));
        assert!(!level.contains(999.99));

        let top = ApprovalLevel::new("L3", 10000.0, None, "director", 5, 3);
        assert!(top.contains(1_000_000.0));
    }

    #[test]
    fn test_level_range_validation() {
        let bad = ApprovalLevel::new("bad", 500.0, Some(100.0), "clerk", 1, 1);
        assert!(bad.validate().is_err());
        let good = ApprovalLevel::new("good", 0.0, Some(100.0), "clerk", 1, 1);
        assert!(good.validate().is_ok());
    }

    #[test]
    fn test_status_transitions() {
        assert!(ApprovalStatus::Pending.can_transition_to(ApprovalStatus::Approved));
        assert!(ApprovalStatus::Escalated.can_transition_to(ApprovalStatus::Pending));
        assert!(!ApprovalStatus::Approved.can_transition_to(ApprovalStatus::Pending));
        assert!(!ApprovalStatus::Rejected.can_transition_to(ApprovalStatus::Escalated));
    }

    #[test]
    fn test_new_request_deadline() {
        let now = Utc::now();
        let level = ApprovalLevel::new("L1", 0.0, Some(1000.0), "clerk", 2, 1);
        let request = InvoiceApprovalRequest::new(Uuid::new_v4(), Uuid::new_v4(), &level, 50.0, None, now);
        assert_eq!(request.required_by, now + Duration::days(2));
        assert_eq!(request.status, ApprovalStatus::Pending);
        assert!(!request.is_overdue(now));
        assert!(request.is_overdue(now + Duration::days(3)));
    }
}
