//! Approval State Machine
//!
//! Pure transitions for an `InvoiceApprovalRequest`. Nothing here touches
//! storage: `apply` mutates the request in place and returns the history
//! entries the caller must append.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use covenant_models::{ApprovalDecision, ApprovalHistory, ApprovalLevel, ApprovalStatus, InvoiceApprovalRequest};
use covenant_utils::{CovenantError, CovenantResult};

use crate::levels::next_level;

#[derive(Debug, Clone, PartialEq)]
pub enum ApprovalEvent {
    Approve {
        actor_id: Uuid,
        comments: String,
    },
    Reject {
        actor_id: Uuid,
        comments: String,
        reason: Option<String>,
    },
    /// `actor_id` is `None` when the deadline sweep escalates.
    Escalate {
        actor_id: Option<Uuid>,
        comments: String,
    },
}

impl ApprovalEvent {
    pub fn from_decision(
        decision: ApprovalDecision,
        actor_id: Uuid,
        comments: String,
        reason: Option<String>,
    ) -> Self {
        match decision {
            ApprovalDecision::Approve => Self::Approve { actor_id, comments },
            ApprovalDecision::Reject => Self::Reject {
                actor_id,
                comments,
                reason,
            },
            ApprovalDecision::Escalate => Self::Escalate {
                actor_id: Some(actor_id),
                comments,
            },
        }
    }

    fn target(&self) -> ApprovalStatus {
        match self {
            Self::Approve { .. } => ApprovalStatus::Approved,
            Self::Reject { .. } => ApprovalStatus::Rejected,
            Self::Escalate { .. } => ApprovalStatus::Escalated,
        }
    }
}

/// What an escalation did to the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationOutcome {
    /// Moved to the next tier and back to `Pending`.
    Releveled { sequence: u32 },
    /// No tier above; the request now waits in `Escalated` for a manual decision.
    Exhausted,
}

pub fn apply(
    request: &mut InvoiceApprovalRequest,
    event: ApprovalEvent,
    levels: &[ApprovalLevel],
    now: DateTime<Utc>,
) -> CovenantResult<Vec<ApprovalHistory>> {
    let from = request.status;
    let target = event.target();

    if !from.can_transition_to(target) {
        return Err(CovenantError::invalid_transition(from, target));
    }

    match event {
        ApprovalEvent::Approve { actor_id, comments } => {
            decide(request, ApprovalStatus::Approved, actor_id, now);
            Ok(vec![ApprovalHistory::new(request, Some(from), request.status, Some(actor_id), comments, now)])
        }
        ApprovalEvent::Reject {
            actor_id,
            comments,
            reason,
        } => {
            decide(request, ApprovalStatus::Rejected, actor_id, now);
            request.rejection_reason = reason.clone().or_else(|| non_empty(&comments));

            let comment = match reason {
                Some(reason) if comments.trim().is_empty() => reason,
                Some(reason) => format!("{} (reason: {})", comments, reason),
                None => comments,
            };
            Ok(vec![ApprovalHistory::new(request, Some(from), request.status, Some(actor_id), comment, now)])
        }
        ApprovalEvent::Escalate { actor_id, comments } => {
            let (history, _) = escalate(request, actor_id, comments, levels, now);
            Ok(history)
        }
    }
}

/// Escalate a `Pending` request. Callers must have checked the transition.
fn escalate(
    request: &mut InvoiceApprovalRequest,
    actor_id: Option<Uuid>,
    comments: String,
    levels: &[ApprovalLevel],
    now: DateTime<Utc>,
) -> (Vec<ApprovalHistory>, EscalationOutcome) {
    let from = request.status;
    request.status = ApprovalStatus::Escalated;
    request.escalation_count += 1;
    request.updated_at = now;

    match next_level(levels, request.current_sequence) {
        Some(level) => {
            let left = ApprovalHistory::new(request, Some(from), ApprovalStatus::Escalated, actor_id, comments, now);

            request.reassign(level, now);
            request.status = ApprovalStatus::Pending;
            let arrived = ApprovalHistory::new(
                request,
                Some(ApprovalStatus::Escalated),
                ApprovalStatus::Pending,
                actor_id,
                format!("Reassigned to {} ({})", level.name, level.required_role),
                now,
            );

            (vec![left, arrived], EscalationOutcome::Releveled { sequence: level.sequence })
        }
        None => {
            let comment = if comments.trim().is_empty() {
                "No higher approval level; manual intervention required".to_string()
            } else {
                format!("{}; no higher approval level, manual intervention required", comments)
            };
            let entry = ApprovalHistory::new(request, Some(from), ApprovalStatus::Escalated, actor_id, comment, now);
            (vec![entry], EscalationOutcome::Exhausted)
        }
    }
}

/// Deadline-driven escalation. Returns `None` when the request is not overdue,
/// which makes repeated sweeps a no-op.
pub fn escalate_if_overdue(
    request: &mut InvoiceApprovalRequest,
    levels: &[ApprovalLevel],
    actor_id: Option<Uuid>,
    now: DateTime<Utc>,
) -> Option<(Vec<ApprovalHistory>, EscalationOutcome)> {
    if !request.is_overdue(now) {
        return None;
    }

    let comments = format!("Deadline {} passed", request.required_by.format("%Y-%m-%d %H:%M UTC"));
    Some(escalate(request, actor_id, comments, levels, now))
}

fn decide(request: &mut InvoiceApprovalRequest, status: ApprovalStatus, actor_id: Uuid, now: DateTime<Utc>) {
    request.status = status;
    request.decided_by = Some(actor_id);
    request.decided_at = Some(now);
    request.updated_at = now;
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::levels::{default_ladder, select_level};
    use chrono::Duration;

    fn request_at(levels: &[ApprovalLevel], amount: f64, now: DateTime<Utc>) -> InvoiceApprovalRequest {
        let level = select_level(levels, amount).unwrap();
        InvoiceApprovalRequest::new(Uuid::new_v4(), Uuid::new_v4(), level, amount, None, now)
    }

    #[test]
    fn test_approve_records_decision() {
        let ladder = default_ladder();
        let now = Utc::now();
        let mut request = request_at(&ladder, 500.0, now);
        let actor = Uuid::new_v4();

        let history = apply(
            &mut request,
            ApprovalEvent::Approve {
                actor_id: actor,
                comments: "ok".into(),
            },
            &ladder,
            now,
        )
        .unwrap();

        assert_eq!(request.status, ApprovalStatus::Approved);
        assert_eq!(request.decided_by, Some(actor));
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].from_status, Some(ApprovalStatus::Pending));
        assert_eq!(history[0].to_status, ApprovalStatus::Approved);
    }

    #[test]
    fn test_reject_keeps_reason() {
        let ladder = default_ladder();
        let now = Utc::now();
        let mut request = request_at(&ladder, 500.0, now);

        let history = apply(
            &mut request,
            ApprovalEvent::Reject {
                actor_id: Uuid::new_v4(),
                comments: "price too high".into(),
                reason: Some("overbilled".into()),
            },
            &ladder,
            now,
        )
        .unwrap();

        assert_eq!(request.status, ApprovalStatus::Rejected);
        assert_eq!(request.rejection_reason.as_deref(), Some("overbilled"));
        assert!(history[0].comment.contains("overbilled"));
    }

    #[test]
    fn test_final_states_reject_further_events() {
        let ladder = default_ladder();
        let now = Utc::now();
        let mut request = request_at(&ladder, 500.0, now);
        let actor = Uuid::new_v4();

        apply(
            &mut request,
            ApprovalEvent::Approve {
                actor_id: actor,
                comments: String::new(),
            },
            &ladder,
            now,
        )
        .unwrap();

        let err = apply(
            &mut request,
            ApprovalEvent::Escalate {
                actor_id: Some(actor),
                comments: String::new(),
            },
            &ladder,
            now,
        )
        .unwrap_err();
        assert_eq!(err.http_status_code(), 409);
        assert_eq!(request.status, ApprovalStatus::Approved);
    }

    #[test]
    fn test_five_thousand_climbs_to_top_then_exhausts() {
        let ladder = default_ladder();
        let start = Utc::now();
        let mut request = request_at(&ladder, 5_000.0, start);
        assert_eq!(request.current_sequence, 2);
        assert_eq!(request.assigned_role, "finance_manager");

        // Past the L2 deadline: moves to L3 with a fresh deadline.
        let later = request.required_by + Duration::hours(1);
        let (history, outcome) = escalate_if_overdue(&mut request, &ladder, None, later).unwrap();
        assert_eq!(outcome, EscalationOutcome::Releveled { sequence: 3 });
        assert_eq!(request.status, ApprovalStatus::Pending);
        assert_eq!(request.current_sequence, 3);
        assert_eq!(request.required_by, later + Duration::days(5));
        assert_eq!(request.escalation_count, 1);
        assert_eq!(history.len(), 2);

        // Same instant again: no longer overdue, nothing happens.
        assert!(escalate_if_overdue(&mut request, &ladder, None, later).is_none());

        // Past the L3 deadline: nowhere left to go.
        let much_later = request.required_by + Duration::hours(1);
        let (history, outcome) = escalate_if_overdue(&mut request, &ladder, None, much_later).unwrap();
        assert_eq!(outcome, EscalationOutcome::Exhausted);
        assert_eq!(request.status, ApprovalStatus::Escalated);
        assert_eq!(request.escalation_count, 2);
        assert_eq!(history.len(), 1);

        // Exhausted requests are never picked up by the sweep again.
        let deadline = request.required_by;
        assert!(escalate_if_overdue(&mut request, &ladder, None, much_later + Duration::days(30)).is_none());
        assert_eq!(request.required_by, deadline);
        assert_eq!(request.escalation_count, 2);
    }

    #[test]
    fn test_exhausted_request_still_accepts_manual_decision() {
        let ladder = default_ladder();
        let now = Utc::now();
        let mut request = request_at(&ladder, 50_000.0, now);

        apply(
            &mut request,
            ApprovalEvent::Escalate {
                actor_id: None,
                comments: String::new(),
            },
            &ladder,
            now,
        )
        .unwrap();
        assert_eq!(request.status, ApprovalStatus::Escalated);

        apply(
            &mut request,
            ApprovalEvent::Reject {
                actor_id: Uuid::new_v4(),
                comments: "duplicate invoice".into(),
                reason: None,
            },
            &ladder,
            now,
        )
        .unwrap();
        assert_eq!(request.status, ApprovalStatus::Rejected);
        assert_eq!(request.rejection_reason.as_deref(), Some("duplicate invoice"));
    }
}
