//! Approval Service
//!
//! Store-backed approval routing: opening requests for validations, human
//! decisions and the deadline sweep.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use covenant_database::{Cache, RecordStore};
use covenant_models::{
    ApprovalDecision, ApprovalHistory, ApprovalLevel, ApprovalStatus, InvoiceApprovalRequest, InvoiceStatus,
};
use covenant_utils::{log_error, validate_model, ApprovalConfig, CovenantError, CovenantResult};

use crate::levels::select_level;
use crate::metrics::ApprovalMetrics;
use crate::state_machine::{apply, escalate_if_overdue, ApprovalEvent, EscalationOutcome};
use crate::{ApprovalView, DecisionRequest, SweepReport};

const LEVELS_CACHE_KEY: &str = "approval:levels";

#[derive(Clone)]
pub struct ApprovalService {
    store: Arc<dyn RecordStore>,
    cache: Arc<dyn Cache>,
    config: ApprovalConfig,
    metrics: Option<ApprovalMetrics>,
}

impl ApprovalService {
    pub fn new(store: Arc<dyn RecordStore>, cache: Arc<dyn Cache>, config: ApprovalConfig) -> Self {
        Self {
            store,
            cache,
            config,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: ApprovalMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &ApprovalConfig {
        &self.config
    }

    /// Insert every level whose sequence is not already stored.
    pub async fn seed_levels(&self, levels: Vec<ApprovalLevel>) -> CovenantResult<usize> {
        let existing = self.store.list_approval_levels().await?;
        let mut inserted = 0;

        for level in levels {
            if existing.iter().any(|stored| stored.sequence == level.sequence) {
                continue;
            }
            validate_model(&level)?;
            self.store.insert_approval_level(&level).await?;
            inserted += 1;
        }

        self.cache.invalidate(LEVELS_CACHE_KEY).await?;
        tracing::info!(inserted, existing = existing.len(), "Approval levels seeded");
        Ok(inserted)
    }

    /// Configured ladder ordered by sequence.
    pub async fn levels(&self) -> CovenantResult<Vec<ApprovalLevel>> {
        if let Some(cached) = self.cache.get(LEVELS_CACHE_KEY).await? {
            match serde_json::from_value::<Vec<ApprovalLevel>>(cached) {
                Ok(levels) => return Ok(levels),
                Err(e) => tracing::warn!(error = %e, "Discarding unreadable cached approval levels"),
            }
        }

        let levels = self.store.list_approval_levels().await?;
        self.cache.set(LEVELS_CACHE_KEY, serde_json::to_value(&levels)?).await?;
        Ok(levels)
    }

    /// Open an approval request for a validation whose unresolved High or
    /// Medium exceptions need a decision. Returns `None` when nothing needs
    /// approval; repeated calls return the request already opened.
    pub async fn create_for_validation(
        &self,
        validation_id: Uuid,
        actor_id: Option<Uuid>,
    ) -> CovenantResult<Option<InvoiceApprovalRequest>> {
        let validation = self
            .store
            .get_validation(validation_id)
            .await?
            .ok_or_else(|| CovenantError::not_found(format!("validation {}", validation_id)))?;

        let exceptions = self.store.list_exceptions(validation_id).await?;
        let pending: Vec<_> = exceptions.iter().filter(|e| e.needs_approval()).collect();
        if pending.is_empty() {
            tracing::debug!(%validation_id, "No exceptions need approval");
            return Ok(None);
        }

        if let Some(existing) = self.store.find_approval_request(validation.invoice_id, validation_id).await? {
            return Ok(Some(existing));
        }

        let total_impact: f64 = pending.iter().map(|e| e.financial_impact.abs()).sum();
        let levels = self.levels().await?;
        let level = select_level(&levels, total_impact)
            .ok_or_else(|| CovenantError::configuration("no approval levels configured"))?;

        let now = Utc::now();
        let request = InvoiceApprovalRequest::new(validation.invoice_id, validation_id, level, total_impact, actor_id, now);
        self.store.insert_approval_request(&request).await?;

        let comment = format!(
            "{} exception(s) totalling {:.2} routed to {} ({})",
            pending.len(),
            total_impact,
            level.name,
            level.required_role
        );
        let entry = ApprovalHistory::new(&request, None, ApprovalStatus::Pending, actor_id, comment, now);
        self.store.append_approval_history(&entry).await?;

        self.set_invoice_status(validation.invoice_id, InvoiceStatus::PendingApproval).await?;

        if let Some(metrics) = &self.metrics {
            metrics.requests_created.inc();
        }
        tracing::info!(
            request_id = %request.id,
            invoice_id = %request.invoice_id,
            %validation_id,
            level = level.sequence,
            total_impact,
            "Approval request created"
        );

        Ok(Some(request))
    }

    pub async fn decide(&self, request_id: Uuid, decision: DecisionRequest) -> CovenantResult<ApprovalView> {
        validate_model(&decision)?;

        let mut request = self.load(request_id).await?;
        if request.status.is_final() {
            return Err(CovenantError::conflict(format!(
                "approval request {} was already {}",
                request_id, request.status
            )));
        }
        let levels = self.levels().await?;
        let now = Utc::now();

        let event = ApprovalEvent::from_decision(
            decision.decision,
            decision.actor_id,
            decision.comments,
            decision.rejection_reason,
        );
        let history = apply(&mut request, event, &levels, now)?;

        self.store.update_approval_request(&request).await?;
        for entry in &history {
            self.store.append_approval_history(entry).await?;
        }

        match decision.decision {
            ApprovalDecision::Approve => {
                self.resolve_exceptions(request.validation_id, decision.actor_id).await?;
                self.set_invoice_status(request.invoice_id, InvoiceStatus::Approved).await?;
            }
            ApprovalDecision::Reject => {
                self.set_invoice_status(request.invoice_id, InvoiceStatus::Rejected).await?;
            }
            ApprovalDecision::Escalate => {}
        }

        if let Some(metrics) = &self.metrics {
            let label = match decision.decision {
                ApprovalDecision::Approve => "approve",
                ApprovalDecision::Reject => "reject",
                ApprovalDecision::Escalate => "escalate",
            };
            metrics.decisions.with_label_values(&[label]).inc();
        }
        tracing::info!(%request_id, actor_id = %decision.actor_id, status = %request.status, "Approval decision recorded");

        self.view(request).await
    }

    /// Escalate every overdue `Pending` request. Safe to re-run: a request
    /// escalated by an earlier sweep is no longer overdue.
    pub async fn sweep(&self, now: DateTime<Utc>) -> CovenantResult<SweepReport> {
        let levels = self.levels().await?;
        let pending = self.store.list_approval_requests(Some(ApprovalStatus::Pending)).await?;
        let mut report = SweepReport {
            examined: pending.len(),
            ..SweepReport::default()
        };

        for mut request in pending {
            let Some((history, outcome)) =
                escalate_if_overdue(&mut request, &levels, self.config.system_actor_id, now)
            else {
                continue;
            };

            if let Err(e) = self.persist_escalation(&request, &history).await {
                log_error!(e, "Failed to persist escalation", request_id = %request.id);
                report.failed += 1;
                continue;
            }

            let outcome_label = match outcome {
                EscalationOutcome::Releveled { sequence } => {
                    report.releveled += 1;
                    tracing::info!(request_id = %request.id, sequence, "Approval request escalated");
                    "releveled"
                }
                EscalationOutcome::Exhausted => {
                    report.exhausted += 1;
                    tracing::warn!(
                        request_id = %request.id,
                        escalation_count = request.escalation_count,
                        "Approval request has no higher level; manual intervention required"
                    );
                    "exhausted"
                }
            };
            if let Some(metrics) = &self.metrics {
                metrics.escalations.with_label_values(&[outcome_label]).inc();
            }
        }

        if report.escalated() > 0 || report.failed > 0 {
            tracing::info!(
                examined = report.examined,
                releveled = report.releveled,
                exhausted = report.exhausted,
                failed = report.failed,
                "Escalation sweep finished"
            );
        }
        Ok(report)
    }

    pub async fn list(&self, status: Option<ApprovalStatus>) -> CovenantResult<Vec<InvoiceApprovalRequest>> {
        self.store.list_approval_requests(status).await
    }

    pub async fn get(&self, request_id: Uuid) -> CovenantResult<ApprovalView> {
        let request = self.load(request_id).await?;
        self.view(request).await
    }

    async fn load(&self, request_id: Uuid) -> CovenantResult<InvoiceApprovalRequest> {
        self.store
            .get_approval_request(request_id)
            .await?
            .ok_or_else(|| CovenantError::not_found(format!("approval request {}", request_id)))
    }

    async fn view(&self, request: InvoiceApprovalRequest) -> CovenantResult<ApprovalView> {
        let level = self
            .levels()
            .await?
            .into_iter()
            .find(|level| level.id == request.current_level_id);
        let history = self.store.list_approval_history(request.id).await?;

        Ok(ApprovalView { request, level, history })
    }

    async fn persist_escalation(
        &self,
        request: &InvoiceApprovalRequest,
        history: &[ApprovalHistory],
    ) -> CovenantResult<()> {
        self.store.update_approval_request(request).await?;
        for entry in history {
            self.store.append_approval_history(entry).await?;
        }
        Ok(())
    }

    async fn resolve_exceptions(&self, validation_id: Uuid, actor_id: Uuid) -> CovenantResult<()> {
        for mut exception in self.store.list_exceptions(validation_id).await? {
            if exception.resolved {
                continue;
            }
            exception.resolve(Some(actor_id));
            self.store.update_exception(&exception).await?;
        }
        Ok(())
    }

    async fn set_invoice_status(&self, invoice_id: Uuid, status: InvoiceStatus) -> CovenantResult<()> {
        let Some(mut invoice) = self.store.get_invoice(invoice_id).await? else {
            tracing::warn!(%invoice_id, "Approval refers to a missing invoice");
            return Ok(());
        };

        invoice.current_status = status;
        invoice.updated_at = Utc::now();
        self.store.update_invoice(&invoice).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::levels::default_ladder;
    use chrono::Duration;
    use covenant_database::{MemoryCache, MemoryStore};
    use covenant_models::{ExceptionType, Invoice, InvoiceValidation, Severity, ValidationException, ValidationStatus};

    async fn service() -> ApprovalService {
        let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());
        let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new(std::time::Duration::from_secs(60)));
        let service = ApprovalService::new(store, cache, ApprovalConfig::default());
        service.seed_levels(default_ladder()).await.unwrap();
        service
    }

    /// An invoice with one failed validation carrying `impacts` as Medium exceptions.
    async fn failed_validation(service: &ApprovalService, impacts: &[f64]) -> (Uuid, Uuid) {
        let invoice = Invoice::new("INV-1001".into(), Uuid::new_v4(), 12_000.0);
        service.store.insert_invoice(&invoice).await.unwrap();

        let validation = InvoiceValidation {
            id: Uuid::new_v4(),
            invoice_id: invoice.id,
            contract_id: None,
            status: if impacts.is_empty() { ValidationStatus::Passed } else { ValidationStatus::Failed },
            contract_matched: true,
            vendor_matched: true,
            all_lines_matched: true,
            expected_net_amount: 0.0,
            actual_net_amount: 0.0,
            variance_amount: 0.0,
            potential_savings: 0.0,
            rules_evaluated: 7,
            exception_count: impacts.len() as u32,
            validated_by: None,
            validated_at: Utc::now(),
        };
        let exceptions: Vec<_> = impacts
            .iter()
            .map(|impact| {
                let mut e = ValidationException::new(
                    validation.id,
                    invoice.id,
                    ExceptionType::PriceVariance,
                    Severity::Medium,
                    "price above contract",
                );
                e.financial_impact = *impact;
                e
            })
            .collect();
        service.store.insert_validation(&validation, &exceptions).await.unwrap();
        (invoice.id, validation.id)
    }

    #[tokio::test]
    async fn test_seed_levels_is_idempotent() {
        let service = service().await;
        assert_eq!(service.seed_levels(default_ladder()).await.unwrap(), 0);
        assert_eq!(service.levels().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_no_request_without_approvable_exceptions() {
        let service = service().await;
        let (_, validation_id) = failed_validation(&service, &[]).await;
        assert!(service.create_for_validation(validation_id, None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_routes_by_total_impact() {
        let service = service().await;
        let (invoice_id, validation_id) = failed_validation(&service, &[3_000.0, -2_000.0]).await;

        let request = service.create_for_validation(validation_id, None).await.unwrap().unwrap();
        assert_eq!(request.total_impact, 5_000.0);
        assert_eq!(request.current_sequence, 2);

        let again = service.create_for_validation(validation_id, None).await.unwrap().unwrap();
        assert_eq!(again.id, request.id);
        assert_eq!(service.list(None).await.unwrap().len(), 1);

        let invoice = service.store.get_invoice(invoice_id).await.unwrap().unwrap();
        assert_eq!(invoice.current_status, InvoiceStatus::PendingApproval);

        let view = service.get(request.id).await.unwrap();
        assert_eq!(view.history.len(), 1);
        assert_eq!(view.level.unwrap().sequence, 2);
    }

    #[tokio::test]
    async fn test_approve_resolves_exceptions() {
        let service = service().await;
        let (invoice_id, validation_id) = failed_validation(&service, &[250.0]).await;
        let request = service.create_for_validation(validation_id, None).await.unwrap().unwrap();

        let actor = Uuid::new_v4();
        let view = service
            .decide(
                request.id,
                DecisionRequest {
                    decision: ApprovalDecision::Approve,
                    comments: "agreed with vendor".into(),
                    rejection_reason: None,
                    actor_id: actor,
                },
            )
            .await
            .unwrap();

        assert_eq!(view.request.status, ApprovalStatus::Approved);
        assert_eq!(view.history.len(), 2);

        let exceptions = service.store.list_exceptions(validation_id).await.unwrap();
        assert!(exceptions.iter().all(|e| e.resolved && e.resolved_by == Some(actor)));
        let invoice = service.store.get_invoice(invoice_id).await.unwrap().unwrap();
        assert_eq!(invoice.current_status, InvoiceStatus::Approved);
    }

    #[tokio::test]
    async fn test_reject_marks_invoice_rejected() {
        let service = service().await;
        let (invoice_id, validation_id) = failed_validation(&service, &[250.0]).await;
        let request = service.create_for_validation(validation_id, None).await.unwrap().unwrap();

        service
            .decide(
                request.id,
                DecisionRequest {
                    decision: ApprovalDecision::Reject,
                    comments: String::new(),
                    rejection_reason: Some("not contracted".into()),
                    actor_id: Uuid::new_v4(),
                },
            )
            .await
            .unwrap();

        let invoice = service.store.get_invoice(invoice_id).await.unwrap().unwrap();
        assert_eq!(invoice.current_status, InvoiceStatus::Rejected);
    }

    #[tokio::test]
    async fn test_decided_request_is_not_reopened() {
        let service = service().await;
        let (invoice_id, validation_id) = failed_validation(&service, &[250.0]).await;
        let request = service.create_for_validation(validation_id, None).await.unwrap().unwrap();

        let decision = |decision: ApprovalDecision| DecisionRequest {
            decision,
            comments: String::new(),
            rejection_reason: Some("late change".into()),
            actor_id: Uuid::new_v4(),
        };
        service.decide(request.id, decision(ApprovalDecision::Approve)).await.unwrap();

        let err = service
            .decide(request.id, decision(ApprovalDecision::Reject))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "CONFLICT");

        let invoice = service.store.get_invoice(invoice_id).await.unwrap().unwrap();
        assert_eq!(invoice.current_status, InvoiceStatus::Approved);
        let history = service.store.list_approval_history(request.id).await.unwrap();
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn test_decide_unknown_request() {
        let service = service().await;
        let err = service
            .decide(
                Uuid::new_v4(),
                DecisionRequest {
                    decision: ApprovalDecision::Approve,
                    comments: String::new(),
                    rejection_reason: None,
                    actor_id: Uuid::new_v4(),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.http_status_code(), 404);
    }

    #[tokio::test]
    async fn test_sweep_escalates_then_exhausts() {
        let service = service().await;
        let (_, validation_id) = failed_validation(&service, &[5_000.0]).await;
        let request = service.create_for_validation(validation_id, None).await.unwrap().unwrap();

        let first = request.required_by + Duration::minutes(1);
        let report = service.sweep(first).await.unwrap();
        assert_eq!(report.releveled, 1);

        // Idempotent at the same instant.
        assert_eq!(service.sweep(first).await.unwrap().escalated(), 0);

        let moved = service.get(request.id).await.unwrap();
        assert_eq!(moved.request.current_sequence, 3);
        assert_eq!(moved.request.status, ApprovalStatus::Pending);
        assert_eq!(moved.history.len(), 3);

        let second = moved.request.required_by + Duration::minutes(1);
        let report = service.sweep(second).await.unwrap();
        assert_eq!(report.exhausted, 1);

        let stuck = service.get(request.id).await.unwrap();
        assert_eq!(stuck.request.status, ApprovalStatus::Escalated);
        assert_eq!(stuck.request.escalation_count, 2);

        let report = service.sweep(second + Duration::days(60)).await.unwrap();
        assert_eq!(report, SweepReport::default());
    }

    #[tokio::test]
    async fn test_metrics_count_escalations() {
        let registry = prometheus::Registry::new();
        let metrics = ApprovalMetrics::register(&registry).unwrap();
        let service = service().await.with_metrics(metrics.clone());

        let (_, validation_id) = failed_validation(&service, &[50_000.0]).await;
        let request = service.create_for_validation(validation_id, None).await.unwrap().unwrap();
        service.sweep(request.required_by + Duration::seconds(1)).await.unwrap();

        assert_eq!(metrics.requests_created.get(), 1);
        assert_eq!(metrics.escalations.with_label_values(&["exhausted"]).get(), 1);
    }
}
