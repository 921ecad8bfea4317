//! Escalation Scheduler
//!
//! Runs the deadline sweep on a fixed interval until shut down.

use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use covenant_utils::log_error;

use crate::service::ApprovalService;

pub struct EscalationScheduler {
    service: ApprovalService,
    interval: Duration,
}

impl EscalationScheduler {
    pub fn new(service: ApprovalService, interval: Duration) -> Self {
        Self { service, interval }
    }

    /// Uses `approval.sweep_interval_seconds` from the service configuration.
    pub fn from_config(service: ApprovalService) -> Self {
        let seconds = service.config().sweep_interval_seconds.max(1);
        Self::new(service, Duration::from_secs(seconds))
    }

    /// Spawn the sweep loop. The first sweep runs immediately.
    pub fn start(self) -> SchedulerHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            tracing::info!(interval_seconds = self.interval.as_secs(), "Escalation scheduler started");

            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.service.sweep(Utc::now()).await {
                            log_error!(e, "Escalation sweep failed");
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            tracing::info!("Escalation scheduler shutting down");
        });

        SchedulerHandle {
            shutdown: shutdown_tx,
            handle: Some(handle),
        }
    }
}

/// Stops the scheduler when `shutdown` is awaited or when dropped.
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Signal the loop and wait for an in-flight sweep to finish.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                log_error!(e, "Escalation scheduler task ended abnormally");
            }
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::Duration as ChronoDuration;
    use covenant_database::{Cache, MemoryCache, MemoryStore, RecordStore};
    use covenant_models::{
        ApprovalStatus, ExceptionType, Invoice, InvoiceValidation, Severity, ValidationException, ValidationStatus,
    };
    use covenant_utils::ApprovalConfig;
    use uuid::Uuid;

    use crate::levels::default_ladder;

    #[tokio::test]
    async fn test_scheduler_escalates_overdue_request() {
        let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());
        let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new(std::time::Duration::from_secs(60)));
        let service = ApprovalService::new(store.clone(), cache, ApprovalConfig::default());
        service.seed_levels(default_ladder()).await.unwrap();

        let invoice = Invoice::new("INV-7".into(), Uuid::new_v4(), 100.0);
        store.insert_invoice(&invoice).await.unwrap();
        let validation = InvoiceValidation {
            id: Uuid::new_v4(),
            invoice_id: invoice.id,
            contract_id: None,
            status: ValidationStatus::Failed,
            contract_matched: false,
            vendor_matched: false,
            all_lines_matched: false,
            expected_net_amount: 100.0,
            actual_net_amount: 100.0,
            variance_amount: 0.0,
            potential_savings: 0.0,
            rules_evaluated: 0,
            exception_count: 1,
            validated_by: None,
            validated_at: Utc::now(),
        };
        let mut exception = ValidationException::new(
            validation.id,
            invoice.id,
            ExceptionType::ContractNotMatched,
            Severity::High,
            "no contract",
        );
        exception.financial_impact = 100.0;
        store.insert_validation(&validation, &[exception]).await.unwrap();

        let mut request = service.create_for_validation(validation.id, None).await.unwrap().unwrap();
        request.required_by = Utc::now() - ChronoDuration::hours(1);
        store.update_approval_request(&request).await.unwrap();

        let handle = EscalationScheduler::new(service.clone(), Duration::from_secs(3600)).start();
        let mut escalated = false;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let current = store.get_approval_request(request.id).await.unwrap().unwrap();
            if current.escalation_count == 1 {
                assert_eq!(current.status, ApprovalStatus::Pending);
                assert_eq!(current.current_sequence, 2);
                escalated = true;
                break;
            }
        }
        handle.shutdown().await;
        assert!(escalated);
    }
}
