//! Document Pipeline
//!
//! Drives one document along `uploaded → ocr → type_validation → extraction →
//! normalization → validation → completed`. `Document.stage` names the stage
//! whose work is pending; a stage persists its output and the next stage in
//! a single update. Handlers skip work whose output is already on the
//! document, so running the pipeline again after a crash or a duplicate
//! queue delivery is harmless.

use std::sync::Arc;

use uuid::Uuid;

use covenant_database::{BlobStore, RecordStore};
use covenant_models::{Document, DocumentStage, DocumentType, ExtractionResult};
use covenant_reconciliation::ValidationOrchestrator;
use covenant_utils::{log_error, CovenantError, CovenantResult};

use crate::extraction::ExtractionGateway;
use crate::metrics::PipelineMetrics;
use crate::normalizer::{EntityNormalizer, NormalizedEntity};
use crate::ocr::TextExtractor;

/// Outcome of one stage handler.
enum StageError {
    /// Ingestion failed; the document moves to `error`.
    Fatal(CovenantError),
    /// Reconciliation failed; the ingested entities stand.
    Validation(CovenantError),
}

impl From<CovenantError> for StageError {
    fn from(err: CovenantError) -> Self {
        StageError::Fatal(err)
    }
}

#[derive(Clone)]
pub struct DocumentPipeline {
    store: Arc<dyn RecordStore>,
    blobs: Arc<dyn BlobStore>,
    text: Arc<dyn TextExtractor>,
    gateway: ExtractionGateway,
    normalizer: EntityNormalizer,
    orchestrator: ValidationOrchestrator,
    metrics: Option<PipelineMetrics>,
}

impl DocumentPipeline {
    pub fn new(
        store: Arc<dyn RecordStore>,
        blobs: Arc<dyn BlobStore>,
        text: Arc<dyn TextExtractor>,
        gateway: ExtractionGateway,
        normalizer: EntityNormalizer,
        orchestrator: ValidationOrchestrator,
    ) -> Self {
        Self {
            store,
            blobs,
            text,
            gateway,
            normalizer,
            orchestrator,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: PipelineMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub fn blobs(&self) -> &Arc<dyn BlobStore> {
        &self.blobs
    }

    pub fn orchestrator(&self) -> &ValidationOrchestrator {
        &self.orchestrator
    }

    pub fn metrics(&self) -> Option<&PipelineMetrics> {
        self.metrics.as_ref()
    }

    /// Run every remaining stage of `document_id`. Stage failures are
    /// recorded on the document, not returned; `Err` means the document
    /// could not be loaded or saved at all.
    pub async fn process(&self, document_id: Uuid) -> CovenantResult<Document> {
        let mut document = self
            .store
            .get_document(document_id)
            .await?
            .ok_or_else(|| CovenantError::not_found(format!("document {}", document_id)))?;

        while !document.stage.is_terminal() {
            let stage = document.stage;
            match self.run_stage(&mut document).await {
                Ok(()) => {
                    let Some(next) = stage.next_for(document.declared_type) else {
                        return Err(CovenantError::internal(format!("stage {} has no successor", stage)));
                    };
                    document
                        .advance_to(next)
                        .map_err(|e| CovenantError::internal(e.to_string()))?;
                    self.store.update_document(&document).await?;
                    tracing::debug!(document_id = %document.id, stage = %next, "Stage advanced");
                }
                Err(StageError::Fatal(err)) => {
                    log_error!(err, "Pipeline stage failed", document_id = %document.id, stage = %stage);
                    self.count_failure(stage);
                    document.fail(err.to_string());
                    self.store.update_document(&document).await?;
                }
                Err(StageError::Validation(err)) => {
                    log_error!(err, "Validation stage failed", document_id = %document.id, stage = %stage);
                    self.count_failure(stage);
                    document.fail_validation(err.to_string());
                    self.store.update_document(&document).await?;
                }
            }
        }

        if document.stage == DocumentStage::Completed {
            if let Some(metrics) = &self.metrics {
                metrics.documents_completed.inc();
            }
            tracing::info!(
                document_id = %document.id,
                document_type = %document.declared_type,
                requires_human_review = document.requires_human_review(),
                "Document pipeline completed"
            );
        }
        Ok(document)
    }

    fn count_failure(&self, stage: DocumentStage) {
        if let Some(metrics) = &self.metrics {
            metrics.stage_failures.with_label_values(&[stage.as_str()]).inc();
        }
    }

    async fn run_stage(&self, document: &mut Document) -> Result<(), StageError> {
        match document.stage {
            DocumentStage::Uploaded => Ok(()),
            DocumentStage::Ocr => self.ocr(document).await,
            DocumentStage::TypeValidation => self.type_validation(document).await,
            DocumentStage::Extraction => self.extraction(document).await,
            DocumentStage::Normalization => self.normalization(document).await,
            DocumentStage::Validation => self.validation(document).await,
            stage => Err(CovenantError::internal(format!("no handler for stage {}", stage)).into()),
        }
    }

    async fn ocr(&self, document: &mut Document) -> Result<(), StageError> {
        if document.ocr_text.is_some() {
            return Ok(());
        }
        let bytes = self.blobs.get(&document.storage_locator).await?;
        let extracted = self
            .text
            .extract(&document.file_name, &document.content_type, &bytes)
            .await?;
        document.page_count = Some(extracted.page_count);
        document.ocr_text = Some(extracted.text);
        Ok(())
    }

    async fn type_validation(&self, document: &mut Document) -> Result<(), StageError> {
        let detection = match &document.detected_type {
            Some(detection) => detection.clone(),
            None => {
                let detection = self.gateway.detect_type(ocr_text(document)?).await?;
                document.detected_type = Some(detection.clone());
                detection
            }
        };

        if detection.detected.as_document_type() != Some(document.declared_type) {
            return Err(CovenantError::type_mismatch(
                document.declared_type.to_string(),
                detection.detected.to_string(),
            )
            .into());
        }
        Ok(())
    }

    async fn extraction(&self, document: &mut Document) -> Result<(), StageError> {
        let done = document
            .extraction
            .as_ref()
            .map(|e| e.document_type() == document.declared_type)
            .unwrap_or(false);
        if done {
            return Ok(());
        }

        let text = ocr_text(document)?;
        let result = match document.declared_type {
            DocumentType::Contract => {
                self.gateway
                    .extract_contract(document.id, text, document.page_count)
                    .await?
            }
            DocumentType::Invoice => {
                self.gateway
                    .extract_invoice(document.id, text, document.page_count)
                    .await?
            }
        };
        if result.metadata.requires_human_review {
            tracing::warn!(
                document_id = %document.id,
                confidence = result.confidence,
                warnings = result.metadata.warnings.len(),
                "Extraction flagged for human review"
            );
        }
        document.extraction = Some(result);
        Ok(())
    }

    async fn normalization(&self, document: &mut Document) -> Result<(), StageError> {
        let done = match document.declared_type {
            DocumentType::Contract => document.contract_id.is_some(),
            DocumentType::Invoice => document.invoice_id.is_some(),
        };
        if done {
            return Ok(());
        }

        let extraction: &ExtractionResult = document
            .extraction
            .as_ref()
            .ok_or_else(|| CovenantError::internal("normalization reached without an extraction"))?;
        let entity = self
            .normalizer
            .normalize(extraction, document.id, document.prior_entity_id)
            .await?;
        match entity {
            NormalizedEntity::Contract(id) => document.contract_id = Some(id),
            NormalizedEntity::Invoice(id) => document.invoice_id = Some(id),
        }
        document.prior_entity_id = None;
        Ok(())
    }

    async fn validation(&self, document: &mut Document) -> Result<(), StageError> {
        if document.validation_id.is_some() {
            return Ok(());
        }
        let invoice_id = document
            .invoice_id
            .ok_or_else(|| CovenantError::internal("validation reached without an invoice"))?;

        let validation_id = self
            .orchestrator
            .run_validation(invoice_id, document.uploaded_by)
            .await
            .map_err(StageError::Validation)?;
        document.validation_id = Some(validation_id);
        Ok(())
    }
}

fn ocr_text(document: &Document) -> CovenantResult<&str> {
    document
        .ocr_text
        .as_deref()
        .ok_or_else(|| CovenantError::internal("stage reached without OCR text"))
}
