//! Pipeline Coordinator
//!
//! The upload boundary and the re-entry points. `submit` returns as soon as
//! the document is stored at `uploaded`; everything after that happens on
//! the [`PipelineQueue`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use covenant_database::{BlobStore, RecordStore};
use covenant_models::{Document, DocumentStage, DocumentStatus, DocumentType};
use covenant_reconciliation::ValidationOrchestrator;
use covenant_utils::{
    log_warn, validate_file_size, validate_file_type, CovenantError, CovenantResult, PipelineConfig,
};

use crate::metrics::PipelineMetrics;
use crate::queue::PipelineQueue;

/// Raw upload as received at the boundary.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub content_type: String,
    pub document_type: DocumentType,
    pub data: Vec<u8>,
    pub uploaded_by: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubmissionReceipt {
    pub document_id: Uuid,
    pub stage: DocumentStage,
    pub content_hash: String,
    /// Earlier documents with identical bytes.
    pub duplicate_of: Vec<Uuid>,
}

#[derive(Clone)]
pub struct PipelineCoordinator {
    store: Arc<dyn RecordStore>,
    blobs: Arc<dyn BlobStore>,
    orchestrator: ValidationOrchestrator,
    queue: PipelineQueue,
    max_upload_bytes: u64,
    allowed_extensions: Vec<String>,
    metrics: Option<PipelineMetrics>,
}

impl PipelineCoordinator {
    pub fn new(
        store: Arc<dyn RecordStore>,
        blobs: Arc<dyn BlobStore>,
        orchestrator: ValidationOrchestrator,
        queue: PipelineQueue,
        config: &PipelineConfig,
        max_upload_bytes: u64,
    ) -> Self {
        Self {
            store,
            blobs,
            orchestrator,
            queue,
            max_upload_bytes,
            allowed_extensions: config.allowed_extensions.clone(),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: PipelineMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn queue(&self) -> &PipelineQueue {
        &self.queue
    }

    pub fn orchestrator(&self) -> &ValidationOrchestrator {
        &self.orchestrator
    }

    /// Store the upload and hand it to the background queue.
    pub async fn submit(&self, upload: Upload) -> CovenantResult<SubmissionReceipt> {
        validate_file_size(upload.data.len() as u64, self.max_upload_bytes)?;
        validate_file_type(&upload.file_name, &self.allowed_extensions)?;
        if upload.data.is_empty() {
            return Err(CovenantError::validation("file", "uploaded file is empty"));
        }

        let content_hash = content_hash(&upload.data);
        let duplicate_of: Vec<Uuid> = self
            .store
            .find_documents_by_hash(&content_hash)
            .await?
            .into_iter()
            .map(|d| d.id)
            .collect();
        if !duplicate_of.is_empty() {
            tracing::info!(
                file_name = %upload.file_name,
                %content_hash,
                previous = duplicate_of.len(),
                "Upload matches an existing document"
            );
        }

        let document_id = Uuid::new_v4();
        let storage_locator = self.blobs.put(document_id, &upload.file_name, &upload.data).await?;

        let mut document = Document::new(
            upload.file_name,
            upload.content_type,
            upload.data.len() as i64,
            upload.document_type,
            content_hash.clone(),
            storage_locator,
        );
        document.id = document_id;
        document.uploaded_by = upload.uploaded_by;
        self.store.insert_document(&document).await?;

        if let Some(metrics) = &self.metrics {
            metrics
                .documents_submitted
                .with_label_values(&[document.declared_type.as_str()])
                .inc();
        }
        tracing::info!(
            %document_id,
            document_type = %document.declared_type,
            file_size = document.file_size,
            "Document submitted"
        );

        self.schedule(&mut document).await?;

        Ok(SubmissionReceipt {
            document_id,
            stage: document.stage,
            content_hash,
            duplicate_of,
        })
    }

    pub async fn status(&self, document_id: Uuid) -> CovenantResult<DocumentStatus> {
        Ok(self.load(document_id).await?.status())
    }

    /// Clear a failure and resume at the stage that failed.
    pub async fn resubmit(&self, document_id: Uuid) -> CovenantResult<DocumentStatus> {
        let mut document = self.load(document_id).await?;
        if !matches!(document.stage, DocumentStage::Error | DocumentStage::ValidationError) {
            return Err(CovenantError::conflict(format!(
                "document {} is at stage {}; only failed documents can be resubmitted",
                document_id, document.stage
            )));
        }

        let resume_at = document.reset_for_resubmission();
        if resume_at == DocumentStage::TypeValidation {
            document.detected_type = None;
        }
        self.store.update_document(&document).await?;
        tracing::info!(%document_id, stage = %resume_at, "Document resubmitted");

        self.schedule(&mut document).await?;
        Ok(document.status())
    }

    /// Re-run extraction, normalization and validation from the stored text.
    /// The document's current entity is handed to normalization, so the
    /// rerun updates it rather than creating a second one.
    pub async fn reextract(&self, document_id: Uuid) -> CovenantResult<DocumentStatus> {
        let mut document = self.load(document_id).await?;
        if !document.stage.is_terminal() {
            return Err(CovenantError::conflict(format!(
                "document {} is still processing (stage {})",
                document_id, document.stage
            )));
        }
        if document.ocr_text.is_none() {
            return Err(CovenantError::conflict(format!(
                "document {} has no extracted text; resubmit it instead",
                document_id
            )));
        }
        let type_confirmed = document
            .detected_type
            .as_ref()
            .and_then(|d| d.detected.as_document_type())
            == Some(document.declared_type);
        if !type_confirmed {
            return Err(CovenantError::conflict(format!(
                "document {} has not passed type validation; resubmit it instead",
                document_id
            )));
        }

        document.extraction = None;
        let current = match document.declared_type {
            DocumentType::Contract => document.contract_id.take(),
            DocumentType::Invoice => document.invoice_id.take(),
        };
        if current.is_some() {
            document.prior_entity_id = current;
        }
        document.validation_id = None;
        document.rewind_to(DocumentStage::Extraction);
        self.store.update_document(&document).await?;
        tracing::info!(%document_id, "Document re-extraction requested");

        self.schedule(&mut document).await?;
        Ok(document.status())
    }

    /// Write a fresh validation for `invoice_id`. A source document parked at
    /// `validation_error` is completed by a successful run.
    pub async fn revalidate(&self, invoice_id: Uuid, actor_id: Option<Uuid>) -> CovenantResult<Uuid> {
        let invoice = self
            .store
            .get_invoice(invoice_id)
            .await?
            .ok_or_else(|| CovenantError::not_found(format!("invoice {}", invoice_id)))?;

        let validation_id = self.orchestrator.run_validation(invoice_id, actor_id).await?;

        if let Some(document_id) = invoice.source_document_id {
            if let Some(mut document) = self.store.get_document(document_id).await? {
                match document.stage {
                    DocumentStage::ValidationError => {
                        document.validation_id = Some(validation_id);
                        document.rewind_to(DocumentStage::Completed);
                        self.store.update_document(&document).await?;
                        tracing::info!(%document_id, %validation_id, "Document completed by revalidation");
                    }
                    DocumentStage::Completed => {
                        document.validation_id = Some(validation_id);
                        self.store.update_document(&document).await?;
                    }
                    _ => {}
                }
            }
        }
        Ok(validation_id)
    }

    /// Re-enqueue every document left mid-pipeline by a previous process,
    /// waiting for room when there are more than the queue holds.
    pub async fn recover(&self) -> CovenantResult<usize> {
        let unfinished = self.store.list_unfinished_documents().await?;
        let count = unfinished.len();
        for document in unfinished {
            self.queue.enqueue_wait(document.id).await?;
        }
        if count > 0 {
            tracing::info!(count, "Recovered unfinished documents");
        }
        Ok(count)
    }

    /// Hand `document` to the queue. When the queue is full the document is
    /// parked at `error` so a later resubmit picks it up.
    async fn schedule(&self, document: &mut Document) -> CovenantResult<()> {
        if let Err(e) = self.queue.enqueue(document.id).await {
            log_warn!("Document not scheduled", document_id = %document.id, error = %e);
            document.fail(e.to_string());
            self.store.update_document(document).await?;
            return Err(e);
        }
        Ok(())
    }

    async fn load(&self, document_id: Uuid) -> CovenantResult<Document> {
        self.store
            .get_document(document_id)
            .await?
            .ok_or_else(|| CovenantError::not_found(format!("document {}", document_id)))
    }
}

/// Lowercase hex SHA-256 of the uploaded bytes.
pub fn content_hash(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}
