//! Document domain models.
//!
//! A document is one uploaded contract or invoice file together with the
//! persisted outputs of every pipeline stage it has passed through.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::extraction::{ExtractionResult, TypeDetection};

/// Declared (or detected) business type of an uploaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Contract,
    Invoice,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Contract => "contract",
            Self::Invoice => "invoice",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "contract" => Some(Self::Contract),
            "invoice" => Some(Self::Invoice),
            _ => None,
        }
    }
}

impl std::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline stage of a document.
///
/// The happy path is strictly ordered:
/// `uploaded → ocr → type_validation → extraction → normalization → validation → completed`.
/// Contracts go from `normalization` straight to `completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStage {
    Uploaded,
    Ocr,
    TypeValidation,
    Extraction,
    Normalization,
    Validation,
    Completed,
    /// Ingestion failed; `failed_stage` on the document says where.
    Error,
    /// Entities were ingested but reconciliation failed.
    ValidationError,
}

impl DocumentStage {
    /// Happy-path order shared by both document types.
    pub const SEQUENCE: [DocumentStage; 7] = [
        DocumentStage::Uploaded,
        DocumentStage::Ocr,
        DocumentStage::TypeValidation,
        DocumentStage::Extraction,
        DocumentStage::Normalization,
        DocumentStage::Validation,
        DocumentStage::Completed,
    ];

    /// Position on the happy path; `None` for the failure stages.
    pub fn ordinal(&self) -> Option<usize> {
        Self::SEQUENCE.iter().position(|s| s == self)
    }

    /// The stage that follows `self` for a document of the given type.
    pub fn next_for(&self, document_type: DocumentType) -> Option<DocumentStage> {
        use DocumentStage::*;

        match (self, document_type) {
            (Uploaded, _) => Some(Ocr),
            (Ocr, _) => Some(TypeValidation),
            (TypeValidation, _) => Some(Extraction),
            (Extraction, _) => Some(Normalization),
            (Normalization, DocumentType::Contract) => Some(Completed),
            (Normalization, DocumentType::Invoice) => Some(Validation),
            (Validation, DocumentType::Invoice) => Some(Completed),
            _ => None,
        }
    }

    pub fn can_transition_to(&self, target: DocumentStage, document_type: DocumentType) -> bool {
        use DocumentStage::*;

        match (self, target) {
            (Validation, ValidationError) => true,
            (current, Error) => !current.is_terminal(),
            (current, target) => current.next_for(document_type) == Some(target),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DocumentStage::Completed | DocumentStage::Error | DocumentStage::ValidationError
        )
    }

    /// True when the document's entities exist, even if reconciliation failed.
    pub fn is_ingested(&self) -> bool {
        matches!(self, DocumentStage::Completed | DocumentStage::ValidationError)
    }

    /// Coarse progress figure exposed to status pollers.
    pub fn progress_percent(&self) -> u8 {
        match self {
            Self::Uploaded => 5,
            Self::Ocr => 20,
            Self::TypeValidation => 35,
            Self::Extraction => 50,
            Self::Normalization => 70,
            Self::Validation => 85,
            Self::Completed | Self::ValidationError => 100,
            Self::Error => 0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uploaded => "uploaded",
            Self::Ocr => "ocr",
            Self::TypeValidation => "type_validation",
            Self::Extraction => "extraction",
            Self::Normalization => "normalization",
            Self::Validation => "validation",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::ValidationError => "validation_error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::SEQUENCE
            .iter()
            .chain([DocumentStage::Error, DocumentStage::ValidationError].iter())
            .find(|stage| stage.as_str() == s)
            .copied()
    }
}

impl std::fmt::Display for DocumentStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid stage transition for {document_type} document: {from} -> {to}")]
pub struct StageTransitionError {
    pub document_type: DocumentType,
    pub from: DocumentStage,
    pub to: DocumentStage,
}

/// Uploaded document plus the persisted output of each pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub id: Uuid,
    pub file_name: String,
    pub content_type: String,
    pub file_size: i64,
    pub declared_type: DocumentType,
    pub content_hash: String,
    pub storage_locator: String,
    pub stage: DocumentStage,
    pub failed_stage: Option<DocumentStage>,
    pub processing_error: Option<String>,
    pub page_count: Option<u32>,
    pub ocr_text: Option<String>,
    pub detected_type: Option<TypeDetection>,
    pub extraction: Option<ExtractionResult>,
    pub contract_id: Option<Uuid>,
    pub invoice_id: Option<Uuid>,
    pub validation_id: Option<Uuid>,
    /// Contract or invoice written by an earlier extraction of this
    /// document, kept across re-extraction.
    #[serde(default)]
    pub prior_entity_id: Option<Uuid>,
    pub uploaded_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    pub fn new(
        file_name: String,
        content_type: String,
        file_size: i64,
        declared_type: DocumentType,
        content_hash: String,
        storage_locator: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            file_name,
            content_type,
            file_size,
            declared_type,
            content_hash,
            storage_locator,
            stage: DocumentStage::Uploaded,
            failed_stage: None,
            processing_error: None,
            page_count: None,
            ocr_text: None,
            detected_type: None,
            extraction: None,
            contract_id: None,
            invoice_id: None,
            validation_id: None,
            prior_entity_id: None,
            uploaded_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `target`, refusing anything off the fixed sequence.
    pub fn advance_to(&mut self, target: DocumentStage) -> Result<(), StageTransitionError> {
        if !self.stage.can_transition_to(target, self.declared_type) {
            return Err(StageTransitionError {
                document_type: self.declared_type,
                from: self.stage,
                to: target,
            });
        }
        self.stage = target;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Record an ingestion failure at the current stage.
    pub fn fail(&mut self, message: impl Into<String>) {
        if !self.stage.is_terminal() {
            self.failed_stage = Some(self.stage);
        }
        self.stage = DocumentStage::Error;
        self.processing_error = Some(message.into());
        self.updated_at = Utc::now();
    }

    /// Record a reconciliation failure; the ingested entities stay valid.
    pub fn fail_validation(&mut self, message: impl Into<String>) {
        self.failed_stage = Some(DocumentStage::Validation);
        self.stage = DocumentStage::ValidationError;
        self.processing_error = Some(message.into());
        self.updated_at = Utc::now();
    }

    /// Put the document back on the stage it failed at so it can be re-run.
    pub fn reset_for_resubmission(&mut self) -> DocumentStage {
        let resume_at = self.failed_stage.unwrap_or(DocumentStage::Uploaded);
        self.stage = resume_at;
        self.failed_stage = None;
        self.processing_error = None;
        self.updated_at = Utc::now();
        resume_at
    }

    /// Rewind to an earlier stage for an explicit re-entry (re-extract).
    pub fn rewind_to(&mut self, stage: DocumentStage) {
        self.stage = stage;
        self.failed_stage = None;
        self.processing_error = None;
        self.updated_at = Utc::now();
    }

    pub fn requires_human_review(&self) -> bool {
        self.extraction
            .as_ref()
            .map(|e| e.metadata.requires_human_review)
            .unwrap_or(false)
    }

    pub fn status(&self) -> DocumentStatus {
        DocumentStatus {
            document_id: self.id,
            document_type: self.declared_type,
            stage: self.stage,
            progress_percent: self.stage.progress_percent(),
            failed_stage: self.failed_stage,
            error: self.processing_error.clone(),
            requires_human_review: self.requires_human_review(),
            contract_id: self.contract_id,
            invoice_id: self.invoice_id,
            validation_id: self.validation_id,
            updated_at: self.updated_at,
        }
    }
}

/// Read-only view handed to status pollers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentStatus {
    pub document_id: Uuid,
    pub document_type: DocumentType,
    pub stage: DocumentStage,
    pub progress_percent: u8,
    pub failed_stage: Option<DocumentStage>,
    pub error: Option<String>,
    pub requires_human_review: bool,
    pub contract_id: Option<Uuid>,
    pub invoice_id: Option<Uuid>,
    pub validation_id: Option<Uuid>,
    pub updated_at: DateTime<Utc>,
}
