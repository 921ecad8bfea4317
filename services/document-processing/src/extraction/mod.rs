//! Extraction Gateway
//!
//! Wraps the remote language-model capability: type detection, contract
//! extraction and invoice extraction. Every remote call goes through the
//! retry policy; every reply goes through the tolerant parser, field-level
//! decoding and the required-field fallbacks before it leaves this module.

pub mod client;
pub mod fallback;
pub mod payload;
pub mod prompts;
pub mod repair;
pub mod retry;

pub use client::{CompletionClient, CompletionRequest, ExtractionTask, OpenAiClient};
pub use repair::{parse_tolerant, Repaired};
pub use retry::RetryPolicy;

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use covenant_models::{
    DetectedDocumentType, DetectionMethod, ExtractedDocument, ExtractionMetadata, ExtractionResult,
    ExtractionWarning, RepairTier, TypeDetection,
};
use covenant_utils::{CovenantError, CovenantResult, ExtractionConfig};

/// Confidence assumed when the model does not report one.
pub const BASE_CONFIDENCE: f64 = 0.85;
pub const HEURISTIC_CONFIDENCE: f64 = 0.5;
/// Longest document text sent to the model.
pub const MAX_DOCUMENT_CHARS: usize = 60_000;

const CLASSIFY_KEYS: &[&str] = &["document_type", "confidence"];
const CONTRACT_KEYS: &[&str] = &[
    "contract_id",
    "contract_number",
    "contract_title",
    "effective_date",
    "expiration_date",
    "currency",
];
const INVOICE_KEYS: &[&str] = &[
    "invoice_id",
    "invoice_date",
    "vendor_party_id",
    "contract_reference",
    "currency",
    "total_amount",
];

const CONTRACT_KEYWORDS: &[&str] = &[
    "agreement",
    "contract",
    "whereas",
    "hereby",
    "effective date",
    "term of",
    "termination",
    "parties",
];
const INVOICE_KEYWORDS: &[&str] = &[
    "invoice",
    "bill to",
    "amount due",
    "balance due",
    "remit",
    "subtotal",
    "due date",
    "qty",
];

fn tier_penalty(tier: RepairTier) -> f64 {
    match tier {
        RepairTier::Strict => 0.0,
        RepairTier::Structural => 0.1,
        RepairTier::Salvaged => 0.3,
    }
}

#[derive(Clone)]
pub struct ExtractionGateway {
    client: Arc<dyn CompletionClient>,
    retry: RetryPolicy,
    review_threshold: f64,
}

impl ExtractionGateway {
    pub fn new(client: Arc<dyn CompletionClient>, config: &ExtractionConfig) -> Self {
        Self {
            client,
            retry: RetryPolicy::from_config(config),
            review_threshold: config.review_threshold,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Classify the document. An unreadable reply falls back to a keyword
    /// heuristic; a remote failure is returned as an error.
    pub async fn detect_type(&self, text: &str) -> CovenantResult<TypeDetection> {
        let raw = self.call(ExtractionTask::Classify, prompts::CLASSIFY_PROMPT, text).await?;
        let repaired = parse_tolerant(&raw, CLASSIFY_KEYS);

        let label = repaired
            .value
            .as_ref()
            .and_then(|v| v.get("document_type"))
            .and_then(Value::as_str);

        match label {
            Some(label) => {
                let confidence = repaired
                    .value
                    .as_ref()
                    .and_then(|v| v.get("confidence"))
                    .and_then(Value::as_f64)
                    .unwrap_or(BASE_CONFIDENCE);
                Ok(TypeDetection {
                    detected: DetectedDocumentType::parse(label),
                    confidence: clamp_confidence(confidence - tier_penalty(repaired.tier)),
                    method: DetectionMethod::Model,
                })
            }
            None => {
                tracing::warn!("Classification reply unreadable, using keyword heuristic");
                Ok(detect_by_keywords(text))
            }
        }
    }

    /// Extract a contract. `document_id` seeds any identifier the fallbacks
    /// have to generate.
    pub async fn extract_contract(
        &self,
        document_id: Uuid,
        text: &str,
        page_count: Option<u32>,
    ) -> CovenantResult<ExtractionResult> {
        let repaired = self
            .call_and_repair(ExtractionTask::ExtractContract, prompts::CONTRACT_PROMPT, text, CONTRACT_KEYS)
            .await?;

        let decoded = payload::decode_contract(repaired.value.as_ref().unwrap_or(&Value::Null));
        let mut data = decoded.data;
        let warnings = fallback::apply_contract_fallbacks(&mut data, Utc::now().date_naive(), document_id);

        Ok(self.assemble(
            ExtractedDocument::Contract(data),
            repaired.tier,
            decoded.model_confidence,
            decoded.source_pages,
            decoded.field_errors,
            warnings,
            page_count,
        ))
    }

    pub async fn extract_invoice(
        &self,
        document_id: Uuid,
        text: &str,
        page_count: Option<u32>,
    ) -> CovenantResult<ExtractionResult> {
        let repaired = self
            .call_and_repair(ExtractionTask::ExtractInvoice, prompts::INVOICE_PROMPT, text, INVOICE_KEYS)
            .await?;

        let decoded = payload::decode_invoice(repaired.value.as_ref().unwrap_or(&Value::Null));
        let mut data = decoded.data;
        let warnings = fallback::apply_invoice_fallbacks(&mut data, text, document_id);

        Ok(self.assemble(
            ExtractedDocument::Invoice(data),
            repaired.tier,
            decoded.model_confidence,
            decoded.source_pages,
            decoded.field_errors,
            warnings,
            page_count,
        ))
    }

    async fn call(&self, task: ExtractionTask, prompt: &'static str, text: &str) -> CovenantResult<String> {
        let request = CompletionRequest {
            task,
            system_prompt: prompt,
            document_text: truncate_chars(text, MAX_DOCUMENT_CHARS),
        };
        let label = task.to_string();
        self.retry
            .run(&label, || self.client.complete(&request))
            .await
    }

    async fn call_and_repair(
        &self,
        task: ExtractionTask,
        prompt: &'static str,
        text: &str,
        salvage_keys: &[&str],
    ) -> CovenantResult<Repaired> {
        let raw = self.call(task, prompt, text).await?;
        let repaired = parse_tolerant(&raw, salvage_keys);

        if repaired.value.is_none() {
            return Err(CovenantError::extraction(format!(
                "{} reply contained no usable data",
                task
            )));
        }
        if repaired.tier != RepairTier::Strict {
            tracing::warn!(task = %task, tier = ?repaired.tier, "Model reply needed repair");
        }
        Ok(repaired)
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        &self,
        data: ExtractedDocument,
        tier: RepairTier,
        model_confidence: Option<f64>,
        source_pages: Vec<u32>,
        field_errors: Vec<String>,
        warnings: Vec<ExtractionWarning>,
        page_count: Option<u32>,
    ) -> ExtractionResult {
        let penalties: f64 = warnings.iter().map(|w| w.penalty).sum();
        let base = model_confidence.map(clamp_confidence).unwrap_or(BASE_CONFIDENCE);
        let confidence = clamp_confidence(base - tier_penalty(tier) - penalties);
        let requires_human_review = confidence < self.review_threshold || !field_errors.is_empty();

        ExtractionResult {
            success: true,
            data,
            confidence,
            errors: field_errors.clone(),
            metadata: ExtractionMetadata {
                model: self.client.model().to_string(),
                page_count,
                source_pages,
                repair_tier: tier,
                warnings,
                field_errors,
                requires_human_review,
                extracted_at: Utc::now(),
            },
        }
    }
}

fn clamp_confidence(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => {
            tracing::debug!(chars = max, "Truncated document text for extraction");
            text[..cut].to_string()
        }
        None => text.to_string(),
    }
}

/// Keyword vote over the document text.
pub fn detect_by_keywords(text: &str) -> TypeDetection {
    let lower = text.to_lowercase();
    let score = |keywords: &[&str]| -> usize { keywords.iter().map(|k| lower.matches(k).count()).sum() };
    let contract = score(CONTRACT_KEYWORDS);
    let invoice = score(INVOICE_KEYWORDS);

    let detected = match contract.cmp(&invoice) {
        std::cmp::Ordering::Greater => DetectedDocumentType::Contract,
        std::cmp::Ordering::Less => DetectedDocumentType::Invoice,
        std::cmp::Ordering::Equal => DetectedDocumentType::Other(String::new()),
    };

    TypeDetection {
        detected,
        confidence: HEURISTIC_CONFIDENCE,
        method: DetectionMethod::Heuristic,
    }
}
