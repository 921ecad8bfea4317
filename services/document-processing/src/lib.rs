//! Covenant Document Processing
//!
//! Ingests uploaded contracts and invoices: text extraction, type
//! validation, model-backed field extraction, entity normalization and,
//! for invoices, reconciliation against the matched contract.

pub mod coordinator;
pub mod extraction;
pub mod metrics;
pub mod normalizer;
pub mod ocr;
pub mod pipeline;
pub mod queue;

pub use coordinator::{content_hash, PipelineCoordinator, SubmissionReceipt, Upload};
pub use extraction::{
    detect_by_keywords, CompletionClient, CompletionRequest, ExtractionGateway, ExtractionTask, OpenAiClient,
    RetryPolicy,
};
pub use metrics::PipelineMetrics;
pub use normalizer::{EntityNormalizer, NormalizedEntity, PartyResolver};
pub use ocr::{DocumentFormat, DocumentTextExtractor, ExtractedText, TextExtractor};
pub use pipeline::DocumentPipeline;
pub use queue::PipelineQueue;
