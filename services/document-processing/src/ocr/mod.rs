//! Text Extraction
//!
//! The OCR stage: raw upload bytes in, plain text and a page count out.
//! PDFs are read from their text layer, DOCX from `word/document.xml` and
//! Word 97-2003 files from the `WordDocument` stream.

mod docx;
mod word97;

use std::fmt;

use async_trait::async_trait;

use covenant_utils::{file_extension, CovenantError, CovenantResult};

/// OLE2 compound file signature shared by all Office 97-2003 formats.
const CFB_SIGNATURE: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
const ZIP_SIGNATURE: &[u8] = b"PK\x03\x04";

/// Plain text recovered from an upload.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedText {
    pub text: String,
    pub page_count: u32,
}

impl ExtractedText {
    /// Pages are separated by form feeds.
    pub fn from_text(text: String) -> Self {
        let page_count = text.matches('\u{c}').count() as u32 + 1;
        Self { text, page_count }
    }
}

#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, file_name: &str, content_type: &str, data: &[u8]) -> CovenantResult<ExtractedText>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    Docx,
    Doc,
}

impl DocumentFormat {
    /// Magic bytes decide; the extension and content type are consulted only
    /// when the bytes carry no known signature.
    pub fn detect(file_name: &str, content_type: &str, data: &[u8]) -> Option<Self> {
        if data.starts_with(b"%PDF") {
            return Some(Self::Pdf);
        }
        if data.starts_with(ZIP_SIGNATURE) {
            return Some(Self::Docx);
        }
        if data.starts_with(&CFB_SIGNATURE) {
            return Some(Self::Doc);
        }

        match file_extension(file_name).as_deref() {
            Some("pdf") => return Some(Self::Pdf),
            Some("docx") => return Some(Self::Docx),
            Some("doc") => return Some(Self::Doc),
            _ => {}
        }

        let content_type = content_type.to_ascii_lowercase();
        if content_type.contains("pdf") {
            Some(Self::Pdf)
        } else if content_type.contains("wordprocessingml") {
            Some(Self::Docx)
        } else if content_type.contains("msword") {
            Some(Self::Doc)
        } else {
            None
        }
    }

    fn read_text(self, data: &[u8]) -> CovenantResult<String> {
        match self {
            Self::Pdf => pdf_extract::extract_text_from_mem(data)
                .map_err(|e| CovenantError::extraction(format!("failed to extract text from PDF: {}", e))),
            Self::Docx => docx::read_text(data),
            Self::Doc => word97::read_text(data),
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pdf => write!(f, "PDF"),
            Self::Docx => write!(f, "DOCX"),
            Self::Doc => write!(f, "DOC"),
        }
    }
}

/// Text extraction for every upload format the boundary accepts.
#[derive(Debug, Default, Clone)]
pub struct DocumentTextExtractor;

impl DocumentTextExtractor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TextExtractor for DocumentTextExtractor {
    async fn extract(&self, file_name: &str, content_type: &str, data: &[u8]) -> CovenantResult<ExtractedText> {
        let format = DocumentFormat::detect(file_name, content_type, data).ok_or_else(|| {
            CovenantError::UnsupportedMediaType {
                media_type: format!("'{}' ({})", file_name, content_type),
            }
        })?;

        let bytes = data.to_vec();
        let text = tokio::task::spawn_blocking(move || format.read_text(&bytes))
            .await
            .map_err(|e| CovenantError::internal(format!("text extraction task failed: {}", e)))??;

        let extracted = ExtractedText::from_text(text);
        if extracted.text.trim().is_empty() {
            return Err(CovenantError::extraction(match format {
                DocumentFormat::Pdf => "PDF has no text layer; scanned images need OCR before upload".to_string(),
                other => format!("{} document contains no text", other),
            }));
        }

        tracing::debug!(
            file_name,
            %format,
            pages = extracted.page_count,
            chars = extracted.text.len(),
            "Extracted document text"
        );
        Ok(extracted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_count_from_form_feeds() {
        assert_eq!(ExtractedText::from_text("one page".into()).page_count, 1);
        assert_eq!(ExtractedText::from_text("p1\u{c}p2\u{c}p3".into()).page_count, 3);
    }

    #[test]
    fn test_format_detection_prefers_signatures() {
        assert_eq!(
            DocumentFormat::detect("scan.doc", "application/msword", b"%PDF-1.7"),
            Some(DocumentFormat::Pdf)
        );
        assert_eq!(
            DocumentFormat::detect("renamed.doc", "application/msword", b"PK\x03\x04rest"),
            Some(DocumentFormat::Docx)
        );
        assert_eq!(
            DocumentFormat::detect("old.doc", "application/octet-stream", &CFB_SIGNATURE),
            Some(DocumentFormat::Doc)
        );
        assert_eq!(
            DocumentFormat::detect("contract.docx", "application/octet-stream", b"??"),
            Some(DocumentFormat::Docx)
        );
        assert_eq!(DocumentFormat::detect("photo.png", "image/png", b"\x89PNG"), None);
    }

    #[tokio::test]
    async fn test_docx_upload_yields_text() {
        let data = docx::tests::package(
            r#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>
                <w:p><w:r><w:t>SERVICES AGREEMENT SVC-2024-009</w:t></w:r></w:p>
            </w:body></w:document>"#,
        );
        let extracted = DocumentTextExtractor::new()
            .extract(
                "contract.docx",
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
                &data,
            )
            .await
            .unwrap();
        assert_eq!(extracted.text.trim(), "SERVICES AGREEMENT SVC-2024-009");
        assert_eq!(extracted.page_count, 1);
    }

    #[tokio::test]
    async fn test_unknown_format_is_unsupported() {
        let err = DocumentTextExtractor::new()
            .extract("photo.png", "image/png", b"\x89PNG")
            .await
            .unwrap_err();
        assert_eq!(err.http_status_code(), 415);
    }

    #[tokio::test]
    async fn test_garbage_pdf_fails() {
        let result = DocumentTextExtractor::new()
            .extract("broken.pdf", "application/pdf", b"%PDF-1.4 not really")
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_broken_docx_is_an_extraction_error() {
        let err = DocumentTextExtractor::new()
            .extract("contract.docx", "application/octet-stream", b"PK\x03\x04truncated")
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "EXTRACTION_ERROR");
    }
}
