use crate::error::ExtractError;
use crate::models::StoredDocument;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use lopdf::Document;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, document: &StoredDocument) -> Result<String, ExtractError>;
}

#[async_trait]
impl<T> TextExtractor for Arc<T>
where
    T: TextExtractor + ?Sized,
{
    async fn extract(&self, document: &StoredDocument) -> Result<String, ExtractError> {
        (**self).extract(document).await
    }
}

/// Pages joined by a blank line so page breaks become paragraph breaks.
pub fn join_pages(pages: &[PageText]) -> String {
    pages
        .iter()
        .map(|page| page.text.trim())
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn extract_page_texts(content: &[u8], filename: &str) -> Result<Vec<PageText>, ExtractError> {
    let document = Document::load_mem(content)
        .map_err(|error| ExtractError::Pdf(format!("{filename}: {error}")))?;

    let mut pages = Vec::new();
    for (page_no, _page_id) in document.get_pages() {
        let text = document
            .extract_text(&[page_no])
            .map_err(|error| ExtractError::Pdf(format!("{filename} page {page_no}: {error}")))?;

        pages.extend(page_if_readable(page_no, &text));
    }

    if pages.is_empty() {
        return Err(ExtractError::EmptyDocument(filename.to_string()));
    }

    Ok(pages)
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

#[async_trait]
impl TextExtractor for LopdfExtractor {
    async fn extract(&self, document: &StoredDocument) -> Result<String, ExtractError> {
        let pages = extract_page_texts(&document.content, &document.reference.filename)?;
        debug!(filename = %document.reference.filename, pages = pages.len(), "extracted pdf text");
        Ok(join_pages(&pages))
    }
}

#[derive(Debug, Clone)]
pub struct OcrEndpointConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
}

impl OcrEndpointConfig {
    /// `None` when the endpoint is blank.
    pub fn from_parts(endpoint: Option<String>, api_key: Option<String>) -> Option<Self> {
        let endpoint = endpoint?.trim().to_string();
        if endpoint.is_empty() {
            return None;
        }

        let api_key = api_key.and_then(|value| {
            let key = value.trim().to_string();
            if key.is_empty() {
                None
            } else {
                Some(key)
            }
        });

        Some(Self { endpoint, api_key })
    }
}

#[derive(Debug, Clone, Serialize)]
struct LlmOcrRequest<'a> {
    pdf_base64: String,
    filename: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
struct LlmOcrResponse {
    pages: Option<Vec<LlmOcrPage>>,
    text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct LlmOcrPage {
    #[serde(default)]
    page: Option<u32>,
    #[serde(default)]
    text: Option<String>,
}

/// Falls back to a multimodal OCR endpoint for scanned or unparsable PDFs.
pub struct OcrFallbackExtractor<X> {
    inner: X,
    config: Option<OcrEndpointConfig>,
    client: Client,
}

impl<X> OcrFallbackExtractor<X>
where
    X: TextExtractor,
{
    pub fn new(inner: X, config: Option<OcrEndpointConfig>) -> Self {
        Self {
            inner,
            config,
            client: Client::new(),
        }
    }

    async fn extract_with_ocr(
        &self,
        cfg: &OcrEndpointConfig,
        document: &StoredDocument,
    ) -> Result<String, ExtractError> {
        let filename = document.reference.filename.as_str();
        let payload = LlmOcrRequest {
            pdf_base64: STANDARD.encode(&document.content),
            filename,
        };

        let mut request = self
            .client
            .post(&cfg.endpoint)
            .header("content-type", "application/json")
            .json(&payload);

        if let Some(api_key) = &cfg.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            return Err(ExtractError::Ocr(format!(
                "multimodal OCR request to {} returned {}",
                cfg.endpoint,
                response.status()
            )));
        }

        let payload: LlmOcrResponse = response.json().await?;
        let pages = payload_to_pages(&payload, filename)?;
        Ok(join_pages(&pages))
    }
}

#[async_trait]
impl<X> TextExtractor for OcrFallbackExtractor<X>
where
    X: TextExtractor,
{
    async fn extract(&self, document: &StoredDocument) -> Result<String, ExtractError> {
        let parse_error = match self.inner.extract(document).await {
            Ok(text) => return Ok(text),
            Err(error @ (ExtractError::Pdf(_) | ExtractError::EmptyDocument(_))) => error,
            Err(error) => return Err(error),
        };

        let Some(cfg) = &self.config else {
            return Err(parse_error);
        };

        warn!(
            filename = %document.reference.filename,
            reason = %parse_error,
            "pdf text extraction failed, trying OCR endpoint"
        );

        self.extract_with_ocr(cfg, document)
            .await
            .map_err(|ocr_error| {
                ExtractError::Pdf(format!(
                    "{parse_error}; multimodal OCR fallback failed: {ocr_error}"
                ))
            })
    }
}

fn page_if_readable(number: u32, text: &str) -> Option<PageText> {
    let text = text.trim();
    (!text.is_empty()).then(|| PageText {
        number,
        text: text.to_string(),
    })
}

/// Prefers the structured page list; falls back to raw text split on form feeds.
fn payload_to_pages(payload: &LlmOcrResponse, filename: &str) -> Result<Vec<PageText>, ExtractError> {
    let listed = payload
        .pages
        .iter()
        .flatten()
        .filter_map(|page| page_if_readable(page.page.unwrap_or(1), page.text.as_deref()?))
        .collect::<Vec<_>>();
    if !listed.is_empty() {
        return Ok(listed);
    }

    let split = payload
        .text
        .iter()
        .flat_map(|raw| raw.split('\u{000c}'))
        .zip(1u32..)
        .filter_map(|(text, number)| page_if_readable(number, text))
        .collect::<Vec<_>>();
    if !split.is_empty() {
        return Ok(split);
    }

    Err(ExtractError::Ocr(format!(
        "multimodal OCR response was empty for {filename}"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocumentRef;

    fn stored(content: &[u8]) -> StoredDocument {
        StoredDocument {
            reference: DocumentRef {
                document_id: "id".to_string(),
                filename: "broken.pdf".to_string(),
                location: "/tmp/broken.pdf".to_string(),
            },
            content: content.to_vec(),
        }
    }

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn ocr_pages_skip_blank_entries() -> TestResult {
        let response: LlmOcrResponse = serde_json::from_str(
            r#"{"pages":[{"page":1,"text":"   "},{"page":4,"text":" Abstract classes "},{"page":5}]}"#,
        )?;

        let pages = payload_to_pages(&response, "scan.pdf")?;
        assert_eq!(pages.len(), 1);
        assert_eq!((pages[0].number, pages[0].text.as_str()), (4, "Abstract classes"));
        Ok(())
    }

    #[test]
    fn ocr_text_is_used_when_page_list_is_blank() -> TestResult {
        let response: LlmOcrResponse = serde_json::from_str(
            r#"{"pages":[{"page":1,"text":""}],"text":"Classes\fObjects\n\f  "}"#,
        )?;

        let pages = payload_to_pages(&response, "scan.pdf")?;
        let numbers = pages.iter().map(|page| page.number).collect::<Vec<_>>();
        assert_eq!(numbers, vec![1, 2]);
        assert_eq!(join_pages(&pages), "Classes\n\nObjects");
        Ok(())
    }

    #[test]
    fn ocr_response_without_text_is_an_error() -> TestResult {
        let response: LlmOcrResponse = serde_json::from_str(r#"{"pages":[],"text":" \f "}"#)?;
        assert!(matches!(
            payload_to_pages(&response, "scan.pdf"),
            Err(ExtractError::Ocr(_))
        ));
        Ok(())
    }

    #[test]
    fn blank_ocr_endpoint_disables_fallback() {
        assert!(OcrEndpointConfig::from_parts(Some("  ".to_string()), None).is_none());
        let cfg = OcrEndpointConfig::from_parts(
            Some("http://ocr.local/extract".to_string()),
            Some(" ".to_string()),
        );
        assert!(cfg.is_some_and(|cfg| cfg.api_key.is_none()));
    }

    #[tokio::test]
    async fn malformed_pdf_is_an_extraction_error() {
        let result = LopdfExtractor.extract(&stored(b"%PDF-1.4\n%broken")).await;
        assert!(matches!(
            result,
            Err(ExtractError::Pdf(_) | ExtractError::EmptyDocument(_))
        ));
    }

    #[tokio::test]
    async fn fallback_without_endpoint_returns_parse_error() {
        let extractor = OcrFallbackExtractor::new(LopdfExtractor, None);
        let result = extractor.extract(&stored(b"not a pdf")).await;
        assert!(matches!(
            result,
            Err(ExtractError::Pdf(_) | ExtractError::EmptyDocument(_))
        ));
    }
}
