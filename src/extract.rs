//! Page-wise text extraction for source documents.
//!
//! PDFs are extracted page by page so every chunk can carry the page it came
//! from. Plain text and Markdown are a single page. Extraction never panics
//! into the caller: malformed input comes back as an [`ExtractError`].

use std::path::Path;

use cardio_rag_core::models::PageText;

/// Document kinds the extractor understands, chosen by file extension.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DocumentKind {
    Pdf,
    PlainText,
}

impl DocumentKind {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(DocumentKind::Pdf),
            "txt" | "md" | "markdown" => Some(DocumentKind::PlainText),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub enum ExtractError {
    Pdf(String),
    Encoding(String),
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::Pdf(e) => write!(f, "PDF extraction failed: {}", e),
            ExtractError::Encoding(e) => write!(f, "text is not valid UTF-8: {}", e),
        }
    }
}

impl std::error::Error for ExtractError {}

/// Extract pages from raw file contents. Pages with no text are dropped but
/// the remaining pages keep their original 1-based numbers.
pub fn extract_pages(bytes: &[u8], kind: DocumentKind) -> Result<Vec<PageText>, ExtractError> {
    match kind {
        DocumentKind::Pdf => extract_pdf(bytes),
        DocumentKind::PlainText => extract_plain(bytes),
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<Vec<PageText>, ExtractError> {
    let pages = pdf_extract::extract_text_from_mem_by_pages(bytes)
        .map_err(|e| ExtractError::Pdf(e.to_string()))?;
    Ok(number_pages(pages))
}

fn extract_plain(bytes: &[u8]) -> Result<Vec<PageText>, ExtractError> {
    let text = std::str::from_utf8(bytes).map_err(|e| ExtractError::Encoding(e.to_string()))?;
    Ok(number_pages(vec![text.to_string()]))
}

fn number_pages(pages: Vec<String>) -> Vec<PageText> {
    pages
        .into_iter()
        .enumerate()
        .filter(|(_, text)| !text.trim().is_empty())
        .map(|(i, text)| PageText {
            page_num: i as u32 + 1,
            text,
        })
        .collect()
}
