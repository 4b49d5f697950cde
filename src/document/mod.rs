//! Plain-text extraction from uploaded documents.
//!
//! Extraction is single shot: the whole blob is parsed, every page is turned
//! into text and the pages are joined with a newline. There is no chunking,
//! OCR or layout preservation.

use log::{ debug, warn };
use lopdf::Document;
use thiserror::Error;

pub const PDF_MIME_TYPE: &str = "application/pdf";

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("{0}")]
    Parse(String),
}

impl From<lopdf::Error> for ExtractError {
    fn from(err: lopdf::Error) -> Self {
        ExtractError::Parse(err.to_string())
    }
}

pub trait TextExtractor: Send + Sync {
    fn extract(&self, bytes: &[u8]) -> Result<String, ExtractError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PdfExtractor;

impl TextExtractor for PdfExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<String, ExtractError> {
        let document = Document::load_mem(bytes)?;
        let pages = document.get_pages();
        debug!("Extracting text from {} PDF page(s)", pages.len());

        // BTreeMap keys are page numbers, so iteration is already in page order.
        let texts: Vec<String> = pages
            .keys()
            .map(|&page_number| {
                match document.extract_text(&[page_number]) {
                    // lopdf ends every text object with a newline.
                    Ok(text) => text.trim_end_matches('\n').to_string(),
                    Err(e) => {
                        warn!("No text extracted from page {}: {}", page_number, e);
                        String::new()
                    }
                }
            })
            .collect();

        Ok(texts.join("\n"))
    }
}

/// True when an upload claims to be a PDF, either by MIME type or by file name.
pub fn is_pdf_upload(file_name: &str, content_type: Option<&str>) -> bool {
    let by_mime = content_type
        .map(|ct| ct.split(';').next().unwrap_or("").trim().eq_ignore_ascii_case(PDF_MIME_TYPE))
        .unwrap_or(false);
    by_mime || file_name.to_lowercase().ends_with(".pdf")
}
