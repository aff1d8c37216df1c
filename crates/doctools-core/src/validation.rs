//! Document checks run when a PDF is loaded into a tool

use crate::error::ToolError;
use crate::page_info::{resolve, PageInfo};
use lopdf::{Dictionary, Document, Object};
use serde::Serialize;

/// What the tools show about a loaded document
#[derive(Debug, Clone, Serialize, Default)]
pub struct PdfInfo {
    pub page_count: u32,
    /// Header version, e.g. "1.7"
    pub version: String,
    pub encrypted: bool,
    pub size_bytes: usize,
    pub title: Option<String>,
    pub author: Option<String>,
    pub pages: Vec<PageInfo>,
}

fn check_header(bytes: &[u8]) -> Result<(), ToolError> {
    if bytes.len() < 8 {
        return Err(ToolError::validation("File too small to be a valid PDF"));
    }
    if !bytes.starts_with(b"%PDF-") {
        return Err(ToolError::validation(
            "Not a valid PDF file (missing %PDF- header)",
        ));
    }
    Ok(())
}

/// Parse the document and collect its info; empty documents are rejected
pub fn validate_pdf(bytes: &[u8]) -> Result<PdfInfo, ToolError> {
    check_header(bytes)?;

    let document = Document::load_mem(bytes).map_err(|e| ToolError::Parse(e.to_string()))?;
    let pages = PageInfo::all_from_document(&document)?;
    if pages.is_empty() {
        return Err(ToolError::validation("PDF has no pages"));
    }

    let info = metadata(&document);
    Ok(PdfInfo {
        page_count: pages.len() as u32,
        version: header_version(bytes),
        encrypted: document.is_encrypted(),
        size_bytes: bytes.len(),
        title: info.and_then(|d| text_entry(d, b"Title")),
        author: info.and_then(|d| text_entry(d, b"Author")),
        pages,
    })
}

/// Header and trailer check without parsing, for large files
pub fn quick_validate(bytes: &[u8]) -> Result<(), ToolError> {
    check_header(bytes)?;

    let tail = &bytes[bytes.len().saturating_sub(1024)..];
    if !tail.windows(5).any(|w| w == b"%%EOF") {
        return Err(ToolError::validation(
            "PDF appears truncated (missing %%EOF marker)",
        ));
    }
    Ok(())
}

fn header_version(bytes: &[u8]) -> String {
    bytes
        .get(5..8)
        .and_then(|v| std::str::from_utf8(v).ok())
        .map(|v| v.trim().to_string())
        .unwrap_or_else(|| "1.4".to_string())
}

fn metadata(document: &Document) -> Option<&Dictionary> {
    let info = document.trailer.get(b"Info").ok()?;
    resolve(document, info).as_dict().ok()
}

fn text_entry(dict: &Dictionary, key: &[u8]) -> Option<String> {
    let bytes = dict.get(key).and_then(Object::as_str).ok()?;
    let text = decode_text_string(bytes);
    (!text.is_empty()).then_some(text)
}

/// PDF text strings are UTF-16BE with a BOM or byte-per-char
fn decode_text_string(bytes: &[u8]) -> String {
    if let Some(utf16) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = utf16
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    String::from_utf8_lossy(bytes).into_owned()
}
