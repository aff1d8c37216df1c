//! PDF Split algorithm
//!
//! Extracts pages from a PDF, either into one document or one document per
//! page packed into a ZIP archive.

use crate::archive::build_zip;
use crate::artifact::{Artifact, EXTRACTED_PDF, SPLIT_ZIP};
use crate::error::ToolError;
use crate::range::PageSelection;
use crate::state::ToolFileState;
use lopdf::Document;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitMode {
    /// All selected pages in one PDF
    #[default]
    Extract,
    /// One PDF per selected page, zipped
    EachPage,
}

/// Run the split tool on its loaded document and a page-range expression
pub fn split_state(
    state: &ToolFileState,
    expression: &str,
    mode: SplitMode,
) -> Result<Artifact, ToolError> {
    state.require_ready()?;
    let file = state
        .first()
        .ok_or_else(|| ToolError::validation("Please select a PDF file"))?;

    let total = page_count(&file.bytes)?;
    let selection = PageSelection::parse(expression, total).require_non_empty()?;

    match mode {
        SplitMode::Extract => extract_pages(&file.bytes, &selection),
        SplitMode::EachPage => split_each(&file.bytes, &selection),
    }
}

pub fn page_count(bytes: &[u8]) -> Result<u32, ToolError> {
    let doc = Document::load_mem(bytes).map_err(|e| ToolError::Parse(e.to_string()))?;
    Ok(doc.get_pages().len() as u32)
}

/// Copy the selected pages into `extracted-pages.pdf`
pub fn extract_pages(bytes: &[u8], selection: &PageSelection) -> Result<Artifact, ToolError> {
    let out = split_document(bytes, selection.pages())?;
    tracing::info!(pages = selection.len(), size = out.len(), "extracted pages");
    Ok(Artifact::pdf(EXTRACTED_PDF, out))
}

/// One `page-<n>.pdf` per selected page, zipped into `split-pages.zip`
pub fn split_each(bytes: &[u8], selection: &PageSelection) -> Result<Artifact, ToolError> {
    let doc = Document::load_mem(bytes).map_err(|e| ToolError::Parse(e.to_string()))?;

    let mut entries = Vec::with_capacity(selection.len());
    for &page in selection.pages() {
        tracing::debug!(page, "splitting page");
        let single = keep_pages(&doc, &[page])?;
        entries.push((format!("page-{}.pdf", page), single));
    }

    let zip = build_zip(entries)?;
    tracing::info!(pages = selection.len(), size = zip.len(), "split pages");
    Ok(Artifact::zip(SPLIT_ZIP, zip))
}

/// Split a PDF, extracting only the specified pages (1-indexed)
///
/// Pages outside the document or equal to 0 are rejected; the output keeps
/// the original page order.
pub fn split_document(bytes: &[u8], pages: &[u32]) -> Result<Vec<u8>, ToolError> {
    let doc = Document::load_mem(bytes).map_err(|e| ToolError::Parse(e.to_string()))?;
    keep_pages(&doc, pages)
}

fn keep_pages(doc: &Document, pages: &[u32]) -> Result<Vec<u8>, ToolError> {
    if pages.is_empty() {
        return Err(ToolError::validation("No pages specified"));
    }

    if pages.contains(&0) {
        return Err(ToolError::validation("Page numbers must be >= 1"));
    }

    let page_count = doc.get_pages().len() as u32;

    if let Some(&page) = pages.iter().find(|&&p| p > page_count) {
        return Err(ToolError::Validation(format!(
            "Page {} does not exist (document has {} pages)",
            page, page_count
        )));
    }

    let mut new_doc = doc.clone();

    let pages_to_keep: HashSet<u32> = pages.iter().copied().collect();
    let pages_to_delete: Vec<u32> = (1..=page_count)
        .filter(|p| !pages_to_keep.contains(p))
        .collect();

    // Delete unwanted pages in reverse order to keep numbering stable
    for page_num in pages_to_delete.into_iter().rev() {
        new_doc.delete_pages(&[page_num]);
    }

    // Remove orphaned objects
    new_doc.prune_objects();
    new_doc.compress();

    let mut buffer = Vec::new();
    new_doc
        .save_to(&mut buffer)
        .map_err(|e| ToolError::Operation(format!("Save failed: {}", e)))?;

    Ok(buffer)
}
