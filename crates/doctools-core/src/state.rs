//! Per-tool pending-file state
//!
//! Each tool owns one explicit state object holding the files the user has
//! queued. Mutators validate against the tool's admission rule and return the
//! re-derived "primary action enabled" flag so an adapter can update its
//! control without re-querying.

use crate::error::ToolError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Upload ceiling for card-printer images
pub const CARD_IMAGE_MAX_BYTES: usize = 10 * 1024 * 1024;

pub const PDF_MIME: &str = "application/pdf";

/// The eight tools of the suite
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ToolKind {
    CardPrinter,
    ImagesToPdf,
    Merge,
    Split,
    PdfToImages,
    Compress,
    Rotate,
    Watermark,
}

impl ToolKind {
    pub const ALL: [ToolKind; 8] = [
        ToolKind::CardPrinter,
        ToolKind::ImagesToPdf,
        ToolKind::Merge,
        ToolKind::Split,
        ToolKind::PdfToImages,
        ToolKind::Compress,
        ToolKind::Rotate,
        ToolKind::Watermark,
    ];

    pub fn admission(self) -> Admission {
        match self {
            ToolKind::CardPrinter => Admission::image().with_max_bytes(CARD_IMAGE_MAX_BYTES),
            ToolKind::ImagesToPdf => Admission::image(),
            _ => Admission::pdf(),
        }
    }

    pub fn minimum(self) -> MinimumRule {
        match self {
            ToolKind::CardPrinter => MinimumRule::CardSlots,
            ToolKind::Merge => MinimumRule::AtLeast(2),
            _ => MinimumRule::AtLeast(1),
        }
    }

    /// Tools that operate on exactly one loaded document
    pub fn is_single_document(self) -> bool {
        matches!(
            self,
            ToolKind::Split
                | ToolKind::PdfToImages
                | ToolKind::Compress
                | ToolKind::Rotate
                | ToolKind::Watermark
        )
    }

    /// Tools whose inputs are PDF documents
    pub fn takes_pdfs(self) -> bool {
        !matches!(self, ToolKind::CardPrinter | ToolKind::ImagesToPdf)
    }

    pub fn label(self) -> &'static str {
        match self {
            ToolKind::CardPrinter => "ID card printer",
            ToolKind::ImagesToPdf => "Images to PDF",
            ToolKind::Merge => "Merge PDF",
            ToolKind::Split => "Split PDF",
            ToolKind::PdfToImages => "PDF to images",
            ToolKind::Compress => "Compress PDF",
            ToolKind::Rotate => "Rotate PDF",
            ToolKind::Watermark => "Watermark PDF",
        }
    }
}

/// Minimum content needed before a tool's primary action is enabled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MinimumRule {
    AtLeast(usize),
    /// Front and back slots must both be filled
    CardSlots,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MimeRule {
    Prefix(&'static str),
    Exact(&'static str),
}

impl MimeRule {
    fn matches(self, mime_type: &str) -> bool {
        match self {
            MimeRule::Prefix(prefix) => mime_type.starts_with(prefix),
            MimeRule::Exact(exact) => mime_type == exact,
        }
    }
}

/// Admission predicate: MIME rule plus an optional size ceiling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub mime: MimeRule,
    pub max_bytes: Option<usize>,
}

impl Admission {
    pub fn image() -> Self {
        Self {
            mime: MimeRule::Prefix("image/"),
            max_bytes: None,
        }
    }

    pub fn pdf() -> Self {
        Self {
            mime: MimeRule::Exact(PDF_MIME),
            max_bytes: None,
        }
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = Some(max_bytes);
        self
    }

    pub fn check(&self, file: &PendingFile) -> Result<(), ToolError> {
        if !self.mime.matches(&file.mime_type) {
            let msg = match self.mime {
                MimeRule::Prefix(_) => format!("{}: please upload an image file", file.name),
                MimeRule::Exact(_) => format!("{}: please select a PDF file", file.name),
            };
            return Err(ToolError::Validation(msg));
        }

        if let Some(max) = self.max_bytes {
            if file.size() > max {
                return Err(ToolError::Validation(format!(
                    "{}: file size should not exceed {}MB",
                    file.name,
                    max / (1024 * 1024)
                )));
            }
        }

        Ok(())
    }
}

/// A user-supplied file awaiting processing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingFile {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl PendingFile {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }

    /// Build from a path on disk, guessing the MIME type from the extension
    pub fn from_path(path: &Path, bytes: Vec<u8>) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self::new(name, guess_mime(path), bytes)
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// MIME type from a file extension, `application/octet-stream` when unknown
pub fn guess_mime(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "pdf" => PDF_MIME,
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        _ => "application/octet-stream",
    }
}

/// Result of a state mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChange {
    pub action_enabled: bool,
    pub len: usize,
}

/// Ordered list of pending files for one tool
#[derive(Debug, Clone)]
pub struct ToolFileState {
    kind: ToolKind,
    admission: Admission,
    items: Vec<PendingFile>,
}

impl ToolFileState {
    pub fn new(kind: ToolKind) -> Self {
        Self::with_admission(kind, kind.admission())
    }

    /// Override the default admission rule (e.g. a configured size ceiling)
    pub fn with_admission(kind: ToolKind, admission: Admission) -> Self {
        Self {
            kind,
            admission,
            items: Vec::new(),
        }
    }

    pub fn kind(&self) -> ToolKind {
        self.kind
    }

    /// Append a file, or replace the loaded one for single-document tools
    pub fn add(&mut self, file: PendingFile) -> Result<StateChange, ToolError> {
        self.admission.check(&file)?;

        if self.kind.is_single_document() {
            self.items.clear();
        }
        tracing::debug!(tool = self.kind.label(), file = %file.name, "file admitted");
        self.items.push(file);
        Ok(self.change())
    }

    /// Add several files at once
    ///
    /// Every file is checked before any is queued, so one rejection leaves
    /// the list untouched.
    pub fn add_all(
        &mut self,
        files: impl IntoIterator<Item = PendingFile>,
    ) -> Result<StateChange, ToolError> {
        let files: Vec<PendingFile> = files.into_iter().collect();
        for file in &files {
            self.admission.check(file)?;
        }
        for file in files {
            self.add(file)?;
        }
        Ok(self.change())
    }

    /// Remove the item at `index`; out-of-range indices are a no-op
    pub fn remove_at(&mut self, index: usize) -> (Option<PendingFile>, StateChange) {
        let removed = (index < self.items.len()).then(|| self.items.remove(index));
        (removed, self.change())
    }

    /// Move the item at `from` so it ends up at `to`
    pub fn move_item(&mut self, from: usize, to: usize) -> Result<StateChange, ToolError> {
        if from >= self.items.len() || to >= self.items.len() {
            return Err(ToolError::validation("File index out of bounds"));
        }
        let item = self.items.remove(from);
        self.items.insert(to, item);
        Ok(self.change())
    }

    pub fn clear(&mut self) -> StateChange {
        self.items.clear();
        self.change()
    }

    pub fn is_action_enabled(&self) -> bool {
        match self.kind.minimum() {
            MinimumRule::AtLeast(n) => self.items.len() >= n,
            MinimumRule::CardSlots => false,
        }
    }

    pub fn items(&self) -> &[PendingFile] {
        &self.items
    }

    pub fn first(&self) -> Option<&PendingFile> {
        self.items.first()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Fail with a validation error unless the primary action is enabled
    pub fn require_ready(&self) -> Result<(), ToolError> {
        if self.is_action_enabled() {
            return Ok(());
        }
        let msg = match self.kind.minimum() {
            MinimumRule::AtLeast(1) if self.kind == ToolKind::ImagesToPdf => {
                "Please select at least one image".to_string()
            }
            MinimumRule::AtLeast(1) => "Please select a PDF file".to_string(),
            MinimumRule::AtLeast(n) => format!("Please select at least {} PDF files", n),
            MinimumRule::CardSlots => "Please upload both front and back images".to_string(),
        };
        Err(ToolError::Validation(msg))
    }

    fn change(&self) -> StateChange {
        StateChange {
            action_enabled: self.is_action_enabled(),
            len: self.items.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardSide {
    Front,
    Back,
}

/// Front and back image slots of the card printer
#[derive(Debug, Clone)]
pub struct CardSlots {
    admission: Admission,
    front: Option<PendingFile>,
    back: Option<PendingFile>,
}

impl Default for CardSlots {
    fn default() -> Self {
        Self::new()
    }
}

impl CardSlots {
    pub fn new() -> Self {
        Self::with_admission(ToolKind::CardPrinter.admission())
    }

    pub fn with_admission(admission: Admission) -> Self {
        Self {
            admission,
            front: None,
            back: None,
        }
    }

    pub fn set(&mut self, side: CardSide, file: PendingFile) -> Result<StateChange, ToolError> {
        self.admission.check(&file)?;
        *self.slot_mut(side) = Some(file);
        Ok(self.change())
    }

    pub fn clear_side(&mut self, side: CardSide) -> StateChange {
        *self.slot_mut(side) = None;
        self.change()
    }

    pub fn reset(&mut self) -> StateChange {
        self.front = None;
        self.back = None;
        self.change()
    }

    pub fn get(&self, side: CardSide) -> Option<&PendingFile> {
        match side {
            CardSide::Front => self.front.as_ref(),
            CardSide::Back => self.back.as_ref(),
        }
    }

    pub fn is_action_enabled(&self) -> bool {
        self.front.is_some() && self.back.is_some()
    }

    /// Both sides, or the validation error shown when one is missing
    pub fn both(&self) -> Result<(&PendingFile, &PendingFile), ToolError> {
        match (&self.front, &self.back) {
            (Some(front), Some(back)) => Ok((front, back)),
            _ => Err(ToolError::validation(
                "Please upload both front and back images",
            )),
        }
    }

    fn slot_mut(&mut self, side: CardSide) -> &mut Option<PendingFile> {
        match side {
            CardSide::Front => &mut self.front,
            CardSide::Back => &mut self.back,
        }
    }

    fn change(&self) -> StateChange {
        StateChange {
            action_enabled: self.is_action_enabled(),
            len: usize::from(self.front.is_some()) + usize::from(self.back.is_some()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: usize = 1024 * 1024;

    fn pdf(name: &str) -> PendingFile {
        PendingFile::new(name, PDF_MIME, b"%PDF-1.7".to_vec())
    }

    fn image(name: &str, size: usize) -> PendingFile {
        PendingFile::new(name, "image/png", vec![0u8; size])
    }

    #[test]
    fn test_merge_requires_two_files() {
        let mut state = ToolFileState::new(ToolKind::Merge);
        assert!(!state.is_action_enabled());

        let change = state.add(pdf("a.pdf")).unwrap();
        assert!(!change.action_enabled);

        let change = state.add(pdf("b.pdf")).unwrap();
        assert!(change.action_enabled);

        state.add(pdf("c.pdf")).unwrap();
        assert!(state.is_action_enabled());

        let (_, change) = state.remove_at(0);
        assert!(change.action_enabled);
        let (_, change) = state.remove_at(0);
        assert!(!change.action_enabled);
        assert_eq!(change.len, 1);
    }

    #[test]
    fn test_remove_at_out_of_range_is_noop() {
        let mut state = ToolFileState::new(ToolKind::Merge);
        state.add(pdf("a.pdf")).unwrap();
        let (removed, change) = state.remove_at(3);
        assert!(removed.is_none());
        assert_eq!(change.len, 1);
    }

    #[test]
    fn test_remove_keeps_order_contiguous() {
        let mut state = ToolFileState::new(ToolKind::Merge);
        for name in ["a.pdf", "b.pdf", "c.pdf"] {
            state.add(pdf(name)).unwrap();
        }
        let (removed, _) = state.remove_at(1);
        assert_eq!(removed.unwrap().name, "b.pdf");
        let names: Vec<_> = state.items().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a.pdf", "c.pdf"]);
    }

    #[test]
    fn test_clear_disables_action() {
        let mut state = ToolFileState::new(ToolKind::ImagesToPdf);
        assert!(state.add(image("x.png", 10)).unwrap().action_enabled);
        let change = state.clear();
        assert!(!change.action_enabled);
        assert!(state.is_empty());
    }

    #[test]
    fn test_pdf_tool_rejects_images() {
        let mut state = ToolFileState::new(ToolKind::Compress);
        let err = state.add(image("x.png", 10)).unwrap_err();
        assert!(err.is_validation());
        assert!(state.is_empty());
    }

    #[test]
    fn test_image_tool_rejects_pdf() {
        let mut state = ToolFileState::new(ToolKind::ImagesToPdf);
        assert!(state.add(pdf("a.pdf")).is_err());
        assert!(!state.is_action_enabled());
    }

    #[test]
    fn test_pdf_tools_match_pdf_admission() {
        for kind in ToolKind::ALL {
            assert_eq!(kind.takes_pdfs(), kind.admission() == Admission::pdf(), "{:?}", kind);
        }
    }

    #[test]
    fn test_add_all_is_all_or_nothing() {
        let mut state = ToolFileState::new(ToolKind::ImagesToPdf);
        state.add(image("first.png", 10)).unwrap();

        let err = state
            .add_all(vec![image("a.png", 10), pdf("b.pdf"), image("c.png", 10)])
            .unwrap_err();
        assert_eq!(err.to_string(), "b.pdf: please upload an image file");
        assert_eq!(state.len(), 1);
        assert_eq!(state.first().unwrap().name, "first.png");

        let change = state
            .add_all(vec![image("a.png", 10), image("c.png", 10)])
            .unwrap();
        assert_eq!(change.len, 3);
    }

    #[test]
    fn test_single_document_tool_replaces_file() {
        let mut state = ToolFileState::new(ToolKind::Rotate);
        state.add(pdf("a.pdf")).unwrap();
        state.add(pdf("b.pdf")).unwrap();
        assert_eq!(state.len(), 1);
        assert_eq!(state.first().unwrap().name, "b.pdf");
    }

    #[test]
    fn test_move_item_reorders() {
        let mut state = ToolFileState::new(ToolKind::Merge);
        for name in ["a.pdf", "b.pdf", "c.pdf"] {
            state.add(pdf(name)).unwrap();
        }
        state.move_item(2, 0).unwrap();
        let names: Vec<_> = state.items().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["c.pdf", "a.pdf", "b.pdf"]);
        assert!(state.move_item(5, 0).is_err());
    }

    #[test]
    fn test_card_admission_size_ceiling() {
        let admission = ToolKind::CardPrinter.admission();
        assert!(admission.check(&image("big.png", 12 * MIB)).is_err());
        assert!(admission.check(&image("ok.png", 9 * MIB)).is_ok());

        let not_image = PendingFile::new("doc.pdf", PDF_MIME, vec![0u8; 10]);
        assert!(admission.check(&not_image).is_err());
    }

    #[test]
    fn test_card_slots_need_both_sides() {
        let mut slots = CardSlots::new();
        assert!(!slots.is_action_enabled());

        let change = slots.set(CardSide::Front, image("f.png", 10)).unwrap();
        assert!(!change.action_enabled);
        assert!(slots.both().is_err());

        let change = slots.set(CardSide::Back, image("b.png", 10)).unwrap();
        assert!(change.action_enabled);

        let change = slots.clear_side(CardSide::Front);
        assert!(!change.action_enabled);
        assert!(slots.get(CardSide::Back).is_some());

        slots.reset();
        assert!(slots.get(CardSide::Back).is_none());
    }

    #[test]
    fn test_card_slot_rejects_oversized_image() {
        let mut slots = CardSlots::new();
        assert!(slots.set(CardSide::Front, image("big.png", 12 * MIB)).is_err());
        assert!(slots.get(CardSide::Front).is_none());
    }

    #[test]
    fn test_require_ready_messages() {
        let state = ToolFileState::new(ToolKind::Merge);
        assert_eq!(
            state.require_ready().unwrap_err().to_string(),
            "Please select at least 2 PDF files"
        );
        let state = ToolFileState::new(ToolKind::ImagesToPdf);
        assert_eq!(
            state.require_ready().unwrap_err().to_string(),
            "Please select at least one image"
        );
    }

    #[test]
    fn test_guess_mime() {
        assert_eq!(guess_mime(Path::new("a/B.PDF")), PDF_MIME);
        assert_eq!(guess_mime(Path::new("photo.JPG")), "image/jpeg");
        assert_eq!(guess_mime(Path::new("notes.txt")), "application/octet-stream");
    }
}
