//! JSON command surface
//!
//! One tagged command per tool, with file contents as base64. This is what
//! the browser adapter hands across the wasm boundary.

use crate::artifact::Artifact;
use crate::compress::{compress_state, CompressOptions};
use crate::convert::{images_to_pdf, ConvertOptions};
use crate::error::ToolError;
use crate::id_card::{card_sheet, CardLayout};
use crate::merge::merge_state;
use crate::render::{render_state, EmbeddedImageRenderer, RenderOptions};
use crate::rotate::{rotate_state, RotationMap};
use crate::split::{split_state, SplitMode};
use crate::state::{guess_mime, CardSide, CardSlots, PendingFile, ToolFileState, ToolKind};
use crate::watermark::{watermark_state, WatermarkOptions, WatermarkPosition};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::path::Path;

/// Bytes carried as a base64 string
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Payload(pub Vec<u8>);

impl Serialize for Payload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for Payload {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map(Payload)
            .map_err(serde::de::Error::custom)
    }
}

/// A file as sent by the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputFile {
    pub name: String,
    /// Guessed from the name when absent
    #[serde(default)]
    pub mime_type: Option<String>,
    pub data: Payload,
}

impl InputFile {
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: None,
            data: Payload(data),
        }
    }

    fn into_pending(self) -> PendingFile {
        let mime = self
            .mime_type
            .unwrap_or_else(|| guess_mime(Path::new(&self.name)).to_string());
        PendingFile::new(self.name, mime, self.data.0)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum WatermarkSpec {
    Text {
        content: String,
        #[serde(default = "default_font_size")]
        font_size: f64,
        #[serde(default = "default_color")]
        color: String,
        #[serde(default = "default_opacity")]
        opacity: f64,
        #[serde(default)]
        position: WatermarkPosition,
    },
    Image {
        image: InputFile,
        #[serde(default = "default_opacity")]
        opacity: f64,
        #[serde(default)]
        position: WatermarkPosition,
    },
}

pub fn default_font_size() -> f64 {
    48.0
}

pub fn default_color() -> String {
    "#808080".to_string()
}

pub fn default_opacity() -> f64 {
    0.3
}

impl From<WatermarkSpec> for WatermarkOptions {
    fn from(spec: WatermarkSpec) -> Self {
        match spec {
            WatermarkSpec::Text {
                content,
                font_size,
                color,
                opacity,
                position,
            } => WatermarkOptions::Text {
                content,
                font_size,
                color,
                opacity,
                position,
            },
            WatermarkSpec::Image {
                image,
                opacity,
                position,
            } => WatermarkOptions::Image {
                image: image.into_pending(),
                opacity,
                position,
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolCommand {
    CardSheet {
        front: InputFile,
        back: InputFile,
        #[serde(default)]
        layout: CardLayout,
    },
    ImagesToPdf {
        files: Vec<InputFile>,
        #[serde(default)]
        options: ConvertOptions,
    },
    Merge {
        files: Vec<InputFile>,
    },
    Split {
        file: InputFile,
        /// Page-range expression such as "1-3,5"
        pages: String,
        #[serde(default)]
        mode: SplitMode,
    },
    PdfToImages {
        file: InputFile,
        #[serde(default)]
        options: RenderOptions,
    },
    Compress {
        file: InputFile,
        #[serde(default)]
        options: CompressOptions,
    },
    Rotate {
        file: InputFile,
        /// 0-based page index to accumulated degrees
        rotations: BTreeMap<u32, i32>,
    },
    Watermark {
        file: InputFile,
        watermark: WatermarkSpec,
    },
}

impl ToolCommand {
    pub fn kind(&self) -> ToolKind {
        match self {
            ToolCommand::CardSheet { .. } => ToolKind::CardPrinter,
            ToolCommand::ImagesToPdf { .. } => ToolKind::ImagesToPdf,
            ToolCommand::Merge { .. } => ToolKind::Merge,
            ToolCommand::Split { .. } => ToolKind::Split,
            ToolCommand::PdfToImages { .. } => ToolKind::PdfToImages,
            ToolCommand::Compress { .. } => ToolKind::Compress,
            ToolCommand::Rotate { .. } => ToolKind::Rotate,
            ToolCommand::Watermark { .. } => ToolKind::Watermark,
        }
    }

    fn input_size(&self) -> usize {
        match self {
            ToolCommand::CardSheet { front, back, .. } => front.data.0.len() + back.data.0.len(),
            ToolCommand::ImagesToPdf { files, .. } | ToolCommand::Merge { files } => {
                files.iter().map(|f| f.data.0.len()).sum()
            }
            ToolCommand::Split { file, .. }
            | ToolCommand::PdfToImages { file, .. }
            | ToolCommand::Compress { file, .. }
            | ToolCommand::Rotate { file, .. }
            | ToolCommand::Watermark { file, .. } => file.data.0.len(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessResult {
    pub success: bool,
    pub filename: Option<String>,
    pub mime_type: Option<String>,
    /// Base64-encoded artifact
    pub data: Option<String>,
    pub error: Option<String>,
    /// True when the error is something the user can fix
    pub user_error: bool,
    pub metrics: Option<ProcessMetrics>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessMetrics {
    pub input_size_bytes: usize,
    pub output_size_bytes: usize,
}

impl ProcessResult {
    fn ok(artifact: Artifact, input_size_bytes: usize) -> Self {
        Self {
            success: true,
            metrics: Some(ProcessMetrics {
                input_size_bytes,
                output_size_bytes: artifact.len(),
            }),
            data: Some(STANDARD.encode(&artifact.bytes)),
            filename: Some(artifact.filename),
            mime_type: Some(artifact.mime_type),
            error: None,
            user_error: false,
        }
    }

    fn failed(error: &ToolError) -> Self {
        Self {
            success: false,
            filename: None,
            mime_type: None,
            data: None,
            error: Some(error.to_string()),
            user_error: error.is_validation(),
            metrics: None,
        }
    }
}

/// Load files into a fresh tool state; admission rules apply
fn load_state(kind: ToolKind, files: Vec<InputFile>) -> Result<ToolFileState, ToolError> {
    let mut state = ToolFileState::new(kind);
    for file in files {
        state.add(file.into_pending())?;
    }
    Ok(state)
}

/// Run one command to its artifact
pub fn run(command: ToolCommand) -> Result<Artifact, ToolError> {
    let kind = command.kind();
    tracing::debug!(tool = kind.label(), "running command");

    match command {
        ToolCommand::CardSheet {
            front,
            back,
            layout,
        } => {
            let mut slots = CardSlots::new();
            slots.set(CardSide::Front, front.into_pending())?;
            slots.set(CardSide::Back, back.into_pending())?;
            card_sheet(&slots, &layout)
        }
        ToolCommand::ImagesToPdf { files, options } => images_to_pdf(&load_state(kind, files)?, &options),
        ToolCommand::Merge { files } => merge_state(&load_state(kind, files)?),
        ToolCommand::Split { file, pages, mode } => {
            split_state(&load_state(kind, vec![file])?, &pages, mode)
        }
        ToolCommand::PdfToImages { file, options } => {
            render_state(&load_state(kind, vec![file])?, &options, &EmbeddedImageRenderer)
        }
        ToolCommand::Compress { file, options } => compress_state(&load_state(kind, vec![file])?, &options),
        ToolCommand::Rotate { file, rotations } => {
            let map: RotationMap = rotations.into_iter().collect();
            rotate_state(&load_state(kind, vec![file])?, &map)
        }
        ToolCommand::Watermark { file, watermark } => {
            watermark_state(&load_state(kind, vec![file])?, &watermark.into())
        }
    }
}

/// Run a command; failures become an error result, never a panic
pub fn execute(command: ToolCommand) -> ProcessResult {
    let input_size = command.input_size();
    match run(command) {
        Ok(artifact) => ProcessResult::ok(artifact, input_size),
        Err(e) => {
            tracing::warn!(error = %e, "command failed");
            ProcessResult::failed(&e)
        }
    }
}

/// Parse and run a JSON command
pub fn execute_json(json: &str) -> ProcessResult {
    match serde_json::from_str::<ToolCommand>(json) {
        Ok(command) => execute(command),
        Err(e) => ProcessResult::failed(&ToolError::Serialization(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{create_test_pdf, page_count, png_image};
    use serde_json::json;

    fn b64(bytes: &[u8]) -> String {
        STANDARD.encode(bytes)
    }

    fn decoded(result: &ProcessResult) -> Vec<u8> {
        STANDARD.decode(result.data.as_ref().unwrap()).unwrap()
    }

    #[test]
    fn test_merge_command() {
        let cmd = json!({
            "type": "merge",
            "files": [
                { "name": "a.pdf", "data": b64(&create_test_pdf(2)) },
                { "name": "b.pdf", "data": b64(&create_test_pdf(3)) }
            ]
        });
        let result = execute_json(&cmd.to_string());
        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.filename.as_deref(), Some("merged-document.pdf"));
        assert_eq!(page_count(&decoded(&result)), 5);
        assert!(result.metrics.unwrap().input_size_bytes > 0);
    }

    #[test]
    fn test_merge_needs_two_files() {
        let cmd = json!({
            "type": "merge",
            "files": [{ "name": "a.pdf", "data": b64(&create_test_pdf(1)) }]
        });
        let result = execute_json(&cmd.to_string());
        assert!(!result.success);
        assert!(result.user_error);
        assert_eq!(result.error.as_deref(), Some("Please select at least 2 PDF files"));
    }

    #[test]
    fn test_split_command_with_lenient_ranges() {
        let cmd = json!({
            "type": "split",
            "file": { "name": "a.pdf", "data": b64(&create_test_pdf(10)) },
            "pages": "1-3,5,abc,8-12"
        });
        let result = execute_json(&cmd.to_string());
        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.filename.as_deref(), Some("extracted-pages.pdf"));
        assert_eq!(page_count(&decoded(&result)), 7);
    }

    #[test]
    fn test_split_with_no_valid_pages() {
        let cmd = json!({
            "type": "split",
            "file": { "name": "a.pdf", "data": b64(&create_test_pdf(3)) },
            "pages": "abc"
        });
        let result = execute_json(&cmd.to_string());
        assert!(result.user_error);
        assert_eq!(result.error.as_deref(), Some("No valid pages selected"));
    }

    #[test]
    fn test_rotate_command() {
        let cmd = json!({
            "type": "rotate",
            "file": { "name": "a.pdf", "data": b64(&create_test_pdf(2)) },
            "rotations": { "1": -90 }
        });
        let result = execute_json(&cmd.to_string());
        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.filename.as_deref(), Some("rotated.pdf"));
    }

    #[test]
    fn test_watermark_command_defaults() {
        let cmd = json!({
            "type": "watermark",
            "file": { "name": "a.pdf", "data": b64(&create_test_pdf(1)) },
            "watermark": { "mode": "text", "content": "DRAFT", "position": "top-left" }
        });
        let result = execute_json(&cmd.to_string());
        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.filename.as_deref(), Some("watermarked.pdf"));
    }

    #[test]
    fn test_card_sheet_rejects_non_image() {
        let cmd = json!({
            "type": "card_sheet",
            "front": { "name": "front.png", "data": b64(&png_image(10, 10)) },
            "back": { "name": "back.pdf", "data": b64(&create_test_pdf(1)) }
        });
        let result = execute_json(&cmd.to_string());
        assert!(!result.success);
        assert_eq!(
            result.error.as_deref(),
            Some("back.pdf: please upload an image file")
        );
    }

    #[test]
    fn test_pdf_file_fed_to_image_tool_is_rejected() {
        let cmd = json!({
            "type": "images_to_pdf",
            "files": [{ "name": "x.pdf", "data": b64(&create_test_pdf(1)) }]
        });
        assert!(execute_json(&cmd.to_string()).user_error);
    }

    #[test]
    fn test_malformed_json_and_base64() {
        let result = execute_json("{ not json");
        assert!(!result.success);
        assert!(!result.user_error);

        let bad = json!({
            "type": "compress",
            "file": { "name": "a.pdf", "data": "%%%" }
        });
        assert!(!execute_json(&bad.to_string()).success);
    }

    #[test]
    fn test_payload_serializes_as_base64() {
        let file = InputFile::new("a.bin", vec![1, 2, 3]);
        let value = serde_json::to_value(&file).unwrap();
        assert_eq!(value["data"], "AQID");
    }
}
