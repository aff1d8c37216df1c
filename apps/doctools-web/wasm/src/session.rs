//! Stateful tool session
//!
//! One `ToolSession` per tool page. It owns the tool's pending files and
//! options in Rust; JavaScript forwards DOM events and renders what the
//! session reports back (mostly the primary button's enabled flag).

use crate::dom::{report_failure, LoadedFile};
use crate::pages::{collect_pages, PageStore};
use doctools_core::compress::compress_state;
use doctools_core::convert::images_to_pdf;
use doctools_core::render::render_state;
use doctools_core::rotate::rotate_state;
use doctools_core::split::split_state;
use doctools_core::watermark::{self, watermark_state};
use doctools_core::{
    card_sheet, merge_state, validate_pdf, Admission, Artifact, CardLayout, CardSide, CardSlots,
    CompressOptions, ConvertOptions, PageSelection, PageSizing, PdfInfo,
    PendingFile, RasterFormat, RenderOptions, RotationMap, SplitMode, StateChange, ToolError,
    ToolFileState, ToolKind, WatermarkOptions, WatermarkPosition,
};
use std::cell::RefCell;
use std::rc::Rc;
use wasm_bindgen::prelude::*;

/// Tool a session drives
#[wasm_bindgen]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    CardPrinter,
    ImagesToPdf,
    Merge,
    Split,
    PdfToImages,
    Compress,
    Rotate,
    Watermark,
}

impl From<Tool> for ToolKind {
    fn from(tool: Tool) -> Self {
        match tool {
            Tool::CardPrinter => ToolKind::CardPrinter,
            Tool::ImagesToPdf => ToolKind::ImagesToPdf,
            Tool::Merge => ToolKind::Merge,
            Tool::Split => ToolKind::Split,
            Tool::PdfToImages => ToolKind::PdfToImages,
            Tool::Compress => ToolKind::Compress,
            Tool::Rotate => ToolKind::Rotate,
            Tool::Watermark => ToolKind::Watermark,
        }
    }
}

/// Watermark inputs as the form holds them
#[derive(Debug, Clone)]
struct WatermarkDraft {
    image_mode: bool,
    text: String,
    font_size: f64,
    color: String,
    opacity: f64,
    position: WatermarkPosition,
    image: Option<PendingFile>,
}

impl Default for WatermarkDraft {
    fn default() -> Self {
        Self {
            image_mode: false,
            text: String::new(),
            font_size: 48.0,
            color: "#808080".to_string(),
            opacity: 0.3,
            position: WatermarkPosition::Center,
            image: None,
        }
    }
}

impl WatermarkDraft {
    fn options(&self) -> Option<WatermarkOptions> {
        if self.image_mode {
            self.image.clone().map(|image| WatermarkOptions::Image {
                image,
                opacity: self.opacity,
                position: self.position,
            })
        } else {
            Some(WatermarkOptions::Text {
                content: self.text.clone(),
                font_size: self.font_size,
                color: self.color.clone(),
                opacity: self.opacity,
                position: self.position,
            })
        }
    }
}

/// Result of running a tool, ready to save
#[wasm_bindgen]
pub struct ToolOutput {
    artifact: Artifact,
}

#[wasm_bindgen]
impl ToolOutput {
    #[wasm_bindgen(getter)]
    pub fn filename(&self) -> String {
        self.artifact.filename.clone()
    }

    #[wasm_bindgen(getter, js_name = mimeType)]
    pub fn mime_type(&self) -> String {
        self.artifact.mime_type.clone()
    }

    #[wasm_bindgen(getter)]
    pub fn size(&self) -> usize {
        self.artifact.len()
    }

    pub fn bytes(&self) -> js_sys::Uint8Array {
        js_sys::Uint8Array::from(self.artifact.bytes.as_slice())
    }

    /// Trigger the browser download under the artifact's fixed name
    pub fn download(&self) -> Result<(), JsValue> {
        crate::dom::save_bytes(
            &self.artifact.filename,
            &self.artifact.mime_type,
            &self.artifact.bytes,
        )
    }
}

#[wasm_bindgen]
pub struct ToolSession {
    kind: ToolKind,
    files: ToolFileState,
    cards: CardSlots,
    /// Info for the loaded document of single-document PDF tools
    document: Option<PdfInfo>,
    page_range: String,
    split_mode: SplitMode,
    rotations: RotationMap,
    convert: ConvertOptions,
    render: RenderOptions,
    /// Pages rasterised by a JavaScript renderer for PDF to images
    rendered: Rc<RefCell<PageStore>>,
    compress: CompressOptions,
    card_layout: CardLayout,
    watermark: WatermarkDraft,
    progress_callback: Option<js_sys::Function>,
}

impl ToolSession {
    pub fn for_kind(kind: ToolKind) -> Self {
        Self {
            kind,
            files: ToolFileState::new(kind),
            cards: CardSlots::new(),
            document: None,
            page_range: String::new(),
            split_mode: SplitMode::Extract,
            rotations: RotationMap::new(),
            convert: ConvertOptions::default(),
            render: RenderOptions::default(),
            rendered: Rc::default(),
            compress: CompressOptions::default(),
            card_layout: CardLayout::default(),
            watermark: WatermarkDraft::default(),
            progress_callback: None,
        }
    }

    pub fn kind(&self) -> ToolKind {
        self.kind
    }

    /// Admit a file into the tool's list (testable without JsValue)
    pub fn add_file_internal(&mut self, file: PendingFile) -> Result<bool, ToolError> {
        if self.kind == ToolKind::CardPrinter {
            return Err(ToolError::validation(
                "Choose the front or back slot for card images",
            ));
        }

        // Rejected files must leave the state untouched, so check first
        self.files.kind().admission().check(&file)?;
        let info = if self.kind.takes_pdfs() {
            Some(validate_pdf(&file.bytes)?)
        } else {
            None
        };

        let change = self.files.add(file)?;
        if self.kind.is_single_document() {
            self.document = info;
            self.rotations.reset();
            self.rendered.borrow_mut().reset();
        }
        Ok(self.refresh(change))
    }

    pub fn remove_file_internal(&mut self, index: usize) -> bool {
        let (removed, change) = self.files.remove_at(index);
        if removed.is_some() && self.files.is_empty() {
            self.document = None;
            self.rotations.reset();
            self.rendered.borrow_mut().reset();
        }
        self.refresh(change)
    }

    pub fn clear_internal(&mut self) -> bool {
        self.document = None;
        self.rotations.reset();
        self.rendered.borrow_mut().reset();
        self.watermark.image = None;
        let change = self.files.clear();
        self.cards.reset();
        self.refresh(change)
    }

    pub fn set_card_image_internal(
        &mut self,
        side: CardSide,
        file: PendingFile,
    ) -> Result<bool, ToolError> {
        let change = self.cards.set(side, file)?;
        Ok(self.refresh(change))
    }

    pub fn clear_card_image_internal(&mut self, side: CardSide) -> bool {
        let change = self.cards.clear_side(side);
        self.refresh(change)
    }

    pub fn set_watermark_image_internal(&mut self, file: PendingFile) -> Result<bool, ToolError> {
        Admission::image().check(&file)?;
        self.watermark.image = Some(file);
        self.watermark.image_mode = true;
        Ok(self.can_execute())
    }

    /// Pages a range expression selects in the loaded document
    pub fn preview_range(&self, expression: &str) -> Vec<u32> {
        let total = self.document.as_ref().map(|d| d.page_count).unwrap_or(0);
        PageSelection::parse(expression, total).pages().to_vec()
    }

    pub fn execute_internal(&self) -> Result<Artifact, ToolError> {
        match self.kind {
            ToolKind::CardPrinter => card_sheet(&self.cards, &self.card_layout),
            ToolKind::ImagesToPdf => images_to_pdf(&self.files, &self.convert),
            ToolKind::Merge => merge_state(&self.files),
            ToolKind::Split => split_state(&self.files, &self.page_range, self.split_mode),
            ToolKind::PdfToImages => {
                let rendered = self.rendered.borrow();
                let renderer = rendered.renderer();
                render_state(&self.files, &self.render, &renderer)
            }
            ToolKind::Compress => compress_state(&self.files, &self.compress),
            ToolKind::Rotate => rotate_state(&self.files, &self.rotations),
            ToolKind::Watermark => {
                let options = self
                    .watermark
                    .options()
                    .ok_or_else(|| ToolError::validation("Please choose a watermark image"))?;
                watermark_state(&self.files, &options)
            }
        }
    }

    /// Primary-action flag after a mutation; split and watermark add their
    /// own form rules
    fn refresh(&self, change: StateChange) -> bool {
        match self.kind {
            ToolKind::Split | ToolKind::Watermark => self.can_execute(),
            _ => change.action_enabled,
        }
    }

    fn page_count_internal(&self) -> u32 {
        self.document.as_ref().map(|d| d.page_count).unwrap_or(0)
    }

    fn report_progress(&self, current: u32, total: u32, message: &str) {
        if let Some(ref callback) = self.progress_callback {
            let _ = callback.call3(
                &JsValue::null(),
                &JsValue::from(current),
                &JsValue::from(total),
                &JsValue::from_str(message),
            );
        }
    }
}

fn js_error(e: ToolError) -> JsValue {
    JsValue::from_str(&e.to_string())
}

fn card_side(side: &str) -> Result<CardSide, JsValue> {
    match side {
        "front" => Ok(CardSide::Front),
        "back" => Ok(CardSide::Back),
        other => Err(JsValue::from_str(&format!("Unknown card side: {}", other))),
    }
}

#[wasm_bindgen]
impl ToolSession {
    #[wasm_bindgen(constructor)]
    pub fn new(tool: Tool) -> Self {
        Self::for_kind(tool.into())
    }

    #[wasm_bindgen(getter)]
    pub fn label(&self) -> String {
        self.kind.label().to_string()
    }

    /// Callback signature: (current: number, total: number, message: string) => void
    #[wasm_bindgen(js_name = setProgressCallback)]
    pub fn set_progress_callback(&mut self, callback: js_sys::Function) {
        self.progress_callback = Some(callback);
    }

    /// Add a file read by `readFile`; returns the primary-action flag
    #[wasm_bindgen(js_name = addFile)]
    pub fn add_file(&mut self, file: LoadedFile) -> Result<bool, JsValue> {
        self.add_file_internal(file.into_pending()).map_err(js_error)
    }

    /// Add raw bytes under a name and MIME type
    #[wasm_bindgen(js_name = addBytes)]
    pub fn add_bytes(&mut self, name: &str, mime_type: &str, bytes: &[u8]) -> Result<bool, JsValue> {
        self.add_file_internal(PendingFile::new(name, mime_type, bytes.to_vec()))
            .map_err(js_error)
    }

    #[wasm_bindgen(js_name = removeFile)]
    pub fn remove_file(&mut self, index: usize) -> bool {
        self.remove_file_internal(index)
    }

    pub fn clear(&mut self) -> bool {
        self.clear_internal()
    }

    /// Move a queued file (merge order, image order)
    #[wasm_bindgen(js_name = moveFile)]
    pub fn move_file(&mut self, from: usize, to: usize) -> Result<(), JsValue> {
        self.files.move_item(from, to).map(|_| ()).map_err(js_error)
    }

    #[wasm_bindgen(js_name = fileCount)]
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    #[wasm_bindgen(js_name = fileNames)]
    pub fn file_names(&self) -> Vec<String> {
        self.files.items().iter().map(|f| f.name.clone()).collect()
    }

    #[wasm_bindgen(js_name = setCardImage)]
    pub fn set_card_image(&mut self, side: &str, file: LoadedFile) -> Result<bool, JsValue> {
        let side = card_side(side)?;
        self.set_card_image_internal(side, file.into_pending())
            .map_err(js_error)
    }

    #[wasm_bindgen(js_name = clearCardImage)]
    pub fn clear_card_image(&mut self, side: &str) -> Result<bool, JsValue> {
        Ok(self.clear_card_image_internal(card_side(side)?))
    }

    #[wasm_bindgen(js_name = setCardCopies)]
    pub fn set_card_copies(&mut self, copies: usize) {
        self.card_layout.copies = copies;
    }

    /// Info about the loaded document, for single-document tools
    #[wasm_bindgen(js_name = getDocumentInfo)]
    pub fn get_document_info(&self) -> Result<JsValue, JsValue> {
        serde_wasm_bindgen::to_value(&self.document)
            .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }

    #[wasm_bindgen(js_name = pageCount)]
    pub fn page_count(&self) -> u32 {
        self.page_count_internal()
    }

    /// Store the split expression; returns the primary-action flag
    #[wasm_bindgen(js_name = setPageRange)]
    pub fn set_page_range(&mut self, expression: &str) -> bool {
        self.page_range = expression.to_string();
        self.can_execute()
    }

    /// Pages the stored split expression selects
    #[wasm_bindgen(js_name = selectedPages)]
    pub fn selected_pages(&self) -> Vec<u32> {
        self.preview_range(&self.page_range)
    }

    #[wasm_bindgen(js_name = setSplitEachPage)]
    pub fn set_split_each_page(&mut self, each_page: bool) {
        self.split_mode = if each_page {
            SplitMode::EachPage
        } else {
            SplitMode::Extract
        };
    }

    #[wasm_bindgen(js_name = rotatePage)]
    pub fn rotate_page(&mut self, index: u32, delta: i32) -> i32 {
        self.rotations.rotate_page(index, delta);
        self.rotations.get(index)
    }

    #[wasm_bindgen(js_name = rotateAll)]
    pub fn rotate_all(&mut self, delta: i32) {
        let pages = self.page_count_internal();
        self.rotations.rotate_all(delta, pages);
    }

    #[wasm_bindgen(js_name = getRotation)]
    pub fn get_rotation(&self, index: u32) -> i32 {
        self.rotations.get(index)
    }

    #[wasm_bindgen(js_name = resetRotations)]
    pub fn reset_rotations(&mut self) {
        self.rotations.reset();
    }

    #[wasm_bindgen(js_name = setFitToA4)]
    pub fn set_fit_to_a4(&mut self, fit: bool) {
        self.convert.sizing = if fit {
            PageSizing::FitA4
        } else {
            PageSizing::MatchImage
        };
    }

    #[wasm_bindgen(js_name = setRenderOptions)]
    pub fn set_render_options(&mut self, png: bool, jpeg_quality: u8, scale: f32) {
        if scale != self.render.scale {
            self.rendered.borrow_mut().reset();
        }
        self.render = RenderOptions {
            format: if png { RasterFormat::Png } else { RasterFormat::Jpeg },
            jpeg_quality,
            scale,
        };
    }

    /// Rasterise every page of the loaded document in JavaScript (pdf.js)
    ///
    /// Callback signature: (pdf: Uint8Array, pageNumber: number, scale: number)
    /// => Uint8Array | Promise<Uint8Array>, returning PNG or JPEG bytes.
    /// The promise resolves to the page count; `execute` then uses these
    /// pages instead of embedded images.
    #[wasm_bindgen(js_name = renderPagesWith)]
    pub fn render_pages_with(&self, callback: js_sys::Function) -> Result<js_sys::Promise, JsValue> {
        if self.kind != ToolKind::PdfToImages {
            return Err(JsValue::from_str("Only PDF to images renders pages"));
        }
        let file = self
            .files
            .first()
            .ok_or_else(|| js_error(ToolError::validation("Please select a PDF file")))?;

        self.rendered.borrow_mut().reset();
        let bytes = js_sys::Uint8Array::from(file.bytes.as_slice());
        Ok(wasm_bindgen_futures::future_to_promise(collect_pages(
            callback,
            bytes,
            self.page_count_internal(),
            self.render.scale,
            Rc::clone(&self.rendered),
        )))
    }

    /// Pages currently held from `renderPagesWith`
    #[wasm_bindgen(js_name = renderedPageCount)]
    pub fn rendered_page_count(&self) -> usize {
        self.rendered.borrow().len()
    }

    #[wasm_bindgen(js_name = setCompressOptions)]
    pub fn set_compress_options(&mut self, jpeg_quality: u8, max_image_dimension: u32, recompress_images: bool) {
        self.compress = CompressOptions {
            jpeg_quality,
            max_image_dimension,
            recompress_images,
        };
    }

    /// Text watermark form; returns the primary-action flag
    #[wasm_bindgen(js_name = setWatermarkText)]
    pub fn set_watermark_text(
        &mut self,
        text: &str,
        font_size: f64,
        color: &str,
        opacity: f64,
        position: &str,
    ) -> Result<bool, JsValue> {
        let position: WatermarkPosition = position.parse().map_err(js_error)?;
        self.watermark.image_mode = false;
        self.watermark.text = text.to_string();
        self.watermark.font_size = font_size;
        self.watermark.color = color.to_string();
        self.watermark.opacity = opacity;
        self.watermark.position = position;
        Ok(self.can_execute())
    }

    #[wasm_bindgen(js_name = setWatermarkImage)]
    pub fn set_watermark_image(
        &mut self,
        file: LoadedFile,
        opacity: f64,
        position: &str,
    ) -> Result<bool, JsValue> {
        self.watermark.position = position.parse().map_err(js_error)?;
        self.watermark.opacity = opacity;
        self.set_watermark_image_internal(file.into_pending())
            .map_err(js_error)
    }

    #[wasm_bindgen(js_name = canExecute)]
    pub fn can_execute(&self) -> bool {
        match self.kind {
            ToolKind::CardPrinter => self.cards.is_action_enabled(),
            ToolKind::Watermark => self
                .watermark
                .options()
                .is_some_and(|options| watermark::is_action_enabled(&self.files, &options)),
            ToolKind::Split => {
                self.files.is_action_enabled() && !self.preview_range(&self.page_range).is_empty()
            }
            _ => self.files.is_action_enabled(),
        }
    }

    /// Run the tool; failures are alerted and returned as errors
    pub fn execute(&self) -> Result<ToolOutput, JsValue> {
        self.report_progress(0, 100, "Starting...");
        match self.execute_internal() {
            Ok(artifact) => {
                self.report_progress(100, 100, "Complete");
                Ok(ToolOutput { artifact })
            }
            Err(e) => {
                report_failure(&e);
                Err(js_error(e))
            }
        }
    }
}
