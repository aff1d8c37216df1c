//! Pages rasterised in JavaScript
//!
//! The browser has a real PDF renderer (pdf.js) that Rust cannot call
//! synchronously, so `ToolSession::renderPagesWith` drives it ahead of
//! `execute` and keeps the decoded pages here. Pages the callback did not
//! supply fall back to [`EmbeddedImageRenderer`].

use doctools_core::{EmbeddedImageRenderer, PageRenderer, PageSource, ToolError};
use image::DynamicImage;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;

/// Rendered pages for the loaded document
///
/// `generation` moves on whenever the document or render settings change,
/// so a render still in flight cannot store pages for the wrong input.
#[derive(Debug, Default)]
pub struct PageStore {
    generation: u64,
    pages: BTreeMap<u32, DynamicImage>,
}

impl PageStore {
    pub fn reset(&mut self) {
        self.generation += 1;
        self.pages.clear();
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Store a page rendered for `generation`; stale pages are refused
    pub fn insert(&mut self, generation: u64, number: u32, image: DynamicImage) -> Result<(), ToolError> {
        if generation != self.generation {
            return Err(ToolError::validation("Document changed while rendering"));
        }
        self.pages.insert(number, image);
        Ok(())
    }

    pub fn renderer(&self) -> PrerenderedPages<'_> {
        PrerenderedPages { pages: &self.pages }
    }
}

/// Serves stored pages, rasterising the rest from embedded images
#[derive(Debug, Clone, Copy)]
pub struct PrerenderedPages<'a> {
    pages: &'a BTreeMap<u32, DynamicImage>,
}

impl PageRenderer for PrerenderedPages<'_> {
    fn render_page(&self, page: &PageSource<'_>, scale: f32) -> Result<DynamicImage, ToolError> {
        match self.pages.get(&page.number) {
            // Rendered in JavaScript at this scale already
            Some(image) => Ok(image.clone()),
            None => EmbeddedImageRenderer.render_page(page, scale),
        }
    }
}

/// Decode what the JavaScript renderer returned for one page
pub fn decode_rendered(number: u32, encoded: &[u8]) -> Result<DynamicImage, ToolError> {
    image::load_from_memory(encoded).map_err(|e| {
        ToolError::Image(format!("Page {}: renderer returned an unreadable image: {}", number, e))
    })
}

/// Call `callback(pdfBytes, pageNumber, scale)` for every page
///
/// The callback returns encoded image bytes (PNG or JPEG) or a Promise of
/// them. Resolves to the number of pages stored.
pub(crate) async fn collect_pages(
    callback: js_sys::Function,
    bytes: js_sys::Uint8Array,
    page_count: u32,
    scale: f32,
    store: Rc<RefCell<PageStore>>,
) -> Result<JsValue, JsValue> {
    let generation = store.borrow().generation();

    for number in 1..=page_count {
        let value = callback.call3(
            &JsValue::NULL,
            &bytes,
            &JsValue::from(number),
            &JsValue::from(scale),
        )?;
        let value = match value.dyn_into::<js_sys::Promise>() {
            Ok(promise) => JsFuture::from(promise).await?,
            Err(value) => value,
        };

        let encoded = js_sys::Uint8Array::new(&value).to_vec();
        let image = decode_rendered(number, &encoded).map_err(to_js)?;
        store
            .borrow_mut()
            .insert(generation, number, image)
            .map_err(to_js)?;
    }

    Ok(JsValue::from(page_count))
}

fn to_js(e: ToolError) -> JsValue {
    JsValue::from_str(&e.to_string())
}
