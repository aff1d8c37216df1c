//! PDFium page renderer
//!
//! Draws text, vector art and images the way a viewer would. The PDFium
//! shared library is bound at runtime, so a missing library is an error
//! from [`PdfiumRenderer::bind`] rather than a link failure.

use crate::error::ToolError;
use crate::render::{PageRenderer, PageSource};
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::Path;

/// Pixels per inch at scale 1.0
const RENDER_DPI: f32 = 144.0;
const POINTS_PER_INCH: f32 = 72.0;

pub struct PdfiumRenderer {
    pdfium: Pdfium,
}

impl PdfiumRenderer {
    /// Bind to the PDFium library in `library_dir`, or else the one next to
    /// the working directory, or else the system copy
    pub fn bind(library_dir: Option<&Path>) -> Result<Self, ToolError> {
        let bindings = match library_dir {
            Some(dir) => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir)),
            None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
                .or_else(|_| Pdfium::bind_to_system_library()),
        }
        .map_err(|e| ToolError::Operation(format!("Failed to bind pdfium library: {}", e)))?;

        Ok(Self {
            pdfium: Pdfium::new(bindings),
        })
    }
}

impl std::fmt::Debug for PdfiumRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfiumRenderer").finish_non_exhaustive()
    }
}

impl PageRenderer for PdfiumRenderer {
    fn render_page(&self, page: &PageSource<'_>, scale: f32) -> Result<DynamicImage, ToolError> {
        let document = self
            .pdfium
            .load_pdf_from_byte_slice(page.bytes, None)
            .map_err(|e| ToolError::Parse(e.to_string()))?;

        let index = page
            .number
            .checked_sub(1)
            .and_then(|i| u16::try_from(i).ok())
            .ok_or_else(|| ToolError::Operation(format!("Page {} is out of range", page.number)))?;
        let pdf_page = document
            .pages()
            .get(index)
            .map_err(|e| ToolError::Operation(e.to_string()))?;

        let scale = if scale > 0.0 { scale } else { 1.0 };
        let width = (pdf_page.width().value * RENDER_DPI / POINTS_PER_INCH * scale).round() as i32;

        // Height follows the page's aspect ratio, /Rotate included
        let bitmap = pdf_page
            .render_with_config(
                &PdfRenderConfig::new()
                    .set_target_width(width.max(1))
                    .render_form_data(true)
                    .render_annotations(true),
            )
            .map_err(|e| ToolError::Operation(format!("Failed to render PDF page: {}", e)))?;

        Ok(bitmap.as_image())
    }
}
