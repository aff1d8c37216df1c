//! Document tools: ID-card sheets and PDF manipulation
//!
//! Each tool keeps its pending files in an explicit state object
//! ([`ToolFileState`] or [`CardSlots`]) and produces one [`Artifact`] with a
//! fixed download name. All work is done in memory using lopdf, image and zip.
//!
//! Tools:
//! - `id_card::card_sheet`: front and back card images repeated on A4
//! - `convert::images_to_pdf`: one page per image
//! - `merge::merge_state`, `split::split_state`
//! - `render::pdf_to_images` behind the [`PageRenderer`] seam
//! - `compress::compress_pdf`, `rotate::rotate_pdf`, `watermark::watermark_pdf`

pub mod archive;
pub mod artifact;
pub mod builder;
pub mod command;
pub mod compress;
pub mod convert;
pub mod error;
pub mod id_card;
pub mod images;
pub mod layout;
pub mod merge;
pub mod page_info;
#[cfg(feature = "pdfium")]
pub mod pdfium;
pub mod range;
pub mod render;
pub mod rotate;
pub mod split;
pub mod state;
pub mod validation;
pub mod watermark;

#[cfg(test)]
pub(crate) mod testing;

pub use artifact::{format_bytes, Artifact};
pub use command::{execute, execute_json, ProcessMetrics, ProcessResult, ToolCommand};
pub use compress::{compress_pdf, CompressOptions};
pub use convert::{images_to_pdf, ConvertOptions, PageSizing};
pub use error::ToolError;
pub use id_card::{card_sheet, CardLayout};
pub use merge::{merge_documents, merge_state};
pub use page_info::{Orientation, PageInfo};
pub use range::{parse_page_range, PageSelection};
#[cfg(feature = "pdfium")]
pub use pdfium::PdfiumRenderer;
pub use render::{
    pdf_to_images, EmbeddedImageRenderer, PageRenderer, PageSource, RasterFormat, RenderOptions,
};
pub use rotate::{rotate_pdf, RotationMap};
pub use split::{extract_pages, split_each, split_state, SplitMode};
pub use state::{
    Admission, CardSide, CardSlots, PendingFile, StateChange, ToolFileState, ToolKind,
};
pub use validation::{quick_validate, validate_pdf, PdfInfo};
pub use watermark::{watermark_pdf, WatermarkOptions, WatermarkPosition};

/// Parse PDF bytes and return page count
pub fn get_page_count(bytes: &[u8]) -> Result<u32, ToolError> {
    split::page_count(bytes)
}
