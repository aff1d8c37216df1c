//! Images to PDF conversion
//!
//! Two encoder paths: pages fitted onto A4 following each image's
//! orientation (`images-converted.pdf`), or pages sized exactly to each
//! image (`images-to-pdf.pdf`).

use crate::artifact::{Artifact, IMAGES_CONVERTED_PDF, IMAGES_TO_PDF_PDF};
use crate::builder::{DocumentBuilder, Placement};
use crate::error::ToolError;
use crate::layout::{a4_for, fit_centered, Rect};
use crate::page_info::Orientation;
use crate::state::ToolFileState;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageSizing {
    /// A4 page turned to match the image, image fitted inside the margin
    #[default]
    FitA4,
    /// Page exactly the image's pixel size, one pixel per point
    MatchImage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvertOptions {
    #[serde(default)]
    pub sizing: PageSizing,
    /// Margin around the image on A4 pages, in points
    #[serde(default = "default_margin")]
    pub margin: f64,
    /// Let small images grow to fill the printable area
    #[serde(default)]
    pub upscale: bool,
}

fn default_margin() -> f64 {
    20.0
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            sizing: PageSizing::default(),
            margin: default_margin(),
            upscale: false,
        }
    }
}

/// Convert every queued image into one page of a new PDF, in list order
pub fn images_to_pdf(state: &ToolFileState, options: &ConvertOptions) -> Result<Artifact, ToolError> {
    state.require_ready()?;

    let mut builder = DocumentBuilder::new();
    for (i, file) in state.items().iter().enumerate() {
        let image = builder.add_image(&file.bytes).map_err(|e| match e {
            ToolError::Image(msg) => ToolError::Image(format!("{}: {}", file.name, msg)),
            other => other,
        })?;
        let (w, h) = (image.width as f64, image.height as f64);

        let (page_w, page_h, rect) = match options.sizing {
            PageSizing::MatchImage => (w, h, Rect::new(0.0, 0.0, w, h)),
            PageSizing::FitA4 => {
                let (page_w, page_h) = a4_for(Orientation::of(w, h));
                let margin = options.margin.clamp(0.0, page_w.min(page_h) / 2.0 - 1.0);
                let frame = Rect::new(margin, margin, page_w - 2.0 * margin, page_h - 2.0 * margin);
                (page_w, page_h, fit_centered(w, h, frame, options.upscale))
            }
        };

        builder.add_page(page_w, page_h, &[Placement { image, rect }])?;
        tracing::debug!(index = i, file = %file.name, page_w, page_h, "image placed");
    }

    let bytes = builder.finish()?;
    let filename = match options.sizing {
        PageSizing::FitA4 => IMAGES_CONVERTED_PDF,
        PageSizing::MatchImage => IMAGES_TO_PDF_PDF,
    };
    tracing::info!(images = state.len(), size = bytes.len(), filename, "converted images");
    Ok(Artifact::pdf(filename, bytes))
}
