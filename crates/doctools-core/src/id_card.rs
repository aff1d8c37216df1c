//! ID-card print sheet
//!
//! Page 1 repeats the front image, page 2 the back image, each in a grid of
//! ID-1 sized cells (85.6 × 54 mm) centred on A4. Printing page 2 on the
//! reverse of page 1 lines the sides up along the vertical axis.

use crate::artifact::{Artifact, ID_CARDS_PDF};
use crate::builder::{DocumentBuilder, Placement};
use crate::error::ToolError;
use crate::layout::{fit_centered, mm, Rect, A4_HEIGHT, A4_WIDTH};
use crate::state::{CardSide, CardSlots, PendingFile};
use lopdf::content::Operation;
use lopdf::Object;
use serde::{Deserialize, Serialize};

pub const CARD_WIDTH_MM: f64 = 85.6;
pub const CARD_HEIGHT_MM: f64 = 54.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardLayout {
    /// Copies of each side
    #[serde(default = "default_copies")]
    pub copies: usize,
    #[serde(default = "default_columns")]
    pub columns: usize,
    /// Space between cards, for cutting
    #[serde(default = "default_gap_mm")]
    pub gap_mm: f64,
    /// Hairline outline around every card
    #[serde(default = "default_cut_guides")]
    pub cut_guides: bool,
}

fn default_copies() -> usize {
    8
}

fn default_columns() -> usize {
    2
}

fn default_gap_mm() -> f64 {
    5.0
}

fn default_cut_guides() -> bool {
    true
}

impl Default for CardLayout {
    fn default() -> Self {
        Self {
            copies: default_copies(),
            columns: default_columns(),
            gap_mm: default_gap_mm(),
            cut_guides: default_cut_guides(),
        }
    }
}

impl CardLayout {
    /// Card cells on an A4 page, filled row by row from the top
    pub fn cells(&self) -> Result<Vec<Rect>, ToolError> {
        if self.copies == 0 || self.columns == 0 {
            return Err(ToolError::validation("Copies and columns must be at least 1"));
        }
        if !(self.gap_mm >= 0.0) {
            return Err(ToolError::validation("Card spacing cannot be negative"));
        }

        let columns = self.columns.min(self.copies);
        let rows = self.copies.div_ceil(columns);
        let (card_w, card_h, gap) = (mm(CARD_WIDTH_MM), mm(CARD_HEIGHT_MM), mm(self.gap_mm));

        let grid_w = columns as f64 * card_w + (columns - 1) as f64 * gap;
        let grid_h = rows as f64 * card_h + (rows - 1) as f64 * gap;
        if grid_w > A4_WIDTH || grid_h > A4_HEIGHT {
            return Err(ToolError::validation(format!(
                "{} cards in {} columns do not fit on an A4 page",
                self.copies, columns
            )));
        }

        let left = (A4_WIDTH - grid_w) / 2.0;
        let top = A4_HEIGHT - (A4_HEIGHT - grid_h) / 2.0;

        Ok((0..self.copies)
            .map(|i| {
                let (row, col) = ((i / columns) as f64, (i % columns) as f64);
                Rect::new(
                    left + col * (card_w + gap),
                    top - (row + 1.0) * card_h - row * gap,
                    card_w,
                    card_h,
                )
            })
            .collect())
    }
}

/// Two-page print sheet: fronts on page 1, backs on page 2
pub fn card_sheet(slots: &CardSlots, layout: &CardLayout) -> Result<Artifact, ToolError> {
    let (front, back) = slots.both()?;
    let cells = layout.cells()?;

    let mut builder = DocumentBuilder::new();
    for (side, file) in [(CardSide::Front, front), (CardSide::Back, back)] {
        add_side(&mut builder, file, &cells, layout.cut_guides)?;
        tracing::debug!(?side, copies = cells.len(), "card side laid out");
    }

    let bytes = builder.finish()?;
    tracing::info!(copies = cells.len(), size = bytes.len(), "card sheet ready");
    Ok(Artifact::pdf(ID_CARDS_PDF, bytes))
}

fn add_side(
    builder: &mut DocumentBuilder,
    file: &PendingFile,
    cells: &[Rect],
    cut_guides: bool,
) -> Result<(), ToolError> {
    let image = builder.add_image(&file.bytes).map_err(|e| match e {
        ToolError::Image(msg) => ToolError::Image(format!("{}: {}", file.name, msg)),
        other => other,
    })?;

    let placements: Vec<Placement> = cells
        .iter()
        .map(|cell| Placement {
            image,
            rect: fit_centered(image.width as f64, image.height as f64, *cell, true),
        })
        .collect();

    let overlay = if cut_guides { guide_ops(cells) } else { Vec::new() };
    builder.add_page_with(A4_WIDTH, A4_HEIGHT, &placements, overlay)?;
    Ok(())
}

/// Light grey hairline rectangles around each cell
fn guide_ops(cells: &[Rect]) -> Vec<Operation> {
    let mut ops = vec![
        Operation::new("q", vec![]),
        Operation::new("G", vec![Object::Real(0.75)]),
        Operation::new("w", vec![Object::Real(0.25)]),
    ];
    for cell in cells {
        ops.push(Operation::new(
            "re",
            vec![
                Object::Real(cell.x as f32),
                Object::Real(cell.y as f32),
                Object::Real(cell.width as f32),
                Object::Real(cell.height as f32),
            ],
        ));
    }
    ops.push(Operation::new("S", vec![]));
    ops.push(Operation::new("Q", vec![]));
    ops
}
