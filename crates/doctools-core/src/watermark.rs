//! Text and image watermarks
//!
//! The mark is drawn in a new content stream appended after each page's
//! existing content, wrapped in `q … Q`. Opacity goes through an `ExtGState`.

use crate::artifact::{Artifact, WATERMARKED_PDF};
use crate::builder::draw_image_ops;
use crate::error::ToolError;
use crate::images::embed_image;
use crate::layout::Rect;
use crate::page_info::{append_content, media_box, page_resources_mut};
use crate::state::{Admission, PendingFile, ToolFileState};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, StringFormat};
use serde::{Deserialize, Serialize};

/// Distance from the page edge for corner positions, in points
pub const POSITION_MARGIN: f64 = 50.0;

/// Image watermarks are drawn at half their pixel size
pub const IMAGE_SCALE: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WatermarkPosition {
    #[default]
    Center,
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl WatermarkPosition {
    /// Lower-left corner of a `width × height` mark on a page box
    pub fn place(self, page: [f64; 4], width: f64, height: f64) -> (f64, f64) {
        let [x0, y0, x1, y1] = page;
        let m = POSITION_MARGIN;
        match self {
            WatermarkPosition::Center => (
                x0 + (x1 - x0 - width) / 2.0,
                y0 + (y1 - y0 - height) / 2.0,
            ),
            WatermarkPosition::TopLeft => (x0 + m, y1 - m - height),
            WatermarkPosition::TopRight => (x1 - m - width, y1 - m - height),
            WatermarkPosition::BottomLeft => (x0 + m, y0 + m),
            WatermarkPosition::BottomRight => (x1 - m - width, y0 + m),
        }
    }
}

impl std::str::FromStr for WatermarkPosition {
    type Err = ToolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "center" => Ok(Self::Center),
            "top-left" => Ok(Self::TopLeft),
            "top-right" => Ok(Self::TopRight),
            "bottom-left" => Ok(Self::BottomLeft),
            "bottom-right" => Ok(Self::BottomRight),
            other => Err(ToolError::validation(format!("Unknown watermark position: {}", other))),
        }
    }
}

#[derive(Debug, Clone)]
pub enum WatermarkOptions {
    Text {
        content: String,
        font_size: f64,
        /// `#RRGGBB`
        color: String,
        opacity: f64,
        position: WatermarkPosition,
    },
    Image {
        image: PendingFile,
        opacity: f64,
        position: WatermarkPosition,
    },
}

impl WatermarkOptions {
    /// Text mode needs non-blank text, image mode a chosen image
    pub fn is_ready(&self) -> bool {
        match self {
            WatermarkOptions::Text { content, .. } => !content.trim().is_empty(),
            WatermarkOptions::Image { image, .. } => !image.bytes.is_empty(),
        }
    }

    fn opacity(&self) -> f64 {
        match self {
            WatermarkOptions::Text { opacity, .. } | WatermarkOptions::Image { opacity, .. } => *opacity,
        }
    }
}

/// Primary action of the watermark tool: a document loaded and a mark chosen
pub fn is_action_enabled(state: &ToolFileState, options: &WatermarkOptions) -> bool {
    state.is_action_enabled() && options.is_ready()
}

/// Run the watermark tool on its loaded document
pub fn watermark_state(state: &ToolFileState, options: &WatermarkOptions) -> Result<Artifact, ToolError> {
    state.require_ready()?;
    let file = state
        .first()
        .ok_or_else(|| ToolError::validation("Please select a PDF file"))?;
    watermark_pdf(&file.bytes, options)
}

pub fn watermark_pdf(bytes: &[u8], options: &WatermarkOptions) -> Result<Artifact, ToolError> {
    let opacity = options.opacity();
    if !opacity.is_finite() {
        return Err(ToolError::validation("Opacity must be a number between 0 and 1"));
    }
    let opacity = opacity.clamp(0.0, 1.0);

    // Check user input before touching the document
    let mark = match options {
        WatermarkOptions::Text {
            content,
            font_size,
            color,
            position,
            ..
        } => {
            if content.trim().is_empty() {
                return Err(ToolError::validation("Please enter watermark text"));
            }
            if !(*font_size > 0.0) {
                return Err(ToolError::validation("Font size must be positive"));
            }
            Mark::Text {
                text: content,
                size: *font_size,
                rgb: parse_hex_color(color)?,
                position: *position,
            }
        }
        WatermarkOptions::Image { image, position, .. } => {
            if image.bytes.is_empty() {
                return Err(ToolError::validation("Please choose a watermark image"));
            }
            Admission::image().check(image)?;
            Mark::Image {
                bytes: &image.bytes,
                position: *position,
            }
        }
    };

    let mut doc = Document::load_mem(bytes).map_err(|e| ToolError::Parse(e.to_string()))?;

    let gs_id = doc.add_object(Dictionary::from_iter(vec![
        ("Type", Object::Name(b"ExtGState".to_vec())),
        ("ca", Object::Real(opacity as f32)),
        ("CA", Object::Real(opacity as f32)),
    ]));

    let resource = match mark {
        Mark::Text { .. } => {
            let font_id = doc.add_object(Dictionary::from_iter(vec![
                ("Type", Object::Name(b"Font".to_vec())),
                ("Subtype", Object::Name(b"Type1".to_vec())),
                ("BaseFont", Object::Name(b"Helvetica".to_vec())),
                ("Encoding", Object::Name(b"WinAnsiEncoding".to_vec())),
            ]));
            (&b"Font"[..], "FWm", font_id, None)
        }
        Mark::Image { bytes, .. } => {
            let image = embed_image(&mut doc, bytes)?;
            (
                &b"XObject"[..],
                "ImWm",
                image.id,
                Some((image.width as f64 * IMAGE_SCALE, image.height as f64 * IMAGE_SCALE)),
            )
        }
    };

    let pages: Vec<(u32, ObjectId)> = doc.get_pages().into_iter().collect();
    for (page_num, page_id) in pages {
        let page_box = media_box(&doc, page_id)?;

        let resources = page_resources_mut(&mut doc, page_id)?;
        let gs_name = register(resources, b"ExtGState", "GSWm", gs_id)?;
        let (category, prefix, id, image_size) = resource;
        let name = register(resources, category, prefix, id)?;

        let mut operations = vec![
            Operation::new("q", vec![]),
            Operation::new("gs", vec![Object::Name(gs_name.into_bytes())]),
        ];
        match (&mark, image_size) {
            (Mark::Text { text, size, rgb, position }, _) => {
                let width = text_width(text, *size);
                let (x, y) = position.place(page_box, width, *size);
                operations.extend(text_ops(&name, text, *size, *rgb, x, y));
            }
            (Mark::Image { position, .. }, Some((w, h))) => {
                let (x, y) = position.place(page_box, w, h);
                operations.extend(draw_image_ops(&name, Rect::new(x, y, w, h)));
            }
            (Mark::Image { .. }, None) => {}
        }
        operations.push(Operation::new("Q", vec![]));

        let content = Content { operations }
            .encode()
            .map_err(|e| ToolError::Operation(format!("Failed to encode watermark: {}", e)))?;
        append_content(&mut doc, page_id, content)?;
        tracing::debug!(page = page_num, "watermark applied");
    }

    doc.compress();
    let mut out = Vec::new();
    doc.save_to(&mut out)
        .map_err(|e| ToolError::Operation(format!("Save failed: {}", e)))?;
    tracing::info!(size = out.len(), "watermarked document");
    Ok(Artifact::pdf(WATERMARKED_PDF, out))
}

enum Mark<'a> {
    Text {
        text: &'a str,
        size: f64,
        rgb: (f32, f32, f32),
        position: WatermarkPosition,
    },
    Image {
        bytes: &'a [u8],
        position: WatermarkPosition,
    },
}

/// Add `id` under a fresh `prefix<n>` name in a resource category
fn register(
    resources: &mut Dictionary,
    category: &[u8],
    prefix: &str,
    id: ObjectId,
) -> Result<String, ToolError> {
    if !matches!(resources.get(category), Ok(Object::Dictionary(_))) {
        resources.set(category, Object::Dictionary(Dictionary::new()));
    }
    let Ok(Object::Dictionary(entries)) = resources.get_mut(category) else {
        return Err(ToolError::Operation("Page resources unavailable".into()));
    };

    let mut n = 1;
    let name = loop {
        let candidate = format!("{}{}", prefix, n);
        if !entries.has(candidate.as_bytes()) {
            break candidate;
        }
        n += 1;
    };
    entries.set(name.as_bytes(), Object::Reference(id));
    Ok(name)
}

fn text_ops(font: &str, text: &str, size: f64, rgb: (f32, f32, f32), x: f64, y: f64) -> Vec<Operation> {
    vec![
        Operation::new(
            "rg",
            vec![Object::Real(rgb.0), Object::Real(rgb.1), Object::Real(rgb.2)],
        ),
        Operation::new("BT", vec![]),
        Operation::new(
            "Tf",
            vec![Object::Name(font.as_bytes().to_vec()), Object::Real(size as f32)],
        ),
        Operation::new("Td", vec![Object::Real(x as f32), Object::Real(y as f32)]),
        Operation::new(
            "Tj",
            vec![Object::String(win_ansi(text), StringFormat::Literal)],
        ),
        Operation::new("ET", vec![]),
    ]
}

/// Latin-1 subset of WinAnsi; anything else becomes `?`
fn win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c as u32 {
            0x20..=0x7E | 0xA0..=0xFF => c as u8,
            _ => b'?',
        })
        .collect()
}

/// Parse `#RRGGBB` into RGB components in `0.0..=1.0`
pub fn parse_hex_color(color: &str) -> Result<(f32, f32, f32), ToolError> {
    let hex = color.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(ToolError::validation(format!(
            "Invalid colour '{}': expected #RRGGBB",
            color
        )));
    }
    let channel = |i: usize| {
        u8::from_str_radix(&hex[i..i + 2], 16)
            .map(|v| v as f32 / 255.0)
            .map_err(|_| ToolError::validation(format!("Invalid colour '{}'", color)))
    };
    Ok((channel(0)?, channel(2)?, channel(4)?))
}

/// Helvetica advance widths for ASCII 32..=126, in 1/1000 em
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '..'/'
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, // 0-9
    278, 278, 584, 584, 584, 556, 1015, // ':'..'@'
    667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, // A-M
    722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, // N-Z
    278, 278, 278, 469, 556, 333, // '['..'`'
    556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, // a-m
    556, 556, 556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, // n-z
    334, 260, 334, 584, // '{'..'~'
];

/// Rendered width of `text` in Helvetica at `size` points
pub fn text_width(text: &str, size: f64) -> f64 {
    let units: u32 = text
        .chars()
        .map(|c| match c as u32 {
            code @ 32..=126 => HELVETICA_WIDTHS[(code - 32) as usize] as u32,
            _ => 556,
        })
        .sum();
    units as f64 * size / 1000.0
}
