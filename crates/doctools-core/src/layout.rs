//! Page geometry helpers shared by the layout tools

use crate::page_info::Orientation;

/// A4 in points
pub const A4_WIDTH: f64 = 595.28;
pub const A4_HEIGHT: f64 = 841.89;

/// Millimetres to points
pub fn mm(value: f64) -> f64 {
    value * 72.0 / 25.4
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// A4 page size matching the orientation of the content
///
/// Square content gets a portrait page.
pub fn a4_for(orientation: Orientation) -> (f64, f64) {
    match orientation {
        Orientation::Landscape => (A4_HEIGHT, A4_WIDTH),
        Orientation::Portrait | Orientation::Square => (A4_WIDTH, A4_HEIGHT),
    }
}

/// Largest size with the same aspect ratio as `width × height` that fits
/// inside `max_width × max_height`; never larger than the natural size
/// unless `upscale` is set
pub fn fit_size(width: f64, height: f64, max_width: f64, max_height: f64, upscale: bool) -> (f64, f64) {
    if width <= 0.0 || height <= 0.0 {
        return (0.0, 0.0);
    }
    let mut scale = (max_width / width).min(max_height / height);
    if !upscale {
        scale = scale.min(1.0);
    }
    (width * scale, height * scale)
}

/// Fit `width × height` into `frame` and center it there
pub fn fit_centered(width: f64, height: f64, frame: Rect, upscale: bool) -> Rect {
    let (w, h) = fit_size(width, height, frame.width, frame.height, upscale);
    Rect::new(
        frame.x + (frame.width - w) / 2.0,
        frame.y + (frame.height - h) / 2.0,
        w,
        h,
    )
}
