//! PDF to images
//!
//! Page rasterisation sits behind [`PageRenderer`] so a full rendering
//! engine can be plugged in: PDFium natively (the `pdfium` feature) or a
//! JavaScript renderer in the browser. The bundled [`EmbeddedImageRenderer`]
//! is the fallback for scanned documents: it decodes the largest raster
//! image drawn on a page.

use crate::archive::build_zip;
use crate::artifact::{Artifact, PDF_IMAGES_ZIP};
use crate::error::ToolError;
use crate::page_info::{normalize_rotation, page_rotation, resolve};
use crate::state::ToolFileState;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::Cursor;

/// Form XObjects nest; bail out past this depth
const MAX_FORM_DEPTH: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RasterFormat {
    #[default]
    Jpeg,
    Png,
}

impl RasterFormat {
    pub fn extension(self) -> &'static str {
        match self {
            RasterFormat::Jpeg => "jpg",
            RasterFormat::Png => "png",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderOptions {
    #[serde(default)]
    pub format: RasterFormat,
    /// JPEG quality, 1-100
    #[serde(default = "default_quality")]
    pub jpeg_quality: u8,
    /// Output size relative to the renderer's natural page size
    #[serde(default = "default_scale")]
    pub scale: f32,
}

fn default_quality() -> u8 {
    92
}

fn default_scale() -> f32 {
    1.0
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            format: RasterFormat::default(),
            jpeg_quality: default_quality(),
            scale: default_scale(),
        }
    }
}

/// One page of a document being rendered
#[derive(Debug, Clone, Copy)]
pub struct PageSource<'a> {
    /// The file as uploaded, for engines that parse it themselves
    pub bytes: &'a [u8],
    pub doc: &'a Document,
    pub page_id: ObjectId,
    /// 1-based
    pub number: u32,
}

/// Rasterises one page of a loaded document
///
/// The returned image is already at `scale`.
pub trait PageRenderer {
    fn render_page(&self, page: &PageSource<'_>, scale: f32) -> Result<DynamicImage, ToolError>;
}

/// Renders a page as the largest image XObject it draws
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbeddedImageRenderer;

impl PageRenderer for EmbeddedImageRenderer {
    fn render_page(&self, page: &PageSource<'_>, scale: f32) -> Result<DynamicImage, ToolError> {
        let (doc, page_id) = (page.doc, page.page_id);
        doc.get_dictionary(page_id)
            .map_err(|e| ToolError::Parse(e.to_string()))?;

        let mut seen = HashSet::new();
        let mut candidates = Vec::new();
        if let Some(resources) = page_resources(doc, page_id) {
            collect_images(doc, resources, 0, &mut seen, &mut candidates);
        }

        let largest = candidates
            .into_iter()
            .max_by_key(|(_, stream)| pixel_area(stream))
            .ok_or_else(|| ToolError::Operation("Page has no raster content to render".into()))?;

        let img = decode_image_stream(doc, largest.1)?;

        // Page-level /Rotate turns the displayed page
        let rotation = normalize_rotation(page_rotation(doc, page_id));
        let img = match rotation {
            90 => img.rotate90(),
            180 => img.rotate180(),
            270 => img.rotate270(),
            _ => img,
        };
        Ok(scale_image(img, scale))
    }
}

/// Render every page and pack them into `pdf-images.zip`
pub fn pdf_to_images(
    bytes: &[u8],
    options: &RenderOptions,
    renderer: &dyn PageRenderer,
) -> Result<Artifact, ToolError> {
    let doc = Document::load_mem(bytes).map_err(|e| ToolError::Parse(e.to_string()))?;
    let pages = doc.get_pages();

    let mut entries = Vec::with_capacity(pages.len());
    for (page_num, page_id) in pages {
        tracing::debug!(page = page_num, "rendering page");
        let page = PageSource {
            bytes,
            doc: &doc,
            page_id,
            number: page_num,
        };
        let img = renderer
            .render_page(&page, options.scale)
            .map_err(|e| match e {
                ToolError::Operation(msg) => ToolError::Operation(format!("Page {}: {}", page_num, msg)),
                other => other,
            })?;
        let encoded = encode_raster(&img, options)?;
        entries.push((
            format!("page-{}.{}", page_num, options.format.extension()),
            encoded,
        ));
    }

    let zip = build_zip(entries)?;
    tracing::info!(size = zip.len(), "rendered pages to images");
    Ok(Artifact::zip(PDF_IMAGES_ZIP, zip))
}

/// Run the PDF-to-images tool on its loaded document
pub fn render_state(
    state: &ToolFileState,
    options: &RenderOptions,
    renderer: &dyn PageRenderer,
) -> Result<Artifact, ToolError> {
    state.require_ready()?;
    let file = state
        .first()
        .ok_or_else(|| ToolError::validation("Please select a PDF file"))?;
    pdf_to_images(&file.bytes, options, renderer)
}

pub(crate) fn scale_image(img: DynamicImage, scale: f32) -> DynamicImage {
    if !(scale > 0.0) || (scale - 1.0).abs() < f32::EPSILON {
        return img;
    }
    let w = ((img.width() as f32 * scale).round() as u32).max(1);
    let h = ((img.height() as f32 * scale).round() as u32).max(1);
    img.resize_exact(w, h, FilterType::Triangle)
}

/// Encode a raster as JPEG (flattened to RGB) or PNG
pub fn encode_raster(img: &DynamicImage, options: &RenderOptions) -> Result<Vec<u8>, ToolError> {
    let mut out = Vec::new();
    match options.format {
        RasterFormat::Jpeg => {
            let rgb = img.to_rgb8();
            let quality = options.jpeg_quality.clamp(1, 100);
            JpegEncoder::new_with_quality(&mut out, quality).encode_image(&rgb)?;
        }
        RasterFormat::Png => {
            img.write_to(&mut Cursor::new(&mut out), ImageFormat::Png)?;
        }
    }
    Ok(out)
}

fn page_resources(doc: &Document, page_id: ObjectId) -> Option<&Dictionary> {
    let mut current = doc.get_dictionary(page_id).ok();
    for _ in 0..32 {
        let dict = current?;
        if let Ok(res) = dict.get(b"Resources") {
            return resolve(doc, res).as_dict().ok();
        }
        current = dict
            .get(b"Parent")
            .and_then(Object::as_reference)
            .and_then(|id| doc.get_dictionary(id))
            .ok();
    }
    None
}

/// Gather image XObjects from a resource dictionary, descending into forms
fn collect_images<'a>(
    doc: &'a Document,
    resources: &'a Dictionary,
    depth: usize,
    seen: &mut HashSet<ObjectId>,
    out: &mut Vec<(ObjectId, &'a Stream)>,
) {
    if depth > MAX_FORM_DEPTH {
        return;
    }
    let Some(xobjects) = resources
        .get(b"XObject")
        .ok()
        .and_then(|x| resolve(doc, x).as_dict().ok())
    else {
        return;
    };

    for (_, value) in xobjects.iter() {
        let Ok(id) = value.as_reference() else {
            continue;
        };
        if !seen.insert(id) {
            continue;
        }
        let Ok(Object::Stream(stream)) = doc.get_object(id) else {
            continue;
        };
        match stream.dict.get(b"Subtype").and_then(Object::as_name) {
            Ok(b"Image") => out.push((id, stream)),
            Ok(b"Form") => {
                if let Some(form_res) = stream
                    .dict
                    .get(b"Resources")
                    .ok()
                    .and_then(|r| resolve(doc, r).as_dict().ok())
                {
                    collect_images(doc, form_res, depth + 1, seen, out);
                }
            }
            _ => {}
        }
    }
}

fn dimension(stream: &Stream, key: &[u8]) -> u32 {
    stream
        .dict
        .get(key)
        .and_then(Object::as_i64)
        .map(|v| v.max(0) as u32)
        .unwrap_or(0)
}

fn pixel_area(stream: &Stream) -> u64 {
    dimension(stream, b"Width") as u64 * dimension(stream, b"Height") as u64
}

fn filter_names(stream: &Stream) -> Vec<Vec<u8>> {
    match stream.dict.get(b"Filter") {
        Ok(Object::Name(n)) => vec![n.clone()],
        Ok(Object::Array(arr)) => arr
            .iter()
            .filter_map(|f| f.as_name().ok().map(<[u8]>::to_vec))
            .collect(),
        _ => Vec::new(),
    }
}

/// Number of colour components of an image's colour space
///
/// `None` for colour spaces the decoder cannot map to device pixels
/// (Lab, Indexed, Separation and friends).
pub(crate) fn components(doc: &Document, stream: &Stream) -> Option<usize> {
    let cs = stream.dict.get(b"ColorSpace").ok().map(|c| resolve(doc, c))?;
    match cs {
        Object::Name(name) => match name.as_slice() {
            b"DeviceGray" | b"CalGray" => Some(1),
            b"DeviceRGB" | b"CalRGB" => Some(3),
            b"DeviceCMYK" => Some(4),
            _ => None,
        },
        Object::Array(arr) => match arr.first().and_then(|f| f.as_name().ok()) {
            Some(b"ICCBased") => {
                let profile = arr.get(1).map(|p| resolve(doc, p))?;
                match profile {
                    Object::Stream(s) => s.dict.get(b"N").and_then(Object::as_i64).ok().map(|n| n as usize),
                    _ => None,
                }
            }
            Some(b"CalRGB") => Some(3),
            Some(b"CalGray") => Some(1),
            _ => None,
        },
        _ => None,
    }
}

/// Decode an image XObject into pixels
pub(crate) fn decode_image_stream(doc: &Document, stream: &Stream) -> Result<DynamicImage, ToolError> {
    let filters = filter_names(stream);

    if filters.last().map(Vec::as_slice) == Some(&b"DCTDecode"[..]) {
        let data = if filters.len() > 1 {
            // e.g. [/FlateDecode /DCTDecode]: strip the outer layers first
            let mut outer = stream.clone();
            outer.dict.set(
                "Filter",
                Object::Array(
                    filters[..filters.len() - 1]
                        .iter()
                        .map(|f| Object::Name(f.clone()))
                        .collect(),
                ),
            );
            outer
                .decompressed_content()
                .map_err(|e| ToolError::Image(e.to_string()))?
        } else {
            stream.content.clone()
        };
        return Ok(image::load_from_memory_with_format(&data, ImageFormat::Jpeg)?);
    }

    let width = dimension(stream, b"Width");
    let height = dimension(stream, b"Height");
    if width == 0 || height == 0 {
        return Err(ToolError::Image("Invalid image dimensions".into()));
    }

    let bits = stream
        .dict
        .get(b"BitsPerComponent")
        .and_then(Object::as_i64)
        .unwrap_or(8);
    if bits != 8 {
        return Err(ToolError::Image(format!(
            "Unsupported bits per component: {}",
            bits
        )));
    }

    let data = if filters.is_empty() {
        stream.content.clone()
    } else {
        stream
            .decompressed_content()
            .map_err(|e| ToolError::Image(format!("Failed to decode image stream: {}", e)))?
    };

    let pixels = width as usize * height as usize;
    let too_short = || ToolError::Image("Image data shorter than its dimensions".into());

    let channels = components(doc, stream)
        .ok_or_else(|| ToolError::Image("Unsupported image colour space".into()))?;
    let mut data = data.get(..pixels * channels).ok_or_else(too_short)?.to_vec();
    if inverts_samples(stream, channels)? {
        data.iter_mut().for_each(|sample| *sample = 255 - *sample);
    }

    match channels {
        1 => GrayImage::from_raw(width, height, data)
            .map(DynamicImage::ImageLuma8)
            .ok_or_else(too_short),
        3 => RgbImage::from_raw(width, height, data)
            .map(DynamicImage::ImageRgb8)
            .ok_or_else(too_short),
        4 => {
            let rgb: Vec<u8> = data
                .chunks_exact(4)
                .flat_map(|p| {
                    let k = 255 - p[3] as u16;
                    [
                        ((255 - p[0] as u16) * k / 255) as u8,
                        ((255 - p[1] as u16) * k / 255) as u8,
                        ((255 - p[2] as u16) * k / 255) as u8,
                    ]
                })
                .collect();
            RgbImage::from_raw(width, height, rgb)
                .map(DynamicImage::ImageRgb8)
                .ok_or_else(too_short)
        }
        n => Err(ToolError::Image(format!("Unsupported colour components: {}", n))),
    }
}

/// Whether a `/Decode` array flips every sample; identity arrays are ignored
fn inverts_samples(stream: &Stream, channels: usize) -> Result<bool, ToolError> {
    let Ok(Object::Array(decode)) = stream.dict.get(b"Decode") else {
        return Ok(false);
    };
    let values: Vec<f32> = decode.iter().filter_map(|v| v.as_float().ok()).collect();
    if values.len() != channels * 2 {
        return Err(ToolError::Image("Malformed /Decode array".into()));
    }

    let pairs: Vec<(f32, f32)> = values.chunks_exact(2).map(|p| (p[0], p[1])).collect();
    if pairs.iter().all(|&p| p == (0.0, 1.0)) {
        Ok(false)
    } else if pairs.iter().all(|&p| p == (1.0, 0.0)) {
        Ok(true)
    } else {
        Err(ToolError::Image("Unsupported /Decode array".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{DocumentBuilder, Placement};
    use crate::layout::Rect;
    use crate::state::{PendingFile, ToolKind, PDF_MIME};
    use crate::testing::{create_test_pdf, jpeg_image, png_image};
    use std::io::Read;

    fn scanned_pdf(images: &[Vec<u8>]) -> Vec<u8> {
        let mut builder = DocumentBuilder::new();
        for bytes in images {
            let image = builder.add_image(bytes).unwrap();
            let rect = Rect::new(0.0, 0.0, image.width as f64, image.height as f64);
            builder
                .add_page(image.width as f64, image.height as f64, &[Placement { image, rect }])
                .unwrap();
        }
        builder.finish().unwrap()
    }

    fn entries(zip_bytes: Vec<u8>) -> Vec<(String, Vec<u8>)> {
        let mut archive = zip::ZipArchive::new(Cursor::new(zip_bytes)).unwrap();
        (0..archive.len())
            .map(|i| {
                let mut entry = archive.by_index(i).unwrap();
                let mut data = Vec::new();
                entry.read_to_end(&mut data).unwrap();
                (entry.name().to_string(), data)
            })
            .collect()
    }

    #[test]
    fn test_renders_each_page_as_jpeg() {
        let pdf = scanned_pdf(&[png_image(30, 20), jpeg_image(16, 16)]);
        let artifact = pdf_to_images(&pdf, &RenderOptions::default(), &EmbeddedImageRenderer).unwrap();
        assert_eq!(artifact.filename, "pdf-images.zip");

        let files = entries(artifact.bytes);
        let names: Vec<_> = files.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["page-1.jpg", "page-2.jpg"]);

        let first = image::load_from_memory(&files[0].1).unwrap();
        assert_eq!((first.width(), first.height()), (30, 20));
    }

    #[test]
    fn test_png_output_and_scale() {
        let pdf = scanned_pdf(&[png_image(40, 10)]);
        let options = RenderOptions {
            format: RasterFormat::Png,
            scale: 0.5,
            ..RenderOptions::default()
        };
        let files = entries(pdf_to_images(&pdf, &options, &EmbeddedImageRenderer).unwrap().bytes);
        assert_eq!(files[0].0, "page-1.png");
        let img = image::load_from_memory(&files[0].1).unwrap();
        assert_eq!((img.width(), img.height()), (20, 5));
    }

    #[test]
    fn test_text_only_page_fails_with_page_number() {
        let err = pdf_to_images(&create_test_pdf(1), &RenderOptions::default(), &EmbeddedImageRenderer)
            .unwrap_err();
        assert!(err.to_string().contains("Page 1"));
    }

    fn raw_image(color_space: Object, data: Vec<u8>) -> Stream {
        let dict = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"XObject".to_vec())),
            ("Subtype", Object::Name(b"Image".to_vec())),
            ("Width", Object::Integer(2)),
            ("Height", Object::Integer(1)),
            ("BitsPerComponent", Object::Integer(8)),
            ("ColorSpace", color_space),
        ]);
        Stream::new(dict, data)
    }

    #[test]
    fn test_lab_image_is_not_read_as_rgb() {
        let doc = Document::with_version("1.7");
        let lab = Object::Array(vec![
            Object::Name(b"Lab".to_vec()),
            Object::Dictionary(Dictionary::new()),
        ]);
        let err = decode_image_stream(&doc, &raw_image(lab, vec![50; 6])).unwrap_err();
        assert!(err.to_string().contains("colour space"));

        let mut missing = raw_image(Object::Null, vec![50; 6]);
        missing.dict.remove(b"ColorSpace");
        assert!(decode_image_stream(&doc, &missing).is_err());
    }

    #[test]
    fn test_decode_array_inverts_samples() {
        let doc = Document::with_version("1.7");
        let mut stream = raw_image(Object::Name(b"DeviceGray".to_vec()), vec![0, 200]);
        stream.dict.set(
            "Decode",
            Object::Array(vec![Object::Integer(1), Object::Integer(0)]),
        );
        let img = decode_image_stream(&doc, &stream).unwrap().to_luma8();
        assert_eq!(img.as_raw(), &vec![255, 55]);

        stream.dict.set(
            "Decode",
            Object::Array(vec![Object::Real(0.2), Object::Real(0.8)]),
        );
        assert!(decode_image_stream(&doc, &stream).is_err());
    }

    #[test]
    fn test_custom_renderer_is_used() {
        struct Blank {
            seen: std::cell::RefCell<Vec<(u32, usize, f32)>>,
        }
        impl PageRenderer for Blank {
            fn render_page(&self, page: &PageSource<'_>, scale: f32) -> Result<DynamicImage, ToolError> {
                self.seen.borrow_mut().push((page.number, page.bytes.len(), scale));
                Ok(DynamicImage::ImageRgb8(RgbImage::new(4, 4)))
            }
        }

        let pdf = create_test_pdf(3);
        let mut state = ToolFileState::new(ToolKind::PdfToImages);
        state
            .add(PendingFile::new("t.pdf", PDF_MIME, pdf.clone()))
            .unwrap();
        let renderer = Blank {
            seen: Default::default(),
        };
        let options = RenderOptions {
            scale: 2.0,
            ..RenderOptions::default()
        };
        let artifact = render_state(&state, &options, &renderer).unwrap();
        assert_eq!(entries(artifact.bytes).len(), 3);
        assert_eq!(
            renderer.seen.into_inner(),
            vec![(1, pdf.len(), 2.0), (2, pdf.len(), 2.0), (3, pdf.len(), 2.0)]
        );
    }
}
