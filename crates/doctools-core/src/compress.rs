//! PDF compression
//!
//! Drops unreachable objects, Flate-compresses streams and re-encodes
//! oversized raster images as JPEG.

use crate::artifact::{Artifact, COMPRESSED_PDF};
use crate::error::ToolError;
use crate::render::{components, decode_image_stream};
use crate::state::ToolFileState;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ColorType, DynamicImage};
use lopdf::{Document, Object, ObjectId, Stream};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressOptions {
    #[serde(default = "default_quality")]
    pub jpeg_quality: u8,
    /// Images with a longer side are downscaled to this many pixels
    #[serde(default = "default_max_dimension")]
    pub max_image_dimension: u32,
    /// Re-encode every image, not only oversized ones
    #[serde(default)]
    pub recompress_images: bool,
}

fn default_quality() -> u8 {
    75
}

fn default_max_dimension() -> u32 {
    1600
}

impl Default for CompressOptions {
    fn default() -> Self {
        Self {
            jpeg_quality: default_quality(),
            max_image_dimension: default_max_dimension(),
            recompress_images: false,
        }
    }
}

/// What a compression pass changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompressStats {
    pub original_size: usize,
    pub compressed_size: usize,
    pub images_reencoded: usize,
    pub objects_pruned: usize,
}

pub fn compress_pdf(bytes: &[u8], options: &CompressOptions) -> Result<Artifact, ToolError> {
    let (out, stats) = compress_with_stats(bytes, options)?;
    tracing::info!(
        before = stats.original_size,
        after = stats.compressed_size,
        images = stats.images_reencoded,
        pruned = stats.objects_pruned,
        "compressed document"
    );
    Ok(Artifact::pdf(COMPRESSED_PDF, out))
}

/// Run the compress tool on its loaded document
pub fn compress_state(state: &ToolFileState, options: &CompressOptions) -> Result<Artifact, ToolError> {
    state.require_ready()?;
    let file = state
        .first()
        .ok_or_else(|| ToolError::validation("Please select a PDF file"))?;
    compress_pdf(&file.bytes, options)
}

pub fn compress_with_stats(
    bytes: &[u8],
    options: &CompressOptions,
) -> Result<(Vec<u8>, CompressStats), ToolError> {
    let mut doc = Document::load_mem(bytes).map_err(|e| ToolError::Parse(e.to_string()))?;
    let mut stats = CompressStats {
        original_size: bytes.len(),
        ..CompressStats::default()
    };

    stats.objects_pruned = doc.prune_objects().len();

    for id in image_candidates(&doc) {
        match reencode(&doc, id, options) {
            Ok(Some(stream)) => {
                doc.objects.insert(id, Object::Stream(stream));
                stats.images_reencoded += 1;
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(object = ?id, error = %e, "image left as-is"),
        }
    }

    doc.compress();

    let mut out = Vec::new();
    doc.save_to(&mut out)
        .map_err(|e| ToolError::Operation(format!("Save failed: {}", e)))?;
    stats.compressed_size = out.len();
    Ok((out, stats))
}

/// Image XObjects worth looking at; soft masks and stencil masks stay exact
fn image_candidates(doc: &Document) -> Vec<ObjectId> {
    let masks: HashSet<ObjectId> = doc
        .objects
        .values()
        .filter_map(|obj| match obj {
            Object::Stream(s) => s.dict.get(b"SMask").and_then(Object::as_reference).ok(),
            _ => None,
        })
        .collect();

    doc.objects
        .iter()
        .filter_map(|(id, obj)| match obj {
            Object::Stream(s) if is_plain_image(s) && !masks.contains(id) && is_device_colour(doc, s) => {
                Some(*id)
            }
            _ => None,
        })
        .collect()
}

fn is_plain_image(stream: &Stream) -> bool {
    let dict = &stream.dict;
    dict.get(b"Subtype").and_then(Object::as_name).ok() == Some(&b"Image"[..])
        && !matches!(dict.get(b"ImageMask"), Ok(Object::Boolean(true)))
}

/// Re-encoding writes DeviceGray or DeviceRGB samples, so only images
/// already in those terms (and without a `/Decode` remap) can be replaced
fn is_device_colour(doc: &Document, stream: &Stream) -> bool {
    components(doc, stream).is_some() && stream.dict.get(b"Decode").is_err()
}

/// Re-encoded stream for `id`, or `None` when the image should stay
fn reencode(doc: &Document, id: ObjectId, options: &CompressOptions) -> Result<Option<Stream>, ToolError> {
    let Ok(Object::Stream(original)) = doc.get_object(id) else {
        return Ok(None);
    };

    let img = decode_image_stream(doc, original)?;
    let longest = img.width().max(img.height());
    let limit = options.max_image_dimension.max(1);
    if longest <= limit && !options.recompress_images {
        return Ok(None);
    }

    let img = if longest > limit {
        img.resize(limit, limit, FilterType::Lanczos3)
    } else {
        img
    };

    let (data, color_space) = encode_jpeg(&img, options.jpeg_quality)?;
    if data.len() >= original.content.len() {
        tracing::debug!(object = ?id, "re-encoded image would grow, skipped");
        return Ok(None);
    }

    let mut dict = original.dict.clone();
    for key in [&b"DecodeParms"[..], &b"Length"[..]] {
        dict.remove(key);
    }
    dict.set("Filter", Object::Name(b"DCTDecode".to_vec()));
    dict.set("Width", Object::Integer(img.width() as i64));
    dict.set("Height", Object::Integer(img.height() as i64));
    dict.set("ColorSpace", Object::Name(color_space.to_vec()));
    dict.set("BitsPerComponent", Object::Integer(8));

    tracing::debug!(
        object = ?id,
        before = original.content.len(),
        after = data.len(),
        "image re-encoded"
    );
    Ok(Some(Stream::new(dict, data).with_compression(false)))
}

fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<(Vec<u8>, &'static [u8]), ToolError> {
    let mut out = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100));
    let color_space: &[u8] = if matches!(img.color(), ColorType::L8 | ColorType::L16) {
        encoder.encode_image(&img.to_luma8())?;
        b"DeviceGray"
    } else {
        encoder.encode_image(&img.to_rgb8())?;
        b"DeviceRGB"
    };
    Ok((out, color_space))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{DocumentBuilder, Placement};
    use crate::layout::Rect;
    use crate::testing::{create_test_pdf, noisy_png, page_count, png_image};

    fn pdf_with_image(bytes: &[u8]) -> Vec<u8> {
        let mut builder = DocumentBuilder::new();
        let image = builder.add_image(bytes).unwrap();
        let rect = Rect::new(0.0, 0.0, 200.0, 200.0);
        builder.add_page(200.0, 200.0, &[Placement { image, rect }]).unwrap();
        builder.finish().unwrap()
    }

    fn image_sizes(bytes: &[u8]) -> Vec<(i64, i64)> {
        let doc = Document::load_mem(bytes).unwrap();
        doc.objects
            .values()
            .filter_map(|o| match o {
                Object::Stream(s) if is_plain_image(s) => Some((
                    s.dict.get(b"Width").unwrap().as_i64().unwrap(),
                    s.dict.get(b"Height").unwrap().as_i64().unwrap(),
                )),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_text_document_stays_valid() {
        let input = create_test_pdf(3);
        let artifact = compress_pdf(&input, &CompressOptions::default()).unwrap();
        assert_eq!(artifact.filename, "compressed.pdf");
        assert_eq!(page_count(&artifact.bytes), 3);
    }

    #[test]
    fn test_oversized_image_is_downscaled() {
        let input = pdf_with_image(&noisy_png(200, 100));
        let options = CompressOptions {
            max_image_dimension: 50,
            ..CompressOptions::default()
        };
        let (out, stats) = compress_with_stats(&input, &options).unwrap();
        assert_eq!(stats.images_reencoded, 1);
        assert!(out.len() < input.len());
        assert_eq!(image_sizes(&out), vec![(50, 25)]);
    }

    #[test]
    fn test_small_images_untouched_by_default() {
        let input = pdf_with_image(&noisy_png(40, 40));
        let (_, stats) = compress_with_stats(&input, &CompressOptions::default()).unwrap();
        assert_eq!(stats.images_reencoded, 0);
    }

    #[test]
    fn test_image_that_would_grow_is_kept() {
        // A flat colour deflates to almost nothing
        let input = pdf_with_image(&png_image(300, 300));
        let options = CompressOptions {
            recompress_images: true,
            ..CompressOptions::default()
        };
        let (out, stats) = compress_with_stats(&input, &options).unwrap();
        assert_eq!(stats.images_reencoded, 0);
        assert_eq!(image_sizes(&out), vec![(300, 300)]);
    }

    fn with_image_entry(bytes: &[u8], key: &str, value: Object) -> Vec<u8> {
        let mut doc = Document::load_mem(bytes).unwrap();
        for obj in doc.objects.values_mut() {
            if let Object::Stream(s) = obj {
                if is_plain_image(s) {
                    s.dict.set(key, value.clone());
                }
            }
        }
        let mut out = Vec::new();
        doc.save_to(&mut out).unwrap();
        out
    }

    #[test]
    fn test_non_device_colour_image_is_left_alone() {
        let options = CompressOptions {
            max_image_dimension: 50,
            ..CompressOptions::default()
        };
        let lab = Object::Array(vec![
            Object::Name(b"Lab".to_vec()),
            Object::Dictionary(lopdf::Dictionary::new()),
        ]);
        let input = with_image_entry(&pdf_with_image(&noisy_png(200, 100)), "ColorSpace", lab);
        let (out, stats) = compress_with_stats(&input, &options).unwrap();
        assert_eq!(stats.images_reencoded, 0);
        assert_eq!(image_sizes(&out), vec![(200, 100)]);
    }

    #[test]
    fn test_image_with_decode_array_is_left_alone() {
        let options = CompressOptions {
            max_image_dimension: 50,
            ..CompressOptions::default()
        };
        let decode = Object::Array([1, 0, 1, 0, 1, 0].into_iter().map(Object::Integer).collect());
        let input = with_image_entry(&pdf_with_image(&noisy_png(200, 100)), "Decode", decode);
        let (out, stats) = compress_with_stats(&input, &options).unwrap();
        assert_eq!(stats.images_reencoded, 0);

        let doc = Document::load_mem(&out).unwrap();
        assert!(doc.objects.values().any(|o| matches!(
            o,
            Object::Stream(s) if is_plain_image(s) && s.dict.get(b"Decode").is_ok()
        )));
    }

    #[test]
    fn test_garbage_is_parse_error() {
        assert!(matches!(
            compress_pdf(b"not a pdf", &CompressOptions::default()),
            Err(ToolError::Parse(_))
        ));
    }
}
