//! Raster image embedding
//!
//! Baseline RGB and grayscale JPEGs are embedded as-is (`DCTDecode`).
//! Everything else is decoded, flattened to 8-bit RGB and stored
//! `FlateDecode`, with any alpha channel split into an `SMask`.

use crate::error::ToolError;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::{DynamicImage, GenericImageView, ImageFormat};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use std::io::Write;

/// An image XObject added to a document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmbeddedImage {
    pub id: ObjectId,
    pub width: u32,
    pub height: u32,
}

/// Header facts of a JPEG stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JpegInfo {
    pub width: u32,
    pub height: u32,
    pub components: u8,
}

/// Add an image (any format the `image` crate decodes) to `doc`
pub fn embed_image(doc: &mut Document, bytes: &[u8]) -> Result<EmbeddedImage, ToolError> {
    let format = image::guess_format(bytes)?;

    if format == ImageFormat::Jpeg {
        if let Some(info) = jpeg_info(bytes).filter(|i| i.components == 1 || i.components == 3) {
            let color_space = if info.components == 1 {
                "DeviceGray"
            } else {
                "DeviceRGB"
            };
            let stream = image_stream(
                info.width,
                info.height,
                color_space,
                "DCTDecode",
                bytes.to_vec(),
            );
            let id = doc.add_object(stream);
            return Ok(EmbeddedImage {
                id,
                width: info.width,
                height: info.height,
            });
        }
    }

    let img = image::load_from_memory(bytes)?;
    embed_decoded(doc, &img)
}

/// Add an already-decoded image to `doc`
pub fn embed_decoded(doc: &mut Document, img: &DynamicImage) -> Result<EmbeddedImage, ToolError> {
    let (width, height) = img.dimensions();
    let rgb = img.to_rgb8();
    let mut stream = image_stream(width, height, "DeviceRGB", "FlateDecode", deflate(rgb.as_raw())?);

    if img.color().has_alpha() {
        let alpha: Vec<u8> = img.to_rgba8().pixels().map(|p| p.0[3]).collect();
        if alpha.iter().any(|&a| a < 255) {
            let mask = image_stream(width, height, "DeviceGray", "FlateDecode", deflate(&alpha)?);
            let mask_id = doc.add_object(mask);
            stream.dict.set("SMask", Object::Reference(mask_id));
        }
    }

    let id = doc.add_object(stream);
    Ok(EmbeddedImage { id, width, height })
}

fn image_stream(
    width: u32,
    height: u32,
    color_space: &str,
    filter: &str,
    data: Vec<u8>,
) -> Stream {
    let mut dict = Dictionary::new();
    dict.set("Type", Object::Name(b"XObject".to_vec()));
    dict.set("Subtype", Object::Name(b"Image".to_vec()));
    dict.set("Width", Object::Integer(width as i64));
    dict.set("Height", Object::Integer(height as i64));
    dict.set("ColorSpace", Object::Name(color_space.as_bytes().to_vec()));
    dict.set("BitsPerComponent", Object::Integer(8));
    dict.set("Filter", Object::Name(filter.as_bytes().to_vec()));

    // Data is already encoded; keep lopdf from compressing it again
    Stream::new(dict, data).with_compression(false)
}

fn deflate(data: &[u8]) -> Result<Vec<u8>, ToolError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| ToolError::Image(format!("Failed to compress image data: {}", e)))?;
    encoder
        .finish()
        .map_err(|e| ToolError::Image(format!("Failed to finish compression: {}", e)))
}

/// Read size and component count from the first SOF marker of a JPEG
pub fn jpeg_info(bytes: &[u8]) -> Option<JpegInfo> {
    if bytes.len() < 4 || bytes[0] != 0xFF || bytes[1] != 0xD8 {
        return None;
    }

    let mut pos = 2;
    while pos + 4 <= bytes.len() {
        if bytes[pos] != 0xFF {
            return None;
        }
        let marker = bytes[pos + 1];
        // Fill bytes between markers
        if marker == 0xFF {
            pos += 1;
            continue;
        }
        let len = u16::from_be_bytes([bytes[pos + 2], bytes[pos + 3]]) as usize;

        let is_sof = matches!(marker, 0xC0..=0xCF) && !matches!(marker, 0xC4 | 0xC8 | 0xCC);
        if is_sof {
            let seg = bytes.get(pos + 4..pos + 10)?;
            return Some(JpegInfo {
                height: u16::from_be_bytes([seg[1], seg[2]]) as u32,
                width: u16::from_be_bytes([seg[3], seg[4]]) as u32,
                components: seg[5],
            });
        }
        pos += 2 + len;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{jpeg_image, png_image, translucent_png};

    fn stream_of(doc: &Document, id: ObjectId) -> &Stream {
        match doc.get_object(id).unwrap() {
            Object::Stream(s) => s,
            other => panic!("expected stream, got {:?}", other),
        }
    }

    #[test]
    fn test_jpeg_info_reads_dimensions() {
        let info = jpeg_info(&jpeg_image(40, 30)).unwrap();
        assert_eq!(info.width, 40);
        assert_eq!(info.height, 30);
        assert_eq!(info.components, 3);
    }

    #[test]
    fn test_jpeg_info_rejects_non_jpeg() {
        assert!(jpeg_info(&png_image(2, 2)).is_none());
        assert!(jpeg_info(b"").is_none());
    }

    #[test]
    fn test_jpeg_embedded_verbatim() {
        let jpeg = jpeg_image(16, 8);
        let mut doc = Document::with_version("1.7");
        let embedded = embed_image(&mut doc, &jpeg).unwrap();
        assert_eq!((embedded.width, embedded.height), (16, 8));

        let stream = stream_of(&doc, embedded.id);
        assert_eq!(stream.dict.get(b"Filter").unwrap().as_name().unwrap(), b"DCTDecode");
        assert_eq!(stream.content, jpeg);
    }

    #[test]
    fn test_png_embedded_as_flate_rgb() {
        let mut doc = Document::with_version("1.7");
        let embedded = embed_image(&mut doc, &png_image(5, 4)).unwrap();
        let stream = stream_of(&doc, embedded.id);
        assert_eq!(stream.dict.get(b"Filter").unwrap().as_name().unwrap(), b"FlateDecode");
        assert_eq!(stream.decompressed_content().unwrap().len(), 5 * 4 * 3);
        assert!(stream.dict.get(b"SMask").is_err());
    }

    #[test]
    fn test_alpha_becomes_smask() {
        let mut doc = Document::with_version("1.7");
        let embedded = embed_image(&mut doc, &translucent_png(3, 3)).unwrap();
        let stream = stream_of(&doc, embedded.id);
        let mask_id = stream.dict.get(b"SMask").unwrap().as_reference().unwrap();
        let mask = stream_of(&doc, mask_id);
        assert_eq!(mask.decompressed_content().unwrap(), vec![128u8; 9]);
    }

    #[test]
    fn test_garbage_is_image_error() {
        let mut doc = Document::with_version("1.7");
        assert!(matches!(
            embed_image(&mut doc, b"definitely not an image"),
            Err(ToolError::Image(_))
        ));
    }
}
