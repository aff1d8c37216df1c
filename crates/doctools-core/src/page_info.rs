//! Page-level geometry
//!
//! Reads page size and rotation, following page-tree inheritance.

use crate::error::ToolError;
use lopdf::{Dictionary, Document, Object, ObjectId};
use serde::Serialize;

/// US Letter, used when a page carries no MediaBox anywhere in its tree
const DEFAULT_MEDIA_BOX: [f64; 4] = [0.0, 0.0, 612.0, 792.0];

/// Information about a single PDF page
#[derive(Debug, Clone, Serialize)]
pub struct PageInfo {
    /// Page number (1-indexed)
    pub page_num: u32,
    /// Page width in points (1 point = 1/72 inch)
    pub width: f32,
    /// Page height in points
    pub height: f32,
    /// Page rotation in degrees (0, 90, 180, 270)
    pub rotation: i32,
    /// Orientation as displayed, i.e. after rotation
    pub orientation: Orientation,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum Orientation {
    Portrait,
    Landscape,
    Square,
}

impl Orientation {
    pub fn of(width: f64, height: f64) -> Self {
        if (width - height).abs() < 1.0 {
            Orientation::Square
        } else if width > height {
            Orientation::Landscape
        } else {
            Orientation::Portrait
        }
    }
}

impl PageInfo {
    pub fn from_document(doc: &Document, page_num: u32) -> Result<Self, ToolError> {
        let pages = doc.get_pages();
        let page_id = pages
            .get(&page_num)
            .ok_or_else(|| ToolError::Operation(format!("Page {} not found", page_num)))?;

        let media_box = media_box(doc, *page_id)?;
        let (width, height) = (media_box[2] - media_box[0], media_box[3] - media_box[1]);
        let rotation = normalize_rotation(page_rotation(doc, *page_id));

        let (shown_w, shown_h) = if rotation == 90 || rotation == 270 {
            (height, width)
        } else {
            (width, height)
        };

        Ok(Self {
            page_num,
            width: width as f32,
            height: height as f32,
            rotation,
            orientation: Orientation::of(shown_w, shown_h),
        })
    }

    pub fn all_from_document(doc: &Document) -> Result<Vec<Self>, ToolError> {
        (1..=doc.get_pages().len() as u32)
            .map(|n| Self::from_document(doc, n))
            .collect()
    }
}

/// Look up an attribute on a page, walking up `/Parent` links
fn inherited<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut current = doc.get_dictionary(page_id).ok();
    // Bounded walk; malformed trees can contain parent cycles
    for _ in 0..32 {
        let dict = current?;
        if let Ok(value) = dict.get(key) {
            return Some(resolve(doc, value));
        }
        current = dict
            .get(b"Parent")
            .and_then(Object::as_reference)
            .and_then(|id| doc.get_dictionary(id))
            .ok();
    }
    None
}

pub(crate) fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        other => other,
    }
}

/// MediaBox of a page, inheriting from ancestors and defaulting to Letter
pub fn media_box(doc: &Document, page_id: ObjectId) -> Result<[f64; 4], ToolError> {
    match inherited(doc, page_id, b"MediaBox") {
        Some(Object::Array(array)) => parse_box_array(array),
        _ => Ok(DEFAULT_MEDIA_BOX),
    }
}

/// Raw `/Rotate` value of a page (inherited), 0 when absent
pub fn page_rotation(doc: &Document, page_id: ObjectId) -> i32 {
    inherited(doc, page_id, b"Rotate")
        .and_then(|obj| obj.as_i64().ok())
        .map(|angle| angle as i32)
        .unwrap_or(0)
}

pub(crate) fn number(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(n) => Some(*n as f64),
        Object::Real(n) => Some(*n as f64),
        _ => None,
    }
}

/// Parse a box array [x1, y1, x2, y2]
fn parse_box_array(array: &[Object]) -> Result<[f64; 4], ToolError> {
    if array.len() != 4 {
        return Err(ToolError::Parse("MediaBox must have 4 elements".into()));
    }

    let mut result = [0.0; 4];
    for (i, obj) in array.iter().enumerate() {
        result[i] = number(obj).ok_or_else(|| {
            ToolError::Parse(format!("MediaBox element {} is not a number", i))
        })?;
    }

    Ok(result)
}

/// Normalize rotation to 0, 90, 180, or 270
pub fn normalize_rotation(angle: i32) -> i32 {
    angle.rem_euclid(360)
}

/// Resources dictionary of a page, resolved and copied inline onto the page
///
/// Shared or inherited resources are cloned so edits stay local to the page.
pub(crate) fn page_resources_mut(
    doc: &mut Document,
    page_id: ObjectId,
) -> Result<&mut Dictionary, ToolError> {
    let mut resources = match inherited(doc, page_id, b"Resources") {
        Some(Object::Dictionary(dict)) => dict.clone(),
        _ => Dictionary::new(),
    };

    // Resolve referenced sub-dictionaries so they can be extended in place
    for key in [&b"Font"[..], &b"XObject"[..], &b"ExtGState"[..]] {
        let referenced = match resources.get(key) {
            Ok(Object::Reference(id)) => Some(*id),
            _ => None,
        };
        if let Some(id) = referenced {
            let resolved = doc
                .get_dictionary(id)
                .cloned()
                .unwrap_or_else(|_| Dictionary::new());
            resources.set(key, Object::Dictionary(resolved));
        }
    }

    let page = doc
        .get_object_mut(page_id)
        .and_then(Object::as_dict_mut)
        .map_err(|e| ToolError::Operation(e.to_string()))?;
    page.set("Resources", Object::Dictionary(resources));

    match page.get_mut(b"Resources") {
        Ok(Object::Dictionary(dict)) => Ok(dict),
        _ => Err(ToolError::Operation("Page resources unavailable".into())),
    }
}

/// Append a content stream to a page, after whatever it already draws
///
/// Existing content is wrapped in `q`/`Q` so a graphics state it leaves
/// behind (an unbalanced `cm`, a clip) cannot leak into the new stream.
pub(crate) fn append_content(
    doc: &mut Document,
    page_id: ObjectId,
    content: Vec<u8>,
) -> Result<(), ToolError> {
    let existing = match doc.get_dictionary(page_id).map(|page| page.get(b"Contents")) {
        Ok(Ok(Object::Array(items))) => items.clone(),
        Ok(Ok(item @ Object::Reference(_))) => vec![item.clone()],
        Ok(_) => Vec::new(),
        Err(e) => return Err(ToolError::Operation(e.to_string())),
    };

    let contents = if existing.is_empty() {
        let stream_id = doc.add_object(lopdf::Stream::new(Dictionary::new(), content));
        vec![Object::Reference(stream_id)]
    } else {
        let save_id = doc.add_object(lopdf::Stream::new(Dictionary::new(), b"q\n".to_vec()));
        let mut restored = b"Q\n".to_vec();
        restored.extend_from_slice(&content);
        let stream_id = doc.add_object(lopdf::Stream::new(Dictionary::new(), restored));

        let mut contents = Vec::with_capacity(existing.len() + 2);
        contents.push(Object::Reference(save_id));
        contents.extend(existing);
        contents.push(Object::Reference(stream_id));
        contents
    };

    let page = doc
        .get_object_mut(page_id)
        .and_then(Object::as_dict_mut)
        .map_err(|e| ToolError::Operation(e.to_string()))?;
    page.set("Contents", Object::Array(contents));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::create_test_pdf;

    #[test]
    fn test_normalize_rotation() {
        assert_eq!(normalize_rotation(0), 0);
        assert_eq!(normalize_rotation(90), 90);
        assert_eq!(normalize_rotation(360), 0);
        assert_eq!(normalize_rotation(450), 90);
        assert_eq!(normalize_rotation(-90), 270);
        assert_eq!(normalize_rotation(-450), 270);
    }

    #[test]
    fn test_parse_box_array() {
        let array = vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Real(612.0),
            Object::Real(792.0),
        ];
        assert_eq!(parse_box_array(&array).unwrap(), [0.0, 0.0, 612.0, 792.0]);
        assert!(parse_box_array(&array[..3]).is_err());
    }

    #[test]
    fn test_page_info_reads_letter_portrait() {
        let doc = Document::load_mem(&create_test_pdf(2)).unwrap();
        let infos = PageInfo::all_from_document(&doc).unwrap();
        assert_eq!(infos.len(), 2);
        assert_eq!(infos[0].width, 612.0);
        assert_eq!(infos[0].orientation, Orientation::Portrait);
        assert_eq!(infos[1].rotation, 0);
    }

    #[test]
    fn test_rotation_flips_orientation() {
        let mut doc = Document::load_mem(&create_test_pdf(1)).unwrap();
        let page_id = doc.get_pages()[&1];
        doc.get_object_mut(page_id)
            .and_then(Object::as_dict_mut)
            .unwrap()
            .set("Rotate", Object::Integer(90));
        let info = PageInfo::from_document(&doc, 1).unwrap();
        assert_eq!(info.rotation, 90);
        assert_eq!(info.orientation, Orientation::Landscape);
    }

    #[test]
    fn test_append_content_isolates_existing_stream() {
        let mut doc = Document::load_mem(&create_test_pdf(1)).unwrap();
        let page_id = doc.get_pages()[&1];
        let original = doc.get_dictionary(page_id).unwrap().get(b"Contents").unwrap().clone();

        append_content(&mut doc, page_id, b"0 0 m".to_vec()).unwrap();

        let page = doc.get_dictionary(page_id).unwrap();
        let contents = page.get(b"Contents").unwrap().as_array().unwrap().clone();
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[1], original);

        let stream_bytes = |object: &Object| {
            let id = object.as_reference().unwrap();
            doc.get_object(id).unwrap().as_stream().unwrap().content.clone()
        };
        assert_eq!(stream_bytes(&contents[0]), b"q\n".to_vec());
        assert_eq!(stream_bytes(&contents[2]), b"Q\n0 0 m".to_vec());
    }

    #[test]
    fn test_append_content_to_blank_page() {
        let mut doc = Document::load_mem(&create_test_pdf(1)).unwrap();
        let page_id = doc.get_pages()[&1];
        doc.get_object_mut(page_id)
            .and_then(Object::as_dict_mut)
            .unwrap()
            .remove(b"Contents");

        append_content(&mut doc, page_id, b"0 0 m".to_vec()).unwrap();

        let page = doc.get_dictionary(page_id).unwrap();
        let contents = page.get(b"Contents").unwrap().as_array().unwrap();
        assert_eq!(contents.len(), 1);
    }
}
