//! PDF Merge algorithm
//!
//! Combines multiple PDFs into a single document.

use crate::artifact::{Artifact, MERGED_PDF};
use crate::error::ToolError;
use crate::state::ToolFileState;
use lopdf::{Document, Object, ObjectId};

/// Page attributes that may live on an ancestor `/Pages` node
const INHERITABLE: [&[u8]; 4] = [b"MediaBox", b"CropBox", b"Resources", b"Rotate"];

/// Merge the queued files of a merge tool, in list order
pub fn merge_state(state: &ToolFileState) -> Result<Artifact, ToolError> {
    state.require_ready()?;
    let documents = state.items().iter().map(|f| f.bytes.clone()).collect();
    let bytes = merge_documents(documents)?;
    tracing::info!(files = state.len(), size = bytes.len(), "merged documents");
    Ok(Artifact::pdf(MERGED_PDF, bytes))
}

/// Merge multiple PDFs into one
///
/// The algorithm:
/// 1. If empty, return error
/// 2. If single document, return it as-is
/// 3. Use the first document as the destination
/// 4. For each further source document:
///    a. Pin inherited page attributes onto its pages
///    b. Import all objects with IDs offset past the destination's
///    c. Append its pages to the destination page list
/// 5. Rebuild the page tree, drop unreachable objects, compress
pub fn merge_documents(documents: Vec<Vec<u8>>) -> Result<Vec<u8>, ToolError> {
    let mut documents = documents.into_iter();
    let first = documents
        .next()
        .ok_or_else(|| ToolError::validation("No documents to merge"))?;

    let rest: Vec<Vec<u8>> = documents.collect();
    if rest.is_empty() {
        return Ok(first);
    }

    let mut dest = Document::load_mem(&first)
        .map_err(|e| ToolError::Parse(format!("Failed to load document 1: {}", e)))?;
    pin_inherited_attributes(&mut dest);
    let mut dest_page_refs = page_references(&dest);

    for (i, doc_bytes) in rest.iter().enumerate() {
        let mut source = Document::load_mem(doc_bytes)
            .map_err(|e| ToolError::Parse(format!("Failed to load document {}: {}", i + 2, e)))?;
        pin_inherited_attributes(&mut source);

        let source_pages = page_references(&source);

        // Offset object IDs to avoid conflicts
        let id_offset = dest.max_id;
        for (old_id, object) in std::mem::take(&mut source.objects) {
            let new_id = (old_id.0 + id_offset, old_id.1);
            dest.objects.insert(new_id, remap_object_refs(object, id_offset));
        }

        dest_page_refs.extend(source_pages.into_iter().map(|(n, g)| (n + id_offset, g)));
        dest.max_id = dest.max_id.max(source.max_id + id_offset);
    }

    update_page_tree(&mut dest, &dest_page_refs)?;

    // Source catalogs and page trees are now unreachable
    dest.prune_objects();
    dest.compress();

    let mut buffer = Vec::new();
    dest.save_to(&mut buffer)
        .map_err(|e| ToolError::Operation(format!("Failed to save merged PDF: {}", e)))?;

    Ok(buffer)
}

fn page_references(doc: &Document) -> Vec<ObjectId> {
    doc.get_pages().values().copied().collect()
}

/// Copy attributes a page inherits from its ancestors onto the page itself
///
/// Pages get re-parented under one flat tree, which would otherwise lose them.
fn pin_inherited_attributes(doc: &mut Document) {
    for page_id in page_references(doc) {
        let mut pinned = Vec::new();
        for key in INHERITABLE {
            let has_own = doc
                .get_dictionary(page_id)
                .map(|d| d.has(key))
                .unwrap_or(true);
            if has_own {
                continue;
            }
            if let Some(value) = inherited_value(doc, page_id, key) {
                pinned.push((key, value));
            }
        }

        if let Ok(page) = doc.get_object_mut(page_id).and_then(Object::as_dict_mut) {
            for (key, value) in pinned {
                page.set(key, value);
            }
        }
    }
}

fn inherited_value(doc: &Document, page_id: ObjectId, key: &[u8]) -> Option<Object> {
    let mut parent = doc
        .get_dictionary(page_id)
        .and_then(|d| d.get(b"Parent"))
        .and_then(Object::as_reference)
        .ok();

    for _ in 0..32 {
        let dict = doc.get_dictionary(parent?).ok()?;
        if let Ok(value) = dict.get(key) {
            return Some(value.clone());
        }
        parent = dict.get(b"Parent").and_then(Object::as_reference).ok();
    }
    None
}

/// Recursively remap object references in an object
fn remap_object_refs(obj: Object, offset: u32) -> Object {
    match obj {
        Object::Reference(id) => Object::Reference((id.0 + offset, id.1)),
        Object::Array(arr) => Object::Array(
            arr.into_iter()
                .map(|o| remap_object_refs(o, offset))
                .collect(),
        ),
        Object::Dictionary(mut dict) => {
            for (_, value) in dict.iter_mut() {
                *value = remap_object_refs(std::mem::replace(value, Object::Null), offset);
            }
            Object::Dictionary(dict)
        }
        Object::Stream(mut stream) => {
            for (_, value) in stream.dict.iter_mut() {
                *value = remap_object_refs(std::mem::replace(value, Object::Null), offset);
            }
            Object::Stream(stream)
        }
        other => other,
    }
}

/// Point the destination's root `/Pages` at every page, flat
fn update_page_tree(doc: &mut Document, page_refs: &[ObjectId]) -> Result<(), ToolError> {
    let catalog = doc
        .catalog()
        .map_err(|_| ToolError::Operation("Catalog not found".into()))?;

    let pages_id = catalog
        .get(b"Pages")
        .and_then(Object::as_reference)
        .map_err(|_| ToolError::Operation("No Pages in catalog".into()))?;

    for &page_id in page_refs {
        if let Ok(page) = doc.get_object_mut(page_id).and_then(Object::as_dict_mut) {
            page.set("Parent", Object::Reference(pages_id));
        }
    }

    match doc.objects.get_mut(&pages_id) {
        Some(Object::Dictionary(pages_dict)) => {
            let kids = page_refs.iter().map(|&id| Object::Reference(id)).collect();
            pages_dict.set("Kids", Object::Array(kids));
            pages_dict.set("Count", Object::Integer(page_refs.len() as i64));
            Ok(())
        }
        _ => Err(ToolError::Operation("Invalid pages dictionary".into())),
    }
}
