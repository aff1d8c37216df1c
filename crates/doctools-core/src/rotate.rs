//! Page rotation
//!
//! Rotations are accumulated per page in a [`RotationMap`] while the user
//! clicks, then added on top of each page's existing `/Rotate` at save time.

use crate::artifact::{Artifact, ROTATED_PDF};
use crate::error::ToolError;
use crate::page_info::{normalize_rotation, page_rotation};
use crate::state::ToolFileState;
use lopdf::{Document, Object};
use std::collections::BTreeMap;

/// Accumulated rotation per 0-based page index, in degrees
///
/// Absent keys mean no rotation. Values are signed and not wrapped, so
/// three `-90` clicks read back as `-270`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RotationMap {
    degrees: BTreeMap<u32, i32>,
}

impl RotationMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rotate_page(&mut self, index: u32, delta: i32) {
        *self.degrees.entry(index).or_insert(0) += delta;
    }

    pub fn rotate_all(&mut self, delta: i32, page_count: u32) {
        for index in 0..page_count {
            self.rotate_page(index, delta);
        }
    }

    pub fn get(&self, index: u32) -> i32 {
        self.degrees.get(&index).copied().unwrap_or(0)
    }

    pub fn reset(&mut self) {
        self.degrees.clear();
    }

    /// True when no page would change orientation
    pub fn is_identity(&self) -> bool {
        self.degrees.values().all(|d| d % 360 == 0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, i32)> + '_ {
        self.degrees.iter().map(|(k, v)| (*k, *v))
    }
}

impl FromIterator<(u32, i32)> for RotationMap {
    fn from_iter<I: IntoIterator<Item = (u32, i32)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (index, delta) in iter {
            map.rotate_page(index, delta);
        }
        map
    }
}

/// Run the rotate tool on its loaded document
pub fn rotate_state(state: &ToolFileState, rotations: &RotationMap) -> Result<Artifact, ToolError> {
    state.require_ready()?;
    let file = state
        .first()
        .ok_or_else(|| ToolError::validation("Please select a PDF file"))?;
    rotate_pdf(&file.bytes, rotations)
}

/// Apply accumulated rotations to a PDF
pub fn rotate_pdf(bytes: &[u8], rotations: &RotationMap) -> Result<Artifact, ToolError> {
    let mut doc = Document::load_mem(bytes).map_err(|e| ToolError::Parse(e.to_string()))?;
    apply_rotations(&mut doc, rotations)?;

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer)
        .map_err(|e| ToolError::Operation(format!("Save failed: {}", e)))?;

    tracing::info!(pages = rotations.iter().count(), size = buffer.len(), "rotated document");
    Ok(Artifact::pdf(ROTATED_PDF, buffer))
}

/// Write `existing + delta` into each page's `/Rotate`
pub fn apply_rotations(doc: &mut Document, rotations: &RotationMap) -> Result<(), ToolError> {
    let pages = doc.get_pages();

    for (index, delta) in rotations.iter() {
        let Some(&page_id) = pages.get(&(index + 1)) else {
            tracing::warn!(index, "rotation for missing page ignored");
            continue;
        };
        if delta == 0 {
            continue;
        }

        let total = normalize_rotation(page_rotation(doc, page_id) + delta);
        let page = doc
            .get_object_mut(page_id)
            .and_then(Object::as_dict_mut)
            .map_err(|e| ToolError::Operation(e.to_string()))?;
        page.set("Rotate", Object::Integer(total as i64));
        tracing::debug!(page = index + 1, rotate = total, "page rotated");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::create_test_pdf;
    use pretty_assertions::assert_eq;

    fn rotations_of(bytes: &[u8]) -> Vec<i32> {
        let doc = Document::load_mem(bytes).unwrap();
        doc.get_pages()
            .values()
            .map(|id| page_rotation(&doc, *id))
            .collect()
    }

    #[test]
    fn test_rotate_all_accumulates() {
        let mut map = RotationMap::new();
        map.rotate_all(90, 3);
        map.rotate_all(90, 3);
        assert_eq!(map.iter().collect::<Vec<_>>(), vec![(0, 180), (1, 180), (2, 180)]);

        map.rotate_page(1, -90);
        assert_eq!(map.iter().collect::<Vec<_>>(), vec![(0, 180), (1, 90), (2, 180)]);
    }

    #[test]
    fn test_negative_rotation_is_unbounded() {
        let mut map = RotationMap::new();
        for _ in 0..3 {
            map.rotate_page(0, -90);
        }
        assert_eq!(map.get(0), -270);
        assert_eq!(map.get(5), 0);
        assert!(!map.is_identity());

        map.rotate_page(0, -90);
        assert!(map.is_identity());
    }

    #[test]
    fn test_rotate_pdf_writes_rotate_entries() {
        let pdf = create_test_pdf(3);
        let mut map = RotationMap::new();
        map.rotate_page(0, 90);
        map.rotate_page(2, -90);

        let artifact = rotate_pdf(&pdf, &map).unwrap();
        assert_eq!(artifact.filename, "rotated.pdf");
        assert_eq!(rotations_of(&artifact.bytes), vec![90, 0, 270]);
    }

    #[test]
    fn test_rotation_adds_to_existing() {
        let pdf = create_test_pdf(1);
        let mut map = RotationMap::new();
        map.rotate_page(0, 90);
        let once = rotate_pdf(&pdf, &map).unwrap();
        let twice = rotate_pdf(&once.bytes, &map).unwrap();
        assert_eq!(rotations_of(&twice.bytes), vec![180]);
    }

    #[test]
    fn test_collect_accumulates_repeated_indexes() {
        let map: RotationMap = vec![(0, 90), (0, 90), (2, -90)].into_iter().collect();
        assert_eq!(map.get(0), 180);
        assert_eq!(map.get(2), -90);
    }

    #[test]
    fn test_rotation_for_missing_page_ignored() {
        let pdf = create_test_pdf(1);
        let mut map = RotationMap::new();
        map.rotate_page(7, 90);
        let artifact = rotate_pdf(&pdf, &map).unwrap();
        assert_eq!(rotations_of(&artifact.bytes), vec![0]);
    }
}
