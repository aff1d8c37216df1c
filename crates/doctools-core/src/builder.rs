//! Assembly of new PDF documents from image placements

use crate::error::ToolError;
use crate::images::{embed_image, EmbeddedImage};
use crate::layout::Rect;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

/// One image drawn on a page
#[derive(Debug, Clone, Copy)]
pub struct Placement {
    pub image: EmbeddedImage,
    pub rect: Rect,
}

/// Builds a fresh document page by page
pub struct DocumentBuilder {
    doc: Document,
    pages_id: ObjectId,
    page_ids: Vec<ObjectId>,
}

impl Default for DocumentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentBuilder {
    pub fn new() -> Self {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();
        Self {
            doc,
            pages_id,
            page_ids: Vec::new(),
        }
    }

    /// Embed image bytes once; the result can be placed on many pages
    pub fn add_image(&mut self, bytes: &[u8]) -> Result<EmbeddedImage, ToolError> {
        embed_image(&mut self.doc, bytes)
    }

    /// Append a page of the given size drawing each placement in order
    pub fn add_page(
        &mut self,
        width: f64,
        height: f64,
        placements: &[Placement],
    ) -> Result<ObjectId, ToolError> {
        self.add_page_with(width, height, placements, Vec::new())
    }

    /// Like [`add_page`](Self::add_page), then draws `overlay` on top
    pub fn add_page_with(
        &mut self,
        width: f64,
        height: f64,
        placements: &[Placement],
        overlay: Vec<Operation>,
    ) -> Result<ObjectId, ToolError> {
        let mut xobjects = Dictionary::new();
        let mut operations = Vec::with_capacity(placements.len() * 4 + overlay.len());

        for (i, placement) in placements.iter().enumerate() {
            let name = format!("Im{}", i + 1);
            xobjects.set(name.as_bytes(), Object::Reference(placement.image.id));
            operations.extend(draw_image_ops(&name, placement.rect));
        }
        operations.extend(overlay);

        let content = Content { operations }
            .encode()
            .map_err(|e| ToolError::Operation(format!("Failed to encode page content: {}", e)))?;
        let content_id = self.doc.add_object(Stream::new(Dictionary::new(), content));

        let mut resources = Dictionary::new();
        resources.set("XObject", Object::Dictionary(xobjects));

        let page = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Page".to_vec())),
            ("Parent", Object::Reference(self.pages_id)),
            (
                "MediaBox",
                Object::Array(vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Real(width as f32),
                    Object::Real(height as f32),
                ]),
            ),
            ("Resources", Object::Dictionary(resources)),
            ("Contents", Object::Reference(content_id)),
        ]);
        let page_id = self.doc.add_object(page);
        self.page_ids.push(page_id);
        Ok(page_id)
    }

    pub fn page_count(&self) -> usize {
        self.page_ids.len()
    }

    /// Write the page tree and catalog, then serialize
    pub fn finish(mut self) -> Result<Vec<u8>, ToolError> {
        let pages = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Pages".to_vec())),
            ("Count", Object::Integer(self.page_ids.len() as i64)),
            (
                "Kids",
                Object::Array(self.page_ids.iter().map(|id| Object::Reference(*id)).collect()),
            ),
        ]);
        self.doc.objects.insert(self.pages_id, Object::Dictionary(pages));

        let catalog = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Catalog".to_vec())),
            ("Pages", Object::Reference(self.pages_id)),
        ]);
        let catalog_id = self.doc.add_object(catalog);
        self.doc.trailer.set("Root", Object::Reference(catalog_id));
        self.doc.compress();

        let mut buffer = Vec::new();
        self.doc
            .save_to(&mut buffer)
            .map_err(|e| ToolError::Operation(format!("Save failed: {}", e)))?;
        Ok(buffer)
    }
}

/// `q w 0 0 h x y cm /Name Do Q`
pub(crate) fn draw_image_ops(name: &str, rect: Rect) -> Vec<Operation> {
    vec![
        Operation::new("q", vec![]),
        Operation::new(
            "cm",
            vec![
                Object::Real(rect.width as f32),
                Object::Integer(0),
                Object::Integer(0),
                Object::Real(rect.height as f32),
                Object::Real(rect.x as f32),
                Object::Real(rect.y as f32),
            ],
        ),
        Operation::new("Do", vec![Object::Name(name.as_bytes().to_vec())]),
        Operation::new("Q", vec![]),
    ]
}
