//! Output artifacts and their fixed download names

use serde::Serialize;

pub const IMAGES_CONVERTED_PDF: &str = "images-converted.pdf";
pub const IMAGES_TO_PDF_PDF: &str = "images-to-pdf.pdf";
pub const MERGED_PDF: &str = "merged-document.pdf";
pub const EXTRACTED_PDF: &str = "extracted-pages.pdf";
pub const SPLIT_ZIP: &str = "split-pages.zip";
pub const PDF_IMAGES_ZIP: &str = "pdf-images.zip";
pub const COMPRESSED_PDF: &str = "compressed.pdf";
pub const ROTATED_PDF: &str = "rotated.pdf";
pub const WATERMARKED_PDF: &str = "watermarked.pdf";
pub const ID_CARDS_PDF: &str = "id-cards.pdf";

/// A single downloadable file produced by one tool invocation
#[derive(Debug, Clone, Serialize)]
pub struct Artifact {
    pub filename: String,
    pub mime_type: String,
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

impl Artifact {
    pub fn pdf(filename: &str, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.to_string(),
            mime_type: "application/pdf".to_string(),
            bytes,
        }
    }

    pub fn zip(filename: &str, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.to_string(),
            mime_type: "application/zip".to_string(),
            bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Format bytes as human-readable string
pub fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;

    if bytes < KB {
        format!("{} B", bytes)
    } else if bytes < MB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(500), "500 B");
        assert_eq!(format_bytes(1024), "1.0 KB");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(2621440), "2.5 MB");
    }

    #[test]
    fn test_artifact_mime_types() {
        assert_eq!(Artifact::pdf(MERGED_PDF, vec![]).mime_type, "application/pdf");
        assert_eq!(Artifact::zip(SPLIT_ZIP, vec![1]).mime_type, "application/zip");
    }
}
