use thiserror::Error;

#[derive(Error, Debug)]
pub enum ToolError {
    /// Rejected user input; nothing was mutated.
    #[error("{0}")]
    Validation(String),

    #[error("Failed to parse PDF: {0}")]
    Parse(String),

    #[error("Image processing failed: {0}")]
    Image(String),

    #[error("PDF operation failed: {0}")]
    Operation(String),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ToolError {
    pub fn validation(msg: impl Into<String>) -> Self {
        ToolError::Validation(msg.into())
    }

    /// True for input problems the user can fix (as opposed to service failures)
    pub fn is_validation(&self) -> bool {
        matches!(self, ToolError::Validation(_))
    }
}

impl From<image::ImageError> for ToolError {
    fn from(e: image::ImageError) -> Self {
        ToolError::Image(e.to_string())
    }
}

impl From<zip::result::ZipError> for ToolError {
    fn from(e: zip::result::ZipError) -> Self {
        ToolError::Archive(e.to_string())
    }
}
