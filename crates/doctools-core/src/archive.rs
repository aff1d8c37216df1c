//! ZIP packaging for multi-file outputs

use crate::error::ToolError;
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Build a ZIP archive from `(entry name, contents)` pairs, in order
pub fn build_zip<I, S>(entries: I) -> Result<Vec<u8>, ToolError>
where
    I: IntoIterator<Item = (S, Vec<u8>)>,
    S: Into<String>,
{
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for (name, contents) in entries {
        writer.start_file(name.into(), options)?;
        writer
            .write_all(&contents)
            .map_err(|e| ToolError::Archive(e.to_string()))?;
    }

    Ok(writer.finish()?.into_inner())
}
