//! WASM bindings for the document tools
//!
//! Each tool page holds one [`ToolSession`]; all state lives in Rust and
//! JavaScript only wires DOM events to it.
//!
//! ## Usage (JavaScript)
//!
//! ```javascript
//! import init, { ToolSession, Tool, readFile, setActionEnabled } from './pkg/doctools_wasm.js';
//!
//! await init();
//!
//! const session = new ToolSession(Tool.Merge);
//! for (const file of input.files) {
//!     try {
//!         setActionEnabled('mergeBtn', session.addFile(await readFile(file)));
//!     } catch (msg) {
//!         alert(msg);
//!     }
//! }
//! mergeBtn.onclick = () => session.execute().download(); // merged-document.pdf
//! ```

pub mod dom;
pub mod pages;
pub mod session;

use wasm_bindgen::prelude::*;

pub use dom::{read_file, set_action_enabled, LoadedFile};
pub use session::{Tool, ToolOutput, ToolSession};

#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
}

#[wasm_bindgen]
pub fn get_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// Run a JSON command (see `doctools_core::command`) and return the result object
#[wasm_bindgen(js_name = runCommand)]
pub fn run_command(json: &str) -> Result<JsValue, JsValue> {
    let result = doctools_core::execute_json(json);
    if let Some(error) = result.error.as_deref().filter(|_| !result.user_error) {
        web_sys::console::error_1(&JsValue::from_str(error));
    }
    serde_wasm_bindgen::to_value(&result)
        .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
}

/// Header and trailer check for a picked PDF
#[wasm_bindgen]
pub fn quick_validate(bytes: &[u8]) -> Result<(), JsValue> {
    doctools_core::quick_validate(bytes).map_err(|e| JsValue::from_str(&e.to_string()))
}

#[wasm_bindgen]
pub fn get_pdf_info(bytes: &[u8]) -> Result<JsValue, JsValue> {
    let info = doctools_core::validate_pdf(bytes).map_err(|e| JsValue::from_str(&e.to_string()))?;
    serde_wasm_bindgen::to_value(&info)
        .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
}

/// Pages a range expression selects; malformed tokens are dropped
#[wasm_bindgen(js_name = parsePageRange)]
pub fn parse_page_range(expression: &str, total_pages: u32) -> Vec<u32> {
    doctools_core::parse_page_range(expression, total_pages)
}

#[wasm_bindgen]
pub fn format_bytes(bytes: usize) -> String {
    doctools_core::format_bytes(bytes)
}
