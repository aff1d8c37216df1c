//! Browser glue: file reading, control state, downloads, alerts

use doctools_core::{PendingFile, ToolError};
use js_sys::{Array, Uint8Array};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;
use web_sys::{Blob, BlobPropertyBag, File, HtmlAnchorElement, HtmlButtonElement, Url};

/// Object URLs stay valid this long after the click so the download can start
const REVOKE_DELAY_MS: i32 = 1_000;

/// A browser `File` read to completion
#[wasm_bindgen]
pub struct LoadedFile {
    file: PendingFile,
}

#[wasm_bindgen]
impl LoadedFile {
    #[wasm_bindgen(getter)]
    pub fn name(&self) -> String {
        self.file.name.clone()
    }

    #[wasm_bindgen(getter)]
    pub fn size(&self) -> usize {
        self.file.size()
    }
}

impl LoadedFile {
    pub fn into_pending(self) -> PendingFile {
        self.file
    }
}

/// Read a picked file; the session decides whether to admit it
#[wasm_bindgen(js_name = readFile)]
pub async fn read_file(file: File) -> Result<LoadedFile, JsValue> {
    let buffer = JsFuture::from(file.array_buffer()).await?;
    let bytes = Uint8Array::new(&buffer).to_vec();
    Ok(LoadedFile {
        file: PendingFile::new(file.name(), file.type_(), bytes),
    })
}

fn document() -> Result<web_sys::Document, JsValue> {
    web_sys::window()
        .and_then(|w| w.document())
        .ok_or_else(|| JsValue::from_str("No document available"))
}

/// Mirror a session's primary-action flag onto its button
#[wasm_bindgen(js_name = setActionEnabled)]
pub fn set_action_enabled(button_id: &str, enabled: bool) -> Result<(), JsValue> {
    let button: HtmlButtonElement = document()?
        .get_element_by_id(button_id)
        .ok_or_else(|| JsValue::from_str(&format!("No element #{}", button_id)))?
        .dyn_into()
        .map_err(|_| JsValue::from_str(&format!("#{} is not a button", button_id)))?;
    button.set_disabled(!enabled);
    Ok(())
}

/// Save bytes through a temporary object URL
pub fn save_bytes(filename: &str, mime_type: &str, bytes: &[u8]) -> Result<(), JsValue> {
    let parts = Array::of1(&Uint8Array::from(bytes));
    let options = BlobPropertyBag::new();
    options.set_type(mime_type);
    let blob = Blob::new_with_u8_array_sequence_and_options(&parts, &options)?;
    let url = Url::create_object_url_with_blob(&blob)?;

    let anchor: HtmlAnchorElement = document()?
        .create_element("a")?
        .dyn_into()
        .map_err(|_| JsValue::from_str("Failed to create link"))?;
    anchor.set_href(&url);
    anchor.set_download(filename);
    anchor.click();

    revoke_later(url, REVOKE_DELAY_MS)
}

fn revoke_later(url: String, delay_ms: i32) -> Result<(), JsValue> {
    let window = web_sys::window().ok_or_else(|| JsValue::from_str("No window available"))?;
    let revoke = Closure::once_into_js(move || {
        let _ = Url::revoke_object_url(&url);
    });
    window.set_timeout_with_callback_and_timeout_and_arguments_0(revoke.unchecked_ref(), delay_ms)?;
    Ok(())
}

/// Blocking alert with the failure; service failures also go to the console
pub fn report_failure(error: &ToolError) {
    let message = error.to_string();
    if !error.is_validation() {
        web_sys::console::error_1(&JsValue::from_str(&message));
    }
    if let Some(window) = web_sys::window() {
        let _ = window.alert_with_message(&message);
    }
}

#[cfg(target_arch = "wasm32")]
mod wasm_tests {
    use super::*;
    use wasm_bindgen_test::*;

    wasm_bindgen_test_configure!(run_in_browser);

    async fn sleep(ms: i32) {
        let promise = js_sys::Promise::new(&mut |resolve, _| {
            web_sys::window()
                .unwrap()
                .set_timeout_with_callback_and_timeout_and_arguments_0(&resolve, ms)
                .unwrap();
        });
        JsFuture::from(promise).await.unwrap();
    }

    async fn fetches(url: &str) -> bool {
        let window = web_sys::window().unwrap();
        JsFuture::from(window.fetch_with_str(url)).await.is_ok()
    }

    #[wasm_bindgen_test]
    async fn test_object_url_outlives_the_click() {
        let parts = Array::of1(&Uint8Array::from(&b"%PDF-1.7"[..]));
        let blob = Blob::new_with_u8_array_sequence(&parts).unwrap();
        let url = Url::create_object_url_with_blob(&blob).unwrap();

        revoke_later(url.clone(), 50).unwrap();
        assert!(fetches(&url).await);

        sleep(100).await;
        assert!(!fetches(&url).await);
    }

    #[wasm_bindgen_test]
    fn test_save_bytes_does_not_fail() {
        save_bytes("merged-document.pdf", "application/pdf", b"%PDF-1.7").unwrap();
    }
}
