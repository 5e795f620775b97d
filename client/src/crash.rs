//! Panic capture and the safe-mode overlay shown on the next start.

use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{Document, Event, HtmlButtonElement, HtmlElement};

use tabletop_shared::persist::{CAMPAIGNS_STORAGE_KEY, SCENE_STORAGE_KEY, UI_STORAGE_KEY};

const PANIC_INFO_KEY: &str = "tabletop-panic";

fn storage() -> Option<web_sys::Storage> {
    web_sys::window()?.local_storage().ok()?
}

/// Forwards panics to the console and keeps the message for the next load.
pub fn set_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        console_error_panic_hook::hook(info);
        let location = info
            .location()
            .map(|loc| format!("{}:{}:{}", loc.file(), loc.line(), loc.column()))
            .unwrap_or_else(|| "unknown location".to_string());
        let panic_info = format!("{info}\n\nLocation: {location}");
        if let Some(storage) = storage() {
            let _ = storage.set_item(PANIC_INFO_KEY, &panic_info);
        }
        if let Some(document) = web_sys::window().and_then(|window| window.document()) {
            let _ = show_safe_mode(&document, &panic_info);
        }
    }));
}

pub fn take_panic_info() -> Option<String> {
    let storage = storage()?;
    let info = storage.get_item(PANIC_INFO_KEY).ok()??;
    let _ = storage.remove_item(PANIC_INFO_KEY);
    Some(info)
}

fn clear_persisted_state() {
    if let Some(storage) = storage() {
        for key in [
            SCENE_STORAGE_KEY,
            UI_STORAGE_KEY,
            CAMPAIGNS_STORAGE_KEY,
            PANIC_INFO_KEY,
        ] {
            let _ = storage.remove_item(key);
        }
    }
}

/// Covers the page with the crash report and a reset button.
pub fn show_safe_mode(document: &Document, message: &str) -> Result<(), JsValue> {
    if document.get_element_by_id("safeMode").is_some() {
        return Ok(());
    }
    let body = document
        .body()
        .ok_or_else(|| JsValue::from_str("Missing body"))?;
    let overlay: HtmlElement = document.create_element("div")?.dyn_into()?;
    overlay.set_id("safeMode");
    overlay.set_class_name("safe-mode");

    let title = document.create_element("h2")?;
    title.set_text_content(Some("The table crashed"));
    let details = document.create_element("pre")?;
    details.set_text_content(Some(message));
    let reset: HtmlButtonElement = document.create_element("button")?.dyn_into()?;
    reset.set_type("button");
    reset.set_text_content(Some("Clear saved state and reload"));

    let onclick = Closure::<dyn FnMut(Event)>::new(move |_| {
        clear_persisted_state();
        if let Some(window) = web_sys::window() {
            let _ = window.location().reload();
        }
    });
    reset.add_event_listener_with_callback("click", onclick.as_ref().unchecked_ref())?;
    onclick.forget();

    overlay.append_child(&title)?;
    overlay.append_child(&details)?;
    overlay.append_child(&reset)?;
    body.append_child(&overlay)?;
    Ok(())
}
