use serde_json::Value;
use tracing::warn;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{Blob, BlobPropertyBag, Document, HtmlAnchorElement, Storage, Url, Window};

use tabletop_shared::persist::{
    load_campaigns, load_scene, load_ui, parse_json, save_campaigns, save_scene, save_ui, Export,
    CAMPAIGNS_STORAGE_KEY, SCENE_STORAGE_KEY, UI_STORAGE_KEY,
};
use tabletop_shared::{CampaignStore, ImportError, Scene, UiPreferences};

use crate::state::AppState;

fn storage(window: &Window) -> Option<Storage> {
    window.local_storage().ok()?
}

fn read_item(storage: Option<&Storage>, key: &str) -> Option<String> {
    storage?.get_item(key).ok()?
}

pub struct Restored {
    pub scene: Scene,
    pub prefs: UiPreferences,
    pub campaigns: CampaignStore,
}

pub fn restore(window: &Window) -> Restored {
    let storage = storage(window);
    Restored {
        scene: load_scene(read_item(storage.as_ref(), SCENE_STORAGE_KEY).as_deref()),
        prefs: load_ui(read_item(storage.as_ref(), UI_STORAGE_KEY).as_deref()),
        campaigns: load_campaigns(read_item(storage.as_ref(), CAMPAIGNS_STORAGE_KEY).as_deref()),
    }
}

pub fn persist(state: &AppState) {
    let Some(storage) = storage(&state.window) else {
        return;
    };
    let items = [
        (SCENE_STORAGE_KEY, save_scene(state.scene.scene())),
        (UI_STORAGE_KEY, save_ui(&state.ui.prefs)),
        (CAMPAIGNS_STORAGE_KEY, save_campaigns(&state.campaigns)),
    ];
    for (key, value) in items {
        if let Err(err) = storage.set_item(key, &value) {
            warn!(key, ?err, "could not persist state");
        }
    }
}

/// Reads an imported document. Besides plain JSON this accepts `data:` URLs
/// (base64 or percent-encoded) and percent-encoded JSON.
pub fn parse_import_text(window: &Window, text: &str) -> Result<Value, ImportError> {
    let first = match parse_json(text) {
        Ok(value) => return Ok(value),
        Err(err) => err,
    };
    let trimmed = text.trim();
    if let Some((header, payload)) = extract_data_url(trimmed) {
        let decoded = if header.ends_with(";base64") {
            window.atob(payload).ok()
        } else {
            decode_uri_string(payload)
        };
        if let Some(value) = decoded.and_then(|decoded| parse_json(&decoded).ok()) {
            return Ok(value);
        }
    }
    if let Some(value) = decode_uri_string(trimmed).and_then(|decoded| parse_json(&decoded).ok()) {
        return Ok(value);
    }
    Err(first)
}

fn extract_data_url(text: &str) -> Option<(&str, &str)> {
    let rest = text.strip_prefix("data:")?;
    rest.split_once(',')
}

fn decode_uri_string(text: &str) -> Option<String> {
    js_sys::decode_uri_component(text)
        .ok()
        .and_then(|value| value.as_string())
}

pub fn download(document: &Document, export: &Export) -> Result<(), JsValue> {
    let options = BlobPropertyBag::new();
    options.set_type("application/json");
    let parts = js_sys::Array::of1(&JsValue::from_str(&export.json));
    let blob = Blob::new_with_str_sequence_and_options(&parts, &options)?;
    let url = Url::create_object_url_with_blob(&blob)?;
    let anchor: HtmlAnchorElement = document.create_element("a")?.dyn_into()?;
    anchor.set_href(&url);
    anchor.set_download(&export.filename);
    anchor.click();
    Url::revoke_object_url(&url)?;
    Ok(())
}
