use std::cell::RefCell;
use std::rc::Rc;

use tracing::{debug, info, trace, warn};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;

use tabletop_shared::geometry::ScreenPoint;
use tabletop_shared::graph::{
    apply_scene_to_graph, fit_map_transform, home_view, GraphSync, MAX_VIEW_ZOOM, MIN_VIEW_ZOOM,
    WHEEL_ZOOM_IN, WHEEL_ZOOM_OUT,
};
use tabletop_shared::keys::Shortcut;
use tabletop_shared::store::SidebarTab;
use tabletop_shared::textures::{token_from_image, TextureKind};
use tabletop_shared::{FitMode, MapTransformPatch};

use crate::dom::sync_controls;
use crate::persistence::{download, parse_import_text, persist};
use crate::render::redraw;
use crate::state::{AppState, Drag, TOAST_MS};
use crate::textures::request_texture;

/// Mirrors the stores into the graph, saves and redraws. Returns the images
/// the graph is still missing.
pub fn sync(state: &mut AppState) -> Vec<(String, TextureKind)> {
    let changes = apply_scene_to_graph(state.scene.scene(), &mut state.graph, &state.textures);
    if changes != GraphSync::default() {
        trace!(?changes, "graph synced");
    }
    state.ui.prune_selection(state.scene.scene());

    let scene = state.scene.scene();
    let mut wanted = Vec::new();
    if state.textures.needs_load(&scene.map_url) {
        wanted.push((scene.map_url.clone(), TextureKind::Map));
    }
    for token in &scene.tokens {
        let pending = wanted.iter().any(|(url, _)| *url == token.image);
        if !pending && state.textures.needs_load(&token.image) {
            wanted.push((token.image.clone(), TextureKind::Token));
        }
    }

    let dragging = state.controller.is_active() || matches!(state.drag, Drag::Pan(_));
    if !dragging {
        persist(state);
    }
    sync_controls(state);
    redraw(state);
    wanted
}

pub fn refresh(app: &Rc<RefCell<AppState>>) {
    let (wanted, toast_pending) = {
        let mut state = app.borrow_mut();
        let wanted = sync(&mut state);
        let toast_pending = match state.toast.as_mut() {
            Some(toast) if !toast.expiry_scheduled => {
                toast.expiry_scheduled = true;
                true
            }
            _ => false,
        };
        (wanted, toast_pending)
    };
    if toast_pending {
        schedule_toast_expiry(app);
    }
    for (url, kind) in wanted {
        request_texture(app, &url, kind);
    }
}

/// Redraws once the current toast has expired.
fn schedule_toast_expiry(app: &Rc<RefCell<AppState>>) {
    let window = app.borrow().window.clone();
    let app = app.clone();
    let callback = Closure::once_into_js(move || {
        redraw(&app.borrow());
    });
    let _ = window.set_timeout_with_callback_and_timeout_and_arguments_0(
        callback.unchecked_ref(),
        TOAST_MS as i32 + 50,
    );
}

pub fn fit_map(state: &mut AppState, mode: FitMode) {
    state.scene.set_fit_mode(mode);
    let Some(image) = state.graph.map_image else {
        debug!(?mode, "fit requested before the map size is known");
        return;
    };
    let fitted = fit_map_transform(mode, image, state.graph.viewport, &state.graph.camera);
    state.scene.set_map_transform(&MapTransformPatch::from(fitted));
}

pub fn go_home(state: &mut AppState) {
    let (pan, zoom) = home_view(
        state.graph.map_image,
        state.graph.viewport,
        state.scene.scene().map_scale,
    );
    state.scene.set_pan_zoom(Some(pan), Some(zoom));
}

pub fn zoom_at(state: &mut AppState, anchor: ScreenPoint, delta_y: f64) {
    let factor = if delta_y < 0.0 {
        WHEEL_ZOOM_IN
    } else {
        WHEEL_ZOOM_OUT
    };
    let camera = state
        .graph
        .camera
        .zoom_at(anchor, factor, MIN_VIEW_ZOOM, MAX_VIEW_ZOOM);
    state.scene.set_pan_zoom(Some(camera.pan), Some(camera.zoom));
}

/// Adds a dropped image as a token one grid cell wide and selects it.
pub fn add_image_token(state: &mut AppState, file_name: &str, image_url: &str) -> String {
    let grid_size = state.scene.scene().grid.size;
    let id = state
        .scene
        .add_token(&token_from_image(file_name, image_url, grid_size));
    state.ui.set_selected_token(Some(id.clone()));
    info!(token = %id, file = file_name, "token added from image");
    id
}

pub fn export_scene(state: &AppState) {
    let export = state.scene.export_scene();
    if let Err(err) = download(&state.document, &export) {
        warn!(?err, "scene download failed");
    }
}

pub fn export_active_campaign(state: &AppState) {
    let Some(export) = state
        .campaigns
        .active_campaign_id
        .as_deref()
        .and_then(|id| state.campaigns.export_campaign(id))
    else {
        return;
    };
    if let Err(err) = download(&state.document, &export) {
        warn!(?err, "campaign download failed");
    }
}

pub fn import_scene_text(state: &mut AppState, text: &str) {
    match parse_import_text(&state.window, text) {
        Ok(raw) => {
            state.scene.import_scene(&raw);
            state.ui.close_token_inspector();
        }
        Err(err) => {
            warn!(%err, "scene import failed");
            state.show_toast("That file is not a scene.");
        }
    }
}

pub fn import_campaign_text(state: &mut AppState, text: &str) {
    let imported = parse_import_text(&state.window, text)
        .map(|raw| state.campaigns.import_campaign(&raw));
    match imported {
        Ok(Some(id)) => state.campaigns.set_active_campaign(Some(id.as_str())),
        Ok(None) => state.show_toast("That file is not a campaign."),
        Err(err) => {
            warn!(%err, "campaign import failed");
            state.show_toast("That file is not a campaign.");
        }
    }
}

/// Saves the current scene into the active campaign, creating one if needed.
/// A scene already in the campaign is overwritten in place.
pub fn save_to_active_campaign(state: &mut AppState) {
    if state.campaigns.active_campaign().is_none() {
        state.campaigns.create_campaign(None);
    }
    let scene = state.scene.scene();
    let overwrite = state
        .campaigns
        .active_campaign()
        .and_then(|campaign| campaign.scene(&scene.id))
        .map(|existing| existing.id.clone());
    let saved = state
        .campaigns
        .save_scene_to_campaign(scene, None, overwrite.as_deref());
    if let Some(id) = saved {
        state.show_toast(&format!("Saved scene {id} to campaign."));
    }
}

pub fn load_from_campaign(state: &mut AppState, campaign_id: &str, scene_id: &str) {
    let Some(scene) = state.campaigns.load_scene_from_campaign(campaign_id, scene_id) else {
        return;
    };
    match serde_json::to_value(&scene) {
        Ok(raw) => {
            state.scene.set_scene(&raw);
            state.ui.close_token_inspector();
        }
        Err(err) => warn!(%err, "could not load campaign scene"),
    }
}

pub fn reset_everything(state: &mut AppState) {
    state.scene.reset_scene();
    state.ui.reset_ui();
    state.campaigns.reset_campaigns();
    state.drag = Drag::Idle;
}

pub fn run_shortcut(state: &mut AppState, shortcut: Shortcut) {
    match shortcut {
        Shortcut::ToggleGrid => state.scene.toggle_grid(),
        Shortcut::ToggleFog => state.scene.toggle_fog(),
        Shortcut::ToggleRuler => state.ui.toggle_ruler(),
        Shortcut::ShowMapTab => {
            state.ui.set_active_tab(SidebarTab::Map);
            if !state.ui.prefs.sidebar_open {
                state.ui.toggle_sidebar();
            }
        }
        Shortcut::ToggleHelp => state.ui.toggle_help(),
        Shortcut::ToggleSidebar => state.ui.toggle_sidebar(),
        Shortcut::Fit(mode) => fit_map(state, mode),
        Shortcut::ExportScene => export_scene(state),
    }
}
