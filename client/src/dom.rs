use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{
    Document, Element, HtmlButtonElement, HtmlCanvasElement, HtmlElement, HtmlInputElement,
    HtmlTextAreaElement, MouseEvent, Window,
};

use tabletop_shared::geometry::ScreenPoint;
use tabletop_shared::graph::{home_view, Camera, Extent};
use tabletop_shared::grid::CalibrationState;
use tabletop_shared::store::SidebarTab;

use crate::render::redraw;
use crate::state::AppState;

pub fn get_element<T: JsCast>(document: &Document, id: &str) -> Result<T, JsValue> {
    let element = document
        .get_element_by_id(id)
        .ok_or_else(|| JsValue::from_str(&format!("Missing element: {id}")))?;
    element
        .dyn_into::<T>()
        .map_err(|_| JsValue::from_str(&format!("Invalid element type: {id}")))
}

pub fn set_pressed(button: &HtmlButtonElement, active: bool) {
    let pressed = if active { "true" } else { "false" };
    let _ = button.set_attribute("aria-pressed", pressed);
}

pub fn set_hidden(element: &Element, hidden: bool) {
    if hidden {
        let _ = element.set_attribute("hidden", "");
    } else {
        let _ = element.remove_attribute("hidden");
    }
}

pub fn set_cursor(canvas: &HtmlCanvasElement, cursor: &str) {
    if let Ok(element) = canvas.clone().dyn_into::<HtmlElement>() {
        let _ = element.style().set_property("cursor", cursor);
    }
}

/// Pointer position in canvas pixels.
pub fn canvas_point(canvas: &HtmlCanvasElement, event: &MouseEvent) -> Option<ScreenPoint> {
    let rect = canvas.get_bounding_client_rect();
    if rect.width() <= 0.0 || rect.height() <= 0.0 {
        return None;
    }
    let point = ScreenPoint::new(
        f64::from(event.client_x()) - rect.left(),
        f64::from(event.client_y()) - rect.top(),
    );
    point.is_finite().then_some(point)
}

/// Pointer position in page pixels, the frame gizmo handles are laid out in.
pub fn page_point(event: &MouseEvent) -> ScreenPoint {
    ScreenPoint::new(f64::from(event.client_x()), f64::from(event.client_y()))
}

pub fn resize_canvas(window: &Window, state: &mut AppState) {
    let last = state.graph.viewport;
    let rect = state.canvas.get_bounding_client_rect();
    let dpr = window.device_pixel_ratio();
    state.canvas.set_width((rect.width() * dpr) as u32);
    state.canvas.set_height((rect.height() * dpr) as u32);
    state.device_pixel_ratio = dpr;
    state.graph.viewport = Extent::new(rect.width(), rect.height());
    state.graph.viewport_offset = ScreenPoint::new(rect.left(), rect.top());
    tracing::debug!(
        width = rect.width(),
        height = rect.height(),
        dpr,
        "canvas resized"
    );

    let scene = state.scene.scene();
    if last.is_empty() {
        if scene.pan.x == 0.0 && scene.pan.y == 0.0 {
            let (pan, zoom) = home_view(state.graph.map_image, state.graph.viewport, scene.map_scale);
            state.scene.set_pan_zoom(Some(pan), Some(zoom));
        }
    } else {
        let mut pan = scene.pan;
        pan.x += (rect.width() - last.width) / 2.0;
        pan.y += (rect.height() - last.height) / 2.0;
        state.scene.set_pan_zoom(Some(pan), None);
    }
    state.graph.camera = Camera::from_scene(state.scene.scene());
    redraw(state);
}

pub fn tab_name(tab: SidebarTab) -> &'static str {
    match tab {
        SidebarTab::Map => "map",
        SidebarTab::Tokens => "tokens",
        SidebarTab::Scene => "scene",
        SidebarTab::Notes => "notes",
    }
}

pub fn parse_tab(name: &str) -> Option<SidebarTab> {
    match name {
        "map" => Some(SidebarTab::Map),
        "tokens" => Some(SidebarTab::Tokens),
        "scene" => Some(SidebarTab::Scene),
        "notes" => Some(SidebarTab::Notes),
        _ => None,
    }
}

/// Page controls whose state mirrors the stores.
pub struct Controls {
    pub grid: HtmlButtonElement,
    pub fog: HtmlButtonElement,
    pub ruler: HtmlButtonElement,
    pub handles: HtmlButtonElement,
    pub snap: HtmlButtonElement,
    pub calibrate: HtmlButtonElement,
    pub sidebar: HtmlElement,
    pub help: HtmlElement,
    pub calibration_panel: HtmlElement,
    pub calibration_cells: HtmlInputElement,
    pub inspector: HtmlElement,
    pub token_name: HtmlInputElement,
    pub token_lock: HtmlButtonElement,
    pub token_hide: HtmlButtonElement,
    pub notes: HtmlTextAreaElement,
    pub grid_size: HtmlInputElement,
    pub campaign_label: HtmlElement,
    pub campaign_scenes: HtmlElement,
}

impl Controls {
    pub fn from_document(document: &Document) -> Result<Self, JsValue> {
        Ok(Self {
            grid: get_element(document, "toggleGrid")?,
            fog: get_element(document, "toggleFog")?,
            ruler: get_element(document, "toggleRuler")?,
            handles: get_element(document, "toggleHandles")?,
            snap: get_element(document, "toggleSnap")?,
            calibrate: get_element(document, "calibrate")?,
            sidebar: get_element(document, "sidebar")?,
            help: get_element(document, "help")?,
            calibration_panel: get_element(document, "calibrationPanel")?,
            calibration_cells: get_element(document, "calibrationCells")?,
            inspector: get_element(document, "tokenInspector")?,
            token_name: get_element(document, "tokenName")?,
            token_lock: get_element(document, "tokenLock")?,
            token_hide: get_element(document, "tokenHide")?,
            notes: get_element(document, "notes")?,
            grid_size: get_element(document, "gridSize")?,
            campaign_label: get_element(document, "campaignName")?,
            campaign_scenes: get_element(document, "campaignScenes")?,
        })
    }
}

fn is_focused(document: &Document, element: &Element) -> bool {
    document
        .active_element()
        .is_some_and(|active| active == *element)
}

pub fn sync_controls(state: &AppState) {
    let controls = &state.controls;
    let scene = state.scene.scene();
    let ui = &state.ui;

    set_pressed(&controls.grid, scene.grid.enabled);
    set_pressed(&controls.fog, scene.fog.enabled);
    set_pressed(&controls.ruler, ui.ruler_active);
    set_pressed(&controls.handles, ui.prefs.show_map_transform_handles);
    set_pressed(&controls.snap, ui.prefs.token_snap_to_grid);
    set_pressed(&controls.calibrate, ui.calibration.is_active());

    set_hidden(&controls.sidebar, !ui.prefs.sidebar_open);
    let _ = controls
        .sidebar
        .set_attribute("data-tab", tab_name(ui.prefs.active_tab));
    set_hidden(&controls.help, !ui.show_help);
    set_hidden(
        &controls.calibration_panel,
        !matches!(ui.calibration, CalibrationState::Ready { .. }),
    );

    let selected = ui
        .selected_token_id
        .as_deref()
        .and_then(|id| scene.token(id))
        .filter(|_| ui.show_token_inspector);
    set_hidden(&controls.inspector, selected.is_none());
    if let Some(token) = selected {
        if !is_focused(&state.document, &controls.token_name) {
            controls.token_name.set_value(&token.name);
        }
        set_pressed(&controls.token_lock, token.locked);
        set_pressed(&controls.token_hide, !token.visible);
    }

    if controls.notes.value() != scene.notes_markdown
        && !is_focused(&state.document, &controls.notes)
    {
        controls.notes.set_value(&scene.notes_markdown);
    }

    if !is_focused(&state.document, &controls.grid_size) {
        controls.grid_size.set_value(&scene.grid.size.to_string());
    }

    let campaign = state.campaigns.active_campaign();
    let label = campaign
        .map(|campaign| format!("{} ({} scenes)", campaign.name, campaign.scenes.len()))
        .unwrap_or_else(|| "No campaign".to_string());
    controls.campaign_label.set_text_content(Some(&label));
    let scenes: Vec<(&str, &str)> = campaign
        .map(|campaign| {
            campaign
                .scenes
                .iter()
                .map(|scene| (scene.id.as_str(), scene.name.as_str()))
                .collect()
        })
        .unwrap_or_default();
    if let Err(err) = render_scene_list(&state.document, &controls.campaign_scenes, &scenes) {
        tracing::warn!(?err, "could not list campaign scenes");
    }
}

/// One button per campaign scene. Rebuilt only when the listing changes.
fn render_scene_list(
    document: &Document,
    list: &HtmlElement,
    scenes: &[(&str, &str)],
) -> Result<(), JsValue> {
    let signature = scenes
        .iter()
        .map(|(id, name)| format!("{id}:{name}"))
        .collect::<Vec<_>>()
        .join("|");
    if list.get_attribute("data-signature").as_deref() == Some(signature.as_str()) {
        return Ok(());
    }
    list.set_attribute("data-signature", &signature)?;
    list.set_inner_html("");
    for &(id, name) in scenes {
        let entry: HtmlButtonElement = document.create_element("button")?.dyn_into()?;
        entry.set_type("button");
        entry.set_attribute("data-scene", id)?;
        entry.set_text_content(Some(name));
        list.append_child(&entry)?;
    }
    Ok(())
}
