use std::cell::{Cell, RefCell};
use std::rc::Rc;

use js_sys::Reflect;
use tracing::{debug, info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Layer};
use tracing_web::MakeWebConsoleWriter;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{
    CanvasRenderingContext2d, DragEvent, Element, Event, EventTarget, File, FileReader,
    HtmlButtonElement, HtmlCanvasElement, HtmlElement, HtmlInputElement, KeyboardEvent,
    PointerEvent, ProgressEvent, WheelEvent,
};

use tabletop_shared::geometry::ScreenPoint;
use tabletop_shared::gizmo::{map_handles, token_handles, HANDLE_HIT_RADIUS};
use tabletop_shared::keys::{is_pan_key, is_text_field_tag, shortcut_for};
use tabletop_shared::textures::{is_image_content_type, TextureSlot};
use tabletop_shared::{
    gesture_for_handle, FitMode, GestureKind, GridPatch, HandleKey, Modifiers, Pan, SceneGraph,
    SceneStore, TokenPatch, TransformController, UiStore,
};

use crate::actions::{
    add_image_token, export_active_campaign, export_scene, fit_map, go_home,
    import_campaign_text, import_scene_text, load_from_campaign, refresh, reset_everything,
    run_shortcut, save_to_active_campaign, zoom_at,
};
use crate::config::ClientConfig;
use crate::crash;
use crate::dom::{
    canvas_point, get_element, page_point, parse_tab, resize_canvas, set_cursor, Controls,
};
use crate::persistence::restore;
use crate::state::{AppState, Drag, PanDrag, SessionListeners};
use crate::textures::TextureCache;

type App = Rc<RefCell<AppState>>;

fn document_ready_state(document: &web_sys::Document) -> Option<String> {
    Reflect::get(document.as_ref(), &JsValue::from_str("readyState"))
        .ok()?
        .as_string()
}

fn init_logging(config: &ClientConfig) {
    let filter = EnvFilter::new(if config.debug { "debug" } else { "info" });
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .without_time()
        .with_writer(MakeWebConsoleWriter::new())
        .with_filter(filter);
    let _ = tracing_subscriber::registry().with(fmt_layer).try_init();
}

fn modifiers_of(event: &PointerEvent) -> Modifiers {
    Modifiers {
        shift: event.shift_key(),
        alt: event.alt_key(),
        ctrl: event.ctrl_key() || event.meta_key(),
    }
}

fn event_in_text_field(event: &Event) -> bool {
    event
        .target()
        .and_then(|target| target.dyn_into::<Element>().ok())
        .is_some_and(|element| is_text_field_tag(&element.tag_name()))
}

#[wasm_bindgen(start)]
pub fn run() -> Result<(), JsValue> {
    crash::set_panic_hook();

    let window = web_sys::window().ok_or_else(|| JsValue::from_str("Missing window"))?;
    let document = window
        .document()
        .ok_or_else(|| JsValue::from_str("Missing document"))?;
    let started = Rc::new(Cell::new(false));

    if document_ready_state(&document).as_deref() == Some("complete") {
        started.set(true);
        return start_app();
    }

    let onload_started = started.clone();
    let onload = Closure::<dyn FnMut(Event)>::new(move |_| {
        if onload_started.replace(true) {
            return;
        }
        if let Err(err) = start_app() {
            web_sys::console::error_1(&err);
        }
    });
    window.add_event_listener_with_callback("load", onload.as_ref().unchecked_ref())?;
    onload.forget();

    Ok(())
}

fn start_app() -> Result<(), JsValue> {
    let window = web_sys::window().ok_or_else(|| JsValue::from_str("Missing window"))?;
    let document = window
        .document()
        .ok_or_else(|| JsValue::from_str("Missing document"))?;

    let config = ClientConfig::from_window(&window);
    init_logging(&config);
    info!(debug = config.debug, max_texture = ?config.max_texture, "tabletop starting");

    if let Some(report) = crash::take_panic_info() {
        warn!("previous session ended in a panic");
        crash::show_safe_mode(&document, &report)?;
    }

    let canvas: HtmlCanvasElement = get_element(&document, "table")?;
    let ctx = canvas
        .get_context("2d")?
        .ok_or_else(|| JsValue::from_str("Missing canvas context"))?
        .dyn_into::<CanvasRenderingContext2d>()?;
    let controls = Controls::from_document(&document)?;
    let restored = restore(&window);
    debug!(
        scene = %restored.scene.id,
        tokens = restored.scene.tokens.len(),
        campaigns = restored.campaigns.campaigns.len(),
        "state restored"
    );

    let state: App = Rc::new(RefCell::new(AppState {
        window: window.clone(),
        document: document.clone(),
        canvas: canvas.clone(),
        ctx,
        controls,
        config,
        scene: SceneStore::new(restored.scene),
        ui: UiStore::from_preferences(restored.prefs),
        campaigns: restored.campaigns,
        graph: SceneGraph::default(),
        controller: TransformController::default(),
        textures: TextureCache::default(),
        map_slot: TextureSlot::default(),
        session_listeners: None,
        drag: Drag::Idle,
        space_pressed: false,
        device_pixel_ratio: window.device_pixel_ratio(),
        toast: None,
    }));

    install_pointer_handlers(&state, &canvas)?;
    install_keyboard_handlers(&state)?;
    install_drop_handlers(&state, &canvas)?;
    install_file_inputs(&state)?;
    install_buttons(&state)?;
    install_panels(&state)?;

    {
        let resize_state = state.clone();
        let window_cb = window.clone();
        let onresize = Closure::<dyn FnMut()>::new(move || {
            {
                let mut state = resize_state.borrow_mut();
                resize_canvas(&window_cb, &mut state);
            }
            refresh(&resize_state);
        });
        window.add_event_listener_with_callback("resize", onresize.as_ref().unchecked_ref())?;
        onresize.forget();
    }

    {
        let mut state = state.borrow_mut();
        resize_canvas(&window, &mut state);
    }
    refresh(&state);
    info!("tabletop ready");
    Ok(())
}

/// What a canvas press turned into.
enum Press {
    Ignored,
    Changed,
    Session,
}

fn press(state: &mut AppState, event: &PointerEvent) -> Press {
    let Some(point) = canvas_point(&state.canvas, event) else {
        return Press::Ignored;
    };
    let button = event.button();
    if button == 1 || button == 2 || (button == 0 && state.space_pressed) {
        event.prevent_default();
        let _ = state.canvas.set_pointer_capture(event.pointer_id());
        state.drag = Drag::Pan(PanDrag {
            pointer_id: event.pointer_id(),
            start: point,
            origin: state.scene.scene().pan,
        });
        set_cursor(&state.canvas, "grabbing");
        return Press::Changed;
    }
    if button != 0 {
        return Press::Ignored;
    }

    if state.ui.calibration.is_collecting() {
        if let Some(local) = state.graph.screen_to_map(point) {
            if state.ui.calibration.add_point(local) {
                debug!("calibration points collected");
            }
        }
        return Press::Changed;
    }

    if state.ui.ruler_active {
        if let Some(local) = state.graph.screen_to_map(point) {
            state.ui.ruler.begin(local);
            state.drag = Drag::Ruler {
                pointer_id: event.pointer_id(),
            };
            let _ = state.canvas.set_pointer_capture(event.pointer_id());
        }
        return Press::Changed;
    }

    let page = page_point(event);
    let modifiers = modifiers_of(event);

    let selected = state.ui.selected_token_id.clone();
    if let Some(id) = selected.as_deref() {
        let handle = token_handles(&state.graph, id)
            .and_then(|layout| layout.hit(page, HANDLE_HIT_RADIUS));
        if let Some(handle) = handle {
            let kind = gesture_for_handle(handle, modifiers);
            return begin_token(state, id, handle, kind, point, modifiers);
        }
    }

    if state.ui.prefs.show_map_transform_handles {
        let handle =
            map_handles(&state.graph).and_then(|layout| layout.hit(page, HANDLE_HIT_RADIUS));
        if let Some(handle) = handle {
            let kind = gesture_for_handle(handle, modifiers);
            let started = state.controller.begin_map(
                handle,
                kind,
                point,
                modifiers,
                state.scene.scene(),
                &state.graph,
            );
            return match started {
                Ok(_) => Press::Session,
                Err(err) => {
                    debug!(%err, "map gesture rejected");
                    Press::Ignored
                }
            };
        }
    }

    let hit = state.graph.hit_token(point).map(|node| node.id.clone());
    match hit {
        Some(id) => {
            state.ui.open_token_inspector(&id);
            match begin_token(state, &id, HandleKey::Center, GestureKind::Move, point, modifiers) {
                Press::Session => Press::Session,
                _ => Press::Changed,
            }
        }
        None => {
            state.ui.close_token_inspector();
            Press::Changed
        }
    }
}

fn begin_token(
    state: &mut AppState,
    id: &str,
    handle: HandleKey,
    kind: GestureKind,
    point: ScreenPoint,
    modifiers: Modifiers,
) -> Press {
    let started = state.controller.begin_token(
        id,
        handle,
        kind,
        point,
        modifiers,
        state.scene.scene(),
        &state.graph,
    );
    match started {
        Ok(_) => Press::Session,
        Err(err) => {
            debug!(%err, "token gesture rejected");
            Press::Ignored
        }
    }
}

fn hover_cursor(state: &AppState, event: &PointerEvent, point: ScreenPoint) -> &'static str {
    if state.space_pressed {
        return "grab";
    }
    if state.ui.calibration.is_collecting() || state.ui.ruler_active {
        return "crosshair";
    }
    let page = page_point(event);
    let token_handle = state
        .ui
        .selected_token_id
        .as_deref()
        .and_then(|id| token_handles(&state.graph, id))
        .and_then(|layout| layout.hit(page, HANDLE_HIT_RADIUS));
    if let Some(handle) = token_handle {
        return handle.cursor();
    }
    if state.ui.prefs.show_map_transform_handles {
        let map_handle =
            map_handles(&state.graph).and_then(|layout| layout.hit(page, HANDLE_HIT_RADIUS));
        if let Some(handle) = map_handle {
            return handle.cursor();
        }
    }
    match state.graph.hit_token(point) {
        Some(node) if !node.locked => "move",
        _ => "default",
    }
}

/// Window-level listeners follow the pointer outside the canvas until release.
fn install_session_listeners(app: &App) -> Result<(), JsValue> {
    let move_app = app.clone();
    let onmove = Closure::<dyn FnMut(PointerEvent)>::new(move |event: PointerEvent| {
        {
            let mut guard = move_app.borrow_mut();
            let state = &mut *guard;
            let Some(point) = canvas_point(&state.canvas, &event) else {
                return;
            };
            let snap = state.ui.prefs.token_snap_to_grid;
            let candidate = state
                .controller
                .update(point, &mut state.scene, &state.graph, snap);
            if candidate.is_none() {
                return;
            }
        }
        refresh(&move_app);
    });

    let up_app = app.clone();
    let onup = Closure::<dyn FnMut(PointerEvent)>::new(move |_event: PointerEvent| {
        end_session(&up_app);
    });

    let window = app.borrow().window.clone();
    window.add_event_listener_with_callback("pointermove", onmove.as_ref().unchecked_ref())?;
    window.add_event_listener_with_callback("pointerup", onup.as_ref().unchecked_ref())?;
    window.add_event_listener_with_callback("pointercancel", onup.as_ref().unchecked_ref())?;
    app.borrow_mut().session_listeners = Some(SessionListeners { onmove, onup });
    Ok(())
}

fn end_session(app: &App) {
    let (window, listeners) = {
        let mut guard = app.borrow_mut();
        let state = &mut *guard;
        if let Some(target) = state.controller.end(&mut state.scene) {
            debug!(?target, "gesture committed");
        }
        (state.window.clone(), state.session_listeners.take())
    };
    if let Some(listeners) = listeners {
        let onmove: &js_sys::Function = listeners.onmove.as_ref().unchecked_ref();
        let onup: &js_sys::Function = listeners.onup.as_ref().unchecked_ref();
        let _ = window.remove_event_listener_with_callback("pointermove", onmove);
        let _ = window.remove_event_listener_with_callback("pointerup", onup);
        let _ = window.remove_event_listener_with_callback("pointercancel", onup);
    }
    refresh(app);
}

fn install_pointer_handlers(state: &App, canvas: &HtmlCanvasElement) -> Result<(), JsValue> {
    {
        let down_state = state.clone();
        let ondown = Closure::<dyn FnMut(PointerEvent)>::new(move |event: PointerEvent| {
            let outcome = {
                let mut state = down_state.borrow_mut();
                press(&mut state, &event)
            };
            match outcome {
                Press::Ignored => {}
                Press::Changed => refresh(&down_state),
                Press::Session => {
                    event.prevent_default();
                    if let Err(err) = install_session_listeners(&down_state) {
                        warn!(?err, "could not follow the pointer");
                        end_session(&down_state);
                        return;
                    }
                    refresh(&down_state);
                }
            }
        });
        canvas.add_event_listener_with_callback("pointerdown", ondown.as_ref().unchecked_ref())?;
        ondown.forget();
    }

    {
        let move_state = state.clone();
        let onmove = Closure::<dyn FnMut(PointerEvent)>::new(move |event: PointerEvent| {
            let changed = {
                let mut guard = move_state.borrow_mut();
                let state = &mut *guard;
                let Some(point) = canvas_point(&state.canvas, &event) else {
                    return;
                };
                let pointer_id = event.pointer_id();
                match &state.drag {
                    Drag::Pan(pan) if pan.pointer_id == pointer_id => {
                        let next = Pan {
                            x: pan.origin.x + point.x - pan.start.x,
                            y: pan.origin.y + point.y - pan.start.y,
                        };
                        state.scene.set_pan_zoom(Some(next), None);
                        true
                    }
                    Drag::Ruler { pointer_id: owner } if *owner == pointer_id => {
                        if let Some(local) = state.graph.screen_to_map(point) {
                            state.ui.ruler.drag(local);
                        }
                        true
                    }
                    Drag::Idle if !state.controller.is_active() => {
                        set_cursor(&state.canvas, hover_cursor(state, &event, point));
                        false
                    }
                    _ => false,
                }
            };
            if changed {
                refresh(&move_state);
            }
        });
        canvas.add_event_listener_with_callback("pointermove", onmove.as_ref().unchecked_ref())?;
        onmove.forget();
    }

    {
        let up_state = state.clone();
        let onstop = Closure::<dyn FnMut(PointerEvent)>::new(move |event: PointerEvent| {
            let ended = {
                let mut state = up_state.borrow_mut();
                let pointer_id = event.pointer_id();
                let owns = match &state.drag {
                    Drag::Pan(pan) => pan.pointer_id == pointer_id,
                    Drag::Ruler { pointer_id: owner } => *owner == pointer_id,
                    Drag::Idle => false,
                };
                if owns {
                    if matches!(state.drag, Drag::Ruler { .. }) {
                        state.ui.ruler.end();
                    }
                    state.drag = Drag::Idle;
                    let _ = state.canvas.release_pointer_capture(pointer_id);
                    let cursor = if state.space_pressed { "grab" } else { "default" };
                    set_cursor(&state.canvas, cursor);
                }
                owns
            };
            if ended {
                refresh(&up_state);
            }
        });
        canvas.add_event_listener_with_callback("pointerup", onstop.as_ref().unchecked_ref())?;
        canvas
            .add_event_listener_with_callback("pointercancel", onstop.as_ref().unchecked_ref())?;
        onstop.forget();
    }

    {
        let zoom_state = state.clone();
        let onwheel = Closure::<dyn FnMut(WheelEvent)>::new(move |event: WheelEvent| {
            event.prevent_default();
            {
                let mut state = zoom_state.borrow_mut();
                let Some(point) = canvas_point(&state.canvas, &event) else {
                    return;
                };
                zoom_at(&mut state, point, event.delta_y());
            }
            refresh(&zoom_state);
        });
        canvas.add_event_listener_with_callback("wheel", onwheel.as_ref().unchecked_ref())?;
        onwheel.forget();
    }

    {
        let oncontextmenu = Closure::<dyn FnMut(Event)>::new(move |event: Event| {
            event.prevent_default();
        });
        canvas.add_event_listener_with_callback(
            "contextmenu",
            oncontextmenu.as_ref().unchecked_ref(),
        )?;
        oncontextmenu.forget();
    }

    Ok(())
}

fn install_keyboard_handlers(state: &App) -> Result<(), JsValue> {
    let window = state.borrow().window.clone();

    {
        let key_state = state.clone();
        let onkeydown = Closure::<dyn FnMut(KeyboardEvent)>::new(move |event: KeyboardEvent| {
            let key = event.key();
            let in_text_field = event_in_text_field(&event);
            if is_pan_key(&key) && !in_text_field {
                event.prevent_default();
                let mut state = key_state.borrow_mut();
                if !state.space_pressed {
                    state.space_pressed = true;
                    set_cursor(&state.canvas, "grab");
                }
                return;
            }
            let modifier = event.ctrl_key() || event.meta_key();
            let Some(shortcut) = shortcut_for(&key, modifier, in_text_field) else {
                return;
            };
            if shortcut.prevents_default() {
                event.prevent_default();
            }
            debug!(?shortcut, "shortcut");
            {
                let mut state = key_state.borrow_mut();
                run_shortcut(&mut state, shortcut);
            }
            refresh(&key_state);
        });
        window.add_event_listener_with_callback("keydown", onkeydown.as_ref().unchecked_ref())?;
        onkeydown.forget();
    }

    {
        let key_state = state.clone();
        let onkeyup = Closure::<dyn FnMut(KeyboardEvent)>::new(move |event: KeyboardEvent| {
            if !is_pan_key(&event.key()) {
                return;
            }
            let mut state = key_state.borrow_mut();
            state.space_pressed = false;
            if !matches!(state.drag, Drag::Pan(_)) {
                set_cursor(&state.canvas, "default");
            }
        });
        window.add_event_listener_with_callback("keyup", onkeyup.as_ref().unchecked_ref())?;
        onkeyup.forget();
    }

    Ok(())
}

/// Reads `file` and hands its contents to `apply`, then refreshes.
fn read_file(
    app: &App,
    file: &File,
    as_data_url: bool,
    apply: impl FnOnce(&mut AppState, &str, String) + 'static,
) -> Result<(), JsValue> {
    let reader = FileReader::new()?;
    let name = file.name();
    let load_app = app.clone();
    let onload = Closure::once_into_js(move |event: ProgressEvent| {
        let contents = event
            .target()
            .and_then(|target| target.dyn_into::<FileReader>().ok())
            .and_then(|reader| reader.result().ok())
            .and_then(|result| result.as_string());
        let Some(contents) = contents else {
            warn!(file = %name, "could not read file");
            return;
        };
        {
            let mut state = load_app.borrow_mut();
            apply(&mut *state, &name, contents);
        }
        refresh(&load_app);
    });
    reader.set_onload(Some(onload.unchecked_ref()));
    if as_data_url {
        reader.read_as_data_url(file)
    } else {
        reader.read_as_text(file)
    }
}

fn install_drop_handlers(state: &App, canvas: &HtmlCanvasElement) -> Result<(), JsValue> {
    {
        let ondragover = Closure::<dyn FnMut(DragEvent)>::new(move |event: DragEvent| {
            event.prevent_default();
        });
        canvas.add_event_listener_with_callback("dragover", ondragover.as_ref().unchecked_ref())?;
        ondragover.forget();
    }

    {
        let drop_state = state.clone();
        let ondrop = Closure::<dyn FnMut(DragEvent)>::new(move |event: DragEvent| {
            event.prevent_default();
            let Some(files) = event.data_transfer().and_then(|transfer| transfer.files()) else {
                return;
            };
            for index in 0..files.length() {
                let Some(file) = files.get(index) else {
                    continue;
                };
                if !is_image_content_type(&file.type_()) {
                    debug!(file = %file.name(), kind = %file.type_(), "ignoring dropped non-image");
                    continue;
                }
                let read = read_file(&drop_state, &file, true, |state, name, url| {
                    add_image_token(state, name, &url);
                });
                if let Err(err) = read {
                    warn!(?err, "could not read dropped file");
                }
            }
        });
        canvas.add_event_listener_with_callback("drop", ondrop.as_ref().unchecked_ref())?;
        ondrop.forget();
    }

    Ok(())
}

fn on_file_chosen(
    state: &App,
    id: &str,
    as_data_url: bool,
    apply: fn(&mut AppState, &str, String),
) -> Result<(), JsValue> {
    let document = state.borrow().document.clone();
    let input: HtmlInputElement = get_element(&document, id)?;
    let input_cb = input.clone();
    let file_state = state.clone();
    let onchange = Closure::<dyn FnMut(Event)>::new(move |_| {
        let Some(file) = input_cb.files().and_then(|list| list.get(0)) else {
            return;
        };
        if let Err(err) = read_file(&file_state, &file, as_data_url, apply) {
            warn!(?err, "could not read chosen file");
        }
        input_cb.set_value("");
    });
    input.add_event_listener_with_callback("change", onchange.as_ref().unchecked_ref())?;
    onchange.forget();
    Ok(())
}

fn install_file_inputs(state: &App) -> Result<(), JsValue> {
    on_file_chosen(state, "mapFile", true, |state, name, url| {
        info!(file = name, "map image chosen");
        state.scene.set_map(&url);
    })?;
    on_file_chosen(state, "tokenFile", true, |state, name, url| {
        add_image_token(state, name, &url);
    })?;
    on_file_chosen(state, "sceneFile", false, |state, _, text| {
        import_scene_text(state, &text);
    })?;
    on_file_chosen(state, "campaignFile", false, |state, _, text| {
        import_campaign_text(state, &text);
    })?;

    let document = state.borrow().document.clone();
    let map_url: HtmlInputElement = get_element(&document, "mapUrl")?;
    let map_url_cb = map_url.clone();
    let url_state = state.clone();
    let onchange = Closure::<dyn FnMut(Event)>::new(move |_| {
        let url = map_url_cb.value().trim().to_string();
        if url.is_empty() {
            return;
        }
        url_state.borrow_mut().scene.set_map(&url);
        refresh(&url_state);
    });
    map_url.add_event_listener_with_callback("change", onchange.as_ref().unchecked_ref())?;
    onchange.forget();
    Ok(())
}

fn on_click(
    state: &App,
    target: &EventTarget,
    action: impl Fn(&mut AppState) + 'static,
) -> Result<(), JsValue> {
    let click_state = state.clone();
    let onclick = Closure::<dyn FnMut(Event)>::new(move |_| {
        {
            let mut state = click_state.borrow_mut();
            action(&mut *state);
        }
        refresh(&click_state);
    });
    target.add_event_listener_with_callback("click", onclick.as_ref().unchecked_ref())?;
    onclick.forget();
    Ok(())
}

fn button(state: &App, id: &str) -> Result<HtmlButtonElement, JsValue> {
    get_element(&state.borrow().document, id)
}

fn selected_token(state: &AppState) -> Option<String> {
    state.ui.selected_token_id.clone()
}

fn install_buttons(state: &App) -> Result<(), JsValue> {
    let (grid, fog, ruler, handles, snap, calibrate) = {
        let app = state.borrow();
        let controls = &app.controls;
        (
            controls.grid.clone(),
            controls.fog.clone(),
            controls.ruler.clone(),
            controls.handles.clone(),
            controls.snap.clone(),
            controls.calibrate.clone(),
        )
    };
    on_click(state, &grid, |state| state.scene.toggle_grid())?;
    on_click(state, &fog, |state| state.scene.toggle_fog())?;
    on_click(state, &ruler, |state| state.ui.toggle_ruler())?;
    on_click(state, &handles, |state| {
        let show = !state.ui.prefs.show_map_transform_handles;
        state.ui.set_show_map_transform_handles(show);
    })?;
    on_click(state, &snap, |state| {
        let snap = !state.ui.prefs.token_snap_to_grid;
        state.ui.set_token_snap_to_grid(snap);
    })?;
    on_click(state, &calibrate, |state| {
        if state.ui.calibration.is_active() {
            state.ui.cancel_grid_calibration();
        } else {
            state.ui.begin_grid_calibration();
        }
    })?;

    on_click(state, &button(state, "home")?.into(), go_home)?;
    on_click(state, &button(state, "fitContain")?.into(), |state| {
        fit_map(state, FitMode::Contain)
    })?;
    on_click(state, &button(state, "fitCover")?.into(), |state| {
        fit_map(state, FitMode::Cover)
    })?;
    on_click(state, &button(state, "fitStretch")?.into(), |state| {
        fit_map(state, FitMode::Stretch)
    })?;
    on_click(state, &button(state, "resetMapTransform")?.into(), |state| {
        state.scene.reset_map_transform()
    })?;
    on_click(state, &button(state, "resetGridOffsets")?.into(), |state| {
        state.scene.reset_grid_offsets()
    })?;
    on_click(state, &button(state, "toggleSidebar")?.into(), |state| {
        state.ui.toggle_sidebar()
    })?;
    on_click(state, &button(state, "toggleHelp")?.into(), |state| {
        state.ui.toggle_help()
    })?;

    on_click(state, &button(state, "exportScene")?.into(), |state| {
        export_scene(state)
    })?;
    on_click(state, &button(state, "resetScene")?.into(), |state| {
        state.scene.reset_scene();
        state.ui.close_token_inspector();
    })?;
    on_click(state, &button(state, "resetAll")?.into(), reset_everything)?;
    on_click(state, &button(state, "newCampaign")?.into(), |state| {
        state.campaigns.create_campaign(None);
    })?;
    on_click(state, &button(state, "saveToCampaign")?.into(), save_to_active_campaign)?;
    on_click(state, &button(state, "exportCampaign")?.into(), |state| {
        export_active_campaign(state)
    })?;

    on_click(state, &button(state, "calibrationConfirm")?.into(), |state| {
        if !state.ui.calibration.confirm(&mut state.scene) {
            state.show_toast("Enter a positive number of cells.");
        }
    })?;
    on_click(state, &button(state, "calibrationCancel")?.into(), |state| {
        state.ui.cancel_grid_calibration()
    })?;

    on_click(state, &button(state, "tokenLock")?.into(), |state| {
        let Some(id) = selected_token(state) else {
            return;
        };
        let locked = state.scene.scene().token(&id).is_some_and(|token| token.locked);
        state.scene.update_token(
            &id,
            &TokenPatch {
                locked: Some(!locked),
                ..TokenPatch::default()
            },
        );
    })?;
    on_click(state, &button(state, "tokenHide")?.into(), |state| {
        let Some(id) = selected_token(state) else {
            return;
        };
        let visible = state.scene.scene().token(&id).is_some_and(|token| token.visible);
        state.scene.update_token(
            &id,
            &TokenPatch {
                visible: Some(!visible),
                ..TokenPatch::default()
            },
        );
    })?;
    on_click(state, &button(state, "tokenRemove")?.into(), |state| {
        if let Some(id) = selected_token(state) {
            state.scene.remove_token(&id);
            state.ui.close_token_inspector();
        }
    })?;
    on_click(state, &button(state, "tokenClose")?.into(), |state| {
        state.ui.close_token_inspector()
    })?;

    Ok(())
}

/// Inputs and delegated clicks inside the sidebar panels.
fn install_panels(state: &App) -> Result<(), JsValue> {
    let (document, controls_cells, token_name, notes) = {
        let app = state.borrow();
        (
            app.document.clone(),
            app.controls.calibration_cells.clone(),
            app.controls.token_name.clone(),
            app.controls.notes.clone(),
        )
    };

    {
        let tabs: HtmlElement = get_element(&document, "tabs")?;
        let tab_state = state.clone();
        let onclick = Closure::<dyn FnMut(Event)>::new(move |event: Event| {
            let tab = event
                .target()
                .and_then(|target| target.dyn_into::<Element>().ok())
                .and_then(|element| element.closest("[data-tab]").ok().flatten())
                .and_then(|element| element.get_attribute("data-tab"))
                .and_then(|name| parse_tab(&name));
            let Some(tab) = tab else {
                return;
            };
            tab_state.borrow_mut().ui.set_active_tab(tab);
            refresh(&tab_state);
        });
        tabs.add_event_listener_with_callback("click", onclick.as_ref().unchecked_ref())?;
        onclick.forget();
    }

    {
        let scenes: HtmlElement = get_element(&document, "campaignScenes")?;
        let scene_state = state.clone();
        let onclick = Closure::<dyn FnMut(Event)>::new(move |event: Event| {
            let scene_id = event
                .target()
                .and_then(|target| target.dyn_into::<Element>().ok())
                .and_then(|element| element.closest("[data-scene]").ok().flatten())
                .and_then(|element| element.get_attribute("data-scene"));
            let Some(scene_id) = scene_id else {
                return;
            };
            {
                let mut state = scene_state.borrow_mut();
                let Some(campaign_id) = state.campaigns.active_campaign_id.clone() else {
                    return;
                };
                load_from_campaign(&mut state, &campaign_id, &scene_id);
            }
            refresh(&scene_state);
        });
        scenes.add_event_listener_with_callback("click", onclick.as_ref().unchecked_ref())?;
        onclick.forget();
    }

    {
        let cells_cb = controls_cells.clone();
        let cells_state = state.clone();
        let oninput = Closure::<dyn FnMut(Event)>::new(move |_| {
            let value = cells_cb.value();
            cells_state
                .borrow_mut()
                .ui
                .calibration
                .set_cells_input(&value);
        });
        controls_cells.add_event_listener_with_callback("input", oninput.as_ref().unchecked_ref())?;
        oninput.forget();
    }

    {
        let grid_size: HtmlInputElement = get_element(&document, "gridSize")?;
        let grid_size_cb = grid_size.clone();
        let grid_state = state.clone();
        let onchange = Closure::<dyn FnMut(Event)>::new(move |_| {
            let Ok(size) = grid_size_cb.value().trim().parse::<f64>() else {
                return;
            };
            grid_state.borrow_mut().scene.set_grid(&GridPatch {
                size: Some(size),
                ..GridPatch::default()
            });
            refresh(&grid_state);
        });
        grid_size.add_event_listener_with_callback("change", onchange.as_ref().unchecked_ref())?;
        onchange.forget();
    }

    {
        let name_cb = token_name.clone();
        let name_state = state.clone();
        let onchange = Closure::<dyn FnMut(Event)>::new(move |_| {
            {
                let mut state = name_state.borrow_mut();
                let Some(id) = selected_token(&state) else {
                    return;
                };
                state.scene.update_token(
                    &id,
                    &TokenPatch {
                        name: Some(name_cb.value()),
                        ..TokenPatch::default()
                    },
                );
            }
            refresh(&name_state);
        });
        token_name.add_event_listener_with_callback("change", onchange.as_ref().unchecked_ref())?;
        onchange.forget();
    }

    {
        let notes_cb = notes.clone();
        let notes_state = state.clone();
        let oninput = Closure::<dyn FnMut(Event)>::new(move |_| {
            notes_state.borrow_mut().scene.set_notes(&notes_cb.value());
            refresh(&notes_state);
        });
        notes.add_event_listener_with_callback("input", oninput.as_ref().unchecked_ref())?;
        oninput.forget();
    }

    Ok(())
}
