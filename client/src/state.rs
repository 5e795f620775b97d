use wasm_bindgen::prelude::Closure;
use web_sys::{CanvasRenderingContext2d, Document, HtmlCanvasElement, PointerEvent, Window};

use tabletop_shared::geometry::ScreenPoint;
use tabletop_shared::textures::TextureSlot;
use tabletop_shared::{CampaignStore, Pan, SceneGraph, SceneStore, TransformController, UiStore};

use crate::config::ClientConfig;
use crate::dom::Controls;
use crate::textures::TextureCache;

pub const TOAST_MS: f64 = 4000.0;

pub struct Toast {
    pub text: String,
    pub until: f64,
    pub expiry_scheduled: bool,
}

pub struct PanDrag {
    pub pointer_id: i32,
    pub start: ScreenPoint,
    pub origin: Pan,
}

/// Window-level listeners installed for the lifetime of one transform session.
pub struct SessionListeners {
    pub onmove: Closure<dyn FnMut(PointerEvent)>,
    pub onup: Closure<dyn FnMut(PointerEvent)>,
}

pub enum Drag {
    Idle,
    Pan(PanDrag),
    Ruler { pointer_id: i32 },
}

pub struct AppState {
    pub window: Window,
    pub document: Document,
    pub canvas: HtmlCanvasElement,
    pub ctx: CanvasRenderingContext2d,
    pub controls: Controls,
    pub config: ClientConfig,
    pub scene: SceneStore,
    pub ui: UiStore,
    pub campaigns: CampaignStore,
    pub graph: SceneGraph,
    pub controller: TransformController,
    pub textures: TextureCache,
    pub map_slot: TextureSlot,
    pub session_listeners: Option<SessionListeners>,
    pub drag: Drag,
    pub space_pressed: bool,
    pub device_pixel_ratio: f64,
    pub toast: Option<Toast>,
}

impl AppState {
    pub fn show_toast(&mut self, text: &str) {
        self.toast = Some(Toast {
            text: text.to_string(),
            until: js_sys::Date::now() + TOAST_MS,
            expiry_scheduled: false,
        });
    }

    pub fn active_toast(&self) -> Option<&str> {
        self.toast
            .as_ref()
            .filter(|toast| toast.until > js_sys::Date::now())
            .map(|toast| toast.text.as_str())
    }
}
