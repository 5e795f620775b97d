//! Browser image loading on top of the shared texture contract.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use tracing::{debug, warn};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{CanvasRenderingContext2d, HtmlCanvasElement, HtmlImageElement};

use tabletop_shared::graph::{Extent, TextureSizes};
use tabletop_shared::textures::{
    downscale_warning, plan_texture, TextureKind, TextureLimits, TextureMeta,
};

use crate::actions::refresh;
use crate::state::AppState;

pub enum TextureSource {
    Image(HtmlImageElement),
    Canvas(HtmlCanvasElement),
}

pub struct Texture {
    pub source: TextureSource,
    /// Size before any downscale. Scene coordinates are measured in these pixels.
    pub size: Extent,
    pub meta: TextureMeta,
}

impl Texture {
    pub fn draw(&self, ctx: &CanvasRenderingContext2d, x: f64, y: f64, width: f64, height: f64) {
        let _ = match &self.source {
            TextureSource::Image(image) => {
                ctx.draw_image_with_html_image_element_and_dw_and_dh(image, x, y, width, height)
            }
            TextureSource::Canvas(canvas) => {
                ctx.draw_image_with_html_canvas_element_and_dw_and_dh(canvas, x, y, width, height)
            }
        };
    }
}

#[derive(Default)]
pub struct TextureCache {
    loaded: HashMap<String, Texture>,
    pending: HashSet<String>,
    failed: HashMap<String, TextureKind>,
}

impl TextureCache {
    /// The texture for `url`, or its kind's fallback once `url` failed.
    pub fn get(&self, url: &str) -> Option<&Texture> {
        if let Some(texture) = self.loaded.get(url) {
            return Some(texture);
        }
        let kind = self.failed.get(url)?;
        self.loaded.get(kind.fallback())
    }

    pub fn needs_load(&self, url: &str) -> bool {
        !url.is_empty()
            && !self.loaded.contains_key(url)
            && !self.pending.contains(url)
            && !self.failed.contains_key(url)
    }
}

impl TextureSizes for TextureCache {
    fn texture_size(&self, url: &str) -> Option<Extent> {
        self.get(url).map(|texture| texture.size)
    }
}

fn build_texture(
    image: &HtmlImageElement,
    kind: TextureKind,
    limits: TextureLimits,
) -> Result<Texture, JsValue> {
    let meta = plan_texture(
        image.natural_width(),
        image.natural_height(),
        limits.max_side(kind),
    );
    let size = Extent::new(
        f64::from(meta.original_width),
        f64::from(meta.original_height),
    );
    if !meta.downscaled {
        return Ok(Texture {
            source: TextureSource::Image(image.clone()),
            size,
            meta,
        });
    }
    let document = web_sys::window()
        .and_then(|window| window.document())
        .ok_or_else(|| JsValue::from_str("Missing document"))?;
    let canvas: HtmlCanvasElement = document.create_element("canvas")?.dyn_into()?;
    canvas.set_width(meta.final_width);
    canvas.set_height(meta.final_height);
    let ctx = canvas
        .get_context("2d")?
        .ok_or_else(|| JsValue::from_str("Missing canvas context"))?
        .dyn_into::<CanvasRenderingContext2d>()?;
    ctx.draw_image_with_html_image_element_and_dw_and_dh(
        image,
        0.0,
        0.0,
        f64::from(meta.final_width),
        f64::from(meta.final_height),
    )?;
    Ok(Texture {
        source: TextureSource::Canvas(canvas),
        size,
        meta,
    })
}

/// Starts loading `url` unless it is cached or already in flight. A map
/// load that finishes after another map was requested is dropped.
pub fn request_texture(app: &Rc<RefCell<AppState>>, url: &str, kind: TextureKind) {
    let (ticket, limits) = {
        let mut state = app.borrow_mut();
        let ticket = (kind == TextureKind::Map).then(|| state.map_slot.request(url));
        if !state.textures.needs_load(url) {
            return;
        }
        state.textures.pending.insert(url.to_string());
        (ticket, state.config.texture_limits())
    };
    let image = match HtmlImageElement::new() {
        Ok(image) => image,
        Err(_) => return,
    };

    let error_ticket = ticket.clone();
    let load_app = app.clone();
    let load_image = image.clone();
    let load_url = url.to_string();
    let onload = Closure::<dyn FnMut()>::new(move || {
        {
            let mut state = load_app.borrow_mut();
            state.textures.pending.remove(&load_url);
            if let Some(ticket) = &ticket {
                if !state.map_slot.accepts(ticket) {
                    debug!(url = %load_url, "dropping stale map load");
                    return;
                }
            }
            let texture = match build_texture(&load_image, kind, limits) {
                Ok(texture) => texture,
                Err(err) => {
                    warn!(url = %load_url, ?err, "could not prepare texture");
                    state.textures.failed.insert(load_url.clone(), kind);
                    return;
                }
            };
            if let Some(warning) = downscale_warning(&texture.meta) {
                warn!(url = %load_url, "{warning}");
                if kind == TextureKind::Map {
                    state.show_toast(&warning);
                }
            }
            debug!(url = %load_url, width = texture.size.width, height = texture.size.height, "texture ready");
            state.textures.loaded.insert(load_url.clone(), texture);
        }
        refresh(&load_app);
    });

    let error_app = app.clone();
    let error_url = url.to_string();
    let onerror = Closure::<dyn FnMut()>::new(move || {
        let wants_fallback = {
            let mut state = error_app.borrow_mut();
            state.textures.pending.remove(&error_url);
            state.textures.failed.insert(error_url.clone(), kind);
            state.map_slot.falls_back(error_ticket.as_ref())
        };
        if !wants_fallback {
            debug!(url = %error_url, "stale map failed, keeping the newer request");
        } else if error_url != kind.fallback() {
            warn!(url = %error_url, "image failed to load, using fallback");
            request_texture(&error_app, kind.fallback(), kind);
        }
        refresh(&error_app);
    });

    image.set_onload(Some(onload.as_ref().unchecked_ref()));
    image.set_onerror(Some(onerror.as_ref().unchecked_ref()));
    onload.forget();
    onerror.forget();
    image.set_src(url);
}
