//! Host-independent half of image loading: size limits, downscale planning,
//! stale-load rejection and dropped-file ingestion.

use serde::Serialize;
use serde_json::{json, Value};

use crate::scene::{DEFAULT_MAP_URL, DEFAULT_TOKEN_IMAGE};

pub const DEFAULT_DEVICE_MAX_TEXTURE: u32 = 4096;
pub const MAP_MAX_SIDE_HINT: u32 = 8192;
pub const TOKEN_MAX_SIDE_HINT: u32 = 2048;
pub const FALLBACK_MAP_URL: &str = DEFAULT_MAP_URL;
pub const FALLBACK_TOKEN_IMAGE: &str = DEFAULT_TOKEN_IMAGE;

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TextureMeta {
    pub downscaled: bool,
    pub original_width: u32,
    pub original_height: u32,
    pub final_width: u32,
    pub final_height: u32,
}

/// Fits `width` x `height` inside `max_side`, keeping the aspect ratio.
pub fn plan_texture(width: u32, height: u32, max_side: u32) -> TextureMeta {
    let unchanged = TextureMeta {
        downscaled: false,
        original_width: width,
        original_height: height,
        final_width: width,
        final_height: height,
    };
    if max_side == 0 || (width <= max_side && height <= max_side) {
        return unchanged;
    }
    let scale = (f64::from(max_side) / f64::from(width)).min(f64::from(max_side) / f64::from(height));
    let fit = |side: u32| ((f64::from(side) * scale).floor() as u32).max(1);
    TextureMeta {
        downscaled: true,
        final_width: fit(width),
        final_height: fit(height),
        ..unchanged
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextureKind {
    Map,
    Token,
}

impl TextureKind {
    pub fn fallback(self) -> &'static str {
        match self {
            Self::Map => FALLBACK_MAP_URL,
            Self::Token => FALLBACK_TOKEN_IMAGE,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextureLimits {
    pub device_max: u32,
    pub map_hint: u32,
    pub token_hint: u32,
}

impl Default for TextureLimits {
    fn default() -> Self {
        Self {
            device_max: DEFAULT_DEVICE_MAX_TEXTURE,
            map_hint: MAP_MAX_SIDE_HINT,
            token_hint: TOKEN_MAX_SIDE_HINT,
        }
    }
}

impl TextureLimits {
    pub fn max_side(&self, kind: TextureKind) -> u32 {
        let hint = match kind {
            TextureKind::Map => self.map_hint,
            TextureKind::Token => self.token_hint,
        };
        self.device_max.min(hint)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadTicket {
    pub url: String,
}

/// Tracks which URL a texture slot currently wants.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TextureSlot {
    current: Option<String>,
}

impl TextureSlot {
    pub fn request(&mut self, url: &str) -> LoadTicket {
        self.current = Some(url.to_string());
        LoadTicket {
            url: url.to_string(),
        }
    }

    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// A finished load counts only if nobody asked for a different URL since.
    pub fn accepts(&self, ticket: &LoadTicket) -> bool {
        self.current.as_deref() == Some(ticket.url.as_str())
    }
    /// Whether a failed load may swap in the fallback. Untracked loads
    /// always may; a slot load only while it is still the wanted URL.
    pub fn falls_back(&self, ticket: Option<&LoadTicket>) -> bool {
        ticket.map_or(true, |ticket| self.accepts(ticket))
    }
}

pub fn downscale_warning(meta: &TextureMeta) -> Option<String> {
    meta.downscaled.then(|| {
        format!(
            "Map downscaled from {}x{} to {}x{} to fit the texture limit.",
            meta.original_width, meta.original_height, meta.final_width, meta.final_height
        )
    })
}

pub fn is_image_content_type(content_type: &str) -> bool {
    content_type
        .get(..6)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("image/"))
}

/// File name without its last extension.
pub fn token_name_from_file(file_name: &str) -> String {
    match file_name.rfind('.') {
        Some(dot) if dot + 1 < file_name.len() => file_name[..dot].to_string(),
        _ => file_name.to_string(),
    }
}

/// Raw token for a dropped image: at the map origin, one grid cell wide.
pub fn token_from_image(file_name: &str, image_url: &str, grid_size: f64) -> Value {
    json!({
        "name": token_name_from_file(file_name),
        "image": image_url,
        "size": grid_size,
        "visible": true,
        "x": 0,
        "y": 0,
        "scale": 1,
        "rotationDeg": 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize_token;

    #[test]
    fn small_images_are_untouched() {
        let meta = plan_texture(800, 600, 4096);
        assert!(!meta.downscaled);
        assert_eq!((meta.final_width, meta.final_height), (800, 600));
    }

    #[test]
    fn large_images_shrink_with_floor() {
        let meta = plan_texture(8192, 3001, 4096);
        assert!(meta.downscaled);
        assert_eq!(meta.final_width, 4096);
        assert_eq!(meta.final_height, 1500);
        assert_eq!(meta.original_width, 8192);
    }

    #[test]
    fn extreme_aspect_keeps_one_pixel() {
        let meta = plan_texture(100_000, 1, 2048);
        assert_eq!(meta.final_height, 1);
    }

    #[test]
    fn limits_take_the_smaller_side() {
        let limits = TextureLimits::default();
        assert_eq!(limits.max_side(TextureKind::Map), 4096);
        assert_eq!(limits.max_side(TextureKind::Token), 2048);
        let big = TextureLimits {
            device_max: 16384,
            ..TextureLimits::default()
        };
        assert_eq!(big.max_side(TextureKind::Map), 8192);
    }

    #[test]
    fn stale_tickets_are_rejected() {
        let mut slot = TextureSlot::default();
        let first = slot.request("a.png");
        let second = slot.request("b.png");
        assert!(!slot.accepts(&first));
        assert!(slot.accepts(&second));
    }

    #[test]
    fn superseded_failures_do_not_claim_the_fallback() {
        let mut slot = TextureSlot::default();
        let first = slot.request("a.png");
        let second = slot.request("b.png");
        assert!(!slot.falls_back(Some(&first)));
        assert_eq!(slot.current(), Some("b.png"));
        assert!(slot.falls_back(Some(&second)));
        assert!(slot.falls_back(None));
    }

    #[test]
    fn warning_only_when_downscaled() {
        assert!(downscale_warning(&plan_texture(10, 10, 4096)).is_none());
        let warning = downscale_warning(&plan_texture(8192, 8192, 4096)).unwrap();
        assert!(warning.contains("8192x8192"));
    }

    #[test]
    fn dropped_files_become_named_tokens() {
        assert!(is_image_content_type("image/png"));
        assert!(is_image_content_type("IMAGE/webp"));
        assert!(!is_image_content_type("text/plain"));
        assert!(!is_image_content_type(""));
        assert_eq!(token_name_from_file("goblin.boss.png"), "goblin.boss");
        assert_eq!(token_name_from_file("README"), "README");

        let token = normalize_token(&token_from_image("orc.png", "data:image/png;base64,AA", 50.0));
        assert_eq!(token.name, "orc");
        assert_eq!(token.size, 50.0);
        assert_eq!((token.x, token.y), (0.0, 0.0));
    }
}
