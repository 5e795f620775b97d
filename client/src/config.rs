use tabletop_shared::textures::TextureLimits;

/// Settings read from the page URL, e.g. `?debug=1&maxTexture=2048`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ClientConfig {
    pub debug: bool,
    pub max_texture: Option<u32>,
}

fn truthy(value: &str) -> bool {
    matches!(value, "1" | "true")
}

impl ClientConfig {
    pub fn from_search(search: &str) -> Self {
        let mut config = Self::default();
        for pair in search.trim_start_matches('?').split('&') {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            match key {
                "debug" | "log" => config.debug |= truthy(value),
                "maxTexture" => {
                    config.max_texture = value.parse::<u32>().ok().filter(|side| *side > 0);
                }
                _ => {}
            }
        }
        config
    }

    pub fn from_window(window: &web_sys::Window) -> Self {
        let search = window.location().search().ok().unwrap_or_default();
        Self::from_search(&search)
    }

    pub fn texture_limits(&self) -> TextureLimits {
        let defaults = TextureLimits::default();
        TextureLimits {
            device_max: self.max_texture.unwrap_or(defaults.device_max),
            ..defaults
        }
    }
}
