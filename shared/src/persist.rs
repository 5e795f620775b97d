//! Export/import documents and the versioned local-storage envelopes.
//!
//! Stored values look like `{"state": ..., "version": n}`. Each loader
//! accepts the previous version's shape and always returns a valid current
//! value; only an absent payload falls back to defaults.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::ImportError;
use crate::normalize::{flag, identifier, normalize_scene};
use crate::scene::Scene;
use crate::store::{normalize_campaign, Campaign, CampaignStore, LayoutMode, SidebarTab, UiPreferences};

pub const SCENE_STORAGE_KEY: &str = "tabletop-scene";
pub const UI_STORAGE_KEY: &str = "tabletop-ui";
pub const CAMPAIGNS_STORAGE_KEY: &str = "tabletop-campaigns";

pub const SCENE_STATE_VERSION: u32 = 2;
pub const UI_STATE_VERSION: u32 = 1;
pub const CAMPAIGNS_STATE_VERSION: u32 = 1;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Envelope<T> {
    pub state: T,
    pub version: u32,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PersistedScene {
    pub scene: Scene,
}

/// A download-ready document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Export {
    pub filename: String,
    pub json: String,
}

/// `<name>.json` with path separators and control characters removed.
pub fn export_filename(name: &str, fallback: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|ch| !matches!(ch, '/' | '\\') && !ch.is_control())
        .collect();
    let cleaned = cleaned.trim();
    let stem = if cleaned.is_empty() { fallback } else { cleaned };
    format!("{stem}.json")
}

pub fn export_scene_json(scene: &Scene) -> Export {
    Export {
        filename: export_filename(&scene.name, "scene"),
        json: serde_json::to_string_pretty(scene).unwrap_or_default(),
    }
}

pub fn export_campaign_json(campaign: &Campaign) -> Export {
    Export {
        filename: export_filename(&campaign.name, "campaign"),
        json: serde_json::to_string_pretty(campaign).unwrap_or_default(),
    }
}

pub fn parse_json(text: &str) -> Result<Value, ImportError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ImportError::Empty);
    }
    Ok(serde_json::from_str(trimmed)?)
}

pub fn parse_scene_text(text: &str) -> Result<Scene, ImportError> {
    parse_json(text).map(|raw| normalize_scene(&raw))
}

/// `Ok(None)` when the document is JSON but not a campaign object.
pub fn parse_campaign_text(text: &str) -> Result<Option<Campaign>, ImportError> {
    parse_json(text).map(|raw| normalize_campaign(&raw))
}

fn open_envelope(key: &str, text: Option<&str>) -> (Option<Value>, u32) {
    let Some(text) = text else {
        return (None, 0);
    };
    let raw: Value = match serde_json::from_str(text) {
        Ok(raw) => raw,
        Err(err) => {
            warn!(key, %err, "discarding unreadable persisted state");
            return (None, 0);
        }
    };
    let version = raw
        .get("version")
        .and_then(Value::as_u64)
        .and_then(|version| u32::try_from(version).ok())
        .unwrap_or(0);
    let state = match raw {
        Value::Object(mut object) if object.contains_key("state") => object.remove("state"),
        other => Some(other),
    };
    (state.filter(|state| !state.is_null()), version)
}

fn seal<T: Serialize>(state: T, version: u32) -> String {
    serde_json::to_string(&Envelope { state, version }).unwrap_or_default()
}

/// Versions before 1 stored the bare scene; later ones wrap it as `{scene}`.
pub fn migrate_scene(state: Option<&Value>, version: u32) -> Scene {
    let Some(state) = state else {
        return Scene::default();
    };
    if version < SCENE_STATE_VERSION {
        debug!(version, "migrating persisted scene");
    }
    match state.get("scene") {
        Some(scene) if version >= 1 && !scene.is_object() => {
            warn!(
                version,
                kind = json_kind(scene),
                "persisted scene is not an object, using defaults"
            );
            Scene::default()
        }
        Some(scene) if version >= 1 => normalize_scene(scene),
        Some(scene) if scene.is_object() => normalize_scene(scene),
        _ => normalize_scene(state),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

pub fn migrate_ui(state: Option<&Value>, _version: u32) -> UiPreferences {
    let defaults = UiPreferences::default();
    let Some(state) = state.and_then(Value::as_object) else {
        return defaults;
    };
    let parse = |key: &str| state.get(key).cloned();
    UiPreferences {
        mode: parse("mode")
            .and_then(|value| serde_json::from_value::<LayoutMode>(value).ok())
            .unwrap_or(defaults.mode),
        active_tab: parse("activeTab")
            .and_then(|value| serde_json::from_value::<SidebarTab>(value).ok())
            .unwrap_or(defaults.active_tab),
        sidebar_open: flag(state.get("sidebarOpen"), defaults.sidebar_open),
        show_map_transform_handles: flag(
            state.get("showMapTransformHandles"),
            defaults.show_map_transform_handles,
        ),
        token_snap_to_grid: flag(state.get("tokenSnapToGrid"), defaults.token_snap_to_grid),
    }
}

pub fn migrate_campaigns(state: Option<&Value>, _version: u32) -> CampaignStore {
    let Some(state) = state.and_then(Value::as_object) else {
        return CampaignStore::default();
    };
    let campaigns: Vec<Campaign> = state
        .get("campaigns")
        .and_then(Value::as_array)
        .map(|campaigns| campaigns.iter().filter_map(normalize_campaign).collect())
        .unwrap_or_default();
    let active_campaign_id = identifier(state.get("activeCampaignId"))
        .filter(|id| campaigns.iter().any(|campaign| campaign.id == *id));
    CampaignStore {
        campaigns,
        active_campaign_id,
        last_scene_id: identifier(state.get("lastSceneId")),
    }
}

pub fn load_scene(text: Option<&str>) -> Scene {
    let (state, version) = open_envelope(SCENE_STORAGE_KEY, text);
    migrate_scene(state.as_ref(), version)
}

pub fn load_ui(text: Option<&str>) -> UiPreferences {
    let (state, version) = open_envelope(UI_STORAGE_KEY, text);
    migrate_ui(state.as_ref(), version)
}

pub fn load_campaigns(text: Option<&str>) -> CampaignStore {
    let (state, version) = open_envelope(CAMPAIGNS_STORAGE_KEY, text);
    migrate_campaigns(state.as_ref(), version)
}

pub fn save_scene(scene: &Scene) -> String {
    seal(
        PersistedScene {
            scene: scene.clone(),
        },
        SCENE_STATE_VERSION,
    )
}

pub fn save_ui(prefs: &UiPreferences) -> String {
    seal(prefs, UI_STATE_VERSION)
}

pub fn save_campaigns(store: &CampaignStore) -> String {
    seal(store, CAMPAIGNS_STATE_VERSION)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn filenames_fall_back_and_drop_separators() {
        assert_eq!(export_filename("Crypt", "scene"), "Crypt.json");
        assert_eq!(export_filename("", "scene"), "scene.json");
        assert_eq!(export_filename("  ", "campaign"), "campaign.json");
        assert_eq!(export_filename("a/b\\c", "scene"), "abc.json");
    }

    #[test]
    fn blank_and_broken_imports_error() {
        assert!(matches!(parse_scene_text("  "), Err(ImportError::Empty)));
        assert!(matches!(parse_scene_text("{oops"), Err(ImportError::Json(_))));
        assert_eq!(parse_scene_text("42").unwrap(), Scene::default());
    }

    #[test]
    fn campaign_text_requires_an_object() {
        assert!(parse_campaign_text("[1]").unwrap().is_none());
        let campaign = parse_campaign_text(r#"{"name":"Saga","scenes":[{}]}"#)
            .unwrap()
            .unwrap();
        assert_eq!(campaign.name, "Saga");
        assert_eq!(campaign.scenes.len(), 1);
    }

    #[test]
    fn scene_envelope_round_trips() {
        let mut scene = Scene::default();
        scene.name = "Stored".to_string();
        scene.grid.offset_x = 0.1 + 0.2;
        let loaded = load_scene(Some(&save_scene(&scene)));
        assert_eq!(loaded, scene);
    }

    #[test]
    fn legacy_scene_shapes_migrate() {
        let bare = json!({ "state": { "name": "Bare", "zoom": 3 }, "version": 0 });
        let scene = load_scene(Some(&bare.to_string()));
        assert_eq!(scene.name, "Bare");
        assert_eq!(scene.zoom, 3.0);

        let wrapped = json!({ "state": { "scene": { "name": "Wrapped" } }, "version": 1 });
        assert_eq!(load_scene(Some(&wrapped.to_string())).name, "Wrapped");

        let unversioned = json!({ "name": "Loose" });
        assert_eq!(load_scene(Some(&unversioned.to_string())).name, "Loose");
    }

    #[test]
    fn missing_or_unreadable_state_yields_defaults() {
        assert_eq!(load_scene(None), Scene::default());
        assert_eq!(load_scene(Some("not json")), Scene::default());
        assert_eq!(load_ui(None), UiPreferences::default());
        assert_eq!(load_campaigns(None), CampaignStore::default());
    }

    #[test]
    fn ui_preferences_tolerate_bad_fields() {
        let stored = json!({
            "state": { "mode": "tablet", "activeTab": "notes", "sidebarOpen": false, "showHelp": true },
            "version": 0
        });
        let prefs = load_ui(Some(&stored.to_string()));
        assert_eq!(prefs.mode, LayoutMode::Desktop);
        assert_eq!(prefs.active_tab, SidebarTab::Notes);
        assert!(!prefs.sidebar_open);

        let round = load_ui(Some(&save_ui(&prefs)));
        assert_eq!(round, prefs);
    }

    #[test]
    fn campaigns_drop_dangling_active_id() {
        let stored = json!({
            "state": {
                "campaigns": [{ "id": "c1", "name": "One", "scenes": [] }, 7],
                "activeCampaignId": "gone",
                "lastSceneId": "s9"
            },
            "version": 1
        });
        let store = load_campaigns(Some(&stored.to_string()));
        assert_eq!(store.campaigns.len(), 1);
        assert!(store.active_campaign_id.is_none());
        assert_eq!(store.last_scene_id.as_deref(), Some("s9"));
        assert_eq!(load_campaigns(Some(&save_campaigns(&store))), store);
    }
}
