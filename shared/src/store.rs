//! Application state containers. Each is owned by the app root and mutated
//! only through the action methods below.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::geometry::{clamp_or, MapPoint};
use crate::grid::{calibrate_grid, CalibrationState, RulerState};
use crate::ids::make_id;
use crate::normalize::{
    identifier, merge_scene_partial, normalize_scene, normalize_token, text, FogPatch, GridPatch,
    MapTransformPatch, PanPatch, ScenePatch, TokenPatch,
};
use crate::persist::{export_campaign_json, export_scene_json, Export};
use crate::scene::{FitMode, MapTransform, Pan, Scene, Token, MAX_GRID, MIN_GRID};

/// The committed scene. `revision` increases on every action so the host
/// can tell when to resync the graph and persist.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SceneStore {
    scene: Scene,
    revision: u64,
}

impl SceneStore {
    pub fn new(scene: Scene) -> Self {
        Self { scene, revision: 0 }
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn commit_value(&mut self, raw: &Value) {
        self.scene = normalize_scene(raw);
        self.revision += 1;
    }

    fn commit(&mut self, next: Scene) {
        let raw = serde_json::to_value(&next).unwrap_or_default();
        self.commit_value(&raw);
    }

    /// Merges an arbitrary partial document into the scene.
    pub fn apply_partial(&mut self, partial: &Value) {
        let merged = merge_scene_partial(&self.scene, partial);
        self.commit_value(&merged);
    }

    pub fn set_scene(&mut self, raw: &Value) {
        self.commit_value(raw);
    }

    pub fn update_scene(&mut self, patch: &ScenePatch) {
        self.apply_partial(&patch.to_value());
    }

    pub fn set_map(&mut self, map_url: &str) {
        self.update_scene(&ScenePatch {
            map_url: Some(map_url.to_string()),
            ..ScenePatch::default()
        });
    }

    pub fn set_pan_zoom(&mut self, pan: Option<Pan>, zoom: Option<f64>) {
        self.update_scene(&ScenePatch {
            pan: pan.map(|pan| PanPatch {
                x: Some(pan.x),
                y: Some(pan.y),
            }),
            zoom,
            ..ScenePatch::default()
        });
    }

    pub fn toggle_grid(&mut self) {
        self.set_grid(&GridPatch {
            enabled: Some(!self.scene.grid.enabled),
            ..GridPatch::default()
        });
    }

    pub fn toggle_fog(&mut self) {
        self.update_scene(&ScenePatch {
            fog: Some(FogPatch {
                enabled: Some(!self.scene.fog.enabled),
                ..FogPatch::default()
            }),
            ..ScenePatch::default()
        });
    }

    pub fn set_grid(&mut self, patch: &GridPatch) {
        self.update_scene(&ScenePatch {
            grid: Some(patch.clone()),
            ..ScenePatch::default()
        });
    }

    /// Clears offsets and rotation; size and styling stay.
    pub fn reset_grid_offsets(&mut self) {
        self.set_grid(&GridPatch {
            offset_x: Some(0.0),
            offset_y: Some(0.0),
            rotation_deg: Some(0.0),
            ..GridPatch::default()
        });
    }

    pub fn set_map_transform(&mut self, patch: &MapTransformPatch) {
        self.update_scene(&ScenePatch {
            map_transform: Some(patch.clone()),
            ..ScenePatch::default()
        });
    }

    pub fn reset_map_transform(&mut self) {
        self.set_map_transform(&MapTransformPatch::from(MapTransform::default()));
    }

    pub fn set_fit_mode(&mut self, fit_mode: FitMode) {
        self.update_scene(&ScenePatch {
            fit_mode: Some(fit_mode),
            ..ScenePatch::default()
        });
    }

    /// Normalizes and appends a token, returning its id. A colliding id is
    /// replaced with a fresh one.
    pub fn add_token(&mut self, raw: &Value) -> String {
        let mut token = normalize_token(raw);
        if self.scene.token(&token.id).is_some() {
            token.id = make_id();
        }
        let id = token.id.clone();
        let mut next = self.scene.clone();
        next.tokens.push(token);
        self.commit(next);
        debug!(token = %id, "token added");
        id
    }

    pub fn update_token(&mut self, id: &str, patch: &TokenPatch) -> bool {
        let Some(index) = self.scene.token_index(id) else {
            return false;
        };
        let mut next = self.scene.clone();
        next.tokens[index] = patch.apply(&next.tokens[index]);
        self.commit(next);
        true
    }

    pub fn remove_token(&mut self, id: &str) -> bool {
        let Some(index) = self.scene.token_index(id) else {
            return false;
        };
        let mut next = self.scene.clone();
        next.tokens.remove(index);
        self.commit(next);
        true
    }

    pub fn set_tokens(&mut self, tokens: Vec<Token>) {
        let mut next = self.scene.clone();
        next.tokens = tokens;
        self.commit(next);
    }

    pub fn import_scene(&mut self, raw: &Value) {
        self.set_scene(raw);
        info!(scene = %self.scene.id, tokens = self.scene.tokens.len(), "scene imported");
    }

    pub fn export_scene(&self) -> Export {
        export_scene_json(&self.scene)
    }

    pub fn set_notes(&mut self, notes_markdown: &str) {
        self.update_scene(&ScenePatch {
            notes_markdown: Some(notes_markdown.to_string()),
            ..ScenePatch::default()
        });
    }

    /// Adds a preset size, keeping the list sorted. Non-finite input is ignored.
    pub fn add_grid_preset(&mut self, value: f64) {
        if !value.is_finite() {
            return;
        }
        let size = value.clamp(MIN_GRID, MAX_GRID);
        if self.scene.grid_presets.contains(&size) {
            return;
        }
        let mut next = self.scene.clone();
        next.grid_presets.push(size);
        next.grid_presets.sort_by(f64::total_cmp);
        self.commit(next);
    }

    pub fn apply_grid_preset(&mut self, value: f64) {
        self.set_grid(&GridPatch {
            size: Some(clamp_or(Some(value), MIN_GRID, MAX_GRID, self.scene.grid.size)),
            ..GridPatch::default()
        });
    }

    /// False, with the scene untouched, when the input is degenerate.
    pub fn calibrate_grid(&mut self, start: MapPoint, end: MapPoint, cells: f64) -> bool {
        let Some(calibration) = calibrate_grid(start, end, cells) else {
            debug!(cells, "calibration ignored");
            return false;
        };
        self.set_grid(&GridPatch {
            size: Some(calibration.size),
            rotation_deg: Some(calibration.rotation_deg),
            offset_x: Some(calibration.offset_x),
            offset_y: Some(calibration.offset_y),
            ..GridPatch::default()
        });
        info!(size = calibration.size, rotation = calibration.rotation_deg, "grid calibrated");
        true
    }

    pub fn reset_scene(&mut self) {
        self.commit(Scene {
            id: make_id(),
            ..Scene::default()
        });
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LayoutMode {
    #[default]
    Desktop,
    Mobile,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SidebarTab {
    #[default]
    Map,
    Tokens,
    Scene,
    Notes,
}

/// The persisted part of the UI store.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct UiPreferences {
    pub mode: LayoutMode,
    pub active_tab: SidebarTab,
    pub sidebar_open: bool,
    pub show_map_transform_handles: bool,
    pub token_snap_to_grid: bool,
}

impl Default for UiPreferences {
    fn default() -> Self {
        Self {
            mode: LayoutMode::Desktop,
            active_tab: SidebarTab::Map,
            sidebar_open: true,
            show_map_transform_handles: false,
            token_snap_to_grid: true,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct UiStore {
    pub prefs: UiPreferences,
    pub show_token_inspector: bool,
    pub selected_token_id: Option<String>,
    pub show_settings: bool,
    pub show_help: bool,
    pub ruler_active: bool,
    pub ruler: RulerState,
    pub calibration: CalibrationState,
}

impl UiStore {
    pub fn from_preferences(prefs: UiPreferences) -> Self {
        Self {
            prefs,
            ..Self::default()
        }
    }

    pub fn set_mode(&mut self, mode: LayoutMode) {
        self.prefs.mode = mode;
    }

    pub fn set_active_tab(&mut self, tab: SidebarTab) {
        self.prefs.active_tab = tab;
    }

    pub fn toggle_sidebar(&mut self) {
        self.prefs.sidebar_open = !self.prefs.sidebar_open;
    }

    pub fn set_show_map_transform_handles(&mut self, show: bool) {
        self.prefs.show_map_transform_handles = show;
    }

    pub fn set_token_snap_to_grid(&mut self, snap: bool) {
        self.prefs.token_snap_to_grid = snap;
    }

    pub fn set_selected_token(&mut self, id: Option<String>) {
        self.selected_token_id = id;
    }

    pub fn open_token_inspector(&mut self, id: &str) {
        self.show_token_inspector = true;
        self.selected_token_id = Some(id.to_string());
    }

    pub fn close_token_inspector(&mut self) {
        self.show_token_inspector = false;
        self.selected_token_id = None;
    }

    pub fn toggle_settings(&mut self) {
        self.show_settings = !self.show_settings;
    }

    pub fn set_settings_open(&mut self, open: bool) {
        self.show_settings = open;
    }

    pub fn toggle_help(&mut self) {
        self.show_help = !self.show_help;
    }

    pub fn set_ruler_active(&mut self, active: bool) {
        self.ruler_active = active;
        if !active {
            self.ruler.end();
        }
    }

    pub fn toggle_ruler(&mut self) {
        self.set_ruler_active(!self.ruler_active);
    }

    pub fn begin_grid_calibration(&mut self) {
        self.ruler_active = false;
        self.ruler.end();
        self.calibration.begin();
    }

    pub fn cancel_grid_calibration(&mut self) {
        self.calibration.cancel();
    }

    /// Drops a selection whose token no longer exists.
    pub fn prune_selection(&mut self, scene: &Scene) {
        let stale = self
            .selected_token_id
            .as_deref()
            .is_some_and(|id| scene.token(id).is_none());
        if stale {
            self.close_token_inspector();
        }
    }

    pub fn reset_ui(&mut self) {
        *self = Self::default();
    }
}

pub const DEFAULT_CAMPAIGN_NAME: &str = "New campaign";
pub const IMPORTED_CAMPAIGN_NAME: &str = "Imported campaign";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Campaign {
    pub id: String,
    pub name: String,
    pub scenes: Vec<Scene>,
}

impl Campaign {
    pub fn scene(&self, id: &str) -> Option<&Scene> {
        self.scenes.iter().find(|scene| scene.id == id)
    }
}

/// Reads a campaign from arbitrary JSON. Non-objects yield `None`.
pub fn normalize_campaign(raw: &Value) -> Option<Campaign> {
    let campaign = raw.as_object()?;
    let scenes = campaign
        .get("scenes")
        .and_then(Value::as_array)
        .map(|scenes| {
            scenes
                .iter()
                .filter(|scene| !scene.is_null())
                .map(normalize_scene)
                .collect()
        })
        .unwrap_or_default();
    Some(Campaign {
        id: identifier(campaign.get("id")).unwrap_or_else(make_id),
        name: text(campaign.get("name"), IMPORTED_CAMPAIGN_NAME),
        scenes,
    })
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct CampaignStore {
    pub campaigns: Vec<Campaign>,
    pub active_campaign_id: Option<String>,
    pub last_scene_id: Option<String>,
}

impl CampaignStore {
    pub fn campaign(&self, id: &str) -> Option<&Campaign> {
        self.campaigns.iter().find(|campaign| campaign.id == id)
    }

    fn campaign_mut(&mut self, id: &str) -> Option<&mut Campaign> {
        self.campaigns.iter_mut().find(|campaign| campaign.id == id)
    }

    pub fn active_campaign(&self) -> Option<&Campaign> {
        self.campaign(self.active_campaign_id.as_deref()?)
    }

    pub fn create_campaign(&mut self, name: Option<&str>) -> String {
        let id = make_id();
        self.campaigns.push(Campaign {
            id: id.clone(),
            name: name
                .filter(|name| !name.is_empty())
                .unwrap_or(DEFAULT_CAMPAIGN_NAME)
                .to_string(),
            scenes: Vec::new(),
        });
        self.active_campaign_id = Some(id.clone());
        id
    }

    pub fn delete_campaign(&mut self, id: &str) {
        self.campaigns.retain(|campaign| campaign.id != id);
        if self.active_campaign_id.as_deref() == Some(id) {
            self.active_campaign_id = self.campaigns.first().map(|campaign| campaign.id.clone());
            self.last_scene_id = None;
        }
    }

    /// Deep copy with fresh scene ids.
    pub fn duplicate_campaign(&mut self, id: &str) -> Option<String> {
        let source = self.campaign(id)?;
        let duplicate = Campaign {
            id: make_id(),
            name: format!("{} (copy)", source.name),
            scenes: source
                .scenes
                .iter()
                .map(|scene| Scene {
                    id: make_id(),
                    ..scene.clone()
                })
                .collect(),
        };
        let duplicate_id = duplicate.id.clone();
        self.campaigns.push(duplicate);
        Some(duplicate_id)
    }

    pub fn set_active_campaign(&mut self, id: Option<&str>) {
        self.active_campaign_id = id.map(str::to_string);
    }

    /// Stores a copy of `scene` in the given (or active) campaign. The copy
    /// gets a fresh id unless `scene_id` names a scene to overwrite.
    pub fn save_scene_to_campaign(
        &mut self,
        scene: &Scene,
        campaign_id: Option<&str>,
        scene_id: Option<&str>,
    ) -> Option<String> {
        let target = campaign_id
            .map(str::to_string)
            .or_else(|| self.active_campaign_id.clone())?;
        let final_id = scene_id.map(str::to_string).unwrap_or_else(make_id);
        let copy = Scene {
            id: final_id.clone(),
            ..scene.clone()
        };
        let campaign = self.campaign_mut(&target)?;
        match campaign.scenes.iter_mut().find(|existing| existing.id == final_id) {
            Some(existing) => *existing = copy,
            None => campaign.scenes.push(copy),
        }
        self.active_campaign_id = Some(target);
        self.last_scene_id = Some(final_id.clone());
        Some(final_id)
    }

    pub fn load_scene_from_campaign(&mut self, campaign_id: &str, scene_id: &str) -> Option<Scene> {
        let scene = self.campaign(campaign_id)?.scene(scene_id)?.clone();
        self.active_campaign_id = Some(campaign_id.to_string());
        self.last_scene_id = Some(scene_id.to_string());
        Some(scene)
    }

    pub fn export_campaign(&self, id: &str) -> Option<Export> {
        self.campaign(id).map(export_campaign_json)
    }

    /// Adds an imported campaign, renaming its id on collision.
    pub fn import_campaign(&mut self, raw: &Value) -> Option<String> {
        let mut campaign = normalize_campaign(raw)?;
        if self.campaign(&campaign.id).is_some() {
            campaign.id = make_id();
        }
        let id = campaign.id.clone();
        info!(campaign = %id, scenes = campaign.scenes.len(), "campaign imported");
        self.campaigns.push(campaign);
        Some(id)
    }

    pub fn reset_campaigns(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::scene::DEFAULT_GRID_PRESETS;

    #[test]
    fn every_action_bumps_revision_and_keeps_invariants() {
        let mut store = SceneStore::default();
        store.set_grid(&GridPatch {
            size: Some(4000.0),
            ..GridPatch::default()
        });
        assert_eq!(store.revision(), 1);
        assert_eq!(store.scene().grid.size, MAX_GRID);
        store.set_map_transform(&MapTransformPatch {
            rotation_deg: Some(-90.0),
            ..MapTransformPatch::default()
        });
        assert_eq!(store.revision(), 2);
        assert_eq!(store.scene().map_transform.rotation_deg, 270.0);
    }

    #[test]
    fn set_grid_keeps_siblings() {
        let mut store = SceneStore::default();
        store.set_grid(&GridPatch {
            color: Some("#ffffff".to_string()),
            ..GridPatch::default()
        });
        store.set_grid(&GridPatch {
            opacity: Some(0.2),
            ..GridPatch::default()
        });
        assert_eq!(store.scene().grid.color, "#ffffff");
        assert_eq!(store.scene().grid.opacity, 0.2);
    }

    #[test]
    fn toggles_flip_flags() {
        let mut store = SceneStore::default();
        store.toggle_grid();
        store.toggle_fog();
        assert!(!store.scene().grid.enabled);
        assert!(store.scene().fog.enabled);
    }

    #[test]
    fn reset_grid_offsets_clears_rotation_too() {
        let mut store = SceneStore::default();
        assert!(store.calibrate_grid(MapPoint::new(3.0, 4.0), MapPoint::new(3.0, 104.0), 4.0));
        store.reset_grid_offsets();
        let grid = &store.scene().grid;
        assert_eq!((grid.offset_x, grid.offset_y, grid.rotation_deg), (0.0, 0.0, 0.0));
        assert_eq!(grid.size, 25.0);
    }

    #[test]
    fn tokens_are_added_updated_and_removed() {
        let mut store = SceneStore::default();
        let first = store.add_token(&json!({ "id": "t1", "name": "Orc" }));
        let second = store.add_token(&json!({ "id": "t1" }));
        assert_eq!(first, "t1");
        assert_ne!(second, "t1");
        assert!(store.update_token("t1", &TokenPatch::position(10.0, 20.0)));
        let token = store.scene().token("t1").unwrap();
        assert_eq!((token.x, token.y), (10.0, 20.0));
        assert_eq!(token.name, "Orc");
        assert!(!store.update_token("missing", &TokenPatch::default()));
        assert!(store.remove_token(&second));
        assert_eq!(store.scene().tokens.len(), 1);
    }

    #[test]
    fn grid_presets_stay_sorted_and_unique() {
        let mut store = SceneStore::default();
        store.add_grid_preset(32.0);
        store.add_grid_preset(32.0);
        store.add_grid_preset(f64::NAN);
        assert_eq!(store.scene().grid_presets, vec![25.0, 32.0, 50.0, 64.0, 100.0]);
        store.apply_grid_preset(32.0);
        assert_eq!(store.scene().grid.size, 32.0);
    }

    #[test]
    fn reset_scene_gets_fresh_id() {
        let mut store = SceneStore::default();
        store.set_notes("hello");
        store.reset_scene();
        assert_ne!(store.scene().id, Scene::default().id);
        assert_eq!(store.scene().grid_presets, DEFAULT_GRID_PRESETS.to_vec());
        assert_ne!(store.scene().notes_markdown, "hello");
    }

    #[test]
    fn ui_selection_and_ruler() {
        let mut ui = UiStore::default();
        ui.open_token_inspector("t1");
        assert_eq!(ui.selected_token_id.as_deref(), Some("t1"));
        ui.prune_selection(&Scene::default());
        assert!(ui.selected_token_id.is_none());
        assert!(!ui.show_token_inspector);

        ui.toggle_ruler();
        ui.ruler.begin(MapPoint::ORIGIN);
        ui.begin_grid_calibration();
        assert!(!ui.ruler_active);
        assert!(!ui.ruler.is_dragging());
        assert!(ui.calibration.is_collecting());
    }

    #[test]
    fn campaign_lifecycle() {
        let mut campaigns = CampaignStore::default();
        let id = campaigns.create_campaign(None);
        assert_eq!(campaigns.active_campaign_id.as_deref(), Some(id.as_str()));

        let scene = Scene::default();
        let saved = campaigns.save_scene_to_campaign(&scene, None, None).unwrap();
        assert_ne!(saved, scene.id);
        let again = campaigns.save_scene_to_campaign(&scene, None, Some(&saved)).unwrap();
        assert_eq!(again, saved);
        assert_eq!(campaigns.campaign(&id).unwrap().scenes.len(), 1);

        let loaded = campaigns.load_scene_from_campaign(&id, &saved).unwrap();
        assert_eq!(loaded.id, saved);
        assert_eq!(campaigns.last_scene_id.as_deref(), Some(saved.as_str()));

        let copy = campaigns.duplicate_campaign(&id).unwrap();
        let copied = campaigns.campaign(&copy).unwrap();
        assert_eq!(copied.name, "New campaign (copy)");
        assert_ne!(copied.scenes[0].id, saved);

        campaigns.delete_campaign(&id);
        assert_eq!(campaigns.active_campaign_id.as_deref(), Some(copy.as_str()));
        assert!(campaigns.last_scene_id.is_none());
    }

    #[test]
    fn save_without_campaign_is_refused() {
        let mut campaigns = CampaignStore::default();
        assert!(campaigns
            .save_scene_to_campaign(&Scene::default(), None, None)
            .is_none());
    }

    #[test]
    fn import_campaign_normalizes_scenes() {
        let mut campaigns = CampaignStore::default();
        let id = campaigns
            .import_campaign(&json!({
                "id": "c1",
                "scenes": [{ "id": "s1", "zoom": "99" }, null]
            }))
            .unwrap();
        let campaign = campaigns.campaign(&id).unwrap();
        assert_eq!(campaign.name, IMPORTED_CAMPAIGN_NAME);
        assert_eq!(campaign.scenes.len(), 1);
        assert_eq!(campaign.scenes[0].zoom, 10.0);

        let second = campaigns.import_campaign(&json!({ "id": "c1" })).unwrap();
        assert_ne!(second, "c1");
        assert!(campaigns.import_campaign(&json!(42)).is_none());
    }
}
