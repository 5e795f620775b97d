//! Import, export and storage round trips through the public store API.

use serde_json::json;
use tabletop_shared::persist::{
    export_campaign_json, load_campaigns, load_scene, load_ui, parse_campaign_text,
    parse_scene_text, save_campaigns, save_scene, save_ui,
};
use tabletop_shared::store::{LayoutMode, SidebarTab};
use tabletop_shared::{CampaignStore, Scene, SceneStore, TokenPatch, UiPreferences};

fn one_token_scene() -> SceneStore {
    let mut store = SceneStore::default();
    store.set_scene(&json!({ "id": "crypt", "name": "Crypt" }));
    let id = store.add_token(&json!({
        "id": "t-ghoul",
        "name": "Ghoul",
        "x": 137.25,
        "y": -42.125,
        "size": 48,
        "scale": 1.75,
        "rotationDeg": 215,
        "locked": true,
        "metadata": { "hp": 22, "tags": ["undead"] }
    }));
    assert_eq!(id, "t-ghoul");
    store
}

#[test]
fn single_token_survives_export_and_import() {
    let store = one_token_scene();
    let exported = store.export_scene();
    assert_eq!(exported.filename, "Crypt.json");

    let mut restored = SceneStore::default();
    restored.import_scene(&serde_json::from_str(&exported.json).unwrap());
    let token = &restored.scene().tokens[0];
    assert_eq!(token.id, "t-ghoul");
    assert_eq!(token.x, 137.25);
    assert_eq!(token.y, -42.125);
    assert_eq!(token.size, 48.0);
    assert_eq!(token.scale, 1.75);
    assert_eq!(token.rotation_deg, 215.0);
    assert!(token.locked);
    assert_eq!(token.metadata["hp"], json!(22));
    assert_eq!(restored.scene(), store.scene());
}

#[test]
fn imported_tokens_keep_their_ids_after_edits() {
    let store = one_token_scene();
    let mut restored = SceneStore::default();
    restored.import_scene(&serde_json::to_value(store.scene()).unwrap());
    restored.update_token(
        "t-ghoul",
        &TokenPatch {
            locked: Some(false),
            ..TokenPatch::position(1.0, 2.0)
        },
    );
    let token = restored.scene().token("t-ghoul").unwrap();
    assert_eq!((token.x, token.y), (1.0, 2.0));
    assert!(!token.locked);
}

#[test]
fn hostile_scene_text_is_repaired() {
    let scene = parse_scene_text(
        r#"{
            "zoom": "huge",
            "grid": { "size": -4, "offsetX": "NaN", "rotationDeg": 725 },
            "mapTransform": { "scaleX": 0, "skewXDeg": -30 },
            "tokens": [{ "id": "a" }, { "id": "a" }, null, 3],
            "gridPresets": []
        }"#,
    )
    .unwrap();
    assert_eq!(scene.zoom, 1.0);
    assert_eq!(scene.grid.size, 8.0);
    assert_eq!(scene.grid.offset_x, 0.0);
    assert_eq!(scene.grid.rotation_deg, 5.0);
    assert_eq!(scene.map_transform.scale_x, 0.05);
    assert_eq!(scene.map_transform.skew_x_deg, 330.0);
    assert_eq!(scene.grid_presets, Scene::default().grid_presets);
    let ids: Vec<&str> = scene.tokens.iter().map(|token| token.id.as_str()).collect();
    assert_eq!(ids[0], "a");
    assert!(ids[1..].iter().all(|id| *id != "a"));
}

#[test]
fn campaign_round_trips_through_export() {
    let scene = one_token_scene().scene().clone();
    let mut campaigns = CampaignStore::default();
    let campaign_id = campaigns.create_campaign(Some("Saga"));
    let scene_id = campaigns
        .save_scene_to_campaign(&scene, None, None)
        .unwrap();
    assert_ne!(scene_id, scene.id);

    let exported = campaigns.export_campaign(&campaign_id).unwrap();
    assert_eq!(exported.filename, "Saga.json");
    let parsed = parse_campaign_text(&exported.json).unwrap().unwrap();
    assert_eq!(&parsed, campaigns.campaign(&campaign_id).unwrap());

    let imported_id = campaigns
        .import_campaign(&serde_json::from_str(&exported.json).unwrap())
        .unwrap();
    assert_ne!(imported_id, campaign_id);
    assert_eq!(campaigns.campaigns.len(), 2);
    let loaded = campaigns
        .load_scene_from_campaign(&imported_id, &scene_id)
        .unwrap();
    assert_eq!(loaded.tokens, scene.tokens);
    assert_eq!(campaigns.active_campaign_id.as_deref(), Some(imported_id.as_str()));
}

#[test]
fn saving_without_a_campaign_is_a_no_op() {
    let mut campaigns = CampaignStore::default();
    assert!(campaigns
        .save_scene_to_campaign(&Scene::default(), None, None)
        .is_none());
    assert!(campaigns.campaigns.is_empty());
    assert!(campaigns.import_campaign(&json!("nope")).is_none());
}

#[test]
fn duplicate_gets_fresh_scene_ids() {
    let mut campaigns = CampaignStore::default();
    let id = campaigns.create_campaign(Some("Main"));
    campaigns.save_scene_to_campaign(&Scene::default(), Some(id.as_str()), Some("s1"));
    let copy_id = campaigns.duplicate_campaign(&id).unwrap();
    let copy = campaigns.campaign(&copy_id).unwrap();
    assert_eq!(copy.name, "Main (copy)");
    assert_eq!(copy.scenes.len(), 1);
    assert_ne!(copy.scenes[0].id, "s1");
    assert_eq!(export_campaign_json(copy).filename, "Main (copy).json");
}

#[test]
fn storage_round_trips_all_three_stores() {
    let scene = one_token_scene().scene().clone();
    assert_eq!(load_scene(Some(&save_scene(&scene))), scene);

    let prefs = UiPreferences {
        mode: LayoutMode::Mobile,
        active_tab: SidebarTab::Tokens,
        sidebar_open: false,
        show_map_transform_handles: true,
        token_snap_to_grid: false,
    };
    assert_eq!(load_ui(Some(&save_ui(&prefs))), prefs);

    let mut campaigns = CampaignStore::default();
    campaigns.create_campaign(None);
    campaigns.save_scene_to_campaign(&scene, None, Some("kept"));
    assert_eq!(load_campaigns(Some(&save_campaigns(&campaigns))), campaigns);
}

#[test]
fn legacy_bare_scene_is_migrated() {
    let legacy = json!({
        "state": {
            "name": "Old table",
            "tokens": [{ "id": "t1", "x": 3, "y": 4, "rotationDeg": -90 }]
        },
        "version": 0
    });
    let scene = load_scene(Some(&legacy.to_string()));
    assert_eq!(scene.name, "Old table");
    assert_eq!(scene.tokens[0].rotation_deg, 270.0);

    let resaved = save_scene(&scene);
    let envelope: serde_json::Value = serde_json::from_str(&resaved).unwrap();
    assert_eq!(envelope["version"], json!(2));
    assert_eq!(envelope["state"]["scene"]["name"], json!("Old table"));
}

#[test]
fn out_of_range_numbers_fall_back_to_defaults() {
    let scene = parse_scene_text(
        r#"{ "name": "Big", "zoom": 1e400, "grid": { "size": -1e400, "offsetX": 1e999 } }"#,
    )
    .unwrap();
    assert_eq!(scene.name, "Big");
    assert_eq!(scene.zoom, 1.0);
    assert_eq!(scene.grid.size, 64.0);
    assert_eq!(scene.grid.offset_x, 0.0);
}

#[test]
fn stored_scene_with_huge_number_is_kept() {
    let scene = load_scene(Some(
        r#"{"state":{"scene":{"name":"Kept","zoom":1e400,"tokens":[{"id":"t1","x":1e400}]}},"version":2}"#,
    ));
    assert_eq!(scene.name, "Kept");
    assert_eq!(scene.zoom, 1.0);
    assert_eq!(scene.tokens[0].id, "t1");
    assert_eq!(scene.tokens[0].x, 0.0);
}

#[test]
fn null_scene_in_current_envelope_yields_defaults() {
    let scene = load_scene(Some(r#"{"state":{"scene":null},"version":2}"#));
    assert_eq!(scene.name, Scene::default().name);
    assert!(scene.tokens.is_empty());

    let listed = load_scene(Some(r#"{"state":{"scene":[1,2]},"version":2}"#));
    assert!(listed.tokens.is_empty());
}
