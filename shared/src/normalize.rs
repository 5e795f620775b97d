//! Total coercion of arbitrary JSON into valid scenes and tokens.
//!
//! Persisted or imported state is never trusted: every field is read
//! leniently, falls back to its default when missing, mistyped or NaN, and is
//! then clamped into range. None of these functions can fail.

use std::collections::HashSet;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::warn;

use crate::geometry::{clamp_or, normalize_angle};
use crate::ids::make_id;
use crate::scene::*;

/// Composite fields merged key-by-key instead of replaced wholesale.
const NESTED_FIELDS: [&str; 5] = ["grid", "fog", "units", "mapTransform", "pan"];

/// Numeric reading of a field. Literals beyond `f64` range read as missing.
pub(crate) fn number(value: Option<&Value>) -> Option<f64> {
    let number = match value? {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                None
            } else {
                trimmed.parse::<f64>().ok()
            }
        }
        Value::Bool(flag) => Some(if *flag { 1.0 } else { 0.0 }),
        _ => None,
    };
    number.filter(|number| number.is_finite())
}

/// A default-on flag is cleared only by an explicit `false`; a default-off
/// flag is set by any truthy value.
pub(crate) fn flag(value: Option<&Value>, default: bool) -> bool {
    if default {
        return !matches!(value, Some(Value::Bool(false)));
    }
    match value {
        Some(Value::Bool(flag)) => *flag,
        Some(Value::Number(number)) => number.as_f64().is_some_and(|v| v != 0.0 && !v.is_nan()),
        Some(Value::String(text)) => !text.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
        Some(Value::Null) | None => default,
    }
}

/// Non-empty strings only; anything else yields the default.
pub(crate) fn text(value: Option<&Value>, default: &str) -> String {
    match value {
        Some(Value::String(text)) if !text.is_empty() => text.clone(),
        _ => default.to_string(),
    }
}

pub(crate) fn identifier(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn finite_or(value: Option<&Value>, default: f64) -> f64 {
    number(value).filter(|v| v.is_finite()).unwrap_or(default)
}

fn angle(value: Option<&Value>) -> f64 {
    normalize_angle(finite_or(value, 0.0))
}

pub fn normalize_grid(raw: Option<&Value>) -> Grid {
    let defaults = Grid::default();
    let Some(grid) = raw.and_then(Value::as_object) else {
        return defaults;
    };
    Grid {
        enabled: flag(grid.get("enabled"), defaults.enabled),
        size: clamp_or(number(grid.get("size")), MIN_GRID, MAX_GRID, defaults.size),
        color: text(grid.get("color"), &defaults.color),
        opacity: clamp_or(number(grid.get("opacity")), 0.0, 1.0, defaults.opacity),
        offset_x: finite_or(grid.get("offsetX"), 0.0),
        offset_y: finite_or(grid.get("offsetY"), 0.0),
        rotation_deg: angle(grid.get("rotationDeg")),
    }
}

pub fn normalize_map_transform(raw: Option<&Value>) -> MapTransform {
    let Some(transform) = raw.and_then(Value::as_object) else {
        return MapTransform::default();
    };
    let scale = |key: &str| {
        clamp_or(
            number(transform.get(key)),
            MIN_TRANSFORM_SCALE,
            MAX_TRANSFORM_SCALE,
            1.0,
        )
    };
    MapTransform {
        x: finite_or(transform.get("x"), 0.0),
        y: finite_or(transform.get("y"), 0.0),
        scale_x: scale("scaleX"),
        scale_y: scale("scaleY"),
        rotation_deg: angle(transform.get("rotationDeg")),
        skew_x_deg: angle(transform.get("skewXDeg")),
        skew_y_deg: angle(transform.get("skewYDeg")),
    }
}

fn normalize_fog(raw: Option<&Value>) -> Fog {
    let defaults = Fog::default();
    let Some(fog) = raw.and_then(Value::as_object) else {
        return defaults;
    };
    Fog {
        enabled: flag(fog.get("enabled"), defaults.enabled),
        opacity: clamp_or(number(fog.get("opacity")), 0.0, 1.0, defaults.opacity),
    }
}

fn normalize_units(raw: Option<&Value>) -> Units {
    let defaults = Units::default();
    let Some(units) = raw.and_then(Value::as_object) else {
        return defaults;
    };
    Units {
        label: text(units.get("label"), &defaults.label),
        units_per_grid: clamp_or(
            number(units.get("unitsPerGrid")),
            MIN_UNITS_PER_GRID,
            MAX_UNITS_PER_GRID,
            defaults.units_per_grid,
        ),
    }
}

fn normalize_pan(raw: Option<&Value>) -> Pan {
    let pan = raw.and_then(Value::as_object);
    Pan {
        x: finite_or(pan.and_then(|pan| pan.get("x")), 0.0),
        y: finite_or(pan.and_then(|pan| pan.get("y")), 0.0),
    }
}

fn normalize_presets(raw: Option<&Value>) -> Vec<f64> {
    let Some(values) = raw.and_then(Value::as_array).filter(|values| !values.is_empty()) else {
        return DEFAULT_GRID_PRESETS.to_vec();
    };
    let mut presets: Vec<f64> = Vec::with_capacity(values.len());
    for value in values {
        let size = clamp_or(number(Some(value)), MIN_GRID, MAX_GRID, MIN_GRID);
        if !presets.contains(&size) {
            presets.push(size);
        }
    }
    presets
}

pub fn normalize_token(raw: &Value) -> Token {
    let empty = Map::new();
    let token = raw.as_object().unwrap_or(&empty);
    Token {
        id: identifier(token.get("id")).unwrap_or_else(make_id),
        name: text(token.get("name"), DEFAULT_TOKEN_NAME),
        image: text(token.get("image"), DEFAULT_TOKEN_IMAGE),
        size: clamp_or(
            number(token.get("size")),
            MIN_TOKEN_SIZE,
            MAX_TOKEN_SIZE,
            DEFAULT_TOKEN_SIZE,
        ),
        visible: flag(token.get("visible"), true),
        x: finite_or(token.get("x"), 0.0),
        y: finite_or(token.get("y"), 0.0),
        scale: clamp_or(
            number(token.get("scale")),
            MIN_TOKEN_SCALE,
            MAX_TOKEN_SCALE,
            1.0,
        ),
        rotation_deg: angle(token.get("rotationDeg")),
        locked: flag(token.get("locked"), false),
        metadata: token
            .get("metadata")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default(),
    }
}

fn normalize_tokens(raw: Option<&Value>) -> Vec<Token> {
    let Some(values) = raw.and_then(Value::as_array) else {
        return Vec::new();
    };
    let mut seen = HashSet::with_capacity(values.len());
    let mut tokens = Vec::with_capacity(values.len());
    for value in values {
        let mut token = normalize_token(value);
        if !seen.insert(token.id.clone()) {
            let fresh = make_id();
            warn!(duplicate = %token.id, fresh = %fresh, "reassigning duplicate token id");
            token.id = fresh.clone();
            seen.insert(fresh);
        }
        tokens.push(token);
    }
    tokens
}

pub fn normalize_scene(raw: &Value) -> Scene {
    let Some(scene) = raw.as_object() else {
        return Scene::default();
    };
    let defaults = Scene::default();
    let name = match scene.get("name") {
        Some(Value::String(name)) => name.clone(),
        _ => defaults.name,
    };
    let notes_markdown = match scene.get("notesMarkdown") {
        Some(Value::String(notes)) => notes.clone(),
        _ => defaults.notes_markdown,
    };
    Scene {
        id: identifier(scene.get("id"))
            .or_else(|| identifier(scene.get("sceneId")))
            .unwrap_or(defaults.id),
        name,
        map_url: text(scene.get("mapUrl"), &defaults.map_url),
        fit_mode: scene
            .get("fitMode")
            .and_then(Value::as_str)
            .and_then(FitMode::parse)
            .unwrap_or_default(),
        map_scale: clamp_or(
            number(scene.get("mapScale")),
            MIN_MAP_SCALE,
            MAX_MAP_SCALE,
            defaults.map_scale,
        ),
        pan: normalize_pan(scene.get("pan")),
        zoom: clamp_or(number(scene.get("zoom")), MIN_ZOOM, MAX_ZOOM, defaults.zoom),
        map_transform: normalize_map_transform(scene.get("mapTransform")),
        grid: normalize_grid(scene.get("grid")),
        fog: normalize_fog(scene.get("fog")),
        units: normalize_units(scene.get("units")),
        tokens: normalize_tokens(scene.get("tokens")),
        notes_markdown,
        grid_presets: normalize_presets(scene.get("gridPresets")),
    }
}

/// Shallow merge at the top level, key-by-key merge for composite fields.
/// The result is unnormalized; callers pass it through [`normalize_scene`].
pub fn merge_scene_partial(scene: &Scene, partial: &Value) -> Value {
    let mut merged = serde_json::to_value(scene).unwrap_or_default();
    let (Some(target), Some(partial)) = (merged.as_object_mut(), partial.as_object()) else {
        return merged;
    };
    for (key, value) in partial {
        if NESTED_FIELDS.contains(&key.as_str()) {
            match (target.get_mut(key).and_then(Value::as_object_mut), value) {
                (Some(existing), Value::Object(patch)) => {
                    for (field, field_value) in patch {
                        existing.insert(field.clone(), field_value.clone());
                    }
                    continue;
                }
                (Some(_), Value::Null) => {}
                (Some(_), _) => continue,
                (None, _) => {}
            }
        }
        target.insert(key.clone(), value.clone());
    }
    merged
}

#[derive(Serialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PanPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
}

#[derive(Serialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MapTransformPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale_x: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale_y: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotation_deg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skew_x_deg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skew_y_deg: Option<f64>,
}

impl From<MapTransform> for MapTransformPatch {
    fn from(transform: MapTransform) -> Self {
        Self {
            x: Some(transform.x),
            y: Some(transform.y),
            scale_x: Some(transform.scale_x),
            scale_y: Some(transform.scale_y),
            rotation_deg: Some(transform.rotation_deg),
            skew_x_deg: Some(transform.skew_x_deg),
            skew_y_deg: Some(transform.skew_y_deg),
        }
    }
}

#[derive(Serialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GridPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opacity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset_x: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset_y: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotation_deg: Option<f64>,
}

#[derive(Serialize, Clone, Debug, Default, PartialEq)]
pub struct FogPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opacity: Option<f64>,
}

#[derive(Serialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UnitsPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub units_per_grid: Option<f64>,
}

/// Typed partial scene update; serialises to the shape
/// [`merge_scene_partial`] consumes.
#[derive(Serialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScenePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub map_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fit_mode: Option<FitMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub map_scale: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pan: Option<PanPatch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zoom: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub map_transform: Option<MapTransformPatch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grid: Option<GridPatch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fog: Option<FogPatch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub units: Option<UnitsPatch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes_markdown: Option<String>,
}

impl ScenePatch {
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

#[derive(Serialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TokenPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visible: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotation_deg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locked: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl TokenPatch {
    pub fn position(x: f64, y: f64) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            ..Self::default()
        }
    }

    /// Applies the patch on top of `token` and re-normalizes. The id never changes.
    pub fn apply(&self, token: &Token) -> Token {
        let mut merged = serde_json::to_value(token).unwrap_or_default();
        if let (Some(target), Value::Object(patch)) =
            (merged.as_object_mut(), serde_json::to_value(self).unwrap_or_default())
        {
            for (key, value) in patch {
                target.insert(key, value);
            }
        }
        let mut next = normalize_token(&merged);
        next.id = token.id.clone();
        next
    }
}
