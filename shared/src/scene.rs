use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::geometry::{Affine, MapPoint};

pub const MIN_GRID: f64 = 8.0;
pub const MAX_GRID: f64 = 512.0;
pub const DEFAULT_GRID_PRESETS: [f64; 4] = [25.0, 50.0, 64.0, 100.0];

pub const MIN_ZOOM: f64 = 0.1;
pub const MAX_ZOOM: f64 = 10.0;
pub const MIN_MAP_SCALE: f64 = 0.1;
pub const MAX_MAP_SCALE: f64 = 10.0;
pub const MIN_TRANSFORM_SCALE: f64 = 0.05;
pub const MAX_TRANSFORM_SCALE: f64 = 20.0;
pub const MIN_UNITS_PER_GRID: f64 = 0.1;
pub const MAX_UNITS_PER_GRID: f64 = 1000.0;

pub const MIN_TOKEN_SIZE: f64 = 8.0;
pub const MAX_TOKEN_SIZE: f64 = 1024.0;
pub const MIN_TOKEN_SCALE: f64 = 0.05;
pub const MAX_TOKEN_SCALE: f64 = 10.0;

pub const DEFAULT_SCENE_ID: &str = "default-scene";
pub const DEFAULT_SCENE_NAME: &str = "New scene";
pub const DEFAULT_MAP_URL: &str = "/maps/default.jpg";
pub const DEFAULT_TOKEN_IMAGE: &str = "/icons/token-default.png";
pub const DEFAULT_TOKEN_NAME: &str = "Token";
pub const DEFAULT_TOKEN_SIZE: f64 = 64.0;
pub const DEFAULT_GRID_COLOR: &str = "#3b3b42";
pub const DEFAULT_NOTES: &str = "### Welcome to the table!\n\nAdd your notes here.\n";

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FitMode {
    #[default]
    Contain,
    Cover,
    Stretch,
}

impl FitMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "contain" => Some(Self::Contain),
            "cover" => Some(Self::Cover),
            "stretch" => Some(Self::Stretch),
            _ => None,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq)]
pub struct Pan {
    pub x: f64,
    pub y: f64,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MapTransform {
    pub x: f64,
    pub y: f64,
    pub scale_x: f64,
    pub scale_y: f64,
    pub rotation_deg: f64,
    pub skew_x_deg: f64,
    pub skew_y_deg: f64,
}

impl Default for MapTransform {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
            rotation_deg: 0.0,
            skew_x_deg: 0.0,
            skew_y_deg: 0.0,
        }
    }
}

impl MapTransform {
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }

    pub fn matrix(&self) -> Affine {
        Affine::from_parts(
            self.x,
            self.y,
            self.scale_x,
            self.scale_y,
            self.rotation_deg,
            self.skew_x_deg,
            self.skew_y_deg,
        )
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Grid {
    pub enabled: bool,
    pub size: f64,
    pub color: String,
    pub opacity: f64,
    pub offset_x: f64,
    pub offset_y: f64,
    pub rotation_deg: f64,
}

impl Default for Grid {
    fn default() -> Self {
        Self {
            enabled: true,
            size: 64.0,
            color: DEFAULT_GRID_COLOR.to_string(),
            opacity: 0.6,
            offset_x: 0.0,
            offset_y: 0.0,
            rotation_deg: 0.0,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct Fog {
    pub enabled: bool,
    pub opacity: f64,
}

impl Default for Fog {
    fn default() -> Self {
        Self {
            enabled: false,
            opacity: 0.5,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Units {
    pub label: String,
    pub units_per_grid: f64,
}

impl Default for Units {
    fn default() -> Self {
        Self {
            label: "ft".to_string(),
            units_per_grid: 5.0,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    pub id: String,
    pub name: String,
    pub image: String,
    pub size: f64,
    pub visible: bool,
    pub x: f64,
    pub y: f64,
    pub scale: f64,
    pub rotation_deg: f64,
    pub locked: bool,
    pub metadata: Map<String, Value>,
}

impl Token {
    pub fn new(id: String) -> Self {
        Self {
            id,
            name: DEFAULT_TOKEN_NAME.to_string(),
            image: DEFAULT_TOKEN_IMAGE.to_string(),
            size: DEFAULT_TOKEN_SIZE,
            visible: true,
            x: 0.0,
            y: 0.0,
            scale: 1.0,
            rotation_deg: 0.0,
            locked: false,
            metadata: Map::new(),
        }
    }

    pub fn position(&self) -> MapPoint {
        MapPoint::new(self.x, self.y)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    pub id: String,
    pub name: String,
    pub map_url: String,
    pub fit_mode: FitMode,
    pub map_scale: f64,
    pub pan: Pan,
    pub zoom: f64,
    pub map_transform: MapTransform,
    pub grid: Grid,
    pub fog: Fog,
    pub units: Units,
    pub tokens: Vec<Token>,
    pub notes_markdown: String,
    pub grid_presets: Vec<f64>,
}

impl Default for Scene {
    fn default() -> Self {
        Self {
            id: DEFAULT_SCENE_ID.to_string(),
            name: DEFAULT_SCENE_NAME.to_string(),
            map_url: DEFAULT_MAP_URL.to_string(),
            fit_mode: FitMode::Contain,
            map_scale: 1.0,
            pan: Pan::default(),
            zoom: 1.0,
            map_transform: MapTransform::default(),
            grid: Grid::default(),
            fog: Fog::default(),
            units: Units::default(),
            tokens: Vec::new(),
            notes_markdown: DEFAULT_NOTES.to_string(),
            grid_presets: DEFAULT_GRID_PRESETS.to_vec(),
        }
    }
}

impl Scene {
    pub fn token(&self, id: &str) -> Option<&Token> {
        self.tokens.iter().find(|token| token.id == id)
    }

    pub fn token_index(&self, id: &str) -> Option<usize> {
        self.tokens.iter().position(|token| token.id == id)
    }
}
