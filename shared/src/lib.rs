pub mod error;
pub mod geometry;
pub mod gizmo;
pub mod graph;
pub mod grid;
pub mod ids;
pub mod keys;
pub mod normalize;
pub mod persist;
pub mod scene;
pub mod session;
pub mod store;
pub mod textures;

pub use error::{ImportError, SessionRejected};
pub use geometry::{Affine, LocalPoint, MapPoint, ScreenPoint, WorldPoint};
pub use graph::{apply_scene_to_graph, Camera, Extent, SceneGraph, TextureSizes, TokenNode};
pub use normalize::{
    merge_scene_partial, normalize_scene, normalize_token, GridPatch, MapTransformPatch,
    ScenePatch, TokenPatch,
};
pub use scene::{FitMode, Fog, Grid, MapTransform, Pan, Scene, Token, Units};
pub use session::{
    gesture_for_handle, GestureKind, HandleKey, Modifiers, SessionTarget, TransformController,
};
pub use store::{Campaign, CampaignStore, SceneStore, UiPreferences, UiStore};
