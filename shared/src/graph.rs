//! Retained scene graph mirrored from the committed scene.
//!
//! Layer order, bottom to top: map sprite, grid, fog (all inside the map
//! group), tokens, ruler. The renderer only reads this structure; the only
//! writer is [`apply_scene_to_graph`].

use std::collections::HashMap;

use crate::geometry::{Affine, LocalPoint, MapPoint, ScreenPoint, WorldPoint};
use crate::scene::{Fog, FitMode, Grid, MapTransform, Pan, Scene, Token, MAX_TRANSFORM_SCALE, MIN_TRANSFORM_SCALE};

pub const MIN_VIEW_ZOOM: f64 = 0.2;
pub const MAX_VIEW_ZOOM: f64 = 6.0;
pub const WHEEL_ZOOM_IN: f64 = 1.1;
pub const WHEEL_ZOOM_OUT: f64 = 0.9;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Extent {
    pub width: f64,
    pub height: f64,
}

impl Extent {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }

    pub fn center(&self) -> ScreenPoint {
        ScreenPoint::new(self.width / 2.0, self.height / 2.0)
    }
}

/// Pan and zoom applied uniformly to everything on the canvas.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
    pub pan: Pan,
    pub zoom: f64,
    pub map_scale: f64,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            pan: Pan::default(),
            zoom: 1.0,
            map_scale: 1.0,
        }
    }
}

impl Camera {
    pub fn from_scene(scene: &Scene) -> Self {
        Self {
            pan: scene.pan,
            zoom: scene.zoom,
            map_scale: scene.map_scale,
        }
    }

    pub fn scale(&self) -> f64 {
        self.zoom * self.map_scale
    }

    pub fn matrix(&self) -> Affine {
        let scale = self.scale();
        Affine::translate(self.pan.x, self.pan.y).multiply(&Affine::scale(scale, scale))
    }

    pub fn screen_to_world(&self, point: ScreenPoint) -> WorldPoint {
        let scale = self.scale();
        WorldPoint::new((point.x - self.pan.x) / scale, (point.y - self.pan.y) / scale)
    }

    pub fn world_to_screen(&self, point: WorldPoint) -> ScreenPoint {
        let scale = self.scale();
        ScreenPoint::new(point.x * scale + self.pan.x, point.y * scale + self.pan.y)
    }

    /// Zooms by `factor` while keeping the world point under `anchor` fixed.
    pub fn zoom_at(&self, anchor: ScreenPoint, factor: f64, min: f64, max: f64) -> Camera {
        let zoom = (self.zoom * factor).clamp(min, max);
        let world = self.screen_to_world(anchor);
        let scale = zoom * self.map_scale;
        Camera {
            pan: Pan {
                x: anchor.x - world.x * scale,
                y: anchor.y - world.y * scale,
            },
            zoom,
            map_scale: self.map_scale,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TokenNode {
    pub id: String,
    pub image: String,
    /// Texture size; the token's own square until the image has loaded.
    pub intrinsic: Extent,
    pub position: MapPoint,
    pub size: f64,
    pub scale: f64,
    pub rotation_deg: f64,
    pub visible: bool,
    pub locked: bool,
}

impl TokenNode {
    fn from_token(token: &Token, intrinsic: Option<Extent>) -> Self {
        Self {
            id: token.id.clone(),
            image: token.image.clone(),
            intrinsic: intrinsic
                .filter(|extent| !extent.is_empty())
                .unwrap_or(Extent::new(token.size, token.size)),
            position: token.position(),
            size: token.size,
            scale: token.scale,
            rotation_deg: token.rotation_deg,
            visible: token.visible,
            locked: token.locked,
        }
    }

    /// Uniform factor from texture pixels to map units.
    pub fn sprite_scale(&self) -> f64 {
        (self.size / self.intrinsic.width) * self.scale
    }

    pub fn half_extent(&self) -> Extent {
        Extent::new(self.intrinsic.width / 2.0, self.intrinsic.height / 2.0)
    }
}

/// Image sizes known to the host, keyed by URL.
pub trait TextureSizes {
    fn texture_size(&self, url: &str) -> Option<Extent>;
}

impl TextureSizes for HashMap<String, Extent> {
    fn texture_size(&self, url: &str) -> Option<Extent> {
        self.get(url).copied()
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SceneGraph {
    pub viewport: Extent,
    /// The canvas's on-page offset, added when projecting overlay handles.
    pub viewport_offset: ScreenPoint,
    pub camera: Camera,
    pub map_url: String,
    pub map_transform: MapTransform,
    pub map_image: Option<Extent>,
    pub grid: Grid,
    pub fog: Fog,
    pub tokens: Vec<TokenNode>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GraphSync {
    pub added: usize,
    pub removed: usize,
    pub updated: usize,
}

/// Brings `graph` in line with `scene`. Token nodes follow scene order.
pub fn apply_scene_to_graph(
    scene: &Scene,
    graph: &mut SceneGraph,
    textures: &impl TextureSizes,
) -> GraphSync {
    graph.camera = Camera::from_scene(scene);
    graph.map_url = scene.map_url.clone();
    graph.map_transform = scene.map_transform;
    graph.map_image = textures
        .texture_size(&scene.map_url)
        .filter(|extent| !extent.is_empty());
    graph.grid = scene.grid.clone();
    graph.fog = scene.fog;

    let mut existing: HashMap<String, TokenNode> = graph
        .tokens
        .drain(..)
        .map(|node| (node.id.clone(), node))
        .collect();
    let mut sync = GraphSync::default();
    for token in &scene.tokens {
        let node = TokenNode::from_token(token, textures.texture_size(&token.image));
        match existing.remove(&token.id) {
            Some(previous) if previous == node => {}
            Some(_) => sync.updated += 1,
            None => sync.added += 1,
        }
        graph.tokens.push(node);
    }
    sync.removed = existing.len();
    sync
}

impl SceneGraph {
    pub fn map_matrix(&self) -> Affine {
        self.map_transform.matrix()
    }

    /// Map-local to screen: camera after map transform.
    pub fn map_screen_matrix(&self) -> Affine {
        self.camera.matrix().multiply(&self.map_matrix())
    }

    pub fn map_to_world(&self, point: MapPoint) -> WorldPoint {
        let (x, y) = self.map_matrix().apply(point.x, point.y);
        WorldPoint::new(x, y)
    }

    pub fn world_to_map(&self, point: WorldPoint) -> Option<MapPoint> {
        let (x, y) = self.map_matrix().inverse()?.apply(point.x, point.y);
        Some(MapPoint::new(x, y))
    }

    pub fn map_to_screen(&self, point: MapPoint) -> ScreenPoint {
        self.camera.world_to_screen(self.map_to_world(point))
    }

    pub fn screen_to_map(&self, point: ScreenPoint) -> Option<MapPoint> {
        self.world_to_map(self.camera.screen_to_world(point))
    }

    pub fn screen_to_world(&self, point: ScreenPoint) -> WorldPoint {
        self.camera.screen_to_world(point)
    }

    pub fn token(&self, id: &str) -> Option<&TokenNode> {
        self.tokens.iter().find(|node| node.id == id)
    }

    /// Sprite space to screen. The map only positions the token: its own
    /// rotation and scale are not affected by the map's.
    pub fn token_matrix(&self, node: &TokenNode) -> Affine {
        let origin = self.map_to_screen(node.position);
        let scale = self.camera.scale() * node.sprite_scale();
        Affine::translate(origin.x, origin.y)
            .multiply(&Affine::rotate(node.rotation_deg))
            .multiply(&Affine::scale(scale, scale))
    }

    pub fn screen_to_token(&self, node: &TokenNode, point: ScreenPoint) -> Option<LocalPoint> {
        let (x, y) = self.token_matrix(node).inverse()?.apply(point.x, point.y);
        Some(LocalPoint::new(x, y))
    }

    /// Topmost visible token whose sprite contains `point`.
    pub fn hit_token(&self, point: ScreenPoint) -> Option<&TokenNode> {
        self.tokens.iter().rev().filter(|node| node.visible).find(|node| {
            let half = node.half_extent();
            self.screen_to_token(node, point)
                .is_some_and(|local| local.x.abs() <= half.width && local.y.abs() <= half.height)
        })
    }

    /// Screen-space centre of the map group's origin, the map rotation pivot.
    pub fn map_center(&self) -> ScreenPoint {
        self.map_to_screen(MapPoint::ORIGIN)
    }
}

/// Centres the map in the viewport and sizes it per `mode`.
pub fn fit_map_transform(
    mode: FitMode,
    image: Extent,
    viewport: Extent,
    camera: &Camera,
) -> MapTransform {
    if image.is_empty() || viewport.is_empty() {
        return MapTransform::default();
    }
    let center = camera.screen_to_world(viewport.center());
    let world_width = viewport.width / camera.scale();
    let world_height = viewport.height / camera.scale();
    let ratio_x = world_width / image.width;
    let ratio_y = world_height / image.height;
    let (scale_x, scale_y) = match mode {
        FitMode::Contain => {
            let ratio = ratio_x.min(ratio_y);
            (ratio, ratio)
        }
        FitMode::Cover => {
            let ratio = ratio_x.max(ratio_y);
            (ratio, ratio)
        }
        FitMode::Stretch => (ratio_x, ratio_y),
    };
    MapTransform {
        x: center.x,
        y: center.y,
        scale_x: scale_x.clamp(MIN_TRANSFORM_SCALE, MAX_TRANSFORM_SCALE),
        scale_y: scale_y.clamp(MIN_TRANSFORM_SCALE, MAX_TRANSFORM_SCALE),
        ..MapTransform::default()
    }
}

/// Pan and zoom that put the map's origin at the viewport centre with the
/// whole image visible.
pub fn home_view(image: Option<Extent>, viewport: Extent, map_scale: f64) -> (Pan, f64) {
    let center = viewport.center();
    let zoom = match image {
        Some(image) if !image.is_empty() && !viewport.is_empty() && map_scale > 0.0 => {
            let fit = (viewport.width / image.width).min(viewport.height / image.height);
            (fit / map_scale).clamp(MIN_VIEW_ZOOM, MAX_VIEW_ZOOM)
        }
        _ => 1.0,
    };
    (
        Pan {
            x: center.x,
            y: center.y,
        },
        zoom,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn scene_with_tokens(ids: &[&str]) -> Scene {
        let mut scene = Scene::default();
        for id in ids {
            scene.tokens.push(Token::new(id.to_string()));
        }
        scene
    }

    #[test]
    fn zoom_at_keeps_anchor_fixed() {
        let camera = Camera {
            pan: Pan { x: 40.0, y: -10.0 },
            zoom: 1.5,
            map_scale: 2.0,
        };
        let anchor = ScreenPoint::new(300.0, 200.0);
        let before = camera.screen_to_world(anchor);
        let zoomed = camera.zoom_at(anchor, WHEEL_ZOOM_IN, MIN_VIEW_ZOOM, MAX_VIEW_ZOOM);
        let after = zoomed.screen_to_world(anchor);
        assert!(close(before.x, after.x) && close(before.y, after.y));
        assert!(close(zoomed.zoom, 1.65));
    }

    #[test]
    fn zoom_at_clamps_to_view_range() {
        let camera = Camera::default();
        let zoomed = camera.zoom_at(ScreenPoint::ORIGIN, 100.0, MIN_VIEW_ZOOM, MAX_VIEW_ZOOM);
        assert_eq!(zoomed.zoom, MAX_VIEW_ZOOM);
    }

    #[test]
    fn apply_scene_adds_updates_and_removes_nodes() {
        let textures: HashMap<String, Extent> = HashMap::new();
        let mut graph = SceneGraph::default();
        let sync = apply_scene_to_graph(&scene_with_tokens(&["a", "b"]), &mut graph, &textures);
        assert_eq!(sync.added, 2);

        let mut scene = scene_with_tokens(&["b", "c"]);
        scene.tokens[0].x = 12.0;
        let sync = apply_scene_to_graph(&scene, &mut graph, &textures);
        assert_eq!(
            sync,
            GraphSync {
                added: 1,
                removed: 1,
                updated: 1
            }
        );
        let ids: Vec<&str> = graph.tokens.iter().map(|node| node.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[test]
    fn map_round_trip_through_screen() {
        let mut scene = Scene::default();
        scene.pan = Pan { x: 100.0, y: 50.0 };
        scene.zoom = 2.0;
        scene.map_transform = MapTransform {
            x: 30.0,
            y: -20.0,
            scale_x: 1.5,
            scale_y: 0.75,
            rotation_deg: 33.0,
            skew_x_deg: 10.0,
            skew_y_deg: 0.0,
        };
        let mut graph = SceneGraph::default();
        apply_scene_to_graph(&scene, &mut graph, &HashMap::new());
        let point = MapPoint::new(17.0, -42.0);
        let back = graph.screen_to_map(graph.map_to_screen(point)).unwrap();
        assert!((back.x - point.x).abs() < 1e-9 && (back.y - point.y).abs() < 1e-9);
    }

    #[test]
    fn token_is_positioned_but_not_rotated_by_map() {
        let mut scene = scene_with_tokens(&["a"]);
        scene.map_transform.rotation_deg = 90.0;
        scene.tokens[0].x = 10.0;
        let mut graph = SceneGraph::default();
        apply_scene_to_graph(&scene, &mut graph, &HashMap::new());
        let node = &graph.tokens[0];
        let matrix = graph.token_matrix(node);
        let (cx, cy) = matrix.apply(0.0, 0.0);
        assert!(cx.abs() < 1e-9 && (cy - 10.0).abs() < 1e-9);
        assert!(close(matrix.a, 1.0) && matrix.b.abs() < 1e-12);
    }

    #[test]
    fn hit_token_prefers_topmost_and_skips_hidden() {
        let mut scene = scene_with_tokens(&["bottom", "top"]);
        let mut graph = SceneGraph::default();
        apply_scene_to_graph(&scene, &mut graph, &HashMap::new());
        let hit = graph.hit_token(ScreenPoint::new(5.0, 5.0)).map(|node| node.id.as_str());
        assert_eq!(hit, Some("top"));

        scene.tokens[1].visible = false;
        apply_scene_to_graph(&scene, &mut graph, &HashMap::new());
        let hit = graph.hit_token(ScreenPoint::new(5.0, 5.0)).map(|node| node.id.as_str());
        assert_eq!(hit, Some("bottom"));
        assert!(graph.hit_token(ScreenPoint::new(40.0, 0.0)).is_none());
    }

    #[test]
    fn sprite_scale_backs_out_texture_width() {
        let mut scene = scene_with_tokens(&["a"]);
        scene.tokens[0].image = "hero.png".to_string();
        scene.tokens[0].scale = 2.0;
        let mut textures = HashMap::new();
        textures.insert("hero.png".to_string(), Extent::new(256.0, 128.0));
        let mut graph = SceneGraph::default();
        apply_scene_to_graph(&scene, &mut graph, &textures);
        assert!(close(graph.tokens[0].sprite_scale(), 0.5));
    }

    #[test]
    fn contain_and_cover_pick_min_and_max_ratio() {
        let camera = Camera::default();
        let image = Extent::new(400.0, 200.0);
        let viewport = Extent::new(800.0, 800.0);
        let contain = fit_map_transform(FitMode::Contain, image, viewport, &camera);
        assert!(close(contain.scale_x, 2.0) && close(contain.scale_y, 2.0));
        assert!(close(contain.x, 400.0) && close(contain.y, 400.0));
        let cover = fit_map_transform(FitMode::Cover, image, viewport, &camera);
        assert!(close(cover.scale_x, 4.0));
        let stretch = fit_map_transform(FitMode::Stretch, image, viewport, &camera);
        assert!(close(stretch.scale_x, 2.0) && close(stretch.scale_y, 4.0));
    }

    #[test]
    fn home_view_centres_origin() {
        let (pan, zoom) = home_view(Some(Extent::new(1000.0, 500.0)), Extent::new(500.0, 500.0), 1.0);
        assert_eq!(pan, Pan { x: 250.0, y: 250.0 });
        assert!(close(zoom, 0.5));
        let (_, zoom) = home_view(None, Extent::new(500.0, 500.0), 1.0);
        assert_eq!(zoom, 1.0);
    }
}
