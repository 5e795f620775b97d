//! Screen-space handle layout for the map and the selected token.

use crate::geometry::{Affine, ScreenPoint};
use crate::graph::SceneGraph;
use crate::session::HandleKey;

/// Rotation handle distance above the map's top edge, in screen pixels.
pub const MAP_ROTATE_HANDLE_PX: f64 = 60.0;
pub const TOKEN_ROTATE_HANDLE_PX: f64 = 32.0;
/// Pointer radius for grabbing a handle.
pub const HANDLE_HIT_RADIUS: f64 = 10.0;

#[derive(Clone, Debug, PartialEq)]
pub struct HandleLayout {
    pub center: ScreenPoint,
    pub handles: [(HandleKey, ScreenPoint); 8],
    pub rotation: ScreenPoint,
}

impl HandleLayout {
    pub fn anchor(&self, key: HandleKey) -> Option<ScreenPoint> {
        self.handles
            .iter()
            .find(|(handle, _)| *handle == key)
            .map(|(_, point)| *point)
    }

    /// Rotation handle wins over anchors, anchors over the centre.
    pub fn hit(&self, point: ScreenPoint, radius: f64) -> Option<HandleKey> {
        if self.rotation.distance(point) <= radius {
            return Some(HandleKey::Rotation);
        }
        if let Some((key, _)) = self
            .handles
            .iter()
            .find(|(_, anchor)| anchor.distance(point) <= radius)
        {
            return Some(*key);
        }
        (self.center.distance(point) <= radius).then_some(HandleKey::Center)
    }
}

/// Projects the eight anchors of a `2*half_w` by `2*half_h` box, plus the
/// rotation anchor, through `matrix` into page pixels.
///
/// `pixel_scale` is how many screen pixels one local unit spans; dividing
/// by it keeps the rotation handle a constant distance at any zoom.
pub fn project_handles(
    matrix: &Affine,
    half_w: f64,
    half_h: f64,
    pixel_scale: f64,
    viewport_offset: ScreenPoint,
    rotate_px: f64,
) -> HandleLayout {
    let project = |x: f64, y: f64| {
        let (sx, sy) = matrix.apply(x, y);
        ScreenPoint::new(sx + viewport_offset.x, sy + viewport_offset.y)
    };
    let handles = HandleKey::ANCHORS.map(|key| {
        let (dx, dy) = key.direction();
        (key, project(dx * half_w, dy * half_h))
    });
    let lift = if pixel_scale > 0.0 {
        rotate_px / pixel_scale
    } else {
        rotate_px
    };
    HandleLayout {
        center: project(0.0, 0.0),
        handles,
        rotation: project(0.0, -half_h - lift),
    }
}

pub fn map_handles(graph: &SceneGraph) -> Option<HandleLayout> {
    let image = graph.map_image?;
    Some(project_handles(
        &graph.map_screen_matrix(),
        image.width / 2.0,
        image.height / 2.0,
        graph.camera.scale(),
        graph.viewport_offset,
        MAP_ROTATE_HANDLE_PX,
    ))
}

pub fn token_handles(graph: &SceneGraph, id: &str) -> Option<HandleLayout> {
    let node = graph.token(id)?;
    let half = node.half_extent();
    Some(project_handles(
        &graph.token_matrix(node),
        half.width,
        half.height,
        graph.camera.scale() * node.sprite_scale(),
        graph.viewport_offset,
        TOKEN_ROTATE_HANDLE_PX,
    ))
}
