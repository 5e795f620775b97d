//! Pointer-driven transform sessions for the map and for tokens.
//!
//! A session freezes the target's starting transform and pointer position
//! at pointer-down. Every move recomputes the candidate from that snapshot
//! against the current camera and scene, writes it through the scene store,
//! and remembers it. Releasing the pointer ends the session with the last
//! candidate in place; there is no rollback.

use tracing::{debug, trace};

use crate::error::SessionRejected;
use crate::geometry::{
    angle_between, clamp_or, normalize_angle, snap_step, MapPoint, ScreenPoint, WorldPoint,
};
use crate::graph::SceneGraph;
use crate::grid::snap_to_grid;
use crate::normalize::{MapTransformPatch, TokenPatch};
use crate::scene::{
    MapTransform, Scene, Token, MAX_TOKEN_SCALE, MAX_TRANSFORM_SCALE, MIN_TOKEN_SCALE,
    MIN_TRANSFORM_SCALE,
};
use crate::store::SceneStore;

pub const ROTATE_STEP_DEG: f64 = 5.0;
pub const FINE_ROTATE_STEP_DEG: f64 = 1.0;
/// Degrees of skew per map-local unit of pointer travel.
pub const SKEW_DEG_PER_UNIT: f64 = 0.1;
const RATIO_EPSILON: f64 = 1e-6;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub shift: bool,
    pub alt: bool,
    pub ctrl: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HandleKey {
    N,
    S,
    E,
    W,
    NE,
    NW,
    SE,
    SW,
    Center,
    Rotation,
}

impl HandleKey {
    /// The eight bounding-box anchors, clockwise from the top-left corner.
    pub const ANCHORS: [HandleKey; 8] = [
        HandleKey::NW,
        HandleKey::N,
        HandleKey::NE,
        HandleKey::E,
        HandleKey::SE,
        HandleKey::S,
        HandleKey::SW,
        HandleKey::W,
    ];

    pub fn is_edge(self) -> bool {
        matches!(self, Self::N | Self::S | Self::E | Self::W)
    }

    pub fn is_corner(self) -> bool {
        matches!(self, Self::NE | Self::NW | Self::SE | Self::SW)
    }

    /// Unit offsets from the box centre in the target's local frame (y down).
    pub fn direction(self) -> (f64, f64) {
        match self {
            Self::N => (0.0, -1.0),
            Self::S => (0.0, 1.0),
            Self::E => (1.0, 0.0),
            Self::W => (-1.0, 0.0),
            Self::NE => (1.0, -1.0),
            Self::NW => (-1.0, -1.0),
            Self::SE => (1.0, 1.0),
            Self::SW => (-1.0, 1.0),
            Self::Center | Self::Rotation => (0.0, 0.0),
        }
    }

    pub fn cursor(self) -> &'static str {
        match self {
            Self::N | Self::S => "ns-resize",
            Self::E | Self::W => "ew-resize",
            Self::NE | Self::SW => "nesw-resize",
            Self::NW | Self::SE => "nwse-resize",
            Self::Center => "move",
            Self::Rotation => "grab",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GestureKind {
    Move,
    Scale,
    Rotate,
    Skew,
}

/// Skew lives on the edge handles behind ctrl; corners always scale.
pub fn gesture_for_handle(handle: HandleKey, modifiers: Modifiers) -> GestureKind {
    match handle {
        HandleKey::Center => GestureKind::Move,
        HandleKey::Rotation => GestureKind::Rotate,
        edge if edge.is_edge() && modifiers.ctrl => GestureKind::Skew,
        _ => GestureKind::Scale,
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionTarget {
    Map,
    Token(String),
}

#[derive(Clone, Debug, PartialEq)]
pub enum Candidate {
    Map(MapTransform),
    Token(Token),
}

#[derive(Clone, Debug, PartialEq)]
enum Snapshot {
    Map {
        transform: MapTransform,
        /// Pointer in the start transform's map-local frame.
        local: MapPoint,
    },
    Token {
        token: Token,
        sprite_scale: f64,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct TransformSession {
    pub target: SessionTarget,
    pub kind: GestureKind,
    pub handle: HandleKey,
    pub modifiers: Modifiers,
    pub start_screen: ScreenPoint,
    start: Snapshot,
    last: Option<Candidate>,
}

impl TransformSession {
    pub fn last(&self) -> Option<&Candidate> {
        self.last.as_ref()
    }
}

#[derive(Debug, Default)]
pub struct TransformController {
    session: Option<TransformSession>,
}

fn rotate_step(modifiers: Modifiers) -> f64 {
    if modifiers.alt {
        FINE_ROTATE_STEP_DEG
    } else {
        ROTATE_STEP_DEG
    }
}

fn axis_ratio(current: f64, start: f64) -> f64 {
    if start.abs() < RATIO_EPSILON {
        1.0
    } else {
        current / start
    }
}

/// Pointer in the map-local frame of `transform`, seen through the current camera.
fn local_in(graph: &SceneGraph, transform: &MapTransform, screen: ScreenPoint) -> Option<MapPoint> {
    let inverse = graph.camera.matrix().multiply(&transform.matrix()).inverse()?;
    let (x, y) = inverse.apply(screen.x, screen.y);
    Some(MapPoint::new(x, y))
}

impl TransformController {
    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    pub fn session(&self) -> Option<&TransformSession> {
        self.session.as_ref()
    }

    pub fn begin_map(
        &mut self,
        handle: HandleKey,
        kind: GestureKind,
        screen: ScreenPoint,
        modifiers: Modifiers,
        scene: &Scene,
        graph: &SceneGraph,
    ) -> Result<GestureKind, SessionRejected> {
        if self.session.is_some() {
            return Err(SessionRejected::AlreadyActive);
        }
        if graph.map_image.is_none() {
            return Err(SessionRejected::NoMapSize);
        }
        let transform = scene.map_transform;
        let local = local_in(graph, &transform, screen).unwrap_or(MapPoint::ORIGIN);
        debug!(?handle, ?kind, "map session started");
        self.session = Some(TransformSession {
            target: SessionTarget::Map,
            kind,
            handle,
            modifiers,
            start_screen: screen,
            start: Snapshot::Map { transform, local },
            last: None,
        });
        Ok(kind)
    }

    pub fn begin_token(
        &mut self,
        token_id: &str,
        handle: HandleKey,
        kind: GestureKind,
        screen: ScreenPoint,
        modifiers: Modifiers,
        scene: &Scene,
        graph: &SceneGraph,
    ) -> Result<GestureKind, SessionRejected> {
        if self.session.is_some() {
            return Err(SessionRejected::AlreadyActive);
        }
        let token = scene
            .token(token_id)
            .ok_or_else(|| SessionRejected::UnknownToken(token_id.to_string()))?;
        if token.locked {
            return Err(SessionRejected::TokenLocked(token_id.to_string()));
        }
        // Tokens have no skew.
        let kind = match kind {
            GestureKind::Skew => GestureKind::Scale,
            other => other,
        };
        let sprite_scale = graph
            .token(token_id)
            .map(|node| node.sprite_scale())
            .unwrap_or(token.scale);
        debug!(token = token_id, ?handle, ?kind, "token session started");
        self.session = Some(TransformSession {
            target: SessionTarget::Token(token_id.to_string()),
            kind,
            handle,
            modifiers,
            start_screen: screen,
            start: Snapshot::Token {
                token: token.clone(),
                sprite_scale,
            },
            last: None,
        });
        Ok(kind)
    }

    /// Recomputes the candidate for `screen` and writes it to the store.
    pub fn update(
        &mut self,
        screen: ScreenPoint,
        store: &mut SceneStore,
        graph: &SceneGraph,
        snap_tokens: bool,
    ) -> Option<Candidate> {
        let session = self.session.as_mut()?;
        let candidate = match &session.start {
            Snapshot::Map { transform, local } => {
                let next = map_candidate(session, transform, *local, screen, graph)?;
                store.set_map_transform(&MapTransformPatch::from(next));
                Candidate::Map(store.scene().map_transform)
            }
            Snapshot::Token {
                token,
                sprite_scale,
            } => {
                let current = store.scene().token(&token.id)?;
                if current.locked {
                    return None;
                }
                let patch = token_candidate(
                    session,
                    token,
                    *sprite_scale,
                    screen,
                    store,
                    graph,
                    snap_tokens,
                )?;
                store.update_token(&token.id, &patch);
                Candidate::Token(store.scene().token(&token.id)?.clone())
            }
        };
        trace!(?candidate, "session candidate");
        session.last = Some(candidate.clone());
        Some(candidate)
    }

    /// Ends the session. The last candidate is what stays committed.
    pub fn end(&mut self, store: &mut SceneStore) -> Option<SessionTarget> {
        let session = self.session.take()?;
        match &session.last {
            Some(Candidate::Map(transform)) if store.scene().map_transform != *transform => {
                store.set_map_transform(&MapTransformPatch::from(*transform));
            }
            Some(Candidate::Token(token)) => {
                let current = store.scene().token(&token.id);
                if current.is_some_and(|current| !current.locked && current != token) {
                    store.update_token(
                        &token.id,
                        &TokenPatch {
                            x: Some(token.x),
                            y: Some(token.y),
                            scale: Some(token.scale),
                            rotation_deg: Some(token.rotation_deg),
                            ..TokenPatch::default()
                        },
                    );
                }
            }
            _ => {}
        }
        debug!(target = ?session.target, kind = ?session.kind, "session ended");
        Some(session.target)
    }
}

fn snapped_rotation(
    start_deg: f64,
    center: ScreenPoint,
    from: ScreenPoint,
    to: ScreenPoint,
    modifiers: Modifiers,
) -> f64 {
    let delta = angle_between(center, to) - angle_between(center, from);
    normalize_angle(snap_step(start_deg + delta, rotate_step(modifiers)))
}

fn map_candidate(
    session: &TransformSession,
    start: &MapTransform,
    start_local: MapPoint,
    screen: ScreenPoint,
    graph: &SceneGraph,
) -> Option<MapTransform> {
    let mut next = *start;
    match session.kind {
        GestureKind::Move => {
            let scale = graph.camera.scale();
            next.x = start.x + (screen.x - session.start_screen.x) / scale;
            next.y = start.y + (screen.y - session.start_screen.y) / scale;
        }
        GestureKind::Rotate => {
            let center = graph.camera.world_to_screen(WorldPoint::new(start.x, start.y));
            next.rotation_deg = snapped_rotation(
                start.rotation_deg,
                center,
                session.start_screen,
                screen,
                session.modifiers,
            );
        }
        GestureKind::Scale => {
            let local = local_in(graph, start, screen)?;
            let clamp =
                |value: f64| clamp_or(Some(value), MIN_TRANSFORM_SCALE, MAX_TRANSFORM_SCALE, 1.0);
            let rx = axis_ratio(local.x, start_local.x);
            let ry = axis_ratio(local.y, start_local.y);
            let (sx, sy) = match session.handle {
                HandleKey::E | HandleKey::W if session.modifiers.shift => (rx, rx),
                HandleKey::N | HandleKey::S if session.modifiers.shift => (ry, ry),
                HandleKey::E | HandleKey::W => (rx, 1.0),
                HandleKey::N | HandleKey::S => (1.0, ry),
                _ => {
                    let length = start_local.x * start_local.x + start_local.y * start_local.y;
                    let ratio = if length < RATIO_EPSILON {
                        1.0
                    } else {
                        (local.x * start_local.x + local.y * start_local.y) / length
                    };
                    (ratio, ratio)
                }
            };
            next.scale_x = clamp(start.scale_x * sx);
            next.scale_y = clamp(start.scale_y * sy);
        }
        GestureKind::Skew => {
            let local = local_in(graph, start, screen)?;
            let dx = local.x - start_local.x;
            let dy = local.y - start_local.y;
            match session.handle {
                HandleKey::N | HandleKey::S => {
                    next.skew_x_deg = normalize_angle(start.skew_x_deg + dx * SKEW_DEG_PER_UNIT);
                }
                HandleKey::E | HandleKey::W => {
                    next.skew_y_deg = normalize_angle(start.skew_y_deg + dy * SKEW_DEG_PER_UNIT);
                }
                _ => {}
            }
        }
    }
    Some(next)
}

fn token_candidate(
    session: &TransformSession,
    start: &Token,
    start_sprite_scale: f64,
    screen: ScreenPoint,
    store: &SceneStore,
    graph: &SceneGraph,
    snap_tokens: bool,
) -> Option<TokenPatch> {
    let center = graph.map_to_screen(start.position());
    match session.kind {
        GestureKind::Move => {
            let from = graph.screen_to_map(session.start_screen)?;
            let to = graph.screen_to_map(screen)?;
            let mut position = MapPoint::new(start.x + (to.x - from.x), start.y + (to.y - from.y));
            if snap_tokens {
                position = snap_to_grid(position, &store.scene().grid);
            }
            Some(TokenPatch::position(position.x, position.y))
        }
        GestureKind::Scale | GestureKind::Skew => {
            let start_distance = center.distance(session.start_screen);
            let ratio = if start_distance < RATIO_EPSILON {
                1.0
            } else {
                center.distance(screen) / start_distance
            };
            let intrinsic_width = graph
                .token(&start.id)
                .map(|node| node.intrinsic.width)
                .filter(|width| *width > 0.0)
                .unwrap_or(start.size);
            let texture_factor = start.size / intrinsic_width;
            let sprite_scale = start_sprite_scale * ratio;
            Some(TokenPatch {
                scale: Some(clamp_or(
                    Some(sprite_scale / texture_factor),
                    MIN_TOKEN_SCALE,
                    MAX_TOKEN_SCALE,
                    start.scale,
                )),
                ..TokenPatch::default()
            })
        }
        GestureKind::Rotate => Some(TokenPatch {
            rotation_deg: Some(snapped_rotation(
                start.rotation_deg,
                center,
                session.start_screen,
                screen,
                session.modifiers,
            )),
            ..TokenPatch::default()
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::graph::{apply_scene_to_graph, Extent};
    use crate::scene::DEFAULT_MAP_URL;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn textures() -> HashMap<String, Extent> {
        let mut textures = HashMap::new();
        textures.insert(DEFAULT_MAP_URL.to_string(), Extent::new(400.0, 200.0));
        textures.insert("hero.png".to_string(), Extent::new(128.0, 128.0));
        textures
    }

    fn graph_for(store: &SceneStore) -> SceneGraph {
        let mut graph = SceneGraph::default();
        apply_scene_to_graph(store.scene(), &mut graph, &textures());
        graph
    }

    fn drag_map(
        store: &mut SceneStore,
        handle: HandleKey,
        modifiers: Modifiers,
        from: (f64, f64),
        to: (f64, f64),
    ) -> MapTransform {
        let graph = graph_for(store);
        let mut controller = TransformController::default();
        let kind = gesture_for_handle(handle, modifiers);
        controller
            .begin_map(
                handle,
                kind,
                ScreenPoint::new(from.0, from.1),
                modifiers,
                store.scene(),
                &graph,
            )
            .unwrap();
        controller.update(ScreenPoint::new(to.0, to.1), store, &graph, false);
        controller.end(store);
        store.scene().map_transform
    }

    #[test]
    fn gesture_selection_follows_handle_and_ctrl() {
        let ctrl = Modifiers {
            ctrl: true,
            ..Modifiers::default()
        };
        assert_eq!(gesture_for_handle(HandleKey::N, ctrl), GestureKind::Skew);
        assert_eq!(gesture_for_handle(HandleKey::NE, ctrl), GestureKind::Scale);
        assert_eq!(gesture_for_handle(HandleKey::E, Modifiers::default()), GestureKind::Scale);
        assert_eq!(gesture_for_handle(HandleKey::Rotation, ctrl), GestureKind::Rotate);
        assert_eq!(gesture_for_handle(HandleKey::Center, ctrl), GestureKind::Move);
    }

    #[test]
    fn map_move_follows_pointer_at_any_zoom() {
        let mut store = SceneStore::default();
        store.set_pan_zoom(None, Some(2.0));
        let next = drag_map(
            &mut store,
            HandleKey::Center,
            Modifiers::default(),
            (100.0, 100.0),
            (140.0, 120.0),
        );
        assert!(close(next.x, 20.0) && close(next.y, 10.0));
    }

    #[test]
    fn map_rotation_snaps_to_coarse_or_fine_steps() {
        let target = (37.0_f64.to_radians().cos() * 100.0, 37.0_f64.to_radians().sin() * 100.0);
        let mut store = SceneStore::default();
        let coarse = drag_map(&mut store, HandleKey::Rotation, Modifiers::default(), (100.0, 0.0), target);
        assert!(close(coarse.rotation_deg, 35.0));

        let mut store = SceneStore::default();
        let alt = Modifiers {
            alt: true,
            ..Modifiers::default()
        };
        let fine = drag_map(&mut store, HandleKey::Rotation, alt, (100.0, 0.0), target);
        assert!(close(fine.rotation_deg, 37.0));
    }

    #[test]
    fn corner_scales_uniformly() {
        let mut store = SceneStore::default();
        let next = drag_map(&mut store, HandleKey::SE, Modifiers::default(), (200.0, 100.0), (300.0, 150.0));
        assert!(close(next.scale_x, 1.5) && close(next.scale_y, 1.5));
    }

    #[test]
    fn edge_scales_one_axis_unless_shift() {
        let mut store = SceneStore::default();
        let next = drag_map(&mut store, HandleKey::E, Modifiers::default(), (200.0, 0.0), (400.0, 50.0));
        assert!(close(next.scale_x, 2.0) && close(next.scale_y, 1.0));

        let mut store = SceneStore::default();
        let shift = Modifiers {
            shift: true,
            ..Modifiers::default()
        };
        let next = drag_map(&mut store, HandleKey::E, shift, (200.0, 0.0), (400.0, 50.0));
        assert!(close(next.scale_x, 2.0) && close(next.scale_y, 2.0));
    }

    #[test]
    fn scale_is_clamped() {
        let mut store = SceneStore::default();
        let next = drag_map(&mut store, HandleKey::E, Modifiers::default(), (200.0, 0.0), (200_000.0, 0.0));
        assert_eq!(next.scale_x, MAX_TRANSFORM_SCALE);
    }

    #[test]
    fn skew_tracks_local_displacement() {
        let ctrl = Modifiers {
            ctrl: true,
            ..Modifiers::default()
        };
        let mut store = SceneStore::default();
        let next = drag_map(&mut store, HandleKey::N, ctrl, (0.0, -100.0), (50.0, -100.0));
        assert!(close(next.skew_x_deg, 5.0));
        assert_eq!(next.scale_x, 1.0);

        let mut store = SceneStore::default();
        let next = drag_map(&mut store, HandleKey::N, ctrl, (0.0, -100.0), (-50.0, -100.0));
        assert!(close(next.skew_x_deg, 355.0));

        let mut store = SceneStore::default();
        let next = drag_map(&mut store, HandleKey::W, ctrl, (-200.0, 0.0), (-200.0, 30.0));
        assert!(close(next.skew_y_deg, 3.0));
    }

    #[test]
    fn second_session_is_rejected_while_active() {
        let store = SceneStore::default();
        let graph = graph_for(&store);
        let mut controller = TransformController::default();
        let start = ScreenPoint::ORIGIN;
        controller
            .begin_map(HandleKey::Center, GestureKind::Move, start, Modifiers::default(), store.scene(), &graph)
            .unwrap();
        let again = controller.begin_map(
            HandleKey::Center,
            GestureKind::Move,
            start,
            Modifiers::default(),
            store.scene(),
            &graph,
        );
        assert_eq!(again, Err(SessionRejected::AlreadyActive));
    }

    #[test]
    fn map_session_needs_a_loaded_image() {
        let store = SceneStore::default();
        let graph = SceneGraph::default();
        let mut controller = TransformController::default();
        let result = controller.begin_map(
            HandleKey::Center,
            GestureKind::Move,
            ScreenPoint::ORIGIN,
            Modifiers::default(),
            store.scene(),
            &graph,
        );
        assert_eq!(result, Err(SessionRejected::NoMapSize));
        assert!(!controller.is_active());
    }

    #[test]
    fn token_move_snaps_in_map_space() {
        let mut store = SceneStore::default();
        let id = store.add_token(&serde_json::json!({ "id": "hero" }));
        let graph = graph_for(&store);
        let mut controller = TransformController::default();
        controller
            .begin_token(
                &id,
                HandleKey::Center,
                GestureKind::Move,
                ScreenPoint::new(10.0, 10.0),
                Modifiers::default(),
                store.scene(),
                &graph,
            )
            .unwrap();
        controller.update(ScreenPoint::new(60.0, 70.0), &mut store, &graph, false);
        let token = store.scene().token(&id).unwrap();
        assert!(close(token.x, 50.0) && close(token.y, 60.0));

        controller.update(ScreenPoint::new(60.0, 70.0), &mut store, &graph, true);
        let token = store.scene().token(&id).unwrap();
        assert!(close(token.x, 64.0) && close(token.y, 64.0));
        assert_eq!(controller.end(&mut store), Some(SessionTarget::Token(id)));
    }

    #[test]
    fn token_scale_backs_out_texture_width() {
        let mut store = SceneStore::default();
        let id = store.add_token(&serde_json::json!({ "image": "hero.png" }));
        let graph = graph_for(&store);
        assert!(close(graph.token(&id).unwrap().sprite_scale(), 0.5));
        let mut controller = TransformController::default();
        controller
            .begin_token(
                &id,
                HandleKey::SE,
                GestureKind::Scale,
                ScreenPoint::new(32.0, 0.0),
                Modifiers::default(),
                store.scene(),
                &graph,
            )
            .unwrap();
        controller.update(ScreenPoint::new(64.0, 0.0), &mut store, &graph, false);
        controller.end(&mut store);
        assert!(close(store.scene().token(&id).unwrap().scale, 2.0));
    }
}
