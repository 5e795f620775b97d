use std::f64::consts::PI;

use wasm_bindgen::JsValue;
use web_sys::CanvasRenderingContext2d;

use tabletop_shared::geometry::{Affine, MapPoint, ScreenPoint};
use tabletop_shared::gizmo::{map_handles, token_handles, HandleLayout};
use tabletop_shared::graph::{Extent, SceneGraph};
use tabletop_shared::grid::measure;
use tabletop_shared::session::HandleKey;

use crate::state::AppState;
use crate::textures::TextureCache;

const HANDLE_SIZE: f64 = 10.0;
const CALIBRATION_MARKER_RADIUS: f64 = 6.0;
/// Map extent assumed for grid and fog until the map image is known.
const PLACEHOLDER_MAP_SIDE: f64 = 2048.0;

fn set_matrix(ctx: &CanvasRenderingContext2d, dpr: f64, matrix: &Affine) {
    let _ = ctx.set_transform(
        dpr * matrix.a,
        dpr * matrix.b,
        dpr * matrix.c,
        dpr * matrix.d,
        dpr * matrix.tx,
        dpr * matrix.ty,
    );
}

fn reset_matrix(ctx: &CanvasRenderingContext2d, dpr: f64) {
    let _ = ctx.set_transform(dpr, 0.0, 0.0, dpr, 0.0, 0.0);
}

pub fn redraw(state: &AppState) {
    let ctx = &state.ctx;
    let dpr = state.device_pixel_ratio;
    let graph = &state.graph;
    reset_matrix(ctx, dpr);
    ctx.clear_rect(0.0, 0.0, graph.viewport.width, graph.viewport.height);

    draw_map_group(ctx, dpr, graph, &state.textures);
    draw_tokens(ctx, dpr, graph, &state.textures, state.ui.selected_token_id.as_deref());
    reset_matrix(ctx, dpr);
    draw_ruler(ctx, state);
    draw_calibration(ctx, state);
    if state.ui.prefs.show_map_transform_handles {
        if let Some(layout) = map_handles(graph) {
            draw_handles(ctx, &layout, graph.viewport_offset, "rgba(64, 156, 255, 0.9)");
        }
    }
    if let Some(layout) = state
        .ui
        .selected_token_id
        .as_deref()
        .and_then(|id| token_handles(graph, id))
    {
        draw_handles(ctx, &layout, graph.viewport_offset, "rgba(255, 196, 64, 0.9)");
    }
    if let Some(text) = state.active_toast() {
        draw_toast(ctx, graph.viewport, text);
    }
}

fn draw_map_group(ctx: &CanvasRenderingContext2d, dpr: f64, graph: &SceneGraph, textures: &TextureCache) {
    let map_matrix = graph.map_screen_matrix();
    let extent = graph
        .map_image
        .unwrap_or(Extent::new(PLACEHOLDER_MAP_SIDE, PLACEHOLDER_MAP_SIDE));
    set_matrix(ctx, dpr, &map_matrix);
    if let Some(texture) = textures.get(&graph.map_url) {
        texture.draw(
            ctx,
            -extent.width / 2.0,
            -extent.height / 2.0,
            extent.width,
            extent.height,
        );
    }

    if graph.grid.enabled {
        draw_grid(ctx, dpr, graph, &map_matrix, extent);
    }

    if graph.fog.enabled {
        set_matrix(ctx, dpr, &map_matrix);
        ctx.set_global_alpha(graph.fog.opacity);
        ctx.set_fill_style_str("#000");
        ctx.fill_rect(-extent.width, -extent.height, extent.width * 2.0, extent.height * 2.0);
        ctx.set_global_alpha(1.0);
    }
}

/// Lines at `offset + k * size` in the grid's rotated frame, spanning twice
/// the larger map side in every direction.
fn draw_grid(
    ctx: &CanvasRenderingContext2d,
    dpr: f64,
    graph: &SceneGraph,
    map_matrix: &Affine,
    extent: Extent,
) {
    let grid = &graph.grid;
    let grid_matrix = map_matrix
        .multiply(&Affine::rotate(grid.rotation_deg))
        .multiply(&Affine::translate(grid.offset_x, grid.offset_y));
    let pixels_per_unit = grid_matrix.scale_x().abs().max(f64::EPSILON);
    let reach = extent.width.max(extent.height) * 2.0;
    let steps = (reach / grid.size).ceil() as i64;

    set_matrix(ctx, dpr, &grid_matrix);
    ctx.set_global_alpha(grid.opacity);
    ctx.set_stroke_style_str(&grid.color);
    ctx.set_line_width(1.0 / pixels_per_unit);
    ctx.begin_path();
    for step in -steps..=steps {
        let at = step as f64 * grid.size;
        ctx.move_to(at, -reach);
        ctx.line_to(at, reach);
        ctx.move_to(-reach, at);
        ctx.line_to(reach, at);
    }
    ctx.stroke();
    ctx.set_global_alpha(1.0);
}

fn draw_tokens(
    ctx: &CanvasRenderingContext2d,
    dpr: f64,
    graph: &SceneGraph,
    textures: &TextureCache,
    selected: Option<&str>,
) {
    for node in graph.tokens.iter().filter(|node| node.visible) {
        let matrix = graph.token_matrix(node);
        let half = node.half_extent();
        set_matrix(ctx, dpr, &matrix);
        match textures.get(&node.image) {
            Some(texture) => texture.draw(
                ctx,
                -half.width,
                -half.height,
                half.width * 2.0,
                half.height * 2.0,
            ),
            None => {
                ctx.set_fill_style_str("rgba(120, 120, 140, 0.85)");
                ctx.begin_path();
                let _ = ctx.arc(0.0, 0.0, half.width, 0.0, PI * 2.0);
                ctx.fill();
            }
        }
        if selected == Some(node.id.as_str()) || node.locked {
            let pixels = (graph.camera.scale() * node.sprite_scale()).max(f64::EPSILON);
            ctx.set_line_width(2.0 / pixels);
            let color = if node.locked {
                "rgba(228, 107, 73, 0.9)"
            } else {
                "rgba(255, 196, 64, 0.9)"
            };
            ctx.set_stroke_style_str(color);
            ctx.stroke_rect(-half.width, -half.height, half.width * 2.0, half.height * 2.0);
        }
    }
}

fn draw_ruler(ctx: &CanvasRenderingContext2d, state: &AppState) {
    let Some((start, end)) = state.ui.ruler.segment() else {
        return;
    };
    let graph = &state.graph;
    let from = graph.map_to_screen(start);
    let to = graph.map_to_screen(end);
    ctx.set_stroke_style_str("rgba(255, 255, 255, 0.95)");
    ctx.set_line_width(2.0);
    let _ = ctx.set_line_dash(&js_sys::Array::of2(&JsValue::from_f64(6.0), &JsValue::from_f64(4.0)));
    ctx.begin_path();
    ctx.move_to(from.x, from.y);
    ctx.line_to(to.x, to.y);
    ctx.stroke();
    let _ = ctx.set_line_dash(&js_sys::Array::new());

    let scene = state.scene.scene();
    let measurement = measure(start, end, &scene.grid, &scene.units);
    ctx.set_font("13px sans-serif");
    ctx.set_fill_style_str("rgba(20, 20, 24, 0.8)");
    let width = ctx
        .measure_text(&measurement.label)
        .map(|metrics| metrics.width())
        .unwrap_or(0.0);
    ctx.fill_rect(to.x + 10.0, to.y + 6.0, width + 12.0, 22.0);
    ctx.set_fill_style_str("#fff");
    let _ = ctx.fill_text(&measurement.label, to.x + 16.0, to.y + 22.0);
}

fn draw_calibration(ctx: &CanvasRenderingContext2d, state: &AppState) {
    let points: Vec<ScreenPoint> = state
        .ui
        .calibration
        .points()
        .into_iter()
        .map(|point: MapPoint| state.graph.map_to_screen(point))
        .collect();
    if points.is_empty() {
        return;
    }
    ctx.set_fill_style_str("rgba(64, 220, 160, 0.95)");
    for point in &points {
        ctx.begin_path();
        let _ = ctx.arc(point.x, point.y, CALIBRATION_MARKER_RADIUS, 0.0, PI * 2.0);
        ctx.fill();
    }
    if let [from, to] = points[..] {
        ctx.set_stroke_style_str("rgba(64, 220, 160, 0.95)");
        ctx.set_line_width(2.0);
        ctx.begin_path();
        ctx.move_to(from.x, from.y);
        ctx.line_to(to.x, to.y);
        ctx.stroke();
    }
}

/// Handle layouts are in page pixels; the canvas origin sits at `offset`.
fn draw_handles(
    ctx: &CanvasRenderingContext2d,
    layout: &HandleLayout,
    offset: ScreenPoint,
    color: &str,
) {
    let local = |point: ScreenPoint| (point.x - offset.x, point.y - offset.y);
    ctx.set_stroke_style_str(color);
    ctx.set_fill_style_str(color);
    ctx.set_line_width(1.5);

    ctx.begin_path();
    for (index, (_, point)) in layout.handles.iter().enumerate() {
        let (x, y) = local(*point);
        if index == 0 {
            ctx.move_to(x, y);
        } else {
            ctx.line_to(x, y);
        }
    }
    ctx.close_path();
    ctx.stroke();

    if let Some(top) = layout.anchor(HandleKey::N) {
        let (x, y) = local(top);
        let (rx, ry) = local(layout.rotation);
        ctx.begin_path();
        ctx.move_to(x, y);
        ctx.line_to(rx, ry);
        ctx.stroke();
        ctx.begin_path();
        let _ = ctx.arc(rx, ry, HANDLE_SIZE / 2.0 + 1.0, 0.0, PI * 2.0);
        ctx.fill();
    }

    let half = HANDLE_SIZE / 2.0;
    for (_, point) in &layout.handles {
        let (x, y) = local(*point);
        ctx.fill_rect(x - half, y - half, HANDLE_SIZE, HANDLE_SIZE);
    }
    let (cx, cy) = local(layout.center);
    ctx.stroke_rect(cx - half, cy - half, HANDLE_SIZE, HANDLE_SIZE);
}

fn draw_toast(ctx: &CanvasRenderingContext2d, viewport: Extent, text: &str) {
    ctx.set_font("14px sans-serif");
    let width = ctx
        .measure_text(text)
        .map(|metrics| metrics.width())
        .unwrap_or(0.0);
    let x = (viewport.width - width) / 2.0 - 12.0;
    let y = viewport.height - 56.0;
    ctx.set_fill_style_str("rgba(20, 20, 24, 0.85)");
    ctx.fill_rect(x, y, width + 24.0, 32.0);
    ctx.set_fill_style_str("#fff");
    let _ = ctx.fill_text(text, x + 12.0, y + 21.0);
}
