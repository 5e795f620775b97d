//! Grid algebra in map-local space: snapping, two-point calibration and
//! the ruler measurement.

use tracing::debug;

use crate::geometry::{normalize_angle, rad_to_deg, rotate_point, snap_step, MapPoint};
use crate::scene::{Grid, Units, MAX_GRID, MIN_GRID};
use crate::store::SceneStore;

pub const MIN_CALIBRATION_CELLS: f64 = 0.1;
pub const MAX_CALIBRATION_CELLS: f64 = 1000.0;

/// Rounds `point` to the nearest line intersection of `grid`.
///
/// Works in the frame the grid layer is drawn in: lines sit at
/// `offset + k * size` after rotating by `-rotation_deg`.
pub fn snap_to_grid(point: MapPoint, grid: &Grid) -> MapPoint {
    if !grid.enabled || !(grid.size > 0.0) {
        return point;
    }
    let (ax, ay) = rotate_point(point.x, point.y, -grid.rotation_deg);
    let sx = snap_step(ax - grid.offset_x, grid.size) + grid.offset_x;
    let sy = snap_step(ay - grid.offset_y, grid.size) + grid.offset_y;
    let (x, y) = rotate_point(sx, sy, grid.rotation_deg);
    MapPoint::new(x, y)
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GridCalibration {
    pub size: f64,
    pub rotation_deg: f64,
    pub offset_x: f64,
    pub offset_y: f64,
}

/// Size, rotation and offset such that `start` to `end` spans `cells`
/// cells and `start` sits on an intersection. `None` for degenerate input.
pub fn calibrate_grid(start: MapPoint, end: MapPoint, cells: f64) -> Option<GridCalibration> {
    if !cells.is_finite() || cells <= 0.0 {
        return None;
    }
    let cells = cells.clamp(MIN_CALIBRATION_CELLS, MAX_CALIBRATION_CELLS);
    let dx = end.x - start.x;
    let dy = end.y - start.y;
    let distance = dx.hypot(dy);
    if !distance.is_finite() || distance <= 0.0 {
        return None;
    }
    let size = (distance / cells).clamp(MIN_GRID, MAX_GRID);
    let rotation_deg = normalize_angle(rad_to_deg(dy.atan2(dx)));
    let (ax, ay) = rotate_point(start.x, start.y, -rotation_deg);
    Some(GridCalibration {
        size,
        rotation_deg,
        offset_x: wrap_positive(ax, size),
        offset_y: wrap_positive(ay, size),
    })
}

fn wrap_positive(value: f64, size: f64) -> f64 {
    let wrapped = value.rem_euclid(size);
    if wrapped.is_finite() && wrapped < size {
        wrapped
    } else {
        0.0
    }
}

/// Two-click calibration flow driven by the canvas.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum CalibrationState {
    #[default]
    Idle,
    Collecting {
        points: Vec<MapPoint>,
    },
    Ready {
        start: MapPoint,
        end: MapPoint,
        cells_input: String,
    },
}

impl CalibrationState {
    pub fn begin(&mut self) {
        *self = Self::Collecting { points: Vec::new() };
    }

    /// Returns true when the second point completes the pair.
    pub fn add_point(&mut self, point: MapPoint) -> bool {
        let Self::Collecting { points } = self else {
            return false;
        };
        points.push(point);
        if let [start, end] = points[..] {
            *self = Self::Ready {
                start,
                end,
                cells_input: String::new(),
            };
            return true;
        }
        false
    }

    pub fn set_cells_input(&mut self, value: &str) {
        if let Self::Ready { cells_input, .. } = self {
            *cells_input = value.to_string();
        }
    }

    /// Applies the calibration. Degenerate input leaves the prompt open.
    pub fn confirm(&mut self, store: &mut SceneStore) -> bool {
        let Self::Ready {
            start,
            end,
            cells_input,
        } = self
        else {
            return false;
        };
        let cells = cells_input.trim().parse::<f64>().unwrap_or(f64::NAN);
        if !store.calibrate_grid(*start, *end, cells) {
            debug!(cells = %cells_input, "calibration input rejected");
            return false;
        }
        *self = Self::Idle;
        true
    }

    pub fn cancel(&mut self) {
        *self = Self::Idle;
    }

    pub fn points(&self) -> Vec<MapPoint> {
        match self {
            Self::Idle => Vec::new(),
            Self::Collecting { points } => points.clone(),
            Self::Ready { start, end, .. } => vec![*start, *end],
        }
    }

    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Idle)
    }

    pub fn is_collecting(&self) -> bool {
        matches!(self, Self::Collecting { .. })
    }
}

/// A ruler drag in map-local space. Releasing clears it.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RulerState {
    pub start: Option<MapPoint>,
    pub end: Option<MapPoint>,
}

impl RulerState {
    pub fn begin(&mut self, point: MapPoint) {
        self.start = Some(point);
        self.end = Some(point);
    }

    pub fn drag(&mut self, point: MapPoint) {
        if self.start.is_some() {
            self.end = Some(point);
        }
    }

    pub fn end(&mut self) {
        *self = Self::default();
    }

    pub fn is_dragging(&self) -> bool {
        self.start.is_some()
    }

    pub fn segment(&self) -> Option<(MapPoint, MapPoint)> {
        Some((self.start?, self.end?))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Measurement {
    pub cells: f64,
    pub units: f64,
    pub label: String,
}

pub fn measure(start: MapPoint, end: MapPoint, grid: &Grid, units: &Units) -> Measurement {
    let cells = if grid.size > 0.0 {
        start.distance(end) / grid.size
    } else {
        0.0
    };
    let total = cells * units.units_per_grid;
    Measurement {
        cells,
        units: total,
        label: format!("{cells:.1} cells / {total:.1} {}", units.label),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn grid(size: f64, rotation_deg: f64, offset_x: f64, offset_y: f64) -> Grid {
        Grid {
            size,
            rotation_deg,
            offset_x,
            offset_y,
            ..Grid::default()
        }
    }

    #[test]
    fn calibrates_horizontal_span() {
        let calibration =
            calibrate_grid(MapPoint::new(0.0, 0.0), MapPoint::new(100.0, 0.0), 4.0).unwrap();
        assert!(close(calibration.size, 25.0));
        assert!(close(calibration.rotation_deg, 0.0));
        assert!(close(calibration.offset_x, 0.0));
        assert!(close(calibration.offset_y, 0.0));
    }

    #[test]
    fn calibrated_start_lies_on_an_intersection() {
        let start = MapPoint::new(10.0, 10.0);
        let calibration = calibrate_grid(start, MapPoint::new(10.0, 110.0), 5.0).unwrap();
        assert!(close(calibration.size, 20.0));
        assert!((calibration.rotation_deg - 90.0).abs() < 1e-9);
        assert!((calibration.offset_x - 10.0).abs() < 1e-9);
        assert!((calibration.offset_y - 10.0).abs() < 1e-9);

        let calibrated = grid(
            calibration.size,
            calibration.rotation_deg,
            calibration.offset_x,
            calibration.offset_y,
        );
        let snapped = snap_to_grid(start, &calibrated);
        assert!((snapped.x - start.x).abs() < 1e-6);
        assert!((snapped.y - start.y).abs() < 1e-6);
    }

    #[test]
    fn negative_coordinates_wrap_to_positive_offsets() {
        let calibration =
            calibrate_grid(MapPoint::new(-30.0, -5.0), MapPoint::new(70.0, -5.0), 4.0).unwrap();
        assert!(close(calibration.offset_x, 20.0));
        assert!(close(calibration.offset_y, 20.0));
    }

    #[test]
    fn degenerate_calibration_is_rejected() {
        let p = MapPoint::new(5.0, 5.0);
        assert!(calibrate_grid(p, p, 4.0).is_none());
        assert!(calibrate_grid(p, MapPoint::new(50.0, 5.0), 0.0).is_none());
        assert!(calibrate_grid(p, MapPoint::new(50.0, 5.0), f64::NAN).is_none());
        assert!(calibrate_grid(p, MapPoint::new(50.0, 5.0), -3.0).is_none());
    }

    #[test]
    fn calibration_size_is_clamped() {
        let tiny = calibrate_grid(MapPoint::ORIGIN, MapPoint::new(10.0, 0.0), 100.0).unwrap();
        assert_eq!(tiny.size, MIN_GRID);
    }

    #[test]
    fn snaps_to_nearest_intersection() {
        let snapped = snap_to_grid(MapPoint::new(23.0, 71.0), &grid(50.0, 0.0, 0.0, 0.0));
        assert_eq!(snapped, MapPoint::new(0.0, 50.0));
    }

    #[test]
    fn snapping_ties_round_up() {
        let snapped = snap_to_grid(MapPoint::new(25.0, -25.0), &grid(50.0, 0.0, 0.0, 0.0));
        assert_eq!(snapped, MapPoint::new(50.0, 0.0));
    }

    #[test]
    fn snapping_respects_offset() {
        let snapped = snap_to_grid(MapPoint::new(16.0, 14.0), &grid(20.0, 0.0, 5.0, 5.0));
        assert_eq!(snapped, MapPoint::new(25.0, 5.0));
    }

    #[test]
    fn disabled_grid_leaves_point_alone() {
        let mut disabled = grid(50.0, 0.0, 0.0, 0.0);
        disabled.enabled = false;
        let point = MapPoint::new(23.0, 71.0);
        assert_eq!(snap_to_grid(point, &disabled), point);
    }

    #[test]
    fn snapping_commutes_with_quarter_turn() {
        let point = MapPoint::new(23.0, 71.0);
        let flat = snap_to_grid(point, &grid(50.0, 0.0, 0.0, 0.0));
        let (rx, ry) = rotate_point(point.x, point.y, 90.0);
        let turned = snap_to_grid(MapPoint::new(rx, ry), &grid(50.0, 90.0, 0.0, 0.0));
        let (ex, ey) = rotate_point(flat.x, flat.y, 90.0);
        assert!((turned.x - ex).abs() < 1e-6);
        assert!((turned.y - ey).abs() < 1e-6);
    }

    #[test]
    fn calibration_state_collects_two_points() {
        let mut state = CalibrationState::default();
        assert!(!state.add_point(MapPoint::ORIGIN));
        state.begin();
        assert!(state.is_collecting());
        assert!(!state.add_point(MapPoint::new(0.0, 0.0)));
        assert!(state.add_point(MapPoint::new(100.0, 0.0)));
        assert_eq!(state.points().len(), 2);
        assert!(!state.is_collecting());
        assert!(state.is_active());
    }

    #[test]
    fn confirm_applies_or_stays_open() {
        let mut store = SceneStore::default();
        let mut state = CalibrationState::default();
        state.begin();
        state.add_point(MapPoint::new(0.0, 0.0));
        state.add_point(MapPoint::new(100.0, 0.0));

        state.set_cells_input("zero");
        assert!(!state.confirm(&mut store));
        assert!(matches!(state, CalibrationState::Ready { .. }));
        assert_eq!(store.scene().grid.size, 64.0);

        state.set_cells_input(" 4 ");
        assert!(state.confirm(&mut store));
        assert_eq!(state, CalibrationState::Idle);
        assert!(close(store.scene().grid.size, 25.0));
    }

    #[test]
    fn ruler_reports_cells_and_units() {
        let grid = grid(50.0, 0.0, 0.0, 0.0);
        let measurement = measure(
            MapPoint::new(0.0, 0.0),
            MapPoint::new(150.0, 0.0),
            &grid,
            &Units::default(),
        );
        assert!(close(measurement.cells, 3.0));
        assert!(close(measurement.units, 15.0));
        assert_eq!(measurement.label, "3.0 cells / 15.0 ft");
    }

    #[test]
    fn ruler_tracks_drag_until_release() {
        let mut ruler = RulerState::default();
        ruler.drag(MapPoint::new(1.0, 1.0));
        assert_eq!(ruler.segment(), None);
        ruler.begin(MapPoint::ORIGIN);
        ruler.drag(MapPoint::new(3.0, 4.0));
        assert_eq!(
            ruler.segment(),
            Some((MapPoint::ORIGIN, MapPoint::new(3.0, 4.0)))
        );
        ruler.end();
        assert!(!ruler.is_dragging());
        assert_eq!(ruler.segment(), None);
    }
}
