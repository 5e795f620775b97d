use serde::{Deserialize, Serialize};

macro_rules! point_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq)]
        pub struct $name {
            pub x: f64,
            pub y: f64,
        }

        impl $name {
            pub const ORIGIN: Self = Self { x: 0.0, y: 0.0 };

            pub fn new(x: f64, y: f64) -> Self {
                Self { x, y }
            }

            pub fn distance(self, other: Self) -> f64 {
                (other.x - self.x).hypot(other.y - self.y)
            }

            pub fn is_finite(self) -> bool {
                self.x.is_finite() && self.y.is_finite()
            }
        }
    };
}

point_type!(
    /// Canvas pixels relative to the viewport's top-left corner.
    ScreenPoint
);
point_type!(
    /// Camera-independent space. Map transform positions live here.
    WorldPoint
);
point_type!(
    /// The map's own pre-transform space: tokens, grid and calibration points.
    MapPoint
);
point_type!(
    /// A sprite's own space, centred on its anchor.
    LocalPoint
);

/// Column-major 2D affine matrix: `x' = a*x + c*y + tx`, `y' = b*x + d*y + ty`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Affine {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub tx: f64,
    pub ty: f64,
}

impl Default for Affine {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Affine {
    pub const IDENTITY: Self = Self {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        tx: 0.0,
        ty: 0.0,
    };

    pub fn translate(x: f64, y: f64) -> Self {
        Self {
            tx: x,
            ty: y,
            ..Self::IDENTITY
        }
    }

    pub fn scale(sx: f64, sy: f64) -> Self {
        Self {
            a: sx,
            d: sy,
            ..Self::IDENTITY
        }
    }

    pub fn rotate(deg: f64) -> Self {
        let (sin, cos) = deg_to_rad(deg).sin_cos();
        Self {
            a: cos,
            b: sin,
            c: -sin,
            d: cos,
            tx: 0.0,
            ty: 0.0,
        }
    }

    /// Position, scale, rotation and skew composed the way a retained 2D
    /// scene graph composes a node's local transform.
    pub fn from_parts(
        x: f64,
        y: f64,
        scale_x: f64,
        scale_y: f64,
        rotation_deg: f64,
        skew_x_deg: f64,
        skew_y_deg: f64,
    ) -> Self {
        let rotation = deg_to_rad(rotation_deg);
        let skew_x = deg_to_rad(skew_x_deg);
        let skew_y = deg_to_rad(skew_y_deg);
        Self {
            a: (rotation + skew_y).cos() * scale_x,
            b: (rotation + skew_y).sin() * scale_x,
            c: -(rotation - skew_x).sin() * scale_y,
            d: (rotation - skew_x).cos() * scale_y,
            tx: x,
            ty: y,
        }
    }

    /// `self` applied after `inner`: the result maps through `inner` first.
    pub fn multiply(&self, inner: &Affine) -> Affine {
        Affine {
            a: self.a * inner.a + self.c * inner.b,
            b: self.b * inner.a + self.d * inner.b,
            c: self.a * inner.c + self.c * inner.d,
            d: self.b * inner.c + self.d * inner.d,
            tx: self.a * inner.tx + self.c * inner.ty + self.tx,
            ty: self.b * inner.tx + self.d * inner.ty + self.ty,
        }
    }

    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.a * x + self.c * y + self.tx,
            self.b * x + self.d * y + self.ty,
        )
    }

    pub fn determinant(&self) -> f64 {
        self.a * self.d - self.b * self.c
    }

    pub fn inverse(&self) -> Option<Affine> {
        let det = self.determinant();
        if det.abs() < f64::EPSILON || !det.is_finite() {
            return None;
        }
        let a = self.d / det;
        let b = -self.b / det;
        let c = -self.c / det;
        let d = self.a / det;
        Some(Affine {
            a,
            b,
            c,
            d,
            tx: -(a * self.tx + c * self.ty),
            ty: -(b * self.tx + d * self.ty),
        })
    }

    /// Length of the transformed unit x axis.
    pub fn scale_x(&self) -> f64 {
        self.a.hypot(self.b)
    }
}

pub fn deg_to_rad(deg: f64) -> f64 {
    deg.to_radians()
}

pub fn rad_to_deg(rad: f64) -> f64 {
    rad.to_degrees()
}

/// Wraps into `[0, 360)`. Values already in range come back unchanged.
pub fn normalize_angle(deg: f64) -> f64 {
    if !deg.is_finite() {
        return 0.0;
    }
    let mut wrapped = deg % 360.0;
    if wrapped < 0.0 {
        wrapped += 360.0;
    }
    if wrapped >= 360.0 || wrapped == 0.0 {
        return 0.0;
    }
    wrapped
}

/// Missing or non-finite input falls back to `default`, never to a bound.
pub fn clamp_or(value: Option<f64>, min: f64, max: f64, default: f64) -> f64 {
    match value {
        Some(value) if value.is_finite() => value.clamp(min, max),
        _ => default,
    }
}

/// Nearest multiple of `step`; exact halves round towards positive infinity.
pub fn snap_step(value: f64, step: f64) -> f64 {
    if step <= 0.0 || !step.is_finite() {
        return value;
    }
    round_half_up(value / step) * step
}

pub fn round_half_up(value: f64) -> f64 {
    (value + 0.5).floor()
}

pub fn rotate_point(x: f64, y: f64, deg: f64) -> (f64, f64) {
    let (sin, cos) = deg_to_rad(deg).sin_cos();
    (x * cos - y * sin, x * sin + y * cos)
}

/// Angle of `point` around `center` in screen space, in degrees.
pub fn angle_between(center: ScreenPoint, point: ScreenPoint) -> f64 {
    rad_to_deg((point.y - center.y).atan2(point.x - center.x))
}
