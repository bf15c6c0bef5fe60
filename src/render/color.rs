use opencv::core::Scalar;

/// Display color in the raster's channel order (B, G, R).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color(pub u8, pub u8, pub u8);

impl Color {
    /// Each channel scaled by 0.7, truncated.
    pub fn darkened(self) -> Self {
        let dim = |c: u8| (c as f64 * 0.7) as u8;
        Color(dim(self.0), dim(self.1), dim(self.2))
    }

    pub fn mean(self) -> f32 {
        (self.0 as f32 + self.1 as f32 + self.2 as f32) / 3.0
    }

    /// Black on bright backgrounds, white otherwise.
    pub fn contrasting_text(self) -> Self {
        if self.mean() > 127.0 {
            Color(0, 0, 0)
        } else {
            Color(255, 255, 255)
        }
    }

    pub fn to_scalar(self) -> Scalar {
        Scalar::new(self.0 as f64, self.1 as f64, self.2 as f64, 0.0)
    }
}

/// Curated high-contrast colors for the first class ids.
pub const PALETTE: [Color; 20] = [
    Color(0, 255, 0),
    Color(255, 0, 0),
    Color(0, 0, 255),
    Color(255, 255, 0),
    Color(255, 0, 255),
    Color(0, 255, 255),
    Color(128, 0, 128),
    Color(255, 165, 0),
    Color(0, 128, 255),
    Color(255, 20, 147),
    Color(0, 255, 127),
    Color(255, 105, 180),
    Color(64, 224, 208),
    Color(255, 69, 0),
    Color(50, 205, 50),
    Color(138, 43, 226),
    Color(255, 140, 0),
    Color(72, 61, 139),
    Color(220, 20, 60),
    Color(0, 206, 209),
];

const GOLDEN_ANGLE: f64 = 137.508;
const SATURATION: f64 = 0.9;
const VALUE: f64 = 0.9;

/// Deterministic class color. Ids past the palette step around the hue
/// circle by the golden angle.
pub fn color_for(class_id: usize) -> Color {
    if let Some(color) = PALETTE.get(class_id) {
        return *color;
    }

    let hue = (class_id as f64 * GOLDEN_ANGLE) % 360.0;
    let (r, g, b) = hsv_to_rgb(hue / 360.0, SATURATION, VALUE);
    let channel = |c: f64| (c * 255.0).round() as u8;
    Color(channel(b), channel(g), channel(r))
}

/// `h`, `s`, `v` in `[0, 1]`; returns `(r, g, b)` in `[0, 1]`.
fn hsv_to_rgb(h: f64, s: f64, v: f64) -> (f64, f64, f64) {
    if s == 0.0 {
        return (v, v, v);
    }
    let sector = (h * 6.0).floor();
    let f = h * 6.0 - sector;
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));
    match (sector as i64).rem_euclid(6) {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    }
}
