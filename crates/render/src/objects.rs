use serde::{Deserialize, Serialize};

use model::{Color, ObjectPosition, ObjectSet};

use crate::canvas::{Canvas, Point};

/// Layout of the top-down object view.
///
/// The vehicle sits at the bottom centre. `lon_distance` metres ahead reach
/// the top edge, `lat_distance` metres to either side reach the side edges.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectViewConfig {
    pub width: f64,
    pub height: f64,
    pub lon_distance: f64,
    pub lat_distance: f64,
    pub radius: f64,
    /// Colors for object types 0, 1 and 2.
    pub palette: [Color; 3],
    pub default_color: Color,
}

impl Default for ObjectViewConfig {
    fn default() -> Self {
        Self {
            width: 500.0,
            height: 500.0,
            lon_distance: 50.0,
            lat_distance: 20.0,
            radius: 5.0,
            palette: [Color::Yellow, Color::Blue, Color::Red],
            default_color: Color::Black,
        }
    }
}

/// Three-way categorical color lookup; anything outside 0..=2 gets `default`.
/// Keyed on the object type, not the resolved color, so types 1 and 2 are reachable.
pub fn category_color(kind: i64, palette: &[Color; 3], default: Color) -> Color {
    usize::try_from(kind)
        .ok()
        .and_then(|i| palette.get(i).copied())
        .unwrap_or(default)
}

pub struct ObjectView {
    cfg: ObjectViewConfig,
}

impl ObjectView {
    pub fn new(cfg: ObjectViewConfig) -> Self {
        Self { cfg }
    }

    pub fn color_for(&self, kind: u32) -> Color {
        category_color(kind as i64, &self.cfg.palette, self.cfg.default_color)
    }

    /// Vehicle-local `x` (ahead) and `y` (left) to canvas pixels.
    pub fn to_canvas(&self, p: &ObjectPosition, width: f64, height: f64) -> Point {
        let half_width = width / 2.0;
        Point {
            x: half_width - half_width * (p.y / self.cfg.lat_distance),
            y: height - height * (p.x / self.cfg.lon_distance),
        }
    }

    /// Blank surface with the vertical centre line.
    pub fn clear(&self, canvas: &mut impl Canvas) {
        let (w, h) = (canvas.width(), canvas.height());
        canvas.clear();
        canvas.stroke_line(Point::new(w / 2.0, 0.0), Point::new(w / 2.0, h));
    }

    pub fn draw(&self, canvas: &mut impl Canvas, objects: &ObjectSet) {
        self.clear(canvas);
        let (w, h) = (canvas.width(), canvas.height());

        for (id, obj) in objects {
            let Some(kind) = obj.kind else {
                continue;
            };
            let Some(position) = obj.position else {
                log::warn!("Warning: Object missing position (id {})", id);
                continue;
            };
            let center = self.to_canvas(&position, w, h);
            canvas.fill_circle(center, self.cfg.radius, self.color_for(kind));
        }
        canvas.present();
    }
}
