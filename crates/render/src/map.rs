use serde::{Deserialize, Serialize};

use model::{Color, GeodeticReading, MapObject, Marker};

use crate::objects::category_color;

/// Pan/zoom map with point markers.
pub trait MapWidget {
    fn set_view(&mut self, center: GeodeticReading, zoom: u8);
    fn add_marker(&mut self, marker: Marker);
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapViewConfig {
    pub initial_center: GeodeticReading,
    pub initial_zoom: u8,
    /// Zoom used when centring on the first reading.
    pub follow_zoom: u8,
    pub marker_radius_m: f64,
    pub marker_color: Color,
    pub landmark_radius_m: f64,
    pub landmark_palette: [Color; 3],
    pub landmark_default_color: Color,
}

impl Default for MapViewConfig {
    fn default() -> Self {
        Self {
            initial_center: GeodeticReading::new(57.70942631838934, 11.948822736740114),
            initial_zoom: 17,
            follow_zoom: 18,
            marker_radius_m: 1.0,
            marker_color: Color::Red,
            landmark_radius_m: 2.0,
            landmark_palette: [Color::Yellow, Color::Blue, Color::Red],
            landmark_default_color: Color::Black,
        }
    }
}

/// Centres once on the first reading and drops a marker for every reading.
/// Markers are never removed.
pub struct MapView {
    cfg: MapViewConfig,
    changed_view: bool,
}

impl MapView {
    pub fn new(cfg: MapViewConfig) -> Self {
        Self { cfg, changed_view: false }
    }

    pub fn init(&self, map: &mut impl MapWidget) {
        map.set_view(self.cfg.initial_center, self.cfg.initial_zoom);
    }

    pub fn has_centered(&self) -> bool {
        self.changed_view
    }

    pub fn on_reading(&mut self, map: &mut impl MapWidget, reading: GeodeticReading) {
        if !self.changed_view {
            map.set_view(reading, self.cfg.follow_zoom);
            self.changed_view = true;
        }
        map.add_marker(Marker {
            position: reading,
            radius_m: self.cfg.marker_radius_m,
            color: self.cfg.marker_color,
        });
    }

    /// Static landmarks, colored by type.
    pub fn add_landmarks(&self, map: &mut impl MapWidget, objects: &[MapObject]) {
        for o in objects {
            map.add_marker(Marker {
                position: GeodeticReading::new(o.latitude, o.longitude),
                radius_m: self.cfg.landmark_radius_m,
                color: category_color(
                    o.kind as i64,
                    &self.cfg.landmark_palette,
                    self.cfg.landmark_default_color,
                ),
            });
        }
    }
}

/// In-memory map widget: the current view plus every marker ever added.
#[derive(Clone, Debug, Default)]
pub struct MarkerLayer {
    view: Option<(GeodeticReading, u8)>,
    view_changes: usize,
    markers: Vec<Marker>,
}

impl MarkerLayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn view(&self) -> Option<(GeodeticReading, u8)> {
        self.view
    }

    pub fn view_changes(&self) -> usize {
        self.view_changes
    }

    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }
}

impl MapWidget for MarkerLayer {
    fn set_view(&mut self, center: GeodeticReading, zoom: u8) {
        self.view = Some((center, zoom));
        self.view_changes += 1;
    }

    fn add_marker(&mut self, marker: Marker) {
        self.markers.push(marker);
    }
}
