use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq)]
pub struct ObjectPosition {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// One perceived object, assembled from independent records within a frame.
///
/// `kind` and `position` arrive separately and in any order; the object is
/// renderable only once both are present.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct TrackedObject {
    pub id: u32,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<ObjectPosition>,
}

impl TrackedObject {
    pub fn new(id: u32) -> Self {
        Self { id, kind: None, position: None }
    }

    pub fn is_renderable(&self) -> bool {
        self.kind.is_some() && self.position.is_some()
    }
}

/// Objects keyed by id. Ordered so redraws are deterministic.
pub type ObjectSet = BTreeMap<u32, TrackedObject>;

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq)]
pub struct GeodeticReading {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeodeticReading {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }
}

/// Static landmark listed in a map file.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct MapObject {
    pub id: i32,
    #[serde(rename = "type")]
    pub kind: i32,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    Yellow,
    Blue,
    Red,
    Green,
    Black,
}

impl Color {
    pub fn css(&self) -> &'static str {
        match self {
            Color::Yellow => "yellow",
            Color::Blue => "blue",
            Color::Red => "red",
            Color::Green => "green",
            Color::Black => "black",
        }
    }
}

/// Persistent point drawn on the map pane.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Marker {
    pub position: GeodeticReading,
    pub radius_m: f64,
    pub color: Color,
}
