//! Drawing of committed frames and geodetic readings.

pub mod canvas;
pub mod map;
pub mod objects;

pub use canvas::{Canvas, DrawCommand, Point, RecordingCanvas, SvgCanvas};
pub use map::{MapView, MapViewConfig, MapWidget, MarkerLayer};
pub use objects::{category_color, ObjectView, ObjectViewConfig};
