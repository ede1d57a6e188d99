use std::path::{Path, PathBuf};

use svg::node::element::{Circle, Line, Rectangle};
use svg::Document;

use model::Color;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Minimal 2D drawing surface.
pub trait Canvas {
    fn width(&self) -> f64;
    fn height(&self) -> f64;
    fn clear(&mut self);
    fn stroke_line(&mut self, from: Point, to: Point);
    fn fill_circle(&mut self, center: Point, radius: f64, color: Color);
    /// Called once a full redraw is done.
    fn present(&mut self) {}
}

#[derive(Clone, Debug, PartialEq)]
pub enum DrawCommand {
    Line { from: Point, to: Point },
    Circle { center: Point, radius: f64, color: Color },
}

/// Keeps what is currently on the surface as a list of commands.
#[derive(Clone, Debug)]
pub struct RecordingCanvas {
    width: f64,
    height: f64,
    commands: Vec<DrawCommand>,
    presented: usize,
}

impl RecordingCanvas {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height, commands: Vec::new(), presented: 0 }
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    pub fn circles(&self) -> impl Iterator<Item = (Point, f64, Color)> + '_ {
        self.commands.iter().filter_map(|c| match *c {
            DrawCommand::Circle { center, radius, color } => Some((center, radius, color)),
            DrawCommand::Line { .. } => None,
        })
    }

    /// Number of completed redraws.
    pub fn presented(&self) -> usize {
        self.presented
    }
}

impl Canvas for RecordingCanvas {
    fn width(&self) -> f64 {
        self.width
    }

    fn height(&self) -> f64 {
        self.height
    }

    fn clear(&mut self) {
        self.commands.clear();
    }

    fn stroke_line(&mut self, from: Point, to: Point) {
        self.commands.push(DrawCommand::Line { from, to });
    }

    fn fill_circle(&mut self, center: Point, radius: f64, color: Color) {
        self.commands.push(DrawCommand::Circle { center, radius, color });
    }

    fn present(&mut self) {
        self.presented += 1;
    }
}

/// Canvas backed by an SVG document, optionally rewritten to a file on
/// every `present`.
pub struct SvgCanvas {
    surface: RecordingCanvas,
    output: Option<PathBuf>,
}

impl SvgCanvas {
    pub fn new(width: f64, height: f64) -> Self {
        Self { surface: RecordingCanvas::new(width, height), output: None }
    }

    pub fn with_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = Some(path.into());
        self
    }

    pub fn surface(&self) -> &RecordingCanvas {
        &self.surface
    }

    pub fn to_document(&self) -> Document {
        let (w, h) = (self.surface.width, self.surface.height);
        let mut doc = Document::new()
            .set("width", w)
            .set("height", h)
            .set("viewBox", format!("0 0 {} {}", w, h));

        doc = doc.add(
            Rectangle::new()
                .set("x", 0)
                .set("y", 0)
                .set("width", w)
                .set("height", h)
                .set("fill", "white"),
        );

        for cmd in self.surface.commands() {
            match *cmd {
                DrawCommand::Line { from, to } => {
                    doc = doc.add(
                        Line::new()
                            .set("x1", from.x)
                            .set("y1", from.y)
                            .set("x2", to.x)
                            .set("y2", to.y)
                            .set("stroke", "black")
                            .set("stroke-width", 1),
                    );
                }
                DrawCommand::Circle { center, radius, color } => {
                    doc = doc.add(
                        Circle::new()
                            .set("cx", center.x)
                            .set("cy", center.y)
                            .set("r", radius)
                            .set("fill", color.css()),
                    );
                }
            }
        }
        doc
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        svg::save(path, &self.to_document())
    }
}

impl Canvas for SvgCanvas {
    fn width(&self) -> f64 {
        self.surface.width()
    }

    fn height(&self) -> f64 {
        self.surface.height()
    }

    fn clear(&mut self) {
        self.surface.clear();
    }

    fn stroke_line(&mut self, from: Point, to: Point) {
        self.surface.stroke_line(from, to);
    }

    fn fill_circle(&mut self, center: Point, radius: f64, color: Color) {
        self.surface.fill_circle(center, radius, color);
    }

    fn present(&mut self) {
        self.surface.present();
        if let Some(path) = &self.output {
            if let Err(e) = self.save(path) {
                log::error!("Failed to write {}: {}", path.display(), e);
            }
        }
    }
}
