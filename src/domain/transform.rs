//! Mapping between world coordinates (meters, y up) and display coordinates (pixels, y down).

use super::Position;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CoordinateTransformer {
    scale: f64,
    frame_height: f64,
}

impl CoordinateTransformer {
    /// `scale` is in pixels per meter, `frame_height` in pixels.
    pub const fn new(scale: f64, frame_height: f64) -> Self {
        Self {
            scale,
            frame_height,
        }
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn frame_height(&self) -> f64 {
        self.frame_height
    }

    pub fn to_display(&self, position: Position) -> Position {
        Position::new(
            position.x() * self.scale,
            self.frame_height - position.y() * self.scale,
        )
    }

    pub fn to_world(&self, position: Position) -> Position {
        Position::new(
            position.x() / self.scale,
            (self.frame_height - position.y()) / self.scale,
        )
    }
}
