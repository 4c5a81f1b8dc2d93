//! Shapes sensor beams can hit.

use super::{Angle, LineSegment, Position};

/// Tolerance used for parallelism and extent checks.
pub const EPSILON: f64 = 1e-9;

pub trait HasShape {
    fn shape(&self) -> Shape;
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Shape {
    Circle { position: Position, radius: f64 },
    Segment(LineSegment),
}

impl Shape {
    /// Distance from `ray_origin` to the nearest intersection ahead of it, if any.
    pub fn intersect_with_ray(&self, ray_origin: Position, angle: Angle) -> Option<f64> {
        match self {
            Shape::Circle { position, radius } => {
                circle_intersect_with_ray(*position, *radius, ray_origin, angle)
            }
            Shape::Segment(segment) => segment.intersect_with_ray(ray_origin, angle),
        }
    }
}

/// Solves `|o + t·d - c|² = r²` for the smallest `t >= 0`.
///
/// A ray starting inside the circle reports the exit point.
fn circle_intersect_with_ray(
    center: Position,
    radius: f64,
    ray_origin: Position,
    angle: Angle,
) -> Option<f64> {
    let direction = Position::unit(angle);
    let f = ray_origin - center;
    let b = f.dot(direction);
    let c = f.dot(f) - radius.powi(2);
    let discriminant = b.powi(2) - c;

    if discriminant < 0.0 {
        return None;
    }

    let root = discriminant.sqrt();
    let near = -b - root;
    let far = -b + root;

    if near >= 0.0 {
        Some(near)
    } else if far >= 0.0 {
        Some(far)
    } else {
        None
    }
}
