//! Static line segment obstacles.

use thiserror::Error;

use super::{collision::EPSILON, Angle, HasShape, Position, Shape};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ObstacleRegistry {
    segments: Vec<LineSegment>,
}

impl ObstacleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Segments in insertion order.
    pub fn segments(&self) -> &[LineSegment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn add_segment(&mut self, p1: Position, p2: Position) -> Result<(), ObstacleError> {
        self.segments.push(LineSegment::try_new(p1, p2)?);
        Ok(())
    }

    /// Adds the four edges of the axis-aligned rectangle spanned by two opposite corners.
    ///
    /// Either all four edges are added or, for a rectangle without area, none.
    pub fn add_rectangle(&mut self, c_1: Position, c_2: Position) -> Result<(), ObstacleError> {
        let edges = rectangle_edges(c_1, c_2)
            .into_iter()
            .map(|(p1, p2)| LineSegment::try_new(p1, p2))
            .collect::<Result<Vec<_>, _>>()?;
        self.segments.extend(edges);
        Ok(())
    }

    /// Finish lines are not part of the obstacle geometry.
    pub fn add_finish_line(&mut self, _p1: Position, _p2: Position) {}
}

/// Edges starting at `c_1`, visiting `(c_1.x, c_2.y)`, `c_2` and `(c_2.x, c_1.y)`.
fn rectangle_edges(c_1: Position, c_2: Position) -> [(Position, Position); 4] {
    let c_12 = Position::new(c_1.x(), c_2.y());
    let c_21 = Position::new(c_2.x(), c_1.y());
    [(c_1, c_12), (c_12, c_2), (c_2, c_21), (c_21, c_1)]
}

#[derive(Error, Debug, PartialEq)]
pub enum ObstacleError {
    #[error("degenerate geometry: segment endpoints coincide at {0:?}")]
    DegenerateGeometry(Position),
}

#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub struct LineSegment {
    p1: Position,
    p2: Position,
}

impl LineSegment {
    pub fn try_new(p1: Position, p2: Position) -> Result<Self, ObstacleError> {
        if p1 == p2 {
            return Err(ObstacleError::DegenerateGeometry(p1));
        }
        Ok(Self { p1, p2 })
    }

    pub fn p1(&self) -> Position {
        self.p1
    }

    pub fn p2(&self) -> Position {
        self.p2
    }

    /// Distance along a ray to its first point on the segment.
    pub fn intersect_with_ray(&self, ray_origin: Position, angle: Angle) -> Option<f64> {
        let direction = Position::unit(angle);
        let edge = self.p2 - self.p1;
        let w = self.p1 - ray_origin;
        let denominator = direction.cross(edge);

        if denominator.abs() < EPSILON * edge.norm() {
            // Ray and segment are parallel, only a collinear segment can be hit
            if w.cross(direction).abs() >= EPSILON {
                return None;
            }
            let t_1 = w.dot(direction);
            let t_2 = (self.p2 - ray_origin).dot(direction);
            let (t_min, t_max) = (t_1.min(t_2), t_1.max(t_2));
            return if t_min <= 0.0 && t_max >= 0.0 {
                Some(0.0)
            } else if t_min > 0.0 {
                Some(t_min)
            } else {
                None
            };
        }

        let t = w.cross(edge) / denominator;
        let u = w.cross(direction) / denominator;

        if t < -EPSILON || !(-EPSILON..=1.0 + EPSILON).contains(&u) {
            return None;
        }

        Some(t.max(0.0))
    }
}

impl HasShape for LineSegment {
    fn shape(&self) -> Shape {
        Shape::Segment(*self)
    }
}
