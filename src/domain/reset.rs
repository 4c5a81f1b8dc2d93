//! Sends robots back to their reset pose when they come too close to an obstacle or leave the
//! world.

use super::{Position, Robot, ToFReading};

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ResetCause {
    /// Nearest obstacle seen by any beam, below the allowed distance.
    Proximity(f64),
    OutOfBounds(Position),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ResetPolicy {
    threshold: f64,
    width: f64,
    height: f64,
}

impl ResetPolicy {
    /// `threshold` is measured from the sensor, `width` and `height` span the world from the
    /// origin.
    pub fn new(threshold: f64, width: f64, height: f64) -> Self {
        Self {
            threshold,
            width,
            height,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn contains(&self, position: Position) -> bool {
        (0.0..=self.width).contains(&position.x()) && (0.0..=self.height).contains(&position.y())
    }

    pub fn evaluate(&self, robot: &Robot, reading: &ToFReading) -> Option<ResetCause> {
        let limit = self.threshold + robot.config().sensors().mount_offset();
        if let Some(distance) = reading.min_distance().filter(|d| *d < limit) {
            return Some(ResetCause::Proximity(distance));
        }
        let position = robot.position();
        (!self.contains(position)).then_some(ResetCause::OutOfBounds(position))
    }

    /// Resets the robot if needed and reports why.
    pub fn apply(&self, robot: &mut Robot, reading: &ToFReading) -> Option<ResetCause> {
        let cause = self.evaluate(robot, reading)?;
        robot.reset();
        Some(cause)
    }
}
