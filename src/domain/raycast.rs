//! Time-of-flight sensor beams cast against circles and line segments.

use std::f64::consts::PI;

use super::{Angle, Pose, Position, Shape};

/// Distance reported by a beam without an obstacle in range.
pub const NO_HIT: f64 = f64::INFINITY;

/// Mounting of a ring of ToF sensors on a robot body.
#[derive(Clone, Debug, PartialEq)]
pub struct SensorGeometry {
    angles: Vec<Angle>,
    mount_offset: f64,
    max_range: f64,
}

impl SensorGeometry {
    pub fn new(angles: Vec<Angle>, mount_offset: f64, max_range: f64) -> Self {
        Self {
            angles,
            mount_offset,
            max_range,
        }
    }

    /// `count` sensors evenly spaced around the body, the first one facing forward.
    pub fn ring(count: usize, mount_offset: f64, max_range: f64) -> Self {
        let angles = (0..count)
            .map(|i| Angle::new(i as f64 * 2.0 * PI / count as f64))
            .collect();
        Self::new(angles, mount_offset, max_range)
    }

    pub fn count(&self) -> usize {
        self.angles.len()
    }

    /// Offsets relative to the robot heading.
    pub fn angles(&self) -> &[Angle] {
        &self.angles
    }

    pub fn mount_offset(&self) -> f64 {
        self.mount_offset
    }

    pub fn max_range(&self) -> f64 {
        self.max_range
    }

    /// World heading of each beam.
    pub fn headings(&self, pose: Pose) -> impl Iterator<Item = Angle> + '_ {
        self.angles.iter().map(move |a| pose.heading + *a)
    }

    /// Sensor position of a beam with the given world heading.
    pub fn origin(&self, pose: Pose, heading: Angle) -> Position {
        pose.position.along(heading, self.mount_offset)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Beam {
    origin: Position,
    distance: f64,
    hit_point: Position,
}

impl Beam {
    pub fn origin(&self) -> Position {
        self.origin
    }

    /// Distance from the sensor to the hit point, [`NO_HIT`] if nothing is in range.
    pub fn distance(&self) -> f64 {
        self.distance
    }

    pub fn hit_distance(&self) -> Option<f64> {
        self.is_hit().then_some(self.distance)
    }

    pub fn is_hit(&self) -> bool {
        self.distance.is_finite()
    }

    /// Hit point, or the point at maximum range if nothing was hit.
    pub fn hit_point(&self) -> Position {
        self.hit_point
    }
}

/// One measurement per beam, in the order of the sensor angles.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ToFReading {
    beams: Vec<Beam>,
}

impl ToFReading {
    pub fn beams(&self) -> &[Beam] {
        &self.beams
    }

    pub fn len(&self) -> usize {
        self.beams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.beams.is_empty()
    }

    pub fn distances(&self) -> Vec<f64> {
        self.beams.iter().map(Beam::distance).collect()
    }

    /// Smallest strictly positive finite distance.
    pub fn min_distance(&self) -> Option<f64> {
        self.beams
            .iter()
            .filter_map(Beam::hit_distance)
            .filter(|d| *d > 0.0)
            .min_by(|a, b| a.total_cmp(b))
    }
}

pub fn distance_to_next_obstacle(
    obstacles: &[Shape],
    position: Position,
    angle: Angle,
) -> Option<f64> {
    obstacles
        .iter()
        .filter_map(|o| o.intersect_with_ray(position, angle))
        .min_by(|a, b| a.total_cmp(b))
}

/// Measures every beam of a robot at `pose` against `obstacles`.
///
/// The robot's own body must not be part of `obstacles`.
pub fn cast(pose: Pose, sensors: &SensorGeometry, obstacles: &[Shape]) -> ToFReading {
    let beams = sensors
        .headings(pose)
        .map(|heading| {
            let origin = sensors.origin(pose, heading);
            match distance_to_next_obstacle(obstacles, origin, heading)
                .filter(|d| *d <= sensors.max_range)
            {
                Some(distance) => Beam {
                    origin,
                    distance,
                    hit_point: origin.along(heading, distance),
                },
                None => Beam {
                    origin,
                    distance: NO_HIT,
                    hit_point: origin.along(heading, sensors.max_range),
                },
            }
        })
        .collect();
    ToFReading { beams }
}
