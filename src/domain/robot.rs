//! Mecanum robot carrying a ring of ToF sensors.

use std::time::Duration;

use nalgebra::{Rotation2, Vector2};

use super::{
    Angle, HasShape, LapTimer, Pose, Position, SensorGeometry, Shape, ToFReading, Twist,
};

#[derive(Clone, Debug, PartialEq)]
pub struct Robot {
    name: String,
    pose: Pose,
    reset_pose: Pose,
    twist: Twist,
    reading: ToFReading,
    lap_timer: LapTimer,
    config: RobotConfig,
}

impl Robot {
    /// Creates a robot at `pose`, which also becomes its reset pose.
    pub fn new(name: impl Into<String>, pose: Pose, config: RobotConfig) -> Self {
        Self {
            name: name.into(),
            pose,
            reset_pose: pose,
            twist: Twist::default(),
            reading: ToFReading::default(),
            lap_timer: LapTimer::default(),
            config,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pose(&self) -> Pose {
        self.pose
    }

    pub fn position(&self) -> Position {
        self.pose.position
    }

    pub fn heading(&self) -> Angle {
        self.pose.heading
    }

    pub fn reset_pose(&self) -> Pose {
        self.reset_pose
    }

    pub fn twist(&self) -> Twist {
        self.twist
    }

    /// Latest published sensor reading.
    pub fn reading(&self) -> &ToFReading {
        &self.reading
    }

    pub fn lap_timer(&self) -> &LapTimer {
        &self.lap_timer
    }

    pub fn config(&self) -> &RobotConfig {
        &self.config
    }

    pub fn set_pose(&mut self, pose: Pose) {
        self.pose = pose;
    }

    pub fn set_twist(&mut self, twist: Twist) {
        self.twist = twist;
    }

    pub fn update_reading(&mut self, reading: ToFReading) {
        self.reading = reading;
    }

    pub fn lap_timer_mut(&mut self) -> &mut LapTimer {
        &mut self.lap_timer
    }

    /// Moves the robot back to its reset pose.
    pub fn reset(&mut self) {
        self.pose = self.reset_pose;
    }

    /// Pose after driving with the current twist for `dt`.
    pub fn updated_pose(&self, dt: Duration) -> Pose {
        let dt = dt.as_secs_f64();
        let rotation = Rotation2::new(f64::from(self.pose.heading));
        let velocity = rotation * Vector2::new(self.twist.vx, self.twist.vy);

        Pose {
            position: Position::new(
                self.pose.position.x() + velocity.x * dt,
                self.pose.position.y() + velocity.y * dt,
            ),
            heading: Angle::new(f64::from(self.pose.heading) + self.twist.omega * dt)
                .normalized(),
        }
    }

    pub fn advance(&mut self, dt: Duration) {
        if !self.twist.is_zero() {
            self.pose = self.updated_pose(dt);
        }
    }
}

impl HasShape for Robot {
    fn shape(&self) -> Shape {
        Shape::Circle {
            position: self.pose.position,
            radius: self.config.radius,
        }
    }
}

/// Body geometry fixed at spawn time.
#[derive(Clone, Debug, PartialEq)]
pub struct RobotConfig {
    radius: f64,
    sensors: SensorGeometry,
}

impl RobotConfig {
    pub fn new(radius: f64, sensors: SensorGeometry) -> Self {
        Self { radius, sensors }
    }

    /// Radius of the circle other robots see.
    pub fn radius(&self) -> f64 {
        self.radius
    }

    pub fn sensors(&self) -> &SensorGeometry {
        &self.sensors
    }
}
