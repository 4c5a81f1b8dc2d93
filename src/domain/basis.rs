//! Basic building blocks.

use std::{
    f64::consts::PI,
    ops::{Add, Mul, Sub},
};

use serde::Deserialize;

#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd, Deserialize)]
pub struct Position {
    x: f64,
    y: f64,
}

impl Position {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn x(&self) -> f64 {
        self.x
    }

    pub fn y(&self) -> f64 {
        self.y
    }

    pub fn distance(&self, position: Self) -> f64 {
        ((self.x - position.x).powi(2) + (self.y - position.y).powi(2)).sqrt()
    }

    pub fn norm(&self) -> f64 {
        self.dot(*self).sqrt()
    }

    pub fn dot(&self, other: Self) -> f64 {
        self.x * other.x + self.y * other.y
    }

    /// z component of the 3D cross product.
    pub fn cross(&self, other: Self) -> f64 {
        self.x * other.y - self.y * other.x
    }

    /// Unit vector pointing along `angle`.
    pub fn unit(angle: Angle) -> Self {
        Self::new(angle.0.cos(), angle.0.sin())
    }

    /// Position reached by moving `distance` from here along `angle`.
    pub fn along(&self, angle: Angle, distance: f64) -> Self {
        *self + Self::unit(angle) * distance
    }
}

impl From<(f64, f64)> for Position {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

impl Add for Position {
    type Output = Position;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
        }
    }
}

impl Sub for Position {
    type Output = Position;

    fn sub(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
        }
    }
}

impl Mul<f64> for Position {
    type Output = Position;

    fn mul(self, rhs: f64) -> Self::Output {
        Self {
            x: self.x * rhs,
            y: self.y * rhs,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd, Deserialize)]
pub struct Angle(f64);

impl Angle {
    pub fn new(radians: f64) -> Self {
        Self(radians)
    }

    /// Same direction, wrapped into `[0, 2π)`.
    pub fn normalized(self) -> Self {
        Self(self.0.rem_euclid(2.0 * PI))
    }
}

impl Add for Angle {
    type Output = Angle;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl From<Angle> for f64 {
    fn from(value: Angle) -> Self {
        value.0
    }
}

/// Position and heading of a robot in world coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd)]
pub struct Pose {
    pub position: Position,
    pub heading: Angle,
}

impl Pose {
    pub const fn new(x: f64, y: f64, heading: f64) -> Self {
        Self {
            position: Position::new(x, y),
            heading: Angle(heading),
        }
    }
}

/// Body frame velocity of a holonomic (mecanum) platform.
#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd)]
pub struct Twist {
    /// Forward velocity in m/s.
    pub vx: f64,
    /// Leftward velocity in m/s.
    pub vy: f64,
    /// Counter-clockwise angular velocity in rad/s.
    pub omega: f64,
}

impl Twist {
    pub const fn new(vx: f64, vy: f64, omega: f64) -> Self {
        Self { vx, vy, omega }
    }

    pub fn is_zero(&self) -> bool {
        self.vx == 0.0 && self.vy == 0.0 && self.omega == 0.0
    }
}
