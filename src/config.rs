//! Simulation configuration, read from a TOML file.

use std::{io, path::Path, time::Duration};

use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use crate::domain::{Gates, Position, Region, RobotConfig, SensorGeometry, World};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Io(#[from] io::Error),
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("tick period must be a positive representable duration, got {0} s")]
    InvalidTickPeriod(f64),
    #[error("display scale must be positive, got {0} px/m")]
    InvalidScale(f64),
    #[error("world bounds must be positive, got {width} m x {height} m")]
    InvalidWorldBounds { width: f64, height: f64 },
    #[error("at least one ToF sensor is required")]
    InvalidSensorCount,
}

#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
pub struct WorldBounds {
    pub width: f64,
    pub height: f64,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct SpawnConfig {
    pub name: String,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub heading: f64,
}

/// Static obstacle in world coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ObstacleConfig {
    Segment { from: Position, to: Position },
    Rectangle { from: Position, to: Position },
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimConfig {
    /// Pixels per meter.
    pub meters_to_display_scale: f64,
    /// Seconds between two simulation ticks.
    pub tick_period: f64,
    pub reset_distance_threshold: f64,
    pub world_bounds: WorldBounds,
    pub start_gate_region: Region,
    pub finish_gate_region: Region,
    pub sensor_count: usize,
    pub sensor_mount_offset: f64,
    pub sensor_max_range: f64,
    pub robot_radius: f64,
    /// Longest wait for a robot lock in milliseconds.
    pub lock_timeout: u64,
    /// Number of randomly placed square pillars.
    pub pillars: usize,
    pub robots: Vec<SpawnConfig>,
    pub obstacles: Vec<ObstacleConfig>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            meters_to_display_scale: 100.0,
            tick_period: 0.02,
            reset_distance_threshold: 0.2,
            world_bounds: WorldBounds {
                width: 12.0,
                height: 8.0,
            },
            start_gate_region: Region::new(Position::new(4.1, 0.0), Position::new(4.2, 3.0)),
            finish_gate_region: Region::new(Position::new(4.0, 0.0), Position::new(4.1, 3.0)),
            sensor_count: 8,
            sensor_mount_offset: 0.1,
            sensor_max_range: 2.0,
            robot_radius: 0.25,
            lock_timeout: 5,
            pillars: 0,
            robots: vec![SpawnConfig {
                name: "robot1".to_string(),
                x: 1.0,
                y: 1.5,
                heading: 0.0,
            }],
            obstacles: vec![
                ObstacleConfig::Rectangle {
                    from: Position::new(0.1, 0.1),
                    to: Position::new(11.9, 7.9),
                },
                ObstacleConfig::Rectangle {
                    from: Position::new(3.0, 3.0),
                    to: Position::new(9.0, 5.0),
                },
            ],
        }
    }
}

impl SimConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Loads `path` if it exists, defaults otherwise.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            info!("Loading configuration from {}", path.display());
            Self::load(path)
        } else {
            info!("No configuration at {}, using defaults", path.display());
            let config = Self::default();
            config.validate()?;
            Ok(config)
        }
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.tick_period > 0.0 && Duration::try_from_secs_f64(self.tick_period).is_ok()) {
            return Err(ConfigError::InvalidTickPeriod(self.tick_period));
        }
        if !(self.meters_to_display_scale.is_finite() && self.meters_to_display_scale > 0.0) {
            return Err(ConfigError::InvalidScale(self.meters_to_display_scale));
        }
        let WorldBounds { width, height } = self.world_bounds;
        if !(width > 0.0 && height > 0.0) {
            return Err(ConfigError::InvalidWorldBounds { width, height });
        }
        if self.sensor_count == 0 {
            return Err(ConfigError::InvalidSensorCount);
        }
        Ok(())
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_secs_f64(self.tick_period)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout)
    }

    pub fn world(&self) -> World {
        World {
            width: self.world_bounds.width,
            height: self.world_bounds.height,
            scale: self.meters_to_display_scale,
            reset_threshold: self.reset_distance_threshold,
        }
    }

    pub fn gates(&self) -> Gates {
        Gates {
            start: self.start_gate_region,
            finish: self.finish_gate_region,
        }
    }

    pub fn robot_config(&self) -> RobotConfig {
        RobotConfig::new(
            self.robot_radius,
            SensorGeometry::ring(
                self.sensor_count,
                self.sensor_mount_offset,
                self.sensor_max_range,
            ),
        )
    }

    /// Window size in pixels.
    pub fn display_size(&self) -> (f64, f64) {
        (
            self.world_bounds.width * self.meters_to_display_scale,
            self.world_bounds.height * self.meters_to_display_scale,
        )
    }
}
