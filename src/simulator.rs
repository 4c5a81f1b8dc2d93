//! Simulation of the robots in a world with obstacles.
//!
//! The simulation is stepped at the configured fixed rate. Every step moves the robots, measures
//! their ToF sensors and publishes the readings to the subscribed controllers.

use bevy::prelude::*;
use rand::{
    distr::{uniform, Distribution, Uniform},
    SeedableRng,
};
use rand_chacha::ChaCha8Rng;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    config::{ObstacleConfig, SimConfig},
    domain::{ObstacleError, Position, RegistryError, Simulation},
    resource::{PublisherRes, SimulationRes},
};

pub struct Simulator;

impl Plugin for Simulator {
    fn build(&self, app: &mut App) {
        app.add_systems(FixedUpdate, simulate);
    }
}

#[derive(Error, Debug)]
pub enum SetupError {
    #[error(transparent)]
    Obstacle(#[from] ObstacleError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("invalid pillar placement range: {0}")]
    Sampling(#[from] uniform::Error),
}

const RNG_SEED: u64 = 19878367467712;

/// Free space kept around every spawn point when placing pillars.
const PILLAR_CLEARANCE: f64 = 1.0;
const PILLAR_ATTEMPTS: usize = 100;

pub fn create_simulation(config: &SimConfig) -> Result<Simulation, SetupError> {
    let mut simulation = Simulation::new(
        config.world(),
        config.gates(),
        config.robot_config(),
        config.lock_timeout(),
    );

    for obstacle in &config.obstacles {
        match *obstacle {
            ObstacleConfig::Segment { from, to } => simulation.add_line_segment(from, to)?,
            ObstacleConfig::Rectangle { from, to } => simulation.add_rectangle(from, to)?,
        }
    }

    let spawn_points = config
        .robots
        .iter()
        .map(|r| Position::new(r.x, r.y))
        .collect::<Vec<_>>();
    for (c_1, c_2) in pillars(config, &spawn_points)? {
        simulation.add_rectangle(c_1, c_2)?;
    }

    for robot in &config.robots {
        simulation.spawn(robot.x, robot.y, robot.heading, &robot.name)?;
    }

    info!(
        "Created simulation with {} robot(s) and {} obstacle segment(s)",
        simulation.robots().len(),
        simulation.obstacles().len()
    );

    Ok(simulation)
}

/// Corners of square pillars, placed reproducibly away from the spawn points.
fn pillars(
    config: &SimConfig,
    spawn_points: &[Position],
) -> Result<Vec<(Position, Position)>, SetupError> {
    if config.pillars == 0 {
        return Ok(vec![]);
    }

    const MARGIN: f64 = 0.5;

    let mut rng = ChaCha8Rng::seed_from_u64(RNG_SEED);
    let x = Uniform::try_from(MARGIN..=config.world_bounds.width - MARGIN)?;
    let y = Uniform::try_from(MARGIN..=config.world_bounds.height - MARGIN)?;
    let half_length = Uniform::try_from(0.05..=0.15)?;

    let mut pillars = Vec::with_capacity(config.pillars);

    for _ in 0..config.pillars {
        let center = (0..PILLAR_ATTEMPTS)
            .map(|_| Position::new(x.sample(&mut rng), y.sample(&mut rng)))
            .find(|c| spawn_points.iter().all(|p| p.distance(*c) > PILLAR_CLEARANCE));
        let Some(center) = center else {
            warn!("No free space left for pillar, placed {}", pillars.len());
            break;
        };
        let h = half_length.sample(&mut rng);
        pillars.push((center - Position::new(h, h), center + Position::new(h, h)));
    }

    debug!("Placed {} pillar(s)", pillars.len());

    Ok(pillars)
}

fn simulate(
    time: Res<Time>,
    mut simulation: ResMut<SimulationRes>,
    mut publisher: ResMut<PublisherRes>,
) {
    let report = simulation.tick(time.delta(), &mut **publisher);
    if !report.skipped.is_empty() {
        debug!("Skipped robots at {:?}: {:?}", report.time, report.skipped);
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::config::SpawnConfig;

    #[test]
    fn test_create_default_simulation() {
        let simulation = create_simulation(&SimConfig::default()).unwrap();

        assert_eq!(simulation.robots().names(), vec!["robot1".to_string()]);
        assert_eq!(simulation.obstacles().len(), 8);
        assert_eq!(
            simulation.robots().get("robot1").unwrap().lock().position(),
            Position::new(1.0, 1.5)
        );
    }

    #[test]
    fn test_pillars_are_reproducible() {
        let config = SimConfig {
            pillars: 5,
            ..SimConfig::default()
        };

        let first = create_simulation(&config).unwrap();
        let second = create_simulation(&config).unwrap();

        assert_eq!(first.obstacles().len(), 8 + 5 * 4);
        assert_eq!(first.obstacles(), second.obstacles());
    }

    #[test]
    fn test_pillars_keep_clear_of_spawn_points() {
        let config = SimConfig {
            pillars: 20,
            ..SimConfig::default()
        };
        let spawn_point = Position::new(1.0, 1.5);

        let simulation = create_simulation(&config).unwrap();

        for segment in &simulation.obstacles().segments()[8..] {
            assert!(segment.p1().distance(spawn_point) > PILLAR_CLEARANCE - 0.15 * 2.0_f64.sqrt());
        }
    }

    #[test]
    fn test_duplicate_robot_name() {
        let robot = SpawnConfig {
            name: "r1".to_string(),
            x: 1.0,
            y: 1.0,
            heading: 0.0,
        };
        let config = SimConfig {
            robots: vec![robot.clone(), robot],
            ..SimConfig::default()
        };

        assert!(matches!(
            create_simulation(&config),
            Err(SetupError::Registry(RegistryError::DuplicateName(_)))
        ));
    }

    #[test]
    fn test_degenerate_obstacle() {
        let p = Position::new(1.0, 1.0);
        let config = SimConfig {
            obstacles: vec![ObstacleConfig::Segment { from: p, to: p }],
            ..SimConfig::default()
        };

        assert!(matches!(
            create_simulation(&config),
            Err(SetupError::Obstacle(ObstacleError::DegenerateGeometry(_)))
        ));
    }
}
