//! Fixed-rate simulation step over all robots.
//!
//! Every tick measures all ToF sensors, publishes the readings, applies the reset policy and
//! advances the lap timers. Each robot is handled under its own lock while other robots are
//! seen as circles at their pose from the beginning of the tick. A robot whose lock cannot be
//! taken in time keeps its body and view from the previous tick.

use std::{sync::Arc, time::Duration};

use thiserror::Error;
use tracing::{info, warn};

use super::{
    raycast, Beam, CoordinateTransformer, Gates, HasShape, LapEvent, LapTimer, LineSegment,
    ObstacleError, ObstacleRegistry, Pose, Position, RegistryError, ResetCause, ResetPolicy,
    RobotConfig, RobotHandle, RobotRegistry, Shape, ToFReading,
};

/// Receives the readings of every robot once per tick.
pub trait PublishSink {
    fn publish(&mut self, robot: &str, reading: &ToFReading) -> Result<(), PublishError>;
}

#[derive(Error, Clone, Debug, PartialEq)]
pub enum PublishError {
    #[error("subscriber of robot {0:?} disconnected")]
    Disconnected(String),
    #[error("queue of robot {0:?} is full")]
    Full(String),
}

/// Extent and scale of the simulated plane.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct World {
    /// Width in meters.
    pub width: f64,
    /// Height in meters.
    pub height: f64,
    /// Pixels per meter.
    pub scale: f64,
    /// Minimal distance between a sensor and an obstacle before a robot is reset.
    pub reset_threshold: f64,
}

impl World {
    pub fn transformer(&self) -> CoordinateTransformer {
        CoordinateTransformer::new(self.scale, self.height * self.scale)
    }

    pub fn reset_policy(&self) -> ResetPolicy {
        ResetPolicy::new(self.reset_threshold, self.width, self.height)
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TickReport {
    pub time: Duration,
    pub published: Vec<String>,
    pub skipped: Vec<String>,
    pub publish_failures: Vec<PublishError>,
    pub resets: Vec<(String, ResetCause)>,
    pub laps: Vec<(String, LapEvent)>,
}

/// State of the world after the last tick, for rendering.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RenderSnapshot {
    pub time: Duration,
    pub segments: Vec<LineSegment>,
    pub robots: Vec<RobotView>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RobotView {
    pub name: String,
    pub pose: Pose,
    pub radius: f64,
    pub beams: Vec<Beam>,
    pub lap_timer: LapTimer,
}

impl HasShape for RobotView {
    fn shape(&self) -> Shape {
        Shape::Circle {
            position: self.pose.position,
            radius: self.radius,
        }
    }
}

pub struct Simulation {
    world: World,
    gates: Gates,
    robot_config: RobotConfig,
    lock_timeout: Duration,
    transformer: CoordinateTransformer,
    reset_policy: ResetPolicy,
    obstacles: ObstacleRegistry,
    robots: Arc<RobotRegistry>,
    time: Duration,
    snapshot: RenderSnapshot,
}

impl Simulation {
    /// `robot_config` is the body and sensor geometry of every spawned robot.
    pub fn new(
        world: World,
        gates: Gates,
        robot_config: RobotConfig,
        lock_timeout: Duration,
    ) -> Self {
        Self {
            world,
            gates,
            robot_config,
            lock_timeout,
            transformer: world.transformer(),
            reset_policy: world.reset_policy(),
            obstacles: ObstacleRegistry::new(),
            robots: Arc::new(RobotRegistry::new()),
            time: Duration::ZERO,
            snapshot: RenderSnapshot::default(),
        }
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn gates(&self) -> &Gates {
        &self.gates
    }

    pub fn transformer(&self) -> &CoordinateTransformer {
        &self.transformer
    }

    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    pub fn obstacles(&self) -> &ObstacleRegistry {
        &self.obstacles
    }

    /// Shared with external controllers.
    pub fn robots(&self) -> &Arc<RobotRegistry> {
        &self.robots
    }

    /// Simulated time, advanced by every tick.
    pub fn time(&self) -> Duration {
        self.time
    }

    pub fn snapshot(&self) -> &RenderSnapshot {
        &self.snapshot
    }

    pub fn spawn(
        &self,
        x: f64,
        y: f64,
        heading: f64,
        name: &str,
    ) -> Result<RobotHandle, RegistryError> {
        self.robots
            .spawn(name, Pose::new(x, y, heading), self.robot_config.clone())
    }

    pub fn kill(&self, name: &str) -> Result<(), RegistryError> {
        self.robots.kill(name)
    }

    pub fn add_line_segment(&mut self, p1: Position, p2: Position) -> Result<(), ObstacleError> {
        self.obstacles.add_segment(p1, p2)
    }

    pub fn add_rectangle(&mut self, c_1: Position, c_2: Position) -> Result<(), ObstacleError> {
        self.obstacles.add_rectangle(c_1, c_2)
    }

    pub fn add_line_segment_display(
        &mut self,
        p1: Position,
        p2: Position,
    ) -> Result<(), ObstacleError> {
        let t = self.transformer;
        self.obstacles.add_segment(t.to_world(p1), t.to_world(p2))
    }

    pub fn add_rectangle_display(
        &mut self,
        c_1: Position,
        c_2: Position,
    ) -> Result<(), ObstacleError> {
        let t = self.transformer;
        self.obstacles.add_rectangle(t.to_world(c_1), t.to_world(c_2))
    }

    pub fn add_finish_line(&mut self, p1: Position, p2: Position) {
        self.obstacles.add_finish_line(p1, p2);
    }

    /// Advances the simulation by `dt` and publishes all readings to `sink`.
    pub fn tick(&mut self, dt: Duration, sink: &mut dyn PublishSink) -> TickReport {
        self.robots.apply_pending_removals();
        self.time += dt;

        let mut report = TickReport {
            time: self.time,
            ..TickReport::default()
        };
        let handles = self.robots.handles();
        let previous = &self.snapshot.robots;
        let locked = handles
            .iter()
            .map(|handle| {
                handle
                    .try_lock_for(self.lock_timeout)
                    .map(|robot| robot.shape())
            })
            .collect::<Vec<_>>();
        let bodies = handles
            .iter()
            .zip(&locked)
            .map(|(handle, body)| match body {
                Ok(shape) => Some(*shape),
                Err(_) => last_view(previous, handle).map(HasShape::shape),
            })
            .collect::<Vec<_>>();
        let segments = self
            .obstacles
            .segments()
            .iter()
            .map(HasShape::shape)
            .collect::<Vec<_>>();
        let mut views = Vec::with_capacity(handles.len());

        for (idx, handle) in handles.iter().enumerate() {
            if !handle.is_active() {
                continue;
            }

            let robot = match &locked[idx] {
                Ok(_) => handle.try_lock_for(self.lock_timeout),
                Err(e) => Err(e.clone()),
            };
            let mut robot = match robot {
                Ok(robot) => robot,
                Err(e) => {
                    warn!("Skipping tick: {}", e);
                    report.skipped.push(handle.name().to_string());
                    views.extend(last_view(previous, handle).cloned());
                    continue;
                }
            };

            robot.advance(dt);

            let obstacles = bodies
                .iter()
                .enumerate()
                .filter(|(other, _)| *other != idx)
                .filter_map(|(_, body)| *body)
                .chain(segments.iter().copied())
                .collect::<Vec<_>>();
            let reading = raycast::cast(robot.pose(), robot.config().sensors(), &obstacles);
            robot.update_reading(reading.clone());

            match sink.publish(handle.name(), &reading) {
                Ok(()) => report.published.push(handle.name().to_string()),
                Err(e) => {
                    warn!("Failed to publish ToF reading: {}", e);
                    report.publish_failures.push(e);
                }
            }

            if let Some(cause) = self.reset_policy.apply(&mut robot, &reading) {
                match cause {
                    ResetCause::Proximity(distance) => info!(
                        "Robot '{}' too close to an obstacle ({:.3} m), resetting",
                        handle.name(),
                        distance
                    ),
                    ResetCause::OutOfBounds(position) => info!(
                        "Robot '{}' left the world at ({:.2}, {:.2}), resetting",
                        handle.name(),
                        position.x(),
                        position.y()
                    ),
                }
                report.resets.push((handle.name().to_string(), cause));
            }

            let position = robot.position();
            if let Some(event) = robot
                .lap_timer_mut()
                .update(position, self.time, &self.gates)
            {
                match event {
                    LapEvent::Started => info!("Lap of robot '{}' started", handle.name()),
                    LapEvent::Finished(elapsed) => info!(
                        "Lap time of robot '{}': {} ms",
                        handle.name(),
                        elapsed.as_millis()
                    ),
                }
                report.laps.push((handle.name().to_string(), event));
            }

            views.push(RobotView {
                name: handle.name().to_string(),
                pose: robot.pose(),
                radius: robot.config().radius(),
                beams: reading.beams().to_vec(),
                lap_timer: robot.lap_timer().clone(),
            });
        }

        self.snapshot = RenderSnapshot {
            time: self.time,
            segments: self.obstacles.segments().to_vec(),
            robots: views,
        };

        report
    }
}

/// View of the robot from the previous tick.
fn last_view<'a>(views: &'a [RobotView], handle: &RobotHandle) -> Option<&'a RobotView> {
    views.iter().find(|view| view.name == handle.name())
}

#[cfg(test)]
mod tests {
    use std::{sync::Barrier, thread};

    use approx::assert_abs_diff_eq;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        domain::{Command, LapTimerState, Twist, NO_HIT},
        tests::{simulation, FailingSink, RecordingSink},
    };

    const DT: Duration = Duration::from_millis(20);

    #[test]
    fn test_robot_in_rectangle() {
        let mut simulation = simulation();
        simulation.spawn(1.0, 1.0, 0.0, "r1").unwrap();
        simulation
            .add_rectangle(Position::new(0.0, 0.0), Position::new(5.0, 3.0))
            .unwrap();
        let mut sink = RecordingSink::default();

        let report = simulation.tick(DT, &mut sink);

        assert_eq!(report.published, vec!["r1".to_string()]);
        assert!(report.resets.is_empty());
        let reading = sink.last("r1").unwrap();
        assert_eq!(reading.len(), 8);
        // East and north-east face open space within the sensor range
        for idx in [0, 1] {
            assert_eq!(reading.beams()[idx].distance(), NO_HIT);
        }
        for idx in 2..8 {
            assert!(reading.beams()[idx].is_hit());
        }
        assert_abs_diff_eq!(reading.beams()[2].distance(), 1.9, epsilon = 1e-9);
        assert_abs_diff_eq!(reading.beams()[4].distance(), 0.9, epsilon = 1e-9);
        assert_eq!(
            simulation.robots().get("r1").unwrap().lock().pose(),
            Pose::new(1.0, 1.0, 0.0)
        );
    }

    #[test]
    fn test_robots_too_close_are_reset() {
        let mut simulation = simulation();
        let r1 = simulation.spawn(1.0, 2.0, 0.0, "r1").unwrap();
        let r2 = simulation.spawn(4.0, 2.0, 0.0, "r2").unwrap();
        let timeout = simulation.lock_timeout();
        r1.command(Command::Pose(Pose::new(2.0, 2.0, 0.0)), timeout)
            .unwrap();
        r2.command(Command::Pose(Pose::new(2.45, 2.0, 0.0)), timeout)
            .unwrap();

        let report = simulation.tick(DT, &mut RecordingSink::default());

        assert_eq!(report.resets.len(), 2);
        for (name, cause) in &report.resets {
            match cause {
                ResetCause::Proximity(d) => assert_abs_diff_eq!(*d, 0.1, epsilon = 1e-9),
                other => panic!("unexpected reset of {name}: {other:?}"),
            }
        }
        assert_eq!(r1.lock().pose(), Pose::new(1.0, 2.0, 0.0));
        assert_eq!(r2.lock().pose(), Pose::new(4.0, 2.0, 0.0));
    }

    #[test]
    fn test_reading_before_reset_is_published() {
        let mut simulation = simulation();
        let r1 = simulation.spawn(1.0, 1.0, 0.0, "r1").unwrap();
        simulation
            .add_line_segment(Position::new(3.2, 0.0), Position::new(3.2, 4.0))
            .unwrap();
        r1.command(
            Command::Pose(Pose::new(3.0, 2.0, 0.0)),
            simulation.lock_timeout(),
        )
        .unwrap();
        let mut sink = RecordingSink::default();

        let report = simulation.tick(DT, &mut sink);

        assert_eq!(report.resets.len(), 1);
        let published = sink.last("r1").unwrap();
        assert_abs_diff_eq!(published.min_distance().unwrap(), 0.1, epsilon = 1e-9);
        assert_eq!(r1.lock().reading(), published);
        assert_eq!(r1.lock().pose(), Pose::new(1.0, 1.0, 0.0));
    }

    #[test]
    fn test_degenerate_segment_is_rejected() {
        let mut simulation = simulation();
        simulation
            .add_rectangle(Position::new(0.0, 0.0), Position::new(5.0, 3.0))
            .unwrap();
        let p = Position::new(1.0, 1.0);
        assert_eq!(
            simulation.add_line_segment(p, p),
            Err(ObstacleError::DegenerateGeometry(p))
        );
        assert_eq!(simulation.obstacles().len(), 4);
    }

    #[test]
    fn test_display_coordinates() {
        let mut simulation = simulation();
        simulation
            .add_rectangle_display(Position::new(0.0, 600.0), Position::new(500.0, 300.0))
            .unwrap();
        simulation
            .add_line_segment_display(Position::new(100.0, 0.0), Position::new(100.0, 600.0))
            .unwrap();

        let segments = simulation.obstacles().segments();
        assert_eq!(segments.len(), 5);
        assert_abs_diff_eq!(segments[0].p1(), Position::new(0.0, 0.0), epsilon = 1e-9);
        assert_abs_diff_eq!(segments[1].p2(), Position::new(5.0, 3.0), epsilon = 1e-9);
        assert_abs_diff_eq!(segments[4].p1(), Position::new(1.0, 6.0), epsilon = 1e-9);
    }

    #[test]
    fn test_out_of_bounds_reset_despite_publish_failure() {
        let mut simulation = simulation();
        let r1 = simulation.spawn(1.0, 1.0, 0.0, "r1").unwrap();
        r1.command(
            Command::Pose(Pose::new(-1.0, 1.0, 0.0)),
            simulation.lock_timeout(),
        )
        .unwrap();

        let report = simulation.tick(DT, &mut FailingSink);
        assert_eq!(report.clone(), report);

        assert_eq!(
            report.publish_failures,
            vec![PublishError::Disconnected("r1".to_string())]
        );
        assert_eq!(
            report.resets,
            vec![(
                "r1".to_string(),
                ResetCause::OutOfBounds(Position::new(-1.0, 1.0))
            )]
        );
        assert_eq!(r1.lock().pose(), Pose::new(1.0, 1.0, 0.0));
    }

    #[test]
    fn test_locked_robot_is_skipped() {
        let mut simulation = simulation();
        let r1 = simulation.spawn(1.0, 1.0, 0.0, "r1").unwrap();
        simulation.spawn(3.0, 1.0, 0.0, "r2").unwrap();
        let locked = Barrier::new(2);
        let release = Barrier::new(2);
        let mut sink = RecordingSink::default();

        let report = thread::scope(|s| {
            s.spawn(|| {
                let _guard = r1.lock();
                locked.wait();
                release.wait();
            });

            locked.wait();
            let report = simulation.tick(DT, &mut sink);
            release.wait();
            report
        });

        assert_eq!(report.skipped, vec!["r1".to_string()]);
        assert_eq!(report.published, vec!["r2".to_string()]);
        assert!(sink.last("r1").is_none());

        let report = simulation.tick(DT, &mut sink);
        assert_eq!(report.published, vec!["r1".to_string(), "r2".to_string()]);
    }

    #[test]
    fn test_locked_robot_stays_visible() {
        let mut simulation = simulation();
        simulation.spawn(1.0, 1.0, 0.0, "r1").unwrap();
        let r2 = simulation.spawn(2.0, 1.0, 0.0, "r2").unwrap();
        let mut sink = RecordingSink::default();
        simulation.tick(DT, &mut sink);
        let ahead = sink.last("r1").unwrap().beams()[0].distance();
        assert_abs_diff_eq!(ahead, 0.65, epsilon = 1e-9);

        let locked = Barrier::new(2);
        let release = Barrier::new(2);
        let report = thread::scope(|s| {
            s.spawn(|| {
                let _guard = r2.lock();
                locked.wait();
                release.wait();
            });

            locked.wait();
            let report = simulation.tick(DT, &mut sink);
            release.wait();
            report
        });

        assert_eq!(report.skipped, vec!["r2".to_string()]);
        assert_abs_diff_eq!(
            sink.last("r1").unwrap().beams()[0].distance(),
            ahead,
            epsilon = 1e-9
        );
        let names = simulation
            .snapshot()
            .robots
            .iter()
            .map(|view| view.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["r1", "r2"]);
        assert_eq!(simulation.snapshot().robots[1].pose, Pose::new(2.0, 1.0, 0.0));
    }

    #[test]
    fn test_killed_robot_is_not_ticked() {
        let mut simulation = simulation();
        simulation.spawn(1.0, 1.0, 0.0, "r1").unwrap();
        simulation.spawn(3.0, 1.0, 0.0, "r2").unwrap();
        simulation.kill("r1").unwrap();

        let report = simulation.tick(DT, &mut RecordingSink::default());

        assert_eq!(report.published, vec!["r2".to_string()]);
        assert_eq!(simulation.snapshot().robots.len(), 1);
        assert_eq!(
            simulation.kill("r1"),
            Err(RegistryError::NotFound("r1".to_string()))
        );
    }

    #[test]
    fn test_velocity_command_moves_robot() {
        let mut simulation = simulation();
        let r1 = simulation.spawn(1.0, 1.0, 0.0, "r1").unwrap();
        r1.command(
            Command::Velocity(Twist::new(0.5, 0.0, 0.0)),
            simulation.lock_timeout(),
        )
        .unwrap();

        for _ in 0..10 {
            simulation.tick(DT, &mut RecordingSink::default());
        }

        assert_abs_diff_eq!(r1.lock().position(), Position::new(1.1, 1.0), epsilon = 1e-9);
        assert_eq!(simulation.time(), DT * 10);
    }

    #[test]
    fn test_lap() {
        let mut simulation = simulation();
        let r1 = simulation.spawn(1.0, 1.0, 0.0, "r1").unwrap();
        let timeout = simulation.lock_timeout();
        let mut sink = RecordingSink::default();

        simulation.tick(DT, &mut sink);
        r1.command(Command::Pose(Pose::new(4.15, 1.0, 0.0)), timeout)
            .unwrap();
        let report = simulation.tick(DT, &mut sink);
        assert_eq!(report.laps, vec![("r1".to_string(), LapEvent::Started)]);

        r1.command(Command::Pose(Pose::new(2.0, 1.0, 0.0)), timeout)
            .unwrap();
        for _ in 0..5 {
            simulation.tick(DT, &mut sink);
        }
        r1.command(Command::Pose(Pose::new(4.05, 1.0, 0.0)), timeout)
            .unwrap();
        let report = simulation.tick(DT, &mut sink);

        assert_eq!(
            report.laps,
            vec![("r1".to_string(), LapEvent::Finished(DT * 6))]
        );
        let view = &simulation.snapshot().robots[0];
        assert_eq!(view.lap_timer.state(), LapTimerState::Idle);
        assert_eq!(view.lap_timer.last_lap(), Some(DT * 6));
    }

    #[test]
    fn test_snapshot() {
        let mut simulation = simulation();
        simulation.spawn(1.0, 1.0, 0.0, "r1").unwrap();
        simulation
            .add_line_segment(Position::new(0.0, 5.0), Position::new(8.0, 5.0))
            .unwrap();

        simulation.tick(DT, &mut RecordingSink::default());

        let snapshot = simulation.snapshot();
        assert_eq!(snapshot.time, DT);
        assert_eq!(snapshot.segments.len(), 1);
        assert_eq!(snapshot.robots.len(), 1);
        assert_eq!(snapshot.robots[0].name, "r1");
        assert_eq!(snapshot.robots[0].beams.len(), 8);
        assert_abs_diff_eq!(snapshot.robots[0].radius, 0.25);
    }
}
