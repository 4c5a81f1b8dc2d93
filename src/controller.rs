//! Controllers steering the robots.
//!
//! Every robot is driven by an autopilot thread that reacts on the ToF readings published for
//! it. The first robot can also be driven by the keyboard: while an arrow key is held, its
//! autopilot yields. Escape or closing the window stops all robots.

use std::{
    f64::consts::PI,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use bevy::{app::AppExit, prelude::*};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use tracing::{debug, info, warn};

use crate::{
    domain::{Angle, Command, RobotHandle, ToFReading, Twist},
    resource::{PublisherRes, SimulationRes},
};

pub struct Controller;

impl Plugin for Controller {
    fn build(&self, app: &mut App) {
        app.init_resource::<Autopilots>()
            .add_systems(Startup, spawn_autopilots)
            .add_systems(Update, (control, handle_exit_key))
            .add_systems(Last, stop_robots);
    }
}

const CRUISE_SPEED: f64 = 0.4;
const TURN_RATE: f64 = 1.5;
const SAFE_DISTANCE: f64 = 0.6;
/// Half angle of the cone considered in front of the robot.
const FIELD_OF_VIEW: f64 = 0.8;
/// Upper bound for beams without hit when comparing both sides.
const OPEN_SPACE: f64 = 10.0;
const POLL_PERIOD: Duration = Duration::from_millis(100);

const MANUAL_SPEED: f64 = 0.5;
const MANUAL_TURN_RATE: f64 = 1.5;

#[derive(Resource, Default)]
struct Autopilots {
    threads: Vec<JoinHandle<()>>,
    manual: Option<ManualControl>,
}

struct ManualControl {
    robot: RobotHandle,
    engaged: Arc<AtomicBool>,
}

fn spawn_autopilots(
    mut autopilots: ResMut<Autopilots>,
    simulation: Res<SimulationRes>,
    mut publisher: ResMut<PublisherRes>,
) {
    let timeout = simulation.lock_timeout();

    for (idx, robot) in simulation.robots().handles().into_iter().enumerate() {
        let readings = publisher.subscribe(robot.name());
        let engaged = Arc::new(AtomicBool::new(false));

        if idx == 0 {
            autopilots.manual = Some(ManualControl {
                robot: robot.clone(),
                engaged: engaged.clone(),
            });
        }

        let name = format!("autopilot-{}", robot.name());
        match thread::Builder::new()
            .name(name)
            .spawn(move || run_autopilot(robot, readings, engaged, timeout))
        {
            Ok(thread) => autopilots.threads.push(thread),
            Err(e) => warn!("Failed to start autopilot: {}", e),
        }
    }
}

fn run_autopilot(
    robot: RobotHandle,
    readings: Receiver<ToFReading>,
    engaged: Arc<AtomicBool>,
    timeout: Duration,
) {
    let angles = robot.lock().config().sensors().angles().to_vec();
    debug!("Autopilot of robot '{}' started", robot.name());

    while robot.is_active() {
        let reading = match readings.recv_timeout(POLL_PERIOD) {
            Ok(reading) => readings.try_iter().last().unwrap_or(reading),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        if engaged.load(Ordering::Acquire) {
            continue;
        }

        if let Err(e) = robot.command(Command::Velocity(steer(&angles, &reading)), timeout) {
            warn!("Autopilot command dropped: {}", e);
        }
    }

    debug!("Autopilot of robot '{}' stopped", robot.name());
}

/// Drives ahead while the space in front is clear, otherwise turns towards the more open side.
///
/// `angles` are the sensor offsets relative to the heading, in the order of the reading's beams.
fn steer(angles: &[Angle], reading: &ToFReading) -> Twist {
    let mut front = f64::INFINITY;
    let mut left = 0.0;
    let mut right = 0.0;

    for (angle, beam) in angles.iter().zip(reading.beams()) {
        let offset = relative(*angle);
        let distance = beam.distance().min(OPEN_SPACE);
        if offset.abs() <= FIELD_OF_VIEW {
            front = front.min(distance);
        }
        if offset > 0.0 && offset < PI {
            left += distance;
        } else if offset < 0.0 {
            right += distance;
        }
    }

    if front > SAFE_DISTANCE {
        Twist::new(CRUISE_SPEED, 0.0, 0.0)
    } else if left >= right {
        Twist::new(0.0, 0.0, TURN_RATE)
    } else {
        Twist::new(0.0, 0.0, -TURN_RATE)
    }
}

/// Angle wrapped into `(-π, π]`.
fn relative(angle: Angle) -> f64 {
    let angle: f64 = angle.normalized().into();
    if angle > PI {
        angle - 2.0 * PI
    } else {
        angle
    }
}

fn control(
    keys: Res<ButtonInput<KeyCode>>,
    autopilots: Res<Autopilots>,
    simulation: Res<SimulationRes>,
) {
    let Some(manual) = &autopilots.manual else {
        return;
    };

    let twist = manual_twist(
        keys.pressed(KeyCode::ArrowUp),
        keys.pressed(KeyCode::ArrowDown),
        keys.pressed(KeyCode::ArrowLeft),
        keys.pressed(KeyCode::ArrowRight),
        keys.pressed(KeyCode::ShiftLeft) || keys.pressed(KeyCode::ShiftRight),
    );

    let command = match twist {
        Some(twist) => {
            manual.engaged.store(true, Ordering::Release);
            Command::Velocity(twist)
        }
        None if manual.engaged.swap(false, Ordering::AcqRel) => Command::Stop,
        None => return,
    };

    if let Err(e) = manual.robot.command(command, simulation.lock_timeout()) {
        warn!("Keyboard command dropped: {}", e);
    }
}

/// Arrow keys drive and turn, with shift held left and right strafe instead.
fn manual_twist(up: bool, down: bool, left: bool, right: bool, strafe: bool) -> Option<Twist> {
    if !(up || down || left || right) {
        return None;
    }

    let axis = |positive: bool, negative: bool| match (positive, negative) {
        (true, false) => 1.0,
        (false, true) => -1.0,
        _ => 0.0,
    };
    let forward = axis(up, down) * MANUAL_SPEED;
    let sideways = axis(left, right);

    Some(if strafe {
        Twist::new(forward, sideways * MANUAL_SPEED, 0.0)
    } else {
        Twist::new(forward, 0.0, sideways * MANUAL_TURN_RATE)
    })
}

fn handle_exit_key(keys: Res<ButtonInput<KeyCode>>, mut exit: EventWriter<AppExit>) {
    if keys.just_pressed(KeyCode::Escape) {
        exit.send(AppExit);
    }
}

fn stop_robots(
    mut exits: EventReader<AppExit>,
    mut autopilots: ResMut<Autopilots>,
    simulation: Res<SimulationRes>,
) {
    if exits.read().next().is_none() {
        return;
    }

    info!("Stopping all robots");
    simulation.robots().kill_all();

    for thread in autopilots.threads.drain(..) {
        if thread.join().is_err() {
            warn!("Autopilot thread panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{f64::consts::FRAC_PI_2, time::Instant};

    use approx::assert_abs_diff_eq;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;
    use crate::{
        domain::{cast, HasShape, LineSegment, Pose, SensorGeometry, Shape},
        publisher::ChannelSink,
        tests::simulation,
    };

    fn wall(p1: (f64, f64), p2: (f64, f64)) -> Shape {
        LineSegment::try_new(p1.into(), p2.into()).unwrap().shape()
    }

    fn steer_at(pose: Pose, obstacles: &[Shape]) -> Twist {
        let sensors = SensorGeometry::ring(8, 0.1, 2.0);
        steer(sensors.angles(), &cast(pose, &sensors, obstacles))
    }

    #[test]
    fn test_steer_open_space() {
        assert_eq!(
            steer_at(Pose::default(), &[]),
            Twist::new(CRUISE_SPEED, 0.0, 0.0)
        );
    }

    #[test]
    fn test_steer_wall_ahead() {
        let ahead = wall((0.5, -10.0), (0.5, 10.0));
        let twist = steer_at(Pose::default(), &[ahead]);
        assert_eq!(twist.vx, 0.0);
        assert_eq!(twist.omega.abs(), TURN_RATE);
    }

    #[test]
    fn test_steer_away_from_closer_side() {
        let ahead = wall((0.5, -10.0), (0.5, 10.0));
        let left = wall((-10.0, 0.5), (10.0, 0.5));
        assert_eq!(
            steer_at(Pose::default(), &[ahead, left]),
            Twist::new(0.0, 0.0, -TURN_RATE)
        );
    }

    #[test]
    fn test_steer_relative_to_heading() {
        let north = wall((-10.0, 0.5), (10.0, 0.5));
        assert_eq!(
            steer_at(Pose::new(0.0, 0.0, 0.0), &[north]),
            Twist::new(CRUISE_SPEED, 0.0, 0.0)
        );
        assert_ne!(
            steer_at(Pose::new(0.0, 0.0, FRAC_PI_2), &[north]),
            Twist::new(CRUISE_SPEED, 0.0, 0.0)
        );
    }

    #[rstest]
    #[case::ahead(0.0, 0.0)]
    #[case::left(FRAC_PI_2, FRAC_PI_2)]
    #[case::behind(PI, PI)]
    #[case::right(3.0 * FRAC_PI_2, -FRAC_PI_2)]
    #[case::negative(-FRAC_PI_2, -FRAC_PI_2)]
    fn test_relative(#[case] angle: f64, #[case] expected: f64) {
        assert_abs_diff_eq!(relative(Angle::new(angle)), expected, epsilon = 1e-9);
    }

    #[rstest]
    #[case::idle(false, false, false, false, false, None)]
    #[case::forward(true, false, false, false, false, Some(Twist::new(MANUAL_SPEED, 0.0, 0.0)))]
    #[case::backward(false, true, false, false, false, Some(Twist::new(-MANUAL_SPEED, 0.0, 0.0)))]
    #[case::turn_left(false, false, true, false, false, Some(Twist::new(0.0, 0.0, MANUAL_TURN_RATE)))]
    #[case::turn_right(false, false, false, true, false, Some(Twist::new(0.0, 0.0, -MANUAL_TURN_RATE)))]
    #[case::strafe_left(false, false, true, false, true, Some(Twist::new(0.0, MANUAL_SPEED, 0.0)))]
    #[case::opposing(true, true, false, false, false, Some(Twist::new(0.0, 0.0, 0.0)))]
    fn test_manual_twist(
        #[case] up: bool,
        #[case] down: bool,
        #[case] left: bool,
        #[case] right: bool,
        #[case] strafe: bool,
        #[case] expected: Option<Twist>,
    ) {
        assert_eq!(manual_twist(up, down, left, right, strafe), expected);
    }

    #[test]
    fn test_autopilot_commands_robot() {
        let mut simulation = simulation();
        let robot = simulation.spawn(1.0, 1.0, 0.0, "r1").unwrap();
        let mut sink = ChannelSink::new(4);
        let readings = sink.subscribe("r1");
        let engaged = Arc::new(AtomicBool::new(false));
        let timeout = simulation.lock_timeout();

        let thread = {
            let robot = robot.clone();
            let engaged = engaged.clone();
            thread::spawn(move || run_autopilot(robot, readings, engaged, timeout))
        };

        simulation.tick(Duration::from_millis(20), &mut sink);
        let deadline = Instant::now() + Duration::from_secs(5);
        while robot.lock().twist().is_zero() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }

        assert_eq!(robot.lock().twist(), Twist::new(CRUISE_SPEED, 0.0, 0.0));

        simulation.kill("r1").unwrap();
        thread.join().unwrap();
    }

    #[test]
    fn test_engaged_autopilot_yields() {
        let mut simulation = simulation();
        let robot = simulation.spawn(1.0, 1.0, 0.0, "r1").unwrap();
        let mut sink = ChannelSink::new(4);
        let readings = sink.subscribe("r1");
        let engaged = Arc::new(AtomicBool::new(true));
        let timeout = simulation.lock_timeout();

        let thread = {
            let robot = robot.clone();
            thread::spawn(move || run_autopilot(robot, readings, engaged, timeout))
        };

        simulation.tick(Duration::from_millis(20), &mut sink);
        // Closing the channel ends the autopilot once the reading has been consumed
        drop(sink);
        thread.join().unwrap();

        assert!(robot.lock().twist().is_zero());
        assert!(robot.is_active());
    }
}
