//! 2D visualization.
//!
//! Draws the last simulation snapshot with gizmos: obstacles, robots, ToF beams and the lap
//! gates. A text overlay shows the lap times of all robots.

use std::time::Duration;

use bevy::prelude::*;
use tracing::warn;

use crate::{
    domain::{CoordinateTransformer, Position, Region, RobotView},
    resource::SimulationRes,
};

pub struct Visualizer;

impl Plugin for Visualizer {
    fn build(&self, app: &mut App) {
        app.add_systems(Startup, set_up)
            .add_systems(
                Update,
                (
                    handle_keyboard_input,
                    draw_gates,
                    draw_obstacles,
                    draw_robots,
                    update_text,
                ),
            )
            .insert_resource(ClearColor(Color::rgb(0.08, 0.08, 0.1)))
            .insert_resource(Scene { show_text: true });
    }
}

#[derive(Resource)]
struct Scene {
    show_text: bool,
}

const OBSTACLE_COLOR: Color = Color::WHITE;
const ROBOT_COLOR: Color = Color::rgb(0.2, 0.6, 1.0);
const HIT_COLOR: Color = Color::rgb(1.0, 0.3, 0.2);
const MISS_COLOR: Color = Color::rgba(0.3, 0.8, 0.3, 0.4);
const START_GATE_COLOR: Color = Color::rgba(0.2, 0.9, 0.2, 0.6);
const FINISH_GATE_COLOR: Color = Color::rgba(0.9, 0.9, 0.2, 0.6);

/// Maps world coordinates onto the bevy plane, whose origin is the window center.
struct Projection {
    transformer: CoordinateTransformer,
    width: f64,
}

impl Projection {
    fn new(simulation: &SimulationRes) -> Self {
        Self {
            transformer: *simulation.transformer(),
            width: simulation.world().width * simulation.transformer().scale(),
        }
    }

    fn point(&self, position: Position) -> Vec2 {
        let display = self.transformer.to_display(position);
        Vec2::new(
            (display.x() - self.width / 2.0) as f32,
            (self.transformer.frame_height() / 2.0 - display.y()) as f32,
        )
    }

    fn length(&self, meters: f64) -> f32 {
        (meters * self.transformer.scale()) as f32
    }

    /// Center and size of a region.
    fn rect(&self, region: &Region) -> (Vec2, Vec2) {
        let min = self.point(region.min());
        let max = self.point(region.max());
        ((min + max) / 2.0, (max - min).abs())
    }
}

fn set_up(mut commands: Commands) {
    commands.spawn(Camera2dBundle::default());
    create_text(&mut commands);
}

fn create_text(commands: &mut Commands) {
    let text_style = TextStyle {
        font_size: 18.0,
        ..default()
    };
    commands.spawn(
        TextBundle::from_sections(vec![TextSection::new("", text_style)]).with_style(Style {
            position_type: PositionType::Absolute,
            top: Val::Px(12.0),
            left: Val::Px(12.0),
            ..default()
        }),
    );
}

fn draw_gates(mut gizmos: Gizmos, simulation: Res<SimulationRes>) {
    let projection = Projection::new(&simulation);
    let gates = simulation.gates();

    for (region, color) in [
        (&gates.start, START_GATE_COLOR),
        (&gates.finish, FINISH_GATE_COLOR),
    ] {
        let (center, size) = projection.rect(region);
        gizmos.rect_2d(center, 0.0, size, color);
    }
}

fn draw_obstacles(mut gizmos: Gizmos, simulation: Res<SimulationRes>) {
    let projection = Projection::new(&simulation);

    for segment in &simulation.snapshot().segments {
        gizmos.line_2d(
            projection.point(segment.p1()),
            projection.point(segment.p2()),
            OBSTACLE_COLOR,
        );
    }
}

fn draw_robots(mut gizmos: Gizmos, simulation: Res<SimulationRes>) {
    let projection = Projection::new(&simulation);

    for robot in &simulation.snapshot().robots {
        let center = projection.point(robot.pose.position);
        gizmos.circle_2d(center, projection.length(robot.radius), ROBOT_COLOR);
        gizmos.line_2d(
            center,
            projection.point(robot.pose.position.along(robot.pose.heading, robot.radius)),
            ROBOT_COLOR,
        );

        for beam in &robot.beams {
            let color = if beam.is_hit() { HIT_COLOR } else { MISS_COLOR };
            gizmos.line_2d(
                projection.point(beam.origin()),
                projection.point(beam.hit_point()),
                color,
            );
        }
    }
}

fn update_text(mut text: Query<&mut Text>, scene: Res<Scene>, simulation: Res<SimulationRes>) {
    let mut text = text.single_mut();
    if scene.show_text {
        let snapshot = simulation.snapshot();
        text.sections[0].value = snapshot
            .robots
            .iter()
            .map(|robot| lap_summary(robot, snapshot.time))
            .collect::<Vec<_>>()
            .join("\n");
    } else {
        text.sections[0].value = String::new();
    }
}

fn lap_summary(robot: &RobotView, now: Duration) -> String {
    let seconds = |d: Option<Duration>| {
        d.map_or("---".to_string(), |d| format!("{:6.2}", d.as_secs_f64()))
    };
    let timer = &robot.lap_timer;
    format!(
        "{}: LAP {} s   LAST {} s   BEST {} s   LAPS {}",
        robot.name,
        seconds(timer.running(now)),
        seconds(timer.last_lap()),
        seconds(timer.best_lap()),
        timer.laps()
    )
}

fn handle_keyboard_input(
    keys: Res<ButtonInput<KeyCode>>,
    mut scene: ResMut<Scene>,
    simulation: Res<SimulationRes>,
) {
    if keys.just_pressed(KeyCode::KeyR) {
        for robot in simulation.robots().handles() {
            match robot.try_lock_for(simulation.lock_timeout()) {
                Ok(mut robot) => robot.reset(),
                Err(e) => warn!("Reset skipped: {}", e),
            }
        }
    }

    if keys.just_pressed(KeyCode::KeyT) {
        scene.show_text = !scene.show_text;
    }
}
