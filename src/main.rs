use std::process::ExitCode;

use bevy::prelude::*;


mod config;
mod controller;
mod domain;
mod publisher;
mod resource;
mod simulator;
mod visualizer;

use crate::{
    config::SimConfig,
    publisher::ChannelSink,
    resource::{PublisherRes, SimulationRes},
};

const CONFIG_PATH: &str = "sim.toml";
const PUBLISH_QUEUE_SIZE: usize = 16;

fn main() -> ExitCode {
    let config = match SimConfig::load_or_default(CONFIG_PATH) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    let simulation = match simulator::create_simulation(&config) {
        Ok(simulation) => simulation,
        Err(e) => {
            eprintln!("Failed to set up simulation: {e}");
            return ExitCode::FAILURE;
        }
    };

    let (width, height) = config.display_size();

    App::new()
        .add_plugins(DefaultPlugins.set(WindowPlugin {
            primary_window: Some(Window {
                title: "Mecanum Robot Simulator".into(),
                resolution: (width as f32, height as f32).into(),
                ..default()
            }),
            ..default()
        }))
        .insert_resource(Time::<Fixed>::from_duration(config.tick_period()))
        .insert_resource(SimulationRes::from(simulation))
        .insert_resource(PublisherRes::from(ChannelSink::new(PUBLISH_QUEUE_SIZE)))
        .add_plugins(controller::Controller)
        .add_plugins(visualizer::Visualizer)
        .add_plugins(simulator::Simulator)
        .run();

    ExitCode::SUCCESS
}
