//! The resource module encapsulates domain entities for use with Bevy.

use std::ops::{Deref, DerefMut};

use bevy::ecs::system::Resource;

use crate::{domain, publisher::ChannelSink};

#[derive(Resource)]
pub struct SimulationRes(domain::Simulation);

impl Deref for SimulationRes {
    type Target = domain::Simulation;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for SimulationRes {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl From<domain::Simulation> for SimulationRes {
    fn from(value: domain::Simulation) -> Self {
        Self(value)
    }
}

#[derive(Resource)]
pub struct PublisherRes(ChannelSink);

impl Deref for PublisherRes {
    type Target = ChannelSink;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for PublisherRes {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl From<ChannelSink> for PublisherRes {
    fn from(value: ChannelSink) -> Self {
        Self(value)
    }
}
