//! Hands ToF readings to subscribers over bounded channels, one channel per robot.

use std::collections::HashMap;

use crossbeam_channel::{Receiver, Sender, TrySendError};

use crate::domain::{PublishError, PublishSink, ToFReading};

pub struct ChannelSink {
    capacity: usize,
    subscribers: HashMap<String, Sender<ToFReading>>,
}

impl ChannelSink {
    /// Each subscriber may lag `capacity` readings behind before publishing fails.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            subscribers: HashMap::new(),
        }
    }

    /// Subscribes to the readings of `robot`, replacing an earlier subscriber.
    pub fn subscribe(&mut self, robot: &str) -> Receiver<ToFReading> {
        let (sender, receiver) = crossbeam_channel::bounded(self.capacity);
        self.subscribers.insert(robot.to_string(), sender);
        receiver
    }

    pub fn unsubscribe(&mut self, robot: &str) {
        self.subscribers.remove(robot);
    }

    pub fn is_subscribed(&self, robot: &str) -> bool {
        self.subscribers.contains_key(robot)
    }
}

impl PublishSink for ChannelSink {
    /// Readings of robots without subscriber are dropped silently.
    fn publish(&mut self, robot: &str, reading: &ToFReading) -> Result<(), PublishError> {
        let Some(sender) = self.subscribers.get(robot) else {
            return Ok(());
        };
        match sender.try_send(reading.clone()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(PublishError::Full(robot.to_string())),
            Err(TrySendError::Disconnected(_)) => {
                self.subscribers.remove(robot);
                Err(PublishError::Disconnected(robot.to_string()))
            }
        }
    }
}
