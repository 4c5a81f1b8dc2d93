//! Live set of robots, each guarded by its own lock.
//!
//! The simulation tick and any number of external controllers share robots through
//! [`RobotHandle`]s. A handle locks exactly one robot; nothing ever holds two robot locks at
//! once. Killed robots are flagged immediately but only leave the set when the tick applies
//! pending removals, so a kill never disturbs an iteration in progress.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use parking_lot::{Mutex, MutexGuard, RwLock};
use thiserror::Error;
use tracing::{debug, info};

use super::{Pose, Robot, RobotConfig, ToFReading, Twist};

#[derive(Error, Clone, Debug, PartialEq)]
pub enum RegistryError {
    #[error("robot {0:?} already exists")]
    DuplicateName(String),
    #[error("robot {0:?} not found")]
    NotFound(String),
    #[error("robot {name:?} not locked within {timeout:?}")]
    LockTimeout { name: String, timeout: Duration },
}

/// Control intake of a robot.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Command {
    Velocity(Twist),
    Pose(Pose),
    Stop,
}

impl Robot {
    pub fn apply(&mut self, command: Command) {
        match command {
            Command::Velocity(twist) => self.set_twist(twist),
            Command::Pose(pose) => self.set_pose(pose),
            Command::Stop => self.set_twist(Twist::default()),
        }
    }
}

#[derive(Debug)]
struct RobotCell {
    name: String,
    active: AtomicBool,
    robot: Mutex<Robot>,
}

#[derive(Clone, Debug)]
pub struct RobotHandle(Arc<RobotCell>);

impl RobotHandle {
    fn new(robot: Robot) -> Self {
        Self(Arc::new(RobotCell {
            name: robot.name().to_string(),
            active: AtomicBool::new(true),
            robot: Mutex::new(robot),
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// False once the robot has been killed.
    pub fn is_active(&self) -> bool {
        self.0.active.load(Ordering::Acquire)
    }

    pub fn is_same(&self, other: &RobotHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Blocks until the robot is locked.
    pub fn lock(&self) -> MutexGuard<'_, Robot> {
        self.0.robot.lock()
    }

    pub fn try_lock_for(&self, timeout: Duration) -> Result<MutexGuard<'_, Robot>, RegistryError> {
        self.0
            .robot
            .try_lock_for(timeout)
            .ok_or_else(|| RegistryError::LockTimeout {
                name: self.0.name.clone(),
                timeout,
            })
    }

    pub fn command(&self, command: Command, timeout: Duration) -> Result<(), RegistryError> {
        self.try_lock_for(timeout)?.apply(command);
        Ok(())
    }

    /// Latest reading published by the simulation tick.
    pub fn reading(&self, timeout: Duration) -> Result<ToFReading, RegistryError> {
        Ok(self.try_lock_for(timeout)?.reading().clone())
    }

    fn stop(&self) {
        self.0.active.store(false, Ordering::Release);
    }
}

#[derive(Debug, Default)]
pub struct RobotRegistry {
    robots: RwLock<Vec<RobotHandle>>,
    pending_removals: Mutex<Vec<RobotHandle>>,
}

impl RobotRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn(
        &self,
        name: &str,
        pose: Pose,
        config: RobotConfig,
    ) -> Result<RobotHandle, RegistryError> {
        let mut robots = self.robots.write();
        if robots.iter().any(|r| r.is_active() && r.name() == name) {
            return Err(RegistryError::DuplicateName(name.to_string()));
        }
        let handle = RobotHandle::new(Robot::new(name, pose, config));
        robots.push(handle.clone());
        info!(
            "Spawned robot '{}' at ({:.2}, {:.2})",
            name,
            pose.position.x(),
            pose.position.y()
        );
        Ok(handle)
    }

    /// Stops the robot; it leaves the registry with the next [`Self::apply_pending_removals`].
    pub fn kill(&self, name: &str) -> Result<(), RegistryError> {
        let handle = self.get(name)?;
        handle.stop();
        self.pending_removals.lock().push(handle);
        info!("Killed robot '{}'", name);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<RobotHandle, RegistryError> {
        self.robots
            .read()
            .iter()
            .find(|r| r.is_active() && r.name() == name)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    /// Applies a control command to the named robot.
    pub fn command(
        &self,
        name: &str,
        command: Command,
        timeout: Duration,
    ) -> Result<(), RegistryError> {
        self.get(name)?.command(command, timeout)
    }

    /// Active robots in spawn order.
    pub fn handles(&self) -> Vec<RobotHandle> {
        self.robots
            .read()
            .iter()
            .filter(|r| r.is_active())
            .cloned()
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.handles()
            .iter()
            .map(|r| r.name().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.handles().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn apply_pending_removals(&self) {
        let removals = std::mem::take(&mut *self.pending_removals.lock());
        if removals.is_empty() {
            return;
        }
        self.robots
            .write()
            .retain(|r| !removals.iter().any(|k| k.is_same(r)));
        debug!("Removed {} killed robot(s)", removals.len());
    }

    /// Stops every robot, e.g. on shutdown.
    pub fn kill_all(&self) {
        for handle in self.handles() {
            handle.stop();
            self.pending_removals.lock().push(handle);
        }
    }
}
