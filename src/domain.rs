//! The domain module encapsulates the core simulation logic. It defines the `Robot`, the
//! obstacles and the `Simulation` stepping them, along with the rules governing their
//! interactions: sensor raycasting, resets and lap timing.
//!
//! By minimizing hard dependencies, this module ensures the simulation remains independent of
//! rendering and messaging. Bevy never appears here.

mod basis;
mod collision;
mod lap_timer;
mod obstacle;
mod raycast;
mod registry;
mod reset;
mod robot;
mod simulation;
mod transform;

pub use basis::{Angle, Pose, Position, Twist};
pub use collision::{HasShape, Shape};
pub use lap_timer::{Gates, LapEvent, LapTimer, LapTimerState, Region};
pub use obstacle::{LineSegment, ObstacleError, ObstacleRegistry};
pub use raycast::{cast, Beam, SensorGeometry, ToFReading, NO_HIT};
pub use registry::{Command, RegistryError, RobotHandle, RobotRegistry};
pub use reset::{ResetCause, ResetPolicy};
pub use robot::{Robot, RobotConfig};
pub use simulation::{
    PublishError, PublishSink, RenderSnapshot, RobotView, Simulation, TickReport, World,
};
pub use transform::CoordinateTransformer;
