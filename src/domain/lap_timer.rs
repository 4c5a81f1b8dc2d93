//! Lap timing driven by a robot entering start and finish gate regions.

use std::time::Duration;

use serde::Deserialize;

use super::Position;

/// Axis-aligned box in world coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(from = "[Position; 2]")]
pub struct Region {
    min: Position,
    max: Position,
}

impl Region {
    /// Region spanned by two opposite corners.
    pub fn new(c_1: Position, c_2: Position) -> Self {
        Self {
            min: Position::new(c_1.x().min(c_2.x()), c_1.y().min(c_2.y())),
            max: Position::new(c_1.x().max(c_2.x()), c_1.y().max(c_2.y())),
        }
    }

    pub fn min(&self) -> Position {
        self.min
    }

    pub fn max(&self) -> Position {
        self.max
    }

    /// Boundary points count as inside.
    pub fn contains(&self, position: Position) -> bool {
        (self.min.x()..=self.max.x()).contains(&position.x())
            && (self.min.y()..=self.max.y()).contains(&position.y())
    }
}

impl From<[Position; 2]> for Region {
    fn from([c_1, c_2]: [Position; 2]) -> Self {
        Self::new(c_1, c_2)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LapTimerState {
    #[default]
    Idle,
    Running,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LapEvent {
    Started,
    Finished(Duration),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Gates {
    pub start: Region,
    pub finish: Region,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct LapTimer {
    state: LapTimerState,
    start: Option<Duration>,
    last_lap: Option<Duration>,
    best_lap: Option<Duration>,
    laps: u32,
    in_start: bool,
    in_finish: bool,
}

impl LapTimer {
    pub fn state(&self) -> LapTimerState {
        self.state
    }

    /// Time the running lap was started at.
    pub fn start(&self) -> Option<Duration> {
        self.start
    }

    pub fn last_lap(&self) -> Option<Duration> {
        self.last_lap
    }

    pub fn best_lap(&self) -> Option<Duration> {
        self.best_lap
    }

    pub fn laps(&self) -> u32 {
        self.laps
    }

    /// Elapsed time of the running lap.
    pub fn running(&self, now: Duration) -> Option<Duration> {
        match self.state {
            LapTimerState::Running => self.start.map(|start| now.saturating_sub(start)),
            LapTimerState::Idle => None,
        }
    }

    /// Advances the state machine with the position at time `now`.
    ///
    /// Transitions happen only when a gate is entered, i.e. the previous update was outside of
    /// it. Entering the start gate while running keeps the original start time.
    pub fn update(&mut self, position: Position, now: Duration, gates: &Gates) -> Option<LapEvent> {
        let in_start = gates.start.contains(position);
        let in_finish = gates.finish.contains(position);
        let entered_start = in_start && !self.in_start;
        let entered_finish = in_finish && !self.in_finish;
        self.in_start = in_start;
        self.in_finish = in_finish;

        match self.state {
            LapTimerState::Idle if entered_start => {
                self.state = LapTimerState::Running;
                self.start = Some(now);
                Some(LapEvent::Started)
            }
            LapTimerState::Running if entered_finish => {
                let elapsed = now.saturating_sub(self.start.take().unwrap_or(now));
                self.state = LapTimerState::Idle;
                self.last_lap = Some(elapsed);
                self.best_lap = Some(self.best_lap.map_or(elapsed, |best| best.min(elapsed)));
                self.laps += 1;
                Some(LapEvent::Finished(elapsed))
            }
            _ => None,
        }
    }
}
