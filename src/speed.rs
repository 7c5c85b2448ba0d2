//! Speed values read from the target.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CtrlError, Result};

/// Inclusive range of speeds the target supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeedBounds {
    pub min: i32,
    pub max: i32,
}

impl SpeedBounds {
    pub fn new(min: i32, max: i32) -> Result<Self> {
        if min > max {
            return Err(CtrlError::config_validation(format!(
                "speed bounds are inverted: min {} > max {}",
                min, max
            )));
        }
        Ok(Self { min, max })
    }

    pub fn contains(&self, value: i32) -> bool {
        (self.min..=self.max).contains(&value)
    }

    pub fn check(&self, value: i32) -> Result<()> {
        if self.contains(value) {
            Ok(())
        } else {
            Err(CtrlError::SpeedOutOfRange {
                value,
                min: self.min,
                max: self.max,
            })
        }
    }
}

/// One measurement of the target's playback speed.
///
/// A `SpeedValue` can only be built inside its bounds, so any value held by a
/// session is one the target actually supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeedValue {
    value: i32,
    bounds: SpeedBounds,
}

impl SpeedValue {
    pub fn new(value: i32, bounds: SpeedBounds) -> Result<Self> {
        bounds.check(value)?;
        Ok(Self { value, bounds })
    }

    pub fn value(&self) -> i32 {
        self.value
    }

    pub fn bounds(&self) -> SpeedBounds {
        self.bounds
    }

    pub fn is_at_min(&self) -> bool {
        self.value == self.bounds.min
    }

    pub fn is_at_max(&self) -> bool {
        self.value == self.bounds.max
    }

    /// Direction of the single step that moves this value toward `goal`.
    pub fn direction_to(&self, goal: i32) -> Option<Direction> {
        match goal.cmp(&self.value) {
            std::cmp::Ordering::Greater => Some(Direction::Up),
            std::cmp::Ordering::Less => Some(Direction::Down),
            std::cmp::Ordering::Equal => None,
        }
    }
}

impl fmt::Display for SpeedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

/// Direction of one adjust action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => f.write_str("up"),
            Direction::Down => f.write_str("down"),
        }
    }
}
