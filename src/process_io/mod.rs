//! Everything that touches the operating system.
//!
//! [`ProcessIo`] is the contract the controller drives: find the target,
//! resolve a PID into a [`TargetProcess`], read the speed, send one adjust
//! step. [`SystemProcessIo`] implements it against the real OS and
//! [`mock::MockProcessIo`] implements it in memory.
//!
//! On Windows the speed is read with `ReadProcessMemory` through the pointer
//! chain in [`SpeedLocation`] and one adjust is a single key press posted to
//! the target window. Elsewhere only discovery works; reads and adjusts fail
//! with [`CtrlError::UnsupportedPlatform`].

pub mod mock;
#[cfg(windows)]
mod windows;

use std::fmt;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::config::{Config, SpeedLocation};
use crate::error::{CtrlError, Result};
use crate::keys::{parse_key, Key};
use crate::process_finder::ProcessFinder;
use crate::speed::{Direction, SpeedBounds, SpeedValue};

/// Opaque window identifier of a resolved target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowHandle(pub u64);

impl fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:X}", self.0)
    }
}

/// A running target instance. Becomes useless once the process exits; a new
/// one has to be resolved after a restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetProcess {
    pub pid: u32,
    pub window: WindowHandle,
}

/// Primitive, blocking operations against the target.
///
/// Implementations never retry. Calls for one session are serialized by the
/// controller, so an implementation only has to be safe for use from several
/// threads one call at a time.
pub trait ProcessIo: Send + Sync {
    /// PID of the first running instance of the target, if any.
    fn find_target_pid(&self) -> Option<u32>;

    /// Check that `pid` is alive and owns a target window.
    fn resolve_target(&self, pid: u32) -> Result<TargetProcess>;

    fn read_speed(&self, target: &TargetProcess) -> Result<SpeedValue>;

    /// Move the speed one step. Repeated calls move one step each.
    fn send_adjust(&self, target: &TargetProcess, direction: Direction) -> Result<()>;
}

/// [`ProcessIo`] against the real operating system.
#[cfg_attr(not(windows), allow(dead_code))]
pub struct SystemProcessIo {
    window_title: String,
    window_class: Option<String>,
    process_name: String,
    speed: SpeedLocation,
    bounds: SpeedBounds,
    increase_key: Key,
    decrease_key: Key,
    finder: Mutex<ProcessFinder>,
}

impl SystemProcessIo {
    pub fn new(config: &Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            window_title: config.window_title.trim().to_lowercase(),
            window_class: config.window_class.clone().filter(|c| !c.trim().is_empty()),
            process_name: config.process_name.clone(),
            speed: config.speed.clone(),
            bounds: config.speed.bounds()?,
            increase_key: parse_key(&config.increase_key)?,
            decrease_key: parse_key(&config.decrease_key)?,
            finder: Mutex::new(ProcessFinder::new()),
        })
    }

    fn key_for(&self, direction: Direction) -> Key {
        match direction {
            Direction::Up => self.increase_key,
            Direction::Down => self.decrease_key,
        }
    }

    fn with_finder<T>(&self, f: impl FnOnce(&mut ProcessFinder) -> T) -> T {
        let mut finder = self
            .finder
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        f(&mut finder)
    }

    fn speed_from_raw(&self, pid: u32, raw: i32) -> Result<SpeedValue> {
        SpeedValue::new(raw, self.bounds).map_err(|_| {
            CtrlError::io(
                pid,
                format!(
                    "read implausible speed {} (expected {}..={})",
                    raw, self.bounds.min, self.bounds.max
                ),
            )
        })
    }
}

#[cfg(windows)]
impl ProcessIo for SystemProcessIo {
    fn find_target_pid(&self) -> Option<u32> {
        if !self.window_title.is_empty() {
            if let Some(window) =
                windows::find_window(&self.window_title, self.window_class.as_deref())
            {
                debug!(pid = window.pid, title = %window.title, "found target window");
                return Some(window.pid);
            }
        }
        self.with_finder(|finder| finder.find_pid_by_name(&self.process_name))
    }

    fn resolve_target(&self, pid: u32) -> Result<TargetProcess> {
        if !self.with_finder(|finder| finder.is_alive(pid)) {
            return Err(CtrlError::not_found(format!("no running process with pid {}", pid)));
        }
        let hwnd = windows::window_for_pid(pid, &self.window_title, self.window_class.as_deref())
            .ok_or_else(|| {
                CtrlError::not_found(format!("process {} has no visible top-level window", pid))
            })?;
        let target = TargetProcess {
            pid,
            window: WindowHandle(hwnd),
        };
        debug!(pid, window = %target.window, "resolved target");
        Ok(target)
    }

    fn read_speed(&self, target: &TargetProcess) -> Result<SpeedValue> {
        if !self.speed.is_configured() {
            return Err(CtrlError::io(
                target.pid,
                "speed.module_offset is not configured",
            ));
        }
        windows::ensure_alive(target).map_err(|reason| CtrlError::io(target.pid, reason))?;
        let raw = windows::read_speed_value(target.pid, &self.speed)
            .map_err(|reason| CtrlError::io(target.pid, reason))?;
        trace!(pid = target.pid, raw, "read speed");
        self.speed_from_raw(target.pid, raw)
    }

    fn send_adjust(&self, target: &TargetProcess, direction: Direction) -> Result<()> {
        windows::ensure_alive(target).map_err(|reason| CtrlError::io(target.pid, reason))?;
        let key = self.key_for(direction);
        windows::post_key_press(target.window.0, key)
            .map_err(|reason| CtrlError::io(target.pid, reason))?;
        debug!(pid = target.pid, %direction, %key, "posted adjust key");
        Ok(())
    }
}

#[cfg(not(windows))]
impl ProcessIo for SystemProcessIo {
    fn find_target_pid(&self) -> Option<u32> {
        self.with_finder(|finder| finder.find_pid_by_name(&self.process_name))
    }

    fn resolve_target(&self, pid: u32) -> Result<TargetProcess> {
        if !self.with_finder(|finder| finder.is_alive(pid)) {
            return Err(CtrlError::not_found(format!("no running process with pid {}", pid)));
        }
        // Without a window system API the PID doubles as the window id.
        let target = TargetProcess {
            pid,
            window: WindowHandle(pid as u64),
        };
        debug!(pid, "resolved target");
        Ok(target)
    }

    fn read_speed(&self, target: &TargetProcess) -> Result<SpeedValue> {
        trace!(pid = target.pid, "speed read requested");
        Err(CtrlError::unsupported_platform(format!(
            "reading the speed of pid {} requires Windows",
            target.pid
        )))
    }

    fn send_adjust(&self, target: &TargetProcess, direction: Direction) -> Result<()> {
        trace!(pid = target.pid, %direction, key = %self.key_for(direction), "adjust requested");
        Err(CtrlError::unsupported_platform(format!(
            "adjusting the speed of pid {} requires Windows",
            target.pid
        )))
    }
}
