//! # Auto Dance Controller
//!
//! Attaches to a running dance game client, reads its current playback speed
//! and steps it up or down on request.
//!
//! ## Features
//!
//! - Find the target by window title/class or executable name, no manual PID
//! - Read the speed straight from the target's memory (Windows)
//! - Rate-limited speed adjustments posted to the target window
//! - Background session that samples the speed and can walk it to a goal
//! - Remembers the last target PID in a small record file
//! - Global hotkeys for use while the target is fullscreen
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use auto_dance_ctrl::{AutomationController, ConfFile, Config, ControllerOptions, SystemProcessIo};
//!
//! # #[tokio::main]
//! # async fn main() -> auto_dance_ctrl::Result<()> {
//! let config = Config::from_file("settings.json")?;
//! let io = Arc::new(SystemProcessIo::new(&config)?);
//! let store = Arc::new(ConfFile::open("app.conf")?);
//!
//! let controller = AutomationController::new(io, store, None, ControllerOptions::from(&config))?;
//! controller.start()?;
//! println!("speed: {}", controller.measure_speed()?);
//! controller.increase_speed()?;
//! controller.stop();
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing without a target
//!
//! [`MockProcessIo`] implements the same [`ProcessIo`] contract in memory and
//! can stand in for the real target everywhere.

pub mod conf_store;
pub mod config;
pub mod controller;
pub mod error;
pub mod global_hotkey;
pub mod keys;
pub mod process_finder;
pub mod process_io;
pub mod speed;

pub use conf_store::{ConfFile, ConfRecord, MemoryPidStore, PidStore};
pub use config::Config;
pub use controller::{
    discover_pid, AutomationController, ControllerOptions, RunState, SessionSnapshot,
};
pub use error::{CtrlError, Result};
pub use global_hotkey::{HotkeyAction, HotkeyManager};
pub use process_finder::ProcessFinder;
pub use process_io::mock::MockProcessIo;
pub use process_io::{ProcessIo, SystemProcessIo, TargetProcess, WindowHandle};
pub use speed::{Direction, SpeedBounds, SpeedValue};
