//! Custom error types for auto-dance-ctrl.
//!
//! Every failure the library can report is a variant of [`CtrlError`]. OS-level
//! failures coming out of [`crate::process_io`] are converted by the controller
//! into the session-level kinds (`Attach`, `TargetLost`) before they reach a
//! caller.

use std::io;
use thiserror::Error;

use crate::controller::RunState;

/// Main error type for auto-dance-ctrl operations.
#[derive(Error, Debug)]
pub enum CtrlError {
    /// The target process or its window could not be located.
    #[error("target not found: {0}")]
    NotFound(String),

    /// A PID was known but the automation channel to it could not be set up.
    #[error("failed to attach to pid {pid}: {reason}")]
    Attach { pid: u32, reason: String },

    /// A read or adjust call failed against an attached target.
    #[error("I/O with pid {pid} failed: {reason}")]
    Io { pid: u32, reason: String },

    /// The session was stopped because the target stopped answering.
    #[error("lost target pid {pid} ({reason}); session stopped, start a new session to continue")]
    TargetLost { pid: u32, reason: String },

    /// A command needs a running session.
    #[error("session is not running (state: {state})")]
    NotRunning { state: RunState },

    /// `start` was called on a session that is already running.
    #[error("session for pid {pid} is already running")]
    AlreadyRunning { pid: u32 },

    /// A PID value is not a positive integer.
    #[error("invalid pid '{value}': {reason}")]
    InvalidPid { value: String, reason: String },

    /// A requested speed lies outside what the target supports.
    #[error("speed {value} is outside the supported range [{min}, {max}]")]
    SpeedOutOfRange { value: i32, min: i32, max: i32 },

    /// The specified key is invalid or unsupported.
    #[error("invalid key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    /// Error parsing duration string.
    #[error("invalid duration '{value}': {reason}")]
    InvalidDuration { value: String, reason: String },

    /// Error parsing a memory address or offset.
    #[error("invalid address '{value}': {reason}")]
    InvalidAddress { value: String, reason: String },

    /// Configuration validation error.
    #[error("configuration error: {0}")]
    ConfigValidation(String),

    /// Error reading or parsing a configuration file.
    #[error("failed to load config from '{path}': {reason}")]
    ConfigLoad { path: String, reason: String },

    /// Error writing a configuration file.
    #[error("failed to save config to '{path}': {reason}")]
    ConfigSave { path: String, reason: String },

    /// Platform-specific operation is not supported.
    #[error("operation not supported on this platform: {0}")]
    UnsupportedPlatform(String),

    /// Error registering or handling hotkey.
    #[error("hotkey error: {0}")]
    Hotkey(String),

    /// No async runtime was available to host the background loop.
    #[error("runtime error: {0}")]
    Runtime(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    StdIo(#[from] io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for auto-dance-ctrl operations.
pub type Result<T> = std::result::Result<T, CtrlError>;

impl CtrlError {
    /// Create a new NotFound error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Create a new Attach error.
    pub fn attach(pid: u32, reason: impl Into<String>) -> Self {
        Self::Attach {
            pid,
            reason: reason.into(),
        }
    }

    /// Create a new Io error.
    pub fn io(pid: u32, reason: impl Into<String>) -> Self {
        Self::Io {
            pid,
            reason: reason.into(),
        }
    }

    /// Create a new TargetLost error.
    pub fn target_lost(pid: u32, reason: impl Into<String>) -> Self {
        Self::TargetLost {
            pid,
            reason: reason.into(),
        }
    }

    /// Create a new InvalidPid error.
    pub fn invalid_pid(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPid {
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Create a new InvalidKey error.
    pub fn invalid_key(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidKey {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Create a new InvalidDuration error.
    pub fn invalid_duration(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDuration {
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Create a new InvalidAddress error.
    pub fn invalid_address(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidAddress {
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Create a new ConfigValidation error.
    pub fn config_validation(message: impl Into<String>) -> Self {
        Self::ConfigValidation(message.into())
    }

    /// Create a new ConfigLoad error.
    pub fn config_load(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigLoad {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a new ConfigSave error.
    pub fn config_save(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigSave {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a new UnsupportedPlatform error.
    pub fn unsupported_platform(message: impl Into<String>) -> Self {
        Self::UnsupportedPlatform(message.into())
    }

    /// Create a new Hotkey error.
    pub fn hotkey(message: impl Into<String>) -> Self {
        Self::Hotkey(message.into())
    }

    /// Create a new Runtime error.
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime(message.into())
    }

    /// True for the state machine errors a caller can simply ignore or retry.
    pub fn is_state_error(&self) -> bool {
        matches!(self, Self::NotRunning { .. } | Self::AlreadyRunning { .. })
    }
}
