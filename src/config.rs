//! Settings describing how to find the target and how to talk to it.
//!
//! Settings live in a JSON file. Every field has a default, so a missing file
//! or a partial one is fine; only the speed address has to be filled in before
//! speed can be read from a real target.
//!
//! ```json
//! {
//!   "window_title": "Audition",
//!   "process_name": "Audition.exe",
//!   "speed": {
//!     "module_offset": "0x5A1C24",
//!     "offsets": ["0x1C", "0x248"],
//!     "pointer_width": 4,
//!     "min": 0,
//!     "max": 10
//!   },
//!   "increase_key": "pageup",
//!   "decrease_key": "pagedown",
//!   "poll_interval": "250ms",
//!   "adjust_interval": "120ms"
//! }
//! ```

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CtrlError, Result};
use crate::keys::parse_key;
use crate::speed::SpeedBounds;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Case-insensitive substring matched against top-level window titles.
    #[serde(default = "default_window_title")]
    pub window_title: String,

    /// Optional exact window class name.
    #[serde(default)]
    pub window_class: Option<String>,

    /// Executable name used when no window matches.
    #[serde(default = "default_process_name")]
    pub process_name: String,

    #[serde(default)]
    pub speed: SpeedLocation,

    #[serde(default = "default_increase_key")]
    pub increase_key: String,

    #[serde(default = "default_decrease_key")]
    pub decrease_key: String,

    /// How often the background loop samples the speed.
    #[serde(default = "default_poll_interval", with = "duration_text")]
    pub poll_interval: Duration,

    /// Minimum spacing between two adjust actions.
    #[serde(default = "default_adjust_interval", with = "duration_text")]
    pub adjust_interval: Duration,

    /// Pause between an adjust and the read that confirms it.
    #[serde(default = "default_settle_delay", with = "duration_text")]
    pub settle_delay: Duration,

    #[serde(default)]
    pub hotkeys: HotkeyBindings,

    #[serde(default)]
    pub verbose: bool,
}

/// Where the speed value lives in the target's memory.
///
/// The address is `module base + module_offset`; each entry of `offsets`
/// dereferences the current address as a pointer and adds the offset. The
/// final address holds a little-endian `i32`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeedLocation {
    #[serde(default)]
    pub module_offset: Address,

    #[serde(default)]
    pub offsets: Vec<Address>,

    #[serde(default = "default_pointer_width")]
    pub pointer_width: u8,

    #[serde(default = "default_speed_min")]
    pub min: i32,

    #[serde(default = "default_speed_max")]
    pub max: i32,
}

impl Default for SpeedLocation {
    fn default() -> Self {
        Self {
            module_offset: Address::default(),
            offsets: Vec::new(),
            pointer_width: default_pointer_width(),
            min: default_speed_min(),
            max: default_speed_max(),
        }
    }
}

impl SpeedLocation {
    pub fn bounds(&self) -> Result<SpeedBounds> {
        SpeedBounds::new(self.min, self.max)
    }

    pub fn is_configured(&self) -> bool {
        self.module_offset.0 != 0
    }
}

/// Global hotkeys for the interactive runner. `None` disables a binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HotkeyBindings {
    #[serde(default = "default_hotkey_increase")]
    pub increase: Option<String>,
    #[serde(default = "default_hotkey_decrease")]
    pub decrease: Option<String>,
    #[serde(default = "default_hotkey_measure")]
    pub measure: Option<String>,
    #[serde(default = "default_hotkey_stop")]
    pub stop: Option<String>,
}

impl Default for HotkeyBindings {
    fn default() -> Self {
        Self {
            increase: default_hotkey_increase(),
            decrease: default_hotkey_decrease(),
            measure: default_hotkey_measure(),
            stop: default_hotkey_stop(),
        }
    }
}

/// A memory address or offset, written as `0x`-prefixed hex or decimal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(pub u64);

impl FromStr for Address {
    type Err = CtrlError;

    fn from_str(s: &str) -> Result<Self> {
        parse_address(s).map(Address)
    }
}

impl TryFrom<String> for Address {
    type Error = CtrlError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.to_string()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:X}", self.0)
    }
}

fn default_window_title() -> String {
    "Audition".to_string()
}

fn default_process_name() -> String {
    "Audition.exe".to_string()
}

fn default_increase_key() -> String {
    "pageup".to_string()
}

fn default_decrease_key() -> String {
    "pagedown".to_string()
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(250)
}

fn default_adjust_interval() -> Duration {
    Duration::from_millis(120)
}

fn default_settle_delay() -> Duration {
    Duration::from_millis(40)
}

fn default_pointer_width() -> u8 {
    4
}

fn default_speed_min() -> i32 {
    0
}

fn default_speed_max() -> i32 {
    10
}

fn default_hotkey_increase() -> Option<String> {
    Some("ctrl+alt+pageup".to_string())
}

fn default_hotkey_decrease() -> Option<String> {
    Some("ctrl+alt+pagedown".to_string())
}

fn default_hotkey_measure() -> Option<String> {
    Some("ctrl+alt+m".to_string())
}

fn default_hotkey_stop() -> Option<String> {
    Some("ctrl+alt+s".to_string())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            window_title: default_window_title(),
            window_class: None,
            process_name: default_process_name(),
            speed: SpeedLocation::default(),
            increase_key: default_increase_key(),
            decrease_key: default_decrease_key(),
            poll_interval: default_poll_interval(),
            adjust_interval: default_adjust_interval(),
            settle_delay: default_settle_delay(),
            hotkeys: HotkeyBindings::default(),
            verbose: false,
        }
    }
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| CtrlError::config_load(path.display().to_string(), e.to_string()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|e| CtrlError::config_load(path.display().to_string(), e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load settings from `path` if it exists, defaults otherwise.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::from_file(path)
        } else {
            tracing::debug!(path = %path.display(), "settings file not found, using defaults");
            Ok(Self::default())
        }
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)
            .map_err(|e| CtrlError::config_save(path.display().to_string(), e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.window_title.trim().is_empty() && self.process_name.trim().is_empty() {
            return Err(CtrlError::config_validation(
                "window_title and process_name cannot both be empty",
            ));
        }

        parse_key(&self.increase_key)?;
        parse_key(&self.decrease_key)?;
        if self.increase_key.trim().eq_ignore_ascii_case(self.decrease_key.trim()) {
            return Err(CtrlError::config_validation(
                "increase_key and decrease_key must differ",
            ));
        }

        if !matches!(self.speed.pointer_width, 4 | 8) {
            return Err(CtrlError::config_validation(format!(
                "speed.pointer_width must be 4 or 8, got {}",
                self.speed.pointer_width
            )));
        }
        self.speed.bounds()?;

        if self.poll_interval.is_zero() {
            return Err(CtrlError::config_validation("poll_interval must be > 0"));
        }

        Ok(())
    }
}

/// Parse strings such as `"500ms"`, `"2s"`, `"5m"` or bare milliseconds.
pub fn parse_duration(value: &str) -> Result<Duration> {
    let trimmed = value.trim().to_lowercase();
    if trimmed.is_empty() {
        return Err(CtrlError::invalid_duration(value, "empty duration"));
    }

    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(split);
    if number.is_empty() {
        return Err(CtrlError::invalid_duration(value, "missing number"));
    }
    let amount: u64 = number
        .parse()
        .map_err(|e: std::num::ParseIntError| CtrlError::invalid_duration(value, e.to_string()))?;

    match unit.trim() {
        "" | "ms" => Ok(Duration::from_millis(amount)),
        "s" => Ok(Duration::from_secs(amount)),
        "m" => amount
            .checked_mul(60)
            .map(Duration::from_secs)
            .ok_or_else(|| CtrlError::invalid_duration(value, "too large")),
        other => Err(CtrlError::invalid_duration(
            value,
            format!("unknown unit '{}'", other),
        )),
    }
}

fn parse_address(value: &str) -> Result<u64> {
    let trimmed = value.trim();
    let parsed = match trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => trimmed.parse::<u64>(),
    };
    parsed.map_err(|e| CtrlError::invalid_address(value, e.to_string()))
}

mod duration_text {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{}ms", value.as_millis()))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(deserializer)?;
        super::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("0ms").unwrap(), Duration::from_millis(0));
        assert_eq!(parse_duration("1000").unwrap(), Duration::from_millis(1000));
        assert_eq!(parse_duration("5S").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_duration(" 2m ").unwrap(), Duration::from_secs(120));

        assert!(parse_duration("").is_err());
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("1000x").is_err());
        assert!(parse_duration("-1000ms").is_err());
    }

    #[test]
    fn test_parse_duration_minutes_overflow() {
        let huge = format!("{}m", u64::MAX / 2);
        assert!(matches!(
            parse_duration(&huge),
            Err(CtrlError::InvalidDuration { .. })
        ));
        assert_eq!(
            parse_duration(&format!("{}m", u64::MAX / 60)).unwrap(),
            Duration::from_secs(u64::MAX / 60 * 60)
        );
    }

    #[test]
    fn test_parse_address() {
        assert_eq!("0x1C".parse::<Address>().unwrap(), Address(0x1C));
        assert_eq!("0XFF".parse::<Address>().unwrap(), Address(255));
        assert_eq!("48".parse::<Address>().unwrap(), Address(48));
        assert!("0xZZ".parse::<Address>().is_err());
        assert!("".parse::<Address>().is_err());
        assert_eq!(Address(0x5A1C24).to_string(), "0x5A1C24");
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert!(!config.speed.is_configured());
        assert_eq!(config.speed.bounds().unwrap(), SpeedBounds { min: 0, max: 10 });
    }

    #[test]
    fn test_validation_errors() {
        let mut config = Config::default();
        config.decrease_key = "PageUp".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.speed.pointer_width = 2;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.speed.min = 11;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.increase_key = "hyper".to_string();
        assert!(matches!(
            config.validate(),
            Err(CtrlError::InvalidKey { .. })
        ));
    }
}
