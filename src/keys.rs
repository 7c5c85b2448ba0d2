//! Key names used for adjust actions and global hotkeys.
//!
//! Keys are written the same way everywhere in the settings file: lower or
//! upper case names such as `"pageup"`, `"f5"`, `"a"` or `"numpadadd"`.

use std::fmt;
use std::str::FromStr;

use crate::error::{CtrlError, Result};

/// A single non-modifier key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Letter(char),
    Digit(u8),
    Function(u8),
    Space,
    Enter,
    Tab,
    Escape,
    Backspace,
    Delete,
    Insert,
    Home,
    End,
    PageUp,
    PageDown,
    Up,
    Down,
    Left,
    Right,
    NumpadAdd,
    NumpadSubtract,
}

impl Key {
    /// Windows virtual-key code for this key.
    pub fn virtual_key_code(&self) -> u16 {
        match *self {
            Key::Letter(c) => c.to_ascii_uppercase() as u16,
            Key::Digit(d) => 0x30 + d as u16,
            Key::Function(n) => 0x70 + (n as u16 - 1),
            Key::Space => 0x20,
            Key::Enter => 0x0D,
            Key::Tab => 0x09,
            Key::Escape => 0x1B,
            Key::Backspace => 0x08,
            Key::Delete => 0x2E,
            Key::Insert => 0x2D,
            Key::Home => 0x24,
            Key::End => 0x23,
            Key::PageUp => 0x21,
            Key::PageDown => 0x22,
            Key::Left => 0x25,
            Key::Up => 0x26,
            Key::Right => 0x27,
            Key::Down => 0x28,
            Key::NumpadAdd => 0x6B,
            Key::NumpadSubtract => 0x6D,
        }
    }

    /// Navigation keys live on the extended part of the keyboard and need
    /// bit 24 set in keyboard message parameters.
    pub fn is_extended(&self) -> bool {
        matches!(
            self,
            Key::Delete
                | Key::Insert
                | Key::Home
                | Key::End
                | Key::PageUp
                | Key::PageDown
                | Key::Up
                | Key::Down
                | Key::Left
                | Key::Right
        )
    }
}

impl FromStr for Key {
    type Err = CtrlError;

    fn from_str(s: &str) -> Result<Self> {
        parse_key(s)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Letter(c) => write!(f, "{}", c),
            Key::Digit(d) => write!(f, "{}", d),
            Key::Function(n) => write!(f, "f{}", n),
            other => write!(f, "{}", format!("{:?}", other).to_lowercase()),
        }
    }
}

/// Parse a key name into a [`Key`].
pub fn parse_key(name: &str) -> Result<Key> {
    let lowered = name.trim().to_lowercase();
    if lowered.is_empty() {
        return Err(CtrlError::invalid_key(name, "empty key name"));
    }

    let mut chars = lowered.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        if c.is_ascii_lowercase() {
            return Ok(Key::Letter(c));
        }
        if let Some(d) = c.to_digit(10) {
            return Ok(Key::Digit(d as u8));
        }
    }

    if let Some(n) = lowered.strip_prefix('f').and_then(|n| n.parse::<u8>().ok()) {
        if (1..=12).contains(&n) {
            return Ok(Key::Function(n));
        }
        return Err(CtrlError::invalid_key(name, "function keys go from f1 to f12"));
    }

    let key = match lowered.as_str() {
        "space" => Key::Space,
        "enter" | "return" => Key::Enter,
        "tab" => Key::Tab,
        "escape" | "esc" => Key::Escape,
        "backspace" => Key::Backspace,
        "delete" | "del" => Key::Delete,
        "insert" | "ins" => Key::Insert,
        "home" => Key::Home,
        "end" => Key::End,
        "pageup" | "pgup" => Key::PageUp,
        "pagedown" | "pgdn" => Key::PageDown,
        "up" | "arrowup" => Key::Up,
        "down" | "arrowdown" => Key::Down,
        "left" | "arrowleft" => Key::Left,
        "right" | "arrowright" => Key::Right,
        "numpadadd" | "add" => Key::NumpadAdd,
        "numpadsubtract" | "subtract" => Key::NumpadSubtract,
        _ => return Err(CtrlError::invalid_key(name, "unknown key name")),
    };
    Ok(key)
}
