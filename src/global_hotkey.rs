//! System-wide hotkeys for the interactive runner.
//!
//! The target usually runs fullscreen and owns the keyboard focus, so the
//! runner also listens for global hotkeys and turns them into
//! [`HotkeyAction`]s on a channel.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Result;
use global_hotkey::hotkey::{Code, HotKey, Modifiers};
use global_hotkey::{GlobalHotKeyEvent, GlobalHotKeyManager, HotKeyState};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::config::HotkeyBindings;
use crate::error::CtrlError;
use crate::keys::{parse_key, Key};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HotkeyAction {
    Increase,
    Decrease,
    Measure,
    Stop,
}

pub struct HotkeyManager {
    manager: GlobalHotKeyManager,
    actions: HashMap<u32, HotkeyAction>,
}

impl HotkeyManager {
    pub fn new() -> Result<Self> {
        let manager = GlobalHotKeyManager::new()
            .map_err(|e| CtrlError::hotkey(format!("failed to create hotkey manager: {}", e)))?;

        Ok(Self {
            manager,
            actions: HashMap::new(),
        })
    }

    pub fn register(&mut self, action: HotkeyAction, hotkey_str: &str) -> Result<()> {
        let hotkey = parse_hotkey(hotkey_str)?;
        let id = hotkey.id();

        self.manager.register(hotkey).map_err(|e| {
            CtrlError::hotkey(format!("failed to register hotkey '{}': {}", hotkey_str, e))
        })?;
        self.actions.insert(id, action);

        info!(hotkey = hotkey_str, ?action, "registered global hotkey");
        Ok(())
    }

    /// Register every binding that is set.
    pub fn register_bindings(&mut self, bindings: &HotkeyBindings) -> Result<()> {
        let wanted = [
            (HotkeyAction::Increase, &bindings.increase),
            (HotkeyAction::Decrease, &bindings.decrease),
            (HotkeyAction::Measure, &bindings.measure),
            (HotkeyAction::Stop, &bindings.stop),
        ];
        for (action, binding) in wanted {
            if let Some(hotkey) = binding.as_deref().filter(|h| !h.trim().is_empty()) {
                self.register(action, hotkey)?;
            }
        }
        Ok(())
    }

    /// Forward presses of registered hotkeys to `sender` until the receiving
    /// side is dropped. The manager has to stay alive for the hotkeys to
    /// remain registered.
    pub fn start_listener(&self, sender: mpsc::UnboundedSender<HotkeyAction>) {
        let receiver = GlobalHotKeyEvent::receiver();
        let actions = self.actions.clone();

        tokio::task::spawn_blocking(move || {
            while !sender.is_closed() {
                if let Ok(event) = receiver.try_recv() {
                    if event.state == HotKeyState::Pressed {
                        if let Some(action) = actions.get(&event.id) {
                            debug!(?action, "hotkey pressed");
                            if sender.send(*action).is_err() {
                                break;
                            }
                        }
                    }
                }

                std::thread::sleep(Duration::from_millis(10));
            }
            debug!("hotkey listener stopped");
        });
    }
}

/// Parse `"ctrl+alt+pageup"` style strings.
pub fn parse_hotkey(hotkey_str: &str) -> Result<HotKey> {
    let binding = hotkey_str.to_lowercase();
    let parts: Vec<&str> = binding.split('+').map(|s| s.trim()).collect();

    let mut modifiers = Modifiers::empty();
    let mut key_code = None;

    for part in &parts {
        match *part {
            "ctrl" | "control" => modifiers |= Modifiers::CONTROL,
            "alt" => modifiers |= Modifiers::ALT,
            "shift" => modifiers |= Modifiers::SHIFT,
            "meta" | "cmd" | "super" => modifiers |= Modifiers::SUPER,
            key => {
                if key_code.is_some() {
                    return Err(CtrlError::invalid_key(hotkey_str, "more than one key in hotkey").into());
                }
                key_code = Some(hotkey_code(parse_key(key)?));
            }
        }
    }

    let code = key_code.ok_or_else(|| CtrlError::invalid_key(hotkey_str, "no key in hotkey"))?;

    Ok(HotKey::new(Some(modifiers), code))
}

const LETTERS: [Code; 26] = [
    Code::KeyA, Code::KeyB, Code::KeyC, Code::KeyD, Code::KeyE, Code::KeyF, Code::KeyG,
    Code::KeyH, Code::KeyI, Code::KeyJ, Code::KeyK, Code::KeyL, Code::KeyM, Code::KeyN,
    Code::KeyO, Code::KeyP, Code::KeyQ, Code::KeyR, Code::KeyS, Code::KeyT, Code::KeyU,
    Code::KeyV, Code::KeyW, Code::KeyX, Code::KeyY, Code::KeyZ,
];

const DIGITS: [Code; 10] = [
    Code::Digit0, Code::Digit1, Code::Digit2, Code::Digit3, Code::Digit4,
    Code::Digit5, Code::Digit6, Code::Digit7, Code::Digit8, Code::Digit9,
];

const FUNCTION_KEYS: [Code; 12] = [
    Code::F1, Code::F2, Code::F3, Code::F4, Code::F5, Code::F6,
    Code::F7, Code::F8, Code::F9, Code::F10, Code::F11, Code::F12,
];

fn hotkey_code(key: Key) -> Code {
    match key {
        Key::Letter(c) => LETTERS[(c as u8 - b'a') as usize],
        Key::Digit(d) => DIGITS[d as usize],
        Key::Function(n) => FUNCTION_KEYS[(n - 1) as usize],
        Key::Space => Code::Space,
        Key::Enter => Code::Enter,
        Key::Tab => Code::Tab,
        Key::Escape => Code::Escape,
        Key::Backspace => Code::Backspace,
        Key::Delete => Code::Delete,
        Key::Insert => Code::Insert,
        Key::Home => Code::Home,
        Key::End => Code::End,
        Key::PageUp => Code::PageUp,
        Key::PageDown => Code::PageDown,
        Key::Up => Code::ArrowUp,
        Key::Down => Code::ArrowDown,
        Key::Left => Code::ArrowLeft,
        Key::Right => Code::ArrowRight,
        Key::NumpadAdd => Code::NumpadAdd,
        Key::NumpadSubtract => Code::NumpadSubtract,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hotkey() {
        let hotkey = parse_hotkey("ctrl+alt+pageup").unwrap();
        assert_eq!(
            hotkey,
            HotKey::new(Some(Modifiers::CONTROL | Modifiers::ALT), Code::PageUp)
        );

        let hotkey = parse_hotkey("Shift + F5").unwrap();
        assert_eq!(hotkey, HotKey::new(Some(Modifiers::SHIFT), Code::F5));

        assert_eq!(
            parse_hotkey("ctrl+m").unwrap(),
            HotKey::new(Some(Modifiers::CONTROL), Code::KeyM)
        );
    }

    #[test]
    fn test_parse_hotkey_errors() {
        assert!(parse_hotkey("ctrl+alt").is_err());
        assert!(parse_hotkey("a+b").is_err());
        assert!(parse_hotkey("ctrl+bogus").is_err());
        assert!(parse_hotkey("").is_err());
    }
}
