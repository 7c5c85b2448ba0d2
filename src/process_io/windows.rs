//! Win32 side of [`super::SystemProcessIo`].
//!
//! Handles are passed around as `usize` so the owning types stay `Send`.

use std::mem;
use std::ptr;

use winapi::ctypes::c_void;
use winapi::shared::minwindef::{BOOL, DWORD, FALSE, HMODULE, LPARAM, TRUE, WPARAM};
use winapi::shared::windef::HWND;
use winapi::um::errhandlingapi::GetLastError;
use winapi::um::handleapi::CloseHandle;
use winapi::um::memoryapi::ReadProcessMemory;
use winapi::um::minwinbase::STILL_ACTIVE;
use winapi::um::processthreadsapi::{GetExitCodeProcess, OpenProcess};
use winapi::um::psapi::{EnumProcessModulesEx, LIST_MODULES_ALL};
use winapi::um::winnt::{HANDLE, PROCESS_QUERY_INFORMATION, PROCESS_VM_READ};
use winapi::um::winuser::{
    EnumWindows, GetClassNameW, GetWindowTextW, GetWindowThreadProcessId, IsWindow,
    IsWindowVisible, MapVirtualKeyW, PostMessageW, MAPVK_VK_TO_VSC, WM_KEYDOWN, WM_KEYUP,
};

use super::TargetProcess;
use crate::config::SpeedLocation;
use crate::keys::Key;

pub(super) struct WindowInfo {
    pub hwnd: usize,
    pub pid: u32,
    pub title: String,
    pub class: String,
}

impl WindowInfo {
    fn matches(&self, title: &str, class: Option<&str>) -> bool {
        let title_ok = title.is_empty() || self.title.to_lowercase().contains(title);
        let class_ok = class.map_or(true, |class| self.class.eq_ignore_ascii_case(class));
        title_ok && class_ok
    }
}

/// Closes the wrapped process handle on drop.
struct ProcessHandle(HANDLE);

impl ProcessHandle {
    fn open(pid: u32, access: DWORD) -> Result<Self, String> {
        let handle = unsafe { OpenProcess(access, FALSE, pid) };
        if handle.is_null() {
            return Err(format!("OpenProcess({}) failed: error {}", pid, last_error()));
        }
        Ok(Self(handle))
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        unsafe {
            CloseHandle(self.0);
        }
    }
}

fn last_error() -> DWORD {
    unsafe { GetLastError() }
}

unsafe extern "system" fn collect_window(hwnd: HWND, lparam: LPARAM) -> BOOL {
    let windows = &mut *(lparam as *mut Vec<usize>);
    windows.push(hwnd as usize);
    TRUE
}

fn wide_to_string(buf: &[u16], len: i32) -> String {
    let len = len.max(0) as usize;
    String::from_utf16_lossy(&buf[..len.min(buf.len())])
}

fn describe(raw: usize) -> Option<WindowInfo> {
    let hwnd = raw as HWND;
    unsafe {
        if IsWindowVisible(hwnd) == FALSE {
            return None;
        }
        let mut title = [0u16; 256];
        let title_len = GetWindowTextW(hwnd, title.as_mut_ptr(), title.len() as i32);
        let mut class = [0u16; 128];
        let class_len = GetClassNameW(hwnd, class.as_mut_ptr(), class.len() as i32);
        let mut pid: DWORD = 0;
        GetWindowThreadProcessId(hwnd, &mut pid);
        if pid == 0 {
            return None;
        }
        Some(WindowInfo {
            hwnd: raw,
            pid,
            title: wide_to_string(&title, title_len),
            class: wide_to_string(&class, class_len),
        })
    }
}

/// Visible top-level windows, in Z order.
fn top_level_windows() -> Vec<WindowInfo> {
    let mut raw: Vec<usize> = Vec::new();
    unsafe {
        EnumWindows(Some(collect_window), &mut raw as *mut Vec<usize> as LPARAM);
    }
    raw.into_iter().filter_map(describe).collect()
}

/// First visible window matching the title pattern (lowercase) and class.
pub(super) fn find_window(title: &str, class: Option<&str>) -> Option<WindowInfo> {
    top_level_windows()
        .into_iter()
        .find(|window| !window.title.is_empty() && window.matches(title, class))
}

/// Window of `pid`, preferring one that matches the target signature.
pub(super) fn window_for_pid(pid: u32, title: &str, class: Option<&str>) -> Option<usize> {
    let owned: Vec<WindowInfo> = top_level_windows()
        .into_iter()
        .filter(|window| window.pid == pid)
        .collect();
    owned
        .iter()
        .find(|window| window.matches(title, class))
        .or_else(|| owned.first())
        .map(|window| window.hwnd)
}

/// Revalidate a target before talking to it.
pub(super) fn ensure_alive(target: &TargetProcess) -> Result<(), String> {
    let hwnd = target.window.0 as usize as HWND;
    if unsafe { IsWindow(hwnd) } == FALSE {
        return Err(format!("window {} no longer exists", target.window));
    }
    let process = ProcessHandle::open(target.pid, PROCESS_QUERY_INFORMATION)?;
    let mut code: DWORD = 0;
    if unsafe { GetExitCodeProcess(process.0, &mut code) } == FALSE {
        return Err(format!("GetExitCodeProcess failed: error {}", last_error()));
    }
    if code != STILL_ACTIVE {
        return Err(format!("process exited with code {}", code));
    }
    Ok(())
}

fn read_bytes(process: &ProcessHandle, address: u64, buf: &mut [u8]) -> Result<(), String> {
    let mut read: usize = 0;
    let ok = unsafe {
        ReadProcessMemory(
            process.0,
            address as usize as *const c_void,
            buf.as_mut_ptr() as *mut c_void,
            buf.len(),
            &mut read,
        )
    };
    if ok == FALSE || read != buf.len() {
        return Err(format!(
            "ReadProcessMemory at 0x{:X} failed: error {}",
            address,
            last_error()
        ));
    }
    Ok(())
}

fn read_pointer(process: &ProcessHandle, address: u64, width: u8) -> Result<u64, String> {
    if width == 8 {
        let mut buf = [0u8; 8];
        read_bytes(process, address, &mut buf)?;
        Ok(u64::from_le_bytes(buf))
    } else {
        let mut buf = [0u8; 4];
        read_bytes(process, address, &mut buf)?;
        Ok(u32::from_le_bytes(buf) as u64)
    }
}

fn main_module_base(process: &ProcessHandle) -> Result<u64, String> {
    let mut module: HMODULE = ptr::null_mut();
    let mut needed: DWORD = 0;
    let ok = unsafe {
        EnumProcessModulesEx(
            process.0,
            &mut module,
            mem::size_of::<HMODULE>() as DWORD,
            &mut needed,
            LIST_MODULES_ALL,
        )
    };
    if ok == FALSE || module.is_null() {
        return Err(format!("EnumProcessModulesEx failed: error {}", last_error()));
    }
    Ok(module as usize as u64)
}

/// Follow the pointer chain and read the `i32` at its end.
pub(super) fn read_speed_value(pid: u32, location: &SpeedLocation) -> Result<i32, String> {
    let process = ProcessHandle::open(pid, PROCESS_QUERY_INFORMATION | PROCESS_VM_READ)?;
    let mut address = main_module_base(&process)?.wrapping_add(location.module_offset.0);
    for offset in &location.offsets {
        let pointer = read_pointer(&process, address, location.pointer_width)?;
        if pointer == 0 {
            return Err(format!("null pointer at 0x{:X}", address));
        }
        address = pointer.wrapping_add(offset.0);
    }
    let mut buf = [0u8; 4];
    read_bytes(&process, address, &mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

/// Post one press and release of `key` to the window.
pub(super) fn post_key_press(hwnd: u64, key: Key) -> Result<(), String> {
    let hwnd = hwnd as usize as HWND;
    let vk = key.virtual_key_code() as u32;
    let scan = unsafe { MapVirtualKeyW(vk, MAPVK_VK_TO_VSC) };
    let mut down: u32 = 1 | (scan << 16);
    if key.is_extended() {
        down |= 1 << 24;
    }
    let up = down | (1 << 30) | (1 << 31);

    unsafe {
        if PostMessageW(hwnd, WM_KEYDOWN, vk as WPARAM, down as LPARAM) == FALSE {
            return Err(format!("PostMessageW(WM_KEYDOWN) failed: error {}", last_error()));
        }
        if PostMessageW(hwnd, WM_KEYUP, vk as WPARAM, up as LPARAM) == FALSE {
            return Err(format!("PostMessageW(WM_KEYUP) failed: error {}", last_error()));
        }
    }
    Ok(())
}
