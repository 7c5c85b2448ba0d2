//! Process enumeration and liveness checks.
//!
//! Window-level discovery is platform specific and lives in
//! [`crate::process_io`]; this module only knows about processes and works
//! everywhere `sysinfo` does.

use sysinfo::{Pid, ProcessesToUpdate, System};
use tracing::debug;

/// Finds processes by executable name and checks whether PIDs are alive.
///
/// # Example
///
/// ```
/// use auto_dance_ctrl::ProcessFinder;
///
/// let mut finder = ProcessFinder::new();
/// match finder.find_pid_by_name("Audition.exe") {
///     Some(pid) => println!("Found process with PID: {}", pid),
///     None => println!("Process not found"),
/// }
/// ```
pub struct ProcessFinder {
    system: System,
}

impl Clone for ProcessFinder {
    fn clone(&self) -> Self {
        Self {
            system: System::new(),
        }
    }
}

impl Default for ProcessFinder {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessFinder {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }

    /// PID of the first process whose name contains `process_name`,
    /// compared case-insensitively. Lowest PID wins so repeated calls agree.
    pub fn find_pid_by_name(&mut self, process_name: &str) -> Option<u32> {
        let wanted = process_name.trim().to_lowercase();
        if wanted.is_empty() {
            return None;
        }

        self.system.refresh_processes(ProcessesToUpdate::All, true);

        let found = self
            .system
            .processes()
            .iter()
            .filter(|(_, process)| {
                process
                    .name()
                    .to_string_lossy()
                    .to_lowercase()
                    .contains(&wanted)
            })
            .map(|(pid, _)| pid.as_u32())
            .min();
        debug!(process_name, ?found, "process name lookup");
        found
    }

    /// Whether `pid` refers to a running process right now.
    pub fn is_alive(&mut self, pid: u32) -> bool {
        let pid = Pid::from_u32(pid);
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        self.system.process(pid).is_some()
    }

    /// Executable name of `pid`, if it is running.
    pub fn process_name(&mut self, pid: u32) -> Option<String> {
        let pid = Pid::from_u32(pid);
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        self.system
            .process(pid)
            .map(|process| process.name().to_string_lossy().into_owned())
    }
}
