//! In-memory target for tests and dry runs.
//!
//! `MockProcessIo` behaves like one live target process: reads return the
//! current speed, each adjust moves it one step and clamps at the bounds.
//! It can be killed, slowed down, and it records whether two calls ever
//! overlapped.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use super::{ProcessIo, TargetProcess, WindowHandle};
use crate::error::{CtrlError, Result};
use crate::speed::{Direction, SpeedBounds, SpeedValue};

#[derive(Debug)]
struct MockTarget {
    pid: u32,
    speed: i32,
    bounds: SpeedBounds,
    alive: bool,
}

#[derive(Debug)]
pub struct MockProcessIo {
    target: Mutex<MockTarget>,
    latency: Duration,
    reads: AtomicUsize,
    adjusts: AtomicUsize,
    in_flight: AtomicUsize,
    overlaps: AtomicUsize,
}

impl MockProcessIo {
    /// A live target with the given pid, starting speed and bounds.
    pub fn new(pid: u32, speed: i32, bounds: SpeedBounds) -> Self {
        Self {
            target: Mutex::new(MockTarget {
                pid,
                speed,
                bounds,
                alive: true,
            }),
            latency: Duration::ZERO,
            reads: AtomicUsize::new(0),
            adjusts: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            overlaps: AtomicUsize::new(0),
        }
    }

    /// Every call sleeps this long before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Simulate the target process exiting.
    pub fn kill(&self) {
        self.state().alive = false;
    }

    pub fn set_speed(&self, speed: i32) {
        self.state().speed = speed;
    }

    pub fn speed(&self) -> i32 {
        self.state().speed
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn adjusts(&self) -> usize {
        self.adjusts.load(Ordering::SeqCst)
    }

    /// Number of calls that started while another call was still running.
    pub fn overlaps(&self) -> usize {
        self.overlaps.load(Ordering::SeqCst)
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockTarget> {
        self.target
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn enter(&self) -> CallGuard<'_> {
        if self.in_flight.fetch_add(1, Ordering::SeqCst) > 0 {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        if !self.latency.is_zero() {
            thread::sleep(self.latency);
        }
        CallGuard { io: self }
    }

    fn live_target(&self, target: &TargetProcess) -> Result<std::sync::MutexGuard<'_, MockTarget>> {
        let state = self.state();
        if state.pid != target.pid {
            return Err(CtrlError::io(target.pid, "unknown target"));
        }
        if !state.alive {
            return Err(CtrlError::io(target.pid, "process exited"));
        }
        Ok(state)
    }
}

struct CallGuard<'a> {
    io: &'a MockProcessIo,
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        self.io.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ProcessIo for MockProcessIo {
    fn find_target_pid(&self) -> Option<u32> {
        let state = self.state();
        state.alive.then_some(state.pid)
    }

    fn resolve_target(&self, pid: u32) -> Result<TargetProcess> {
        let _call = self.enter();
        let state = self.state();
        if state.pid != pid || !state.alive {
            return Err(CtrlError::not_found(format!("no running process with pid {}", pid)));
        }
        Ok(TargetProcess {
            pid,
            window: WindowHandle(u64::from(pid) << 4),
        })
    }

    fn read_speed(&self, target: &TargetProcess) -> Result<SpeedValue> {
        let _call = self.enter();
        self.reads.fetch_add(1, Ordering::SeqCst);
        let state = self.live_target(target)?;
        SpeedValue::new(state.speed, state.bounds)
            .map_err(|e| CtrlError::io(target.pid, e.to_string()))
    }

    fn send_adjust(&self, target: &TargetProcess, direction: Direction) -> Result<()> {
        let _call = self.enter();
        self.adjusts.fetch_add(1, Ordering::SeqCst);
        let mut state = self.live_target(target)?;
        let next = match direction {
            Direction::Up => state.speed + 1,
            Direction::Down => state.speed - 1,
        };
        state.speed = next.clamp(state.bounds.min, state.bounds.max);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds() -> SpeedBounds {
        SpeedBounds::new(0, 10).unwrap()
    }

    #[test]
    fn test_resolve_then_read() {
        let io = MockProcessIo::new(1234, 5, bounds());
        let target = io.resolve_target(1234).unwrap();
        let speed = io.read_speed(&target).unwrap();
        assert_eq!(speed.value(), 5);
        assert!(speed.bounds().contains(speed.value()));
        assert!(io.resolve_target(99).is_err());
    }

    #[test]
    fn test_adjust_clamps_at_bounds() {
        let io = MockProcessIo::new(1, 10, bounds());
        let target = io.resolve_target(1).unwrap();
        io.send_adjust(&target, Direction::Up).unwrap();
        assert_eq!(io.speed(), 10);
        io.send_adjust(&target, Direction::Down).unwrap();
        assert_eq!(io.speed(), 9);
        assert_eq!(io.adjusts(), 2);
    }

    #[test]
    fn test_killed_target_fails() {
        let io = MockProcessIo::new(1, 3, bounds());
        let target = io.resolve_target(1).unwrap();
        io.kill();
        assert!(matches!(io.read_speed(&target), Err(CtrlError::Io { .. })));
        assert!(io.send_adjust(&target, Direction::Up).is_err());
        assert_eq!(io.find_target_pid(), None);
    }
}
