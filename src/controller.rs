//! Automation session against one target process.
//!
//! An [`AutomationController`] owns one session: it attaches to the target on
//! [`start`](AutomationController::start), keeps a background task sampling
//! the speed until [`stop`](AutomationController::stop) or until the target
//! disappears, and serves speed commands from any thread in between.
//!
//! All [`ProcessIo`] calls of a session pass through a single mutex (the I/O
//! gate), so the background task and command threads never talk to the target
//! at the same time. Session state lives behind a second mutex that is only
//! held for short updates. Lock order is always gate, then session.

use std::fmt;
use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::conf_store::PidStore;
use crate::config::Config;
use crate::error::{CtrlError, Result};
use crate::process_io::{ProcessIo, TargetProcess, WindowHandle};
use crate::speed::{Direction, SpeedBounds, SpeedValue};

/// Adjusts that leave the speed unchanged before a goal is abandoned.
const MAX_STALLED_ADJUSTS: u32 = 5;

/// Lifecycle of a session. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Running,
    StopRequested,
    Stopped,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            RunState::Idle => "idle",
            RunState::Running => "running",
            RunState::StopRequested => "stop requested",
            RunState::Stopped => "stopped",
        };
        f.write_str(text)
    }
}

/// Timing knobs of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerOptions {
    /// Period of the background speed sampling.
    pub poll_interval: Duration,
    /// Minimum spacing between two adjust actions.
    pub adjust_interval: Duration,
    /// Pause between an adjust and the read that confirms it.
    pub settle_delay: Duration,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(250),
            adjust_interval: Duration::from_millis(120),
            settle_delay: Duration::from_millis(40),
        }
    }
}

impl From<&Config> for ControllerOptions {
    fn from(config: &Config) -> Self {
        Self {
            poll_interval: config.poll_interval,
            adjust_interval: config.adjust_interval,
            settle_delay: config.settle_delay,
        }
    }
}

/// Point-in-time view of a session for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub pid: u32,
    pub run_state: RunState,
    pub window: Option<WindowHandle>,
    pub speed: Option<i32>,
    pub bounds: Option<SpeedBounds>,
    pub goal: Option<i32>,
    pub last_error: Option<String>,
}

#[derive(Debug)]
struct Session {
    target: Option<TargetProcess>,
    current_speed: Option<SpeedValue>,
    run_state: RunState,
    goal: Option<i32>,
    stalled_adjusts: u32,
    last_error: Option<String>,
}

#[derive(Debug, Default)]
struct IoGate {
    last_adjust: Option<Instant>,
}

struct Shared {
    pid: u32,
    io: Arc<dyn ProcessIo>,
    options: ControllerOptions,
    gate: Mutex<IoGate>,
    session: Mutex<Session>,
    cancel: CancellationToken,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    fn running_target(&self) -> Result<TargetProcess> {
        let session = lock(&self.session);
        match (session.run_state, session.target) {
            (RunState::Running, Some(target)) => Ok(target),
            (state, _) => Err(CtrlError::NotRunning { state }),
        }
    }

    fn record_speed(&self, speed: SpeedValue) {
        lock(&self.session).current_speed = Some(speed);
    }

    /// Stop the session after a failed call and build the error for the caller.
    fn lose_target(&self, target: &TargetProcess, err: CtrlError) -> CtrlError {
        let reason = err.to_string();
        {
            let mut session = lock(&self.session);
            session.run_state = RunState::Stopped;
            session.goal = None;
            session.last_error = Some(reason.clone());
        }
        self.cancel.cancel();
        warn!(pid = target.pid, %reason, "target lost, session stopped");
        CtrlError::target_lost(target.pid, reason)
    }

    /// Send one adjust and read back the result. Waits for the rate limit.
    fn step(
        &self,
        gate: &mut IoGate,
        target: &TargetProcess,
        direction: Direction,
    ) -> Result<SpeedValue> {
        if let Some(last) = gate.last_adjust {
            let elapsed = last.elapsed();
            if elapsed < self.options.adjust_interval {
                thread::sleep(self.options.adjust_interval - elapsed);
            }
        }
        self.io.send_adjust(target, direction)?;
        gate.last_adjust = Some(Instant::now());
        if !self.options.settle_delay.is_zero() {
            thread::sleep(self.options.settle_delay);
        }
        self.io.read_speed(target)
    }

    fn adjust_slot_open(&self, gate: &IoGate) -> bool {
        gate.last_adjust
            .map_or(true, |last| last.elapsed() >= self.options.adjust_interval)
    }

    /// One iteration of the background task.
    fn maintain(&self) -> ControlFlow<()> {
        let mut gate = lock(&self.gate);
        if self.cancel.is_cancelled() {
            return ControlFlow::Break(());
        }
        let Ok(target) = self.running_target() else {
            return ControlFlow::Break(());
        };

        let speed = match self.io.read_speed(&target) {
            Ok(speed) => speed,
            Err(err) => {
                self.lose_target(&target, err);
                return ControlFlow::Break(());
            }
        };
        self.record_speed(speed);

        let goal = lock(&self.session).goal;
        let Some(goal) = goal else {
            return ControlFlow::Continue(());
        };
        let Some(direction) = speed.direction_to(goal) else {
            self.finish_goal(goal, "goal reached");
            return ControlFlow::Continue(());
        };
        if !self.adjust_slot_open(&gate) {
            return ControlFlow::Continue(());
        }

        match self.step(&mut gate, &target, direction) {
            Ok(after) => {
                self.record_speed(after);
                debug!(pid = target.pid, from = speed.value(), to = after.value(), goal, "stepped toward goal");
                if after.value() == goal {
                    self.finish_goal(goal, "goal reached");
                } else if after.value() == speed.value() {
                    let stalled = {
                        let mut session = lock(&self.session);
                        session.stalled_adjusts += 1;
                        session.stalled_adjusts
                    };
                    if stalled >= MAX_STALLED_ADJUSTS {
                        self.finish_goal(goal, "target stopped reacting, goal dropped");
                    }
                } else {
                    lock(&self.session).stalled_adjusts = 0;
                }
                ControlFlow::Continue(())
            }
            Err(err) => {
                self.lose_target(&target, err);
                ControlFlow::Break(())
            }
        }
    }

    fn finish_goal(&self, goal: i32, message: &str) {
        let mut session = lock(&self.session);
        if session.goal == Some(goal) {
            session.goal = None;
            session.stalled_adjusts = 0;
            info!(pid = self.pid, goal, "{}", message);
        }
    }

    fn mark_stopped(&self) {
        let mut session = lock(&self.session);
        if session.run_state != RunState::Stopped {
            session.run_state = RunState::Stopped;
            debug!(pid = self.pid, "session stopped");
        }
    }
}

async fn run_session(shared: Arc<Shared>) {
    let mut ticker = tokio::time::interval(shared.options.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick fires immediately; start() has just read the speed.
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;
            _ = shared.cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let worker = Arc::clone(&shared);
        match tokio::task::spawn_blocking(move || worker.maintain()).await {
            Ok(ControlFlow::Continue(())) => {}
            Ok(ControlFlow::Break(())) => break,
            Err(err) => {
                error!(pid = shared.pid, error = %err, "session maintenance task failed");
                lock(&shared.session).last_error = Some(format!("maintenance task failed: {}", err));
                break;
            }
        }
    }

    // A command may still be talking to the target; stay StopRequested
    // until it releases the gate.
    let worker = Arc::clone(&shared);
    let finished = tokio::task::spawn_blocking(move || {
        let _gate = lock(&worker.gate);
        worker.mark_stopped();
    })
    .await;
    if finished.is_err() {
        shared.mark_stopped();
    }
    debug!(pid = shared.pid, "session loop exited");
}

/// Resolve the PID of a running target through discovery only.
pub fn discover_pid(io: &dyn ProcessIo) -> Result<u32> {
    io.find_target_pid()
        .ok_or_else(|| CtrlError::not_found("no window or process matches the target signature"))
}

/// Owns one automation session.
///
/// ```no_run
/// use std::sync::Arc;
/// use auto_dance_ctrl::{AutomationController, Config, ConfFile, ControllerOptions, SystemProcessIo};
///
/// # async fn demo() -> auto_dance_ctrl::Result<()> {
/// let config = Config::default();
/// let io = Arc::new(SystemProcessIo::new(&config)?);
/// let store = Arc::new(ConfFile::open("app.conf")?);
/// let controller = AutomationController::new(io, store, None, ControllerOptions::from(&config))?;
///
/// controller.start()?;
/// let speed = controller.increase_speed()?;
/// println!("speed is now {}", speed);
/// controller.stop();
/// # Ok(())
/// # }
/// ```
pub struct AutomationController {
    shared: Arc<Shared>,
    store: Arc<dyn PidStore>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl AutomationController {
    /// Bind a new session to a PID.
    ///
    /// The PID is `pid_override` when given, else the stored PID, else the
    /// first target found by discovery.
    pub fn new(
        io: Arc<dyn ProcessIo>,
        store: Arc<dyn PidStore>,
        pid_override: Option<u32>,
        options: ControllerOptions,
    ) -> Result<Self> {
        let pid = match pid_override {
            Some(0) => return Err(CtrlError::invalid_pid("0", "pid must be positive")),
            Some(pid) => pid,
            None => match store.load_pid()? {
                Some(pid) => pid,
                None => discover_pid(io.as_ref())?,
            },
        };
        debug!(pid, "controller created");

        Ok(Self {
            shared: Arc::new(Shared {
                pid,
                io,
                options,
                gate: Mutex::new(IoGate::default()),
                session: Mutex::new(Session {
                    target: None,
                    current_speed: None,
                    run_state: RunState::Idle,
                    goal: None,
                    stalled_adjusts: 0,
                    last_error: None,
                }),
                cancel: CancellationToken::new(),
            }),
            store,
            worker: Mutex::new(None),
        })
    }

    pub fn pid(&self) -> u32 {
        self.shared.pid
    }

    pub fn run_state(&self) -> RunState {
        lock(&self.shared.session).run_state
    }

    /// Last known speed; may lag behind the target.
    pub fn current_speed(&self) -> Option<SpeedValue> {
        lock(&self.shared.session).current_speed
    }

    pub fn goal(&self) -> Option<i32> {
        lock(&self.shared.session).goal
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let session = lock(&self.shared.session);
        SessionSnapshot {
            pid: self.shared.pid,
            run_state: session.run_state,
            window: session.target.map(|target| target.window),
            speed: session.current_speed.map(|speed| speed.value()),
            bounds: session.current_speed.map(|speed| speed.bounds()),
            goal: session.goal,
            last_error: session.last_error.clone(),
        }
    }

    /// Attach to the target and spawn the background task.
    ///
    /// Must be called from within a Tokio runtime. On failure the session
    /// stays idle and `start` may be retried.
    pub fn start(&self) -> Result<()> {
        let runtime = Handle::try_current().map_err(|e| CtrlError::runtime(e.to_string()))?;
        let pid = self.shared.pid;

        let _gate = lock(&self.shared.gate);
        let known_target = {
            let session = lock(&self.shared.session);
            match session.run_state {
                RunState::Idle => session.target,
                RunState::Running => return Err(CtrlError::AlreadyRunning { pid }),
                state => return Err(CtrlError::NotRunning { state }),
            }
        };

        let target = match known_target {
            Some(target) => target,
            None => self
                .shared
                .io
                .resolve_target(pid)
                .map_err(|e| CtrlError::attach(pid, e.to_string()))?,
        };
        let speed = self
            .shared
            .io
            .read_speed(&target)
            .map_err(|e| CtrlError::attach(pid, e.to_string()))?;

        {
            let mut session = lock(&self.shared.session);
            if session.run_state != RunState::Idle {
                debug!(pid, state = %session.run_state, "stopped while attaching");
                return Err(CtrlError::NotRunning {
                    state: session.run_state,
                });
            }
            session.target = Some(target);
            session.current_speed = Some(speed);
            session.last_error = None;
            session.run_state = RunState::Running;
        }

        if let Err(err) = self.store.save_pid(pid) {
            warn!(pid, error = %err, "could not persist pid");
        }

        let handle = runtime.spawn(run_session(Arc::clone(&self.shared)));
        *lock(&self.worker) = Some(handle);
        info!(pid, window = %target.window, speed = speed.value(), "session started");
        Ok(())
    }

    /// Ask the session to stop. Safe to call repeatedly and from any thread.
    ///
    /// Returns without waiting for the background task. When no target call
    /// is in flight the session is `Stopped` on return; otherwise it reads
    /// `StopRequested` until that call completes.
    pub fn stop(&self) {
        {
            let mut session = lock(&self.shared.session);
            if session.run_state == RunState::Stopped {
                return;
            }
            session.run_state = RunState::StopRequested;
            session.goal = None;
        }
        self.shared.cancel.cancel();

        let idle = self.shared.gate.try_lock().is_ok();
        let has_worker = lock(&self.worker).is_some();
        if idle || !has_worker {
            self.shared.mark_stopped();
        }
        info!(pid = self.shared.pid, "stop requested");
    }

    /// Wait until the background task has exited.
    pub async fn join(&self) {
        let handle = lock(&self.worker).take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                error!(pid = self.shared.pid, error = %err, "session task ended abnormally");
            }
        }
        if self.shared.cancel.is_cancelled() {
            self.shared.mark_stopped();
        }
    }

    /// Read the speed once.
    pub fn measure_speed(&self) -> Result<SpeedValue> {
        let _gate = lock(&self.shared.gate);
        let target = self.shared.running_target()?;
        match self.shared.io.read_speed(&target) {
            Ok(speed) => {
                self.shared.record_speed(speed);
                debug!(pid = target.pid, speed = speed.value(), "measured speed");
                Ok(speed)
            }
            Err(err) => Err(self.shared.lose_target(&target, err)),
        }
    }

    pub fn increase_speed(&self) -> Result<SpeedValue> {
        self.adjust(Direction::Up)
    }

    pub fn decrease_speed(&self) -> Result<SpeedValue> {
        self.adjust(Direction::Down)
    }

    /// Send one adjust and return what the target reports afterwards.
    /// The value is not clamped here; the target owns its bounds.
    pub fn adjust(&self, direction: Direction) -> Result<SpeedValue> {
        let mut gate = lock(&self.shared.gate);
        let target = self.shared.running_target()?;
        match self.shared.step(&mut gate, &target, direction) {
            Ok(speed) => {
                self.shared.record_speed(speed);
                info!(pid = target.pid, %direction, speed = speed.value(), "adjusted speed");
                Ok(speed)
            }
            Err(err) => Err(self.shared.lose_target(&target, err)),
        }
    }

    /// Let the background task step the speed toward `goal`, one adjust per
    /// tick.
    pub fn seek_speed(&self, goal: i32) -> Result<()> {
        let mut session = lock(&self.shared.session);
        if session.run_state != RunState::Running {
            return Err(CtrlError::NotRunning {
                state: session.run_state,
            });
        }
        if let Some(speed) = session.current_speed {
            speed.bounds().check(goal)?;
        }
        session.goal = Some(goal);
        session.stalled_adjusts = 0;
        info!(pid = self.shared.pid, goal, "seeking speed");
        Ok(())
    }

    pub fn clear_goal(&self) {
        let mut session = lock(&self.shared.session);
        if session.goal.take().is_some() {
            session.stalled_adjusts = 0;
            debug!(pid = self.shared.pid, "goal cleared");
        }
    }
}

impl Drop for AutomationController {
    fn drop(&mut self) {
        self.shared.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conf_store::MemoryPidStore;
    use crate::process_io::mock::MockProcessIo;

    fn fast() -> ControllerOptions {
        ControllerOptions {
            poll_interval: Duration::from_millis(10),
            adjust_interval: Duration::ZERO,
            settle_delay: Duration::ZERO,
        }
    }

    fn mock(speed: i32) -> Arc<MockProcessIo> {
        Arc::new(MockProcessIo::new(1234, speed, SpeedBounds::new(0, 10).unwrap()))
    }

    #[test]
    fn test_pid_resolution_order() {
        let io = mock(5);
        let store = Arc::new(MemoryPidStore::with_raw("77"));

        let controller =
            AutomationController::new(io.clone(), store.clone(), Some(1234), fast()).unwrap();
        assert_eq!(controller.pid(), 1234);

        let controller =
            AutomationController::new(io.clone(), store, None, fast()).unwrap();
        assert_eq!(controller.pid(), 77);

        let controller =
            AutomationController::new(io, Arc::new(MemoryPidStore::new()), None, fast()).unwrap();
        assert_eq!(controller.pid(), 1234);
    }

    #[test]
    fn test_no_pid_anywhere_is_not_found() {
        let io = mock(5);
        io.kill();
        let result = AutomationController::new(io, Arc::new(MemoryPidStore::new()), None, fast());
        assert!(matches!(result, Err(CtrlError::NotFound(_))));
    }

    #[test]
    fn test_start_without_runtime_fails() {
        let controller =
            AutomationController::new(mock(5), Arc::new(MemoryPidStore::new()), Some(1234), fast())
                .unwrap();
        assert!(matches!(controller.start(), Err(CtrlError::Runtime(_))));
        assert_eq!(controller.run_state(), RunState::Idle);
    }

    #[test]
    fn test_commands_before_start() {
        let controller =
            AutomationController::new(mock(5), Arc::new(MemoryPidStore::new()), Some(1234), fast())
                .unwrap();
        assert!(matches!(
            controller.measure_speed(),
            Err(CtrlError::NotRunning {
                state: RunState::Idle
            })
        ));
        assert!(controller.seek_speed(3).is_err());
    }

    #[test]
    fn test_stop_idle_session() {
        let controller =
            AutomationController::new(mock(5), Arc::new(MemoryPidStore::new()), Some(1234), fast())
                .unwrap();
        controller.stop();
        assert_eq!(controller.run_state(), RunState::Stopped);
        controller.stop();
        assert_eq!(controller.run_state(), RunState::Stopped);
    }

    #[tokio::test]
    async fn test_goal_seeking() {
        let io = mock(2);
        let controller =
            AutomationController::new(io.clone(), Arc::new(MemoryPidStore::new()), Some(1234), fast())
                .unwrap();
        controller.start().unwrap();
        assert!(matches!(
            controller.seek_speed(11),
            Err(CtrlError::SpeedOutOfRange { .. })
        ));
        controller.seek_speed(5).unwrap();

        for _ in 0..200 {
            if controller.goal().is_none() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(controller.goal(), None);
        assert_eq!(io.speed(), 5);
        assert_eq!(io.adjusts(), 3);

        controller.stop();
        controller.join().await;
        assert_eq!(controller.run_state(), RunState::Stopped);
    }
}
