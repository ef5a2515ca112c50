//! Session execution state: the real-time / fixed-capture-rate state machine.
//!
//! ```text
//!            SetCaptureRate(n>0)               stepped command
//! RealTime ─────────────────────▶ Paused ─────────────────────▶ Executing
//!    ▲                             │  ▲                              │
//!    └──── SetCaptureRate(0) ──────┘  └── elapsed + dt·1.5 ≥ dur ────┘
//! ```
//!
//! The mode is derived from two fields: `capture_rate == 0` is real-time,
//! otherwise a non-zero `command_duration` means a stepped command is in
//! flight. The clock runs (time scale 1) in `RealTime` and `Executing` and is
//! frozen in `Paused`.

use std::net::TcpStream;

/// Completion guard factor applied to the next tick length
const COMPLETION_GUARD: f64 = 1.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    RealTime,
    Paused,
    Executing,
}

/// Mode change caused by a capture-rate command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: ExecutionMode,
    pub to: ExecutionMode,
    pub keyboard_enabled: bool,
}

/// Read-only view of the session for logging and tests
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionSnapshot {
    pub mode: ExecutionMode,
    pub capture_rate: u32,
    pub command_duration: f64,
    pub elapsed_execution: f64,
    pub keyboard_enabled: bool,
}

/// Result of advancing an in-flight stepped command by one tick
#[derive(Debug)]
pub enum StepProgress {
    /// No stepped command in flight
    Idle,
    /// Still running after this tick
    Running,
    /// This tick was the last one; the command is complete
    Completed(StepCompletion),
}

#[derive(Debug)]
pub struct StepCompletion {
    /// Connection to acknowledge, if the command came over the step port
    pub ack: Option<TcpStream>,
    /// Keyboard state restored after the step
    pub keyboard_enabled: bool,
}

#[derive(Debug)]
pub struct SessionState {
    capture_rate: u32,
    command_duration: f64,
    elapsed_execution: f64,
    keyboard_enabled: bool,
    keyboard_before_step: bool,
    ack: Option<TcpStream>,
}

impl SessionState {
    pub fn new(capture_rate: u32) -> Self {
        Self {
            capture_rate,
            command_duration: 0.0,
            elapsed_execution: 0.0,
            keyboard_enabled: capture_rate == 0,
            keyboard_before_step: capture_rate == 0,
            ack: None,
        }
    }

    pub fn mode(&self) -> ExecutionMode {
        if self.capture_rate == 0 {
            ExecutionMode::RealTime
        } else if self.command_duration > 0.0 {
            ExecutionMode::Executing
        } else {
            ExecutionMode::Paused
        }
    }

    /// Engine time scale: 1 while the clock runs, 0 while paused
    pub fn time_scale(&self) -> f64 {
        match self.mode() {
            ExecutionMode::Paused => 0.0,
            ExecutionMode::RealTime | ExecutionMode::Executing => 1.0,
        }
    }

    pub fn capture_rate(&self) -> u32 {
        self.capture_rate
    }

    /// True when no stepped command is in flight
    pub fn is_idle(&self) -> bool {
        self.command_duration == 0.0
    }

    pub fn keyboard_enabled(&self) -> bool {
        self.keyboard_enabled
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            mode: self.mode(),
            capture_rate: self.capture_rate,
            command_duration: self.command_duration,
            elapsed_execution: self.elapsed_execution,
            keyboard_enabled: self.keyboard_enabled,
        }
    }

    /// Switch capture rate. Only valid while no command is in flight;
    /// returns `None` (and changes nothing) otherwise.
    pub fn set_capture_rate(&mut self, rate: u32) -> Option<Transition> {
        if !self.is_idle() {
            return None;
        }
        let from = self.mode();
        self.capture_rate = rate;
        self.keyboard_enabled = rate == 0;
        Some(Transition {
            from,
            to: self.mode(),
            keyboard_enabled: self.keyboard_enabled,
        })
    }

    /// Start a stepped command lasting one capture frame (`1 / capture_rate`).
    ///
    /// Only valid in `Paused`; otherwise the acknowledgement channel is
    /// handed back so the caller can close it.
    pub fn begin_step(&mut self, ack: Option<TcpStream>) -> Result<(), Option<TcpStream>> {
        if self.mode() != ExecutionMode::Paused {
            return Err(ack);
        }
        self.command_duration = 1.0 / self.capture_rate as f64;
        self.elapsed_execution = 0.0;
        self.keyboard_before_step = self.keyboard_enabled;
        self.keyboard_enabled = false;
        self.ack = ack;
        Ok(())
    }

    /// Account for one tick of `dt` simulated seconds.
    ///
    /// The tick on which `elapsed + dt * 1.5 >= duration` holds is the last
    /// one executed for the command: a command of `k * dt` runs exactly `k`
    /// ticks, and a slightly shorter final tick never lets another full tick
    /// through.
    pub fn advance(&mut self, dt: f64) -> StepProgress {
        if self.mode() != ExecutionMode::Executing {
            return StepProgress::Idle;
        }
        let last_tick = self.elapsed_execution + dt * COMPLETION_GUARD >= self.command_duration;
        self.elapsed_execution += dt;
        if !last_tick {
            return StepProgress::Running;
        }

        self.command_duration = 0.0;
        self.elapsed_execution = 0.0;
        self.keyboard_enabled = self.keyboard_before_step;
        StepProgress::Completed(StepCompletion {
            ack: self.ack.take(),
            keyboard_enabled: self.keyboard_enabled,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_modes() {
        assert_eq!(SessionState::new(0).mode(), ExecutionMode::RealTime);
        assert!(SessionState::new(0).keyboard_enabled());
        let paused = SessionState::new(10);
        assert_eq!(paused.mode(), ExecutionMode::Paused);
        assert_eq!(paused.time_scale(), 0.0);
        assert!(!paused.keyboard_enabled());
    }

    #[test]
    fn test_capture_rate_transitions() {
        let mut s = SessionState::new(0);
        let t = s.set_capture_rate(10).unwrap();
        assert_eq!(t.from, ExecutionMode::RealTime);
        assert_eq!(t.to, ExecutionMode::Paused);
        assert!(!t.keyboard_enabled);

        let t = s.set_capture_rate(20).unwrap();
        assert_eq!((t.from, t.to), (ExecutionMode::Paused, ExecutionMode::Paused));
        assert_eq!(s.capture_rate(), 20);

        let t = s.set_capture_rate(0).unwrap();
        assert_eq!(t.to, ExecutionMode::RealTime);
        assert!(s.keyboard_enabled());
        assert_eq!(s.time_scale(), 1.0);
    }

    #[test]
    fn test_step_lifecycle() {
        let mut s = SessionState::new(10);
        assert!(s.begin_step(None).is_ok());
        let snap = s.snapshot();
        assert_eq!(snap.mode, ExecutionMode::Executing);
        assert!((snap.command_duration - 0.1).abs() < 1e-12);
        assert_eq!(s.time_scale(), 1.0);

        // 0.1 s at 50 Hz: exactly five ticks
        let dt = 0.02;
        for _ in 0..4 {
            assert!(matches!(s.advance(dt), StepProgress::Running));
        }
        match s.advance(dt) {
            StepProgress::Completed(c) => {
                assert!(c.ack.is_none());
                assert!(!c.keyboard_enabled);
            }
            other => panic!("expected completion, got {:?}", other),
        }
        let snap = s.snapshot();
        assert_eq!(snap.mode, ExecutionMode::Paused);
        assert_eq!(snap.command_duration, 0.0);
        assert_eq!(snap.elapsed_execution, 0.0);
        assert!(matches!(s.advance(dt), StepProgress::Idle));
    }

    #[test]
    fn test_single_tick_step() {
        let mut s = SessionState::new(10);
        s.begin_step(None).unwrap();
        assert!(matches!(s.advance(0.1), StepProgress::Completed(_)));
    }

    #[test]
    fn test_elapsed_is_monotonic_while_running() {
        let mut s = SessionState::new(2);
        s.begin_step(None).unwrap();
        let mut last = 0.0;
        while let StepProgress::Running = s.advance(0.01) {
            let now = s.snapshot().elapsed_execution;
            assert!(now >= last);
            last = now;
        }
        assert!(last > 0.45 && last < 0.5);
    }

    #[test]
    fn test_begin_step_requires_paused() {
        let mut s = SessionState::new(0);
        assert!(s.begin_step(None).is_err());

        let mut s = SessionState::new(5);
        s.begin_step(None).unwrap();
        assert!(s.begin_step(None).is_err());
        assert!(s.set_capture_rate(0).is_none());
    }

    #[test]
    fn test_keyboard_restored_after_step() {
        let mut s = SessionState::new(0);
        s.set_capture_rate(10);
        // Paused with keyboard disabled; the step restores that state
        s.begin_step(None).unwrap();
        assert!(!s.keyboard_enabled());
        match s.advance(0.1) {
            StepProgress::Completed(c) => assert!(!c.keyboard_enabled),
            other => panic!("unexpected {:?}", other),
        }
    }
}
