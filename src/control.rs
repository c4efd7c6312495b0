//! Shared start/pause/stop flags
//!
//! Written by the signaling handlers (and the Ctrl-C handler), read by the
//! relay loop once per iteration. The two flags are independent atomics; no
//! invariant spans both, so `paused == true` while `running == false` is a
//! legal state that simply has no effect.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};

/// Run/pause flags for one streaming session
#[derive(Debug)]
pub struct ControlState {
    running: AtomicBool,
    paused: AtomicBool,
}

impl ControlState {
    pub fn new() -> Self {
        Self {
            running: AtomicBool::new(true),
            paused: AtomicBool::new(false),
        }
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::Release);
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Apply an external command.
    ///
    /// `Start` also clears the pause flag, which is how a paused stream is
    /// resumed. Takes effect at the relay's next loop check.
    pub fn apply(&self, command: ControlCommand) {
        match command {
            ControlCommand::Start => {
                self.set_running(true);
                self.set_paused(false);
            }
            ControlCommand::Pause => self.set_paused(true),
            ControlCommand::Stop => self.set_running(false),
        }
        log::info!(
            "Control command {:?} applied (running={}, paused={})",
            command,
            self.is_running(),
            self.is_paused()
        );
    }

    pub fn snapshot(&self) -> ControlSnapshot {
        ControlSnapshot {
            running: self.is_running(),
            paused: self.is_paused(),
        }
    }
}

impl Default for ControlState {
    fn default() -> Self {
        Self::new()
    }
}

/// Commands accepted on the control endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlCommand {
    Start,
    Pause,
    Stop,
}

impl ControlCommand {
    /// Parse a wire command; unrecognized commands return `None`.
    pub fn parse(command: &str) -> Option<Self> {
        match command {
            "start" => Some(Self::Start),
            "pause" => Some(Self::Pause),
            "stop" => Some(Self::Stop),
            _ => None,
        }
    }
}

/// Point-in-time copy of the flags for status reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ControlSnapshot {
    pub running: bool,
    pub paused: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_defaults() {
        let control = ControlState::new();
        assert!(control.is_running());
        assert!(!control.is_paused());
    }

    #[test]
    fn test_stop_twice_is_idempotent() {
        let control = ControlState::new();
        control.apply(ControlCommand::Stop);
        control.apply(ControlCommand::Stop);
        assert!(!control.is_running());
        assert!(!control.is_paused());
    }

    #[test]
    fn test_start_resumes_pause() {
        let control = ControlState::new();
        control.apply(ControlCommand::Pause);
        assert!(control.is_paused());
        control.apply(ControlCommand::Start);
        assert!(control.is_running());
        assert!(!control.is_paused());
    }

    #[test]
    fn test_paused_while_stopped_is_legal() {
        let control = ControlState::new();
        control.set_running(false);
        control.set_paused(true);
        assert_eq!(
            control.snapshot(),
            ControlSnapshot {
                running: false,
                paused: true
            }
        );
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(ControlCommand::parse("start"), Some(ControlCommand::Start));
        assert_eq!(ControlCommand::parse("pause"), Some(ControlCommand::Pause));
        assert_eq!(ControlCommand::parse("stop"), Some(ControlCommand::Stop));
        assert_eq!(ControlCommand::parse("STOP"), None);
        assert_eq!(ControlCommand::parse("rewind"), None);
        assert_eq!(ControlCommand::parse(""), None);
    }

    #[test]
    fn test_concurrent_writers() {
        let control = Arc::new(ControlState::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let control = Arc::clone(&control);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        control.set_paused(i % 2 == 0);
                        let _ = control.is_running();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert!(control.is_running());
    }
}
