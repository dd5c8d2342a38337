//! [`InactivityMonitor`] – relaunch the target after a quiet period.
//!
//! The monitor keeps a single countdown identified by a generation number.
//! Every re-arm or suspension bumps the generation, so a countdown that was
//! superseded while its timer was queued is ignored when it fires.

use std::time::Duration;

use tracing::debug;

/// A countdown the owner must schedule `timeout` from now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Countdown {
    pub generation: u64,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct InactivityMonitor {
    timeout: Duration,
    awake: bool,
    generation: u64,
    armed: bool,
}

impl InactivityMonitor {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            awake: true,
            generation: 0,
            armed: false,
        }
    }

    pub fn is_awake(&self) -> bool {
        self.awake
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Reset the countdown.  Ignored while the screen is off.
    pub fn on_interaction(&mut self) -> Option<Countdown> {
        if !self.awake {
            return None;
        }
        Some(self.arm())
    }

    /// Suspend monitoring entirely until the screen comes back.
    pub fn on_screen_off(&mut self) {
        self.awake = false;
        self.disarm();
        debug!("inactivity monitoring suspended");
    }

    /// Resume monitoring, but only if the target is not already in front.
    pub fn on_screen_on(&mut self, target_foreground: bool) -> Option<Countdown> {
        self.awake = true;
        if target_foreground {
            debug!("target already in front after wake; monitor stays idle");
            self.disarm();
            return None;
        }
        Some(self.arm())
    }

    /// Decide whether an expired countdown should relaunch the target.
    ///
    /// The monitor stops after a countdown expires, whatever the decision.
    pub fn on_timeout(&mut self, generation: u64, target_foreground: bool) -> bool {
        if !self.armed || generation != self.generation {
            return false;
        }
        self.armed = false;
        self.awake && !target_foreground
    }

    fn arm(&mut self) -> Countdown {
        self.generation += 1;
        self.armed = true;
        Countdown {
            generation: self.generation,
            timeout: self.timeout,
        }
    }

    fn disarm(&mut self) {
        self.generation += 1;
        self.armed = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor() -> InactivityMonitor {
        InactivityMonitor::new(Duration::from_secs(30))
    }

    #[test]
    fn interaction_resets_the_countdown() {
        let mut m = monitor();
        let first = m.on_interaction().unwrap();
        let second = m.on_interaction().unwrap();
        assert_eq!(second.timeout, Duration::from_secs(30));
        assert!(!m.on_timeout(first.generation, false));
        assert!(m.on_timeout(second.generation, false));
    }

    #[test]
    fn timeout_skipped_when_target_in_front() {
        let mut m = monitor();
        let c = m.on_interaction().unwrap();
        assert!(!m.on_timeout(c.generation, true));
        assert!(!m.is_armed());
    }

    #[test]
    fn screen_off_suspends() {
        let mut m = monitor();
        let c = m.on_interaction().unwrap();
        m.on_screen_off();
        assert!(!m.on_timeout(c.generation, false));
        assert!(m.on_interaction().is_none());
    }

    #[test]
    fn screen_on_rearms_only_without_target() {
        let mut m = monitor();
        m.on_screen_off();
        assert!(m.on_screen_on(true).is_none());
        assert!(!m.is_armed());
        let c = m.on_screen_on(false).unwrap();
        assert!(m.on_timeout(c.generation, false));
    }

    #[test]
    fn fires_once_then_stops() {
        let mut m = monitor();
        let c = m.on_interaction().unwrap();
        assert!(m.on_timeout(c.generation, false));
        assert!(!m.on_timeout(c.generation, false));
    }
}
