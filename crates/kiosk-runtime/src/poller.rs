//! [`PresencePoller`] – bounded periodic supervision after boot.
//!
//! The first check runs [`PollConfig::first_check`] after boot, later ones
//! every [`PollConfig::interval`], and the poller gives up after
//! [`PollConfig::max_checks`].  A check that finds the target in front stops
//! it for good.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub first_check: Duration,
    pub interval: Duration,
    pub max_checks: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            first_check: Duration::from_secs(120),
            interval: Duration::from_secs(30),
            max_checks: 20,
        }
    }
}

/// Outcome of one poll tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollDecision {
    /// Target confirmed in front; stop polling.
    Confirmed,
    /// Target missing; relaunch, then check again after `next` if set.
    Relaunch { next: Option<Duration> },
    /// Tick from an earlier start, or the poller is stopped.
    Ignore,
}

#[derive(Debug, Clone)]
pub struct PresencePoller {
    config: PollConfig,
    generation: u64,
    checks: u32,
    active: bool,
}

impl PresencePoller {
    pub fn new(config: PollConfig) -> Self {
        Self {
            config,
            generation: 0,
            checks: 0,
            active: false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn checks(&self) -> u32 {
        self.checks
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// (Re)start polling.  Returns the generation and the delay of the first
    /// check; `None` when polling is disabled (`max_checks == 0`).
    pub fn start(&mut self) -> Option<(u64, Duration)> {
        self.generation += 1;
        self.checks = 0;
        self.active = self.config.max_checks > 0;
        self.active
            .then_some((self.generation, self.config.first_check))
    }

    pub fn on_tick(&mut self, generation: u64, target_foreground: bool) -> PollDecision {
        if !self.active || generation != self.generation {
            return PollDecision::Ignore;
        }
        self.checks += 1;
        if target_foreground {
            self.active = false;
            return PollDecision::Confirmed;
        }
        let next = if self.checks >= self.config.max_checks {
            self.active = false;
            None
        } else {
            Some(self.config.interval)
        };
        PollDecision::Relaunch { next }
    }
}
