//! [`TransitionWatchdog`] – one recovery timer per background excursion.
//!
//! ```text
//!   Foregrounded ──other surface──▶ BackgroundedPendingRecovery
//!        ▲                                   │
//!        └────────────target surface─────────┘
//! ```
//!
//! Repeated events of the same kind are no-ops, so a burst of background
//! events never restarts the grace timer.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Foregrounded,
    BackgroundedPendingRecovery,
}

/// What the owner must do with the background-transition run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionDecision {
    StartRecovery,
    CancelRecovery,
    NoChange,
}

#[derive(Debug, Clone)]
pub struct TransitionWatchdog {
    state: WatchState,
}

impl Default for TransitionWatchdog {
    fn default() -> Self {
        Self {
            state: WatchState::Foregrounded,
        }
    }
}

impl TransitionWatchdog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> WatchState {
        self.state
    }

    pub fn on_focus(&mut self, is_target: bool) -> TransitionDecision {
        match (self.state, is_target) {
            (WatchState::Foregrounded, false) => {
                self.state = WatchState::BackgroundedPendingRecovery;
                TransitionDecision::StartRecovery
            }
            (WatchState::BackgroundedPendingRecovery, true) => {
                self.state = WatchState::Foregrounded;
                TransitionDecision::CancelRecovery
            }
            _ => TransitionDecision::NoChange,
        }
    }
}
