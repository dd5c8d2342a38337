//! [`PresenceTracker`] – last known presence of the target surface.
//!
//! Pure state, no timers.  The tracker is written only from focus-change
//! events and read by every component before it acts.  Transition timestamps
//! never move backwards, even if a caller hands in an older `now`.

use std::time::Duration;

use kiosk_platform::TaskInspector;
use kiosk_types::{Presence, PresenceState, SurfaceId};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct PresenceTracker {
    target: SurfaceId,
    state: PresenceState,
    last_surface: Option<SurfaceId>,
}

impl PresenceTracker {
    pub fn new(target: SurfaceId) -> Self {
        Self {
            target,
            state: PresenceState::default(),
            last_surface: None,
        }
    }

    pub fn target(&self) -> &SurfaceId {
        &self.target
    }

    pub fn state(&self) -> &PresenceState {
        &self.state
    }

    pub fn presence(&self) -> Presence {
        self.state.presence
    }

    /// The surface named by the most recent focus-change event.
    pub fn last_surface(&self) -> Option<&SurfaceId> {
        self.last_surface.as_ref()
    }

    /// Record a focus change to `surface` at `now`.
    ///
    /// Returns the new presence when it differs from the previous one.
    pub fn observe_focus(&mut self, surface: &SurfaceId, now: Duration) -> Option<Presence> {
        self.last_surface = Some(surface.clone());
        let presence = if *surface == self.target {
            Presence::Foreground
        } else {
            Presence::Background
        };
        self.record(presence, now)
    }

    fn record(&mut self, presence: Presence, now: Duration) -> Option<Presence> {
        if presence == self.state.presence {
            return None;
        }
        let floor = self
            .state
            .last_foreground_at
            .max(self.state.last_background_at)
            .unwrap_or_default();
        let at = now.max(floor);
        match presence {
            Presence::Foreground => self.state.last_foreground_at = Some(at),
            Presence::Background => self.state.last_background_at = Some(at),
            Presence::Unknown => {}
        }
        debug!(surface = %self.target, ?presence, at_ms = at.as_millis() as u64, "presence changed");
        self.state.presence = presence;
        Some(presence)
    }

    /// Authoritative presence: the inspector's answer, or this tracker's last
    /// focus-derived state when the inspector cannot tell.
    pub fn resolve(&self, inspector: &dyn TaskInspector) -> Presence {
        match inspector.target_presence() {
            Presence::Unknown => self.state.presence,
            known => known,
        }
    }

    /// Pre-fire check.  `Unknown` after fallback counts as not foreground.
    pub fn is_target_foreground(&self, inspector: &dyn TaskInspector) -> bool {
        self.resolve(inspector).is_foreground()
    }
}
