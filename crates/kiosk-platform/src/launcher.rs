//! Generic `Launcher` trait: asks the host to bring a surface to the front.
//!
//! The watchdog never talks to the host's activity manager directly; it only
//! ever calls this trait, so hosts can be swapped without touching the
//! escalation logic.

use kiosk_types::{KioskError, LaunchFlags, SurfaceId};

/// Host facility that starts (or re-fronts) an application surface.
pub trait Launcher: Send + Sync {
    /// Request that `target` becomes the foreground surface.
    ///
    /// Launching a surface that is already in front must leave the host
    /// unchanged (no duplicate tasks).
    ///
    /// # Errors
    ///
    /// Returns [`KioskError::LaunchRejected`] when the host refuses the
    /// request, e.g. because background launches are blocked.
    fn launch(&self, target: &SurfaceId, flags: LaunchFlags) -> Result<(), KioskError>;
}
