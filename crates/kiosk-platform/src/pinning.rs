//! `PinController` – engages and releases the host's surface pinning.

use kiosk_types::KioskError;

/// Host lock-task facility that keeps the user inside the target surface.
pub trait PinController: Send + Sync {
    /// `true` when the host allows this application to pin itself.
    fn is_permitted(&self) -> bool;

    /// `true` while pinning is engaged.
    fn is_engaged(&self) -> bool;

    /// # Errors
    ///
    /// Returns [`KioskError::CapabilityUnavailable`] when the host refuses.
    fn engage(&self) -> Result<(), KioskError>;

    /// # Errors
    ///
    /// Returns [`KioskError::CapabilityUnavailable`] when the host refuses.
    fn disengage(&self) -> Result<(), KioskError>;
}
