//! `PrivilegeProvider` – grant checks and interactive acquisition flows.

use async_trait::async_trait;
use kiosk_types::PrivilegeStep;

/// How a user-facing acquisition flow ended.
///
/// `Completed` only means the flow returned; the grant must still be
/// re-checked with [`PrivilegeProvider::is_granted`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquisitionResult {
    Completed,
    /// The user pressed "skip" or backed out of the dialog.
    Declined,
    /// The flow could not be started at all.
    Failed(String),
}

#[async_trait]
pub trait PrivilegeProvider: Send + Sync {
    /// Non-interactive check of the current grant state.
    fn is_granted(&self, step: PrivilegeStep) -> bool;

    /// Present the host's acquisition flow for `step` and wait for it to end.
    async fn request_interactive(&self, step: PrivilegeStep) -> AcquisitionResult;
}
