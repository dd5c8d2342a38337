//! `BackupScheduler` – a best-effort deferred job that outlives the process.

use std::time::Duration;

use kiosk_types::KioskError;

/// Host job scheduler used as the terminal step of the boot profile.
///
/// The job must run no earlier than `min_delay` and no later than `deadline`
/// after the request.  When it runs the host calls back into the watchdog's
/// backup-job entry point.
pub trait BackupScheduler: Send + Sync {
    /// # Errors
    ///
    /// Returns [`KioskError::BackupRejected`] when the host declines the job.
    fn schedule(&self, min_delay: Duration, deadline: Duration) -> Result<(), KioskError>;
}
