//! [`Platform`] – the bundle of host collaborators handed to the watchdog.
//!
//! The watchdog core owns no host handles of its own.  Every launch, presence
//! query, backup handoff, privilege check, notification, pin toggle and
//! session read goes through one of the trait objects collected here.

use std::sync::Arc;

use crate::backup::BackupScheduler;
use crate::inspector::TaskInspector;
use crate::launcher::Launcher;
use crate::notifier::Notifier;
use crate::pinning::PinController;
use crate::privilege::PrivilegeProvider;
use crate::session::SessionStore;

/// Cheaply clonable set of host collaborators.
#[derive(Clone)]
pub struct Platform {
    pub launcher: Arc<dyn Launcher>,
    pub inspector: Arc<dyn TaskInspector>,
    pub backup: Arc<dyn BackupScheduler>,
    pub privileges: Arc<dyn PrivilegeProvider>,
    pub notifier: Arc<dyn Notifier>,
    pub pinning: Arc<dyn PinController>,
    pub session: Arc<dyn SessionStore>,
}

impl Platform {
    /// Build a platform from a single object implementing every collaborator
    /// trait, as the simulated device does.
    pub fn from_device<D>(device: Arc<D>) -> Self
    where
        D: Launcher
            + TaskInspector
            + BackupScheduler
            + PrivilegeProvider
            + Notifier
            + PinController
            + SessionStore
            + 'static,
    {
        Self {
            launcher: device.clone(),
            inspector: device.clone(),
            backup: device.clone(),
            privileges: device.clone(),
            notifier: device.clone(),
            pinning: device.clone(),
            session: device,
        }
    }

    /// Replace the session store, e.g. with the persisted [`SessionConfig`].
    ///
    /// [`SessionConfig`]: kiosk_types::SessionConfig
    pub fn with_session(mut self, session: Arc<dyn SessionStore>) -> Self {
        self.session = session;
        self
    }
}
