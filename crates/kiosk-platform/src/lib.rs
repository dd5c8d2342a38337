//! `kiosk-platform` – Host Collaborators
//!
//! The watchdog core is host-agnostic.  Everything it needs from the device
//! is expressed as a trait in this crate:
//!
//! - [`launcher`] – [`Launcher`][launcher::Launcher]: bring a surface to the
//!   front with a chosen set of [`LaunchFlags`][kiosk_types::LaunchFlags].
//! - [`inspector`] – [`TaskInspector`][inspector::TaskInspector]: the
//!   authoritative "is the target in front" fact consulted before every
//!   recovery action.
//! - [`backup`] – [`BackupScheduler`][backup::BackupScheduler]: a best-effort
//!   job that survives the current process.
//! - [`privilege`] – [`PrivilegeProvider`][privilege::PrivilegeProvider]:
//!   grant checks and interactive acquisition flows.
//! - [`notifier`] – [`Notifier`][notifier::Notifier]: tap-to-open affordances
//!   and warnings.
//! - [`pinning`] – [`PinController`][pinning::PinController]: engage and
//!   release surface pinning.
//! - [`session`] – [`SessionStore`][session::SessionStore]: read-only session
//!   settings.
//! - [`platform`] – [`Platform`][platform::Platform]: the bundle of all of the
//!   above handed to the watchdog.
//! - [`sim`] – [`SimDevice`][sim::SimDevice]: an in-process simulated host
//!   for tests and the interactive shell.

pub mod backup;
pub mod inspector;
pub mod launcher;
pub mod notifier;
pub mod pinning;
pub mod platform;
pub mod privilege;
pub mod session;
pub mod sim;

pub use backup::BackupScheduler;
pub use inspector::TaskInspector;
pub use launcher::Launcher;
pub use notifier::Notifier;
pub use pinning::PinController;
pub use platform::Platform;
pub use privilege::{AcquisitionResult, PrivilegeProvider};
pub use session::SessionStore;
pub use sim::{LaunchRecord, SimAnswer, SimDevice};
