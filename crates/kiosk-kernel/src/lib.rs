//! `kiosk-kernel` – Privileges & Lock Enforcement
//!
//! The rules the watchdog enforces before and while holding the device in
//! kiosk mode.  Nothing here schedules work; the runtime drives it.
//!
//! # Modules
//!
//! - [`privilege_gate`] – [`PrivilegeGate`][privilege_gate::PrivilegeGate]:
//!   walks the elevated capabilities in a fixed order, presents each missing
//!   one at most once per session and reports a terminal
//!   [`GateOutcome`][kiosk_types::GateOutcome].  Enforcement waits for it.
//! - [`lock_machine`] – [`LockStateMachine`][lock_machine::LockStateMachine]:
//!   `Unlocked → Pinned → UnlockPending` with the admin PIN challenge.
//! - [`unlock_gesture`] – [`UnlockGestureDetector`][unlock_gesture::UnlockGestureDetector]:
//!   turns raw input signals into "open the challenge" decisions.

pub mod lock_machine;
pub mod privilege_gate;
pub mod unlock_gesture;

pub use lock_machine::{AdminPin, ChallengeRequest, LockStateMachine, PinVerdict};
pub use privilege_gate::{GateConfig, GateEvent, PrivilegeGate};
pub use unlock_gesture::{GestureVerdict, UnlockGestureDetector};
