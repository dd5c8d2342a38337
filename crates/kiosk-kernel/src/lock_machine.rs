//! [`LockStateMachine`] – surface pinning and the admin unlock challenge.
//!
//! ```text
//!   Unlocked ──enter_pinned──▶ Pinned ──request_unlock──▶ UnlockPending
//!       ▲                        ▲                             │
//!       │                        └──── wrong PIN / cancel ─────┤
//!       └──────────────────────── correct PIN ─────────────────┘
//! ```
//!
//! Pinning is only attempted once the privilege gate has reported a terminal
//! result and only if the host permits it.  While a challenge is open,
//! further unlock requests are suppressed so exactly one challenge exists.

use kiosk_platform::PinController;
use kiosk_types::{GateOutcome, KioskError, LockMode};
use tracing::{info, warn};
use zeroize::Zeroizing;

// ────────────────────────────────────────────────────────────────────────────
// AdminPin
// ────────────────────────────────────────────────────────────────────────────

/// Secret that ends pinning.  Wiped from memory on drop; never printed.
#[derive(Clone)]
pub struct AdminPin(Zeroizing<String>);

impl AdminPin {
    pub fn new(pin: impl Into<String>) -> Self {
        Self(Zeroizing::new(pin.into()))
    }

    /// Compare without short-circuiting on the first differing byte.
    pub fn matches(&self, candidate: &str) -> bool {
        let expected = self.0.as_bytes();
        let given = candidate.as_bytes();
        let mut diff = expected.len() ^ given.len();
        for (i, b) in expected.iter().enumerate() {
            diff |= usize::from(b ^ given.get(i).copied().unwrap_or(0));
        }
        diff == 0
    }
}

impl Default for AdminPin {
    fn default() -> Self {
        Self::new("1234")
    }
}

impl std::fmt::Debug for AdminPin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AdminPin(<redacted>)")
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Verdicts
// ────────────────────────────────────────────────────────────────────────────

/// Result of [`LockStateMachine::request_unlock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeRequest {
    /// A challenge is now open; present the PIN prompt.
    Opened,
    /// A challenge was already open; nothing new to present.
    Suppressed,
    /// Not pinned; there is nothing to unlock.
    NotPinned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinVerdict {
    Accepted,
    Rejected,
}

// ────────────────────────────────────────────────────────────────────────────
// LockStateMachine
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct LockStateMachine {
    mode: LockMode,
    pin: AdminPin,
}

impl LockStateMachine {
    pub fn new(pin: AdminPin) -> Self {
        Self {
            mode: LockMode::Unlocked,
            pin,
        }
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }

    /// Engage pinning.
    ///
    /// `gate` is the terminal privilege result; `None` means the gate is still
    /// running and yields [`KioskError::GateNotSettled`].  If pinning is not
    /// permitted the mode stays `Unlocked` and
    /// [`KioskError::CapabilityUnavailable`] is returned for the caller to
    /// surface as a warning.  Already pinned (or challenged) is a no-op.
    pub fn enter_pinned(
        &mut self,
        gate: Option<&GateOutcome>,
        pinning: &dyn PinController,
    ) -> Result<LockMode, KioskError> {
        let outcome = gate.ok_or(KioskError::GateNotSettled)?;
        if self.mode != LockMode::Unlocked {
            return Ok(self.mode);
        }
        if !outcome.enforcement().allows_pinning() || !pinning.is_permitted() {
            warn!("surface pinning not permitted; continuing unpinned");
            return Err(KioskError::CapabilityUnavailable(
                "surface pinning not permitted".to_string(),
            ));
        }
        if !pinning.is_engaged() {
            pinning.engage()?;
        }
        self.mode = LockMode::Pinned;
        info!("surface pinned");
        Ok(self.mode)
    }

    /// Open the admin challenge in response to a detected unlock gesture.
    pub fn request_unlock(&mut self) -> ChallengeRequest {
        match self.mode {
            LockMode::Pinned => {
                self.mode = LockMode::UnlockPending;
                info!("unlock challenge opened");
                ChallengeRequest::Opened
            }
            LockMode::UnlockPending => ChallengeRequest::Suppressed,
            LockMode::Unlocked => ChallengeRequest::NotPinned,
        }
    }

    /// Check `candidate` against the admin PIN.
    ///
    /// On a match pinning is released and the mode becomes `Unlocked`, even if
    /// the host fails to disengage; that failure is only logged.
    pub fn submit_pin(&mut self, candidate: &str) -> Result<PinVerdict, KioskError> {
        if self.mode != LockMode::UnlockPending {
            return Err(KioskError::NoChallengeOpen);
        }
        if self.pin.matches(candidate) {
            self.mode = LockMode::Unlocked;
            info!("admin PIN accepted; unpinned");
            Ok(PinVerdict::Accepted)
        } else {
            self.mode = LockMode::Pinned;
            warn!("incorrect admin PIN");
            Ok(PinVerdict::Rejected)
        }
    }

    /// [`submit_pin`][Self::submit_pin] plus releasing the host pin on success.
    pub fn submit_pin_and_release(
        &mut self,
        candidate: &str,
        pinning: &dyn PinController,
    ) -> Result<PinVerdict, KioskError> {
        let verdict = self.submit_pin(candidate)?;
        if verdict == PinVerdict::Accepted
            && let Err(err) = pinning.disengage()
        {
            warn!(%err, "host failed to release pinning");
        }
        Ok(verdict)
    }

    /// Dismiss an open challenge.
    pub fn cancel_challenge(&mut self) -> Result<(), KioskError> {
        if self.mode != LockMode::UnlockPending {
            return Err(KioskError::NoChallengeOpen);
        }
        self.mode = LockMode::Pinned;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiosk_platform::SimDevice;
    use kiosk_types::{EnforcementMode, PrivilegeStep};

    fn pinned_machine() -> (LockStateMachine, std::sync::Arc<SimDevice>) {
        let device = SimDevice::new("kiosk");
        device.grant_all();
        let mut machine = LockStateMachine::new(AdminPin::default());
        machine
            .enter_pinned(Some(&GateOutcome::AllGranted), &*device)
            .unwrap();
        (machine, device)
    }

    #[test]
    fn pin_compare() {
        let pin = AdminPin::new("1234");
        assert!(pin.matches("1234"));
        assert!(!pin.matches("123"));
        assert!(!pin.matches("12345"));
        assert!(!pin.matches("4321"));
        assert!(!pin.matches(""));
    }

    #[test]
    fn pin_debug_is_redacted() {
        let rendered = format!("{:?}", AdminPin::new("9876"));
        assert!(!rendered.contains("9876"));
    }

    #[test]
    fn pinning_waits_for_gate() {
        let device = SimDevice::new("kiosk");
        device.grant_all();
        let mut machine = LockStateMachine::new(AdminPin::default());
        let err = machine.enter_pinned(None, &*device).unwrap_err();
        assert_eq!(err, KioskError::GateNotSettled);
        assert_eq!(machine.mode(), LockMode::Unlocked);
        assert!(!device.is_pinned());
    }

    #[test]
    fn pinning_not_permitted_stays_unlocked() {
        let device = SimDevice::new("kiosk");
        let mut machine = LockStateMachine::new(AdminPin::default());
        let outcome = GateOutcome::PartiallyGranted(vec![PrivilegeStep::AdminRights]);
        let err = machine.enter_pinned(Some(&outcome), &*device).unwrap_err();
        assert!(matches!(err, KioskError::CapabilityUnavailable(_)));
        assert_eq!(machine.mode(), LockMode::Unlocked);
    }

    #[test]
    fn reduced_enforcement_still_pins() {
        let device = SimDevice::new("kiosk");
        device.grant(PrivilegeStep::AdminRights);
        device.grant(PrivilegeStep::PowerExemption);
        let outcome = GateOutcome::PartiallyGranted(vec![PrivilegeStep::OverlayRights]);
        assert_eq!(outcome.enforcement(), EnforcementMode::Reduced);

        let mut machine = LockStateMachine::new(AdminPin::default());
        let mode = machine.enter_pinned(Some(&outcome), &*device).unwrap();
        assert_eq!(mode, LockMode::Pinned);
        assert!(device.is_pinned());
    }

    #[test]
    fn host_refusal_stays_unlocked() {
        let device = SimDevice::new("kiosk");
        device.grant_all();
        device.permit_pinning(false);
        let mut machine = LockStateMachine::new(AdminPin::default());
        let result = machine.enter_pinned(Some(&GateOutcome::AllGranted), &*device);
        assert!(result.is_err());
        assert_eq!(machine.mode(), LockMode::Unlocked);
    }

    #[test]
    fn only_one_challenge_at_a_time() {
        let (mut machine, _device) = pinned_machine();
        assert_eq!(machine.request_unlock(), ChallengeRequest::Opened);
        assert_eq!(machine.request_unlock(), ChallengeRequest::Suppressed);
        assert_eq!(machine.mode(), LockMode::UnlockPending);
    }

    #[test]
    fn wrong_pin_returns_to_pinned() {
        let (mut machine, device) = pinned_machine();
        machine.request_unlock();
        let verdict = machine
            .submit_pin_and_release("0000", &*device)
            .unwrap();
        assert_eq!(verdict, PinVerdict::Rejected);
        assert_eq!(machine.mode(), LockMode::Pinned);
        assert!(device.is_pinned());
    }

    #[test]
    fn correct_pin_unpins() {
        let (mut machine, device) = pinned_machine();
        machine.request_unlock();
        let verdict = machine
            .submit_pin_and_release("1234", &*device)
            .unwrap();
        assert_eq!(verdict, PinVerdict::Accepted);
        assert_eq!(machine.mode(), LockMode::Unlocked);
        assert!(!device.is_pinned());
    }

    #[test]
    fn cancel_keeps_pinned() {
        let (mut machine, _device) = pinned_machine();
        machine.request_unlock();
        machine.cancel_challenge().unwrap();
        assert_eq!(machine.mode(), LockMode::Pinned);
        assert_eq!(machine.cancel_challenge(), Err(KioskError::NoChallengeOpen));
    }

    #[test]
    fn pin_without_challenge_is_an_error() {
        let (mut machine, _device) = pinned_machine();
        assert_eq!(machine.submit_pin("1234"), Err(KioskError::NoChallengeOpen));
    }

    #[test]
    fn unlock_request_while_unlocked_is_ignored() {
        let mut machine = LockStateMachine::new(AdminPin::default());
        assert_eq!(machine.request_unlock(), ChallengeRequest::NotPinned);
        assert_eq!(machine.mode(), LockMode::Unlocked);
    }
}
