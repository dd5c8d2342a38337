//! In-process simulated kiosk device for headless tests and the CLI shell.
//!
//! [`SimDevice`] implements every collaborator trait against a small task
//! model: a stack of surfaces, the surface currently in front, privilege
//! grants, posted affordances and the pinning flag.  Knobs let tests make the
//! host reject or silently ignore launches, hide its task inspector, refuse
//! backup jobs and script how the user answers each privilege dialog.
//!
//! # Example
//!
//! ```rust
//! use kiosk_platform::launcher::Launcher;
//! use kiosk_platform::sim::SimDevice;
//! use kiosk_types::{LaunchFlags, SurfaceId};
//!
//! let device = SimDevice::new("com.example.kiosk");
//! device.set_foreground("com.android.launcher");
//!
//! device
//!     .launch(&SurfaceId::from("com.example.kiosk"), LaunchFlags::relaunch())
//!     .expect("sim launch must succeed");
//! assert!(device.target_in_front());
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use kiosk_types::{Affordance, KioskError, LaunchFlags, Presence, PrivilegeStep, SurfaceId};
use tracing::debug;

use crate::backup::BackupScheduler;
use crate::inspector::TaskInspector;
use crate::launcher::Launcher;
use crate::notifier::Notifier;
use crate::pinning::PinController;
use crate::platform::Platform;
use crate::privilege::{AcquisitionResult, PrivilegeProvider};
use crate::session::SessionStore;

/// Callback invoked whenever a launch changes the surface in front.
pub type FocusListener = Arc<dyn Fn(&SurfaceId) + Send + Sync>;

/// How the simulated user answers a privilege dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimAnswer {
    /// Accepts; the grant is applied.
    Grant,
    /// Presses "skip".
    Decline,
    /// Returns from the flow without the grant being applied.
    ReturnUngranted,
    /// Never returns.
    Hang,
}

/// One launch request observed by the simulated host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRecord {
    pub surface: SurfaceId,
    pub flags: LaunchFlags,
    pub accepted: bool,
}

struct SimState {
    target: SurfaceId,
    foreground: Option<SurfaceId>,
    tasks: Vec<SurfaceId>,
    launches: Vec<LaunchRecord>,
    reject_launches: bool,
    ignore_launches: bool,
    inspector_available: bool,
    backup_requests: Vec<(Duration, Duration)>,
    reject_backup: bool,
    grants: HashMap<PrivilegeStep, bool>,
    answers: HashMap<PrivilegeStep, SimAnswer>,
    prompts: Vec<PrivilegeStep>,
    posted: Vec<Affordance>,
    active_affordances: Vec<Affordance>,
    warnings: Vec<String>,
    pinning_permitted: bool,
    pinned: bool,
    session_url: String,
    heartbeat: Duration,
    focus_listener: Option<FocusListener>,
}

/// Simulated host device.  Clone the surrounding `Arc` to share it.
pub struct SimDevice {
    state: Mutex<SimState>,
}

impl SimDevice {
    /// Create a device whose watchdog target is `target`.  Nothing is in
    /// front, no privilege is granted, pinning is permitted once admin rights
    /// are granted, and every dialog is answered with [`SimAnswer::Grant`].
    pub fn new(target: impl Into<SurfaceId>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(SimState {
                target: target.into(),
                foreground: None,
                tasks: Vec::new(),
                launches: Vec::new(),
                reject_launches: false,
                ignore_launches: false,
                inspector_available: true,
                backup_requests: Vec::new(),
                reject_backup: false,
                grants: HashMap::new(),
                answers: HashMap::new(),
                prompts: Vec::new(),
                posted: Vec::new(),
                active_affordances: Vec::new(),
                warnings: Vec::new(),
                pinning_permitted: true,
                pinned: false,
                session_url: "https://www.techstern.com/".to_string(),
                heartbeat: Duration::from_secs(30),
                focus_listener: None,
            }),
        })
    }

    /// Bundle this device as a [`Platform`].
    pub fn platform(self: &Arc<Self>) -> Platform {
        Platform::from_device(Arc::clone(self))
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Knobs ────────────────────────────────────────────────────────────────

    /// Put `surface` in front, as if the user switched to it.
    pub fn set_foreground(&self, surface: impl Into<SurfaceId>) {
        let surface = surface.into();
        let mut s = self.state();
        if !s.tasks.contains(&surface) {
            s.tasks.push(surface.clone());
        }
        s.foreground = Some(surface);
    }

    pub fn set_focus_listener(&self, listener: FocusListener) {
        self.state().focus_listener = Some(listener);
    }

    pub fn reject_launches(&self, reject: bool) {
        self.state().reject_launches = reject;
    }

    /// Accept launches but never change the surface in front.
    pub fn ignore_launches(&self, ignore: bool) {
        self.state().ignore_launches = ignore;
    }

    /// Make the task inspector answer [`Presence::Unknown`].
    pub fn set_inspector_available(&self, available: bool) {
        self.state().inspector_available = available;
    }

    pub fn reject_backup(&self, reject: bool) {
        self.state().reject_backup = reject;
    }

    pub fn grant(&self, step: PrivilegeStep) {
        self.state().grants.insert(step, true);
    }

    pub fn grant_all(&self) {
        let mut s = self.state();
        for step in PrivilegeStep::ALL {
            s.grants.insert(step, true);
        }
    }

    pub fn set_answer(&self, step: PrivilegeStep, answer: SimAnswer) {
        self.state().answers.insert(step, answer);
    }

    pub fn permit_pinning(&self, permitted: bool) {
        self.state().pinning_permitted = permitted;
    }

    pub fn set_heartbeat(&self, interval: Duration) {
        self.state().heartbeat = interval;
    }

    // ── Observations ─────────────────────────────────────────────────────────

    pub fn foreground(&self) -> Option<SurfaceId> {
        self.state().foreground.clone()
    }

    pub fn target_in_front(&self) -> bool {
        let s = self.state();
        s.foreground.as_ref() == Some(&s.target)
    }

    pub fn task_count(&self) -> usize {
        self.state().tasks.len()
    }

    pub fn launches(&self) -> Vec<LaunchRecord> {
        self.state().launches.clone()
    }

    pub fn launch_count(&self) -> usize {
        self.state().launches.len()
    }

    pub fn backup_requests(&self) -> Vec<(Duration, Duration)> {
        self.state().backup_requests.clone()
    }

    /// Privilege dialogs presented, in order.
    pub fn prompts(&self) -> Vec<PrivilegeStep> {
        self.state().prompts.clone()
    }

    /// Every affordance ever posted, in order.
    pub fn posted_affordances(&self) -> Vec<Affordance> {
        self.state().posted.clone()
    }

    pub fn is_affordance_active(&self, affordance: Affordance) -> bool {
        self.state().active_affordances.contains(&affordance)
    }

    pub fn warnings(&self) -> Vec<String> {
        self.state().warnings.clone()
    }

    pub fn is_pinned(&self) -> bool {
        self.state().pinned
    }
}

impl Launcher for SimDevice {
    fn launch(&self, target: &SurfaceId, flags: LaunchFlags) -> Result<(), KioskError> {
        let listener = {
            let mut s = self.state();
            let accepted = !s.reject_launches;
            s.launches.push(LaunchRecord {
                surface: target.clone(),
                flags,
                accepted,
            });
            if !accepted {
                return Err(KioskError::LaunchRejected {
                    reason: "background activity start blocked".to_string(),
                });
            }
            if s.ignore_launches || s.foreground.as_ref() == Some(target) {
                debug!(surface = %target, "sim launch produced no change");
                return Ok(());
            }
            if flags.clear_task {
                s.tasks.retain(|t| t != target);
            }
            if !s.tasks.contains(target) {
                s.tasks.push(target.clone());
            }
            s.foreground = Some(target.clone());
            s.focus_listener.clone()
        };
        if let Some(listener) = listener {
            listener(target);
        }
        Ok(())
    }
}

impl TaskInspector for SimDevice {
    fn target_presence(&self) -> Presence {
        let s = self.state();
        if !s.inspector_available {
            Presence::Unknown
        } else if s.foreground.as_ref() == Some(&s.target) {
            Presence::Foreground
        } else {
            Presence::Background
        }
    }
}

impl BackupScheduler for SimDevice {
    fn schedule(&self, min_delay: Duration, deadline: Duration) -> Result<(), KioskError> {
        let mut s = self.state();
        if s.reject_backup {
            return Err(KioskError::BackupRejected("job quota exceeded".to_string()));
        }
        s.backup_requests.push((min_delay, deadline));
        Ok(())
    }
}

#[async_trait]
impl PrivilegeProvider for SimDevice {
    fn is_granted(&self, step: PrivilegeStep) -> bool {
        self.state().grants.get(&step).copied().unwrap_or(false)
    }

    async fn request_interactive(&self, step: PrivilegeStep) -> AcquisitionResult {
        let answer = {
            let mut s = self.state();
            s.prompts.push(step);
            let answer = s.answers.get(&step).copied().unwrap_or(SimAnswer::Grant);
            if answer == SimAnswer::Grant {
                s.grants.insert(step, true);
            }
            answer
        };
        match answer {
            SimAnswer::Grant | SimAnswer::ReturnUngranted => AcquisitionResult::Completed,
            SimAnswer::Decline => AcquisitionResult::Declined,
            SimAnswer::Hang => std::future::pending::<AcquisitionResult>().await,
        }
    }
}

impl Notifier for SimDevice {
    fn post(&self, affordance: Affordance) {
        let mut s = self.state();
        s.posted.push(affordance);
        if !s.active_affordances.contains(&affordance) {
            s.active_affordances.push(affordance);
        }
    }

    fn clear(&self, affordance: Affordance) {
        self.state().active_affordances.retain(|a| *a != affordance);
    }

    fn warn(&self, message: &str) {
        self.state().warnings.push(message.to_string());
    }
}

impl PinController for SimDevice {
    fn is_permitted(&self) -> bool {
        let s = self.state();
        s.pinning_permitted
            && s.grants
                .get(&PrivilegeStep::AdminRights)
                .copied()
                .unwrap_or(false)
    }

    fn is_engaged(&self) -> bool {
        self.state().pinned
    }

    fn engage(&self) -> Result<(), KioskError> {
        if !self.is_permitted() {
            return Err(KioskError::CapabilityUnavailable(
                "lock task not permitted".to_string(),
            ));
        }
        self.state().pinned = true;
        Ok(())
    }

    fn disengage(&self) -> Result<(), KioskError> {
        self.state().pinned = false;
        Ok(())
    }
}

impl SessionStore for SimDevice {
    fn target_url(&self) -> String {
        self.state().session_url.clone()
    }

    fn heartbeat_interval(&self) -> Duration {
        self.state().heartbeat
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TARGET: &str = "com.example.kiosk";

    #[test]
    fn relaunching_foreground_target_creates_no_duplicate_task() {
        let device = SimDevice::new(TARGET);
        let target = SurfaceId::from(TARGET);
        device.launch(&target, LaunchFlags::relaunch()).unwrap();
        let tasks = device.task_count();

        for _ in 0..5 {
            device.launch(&target, LaunchFlags::maximal()).unwrap();
        }
        assert_eq!(device.task_count(), tasks);
        assert!(device.target_in_front());
    }

    #[test]
    fn rejected_launch_is_recorded_and_errors() {
        let device = SimDevice::new(TARGET);
        device.reject_launches(true);
        let result = device.launch(&SurfaceId::from(TARGET), LaunchFlags::minimal());
        assert!(matches!(result, Err(KioskError::LaunchRejected { .. })));
        assert_eq!(device.launches().len(), 1);
        assert!(!device.launches()[0].accepted);
        assert!(!device.target_in_front());
    }

    #[test]
    fn ignored_launch_leaves_foreground_unchanged() {
        let device = SimDevice::new(TARGET);
        device.set_foreground("com.android.launcher");
        device.ignore_launches(true);
        device
            .launch(&SurfaceId::from(TARGET), LaunchFlags::relaunch())
            .unwrap();
        assert_eq!(device.target_presence(), Presence::Background);
    }

    #[test]
    fn inspector_can_be_hidden() {
        let device = SimDevice::new(TARGET);
        device.set_foreground(TARGET);
        assert_eq!(device.target_presence(), Presence::Foreground);
        device.set_inspector_available(false);
        assert_eq!(device.target_presence(), Presence::Unknown);
    }

    #[test]
    fn focus_listener_fires_on_effective_launch_only() {
        let device = SimDevice::new(TARGET);
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        device.set_focus_listener(Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        let target = SurfaceId::from(TARGET);
        device.launch(&target, LaunchFlags::relaunch()).unwrap();
        device.launch(&target, LaunchFlags::relaunch()).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn pinning_requires_admin_rights() {
        let device = SimDevice::new(TARGET);
        assert!(matches!(
            device.engage(),
            Err(KioskError::CapabilityUnavailable(_))
        ));
        device.grant(PrivilegeStep::AdminRights);
        device.engage().unwrap();
        assert!(device.is_pinned());
    }

    #[tokio::test]
    async fn scripted_privilege_answers() {
        let device = SimDevice::new(TARGET);
        device.set_answer(PrivilegeStep::AdminRights, SimAnswer::Decline);
        device.set_answer(PrivilegeStep::OverlayRights, SimAnswer::ReturnUngranted);

        assert_eq!(
            device.request_interactive(PrivilegeStep::AdminRights).await,
            AcquisitionResult::Declined
        );
        assert_eq!(
            device.request_interactive(PrivilegeStep::PowerExemption).await,
            AcquisitionResult::Completed
        );
        assert_eq!(
            device.request_interactive(PrivilegeStep::OverlayRights).await,
            AcquisitionResult::Completed
        );
        assert!(!device.is_granted(PrivilegeStep::AdminRights));
        assert!(device.is_granted(PrivilegeStep::PowerExemption));
        assert!(!device.is_granted(PrivilegeStep::OverlayRights));
        assert_eq!(device.prompts().len(), 3);
    }

    #[test]
    fn affordances_post_and_clear() {
        let device = SimDevice::new(TARGET);
        device.post(Affordance::BootReady);
        assert!(device.is_affordance_active(Affordance::BootReady));
        device.clear(Affordance::BootReady);
        assert!(!device.is_affordance_active(Affordance::BootReady));
        assert_eq!(device.posted_affordances(), vec![Affordance::BootReady]);
    }
}
