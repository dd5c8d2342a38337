//! `kiosk-types` – shared data model for the foreground-presence watchdog.
//!
//! Every crate in the workspace speaks in these types: presence snapshots,
//! privilege steps, recovery actions, lock modes, the diagnostic event
//! envelope and the [`KioskError`] taxonomy.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// ────────────────────────────────────────────────────────────────────────────
// Surfaces & presence
// ────────────────────────────────────────────────────────────────────────────

/// Identifier of an application surface, e.g. `"com.example.kiosk"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SurfaceId(String);

impl SurfaceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SurfaceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for SurfaceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Whether the target surface is the active surface on the device.
///
/// `Unknown` is a first-class answer: hosts without a task-inspection API
/// report it, and the watchdog never reads it as "foreground".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Presence {
    Foreground,
    Background,
    Unknown,
}

impl Presence {
    pub fn is_foreground(self) -> bool {
        matches!(self, Presence::Foreground)
    }
}

/// Last known presence of the target surface plus transition timestamps.
///
/// Timestamps are monotonic offsets from the owning process's clock epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceState {
    pub presence: Presence,
    pub last_foreground_at: Option<Duration>,
    pub last_background_at: Option<Duration>,
}

impl PresenceState {
    pub fn is_foreground(&self) -> bool {
        self.presence.is_foreground()
    }
}

impl Default for PresenceState {
    fn default() -> Self {
        Self {
            presence: Presence::Unknown,
            last_foreground_at: None,
            last_background_at: None,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Privileges
// ────────────────────────────────────────────────────────────────────────────

/// One elevated capability requested by the privilege workflow.
///
/// Steps are always evaluated in the order of [`PrivilegeStep::ALL`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PrivilegeStep {
    /// Device-administrator rights; required for surface pinning.
    AdminRights,
    /// Exemption from battery/power optimisation so recovery keeps running.
    PowerExemption,
    /// Permission to draw over other surfaces (unlock challenge overlay).
    OverlayRights,
}

impl PrivilegeStep {
    pub const ALL: [PrivilegeStep; 3] = [
        PrivilegeStep::AdminRights,
        PrivilegeStep::PowerExemption,
        PrivilegeStep::OverlayRights,
    ];

    /// Human-readable name shown in progress dialogs.
    pub fn label(self) -> &'static str {
        match self {
            PrivilegeStep::AdminRights => "Device Administrator",
            PrivilegeStep::PowerExemption => "Battery Optimization",
            PrivilegeStep::OverlayRights => "Overlay Permission",
        }
    }
}

impl fmt::Display for PrivilegeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Grant state of a single [`PrivilegeStep`] within one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GrantState {
    Granted,
    Denied,
    Pending,
}

/// Emitted before the user-facing acquisition flow of a step starts.
///
/// `index` is 1-based so it can be shown directly as "step 2 of 3".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepProgress {
    pub index: usize,
    pub total: usize,
    pub step: PrivilegeStep,
}

/// Terminal result of a privilege workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GateOutcome {
    AllGranted,
    /// The listed steps were denied, skipped or could not be verified.
    PartiallyGranted(Vec<PrivilegeStep>),
}

impl GateOutcome {
    /// Build an outcome from the denied steps; empty means everything granted.
    pub fn from_denied(denied: Vec<PrivilegeStep>) -> Self {
        if denied.is_empty() {
            GateOutcome::AllGranted
        } else {
            GateOutcome::PartiallyGranted(denied)
        }
    }

    pub fn denied(&self) -> &[PrivilegeStep] {
        match self {
            GateOutcome::AllGranted => &[],
            GateOutcome::PartiallyGranted(steps) => steps,
        }
    }

    /// The enforcement level a caller may apply given this outcome.
    pub fn enforcement(&self) -> EnforcementMode {
        let denied = self.denied();
        if denied.is_empty() {
            EnforcementMode::Full
        } else if denied.contains(&PrivilegeStep::AdminRights) {
            EnforcementMode::Unenforced
        } else {
            EnforcementMode::Reduced
        }
    }
}

/// How much enforcement the watchdog applies after the privilege gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnforcementMode {
    /// Every privilege granted: pinning plus full presence recovery.
    Full,
    /// Admin rights granted but auxiliary rights missing: pinning is still
    /// attempted, recovery may be throttled by the host.
    Reduced,
    /// Admin rights missing: no pinning, presence recovery only.
    Unenforced,
}

impl EnforcementMode {
    pub fn allows_pinning(self) -> bool {
        !matches!(self, EnforcementMode::Unenforced)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Recovery actions
// ────────────────────────────────────────────────────────────────────────────

/// Task flags attached to a launch request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchFlags {
    pub new_task: bool,
    pub clear_task: bool,
    pub clear_top: bool,
    pub exclude_from_recents: bool,
    pub no_history: bool,
    pub single_top: bool,
    pub bring_to_front: bool,
}

impl LaunchFlags {
    /// Only "new task".
    pub fn minimal() -> Self {
        Self {
            new_task: true,
            ..Self::default()
        }
    }

    /// Plain relaunch: new task, clear top.
    pub fn relaunch() -> Self {
        Self {
            clear_top: true,
            ..Self::minimal()
        }
    }

    /// Cold start from boot: new task, clear task, hidden from recents.
    pub fn cold_start() -> Self {
        Self {
            clear_task: true,
            exclude_from_recents: true,
            ..Self::minimal()
        }
    }

    /// Every foreground-forcing flag.
    pub fn maximal() -> Self {
        Self {
            new_task: true,
            clear_task: true,
            clear_top: true,
            exclude_from_recents: true,
            no_history: true,
            single_top: true,
            bring_to_front: true,
        }
    }

    /// Number of flags set.
    pub fn count(&self) -> usize {
        [
            self.new_task,
            self.clear_task,
            self.clear_top,
            self.exclude_from_recents,
            self.no_history,
            self.single_top,
            self.bring_to_front,
        ]
        .iter()
        .filter(|f| **f)
        .count()
    }
}

/// One recovery action of an escalation plan, ordered by aggressiveness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecoveryAction {
    /// Relaunch with [`LaunchFlags::relaunch`].
    Relaunch,
    /// Relaunch with [`LaunchFlags::cold_start`].
    ColdStart,
    /// Relaunch and post a "tap to open" affordance, for when earlier
    /// relaunches were silently ignored by the platform.
    RelaunchWithAffordance,
    /// Relaunch with [`LaunchFlags::maximal`].
    ForceRelaunch,
    /// Hand off to the backup scheduler with a bounded execution window.
    BackupHandoff { min_delay: Duration, deadline: Duration },
}

impl RecoveryAction {
    pub fn aggressiveness(&self) -> u8 {
        match self {
            RecoveryAction::Relaunch => 0,
            RecoveryAction::ColdStart => 1,
            RecoveryAction::RelaunchWithAffordance => 2,
            RecoveryAction::ForceRelaunch => 3,
            RecoveryAction::BackupHandoff { .. } => 4,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RecoveryAction::Relaunch => "relaunch",
            RecoveryAction::ColdStart => "cold_start",
            RecoveryAction::RelaunchWithAffordance => "relaunch_with_affordance",
            RecoveryAction::ForceRelaunch => "force_relaunch",
            RecoveryAction::BackupHandoff { .. } => "backup_handoff",
        }
    }
}

/// Source that started an escalation run.  At most one run per class is
/// active at a time; runs of different classes may overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TriggerClass {
    Boot,
    /// The independent direct-launch path started alongside the boot profile.
    BootSequence,
    BackgroundTransition,
    Inactivity,
    Poll,
}

impl TriggerClass {
    pub fn label(self) -> &'static str {
        match self {
            TriggerClass::Boot => "boot",
            TriggerClass::BootSequence => "boot_sequence",
            TriggerClass::BackgroundTransition => "background_transition",
            TriggerClass::Inactivity => "inactivity",
            TriggerClass::Poll => "poll",
        }
    }
}

impl fmt::Display for TriggerClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Result of a single escalation step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepOutcome {
    /// The action was handed to the platform and accepted.
    Fired,
    /// The platform refused the action; the run continues.
    Failed(String),
    /// Presence was already restored when the step came due; nothing done.
    Superseded,
    /// The step belonged to a cancelled or finished run.
    Stale,
}

/// Manual-launch affordances the notification surface can present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Affordance {
    /// Persistent "kiosk ready, tap to open" posted at boot.
    BootReady,
    /// Transient "tap to start kiosk mode" posted during escalation.
    TapToOpen,
}

// ────────────────────────────────────────────────────────────────────────────
// Lock mode & unlock input
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockMode {
    Unlocked,
    Pinned,
    /// An admin PIN challenge is open.
    UnlockPending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyCode {
    Menu,
    DpadCenter,
    Enter,
    Other(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyChord {
    pub key: KeyCode,
    pub shift: bool,
    pub alt: bool,
}

impl KeyChord {
    pub fn plain(key: KeyCode) -> Self {
        Self {
            key,
            shift: false,
            alt: false,
        }
    }
}

/// Raw input signals that may form a secret unlock gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputSignal {
    LongPress,
    SecondaryClick,
    Back,
    Key(KeyChord),
}

// ────────────────────────────────────────────────────────────────────────────
// Session
// ────────────────────────────────────────────────────────────────────────────

/// Persisted session settings.  Read-only input to the watchdog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub target_url: String,
    pub heartbeat_interval_secs: u64,
}

impl SessionConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            target_url: "https://www.techstern.com/".to_string(),
            heartbeat_interval_secs: 30,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Event envelope
// ────────────────────────────────────────────────────────────────────────────

/// Diagnostic event published on the watchdog event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KioskEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g., "kiosk-runtime::escalation"
    pub source: String,
    pub payload: EventPayload,
}

impl KioskEvent {
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    PrivilegeProgress(StepProgress),
    PrivilegeDenied(PrivilegeStep),
    PrivilegesSettled(GateOutcome),
    RunStarted {
        run_id: Uuid,
        trigger: TriggerClass,
        steps: usize,
    },
    StepExecuted {
        run_id: Uuid,
        trigger: TriggerClass,
        step_index: usize,
        action: RecoveryAction,
        outcome: StepOutcome,
    },
    RunCancelled {
        run_id: Uuid,
        trigger: TriggerClass,
    },
    PresenceChanged {
        surface: SurfaceId,
        presence: Presence,
    },
    LockModeChanged {
        from: LockMode,
        to: LockMode,
    },
    /// Back-press gesture in progress; `remaining` presses open the challenge.
    UnlockHint {
        remaining: u32,
    },
    CapabilityWarning(String),
    Heartbeat {
        sequence: u64,
    },
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Error taxonomy shared by the watchdog and its platform collaborators.
///
/// A step that fires after presence was restored is not an error; see
/// [`StepOutcome::Superseded`].
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KioskError {
    #[error("Privilege denied: {0}")]
    PrivilegeDenied(PrivilegeStep),

    #[error("Launch rejected: {reason}")]
    LaunchRejected { reason: String },

    #[error("Capability unavailable: {0}")]
    CapabilityUnavailable(String),

    #[error("Backup scheduler rejected handoff: {0}")]
    BackupRejected(String),

    #[error("Invalid escalation plan: {0}")]
    InvalidPlan(String),

    #[error("Privilege gate has not reported a terminal result")]
    GateNotSettled,

    #[error("No unlock challenge is open")]
    NoChallengeOpen,
}
