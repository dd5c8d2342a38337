//! Escalation plans and the [`EscalationScheduler`] that runs them.
//!
//! An [`EscalationPlan`] is an ordered list of recovery actions, each at an
//! absolute offset from the start of the run.  Starting a run hands back one
//! [`StepTimer`] per step; the owner puts them on its timer queue and feeds
//! them back through [`EscalationScheduler::fire`] when they come due.
//!
//! Immediately before a step acts, the scheduler re-checks presence through
//! the [`PresenceTracker`] and the host's task inspector.  If the target is
//! already in front the step is [`StepOutcome::Superseded`].  That check, not
//! the cancel flag, is what keeps overlapping runs (and other watchdog
//! processes) from stacking launches.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use kiosk_runtime::escalation::EscalationPlan;
//!
//! let plan = EscalationPlan::boot();
//! assert_eq!(plan.steps().len(), 5);
//! assert_eq!(plan.hard_stop(), Duration::from_secs(15));
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use kiosk_platform::Platform;
use kiosk_types::{
    Affordance, KioskError, LaunchFlags, RecoveryAction, StepOutcome, SurfaceId, TriggerClass,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::presence::PresenceTracker;

// ────────────────────────────────────────────────────────────────────────────
// Plans
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanStep {
    /// Offset from the start of the run.
    pub delay: Duration,
    pub action: RecoveryAction,
}

impl PlanStep {
    pub fn new(delay: Duration, action: RecoveryAction) -> Self {
        Self { delay, action }
    }
}

/// Immutable, validated sequence of recovery steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscalationPlan {
    name: &'static str,
    steps: Vec<PlanStep>,
}

impl EscalationPlan {
    /// # Errors
    ///
    /// [`KioskError::InvalidPlan`] when `steps` is empty or the delays are not
    /// strictly increasing.
    pub fn new(name: &'static str, steps: Vec<PlanStep>) -> Result<Self, KioskError> {
        if steps.is_empty() {
            return Err(KioskError::InvalidPlan(format!("{name}: no steps")));
        }
        if let Some(pair) = steps.windows(2).find(|w| w[1].delay <= w[0].delay) {
            return Err(KioskError::InvalidPlan(format!(
                "{name}: delay {:?} does not follow {:?}",
                pair[1].delay, pair[0].delay
            )));
        }
        Ok(Self { name, steps })
    }

    /// Five steps of growing aggressiveness, ending in the backup handoff at
    /// the 15 s hard stop.
    pub fn boot() -> Self {
        let s = Duration::from_secs;
        Self {
            name: "boot",
            steps: vec![
                PlanStep::new(s(1), RecoveryAction::Relaunch),
                PlanStep::new(s(5), RecoveryAction::Relaunch),
                PlanStep::new(s(8), RecoveryAction::RelaunchWithAffordance),
                PlanStep::new(s(12), RecoveryAction::ForceRelaunch),
                PlanStep::new(
                    s(15),
                    RecoveryAction::BackupHandoff {
                        min_delay: s(5),
                        deadline: s(30),
                    },
                ),
            ],
        }
    }

    /// The independent direct-launch path started next to [`boot`][Self::boot].
    pub fn boot_sequence() -> Self {
        let s = Duration::from_secs;
        Self {
            name: "boot_sequence",
            steps: [3, 8, 15, 30, 60]
                .into_iter()
                .map(|at| PlanStep::new(s(at), RecoveryAction::ColdStart))
                .collect(),
        }
    }

    /// One relaunch after `grace`.
    pub fn runtime(grace: Duration) -> Self {
        Self {
            name: "runtime",
            steps: vec![PlanStep::new(grace, RecoveryAction::Relaunch)],
        }
    }

    /// A single step that comes due as soon as the run starts.
    pub fn immediate(action: RecoveryAction) -> Self {
        Self {
            name: "immediate",
            steps: vec![PlanStep::new(Duration::ZERO, action)],
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn steps(&self) -> &[PlanStep] {
        &self.steps
    }

    /// Offset of the last step.
    pub fn hard_stop(&self) -> Duration {
        self.steps.last().map(|s| s.delay).unwrap_or_default()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Runs
// ────────────────────────────────────────────────────────────────────────────

/// A live execution of a plan.
#[derive(Debug, Clone)]
pub struct EscalationRun {
    pub id: Uuid,
    pub trigger: TriggerClass,
    pub plan: Arc<EscalationPlan>,
    pub started_at: Duration,
    pub next_step_index: usize,
    pub cancelled: bool,
}

/// Deferred check for one step of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepTimer {
    pub run_id: Uuid,
    pub trigger: TriggerClass,
    pub index: usize,
    pub action: RecoveryAction,
}

/// A freshly started run and the timers its owner must schedule.
#[derive(Debug, Clone)]
pub struct StartedRun {
    pub run_id: Uuid,
    /// `(absolute deadline, timer)` pairs, in plan order.
    pub timers: Vec<(Duration, StepTimer)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    pub timer: StepTimer,
    pub outcome: StepOutcome,
}

// ────────────────────────────────────────────────────────────────────────────
// Scheduler
// ────────────────────────────────────────────────────────────────────────────

/// Holds at most one active run per [`TriggerClass`].
#[derive(Debug, Default)]
pub struct EscalationScheduler {
    runs: HashMap<TriggerClass, EscalationRun>,
}

impl EscalationScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self, trigger: TriggerClass) -> bool {
        self.runs.contains_key(&trigger)
    }

    pub fn run(&self, trigger: TriggerClass) -> Option<&EscalationRun> {
        self.runs.get(&trigger)
    }

    pub fn active_triggers(&self) -> Vec<TriggerClass> {
        let mut triggers: Vec<_> = self.runs.keys().copied().collect();
        triggers.sort_by_key(|t| t.label());
        triggers
    }

    /// Start `plan` for `trigger` at `now`.
    ///
    /// Returns `None` when a run of the same class is already active.
    pub fn start(
        &mut self,
        trigger: TriggerClass,
        plan: Arc<EscalationPlan>,
        now: Duration,
    ) -> Option<StartedRun> {
        if self.runs.contains_key(&trigger) {
            debug!(%trigger, "run already active; not restarting");
            return None;
        }
        let run_id = Uuid::new_v4();
        let timers = plan
            .steps()
            .iter()
            .enumerate()
            .map(|(index, step)| {
                (
                    now.saturating_add(step.delay),
                    StepTimer {
                        run_id,
                        trigger,
                        index,
                        action: step.action,
                    },
                )
            })
            .collect();
        info!(%trigger, %run_id, plan = plan.name(), steps = plan.steps().len(), "escalation run started");
        self.runs.insert(
            trigger,
            EscalationRun {
                id: run_id,
                trigger,
                plan,
                started_at: now,
                next_step_index: 0,
                cancelled: false,
            },
        );
        Some(StartedRun { run_id, timers })
    }

    /// Cancel the active run of `trigger`, returning it marked `cancelled`.
    ///
    /// Removal from the scheduler is the cancellation: its outstanding timers
    /// find no matching run and report [`StepOutcome::Stale`].
    pub fn cancel(&mut self, trigger: TriggerClass) -> Option<EscalationRun> {
        let mut run = self.runs.remove(&trigger)?;
        run.cancelled = true;
        info!(%trigger, run_id = %run.id, "escalation run cancelled");
        Some(run)
    }

    /// Handle a due step.
    pub fn fire(
        &mut self,
        timer: StepTimer,
        presence: &PresenceTracker,
        platform: &Platform,
    ) -> StepReport {
        let report = |outcome| StepReport { timer, outcome };

        // A cancelled run is no longer in the map; a new run of the same
        // class has a different id.
        let Some(run) = self
            .runs
            .get_mut(&timer.trigger)
            .filter(|run| run.id == timer.run_id)
        else {
            return report(StepOutcome::Stale);
        };
        run.next_step_index = timer.index + 1;
        let finished = run.next_step_index >= run.plan.steps().len();
        if finished {
            self.runs.remove(&timer.trigger);
        }

        if presence.is_target_foreground(platform.inspector.as_ref()) {
            debug!(trigger = %timer.trigger, step = timer.index, "target already in front; step superseded");
            return report(StepOutcome::Superseded);
        }

        let outcome = match perform(timer.action, presence.target(), platform) {
            Ok(()) => StepOutcome::Fired,
            Err(err) => {
                warn!(
                    trigger = %timer.trigger,
                    step = timer.index,
                    action = timer.action.label(),
                    %err,
                    "recovery step failed; run continues"
                );
                StepOutcome::Failed(err.to_string())
            }
        };
        info!(
            trigger = %timer.trigger,
            step = timer.index,
            action = timer.action.label(),
            ?outcome,
            "recovery step executed"
        );
        report(outcome)
    }
}

/// Carry out one recovery action against the host.
pub fn perform(
    action: RecoveryAction,
    target: &SurfaceId,
    platform: &Platform,
) -> Result<(), KioskError> {
    match action {
        RecoveryAction::Relaunch => platform.launcher.launch(target, LaunchFlags::relaunch()),
        RecoveryAction::ColdStart => platform.launcher.launch(target, LaunchFlags::cold_start()),
        RecoveryAction::RelaunchWithAffordance => {
            platform.notifier.post(Affordance::TapToOpen);
            platform.launcher.launch(target, LaunchFlags::relaunch())
        }
        RecoveryAction::ForceRelaunch => platform
            .launcher
            .launch(target, LaunchFlags::maximal())
            .inspect_err(|_| platform.notifier.post(Affordance::TapToOpen)),
        RecoveryAction::BackupHandoff {
            min_delay,
            deadline,
        } => platform.backup.schedule(min_delay, deadline),
    }
}
