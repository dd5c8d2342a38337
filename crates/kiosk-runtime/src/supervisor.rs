//! [`Supervisor`] – the watchdog context object.
//!
//! One `Supervisor` owns everything a watchdog process needs: the presence
//! tracker, the escalation scheduler, the transition watchdog, the inactivity
//! monitor, the presence poller, the lock state machine, the privilege gate
//! and a single [`TimerQueue`].  Host events come in through the `on_*`
//! methods; deferred work runs when the owner calls
//! [`poll_timers`][Supervisor::poll_timers].  Nothing is global, so several
//! supervisors (one per host process) can run side by side against the same
//! device and deduplicate only through the host's task inspector.
//!
//! The supervisor is synchronous.  [`crate::driver`] wraps it in a tokio
//! task; tests drive it directly with a [`ManualClock`][crate::clock::ManualClock].

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::BoxStream;
use kiosk_kernel::{
    AdminPin, ChallengeRequest, GateConfig, GateEvent, GestureVerdict, LockStateMachine,
    PinVerdict, PrivilegeGate, UnlockGestureDetector,
};
use kiosk_middleware::EventBus;
use kiosk_platform::Platform;
use kiosk_types::{
    Affordance, EnforcementMode, EventPayload, GateOutcome, InputSignal, KioskError, KioskEvent,
    LockMode, PresenceState, RecoveryAction, StepOutcome, SurfaceId, TriggerClass,
};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::escalation::{self, EscalationPlan, EscalationScheduler, StepTimer};
use crate::inactivity::{Countdown, InactivityMonitor};
use crate::poller::{PollConfig, PollDecision, PresencePoller};
use crate::presence::PresenceTracker;
use crate::timer::{TimerHandle, TimerQueue};
use crate::transition::{TransitionDecision, TransitionWatchdog};

const SRC_ESCALATION: &str = "kiosk-runtime::escalation";
const SRC_PRESENCE: &str = "kiosk-runtime::presence";
const SRC_LOCK: &str = "kiosk-runtime::lock";
const SRC_PRIVILEGES: &str = "kiosk-runtime::privileges";
const SRC_HEARTBEAT: &str = "kiosk-runtime::heartbeat";

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

/// Timing tunables and secrets for one supervisor.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub target: SurfaceId,
    /// Delay of the single relaunch after the target is backgrounded.
    pub background_grace: Duration,
    pub inactivity_timeout: Duration,
    /// Also start the cold-start boot sequence next to the boot profile.
    pub redundant_boot_sequence: bool,
    /// Delay before re-engaging pinning once the target regains focus.
    pub repin_delay: Duration,
    pub poll: PollConfig,
    pub gate: GateConfig,
    pub admin_pin: AdminPin,
    pub unlock_presses: u32,
    pub unlock_press_timeout: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            target: SurfaceId::from("com.example.kiosk"),
            background_grace: Duration::from_secs(30),
            inactivity_timeout: Duration::from_secs(30),
            redundant_boot_sequence: true,
            repin_delay: Duration::from_secs(1),
            poll: PollConfig::default(),
            gate: GateConfig::default(),
            admin_pin: AdminPin::default(),
            unlock_presses: 5,
            unlock_press_timeout: Duration::from_secs(2),
        }
    }
}

/// Point-in-time view for shells and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorStatus {
    pub now: Duration,
    pub presence: PresenceState,
    pub lock_mode: LockMode,
    pub gate: Option<GateOutcome>,
    pub enforcement: Option<EnforcementMode>,
    pub active_runs: Vec<TriggerClass>,
    pub awake: bool,
    pub inactivity_armed: bool,
    pub polling: bool,
    pub poll_checks: u32,
    pub heartbeats: u64,
    pub pending_timers: usize,
    pub next_deadline: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerToken {
    Step(StepTimer),
    Inactivity(u64),
    Poll(u64),
    Heartbeat,
    Repin,
}

// ────────────────────────────────────────────────────────────────────────────
// Supervisor
// ────────────────────────────────────────────────────────────────────────────

pub struct Supervisor {
    config: SupervisorConfig,
    platform: Platform,
    clock: Arc<dyn Clock>,
    bus: EventBus,
    timers: TimerQueue<TimerToken>,

    tracker: PresenceTracker,
    scheduler: EscalationScheduler,
    transitions: TransitionWatchdog,
    inactivity: InactivityMonitor,
    inactivity_timer: Option<TimerHandle>,
    poller: PresencePoller,

    gate: PrivilegeGate,
    gate_outcome: Option<GateOutcome>,
    lock: LockStateMachine,
    gesture: UnlockGestureDetector,
    pin_warning_shown: bool,
    repin_timer: Option<TimerHandle>,

    heartbeats: u64,
    heartbeat_timer: Option<TimerHandle>,

    boot_plan: Arc<EscalationPlan>,
    boot_sequence_plan: Arc<EscalationPlan>,
    runtime_plan: Arc<EscalationPlan>,
    immediate_plan: Arc<EscalationPlan>,
}

impl Supervisor {
    pub fn new(
        config: SupervisorConfig,
        platform: Platform,
        clock: Arc<dyn Clock>,
        bus: EventBus,
    ) -> Self {
        let gate = PrivilegeGate::new(Arc::clone(&platform.privileges), config.gate);
        Self {
            tracker: PresenceTracker::new(config.target.clone()),
            scheduler: EscalationScheduler::new(),
            transitions: TransitionWatchdog::new(),
            inactivity: InactivityMonitor::new(config.inactivity_timeout),
            inactivity_timer: None,
            poller: PresencePoller::new(config.poll),
            gate,
            gate_outcome: None,
            lock: LockStateMachine::new(config.admin_pin.clone()),
            gesture: UnlockGestureDetector::new(config.unlock_presses, config.unlock_press_timeout),
            pin_warning_shown: false,
            repin_timer: None,
            heartbeats: 0,
            heartbeat_timer: None,
            boot_plan: Arc::new(EscalationPlan::boot()),
            boot_sequence_plan: Arc::new(EscalationPlan::boot_sequence()),
            runtime_plan: Arc::new(EscalationPlan::runtime(config.background_grace)),
            immediate_plan: Arc::new(EscalationPlan::immediate(RecoveryAction::Relaunch)),
            timers: TimerQueue::new(),
            config,
            platform,
            clock,
            bus,
        }
    }

    // ── Host events ──────────────────────────────────────────────────────────

    /// Device finished booting.
    ///
    /// Posts the persistent boot affordance, settles the privilege gate
    /// non-interactively if nobody has run it yet, and starts the boot
    /// profile, the optional boot sequence, the presence poller and the
    /// heartbeat.
    pub fn on_boot(&mut self) {
        info!(target_surface = %self.config.target, "boot received");
        self.platform.notifier.post(Affordance::BootReady);

        if self.gate_outcome.is_none() {
            let outcome = self.gate.assess();
            self.apply_gate_outcome(outcome);
        }

        self.start_run(TriggerClass::Boot, Arc::clone(&self.boot_plan));
        if self.config.redundant_boot_sequence {
            self.start_run(TriggerClass::BootSequence, Arc::clone(&self.boot_sequence_plan));
        }

        if let Some((generation, first)) = self.poller.start() {
            let now = self.clock.now();
            self.timers.after(now, first, TimerToken::Poll(generation));
        }
        self.start_heartbeat();
    }

    /// The host reports that `surface` is now in front.
    pub fn on_focus_changed(&mut self, surface: impl Into<SurfaceId>) {
        let surface = surface.into();
        let now = self.clock.now();
        if let Some(presence) = self.tracker.observe_focus(&surface, now) {
            self.emit(
                SRC_PRESENCE,
                EventPayload::PresenceChanged {
                    surface: self.config.target.clone(),
                    presence,
                },
            );
        }

        let is_target = surface == self.config.target;
        match self.transitions.on_focus(is_target) {
            TransitionDecision::StartRecovery => {
                debug!(%surface, "target backgrounded");
                self.start_run(TriggerClass::BackgroundTransition, Arc::clone(&self.runtime_plan));
            }
            TransitionDecision::CancelRecovery => {
                self.cancel_run(TriggerClass::BackgroundTransition);
            }
            TransitionDecision::NoChange => {}
        }

        if is_target {
            self.schedule_repin(self.config.repin_delay);
        }
    }

    /// Any touch or key press.
    ///
    /// Restarts the inactivity countdown and, while the kiosk is unlocked,
    /// the idle re-lock: an unlocked target left alone in front pins itself
    /// again after `inactivity_timeout`.
    pub fn on_user_interaction(&mut self) {
        if let Some(countdown) = self.inactivity.on_interaction() {
            self.arm_inactivity(countdown);
        }
        self.schedule_repin(self.config.inactivity_timeout);
    }

    pub fn on_screen_off(&mut self) {
        self.inactivity.on_screen_off();
        if let Some(handle) = self.inactivity_timer.take() {
            self.timers.cancel(handle);
        }
    }

    pub fn on_screen_on(&mut self) {
        let foreground = self.target_foreground();
        if let Some(countdown) = self.inactivity.on_screen_on(foreground) {
            self.arm_inactivity(countdown);
        }
    }

    /// The user dismissed the keyguard.
    pub fn on_user_present(&mut self) {
        self.on_screen_on();
    }

    /// Feed a raw input signal to the unlock-gesture detector.
    pub fn on_input_signal(&mut self, signal: InputSignal) -> GestureVerdict {
        let verdict = self.gesture.observe(signal, self.clock.now());
        match verdict {
            GestureVerdict::Unlock => {
                self.on_unlock_gesture_detected();
            }
            GestureVerdict::Pending { remaining } if self.lock.mode() == LockMode::Pinned => {
                let noun = if remaining == 1 { "time" } else { "times" };
                self.platform
                    .notifier
                    .warn(&format!("Press back {remaining} more {noun} to unlock"));
                self.emit(SRC_LOCK, EventPayload::UnlockHint { remaining });
            }
            GestureVerdict::Pending { .. } | GestureVerdict::Ignored => {}
        }
        verdict
    }

    /// Open the admin PIN challenge.
    pub fn on_unlock_gesture_detected(&mut self) -> ChallengeRequest {
        let before = self.lock.mode();
        let request = self.lock.request_unlock();
        if request == ChallengeRequest::NotPinned {
            debug!("unlock gesture while not pinned; ignored");
        }
        self.lock_changed(before);
        request
    }

    /// # Errors
    ///
    /// [`KioskError::NoChallengeOpen`] when no challenge is open.
    pub fn on_pin_entered(&mut self, pin: &str) -> Result<PinVerdict, KioskError> {
        let before = self.lock.mode();
        let verdict = self
            .lock
            .submit_pin_and_release(pin, self.platform.pinning.as_ref())?;
        if verdict == PinVerdict::Accepted
            && let Some(handle) = self.repin_timer.take()
        {
            self.timers.cancel(handle);
        }
        self.lock_changed(before);
        Ok(verdict)
    }

    /// # Errors
    ///
    /// [`KioskError::NoChallengeOpen`] when no challenge is open.
    pub fn on_challenge_cancelled(&mut self) -> Result<(), KioskError> {
        let before = self.lock.mode();
        self.lock.cancel_challenge()?;
        self.lock_changed(before);
        Ok(())
    }

    /// Entry point for the backup job handed off at the end of the boot
    /// profile.  One cold-start launch under the pre-fire presence check.
    pub fn on_backup_job_fired(&mut self) -> StepOutcome {
        if self.target_foreground() {
            debug!("backup job: target already in front");
            return StepOutcome::Superseded;
        }
        match escalation::perform(
            RecoveryAction::ColdStart,
            &self.config.target,
            &self.platform,
        ) {
            Ok(()) => {
                info!("backup job relaunched target");
                StepOutcome::Fired
            }
            Err(err) => {
                warn!(%err, "backup job launch failed");
                StepOutcome::Failed(err.to_string())
            }
        }
    }

    // ── Privileges & pinning ─────────────────────────────────────────────────

    /// Interactive privilege workflow.  Feed every item back through
    /// [`record_gate_event`][Self::record_gate_event].
    pub fn request_privileges(&self) -> BoxStream<'static, GateEvent> {
        self.gate.request_all()
    }

    pub fn record_gate_event(&mut self, event: &GateEvent) {
        match event {
            GateEvent::Progress(progress) => {
                info!(step = %progress.step, index = progress.index, total = progress.total, "requesting privilege");
                self.emit(SRC_PRIVILEGES, EventPayload::PrivilegeProgress(*progress));
            }
            GateEvent::Denied(step) => {
                self.platform
                    .notifier
                    .warn(&format!("Permission denied: {step}"));
                self.emit(SRC_PRIVILEGES, EventPayload::PrivilegeDenied(*step));
            }
            GateEvent::Finished(outcome) => self.apply_gate_outcome(outcome.clone()),
        }
    }

    /// Record the gate's terminal result and pin if the target is in front.
    pub fn apply_gate_outcome(&mut self, outcome: GateOutcome) {
        let enforcement = outcome.enforcement();
        match enforcement {
            EnforcementMode::Full => info!("all privileges granted; full enforcement"),
            EnforcementMode::Reduced => {
                warn!(denied = ?outcome.denied(), "reduced enforcement");
                self.capability_warning("Some permissions are missing; kiosk mode may be interrupted");
            }
            EnforcementMode::Unenforced => {
                warn!("admin rights missing; presence recovery only");
                self.capability_warning("Device admin not granted; kiosk mode cannot be locked");
            }
        }
        self.emit(SRC_PRIVILEGES, EventPayload::PrivilegesSettled(outcome.clone()));
        self.gate_outcome = Some(outcome);
        self.pin_warning_shown = false;

        if self.target_foreground() && self.lock.mode() == LockMode::Unlocked {
            // Errors are surfaced by enter_pinned itself.
            let _ = self.enter_pinned();
        }
    }

    /// # Errors
    ///
    /// [`KioskError::GateNotSettled`] before the gate reports, or
    /// [`KioskError::CapabilityUnavailable`] when pinning is not permitted.
    pub fn enter_pinned(&mut self) -> Result<LockMode, KioskError> {
        let before = self.lock.mode();
        let result = self
            .lock
            .enter_pinned(self.gate_outcome.as_ref(), self.platform.pinning.as_ref());
        match &result {
            Ok(_) => self.lock_changed(before),
            Err(KioskError::CapabilityUnavailable(detail)) => {
                if !self.pin_warning_shown {
                    self.pin_warning_shown = true;
                    self.capability_warning(detail);
                }
            }
            Err(err) => debug!(%err, "pinning deferred"),
        }
        result
    }

    // ── Timers ───────────────────────────────────────────────────────────────

    /// Run everything that is due, including zero-delay follow-ups scheduled
    /// by what just ran.  Returns the number of timers dispatched.
    pub fn poll_timers(&mut self) -> usize {
        let mut dispatched = 0;
        while let Some((_, token)) = self.timers.pop_due(self.clock.now()) {
            dispatched += 1;
            self.dispatch(token);
        }
        dispatched
    }

    pub fn next_deadline(&self) -> Option<Duration> {
        self.timers.next_deadline()
    }

    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    fn dispatch(&mut self, token: TimerToken) {
        match token {
            TimerToken::Step(step) => self.fire_step(step),
            TimerToken::Inactivity(generation) => {
                self.inactivity_timer = None;
                let foreground = self.target_foreground();
                if self.inactivity.on_timeout(generation, foreground) {
                    info!(timeout_secs = self.config.inactivity_timeout.as_secs(), "inactivity timeout");
                    self.start_run(TriggerClass::Inactivity, Arc::clone(&self.immediate_plan));
                }
            }
            TimerToken::Poll(generation) => self.poll_presence(generation),
            TimerToken::Heartbeat => {
                self.heartbeat_timer = None;
                self.heartbeats += 1;
                debug!(sequence = self.heartbeats, url = %self.platform.session.target_url(), "heartbeat");
                self.emit(
                    SRC_HEARTBEAT,
                    EventPayload::Heartbeat {
                        sequence: self.heartbeats,
                    },
                );
                self.start_heartbeat();
            }
            TimerToken::Repin => {
                self.repin_timer = None;
                if self.target_foreground() && self.lock.mode() == LockMode::Unlocked {
                    let _ = self.enter_pinned();
                }
            }
        }
    }

    fn fire_step(&mut self, timer: StepTimer) {
        let report = self.scheduler.fire(timer, &self.tracker, &self.platform);
        if report.outcome == StepOutcome::Stale {
            debug!(trigger = %timer.trigger, step = timer.index, "stale step ignored");
            return;
        }
        self.emit(
            SRC_ESCALATION,
            EventPayload::StepExecuted {
                run_id: timer.run_id,
                trigger: timer.trigger,
                step_index: timer.index,
                action: timer.action,
                outcome: report.outcome,
            },
        );
    }

    fn poll_presence(&mut self, generation: u64) {
        let foreground = self.target_foreground();
        match self.poller.on_tick(generation, foreground) {
            PollDecision::Confirmed => {
                info!(checks = self.poller.checks(), "presence confirmed; poller stopped");
                self.platform.notifier.clear(Affordance::BootReady);
            }
            PollDecision::Relaunch { next } => {
                debug!(check = self.poller.checks(), "poll found target missing");
                self.start_run(TriggerClass::Poll, Arc::clone(&self.immediate_plan));
                match next {
                    Some(delay) => {
                        let now = self.clock.now();
                        self.timers.after(now, delay, TimerToken::Poll(generation));
                    }
                    None => warn!(checks = self.poller.checks(), "presence poller exhausted"),
                }
            }
            PollDecision::Ignore => {}
        }
    }

    fn start_run(&mut self, trigger: TriggerClass, plan: Arc<EscalationPlan>) -> bool {
        let now = self.clock.now();
        let Some(started) = self.scheduler.start(trigger, plan, now) else {
            return false;
        };
        let steps = started.timers.len();
        for (deadline, timer) in started.timers {
            self.timers.at(deadline, TimerToken::Step(timer));
        }
        self.emit(
            SRC_ESCALATION,
            EventPayload::RunStarted {
                run_id: started.run_id,
                trigger,
                steps,
            },
        );
        true
    }

    fn cancel_run(&mut self, trigger: TriggerClass) {
        if let Some(run) = self.scheduler.cancel(trigger) {
            self.emit(
                SRC_ESCALATION,
                EventPayload::RunCancelled {
                    run_id: run.id,
                    trigger,
                },
            );
        }
    }

    fn arm_inactivity(&mut self, countdown: Countdown) {
        if let Some(handle) = self.inactivity_timer.take() {
            self.timers.cancel(handle);
        }
        let now = self.clock.now();
        self.inactivity_timer = Some(self.timers.after(
            now,
            countdown.timeout,
            TimerToken::Inactivity(countdown.generation),
        ));
    }

    /// (Re)arm the single re-pin timer `delay` from now.  Only meaningful
    /// once the gate has settled and nothing is pinned.
    fn schedule_repin(&mut self, delay: Duration) {
        if self.gate_outcome.is_none() || self.lock.mode() != LockMode::Unlocked {
            return;
        }
        if let Some(handle) = self.repin_timer.take() {
            self.timers.cancel(handle);
        }
        let now = self.clock.now();
        self.repin_timer = Some(self.timers.after(now, delay, TimerToken::Repin));
    }

    fn start_heartbeat(&mut self) {
        let interval = self.platform.session.heartbeat_interval();
        if interval.is_zero() {
            return;
        }
        if let Some(handle) = self.heartbeat_timer.take() {
            self.timers.cancel(handle);
        }
        let now = self.clock.now();
        self.heartbeat_timer = Some(self.timers.after(now, interval, TimerToken::Heartbeat));
    }

    // ── Helpers ──────────────────────────────────────────────────────────────

    fn target_foreground(&self) -> bool {
        self.tracker
            .is_target_foreground(self.platform.inspector.as_ref())
    }

    fn lock_changed(&mut self, before: LockMode) {
        let after = self.lock.mode();
        if before != after {
            self.emit(SRC_LOCK, EventPayload::LockModeChanged { from: before, to: after });
        }
    }

    fn capability_warning(&self, message: &str) {
        self.platform.notifier.warn(message);
        self.emit(
            SRC_PRIVILEGES,
            EventPayload::CapabilityWarning(message.to_string()),
        );
    }

    fn emit(&self, source: &'static str, payload: EventPayload) {
        self.bus.publish(KioskEvent::new(source, payload));
    }

    // ── Queries ──────────────────────────────────────────────────────────────

    pub fn target(&self) -> &SurfaceId {
        &self.config.target
    }

    pub fn lock_mode(&self) -> LockMode {
        self.lock.mode()
    }

    pub fn gate_outcome(&self) -> Option<&GateOutcome> {
        self.gate_outcome.as_ref()
    }

    pub fn presence(&self) -> &PresenceState {
        self.tracker.state()
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn status(&self) -> SupervisorStatus {
        SupervisorStatus {
            now: self.clock.now(),
            presence: self.tracker.state().clone(),
            lock_mode: self.lock.mode(),
            gate: self.gate_outcome.clone(),
            enforcement: self.gate_outcome.as_ref().map(GateOutcome::enforcement),
            active_runs: self.scheduler.active_triggers(),
            awake: self.inactivity.is_awake(),
            inactivity_armed: self.inactivity.is_armed(),
            polling: self.poller.is_active(),
            poll_checks: self.poller.checks(),
            heartbeats: self.heartbeats,
            pending_timers: self.timers.len(),
            next_deadline: self.timers.next_deadline(),
        }
    }
}
