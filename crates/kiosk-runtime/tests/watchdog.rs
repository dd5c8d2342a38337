//! End-to-end watchdog behaviour through the `Supervisor` surface, on a
//! simulated device and a hand-driven clock.

use std::sync::Arc;
use std::time::Duration;

use kiosk_middleware::{EventBus, Topic};
use kiosk_platform::SimDevice;
use kiosk_types::{
    Affordance, EventPayload, GateOutcome, InputSignal, LockMode, RecoveryAction, StepOutcome,
    TriggerClass,
};
use kiosk_runtime::{ManualClock, PollConfig, Supervisor, SupervisorConfig};

const TARGET: &str = "com.example.kiosk";
const HOME: &str = "com.android.launcher";

struct Rig {
    device: Arc<SimDevice>,
    clock: Arc<ManualClock>,
    bus: EventBus,
    supervisor: Supervisor,
}

impl Rig {
    fn new(config: SupervisorConfig) -> Self {
        let device = SimDevice::new(TARGET);
        device.set_foreground(HOME);
        Self::on_device(device, config)
    }

    fn on_device(device: Arc<SimDevice>, config: SupervisorConfig) -> Self {
        let clock = Arc::new(ManualClock::new());
        let bus = EventBus::default();
        let supervisor = Supervisor::new(config, device.platform(), clock.clone(), bus.clone());
        Self {
            device,
            clock,
            bus,
            supervisor,
        }
    }

    /// Advance to `at`, stopping at every deadline on the way.
    fn run_until(&mut self, at: Duration) {
        while let Some(next) = self.supervisor.next_deadline() {
            if next > at {
                break;
            }
            self.clock.set(next);
            self.supervisor.poll_timers();
        }
        self.clock.set(at);
        self.supervisor.poll_timers();
    }
}

fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}

fn no_redundancy() -> SupervisorConfig {
    SupervisorConfig {
        redundant_boot_sequence: false,
        ..SupervisorConfig::default()
    }
}

fn drain_steps(rx: &mut kiosk_middleware::TopicReceiver) -> Vec<(TriggerClass, RecoveryAction, StepOutcome)> {
    let mut steps = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let EventPayload::StepExecuted {
            trigger,
            action,
            outcome,
            ..
        } = event.payload
        {
            steps.push((trigger, action, outcome));
        }
    }
    steps
}

// ── Idempotence ─────────────────────────────────────────────────────────────

#[test]
fn overlapping_runs_do_not_duplicate_the_target_task() {
    let mut rig = Rig::new(SupervisorConfig::default());
    rig.supervisor.on_boot();
    rig.run_until(secs(90));

    // Only the very first step finds the target missing.
    assert_eq!(rig.device.launch_count(), 1);
    assert!(rig.device.target_in_front());
    assert_eq!(rig.device.task_count(), 2);
    assert!(rig.device.backup_requests().is_empty());
}

#[test]
fn independent_supervisors_dedup_through_the_host() {
    let device = SimDevice::new(TARGET);
    device.set_foreground(HOME);
    let mut boot_process = Rig::on_device(device.clone(), no_redundancy());
    let mut service_process = Rig::on_device(device.clone(), no_redundancy());

    boot_process.supervisor.on_boot();
    service_process.supervisor.on_boot();
    boot_process.run_until(secs(1));
    service_process.run_until(secs(1));

    assert_eq!(device.launch_count(), 1);
    assert!(device.target_in_front());
}

// ── Dedup under concurrency ─────────────────────────────────────────────────

#[test]
fn presence_restored_mid_run_skips_every_remaining_step() {
    let mut rig = Rig::new(SupervisorConfig::default());
    let mut recovery = rig.bus.subscribe_to(Topic::Recovery);
    rig.supervisor.on_boot();

    rig.run_until(Duration::from_millis(500));
    rig.device.set_foreground(TARGET);
    rig.run_until(secs(61));

    assert_eq!(rig.device.launch_count(), 0);
    assert!(rig.device.backup_requests().is_empty());
    let steps = drain_steps(&mut recovery);
    assert_eq!(steps.len(), 10);
    assert!(steps.iter().all(|(_, _, o)| *o == StepOutcome::Superseded));
}

#[test]
fn unknown_presence_is_treated_as_missing() {
    let mut rig = Rig::new(no_redundancy());
    rig.device.set_inspector_available(false);
    rig.device.ignore_launches(true);
    rig.supervisor.on_boot();
    rig.run_until(secs(1));
    assert_eq!(rig.device.launch_count(), 1);

    // With no inspector, the last focus event decides.
    rig.supervisor.on_focus_changed(TARGET);
    rig.run_until(secs(20));
    assert_eq!(rig.device.launch_count(), 1);
}

// ── Cancellation ────────────────────────────────────────────────────────────

#[test]
fn quick_return_cancels_background_recovery() {
    let mut rig = Rig::new(no_redundancy());
    let mut recovery = rig.bus.subscribe_to(Topic::Recovery);

    rig.supervisor.on_focus_changed(HOME);
    rig.run_until(secs(10));
    rig.supervisor.on_focus_changed(TARGET);
    rig.run_until(secs(120));

    assert_eq!(rig.device.launch_count(), 0);
    let mut saw_start = false;
    let mut saw_cancel = false;
    while let Ok(event) = recovery.try_recv() {
        match event.payload {
            EventPayload::RunStarted { trigger, .. } => {
                saw_start |= trigger == TriggerClass::BackgroundTransition
            }
            EventPayload::RunCancelled { trigger, .. } => {
                saw_cancel |= trigger == TriggerClass::BackgroundTransition
            }
            EventPayload::StepExecuted { .. } => panic!("no step may fire"),
            _ => {}
        }
    }
    assert!(saw_start && saw_cancel);
}

#[test]
fn repeated_background_events_keep_one_timer() {
    let mut rig = Rig::new(no_redundancy());
    rig.supervisor.on_focus_changed(HOME);
    rig.run_until(secs(20));
    rig.supervisor.on_focus_changed("com.android.settings");
    rig.run_until(secs(30));

    // Fires at 30 s from the first event, not 30 s from the last one.
    assert_eq!(rig.device.launch_count(), 1);
    assert!(rig.device.target_in_front());
    assert!(rig.supervisor.status().active_runs.is_empty());
}

// ── Escalation ordering ─────────────────────────────────────────────────────

#[test]
fn boot_escalation_is_monotonic_and_ends_in_backup() {
    let mut rig = Rig::new(no_redundancy());
    rig.device.ignore_launches(true);
    let mut recovery = rig.bus.subscribe_to(Topic::Recovery);
    rig.supervisor.on_boot();

    rig.run_until(Duration::from_millis(14_999));
    assert!(rig.device.backup_requests().is_empty());
    rig.run_until(secs(15));
    assert_eq!(rig.device.backup_requests(), vec![(secs(5), secs(30))]);

    let boot_steps: Vec<_> = drain_steps(&mut recovery)
        .into_iter()
        .filter(|(trigger, _, _)| *trigger == TriggerClass::Boot)
        .collect();
    assert_eq!(boot_steps.len(), 5);
    let levels: Vec<u8> = boot_steps.iter().map(|(_, a, _)| a.aggressiveness()).collect();
    assert!(levels.windows(2).all(|w| w[0] <= w[1]));
    assert!(matches!(
        boot_steps.last().map(|(_, a, _)| *a),
        Some(RecoveryAction::BackupHandoff { .. })
    ));
    assert!(rig.device.is_affordance_active(Affordance::TapToOpen));
}

#[test]
fn rejected_launches_do_not_stop_the_run() {
    let mut rig = Rig::new(no_redundancy());
    rig.device.reject_launches(true);
    let mut recovery = rig.bus.subscribe_to(Topic::Recovery);
    rig.supervisor.on_boot();
    rig.run_until(secs(15));

    let outcomes: Vec<StepOutcome> = drain_steps(&mut recovery)
        .into_iter()
        .map(|(_, _, outcome)| outcome)
        .collect();
    assert_eq!(outcomes.len(), 5);
    assert!(outcomes[..4].iter().all(|o| matches!(o, StepOutcome::Failed(_))));
    assert_eq!(outcomes[4], StepOutcome::Fired);
}

// ── Inactivity ──────────────────────────────────────────────────────────────

#[test]
fn inactivity_timeout_relaunches() {
    let mut rig = Rig::new(no_redundancy());
    rig.supervisor.on_user_interaction();
    rig.run_until(secs(29));
    assert_eq!(rig.device.launch_count(), 0);
    rig.run_until(secs(30));
    assert_eq!(rig.device.launch_count(), 1);
}

#[test]
fn interaction_postpones_timeout() {
    let mut rig = Rig::new(no_redundancy());
    rig.supervisor.on_user_interaction();
    rig.run_until(secs(20));
    rig.supervisor.on_user_interaction();
    rig.run_until(secs(49));
    assert_eq!(rig.device.launch_count(), 0);
    rig.run_until(secs(50));
    assert_eq!(rig.device.launch_count(), 1);
}

#[test]
fn sleep_suppresses_inactivity_relaunch() {
    let mut rig = Rig::new(no_redundancy());
    rig.supervisor.on_user_interaction();
    rig.supervisor.on_screen_off();
    rig.run_until(secs(300));

    rig.device.set_foreground(TARGET);
    rig.supervisor.on_screen_on();
    rig.run_until(secs(600));

    assert_eq!(rig.device.launch_count(), 0);
    assert!(!rig.supervisor.status().inactivity_armed);
}

#[test]
fn wake_without_target_resumes_monitoring() {
    let mut rig = Rig::new(no_redundancy());
    rig.supervisor.on_screen_off();
    rig.run_until(secs(10));
    rig.supervisor.on_user_present();
    rig.run_until(secs(40));
    assert_eq!(rig.device.launch_count(), 1);
}

// ── Lock & unlock ───────────────────────────────────────────────────────────

fn pinned_rig() -> Rig {
    let mut rig = Rig::new(no_redundancy());
    rig.device.grant_all();
    rig.supervisor.apply_gate_outcome(GateOutcome::AllGranted);
    rig.device.set_foreground(TARGET);
    rig.supervisor.on_focus_changed(TARGET);
    rig.run_until(secs(2));
    assert_eq!(rig.supervisor.lock_mode(), LockMode::Pinned);
    rig
}

fn press_back(rig: &mut Rig, gap: Duration, times: u32) {
    for _ in 0..times {
        rig.clock.advance(gap);
        rig.supervisor.on_input_signal(InputSignal::Back);
    }
}

#[test]
fn back_presses_within_window_open_the_challenge() {
    let mut rig = pinned_rig();
    press_back(&mut rig, Duration::from_millis(1_900), 5);
    assert_eq!(rig.supervisor.lock_mode(), LockMode::UnlockPending);
}

#[test]
fn slow_back_presses_do_not_unlock() {
    let mut rig = pinned_rig();
    press_back(&mut rig, Duration::from_millis(2_100), 5);
    assert_eq!(rig.supervisor.lock_mode(), LockMode::Pinned);
}

#[test]
fn challenge_resolution() {
    let mut rig = pinned_rig();
    let mut lock_events = rig.bus.subscribe_to(Topic::LockMode);

    rig.supervisor.on_input_signal(InputSignal::LongPress);
    rig.supervisor.on_input_signal(InputSignal::SecondaryClick);
    assert_eq!(rig.supervisor.lock_mode(), LockMode::UnlockPending);

    rig.supervisor.on_pin_entered("0000").unwrap();
    assert_eq!(rig.supervisor.lock_mode(), LockMode::Pinned);

    rig.supervisor.on_unlock_gesture_detected();
    rig.supervisor.on_challenge_cancelled().unwrap();
    assert_eq!(rig.supervisor.lock_mode(), LockMode::Pinned);

    rig.supervisor.on_unlock_gesture_detected();
    rig.supervisor.on_pin_entered("1234").unwrap();
    assert_eq!(rig.supervisor.lock_mode(), LockMode::Unlocked);
    assert!(!rig.device.is_pinned());

    let mut transitions = Vec::new();
    while let Ok(event) = lock_events.try_recv() {
        if let EventPayload::LockModeChanged { from, to } = event.payload {
            transitions.push((from, to));
        }
    }
    assert_eq!(
        transitions,
        vec![
            (LockMode::Pinned, LockMode::UnlockPending),
            (LockMode::UnlockPending, LockMode::Pinned),
            (LockMode::Pinned, LockMode::UnlockPending),
            (LockMode::UnlockPending, LockMode::Pinned),
            (LockMode::Pinned, LockMode::UnlockPending),
            (LockMode::UnlockPending, LockMode::Unlocked),
        ]
    );
}

#[test]
fn leaving_and_returning_after_unlock_repins() {
    let mut rig = pinned_rig();
    rig.supervisor.on_unlock_gesture_detected();
    rig.supervisor.on_pin_entered("1234").unwrap();

    rig.device.set_foreground(HOME);
    rig.supervisor.on_focus_changed(HOME);
    rig.run_until(secs(5));
    rig.device.set_foreground(TARGET);
    rig.supervisor.on_focus_changed(TARGET);
    rig.run_until(secs(7));

    assert_eq!(rig.supervisor.lock_mode(), LockMode::Pinned);
}

#[test]
fn unlocked_target_left_idle_in_front_repins() {
    let mut rig = pinned_rig();
    rig.supervisor.on_unlock_gesture_detected();
    rig.supervisor.on_pin_entered("1234").unwrap();

    rig.supervisor.on_user_interaction();
    rig.run_until(secs(20));
    rig.supervisor.on_user_interaction();
    rig.run_until(secs(49));
    assert_eq!(rig.supervisor.lock_mode(), LockMode::Unlocked);
    assert!(!rig.device.is_pinned());

    rig.run_until(secs(51));
    assert_eq!(rig.supervisor.lock_mode(), LockMode::Pinned);
    assert!(rig.device.is_pinned());
    assert_eq!(rig.device.launch_count(), 0);
}

#[test]
fn idle_relock_waits_for_the_gate() {
    let mut rig = Rig::new(no_redundancy());
    rig.device.grant_all();
    rig.device.set_foreground(TARGET);
    rig.supervisor.on_focus_changed(TARGET);

    rig.supervisor.on_user_interaction();
    rig.run_until(secs(120));
    assert_eq!(rig.supervisor.lock_mode(), LockMode::Unlocked);
}

// ── Poller ──────────────────────────────────────────────────────────────────

#[test]
fn poller_relaunches_then_stops_once_confirmed() {
    let mut rig = Rig::new(SupervisorConfig {
        poll: PollConfig {
            first_check: secs(120),
            interval: secs(30),
            max_checks: 20,
        },
        ..no_redundancy()
    });
    rig.device.ignore_launches(true);
    rig.supervisor.on_boot();
    rig.run_until(secs(60));
    let after_boot = rig.device.launch_count();

    rig.run_until(secs(150));
    assert_eq!(rig.device.launch_count(), after_boot + 2);
    assert!(rig.device.is_affordance_active(Affordance::BootReady));

    rig.device.set_foreground(TARGET);
    rig.run_until(secs(180));
    assert!(!rig.device.is_affordance_active(Affordance::BootReady));
    assert!(!rig.supervisor.status().polling);
}

#[test]
fn poller_gives_up_after_max_checks() {
    let mut rig = Rig::new(SupervisorConfig {
        poll: PollConfig {
            first_check: secs(120),
            interval: secs(30),
            max_checks: 3,
        },
        ..no_redundancy()
    });
    rig.device.ignore_launches(true);
    rig.supervisor.on_boot();
    rig.run_until(secs(60));
    let after_boot = rig.device.launch_count();

    rig.run_until(secs(3_600));
    assert_eq!(rig.device.launch_count(), after_boot + 3);
    assert_eq!(rig.supervisor.status().poll_checks, 3);
}
