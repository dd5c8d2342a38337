//! Tokio driver for a [`Supervisor`].
//!
//! The supervisor lives inside a single task, so all watchdog logic runs on
//! one logical timeline.  Host events arrive as [`Command`]s on an unbounded
//! channel; between commands the task sleeps until the next timer deadline.
//! The interactive privilege gate runs as its own spawned task and feeds its
//! events back through the same channel, so the control loop never waits on
//! a dialog.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use kiosk_middleware::EventBus;
//! use kiosk_platform::SimDevice;
//! use kiosk_runtime::clock::TokioClock;
//! use kiosk_runtime::driver::spawn;
//! use kiosk_runtime::supervisor::{Supervisor, SupervisorConfig};
//!
//! # #[tokio::main] async fn main() {
//! let device = SimDevice::new("com.example.kiosk");
//! let supervisor = Supervisor::new(
//!     SupervisorConfig::default(),
//!     device.platform(),
//!     Arc::new(TokioClock::new()),
//!     EventBus::default(),
//! );
//! let (handle, task) = spawn(supervisor);
//! handle.boot();
//! handle.shutdown();
//! task.await.ok();
//! # }
//! ```

use futures_util::StreamExt;
use kiosk_kernel::GateEvent;
use kiosk_types::{InputSignal, SurfaceId};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::supervisor::{Supervisor, SupervisorStatus};

/// Messages accepted by the driver task.
#[derive(Debug)]
pub enum Command {
    Boot,
    FocusChanged(SurfaceId),
    UserInteraction,
    ScreenOn,
    ScreenOff,
    UserPresent,
    Input(InputSignal),
    UnlockGesture,
    Pin(PinEntry),
    CancelChallenge,
    RequestPrivileges,
    /// Progress of a running privilege gate.
    Gate(GateEvent),
    BackupJobFired,
    Status(oneshot::Sender<SupervisorStatus>),
    Shutdown,
}

/// A PIN typed at the challenge.  Wiped on drop, redacted in `Debug`.
pub struct PinEntry(Zeroizing<String>);

impl std::fmt::Debug for PinEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PinEntry(<redacted>)")
    }
}

/// Cheap, clonable sender side of a running driver.
#[derive(Debug, Clone)]
pub struct DriverHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl DriverHandle {
    /// Queue `command`.  Returns `false` once the driver has stopped.
    pub fn send(&self, command: Command) -> bool {
        self.tx.send(command).is_ok()
    }

    pub fn boot(&self) -> bool {
        self.send(Command::Boot)
    }

    pub fn focus_changed(&self, surface: impl Into<SurfaceId>) -> bool {
        self.send(Command::FocusChanged(surface.into()))
    }

    pub fn user_interaction(&self) -> bool {
        self.send(Command::UserInteraction)
    }

    pub fn screen_on(&self) -> bool {
        self.send(Command::ScreenOn)
    }

    pub fn screen_off(&self) -> bool {
        self.send(Command::ScreenOff)
    }

    pub fn user_present(&self) -> bool {
        self.send(Command::UserPresent)
    }

    pub fn input(&self, signal: InputSignal) -> bool {
        self.send(Command::Input(signal))
    }

    pub fn pin(&self, pin: impl Into<String>) -> bool {
        self.send(Command::Pin(PinEntry(Zeroizing::new(pin.into()))))
    }

    pub fn cancel_challenge(&self) -> bool {
        self.send(Command::CancelChallenge)
    }

    pub fn request_privileges(&self) -> bool {
        self.send(Command::RequestPrivileges)
    }

    pub fn backup_job_fired(&self) -> bool {
        self.send(Command::BackupJobFired)
    }

    /// Snapshot of the supervisor; `None` once the driver has stopped.
    pub async fn status(&self) -> Option<SupervisorStatus> {
        let (reply, rx) = oneshot::channel();
        if !self.send(Command::Status(reply)) {
            return None;
        }
        rx.await.ok()
    }

    pub fn shutdown(&self) -> bool {
        self.send(Command::Shutdown)
    }
}

/// Move `supervisor` into a new task and return its handle.
pub fn spawn(supervisor: Supervisor) -> (DriverHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = DriverHandle { tx };
    let task = tokio::spawn(run(supervisor, handle.tx.downgrade(), rx));
    (handle, task)
}

async fn run(
    mut supervisor: Supervisor,
    feedback: mpsc::WeakUnboundedSender<Command>,
    mut rx: mpsc::UnboundedReceiver<Command>,
) {
    info!(target_surface = %supervisor.target(), "watchdog driver started");
    let mut gate_running = false;

    loop {
        supervisor.poll_timers();
        let wait = supervisor
            .next_deadline()
            .map(|deadline| deadline.saturating_sub(supervisor.now()));

        let command = tokio::select! {
            command = rx.recv() => command,
            _ = tokio::time::sleep(wait.unwrap_or_default()), if wait.is_some() => continue,
        };

        let Some(command) = command else {
            debug!("all driver handles dropped");
            break;
        };

        match command {
            Command::Boot => supervisor.on_boot(),
            Command::FocusChanged(surface) => supervisor.on_focus_changed(surface),
            Command::UserInteraction => supervisor.on_user_interaction(),
            Command::ScreenOn => supervisor.on_screen_on(),
            Command::ScreenOff => supervisor.on_screen_off(),
            Command::UserPresent => supervisor.on_user_present(),
            Command::Input(signal) => {
                supervisor.on_input_signal(signal);
            }
            Command::UnlockGesture => {
                supervisor.on_unlock_gesture_detected();
            }
            Command::Pin(pin) => {
                if let Err(err) = supervisor.on_pin_entered(&pin.0) {
                    warn!(%err, "PIN ignored");
                }
            }
            Command::CancelChallenge => {
                if let Err(err) = supervisor.on_challenge_cancelled() {
                    debug!(%err, "nothing to cancel");
                }
            }
            Command::RequestPrivileges => {
                if gate_running {
                    debug!("privilege gate already running");
                } else if let Some(tx) = feedback.upgrade() {
                    gate_running = true;
                    spawn_gate(&supervisor, DriverHandle { tx });
                }
            }
            Command::Gate(event) => {
                if matches!(event, GateEvent::Finished(_)) {
                    gate_running = false;
                }
                supervisor.record_gate_event(&event);
            }
            Command::BackupJobFired => {
                supervisor.on_backup_job_fired();
            }
            Command::Status(reply) => {
                let _ = reply.send(supervisor.status());
            }
            Command::Shutdown => break,
        }
    }
    info!("watchdog driver stopped");
}

fn spawn_gate(supervisor: &Supervisor, handle: DriverHandle) {
    let mut events = supervisor.request_privileges();
    tokio::spawn(async move {
        while let Some(event) = events.next().await {
            if !handle.send(Command::Gate(event)) {
                break;
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use kiosk_middleware::EventBus;
    use kiosk_platform::{SimAnswer, SimDevice};
    use kiosk_types::{GateOutcome, LockMode, PrivilegeStep};

    use crate::clock::TokioClock;
    use crate::supervisor::SupervisorConfig;

    const TARGET: &str = "com.example.kiosk";

    fn start(device: &Arc<SimDevice>) -> (DriverHandle, JoinHandle<()>) {
        let supervisor = Supervisor::new(
            SupervisorConfig {
                redundant_boot_sequence: false,
                ..SupervisorConfig::default()
            },
            device.platform(),
            Arc::new(TokioClock::new()),
            EventBus::default(),
        );
        spawn(supervisor)
    }

    #[tokio::test(start_paused = true)]
    async fn boot_profile_runs_on_tokio_time() {
        let device = SimDevice::new(TARGET);
        device.set_foreground("com.android.launcher");
        device.ignore_launches(true);
        let (handle, task) = start(&device);

        handle.boot();
        tokio::time::sleep(Duration::from_millis(14_900)).await;
        assert!(device.backup_requests().is_empty());
        assert_eq!(device.launch_count(), 4);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(device.backup_requests().len(), 1);

        handle.shutdown();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn privilege_gate_runs_off_loop_and_settles() {
        let device = SimDevice::new(TARGET);
        device.set_answer(PrivilegeStep::AdminRights, SimAnswer::Decline);
        let (handle, task) = start(&device);

        handle.request_privileges();
        tokio::time::sleep(Duration::from_secs(10)).await;

        let status = handle.status().await.unwrap();
        assert_eq!(
            status.gate,
            Some(GateOutcome::PartiallyGranted(vec![PrivilegeStep::AdminRights]))
        );
        assert_eq!(device.prompts(), PrivilegeStep::ALL.to_vec());

        handle.shutdown();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn focus_listener_feeds_driver_and_pins() {
        let device = SimDevice::new(TARGET);
        device.grant_all();
        let (handle, task) = start(&device);
        let feed = handle.clone();
        device.set_focus_listener(Arc::new(move |surface| {
            feed.focus_changed(surface.clone());
        }));

        handle.request_privileges();
        handle.boot();
        tokio::time::sleep(Duration::from_secs(3)).await;

        let status = handle.status().await.unwrap();
        assert!(device.target_in_front());
        assert_eq!(status.lock_mode, LockMode::Pinned);
        assert!(device.is_pinned());

        handle.shutdown();
        task.await.unwrap();
        assert!(handle.status().await.is_none());
    }
}
