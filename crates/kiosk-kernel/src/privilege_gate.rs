//! [`PrivilegeGate`] – sequential privilege-acquisition workflow.
//!
//! The gate walks [`PrivilegeStep::ALL`] strictly in order.  For each step it
//! asks the [`PrivilegeProvider`] whether the capability is already granted;
//! if not, it emits a [`GateEvent::Progress`], runs the host's interactive
//! acquisition flow and re-checks the grant once the flow returns.  A step
//! that still cannot be verified is recorded as denied and the gate moves on.
//! It never blocks indefinitely on one step: every flow is bounded by
//! [`GateConfig::step_timeout`].
//!
//! Denials are remembered for the lifetime of the gate (one session).  A
//! later [`PrivilegeGate::request_all`] skips a denied step without prompting
//! again and surfaces it as a [`GateEvent::Denied`] warning instead.
//!
//! # Example
//!
//! ```rust
//! # let rt = tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap();
//! # rt.block_on(async {
//! use futures_util::StreamExt;
//! use kiosk_kernel::privilege_gate::{GateConfig, GateEvent, PrivilegeGate};
//! use kiosk_platform::SimDevice;
//! use kiosk_types::GateOutcome;
//!
//! let device = SimDevice::new("com.example.kiosk");
//! device.grant_all();
//!
//! let gate = PrivilegeGate::new(device, GateConfig::default());
//! let events: Vec<GateEvent> = gate.request_all().collect().await;
//! assert_eq!(events, vec![GateEvent::Finished(GateOutcome::AllGranted)]);
//! # });
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::StreamExt;
use futures_util::stream::{self, BoxStream};
use kiosk_platform::{AcquisitionResult, PrivilegeProvider};
use kiosk_types::{GateOutcome, GrantState, PrivilegeStep, StepProgress};
use tracing::{debug, info, warn};

/// Timing knobs for the interactive workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateConfig {
    /// Upper bound on a single acquisition flow.  A flow that has not returned
    /// by then counts as unverifiable.
    pub step_timeout: Duration,
    /// Pause after an interactive step so the host can settle before the
    /// next grant check.
    pub settle_delay: Duration,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            step_timeout: Duration::from_secs(120),
            settle_delay: Duration::from_secs(1),
        }
    }
}

/// Items of the stream returned by [`PrivilegeGate::request_all`].
///
/// The stream always ends with exactly one [`GateEvent::Finished`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateEvent {
    /// An interactive flow for this step is about to be presented.
    Progress(StepProgress),
    /// The step was denied, skipped, timed out or previously denied.
    Denied(PrivilegeStep),
    Finished(GateOutcome),
}

type Ledger = Arc<Mutex<HashMap<PrivilegeStep, GrantState>>>;

fn lock(ledger: &Ledger) -> MutexGuard<'_, HashMap<PrivilegeStep, GrantState>> {
    ledger.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Sequential privilege workflow with a per-session grant ledger.
#[derive(Clone)]
pub struct PrivilegeGate {
    provider: Arc<dyn PrivilegeProvider>,
    config: GateConfig,
    ledger: Ledger,
}

impl PrivilegeGate {
    pub fn new(provider: Arc<dyn PrivilegeProvider>, config: GateConfig) -> Self {
        Self {
            provider,
            config,
            ledger: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Recorded state of `step` in this session.
    pub fn grant_state(&self, step: PrivilegeStep) -> GrantState {
        lock(&self.ledger)
            .get(&step)
            .copied()
            .unwrap_or(GrantState::Pending)
    }

    /// Check every step without prompting.
    ///
    /// Steps that are not granted are reported as missing in the outcome but
    /// are not recorded as denied: the user was never asked.
    pub fn assess(&self) -> GateOutcome {
        let mut ledger = lock(&self.ledger);
        let missing = PrivilegeStep::ALL
            .into_iter()
            .filter(|step| {
                let granted = self.provider.is_granted(*step);
                if granted {
                    ledger.insert(*step, GrantState::Granted);
                }
                !granted
            })
            .collect();
        GateOutcome::from_denied(missing)
    }

    /// Run the interactive workflow.
    ///
    /// Callers must not attempt enforcement until the returned stream yields
    /// its terminal [`GateEvent::Finished`].
    pub fn request_all(&self) -> BoxStream<'static, GateEvent> {
        let cursor = Cursor {
            provider: Arc::clone(&self.provider),
            config: self.config,
            ledger: Arc::clone(&self.ledger),
            next: 0,
            awaiting: None,
            denied: Vec::new(),
            pending: VecDeque::new(),
            finished: false,
        };
        stream::unfold(cursor, |mut cursor| async move {
            loop {
                if let Some(event) = cursor.pending.pop_front() {
                    return Some((event, cursor));
                }
                if cursor.finished {
                    return None;
                }
                cursor.advance().await;
            }
        })
        .boxed()
    }

    /// Drive [`request_all`][Self::request_all] to its end, handing every
    /// event to `on_event`, and return the terminal outcome.
    pub async fn run(&self, mut on_event: impl FnMut(&GateEvent)) -> GateOutcome {
        let mut events = self.request_all();
        let mut outcome = None;
        while let Some(event) = events.next().await {
            on_event(&event);
            if let GateEvent::Finished(result) = event {
                outcome = Some(result);
            }
        }
        // The stream always finishes with `Finished`; fall back to a
        // non-interactive assessment should a provider panic mid-stream.
        outcome.unwrap_or_else(|| self.assess())
    }
}

struct Cursor {
    provider: Arc<dyn PrivilegeProvider>,
    config: GateConfig,
    ledger: Ledger,
    next: usize,
    awaiting: Option<PrivilegeStep>,
    denied: Vec<PrivilegeStep>,
    pending: VecDeque<GateEvent>,
    finished: bool,
}

impl Cursor {
    async fn advance(&mut self) {
        if let Some(step) = self.awaiting.take() {
            self.acquire(step).await;
            return;
        }

        let total = PrivilegeStep::ALL.len();
        let Some(&step) = PrivilegeStep::ALL.get(self.next) else {
            let outcome = GateOutcome::from_denied(std::mem::take(&mut self.denied));
            info!(?outcome, "privilege gate finished");
            self.pending.push_back(GateEvent::Finished(outcome));
            self.finished = true;
            return;
        };
        self.next += 1;

        if self.provider.is_granted(step) {
            debug!(%step, "privilege already granted");
            lock(&self.ledger).insert(step, GrantState::Granted);
            return;
        }

        if lock(&self.ledger).get(&step) == Some(&GrantState::Denied) {
            warn!(%step, "privilege denied earlier this session; not asking again");
            self.denied.push(step);
            self.pending.push_back(GateEvent::Denied(step));
            return;
        }

        self.pending.push_back(GateEvent::Progress(StepProgress {
            index: self.next,
            total,
            step,
        }));
        self.awaiting = Some(step);
    }

    async fn acquire(&mut self, step: PrivilegeStep) {
        let flow = tokio::time::timeout(
            self.config.step_timeout,
            self.provider.request_interactive(step),
        )
        .await;
        match &flow {
            Ok(AcquisitionResult::Completed) => debug!(%step, "acquisition flow returned"),
            Ok(AcquisitionResult::Declined) => info!(%step, "user skipped privilege"),
            Ok(AcquisitionResult::Failed(reason)) => {
                warn!(%step, %reason, "acquisition flow could not be started")
            }
            Err(_) => warn!(
                %step,
                timeout_secs = self.config.step_timeout.as_secs(),
                "acquisition flow timed out"
            ),
        }

        if self.provider.is_granted(step) {
            info!(%step, "privilege granted");
            lock(&self.ledger).insert(step, GrantState::Granted);
        } else {
            warn!(%step, "privilege not verified; continuing with reduced enforcement");
            lock(&self.ledger).insert(step, GrantState::Denied);
            self.denied.push(step);
            self.pending.push_back(GateEvent::Denied(step));
        }

        let more_steps = self.next < PrivilegeStep::ALL.len();
        if more_steps && !self.config.settle_delay.is_zero() {
            tokio::time::sleep(self.config.settle_delay).await;
        }
    }
}
