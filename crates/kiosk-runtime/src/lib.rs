//! `kiosk-runtime` – The Watchdog
//!
//! Keeps the target surface in front.  Independent timing sources (boot,
//! background transitions, inactivity, periodic polling) each start bounded
//! escalation runs; every step re-checks presence right before it acts, so
//! overlapping runs never stack launches.
//!
//! # Modules
//!
//! - [`clock`] – [`Clock`][clock::Clock] with manual, monotonic and tokio
//!   implementations.
//! - [`timer`] – [`TimerQueue`][timer::TimerQueue]: one cancellable deadline
//!   queue per watchdog context.
//! - [`presence`] – [`PresenceTracker`][presence::PresenceTracker]: the last
//!   focus-derived presence and the pre-fire presence check.
//! - [`escalation`] – [`EscalationPlan`][escalation::EscalationPlan] profiles
//!   and the [`EscalationScheduler`][escalation::EscalationScheduler].
//! - [`transition`] – [`TransitionWatchdog`][transition::TransitionWatchdog]:
//!   one recovery run per background excursion.
//! - [`inactivity`] – [`InactivityMonitor`][inactivity::InactivityMonitor].
//! - [`poller`] – [`PresencePoller`][poller::PresencePoller]: bounded
//!   post-boot supervision.
//! - [`supervisor`] – [`Supervisor`][supervisor::Supervisor]: the context
//!   object owning all of the above plus the lock state machine and the
//!   privilege gate.
//! - [`driver`] – runs a supervisor in a tokio task behind a
//!   [`DriverHandle`][driver::DriverHandle].
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: `tracing`
//!   subscriber with optional OTLP export (`OTEL_EXPORTER_OTLP_ENDPOINT`).

pub mod clock;
pub mod driver;
pub mod escalation;
pub mod inactivity;
pub mod poller;
pub mod presence;
pub mod supervisor;
pub mod telemetry;
pub mod timer;
pub mod transition;

pub use clock::{Clock, ManualClock, MonotonicClock, TokioClock};
pub use driver::{Command, DriverHandle};
pub use escalation::{EscalationPlan, EscalationScheduler, PlanStep};
pub use presence::PresenceTracker;
pub use supervisor::{Supervisor, SupervisorConfig, SupervisorStatus};
pub use telemetry::{TracerProviderGuard, init_tracing};
pub use timer::{TimerHandle, TimerQueue};

// Re-exported so shells can configure the supervisor without a direct
// dependency on kiosk-kernel.
pub use kiosk_kernel::{AdminPin, GateConfig};
pub use poller::PollConfig;
